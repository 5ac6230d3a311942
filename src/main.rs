mod assets;
mod audio_backend;
mod config;
mod crc;
mod dispatcher;
mod error;
mod event_sink;
mod frame;
mod handlers;
mod message;
mod orchestrator;
mod recv_state;
mod sniffer;
mod stats;
mod transport;

use audio_backend::MockAudioBackend;
use clap::Parser;
use config::Config;
use dispatcher::Dispatcher;
use event_sink::{Category, EventSink, Level, TracingEventSink};
use orchestrator::Orchestrator;
use sniffer::CrashSniffer;
use stats::Stats;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();
    config.validate()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_new(&config.logging.level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(true)
        .with_ansi(config.logging.console && atty::is(atty::Stream::Stderr))
        .init();

    let sink: Arc<dyn EventSink> = Arc::new(TracingEventSink::new());
    sink.emit(
        Level::Info,
        Category::Service,
        &format!("bridge starting — device_id={} binary_protocol={}", config.device_id, config.enable_binary_protocol),
        &[],
    );

    let stats = Stats::new();
    let sniffer = CrashSniffer::new();
    // Decoding the crash dump itself is an external collaborator (spec
    // §1); this hook only logs the raw bracket and terminates the
    // process, which is the documented "operator-signaled terminate"
    // exit path (spec §6 Exit codes).
    let crash_sink = sink.clone();
    sniffer.set_decode_and_exit(Box::new(move |dump| {
        crash_sink.emit(Level::Error, Category::Service, &format!("crash dump captured ({} bytes) — exiting", dump.len()), &[]);
        std::process::exit(1);
    }));

    // Reference audio backend — a real OS mixer integration is an
    // external collaborator (spec.md §1); this stand-in lets the bridge
    // run and be exercised end-to-end.
    let backend = MockAudioBackend::new();

    let asset_provider: Arc<dyn assets::AssetProvider> = Arc::new(assets::UnavailableAssetProvider);
    let assets = assets::AssetCache::new(asset_provider);

    let cancel = CancellationToken::new();

    let transport =
        transport::Transport::new(config.serial.clone(), config.enable_binary_protocol, sniffer.clone(), stats.clone(), sink.clone());

    let outbound: Arc<dyn orchestrator::OutboundSink> = transport.clone();
    let orch = Orchestrator::new(
        config.device_id.clone(),
        backend,
        sink.clone(),
        outbound,
        config.resolved_data_flow(),
        config.resolved_device_role(),
        config.audio.process_name_filters.clone(),
        config.audio.use_regex_filtering,
        config.audio.include_all_devices,
    );

    let mut dispatcher = Dispatcher::new();
    handlers::register_all(&mut dispatcher, orch.clone(), assets, stats.clone(), sink.clone());
    let dispatcher = Arc::new(dispatcher);

    let mut tasks = Vec::new();

    let stats_sink = sink.clone();
    let stats_clone = stats.clone();
    let stats_interval = config.stats_interval_secs;
    tasks.push(tokio::spawn(async move {
        stats::stats_reporter(stats_clone, stats_sink, stats_interval).await;
    }));

    let broadcast_orch = orch.clone();
    let broadcast_cancel = cancel.clone();
    let broadcast_interval = config.status_broadcast_interval_ms;
    tasks.push(tokio::spawn(async move {
        broadcast_orch.run_periodic_broadcast(broadcast_interval, broadcast_cancel).await;
    }));

    let debounce_orch = orch;
    let debounce_cancel = cancel.clone();
    tasks.push(tokio::spawn(async move {
        debounce_orch.run_change_debouncer(debounce_cancel).await;
    }));

    let reader_handle = if config.enable_serial {
        match transport.clone().start(dispatcher, cancel.clone()).await {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Spec §6 Exit codes: "non-zero on unrecoverable startup
                // failure". An initial open failure is exactly that —
                // unlike the reconnect path in transport.rs (which keeps
                // retrying a port that was already working), there is no
                // established link to fall back to here.
                sink.emit(Level::Error, Category::Service, &format!("failed to open serial port: {e}"), &[]);
                return Err(error::BridgeError::SerialOpen {
                    path: config.serial.port_name.clone(),
                    source: std::io::Error::new(std::io::ErrorKind::Other, e.to_string()),
                }
                .into());
            }
        }
    } else {
        sink.emit(Level::Info, Category::Service, "serial transport disabled by configuration", &[]);
        None
    };

    sink.emit(Level::Info, Category::Service, "bridge ready", &[]);

    tokio::signal::ctrl_c().await?;
    sink.emit(Level::Info, Category::Service, "shutdown signal received", &[]);

    cancel.cancel();
    if let Some(reader) = reader_handle {
        transport.stop(cancel.clone(), reader).await;
    }
    for t in tasks {
        t.abort();
    }

    Ok(())
}
