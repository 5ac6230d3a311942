//! Transport adapter (C6).
//!
//! Owns one serial port: a reader task (sniffer -> receive state machine
//! -> dispatch) and a write path serialized by a mutex. Reconnects on
//! I/O error when configured to; suppresses writes while the sniffer
//! reports quarantine (spec §4.6).
//!
//! Grounded on the teacher's `esp_audio_recv_loop`/`spawn_udp_receivers`
//! shape: one task per port, `Arc<Stats>` counters updated inline, and
//! `tokio::spawn` + a returned `JoinHandle` for lifecycle management —
//! generalized here from UDP sockets to `tokio_serial`'s async serial
//! port, and given the cancellation-token-driven stop sequence spec §5
//! requires (the teacher's receivers never exit).

use crate::config::SerialConfig;
use crate::dispatcher::SharedDispatcher;
use crate::event_sink::{hex_dump, Category, EventSink, Level};
use crate::frame;
use crate::orchestrator::OutboundSink;
use crate::recv_state::FrameReceiver;
use crate::sniffer::CrashSniffer;
use crate::stats::Stats;
use std::sync::Arc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::SerialPortBuilderExt;
use tokio_util::sync::CancellationToken;

const POLL_IDLE_SLEEP: std::time::Duration = std::time::Duration::from_millis(5);
const STOP_JOIN_TIMEOUT: std::time::Duration = std::time::Duration::from_secs(1);

fn parity_from_str(s: &str) -> tokio_serial::Parity {
    match s {
        "odd" => tokio_serial::Parity::Odd,
        "even" => tokio_serial::Parity::Even,
        _ => tokio_serial::Parity::None,
    }
}

fn open_port(config: &SerialConfig) -> Result<tokio_serial::SerialStream, tokio_serial::Error> {
    tokio_serial::new(&config.port_name, config.baud_rate)
        .data_bits(match config.data_bits {
            5 => tokio_serial::DataBits::Five,
            6 => tokio_serial::DataBits::Six,
            7 => tokio_serial::DataBits::Seven,
            _ => tokio_serial::DataBits::Eight,
        })
        .parity(parity_from_str(&config.parity))
        .stop_bits(match config.stop_bits {
            2 => tokio_serial::StopBits::Two,
            _ => tokio_serial::StopBits::One,
        })
        .timeout(std::time::Duration::from_millis(config.read_timeout_ms))
        .open_native_async()
}

/// Owns the port handle behind a mutex so reads (reader task) and
/// writes (send path) never race on the underlying fd, and so a
/// reconnect can swap the handle out from under in-flight senders.
pub struct Transport {
    config: SerialConfig,
    /// Selects binary escaped+CRC framing vs. the sibling line-delimited
    /// text framing (spec §6 "Sibling text-mode framing").
    binary_protocol: bool,
    port: Mutex<Option<tokio_serial::SerialStream>>,
    sniffer: Arc<CrashSniffer>,
    stats: Arc<Stats>,
    sink: Arc<dyn EventSink>,
}

impl Transport {
    pub fn new(config: SerialConfig, binary_protocol: bool, sniffer: Arc<CrashSniffer>, stats: Arc<Stats>, sink: Arc<dyn EventSink>) -> Arc<Self> {
        Arc::new(Self { config, binary_protocol, port: Mutex::new(None), sniffer, stats, sink })
    }

    /// Open the port and spawn the reader task. Returns the join handle
    /// so the caller can await it with a bounded timeout on stop.
    pub async fn start(self: Arc<Self>, dispatcher: SharedDispatcher, cancel: CancellationToken) -> Result<tokio::task::JoinHandle<()>, tokio_serial::Error> {
        let stream = open_port(&self.config)?;
        *self.port.lock().await = Some(stream);
        self.sink.emit(Level::Info, Category::Service, &format!("serial port {} opened at {} baud", self.config.port_name, self.config.baud_rate), &[]);

        let this = self.clone();
        Ok(tokio::spawn(async move { this.reader_loop(dispatcher, cancel).await }))
    }

    async fn reader_loop(self: Arc<Self>, dispatcher: SharedDispatcher, cancel: CancellationToken) {
        let mut recv_state = FrameReceiver::new(self.binary_protocol, self.stats.clone());
        let mut buf = [0u8; 4096];

        loop {
            if cancel.is_cancelled() {
                return;
            }

            let read_result = {
                let mut guard = self.port.lock().await;
                match guard.as_mut() {
                    Some(port) => {
                        tokio::select! {
                            _ = cancel.cancelled() => return,
                            r = port.read(&mut buf) => Some(r),
                        }
                    }
                    None => None,
                }
            };

            let n = match read_result {
                Some(Ok(0)) | None => {
                    tokio::time::sleep(POLL_IDLE_SLEEP).await;
                    continue;
                }
                Some(Ok(n)) => n,
                Some(Err(e)) => {
                    self.sink.emit(Level::Error, Category::Service, &format!("serial read error: {e}"), &[]);
                    if !self.reconnect().await {
                        return;
                    }
                    continue;
                }
            };

            let chunk = &buf[..n];
            self.stats.record_bytes_in(n);
            self.sink.emit(Level::Debug, Category::Binary, &hex_dump(chunk), &[]);

            if self.sniffer.scan(chunk, self.sink.as_ref()) {
                continue;
            }

            for payload in recv_state.process(chunk) {
                if let Ok(text) = std::str::from_utf8(&payload) {
                    self.sink.emit(Level::Info, Category::Incoming, text, &[]);
                }
                dispatcher.dispatch(&payload, "serial", self.sink.as_ref()).await;
            }
        }
    }

    async fn reconnect(&self) -> bool {
        if !self.config.enable_auto_reconnect {
            self.sink.emit(Level::Error, Category::Service, "auto-reconnect disabled — terminating reader", &[]);
            return false;
        }

        tokio::time::sleep(std::time::Duration::from_millis(self.config.reconnect_delay_ms)).await;
        *self.port.lock().await = None;

        match open_port(&self.config) {
            Ok(stream) => {
                *self.port.lock().await = Some(stream);
                self.sink.emit(Level::Info, Category::Service, "serial port reopened", &[]);
                true
            }
            Err(e) => {
                self.sink.emit(Level::Error, Category::Service, &format!("reconnect failed: {e}"), &[]);
                true
            }
        }
    }

    /// Signal cancellation and await the reader task, bounded; then
    /// drop the port (spec §4.6 Stop).
    pub async fn stop(&self, cancel: CancellationToken, reader: tokio::task::JoinHandle<()>) {
        cancel.cancel();
        let _ = tokio::time::timeout(STOP_JOIN_TIMEOUT, reader).await;
        *self.port.lock().await = None;
    }
}

#[async_trait::async_trait]
impl OutboundSink for Transport {
    /// Encode `document` through C2 and write it. Suppressed while the
    /// sniffer reports quarantine (spec §4.6 "Ping suppression").
    async fn send_document(&self, document: Vec<u8>) {
        if self.sniffer.is_quarantined() {
            self.sink.emit(Level::Debug, Category::Service, "send suppressed — link quarantined", &[]);
            return;
        }

        let frame = if self.binary_protocol {
            match frame::encode(&document) {
                Ok(f) => f,
                Err(e) => {
                    self.sink.emit(Level::Error, Category::Outgoing, &format!("failed to encode outbound frame: {e}"), &[]);
                    return;
                }
            }
        } else {
            // Sibling text-mode framing: payload followed by a single
            // line feed, no escaping, no CRC (spec §6).
            let mut line = document.clone();
            line.push(b'\n');
            line
        };

        let mut guard = self.port.lock().await;
        let Some(port) = guard.as_mut() else {
            self.sink.emit(Level::Warn, Category::Service, "send attempted with no open port", &[]);
            return;
        };

        if let Err(e) = port.write_all(&frame).await {
            self.sink.emit(Level::Error, Category::Service, &format!("serial write error: {e}"), &[]);
            return;
        }

        self.stats.record_bytes_out(frame.len());
        self.stats.record_frame_sent();
        if let Ok(text) = std::str::from_utf8(&document) {
            self.sink.emit(Level::Info, Category::Outgoing, text, &[]);
        }
    }
}
