//! Broadcast orchestrator (C9).
//!
//! Drives outbound traffic: periodic status snapshots, request-triggered
//! snapshots, debounced session-change notifications, ping replies, and
//! SET_VOLUME command routing. Handlers (C10) are thin wrappers that
//! parse a dispatched document and call straight into this type.
//!
//! Grounded on the teacher's `vad_response_loop`/`sensor_recv_loop` split
//! (one task building outbound traffic, independent of the receive
//! loop) and on `persona.rs`'s shared `RwLock` state for the debounce
//! timer.

use crate::audio_backend::{AudioBackend, SessionFilter, StateFilter};
use crate::event_sink::{Category, EventSink, Level};
use crate::message::{BroadcastReason, DataFlow, DeviceRole, MessageType, PongResponse, SessionState, SetVolumeRequest, StatusBundle};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tokio::time::Duration;

/// Debounce window for session-change notifications (spec §4.9).
pub const CHANGE_DEBOUNCE: Duration = Duration::from_millis(250);

fn now_unix_ms() -> i64 {
    std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH).unwrap_or_default().as_millis() as i64
}

/// Where an outbound document goes. `Orchestrator` is transport-agnostic
/// — it hands finished JSON bytes to this trait, and `transport.rs`
/// implements it over the owned serial port.
#[async_trait::async_trait]
pub trait OutboundSink: Send + Sync {
    async fn send_document(&self, bytes: Vec<u8>);
}

pub struct Orchestrator<B: AudioBackend> {
    device_id: String,
    backend: Arc<B>,
    sink: Arc<dyn EventSink>,
    outbound: Arc<dyn OutboundSink>,
    data_flow: DataFlow,
    device_role: DeviceRole,
    process_name_filters: Vec<String>,
    use_regex_filtering: bool,
    include_all_devices: bool,
    broadcast_in_flight: AtomicBool,
    change_notify: Notify,
}

impl<B: AudioBackend + 'static> Orchestrator<B> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        device_id: impl Into<String>,
        backend: Arc<B>,
        sink: Arc<dyn EventSink>,
        outbound: Arc<dyn OutboundSink>,
        data_flow: DataFlow,
        device_role: DeviceRole,
        process_name_filters: Vec<String>,
        use_regex_filtering: bool,
        include_all_devices: bool,
    ) -> Arc<Self> {
        Arc::new(Self {
            device_id: device_id.into(),
            backend,
            sink,
            outbound,
            data_flow,
            device_role,
            process_name_filters,
            use_regex_filtering,
            include_all_devices,
            broadcast_in_flight: AtomicBool::new(false),
            change_notify: Notify::new(),
        })
    }

    fn session_filter(&self) -> SessionFilter {
        SessionFilter {
            data_flow: self.data_flow,
            role: self.device_role,
            state_filter: StateFilter::All,
            include_all_devices: self.include_all_devices,
            process_name_filters: self.process_name_filters.clone(),
            use_regex_filtering: self.use_regex_filtering,
        }
    }

    async fn build_bundle(&self, reason: BroadcastReason) -> StatusBundle {
        let sessions = self.backend.list_sessions(&self.session_filter()).await;
        let default_device = self.backend.get_default_device(self.data_flow, self.device_role).await;
        let mut bundle = StatusBundle::new(self.device_id.clone(), now_unix_ms(), sessions, reason);
        bundle.default_device = default_device;
        bundle
    }

    /// Hand an already-serialized document straight to the transport,
    /// bypassing bundle construction. Used by handlers that build their
    /// own response type (e.g. ASSET_RESPONSE).
    pub async fn emit_raw(&self, bytes: Vec<u8>) {
        self.outbound.send_document(bytes).await;
    }

    async fn emit_bundle(&self, bundle: StatusBundle) {
        match serde_json::to_vec(&bundle) {
            Ok(bytes) => self.outbound.send_document(bytes).await,
            Err(e) => self.sink.emit(Level::Error, Category::Service, &format!("failed to serialize status bundle: {e}"), &[]),
        }
    }

    /// Periodic status broadcast task (spec §4.9). Skips a tick if the
    /// previous broadcast is still in flight.
    pub async fn run_periodic_broadcast(self: Arc<Self>, interval_ms: u64, cancel: tokio_util::sync::CancellationToken) {
        if interval_ms == 0 {
            cancel.cancelled().await;
            return;
        }
        let mut interval = tokio::time::interval(Duration::from_millis(interval_ms));
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = interval.tick() => {
                    if self.broadcast_in_flight.swap(true, Ordering::AcqRel) {
                        self.sink.emit(Level::Debug, Category::Service, "skipping broadcast tick — previous still in flight", &[]);
                        continue;
                    }
                    let bundle = self.build_bundle(BroadcastReason::Periodic).await;
                    self.emit_bundle(bundle).await;
                    self.broadcast_in_flight.store(false, Ordering::Release);
                }
            }
        }
    }

    /// Debounced session-change notifier: call `notify_session_change`
    /// whenever the backend reports a change; this task coalesces bursts
    /// within `CHANGE_DEBOUNCE` into a single bundle.
    pub async fn run_change_debouncer(self: Arc<Self>, cancel: tokio_util::sync::CancellationToken) {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = self.change_notify.notified() => {
                    loop {
                        tokio::select! {
                            _ = tokio::time::sleep(CHANGE_DEBOUNCE) => break,
                            _ = self.change_notify.notified() => continue,
                        }
                    }
                    let bundle = self.build_bundle(BroadcastReason::SessionChange).await;
                    self.emit_bundle(bundle).await;
                }
            }
        }
    }

    pub fn notify_session_change(&self) {
        self.change_notify.notify_one();
    }

    /// GET_STATUS handler body (spec §4.9).
    pub async fn handle_get_status(&self, request_id: Option<String>, device_id: Option<String>) {
        let mut bundle = self.build_bundle(BroadcastReason::StatusRequest).await;
        bundle.originating_request_id = request_id;
        bundle.originating_device_id = device_id;
        self.emit_bundle(bundle).await;
    }

    /// PING_REQUEST handler body.
    pub async fn handle_ping(&self, request_id: String) {
        let response = PongResponse { message_type: MessageType::PongResponse, timestamp: now_unix_ms(), request_id };
        match serde_json::to_vec(&response) {
            Ok(bytes) => self.outbound.send_document(bytes).await,
            Err(e) => self.sink.emit(Level::Error, Category::Service, &format!("failed to serialize pong: {e}"), &[]),
        }
    }

    /// SET_VOLUME handler body: resolve target by tie-break order
    /// (process-id > process-name > device-friendly-name), apply, then
    /// emit an update-response bundle (spec §4.9).
    pub async fn handle_set_volume(&self, request: SetVolumeRequest) {
        let outcome = self.apply_set_volume(&request).await;
        if let Err(reason) = outcome {
            self.sink.emit(Level::Warn, Category::Service, &format!("SET_VOLUME failed: {reason}"), &[]);
        }

        let mut bundle = self.build_bundle(BroadcastReason::UpdateResponse).await;
        bundle.originating_request_id = Some(request.request_id);
        self.emit_bundle(bundle).await;
    }

    async fn apply_set_volume(&self, request: &SetVolumeRequest) -> Result<(), String> {
        if let Some(process_id) = request.process_id {
            if let Some(v) = request.volume {
                self.backend.set_session_volume(process_id, v).await.map_err(|e| format!("{e:?}"))?;
            }
            if let Some(mute) = request.mute {
                self.backend.set_session_mute(process_id, mute).await.map_err(|e| format!("{e:?}"))?;
            }
            return Ok(());
        }

        if let Some(ref name) = request.process_name {
            let session = self.backend.find_session_by_name(name).await.ok_or_else(|| "no matching session".to_string())?;
            if let Some(v) = request.volume {
                self.backend.set_session_volume(session.process_id, v).await.map_err(|e| format!("{e:?}"))?;
            }
            if let Some(mute) = request.mute {
                self.backend.set_session_mute(session.process_id, mute).await.map_err(|e| format!("{e:?}"))?;
            }
            return Ok(());
        }

        if let Some(ref device_name) = request.device_friendly_name {
            if let Some(v) = request.volume {
                self.backend.set_device_volume_by_name(device_name, v, self.data_flow, self.device_role).await.map_err(|e| format!("{e:?}"))?;
            }
            if let Some(mute) = request.mute {
                self.backend.set_device_mute_by_name(device_name, mute, self.data_flow, self.device_role).await.map_err(|e| format!("{e:?}"))?;
            }
            return Ok(());
        }

        // No target specified — falls to "default".
        if let Some(v) = request.volume {
            self.backend.set_default_volume(v, self.data_flow, self.device_role).await.map_err(|e| format!("{e:?}"))?;
        }
        if let Some(mute) = request.mute {
            self.backend.set_default_mute(mute, self.data_flow, self.device_role).await.map_err(|e| format!("{e:?}"))?;
        }
        Ok(())
    }
}
