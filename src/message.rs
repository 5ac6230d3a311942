//! Payload schema and message-type enumeration (part of C3/C5 data model,
//! spec §3/§6).
//!
//! The dispatch-keying Open Question in spec §9 is resolved here: the
//! enum-keyed form (`MessageType`) is authoritative. The wire string is
//! mapped onto it once per frame by the dispatcher (see DESIGN.md §4.14).

use serde::{Deserialize, Serialize};

/// The closed set of message-type tags (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageType {
    StatusUpdate,
    StatusMessage,
    GetStatus,
    AssetRequest,
    AssetResponse,
    SessionUpdate,
    SetVolume,
    PingRequest,
    PongResponse,
}

impl std::fmt::Display for MessageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = serde_json::to_value(self).ok().and_then(|v| v.as_str().map(str::to_owned)).unwrap_or_else(|| "UNKNOWN".into());
        write!(f, "{s}")
    }
}

/// Lifecycle state of one audio session (spec §3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Inactive,
    Active,
    Expired,
}

/// Data-flow direction for a device (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DataFlow {
    Render,
    Capture,
    Both,
}

/// Endpoint role (spec §4.8).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceRole {
    Console,
    Multimedia,
    Communications,
}

/// Why a status bundle was emitted. The wire form follows the literal
/// value in spec §8 scenario S5 (`"reason":"UpdateResponse"`), i.e.
/// PascalCase, rather than the kebab-case prose in §3 — the concrete
/// scenario is the more specific source of truth for a to-the-byte wire
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum BroadcastReason {
    Startup,
    Periodic,
    SessionChange,
    StatusRequest,
    UpdateResponse,
    Unknown,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub process_id: u32,
    pub process_name: String,
    pub display_name: String,
    pub volume: f32,
    pub muted: bool,
    pub state: SessionState,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub icon_path: Option<String>,
    pub updated_at_ms: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DefaultDeviceRecord {
    pub friendly_name: String,
    pub volume: f32,
    pub muted: bool,
    pub data_flow: DataFlow,
    pub role: DeviceRole,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusBundle {
    pub device_id: String,
    pub timestamp: i64,
    pub sessions: Vec<SessionSnapshot>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub default_device: Option<DefaultDeviceRecord>,
    pub reason: BroadcastReason,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub originating_request_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub originating_device_id: Option<String>,
    pub message_type: MessageType,
}

impl StatusBundle {
    pub fn new(device_id: impl Into<String>, timestamp: i64, sessions: Vec<SessionSnapshot>, reason: BroadcastReason) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp,
            sessions,
            default_device: None,
            reason,
            originating_request_id: None,
            originating_device_id: None,
            message_type: MessageType::StatusMessage,
        }
    }
}

/// A selector for which audio entity a command targets. Tie-break order
/// (spec §4.9): process-id wins over process-name; "default" wins only
/// when neither is given.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SetVolumeRequest {
    #[serde(default)]
    pub process_id: Option<u32>,
    #[serde(default)]
    pub process_name: Option<String>,
    #[serde(default)]
    pub device_friendly_name: Option<String>,
    #[serde(default)]
    pub volume: Option<f32>,
    #[serde(default)]
    pub mute: Option<bool>,
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetStatusRequest {
    #[serde(default)]
    pub request_id: Option<String>,
    #[serde(default)]
    pub device_id: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PingRequest {
    pub request_id: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PongResponse {
    pub message_type: MessageType,
    pub timestamp: i64,
    pub request_id: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRequest {
    pub process_name: String,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetResponse {
    pub message_type: MessageType,
    pub process_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub asset_data: Option<String>,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_type_wire_form_is_screaming_snake_case() {
        let json = serde_json::to_string(&MessageType::SetVolume).unwrap();
        assert_eq!(json, "\"SET_VOLUME\"");
        let back: MessageType = serde_json::from_str("\"PING_REQUEST\"").unwrap();
        assert_eq!(back, MessageType::PingRequest);
    }

    #[test]
    fn broadcast_reason_matches_s5_literal() {
        let json = serde_json::to_string(&BroadcastReason::UpdateResponse).unwrap();
        assert_eq!(json, "\"UpdateResponse\"");
    }

    #[test]
    fn set_volume_request_parses_minimal_and_full_forms() {
        let minimal: SetVolumeRequest = serde_json::from_str(r#"{"requestId":"x","volume":0.5}"#).unwrap();
        assert_eq!(minimal.volume, Some(0.5));
        assert!(minimal.process_id.is_none());

        let full: SetVolumeRequest = serde_json::from_str(
            r#"{"processId":1234,"processName":"chrome","deviceFriendlyName":"Speakers","volume":0.5,"mute":false,"requestId":"x"}"#,
        )
        .unwrap();
        assert_eq!(full.process_id, Some(1234));
        assert_eq!(full.process_name.as_deref(), Some("chrome"));
    }
}
