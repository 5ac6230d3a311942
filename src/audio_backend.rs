//! Audio backend contract (C8).
//!
//! `AudioBackend` is the capability set spec §4.8 assigns to an
//! OS-specific module outside this core. This file defines the trait
//! plus an in-memory `MockAudioBackend` reference implementation so the
//! rest of the crate (and its tests) can run without a real OS mixer.
//!
//! Grounded on `persona.rs`'s `PersonaState` (`Arc<RwLock<T>>` shared
//! mutable state behind async `get`/`set`) for the shared-state shape.

use crate::message::{DataFlow, DefaultDeviceRecord, DeviceRole, SessionSnapshot, SessionState};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateFilter {
    All,
    Inactive,
    Active,
    Expired,
}

/// Filter options for `list_sessions` (spec §4.8).
#[derive(Debug, Clone)]
pub struct SessionFilter {
    pub data_flow: DataFlow,
    pub role: DeviceRole,
    pub state_filter: StateFilter,
    pub include_all_devices: bool,
    pub process_name_filters: Vec<String>,
    pub use_regex_filtering: bool,
}

impl Default for SessionFilter {
    fn default() -> Self {
        Self {
            data_flow: DataFlow::Render,
            role: DeviceRole::Multimedia,
            state_filter: StateFilter::All,
            include_all_devices: false,
            process_name_filters: Vec::new(),
            use_regex_filtering: false,
        }
    }
}

impl SessionFilter {
    /// `true` if `process_name` survives this filter's name predicate.
    /// An invalid regex is logged by the caller and treated as if that
    /// entry were absent (spec §9).
    pub fn matches_name(&self, process_name: &str) -> bool {
        if self.process_name_filters.is_empty() {
            return true;
        }
        self.process_name_filters.iter().any(|pattern| {
            if self.use_regex_filtering {
                regex::Regex::new(pattern).map(|re| re.is_match(process_name)).unwrap_or(false)
            } else {
                process_name.contains(pattern.as_str())
            }
        })
    }

    pub fn matches_state(&self, state: SessionState) -> bool {
        match self.state_filter {
            StateFilter::All => true,
            StateFilter::Inactive => state == SessionState::Inactive,
            StateFilter::Active => state == SessionState::Active,
            StateFilter::Expired => state == SessionState::Expired,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetOutcome {
    Success,
    NotFound,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendError {
    NotFound,
    NotPresent,
    Backend(String),
}

/// Clamp a volume value to the valid range (spec §4.8: "clamped to [0,1]
/// at the boundary").
pub fn clamp_volume(v: f32) -> f32 {
    v.clamp(0.0, 1.0)
}

#[async_trait]
pub trait AudioBackend: Send + Sync {
    async fn list_sessions(&self, filter: &SessionFilter) -> Vec<SessionSnapshot>;
    async fn set_session_volume(&self, process_id: u32, v: f32) -> Result<(), BackendError>;
    async fn set_session_mute(&self, process_id: u32, mute: bool) -> Result<(), BackendError>;
    async fn find_session_by_name(&self, name: &str) -> Option<SessionSnapshot>;
    async fn get_default_device(&self, flow: DataFlow, role: DeviceRole) -> Option<DefaultDeviceRecord>;
    async fn set_default_volume(&self, v: f32, flow: DataFlow, role: DeviceRole) -> Result<(), BackendError>;
    async fn set_default_mute(&self, mute: bool, flow: DataFlow, role: DeviceRole) -> Result<(), BackendError>;
    async fn set_device_volume_by_name(&self, name: &str, v: f32, flow: DataFlow, role: DeviceRole) -> Result<(), BackendError>;
    async fn set_device_mute_by_name(&self, name: &str, mute: bool, flow: DataFlow, role: DeviceRole) -> Result<(), BackendError>;
}

/// In-memory reference backend. Not OS-specific — lets the rest of the
/// bridge run and be tested without a real mixer.
pub struct MockAudioBackend {
    sessions: RwLock<HashMap<u32, SessionSnapshot>>,
    default_device: RwLock<Option<DefaultDeviceRecord>>,
}

impl MockAudioBackend {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { sessions: RwLock::new(HashMap::new()), default_device: RwLock::new(None) })
    }

    pub async fn seed_session(&self, session: SessionSnapshot) {
        self.sessions.write().await.insert(session.process_id, session);
    }

    pub async fn seed_default_device(&self, device: DefaultDeviceRecord) {
        *self.default_device.write().await = Some(device);
    }
}

impl Default for MockAudioBackend {
    fn default() -> Self {
        Self { sessions: RwLock::new(HashMap::new()), default_device: RwLock::new(None) }
    }
}

#[async_trait]
impl AudioBackend for MockAudioBackend {
    async fn list_sessions(&self, filter: &SessionFilter) -> Vec<SessionSnapshot> {
        self.sessions
            .read()
            .await
            .values()
            .filter(|s| filter.matches_state(s.state) && filter.matches_name(&s.process_name))
            .cloned()
            .collect()
    }

    async fn set_session_volume(&self, process_id: u32, v: f32) -> Result<(), BackendError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&process_id) {
            Some(s) => {
                s.volume = clamp_volume(v);
                Ok(())
            }
            None => Err(BackendError::NotFound),
        }
    }

    async fn set_session_mute(&self, process_id: u32, mute: bool) -> Result<(), BackendError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&process_id) {
            Some(s) => {
                s.muted = mute;
                Ok(())
            }
            None => Err(BackendError::NotFound),
        }
    }

    async fn find_session_by_name(&self, name: &str) -> Option<SessionSnapshot> {
        // Tie-break (spec §4.9): lowest process id wins among same-name matches.
        self.sessions.read().await.values().filter(|s| s.process_name == name).min_by_key(|s| s.process_id).cloned()
    }

    async fn get_default_device(&self, _flow: DataFlow, _role: DeviceRole) -> Option<DefaultDeviceRecord> {
        self.default_device.read().await.clone()
    }

    async fn set_default_volume(&self, v: f32, _flow: DataFlow, _role: DeviceRole) -> Result<(), BackendError> {
        let mut device = self.default_device.write().await;
        match device.as_mut() {
            Some(d) => {
                d.volume = clamp_volume(v);
                Ok(())
            }
            None => Err(BackendError::NotPresent),
        }
    }

    async fn set_default_mute(&self, mute: bool, _flow: DataFlow, _role: DeviceRole) -> Result<(), BackendError> {
        let mut device = self.default_device.write().await;
        match device.as_mut() {
            Some(d) => {
                d.muted = mute;
                Ok(())
            }
            None => Err(BackendError::NotPresent),
        }
    }

    async fn set_device_volume_by_name(&self, name: &str, v: f32, flow: DataFlow, role: DeviceRole) -> Result<(), BackendError> {
        let matches = self.default_device.read().await.as_ref().map(|d| d.friendly_name == name).unwrap_or(false);
        if matches {
            self.set_default_volume(v, flow, role).await
        } else {
            Err(BackendError::NotFound)
        }
    }

    async fn set_device_mute_by_name(&self, name: &str, mute: bool, flow: DataFlow, role: DeviceRole) -> Result<(), BackendError> {
        let matches = self.default_device.read().await.as_ref().map(|d| d.friendly_name == name).unwrap_or(false);
        if matches {
            self.set_default_mute(mute, flow, role).await
        } else {
            Err(BackendError::NotFound)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: u32, name: &str) -> SessionSnapshot {
        SessionSnapshot {
            process_id: id,
            process_name: name.to_string(),
            display_name: name.to_string(),
            volume: 1.0,
            muted: false,
            state: SessionState::Active,
            icon_path: None,
            updated_at_ms: 0,
        }
    }

    #[tokio::test]
    async fn set_session_volume_clamps_and_updates() {
        let backend = MockAudioBackend::new();
        backend.seed_session(session(1, "chrome")).await;
        backend.set_session_volume(1, 1.5).await.unwrap();
        let sessions = backend.list_sessions(&SessionFilter::default()).await;
        assert_eq!(sessions[0].volume, 1.0);
    }

    #[tokio::test]
    async fn set_session_volume_missing_process_not_found() {
        let backend = MockAudioBackend::new();
        let err = backend.set_session_volume(999, 0.5).await.unwrap_err();
        assert_eq!(err, BackendError::NotFound);
    }

    #[tokio::test]
    async fn find_by_name_ties_break_to_lowest_id() {
        let backend = MockAudioBackend::new();
        backend.seed_session(session(50, "chrome")).await;
        backend.seed_session(session(5, "chrome")).await;
        backend.seed_session(session(100, "chrome")).await;
        let found = backend.find_session_by_name("chrome").await.unwrap();
        assert_eq!(found.process_id, 5);
    }

    #[test]
    fn name_filter_substring_mode() {
        let filter = SessionFilter { process_name_filters: vec!["chro".into()], ..Default::default() };
        assert!(filter.matches_name("chrome"));
        assert!(!filter.matches_name("firefox"));
    }

    #[test]
    fn name_filter_regex_mode() {
        let filter = SessionFilter { process_name_filters: vec!["^fire.*".into()], use_regex_filtering: true, ..Default::default() };
        assert!(filter.matches_name("firefox"));
        assert!(!filter.matches_name("chrome"));
    }

    #[test]
    fn invalid_regex_behaves_as_absent_entry() {
        let filter = SessionFilter { process_name_filters: vec!["(".into()], use_regex_filtering: true, ..Default::default() };
        assert!(!filter.matches_name("anything"));
    }
}
