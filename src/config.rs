use clap::{Args, Parser};

/// Host-side serial bridge between the OS audio mixer and an embedded
/// controller.
#[derive(Parser, Debug, Clone)]
#[command(author, version, about)]
pub struct Config {
    /// Identifier this host reports in every status bundle.
    #[arg(long, env = "BRIDGE_DEVICE_ID", default_value = "host-audio-bridge")]
    pub device_id: String,

    /// Periodic status broadcast interval, in milliseconds (0 disables).
    #[arg(long, default_value_t = 2000)]
    pub status_broadcast_interval_ms: u64,

    /// How often to refresh the audio session list from the backend.
    #[arg(long, default_value_t = 1000)]
    pub audio_session_refresh_interval_ms: u64,

    /// Open and own the serial transport at startup.
    #[arg(long, default_value_t = true)]
    pub enable_serial: bool,

    /// Use the binary escaped+CRC framing. When false, falls back to
    /// line-delimited text framing (no escaping, no CRC).
    #[arg(long, default_value_t = true)]
    pub enable_binary_protocol: bool,

    #[command(flatten)]
    pub serial: SerialConfig,

    #[command(flatten)]
    pub audio: AudioConfig,

    #[command(flatten)]
    pub logging: LoggingConfig,

    /// Stats summary emission interval in seconds (0 = disabled).
    #[arg(long, default_value_t = 30)]
    pub stats_interval_secs: u64,
}

#[derive(Args, Debug, Clone)]
pub struct SerialConfig {
    /// OS device path of the serial port (e.g. /dev/ttyUSB0, COM3).
    #[arg(long = "serial-port-name", env = "BRIDGE_SERIAL_PORT", default_value = "/dev/ttyUSB0")]
    pub port_name: String,

    #[arg(long = "serial-baud-rate", default_value_t = 115_200)]
    pub baud_rate: u32,

    #[arg(long = "serial-data-bits", default_value_t = 8)]
    pub data_bits: u8,

    /// One of "none", "odd", "even".
    #[arg(long = "serial-parity", default_value = "none")]
    pub parity: String,

    #[arg(long = "serial-stop-bits", default_value_t = 1)]
    pub stop_bits: u8,

    #[arg(long = "serial-read-timeout-ms", default_value_t = 1000)]
    pub read_timeout_ms: u64,

    /// Carried through from spec §6's config surface but not applied:
    /// `tokio-serial`'s `SerialStream` exposes a single `.timeout(...)`
    /// (consulted by the underlying blocking-read emulation), not a
    /// separate write-side timeout — writes on an async stream don't
    /// block on absence of data the way reads do. Same treatment as
    /// `audio_session_refresh_interval_ms`.
    #[arg(long = "serial-write-timeout-ms", default_value_t = 1000)]
    pub write_timeout_ms: u64,

    #[arg(long = "serial-auto-reconnect", default_value_t = true)]
    pub enable_auto_reconnect: bool,

    #[arg(long = "serial-reconnect-delay-ms", default_value_t = 1000)]
    pub reconnect_delay_ms: u64,
}

#[derive(Args, Debug, Clone)]
pub struct AudioConfig {
    #[arg(long = "audio-include-all-devices", default_value_t = false)]
    pub include_all_devices: bool,

    #[arg(long = "audio-include-capture-devices", default_value_t = false)]
    pub include_capture_devices: bool,

    /// One of "render", "capture", "both".
    #[arg(long = "audio-data-flow", default_value = "render")]
    pub data_flow: String,

    /// One of "console", "multimedia", "communications".
    #[arg(long = "audio-device-role", default_value = "multimedia")]
    pub device_role: String,

    /// Substrings, or regex patterns when `use_regex_filtering` is set.
    #[arg(long = "audio-process-name-filter")]
    pub process_name_filters: Vec<String>,

    #[arg(long = "audio-use-regex-filtering", default_value_t = false)]
    pub use_regex_filtering: bool,

    #[arg(long = "audio-detailed-logging", default_value_t = false)]
    pub enable_detailed_logging: bool,
}

#[derive(Args, Debug, Clone)]
pub struct LoggingConfig {
    /// `tracing` `EnvFilter` directive (e.g. "info", "bridge=debug").
    #[arg(long = "log-level", env = "RUST_LOG", default_value = "info")]
    pub level: String,

    #[arg(long = "log-console", default_value_t = true)]
    pub console: bool,

    /// Optional log file path; when unset, file logging is disabled
    /// (rotation/sink ownership is out of scope for this core — see
    /// spec.md §1).
    #[arg(long = "log-file")]
    pub file: Option<String>,

    /// One of "never", "daily", "hourly" — interpreted by whatever log
    /// sink the caller wires in, not by this crate.
    #[arg(long = "log-rotation", default_value = "never")]
    pub rotation: String,
}

impl Config {
    pub fn resolved_data_flow(&self) -> crate::message::DataFlow {
        match self.audio.data_flow.as_str() {
            "capture" => crate::message::DataFlow::Capture,
            "both" => crate::message::DataFlow::Both,
            _ => crate::message::DataFlow::Render,
        }
    }

    pub fn resolved_device_role(&self) -> crate::message::DeviceRole {
        match self.audio.device_role.as_str() {
            "console" => crate::message::DeviceRole::Console,
            "communications" => crate::message::DeviceRole::Communications,
            _ => crate::message::DeviceRole::Multimedia,
        }
    }

    /// Reject configuration values that don't resolve to anything
    /// meaningful, before any task is spawned (spec §7: "only start-up
    /// configuration errors are fatal").
    pub fn validate(&self) -> Result<(), crate::error::BridgeError> {
        match self.audio.data_flow.as_str() {
            "render" | "capture" | "both" => {}
            other => return Err(crate::error::BridgeError::Config(format!("unknown audio.data_flow {other:?} — expected render|capture|both"))),
        }
        match self.audio.device_role.as_str() {
            "console" | "multimedia" | "communications" => {}
            other => return Err(crate::error::BridgeError::Config(format!("unknown audio.device_role {other:?} — expected console|multimedia|communications"))),
        }
        match self.serial.parity.as_str() {
            "none" | "odd" | "even" => {}
            other => return Err(crate::error::BridgeError::Config(format!("unknown serial.parity {other:?} — expected none|odd|even"))),
        }
        if !matches!(self.serial.data_bits, 5..=8) {
            return Err(crate::error::BridgeError::Config(format!("serial.data_bits {} out of range 5..=8", self.serial.data_bits)));
        }
        if !matches!(self.serial.stop_bits, 1..=2) {
            return Err(crate::error::BridgeError::Config(format!("serial.stop_bits {} out of range 1..=2", self.serial.stop_bits)));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_parse_with_no_args() {
        let config = Config::parse_from(["bridge"]);
        assert_eq!(config.device_id, "host-audio-bridge");
        assert_eq!(config.serial.baud_rate, 115_200);
        assert!(config.enable_binary_protocol);
    }

    #[test]
    fn defaults_validate_cleanly() {
        let config = Config::parse_from(["bridge"]);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validate_rejects_unknown_data_flow() {
        let mut config = Config::parse_from(["bridge"]);
        config.audio.data_flow = "surround".into();
        assert!(matches!(config.validate(), Err(crate::error::BridgeError::Config(_))));
    }

    #[test]
    fn validate_rejects_unknown_parity() {
        let mut config = Config::parse_from(["bridge"]);
        config.serial.parity = "mark".into();
        assert!(matches!(config.validate(), Err(crate::error::BridgeError::Config(_))));
    }

    #[test]
    fn validate_rejects_out_of_range_stop_bits() {
        let mut config = Config::parse_from(["bridge"]);
        config.serial.stop_bits = 3;
        assert!(matches!(config.validate(), Err(crate::error::BridgeError::Config(_))));
    }

    #[test]
    fn data_flow_and_role_resolve_from_strings() {
        let mut config = Config::parse_from(["bridge"]);
        config.audio.data_flow = "capture".into();
        config.audio.device_role = "console".into();
        assert_eq!(config.resolved_data_flow(), crate::message::DataFlow::Capture);
        assert_eq!(config.resolved_device_role(), crate::message::DeviceRole::Console);
    }
}
