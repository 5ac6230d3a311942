//! Fatal startup/config/IO error types. Anything that reaches `main`'s
//! `anyhow::Result` return path is wrapped through here; everything
//! else (per-frame, per-message failures) is handled inline as a
//! counter increment and a log line (spec §7).

use thiserror::Error;

#[derive(Debug, Error)]
pub enum BridgeError {
    #[error("failed to open serial port {path}: {source}")]
    SerialOpen { path: String, #[source] source: std::io::Error },

    #[error("invalid configuration: {0}")]
    Config(String),
}
