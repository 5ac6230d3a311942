//! Event sink (C12).
//!
//! A level-tagged sink with categorized streams. Rotation, retention and
//! file layout are out of scope here (spec §4.12) — this is a narrow
//! capability interface over `tracing`, matching the teacher's existing
//! `tracing_subscriber` bootstrap in `main.rs`.

use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Category {
    /// Lifecycle events (connect/disconnect, startup, reconnect).
    Service,
    /// One event per accepted payload.
    Incoming,
    /// One event per emitted frame.
    Outgoing,
    /// Hex-or-ASCII dumps of raw byte buffers.
    Binary,
}

impl Category {
    fn target(self) -> &'static str {
        match self {
            Category::Service => "bridge::service",
            Category::Incoming => "bridge::incoming",
            Category::Outgoing => "bridge::outgoing",
            Category::Binary => "bridge::binary",
        }
    }
}

/// A single structured field (`key=value`) attached to an emitted event.
pub struct Field<'a>(pub &'a str, pub &'a str);

pub trait EventSink: Send + Sync {
    fn emit(&self, level: Level, category: Category, message: &str, fields: &[Field]);
}

/// Default sink: forwards every event to `tracing` under a
/// per-category target so downstream subscribers can filter per stream.
pub struct TracingEventSink;

impl TracingEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl Default for TracingEventSink {
    fn default() -> Self {
        Self::new()
    }
}

impl EventSink for TracingEventSink {
    fn emit(&self, level: Level, category: Category, message: &str, fields: &[Field]) {
        let target = category.target();
        let joined: String = fields.iter().map(|f| format!(" {}={}", f.0, f.1)).collect();
        let line = format!("{message}{joined}");
        match level {
            Level::Debug => debug!(target: "bridge", category = target, "{}", line),
            Level::Info => info!(target: "bridge", category = target, "{}", line),
            Level::Warn => warn!(target: "bridge", category = target, "{}", line),
            Level::Error => error!(target: "bridge", category = target, "{}", line),
        }
    }
}

/// Render a byte buffer as a hex-or-ASCII dump for the binary stream.
pub fn hex_dump(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| if b.is_ascii_graphic() { format!("{}", *b as char) } else { format!("\\x{b:02x}") })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hex_dump_renders_printable_and_escapes_others() {
        let dump = hex_dump(&[b'h', b'i', 0x00, 0x7e]);
        assert_eq!(dump, "hi\\x00\\x7e");
    }

    #[test]
    fn category_targets_are_distinct() {
        let targets = [Category::Service.target(), Category::Incoming.target(), Category::Outgoing.target(), Category::Binary.target()];
        for i in 0..targets.len() {
            for j in (i + 1)..targets.len() {
                assert_ne!(targets[i], targets[j]);
            }
        }
    }
}
