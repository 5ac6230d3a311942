//! Out-of-band crash-signature sniffer (C7).
//!
//! The controller's firmware crash dump is plain text that rides the
//! same wire as the framed protocol, bracketed by a recognizable banner
//! and a trailing marker. This module scans raw inbound bytes for that
//! bracket, independently of frame decoding, and trips a one-way
//! quarantine flag the first time it's seen (spec §4.7/§9: a crash dump
//! decoder is an external collaborator; this crate only detects and
//! gates).
//!
//! Grounded on `persona.rs`'s `Arc<RwLock<T>>` shared-state idiom,
//! narrowed here to an `AtomicBool` since the only transition is
//! false -> true.

use crate::event_sink::{Category, EventSink, Level};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

const CRASH_BANNER: &str = "Guru Meditation Error";
const CRASH_TRAILER: &str = "ELF file SHA256:";

/// Invoked exactly once, with the accumulated raw crash-dump text,
/// when the trailing frame marker is observed (spec §4.7). Actual
/// decoding of the dump is an external collaborator (spec §1); this
/// crate only detects the bracket and fires the hook.
pub type DecodeAndExit = Box<dyn Fn(&str) + Send + Sync>;

/// Tracks whether a crash signature has been seen on this link. Once
/// tripped, stays tripped until the owning transport is torn down and
/// rebuilt (spec §4.7: "one-way for the life of the connection").
#[derive(Default)]
pub struct CrashSniffer {
    quarantined: AtomicBool,
    carry: std::sync::Mutex<String>,
    on_crash: std::sync::Mutex<Option<DecodeAndExit>>,
}

impl std::fmt::Debug for CrashSniffer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CrashSniffer").field("quarantined", &self.is_quarantined()).finish()
    }
}

impl CrashSniffer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self { quarantined: AtomicBool::new(false), carry: std::sync::Mutex::new(String::new()), on_crash: std::sync::Mutex::new(None) })
    }

    /// Install (or replace) the "decode and exit" callback fired once
    /// the trailing marker is seen. Must be set before `scan` is first
    /// called from the reader loop to take effect for this link's crash.
    pub fn set_decode_and_exit(&self, callback: DecodeAndExit) {
        *self.on_crash.lock().unwrap() = Some(callback);
    }

    pub fn is_quarantined(&self) -> bool {
        self.quarantined.load(Ordering::Acquire)
    }

    /// Scan a chunk of raw inbound bytes. Returns `true` the instant the
    /// full banner...trailer bracket is observed, possibly split across
    /// calls (a crash dump can arrive over many reads).
    ///
    /// Non-UTF8 bytes are replaced lossily — the banner and trailer are
    /// both plain ASCII, so this never affects detection.
    pub fn scan(&self, bytes: &[u8], sink: &dyn EventSink) -> bool {
        if self.is_quarantined() {
            return true;
        }

        let mut carry = self.carry.lock().unwrap();
        carry.push_str(&String::from_utf8_lossy(bytes));

        // Bound the carry buffer so a link that never emits the pair
        // doesn't grow this unbounded.
        const MAX_CARRY: usize = 8192;
        if carry.len() > MAX_CARRY {
            let trim_at = carry.len() - MAX_CARRY;
            *carry = carry[trim_at..].to_string();
        }

        if let Some(banner_at) = carry.find(CRASH_BANNER) {
            if carry[banner_at..].contains(CRASH_TRAILER) {
                let dump = carry.clone();
                drop(carry);
                if !self.quarantined.swap(true, Ordering::AcqRel) {
                    sink.emit(Level::Error, Category::Incoming, "crash signature detected — link quarantined", &[]);
                    if let Some(callback) = self.on_crash.lock().unwrap().as_ref() {
                        callback(&dump);
                    }
                }
                return true;
            }
        }
        false
    }
}
