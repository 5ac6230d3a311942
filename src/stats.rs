//! Statistics counter (C4).
//!
//! Monotonic, independently-incrementable counters shared between the
//! transport adapter's reader task and its statistics-emission task.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Stats {
    pub frames_sent: AtomicU64,
    pub frames_received: AtomicU64,
    pub bytes_in: AtomicU64,
    pub bytes_out: AtomicU64,
    pub crc_errors: AtomicU64,
    pub framing_errors: AtomicU64,
    pub overflow_errors: AtomicU64,
    pub timeout_errors: AtomicU64,
}

impl Stats {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    #[inline(always)]
    pub fn record_bytes_in(&self, n: usize) {
        self.bytes_in.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_bytes_out(&self, n: usize) {
        self.bytes_out.fetch_add(n as u64, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_frame_received(&self) {
        self.frames_received.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_crc_error(&self) {
        self.crc_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_framing_error(&self) {
        self.framing_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_overflow_error(&self) {
        self.overflow_errors.fetch_add(1, Ordering::Relaxed);
    }

    #[inline(always)]
    pub fn record_timeout_error(&self) {
        self.timeout_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Consistent (monotonic, not cross-counter-atomic) read of all counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_received: self.frames_received.load(Ordering::Relaxed),
            bytes_in: self.bytes_in.load(Ordering::Relaxed),
            bytes_out: self.bytes_out.load(Ordering::Relaxed),
            crc_errors: self.crc_errors.load(Ordering::Relaxed),
            framing_errors: self.framing_errors.load(Ordering::Relaxed),
            overflow_errors: self.overflow_errors.load(Ordering::Relaxed),
            timeout_errors: self.timeout_errors.load(Ordering::Relaxed),
        }
    }

    /// One-line human-readable summary for the event sink's service stream.
    pub fn summary(&self) -> String {
        let s = self.snapshot();
        format!(
            "frames: sent={} recv={} | bytes: in={} out={} | errors: crc={} framing={} overflow={} timeout={}",
            s.frames_sent,
            s.frames_received,
            s.bytes_in,
            s.bytes_out,
            s.crc_errors,
            s.framing_errors,
            s.overflow_errors,
            s.timeout_errors
        )
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct StatsSnapshot {
    pub frames_sent: u64,
    pub frames_received: u64,
    pub bytes_in: u64,
    pub bytes_out: u64,
    pub crc_errors: u64,
    pub framing_errors: u64,
    pub overflow_errors: u64,
    pub timeout_errors: u64,
}

/// Background stats reporter task. Mirrors the teacher's periodic
/// stats-reporter task shape (`stats::stats_reporter` in the teacher).
pub async fn stats_reporter(
    stats: Arc<Stats>,
    sink: Arc<dyn crate::event_sink::EventSink>,
    interval_secs: u64,
) {
    if interval_secs == 0 {
        // Stats disabled — park forever
        std::future::pending::<()>().await;
        return;
    }

    let interval = std::time::Duration::from_secs(interval_secs);
    loop {
        tokio::time::sleep(interval).await;
        sink.emit(
            crate::event_sink::Level::Info,
            crate::event_sink::Category::Service,
            &stats.summary(),
            &[],
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_start_at_zero() {
        let stats = Stats::new();
        let s = stats.snapshot();
        assert_eq!(s.frames_received, 0);
        assert_eq!(s.crc_errors, 0);
    }

    #[test]
    fn increments_are_independent() {
        let stats = Stats::new();
        stats.record_frame_received();
        stats.record_crc_error();
        stats.record_crc_error();
        let s = stats.snapshot();
        assert_eq!(s.frames_received, 1);
        assert_eq!(s.crc_errors, 2);
        assert_eq!(s.framing_errors, 0);
    }

    #[test]
    fn concurrent_increments_are_all_counted() {
        use std::thread;
        let stats = Stats::new();
        let mut handles = Vec::new();
        for _ in 0..8 {
            let stats = stats.clone();
            handles.push(thread::spawn(move || {
                for _ in 0..1000 {
                    stats.record_frame_received();
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(stats.snapshot().frames_received, 8000);
    }
}
