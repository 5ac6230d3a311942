//! Receive state machine (C3).
//!
//! A pure byte-by-byte consumer: `process(bytes) -> Vec<payload>`. Never
//! blocks, never returns an `Err` to its caller — every failure mode is a
//! counter increment plus an internal reset (spec §4.3/§7).

use crate::frame::{END_MARKER, ESCAPE_MARKER, ESCAPE_XOR_MASK, HEADER_SIZE, MAX_PAYLOAD, START_MARKER, TAG_TEXTUAL_DOCUMENT};
use crate::stats::Stats;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Inter-frame timeout: first-byte-of-frame to end-marker.
pub const FRAME_TIMEOUT: Duration = Duration::from_millis(1000);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    WaitingForStart,
    ReadingHeader,
    ReadingPayload,
}

/// Byte-oriented receiver for the binary, escaped, CRC-checked framing
/// described in spec §4.3. One instance per serial port; owned
/// exclusively by the transport adapter (C6).
pub struct ReceiveState {
    state: State,
    header_buf: Vec<u8>,
    payload_buf: Vec<u8>,
    expected_len: u32,
    expected_crc: u16,
    tag: u8,
    escape_next: bool,
    message_start: Option<Instant>,
    stats: Arc<Stats>,
}

impl ReceiveState {
    pub fn new(stats: Arc<Stats>) -> Self {
        Self {
            state: State::WaitingForStart,
            header_buf: Vec::with_capacity(HEADER_SIZE),
            payload_buf: Vec::with_capacity(256),
            expected_len: 0,
            expected_crc: 0,
            tag: 0,
            escape_next: false,
            message_start: None,
            stats,
        }
    }

    /// Reset to `WaitingForStart`, clearing all buffers and flags.
    fn reset(&mut self) {
        self.state = State::WaitingForStart;
        self.header_buf.clear();
        self.payload_buf.clear();
        self.escape_next = false;
        self.message_start = None;
    }

    /// Consume `bytes`, returning every payload that completed decoding.
    pub fn process(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for &b in bytes {
            self.check_timeout();
            self.consume_byte(b, &mut out);
        }
        out
    }

    fn check_timeout(&mut self) {
        if self.state == State::WaitingForStart {
            return;
        }
        if let Some(start) = self.message_start {
            if start.elapsed() > FRAME_TIMEOUT {
                self.stats.record_timeout_error();
                self.reset();
            }
        }
    }

    fn consume_byte(&mut self, b: u8, out: &mut Vec<Vec<u8>>) {
        match self.state {
            State::WaitingForStart => {
                if b == START_MARKER {
                    self.reset();
                    self.message_start = Some(Instant::now());
                    self.state = State::ReadingHeader;
                }
            }
            State::ReadingHeader => {
                self.header_buf.push(b);
                if self.header_buf.len() == HEADER_SIZE {
                    self.finish_header();
                }
            }
            State::ReadingPayload => {
                if self.escape_next {
                    self.payload_buf.push(b ^ ESCAPE_XOR_MASK);
                    self.escape_next = false;
                } else if b == ESCAPE_MARKER {
                    self.escape_next = true;
                } else if b == END_MARKER {
                    self.finalize(out);
                    return;
                } else {
                    self.payload_buf.push(b);
                }

                if self.state == State::ReadingPayload && self.payload_buf.len() > self.expected_len as usize {
                    self.stats.record_overflow_error();
                    self.reset();
                }
            }
        }
    }

    fn finish_header(&mut self) {
        let len = u32::from_le_bytes([self.header_buf[0], self.header_buf[1], self.header_buf[2], self.header_buf[3]]);
        let crc_val = u16::from_le_bytes([self.header_buf[4], self.header_buf[5]]);
        let tag = self.header_buf[6];

        if len as usize > MAX_PAYLOAD {
            self.stats.record_overflow_error();
            self.reset();
            return;
        }

        self.expected_len = len;
        self.expected_crc = crc_val;
        self.tag = tag;
        self.header_buf.clear();
        self.state = State::ReadingPayload;
    }

    fn finalize(&mut self, out: &mut Vec<Vec<u8>>) {
        if self.payload_buf.len() != self.expected_len as usize {
            self.stats.record_framing_error();
            self.reset();
            return;
        }
        if self.tag != TAG_TEXTUAL_DOCUMENT {
            self.stats.record_framing_error();
            self.reset();
            return;
        }
        if crate::crc::crc(&self.payload_buf) != self.expected_crc {
            self.stats.record_crc_error();
            self.reset();
            return;
        }

        self.stats.record_frame_received();
        out.push(std::mem::take(&mut self.payload_buf));
        self.reset();
    }
}

/// Sibling text-mode framing (spec §6 "Sibling text-mode framing",
/// used when `enableBinaryProtocol=false`): each payload is followed by
/// a single `\n`, with no escape layer and no CRC. Shares C3's
/// `process(bytes) -> Vec<payload>` signature so the transport adapter
/// can pick either state machine at startup without branching its
/// reader loop.
#[derive(Debug, Default)]
pub struct LineReceiver {
    buf: Vec<u8>,
}

impl LineReceiver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn process(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        let mut out = Vec::new();
        for &b in bytes {
            if b == b'\n' {
                out.push(std::mem::take(&mut self.buf));
            } else {
                self.buf.push(b);
            }
        }
        out
    }
}

/// Picks between the binary (escaped + CRC) receiver and the sibling
/// text-mode line receiver at startup (spec §6), so the transport
/// adapter's reader loop calls a single `process` regardless of which
/// wire mode `enableBinaryProtocol` selected.
pub enum FrameReceiver {
    Binary(ReceiveState),
    Line(LineReceiver),
}

impl FrameReceiver {
    pub fn new(binary_protocol: bool, stats: Arc<Stats>) -> Self {
        if binary_protocol {
            FrameReceiver::Binary(ReceiveState::new(stats))
        } else {
            FrameReceiver::Line(LineReceiver::new())
        }
    }

    pub fn process(&mut self, bytes: &[u8]) -> Vec<Vec<u8>> {
        match self {
            FrameReceiver::Binary(r) => r.process(bytes),
            FrameReceiver::Line(r) => r.process(bytes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::encode;

    fn fresh() -> (ReceiveState, Arc<Stats>) {
        let stats = Stats::new();
        (ReceiveState::new(stats.clone()), stats)
    }

    // P1: round-trip law.
    #[test]
    fn round_trip_law() {
        for len in [1usize, 2, 10, 255, 4096] {
            let payload: Vec<u8> = (0..len).map(|i| (i % 256) as u8).collect();
            let frame = encode(&payload).unwrap();
            let (mut rx, _stats) = fresh();
            let out = rx.process(&frame);
            assert_eq!(out.len(), 1);
            assert_eq!(out[0], payload);
        }
    }

    // P3 / S2: CRC rejection.
    #[test]
    fn crc_mismatch_is_rejected_and_counted() {
        let payload = b"ping".to_vec();
        let mut frame = encode(&payload).unwrap();
        // Flip the low bit of the second CRC byte (offset 6 in the frame).
        frame[6] ^= 0x01;

        let (mut rx, stats) = fresh();
        let out = rx.process(&frame);
        assert!(out.is_empty());
        assert_eq!(stats.snapshot().crc_errors, 1);

        // Follow with an untouched frame — recovers.
        let good = encode(&payload).unwrap();
        let out2 = rx.process(&good);
        assert_eq!(out2, vec![payload]);
    }

    // P4: garbage-prefix resilience.
    #[test]
    fn garbage_prefix_is_ignored() {
        let payload = b"after garbage".to_vec();
        let frame = encode(&payload).unwrap();
        let mut input = vec![0x00, 0x11, 0x22, 0x33, 0x44];
        // none of these bytes are the start marker
        assert!(!input.contains(&START_MARKER));
        input.extend_from_slice(&frame);

        let (mut rx, _stats) = fresh();
        let out = rx.process(&input);
        assert_eq!(out, vec![payload]);
    }

    // P5: split-delivery equivalence.
    #[test]
    fn split_delivery_matches_single_shot() {
        let payload = b"split me across many small chunks".to_vec();
        let frame = encode(&payload).unwrap();

        let (mut whole, _) = fresh();
        let whole_out = whole.process(&frame);

        let (mut chunked, _) = fresh();
        let mut chunked_out = Vec::new();
        for byte in &frame {
            chunked_out.extend(chunked.process(std::slice::from_ref(byte)));
        }

        assert_eq!(whole_out, chunked_out);
        assert_eq!(whole_out, vec![payload]);
    }

    // P7 / overflow safety: declared length > MAX_PAYLOAD.
    #[test]
    fn declared_length_over_max_is_rejected() {
        let mut frame = vec![START_MARKER];
        frame.extend_from_slice(&((MAX_PAYLOAD as u32) + 1).to_le_bytes());
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.push(TAG_TEXTUAL_DOCUMENT);
        frame.push(END_MARKER);

        let (mut rx, stats) = fresh();
        let out = rx.process(&frame);
        assert!(out.is_empty());
        assert_eq!(stats.snapshot().overflow_errors, 1);

        // Next valid frame still decodes.
        let payload = b"recovered".to_vec();
        let good = encode(&payload).unwrap();
        assert_eq!(rx.process(&good), vec![payload]);
    }

    // Mid-frame overflow: more unescaped bytes than declared length.
    #[test]
    fn mid_frame_overflow_is_rejected() {
        let declared_len: u32 = 2;
        let mut frame = vec![START_MARKER];
        frame.extend_from_slice(&declared_len.to_le_bytes());
        frame.extend_from_slice(&0u16.to_le_bytes());
        frame.push(TAG_TEXTUAL_DOCUMENT);
        frame.extend_from_slice(&[1, 2, 3, 4]); // more than declared_len before any END
        frame.push(END_MARKER);

        let (mut rx, stats) = fresh();
        let out = rx.process(&frame);
        assert!(out.is_empty());
        assert_eq!(stats.snapshot().overflow_errors, 1);
    }

    // S3: escape closure + correct unescape.
    #[test]
    fn escape_closure_round_trips_reserved_bytes() {
        let payload = vec![0xaa, START_MARKER, 0xbb, END_MARKER, 0xcc, ESCAPE_MARKER, 0xdd];
        let frame = encode(&payload).unwrap();
        let (mut rx, _stats) = fresh();
        let out = rx.process(&frame);
        assert_eq!(out, vec![payload]);
    }

    // S1: literal PING_REQUEST scenario.
    #[test]
    fn s1_ping_request_decodes_and_counts() {
        let payload = br#"{"messageType":"PING_REQUEST","requestId":"r1"}"#.to_vec();
        let frame = encode(&payload).unwrap();
        assert_eq!(frame[0], START_MARKER);
        assert_eq!(&frame[1..5], &(payload.len() as u32).to_le_bytes());
        assert_eq!(frame[7], TAG_TEXTUAL_DOCUMENT);
        assert_eq!(*frame.last().unwrap(), END_MARKER);

        let (mut rx, stats) = fresh();
        let out = rx.process(&frame);
        assert_eq!(out, vec![payload]);
        let s = stats.snapshot();
        assert_eq!(s.frames_received, 1);
        assert_eq!(s.crc_errors, 0);
    }

    // P6 / S4: timeout recovery.
    #[test]
    fn timeout_recovery() {
        let (mut rx, stats) = fresh();
        // Partial frame: start + some header bytes, never completed.
        let partial = [START_MARKER, 0x05, 0x00, 0x00, 0x00];
        rx.process(&partial);

        std::thread::sleep(FRAME_TIMEOUT + Duration::from_millis(100));

        let payload = b"Hi!!!".to_vec();
        let frame = encode(&payload).unwrap();
        let out = rx.process(&frame);
        assert_eq!(out, vec![payload]);
        assert_eq!(stats.snapshot().timeout_errors, 1);
    }

    // P8-adjacent sanity: decoder never panics on arbitrary short garbage.
    #[test]
    fn arbitrary_garbage_never_panics() {
        let (mut rx, _stats) = fresh();
        let garbage: Vec<u8> = (0..=255u8).collect();
        let _ = rx.process(&garbage);
    }

    #[test]
    fn line_receiver_splits_on_newline() {
        let mut rx = LineReceiver::new();
        let out = rx.process(b"{\"a\":1}\n{\"b\":2}\n");
        assert_eq!(out, vec![b"{\"a\":1}".to_vec(), b"{\"b\":2}".to_vec()]);
    }

    #[test]
    fn line_receiver_holds_partial_line_across_calls() {
        let mut rx = LineReceiver::new();
        assert!(rx.process(b"partial-").is_empty());
        let out = rx.process(b"line\n");
        assert_eq!(out, vec![b"partial-line".to_vec()]);
    }

    #[test]
    fn frame_receiver_selects_binary_or_line_mode() {
        let stats = Stats::new();
        let mut binary = FrameReceiver::new(true, stats.clone());
        let payload = b"hello".to_vec();
        let frame = encode(&payload).unwrap();
        assert_eq!(binary.process(&frame), vec![payload.clone()]);

        let mut line = FrameReceiver::new(false, stats);
        assert_eq!(line.process(b"hello\n"), vec![payload]);
    }
}
