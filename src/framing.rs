//! Line framing for the inbound byte stream
//!
//! Commands arrive as UTF-8 text terminated by `\n` or `\r`. The stream has
//! no OS-provided framing, so the reader accumulates bytes into a
//! fixed-capacity buffer and emits a frame per terminator. A partial frame
//! that goes quiet for longer than the inactivity window may also be flushed
//! as a complete frame (see [`crate::config::DeviceConfig::flush_on_idle`]).

use bytes::BytesMut;
use tokio::time::Instant;

/// Events produced while consuming inbound bytes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FrameEvent {
    /// One complete command frame (terminator not included)
    Frame(Vec<u8>),
    /// The in-flight partial frame exceeded capacity and was dropped
    Overflow,
}

/// Accumulates raw bytes into discrete command frames
#[derive(Debug)]
pub struct FrameReader {
    buffer: BytesMut,
    capacity: usize,
    last_byte_at: Option<Instant>,
}

impl FrameReader {
    /// Create a reader with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            last_byte_at: None,
        }
    }

    /// Number of bytes currently accumulated
    pub fn pending(&self) -> usize {
        self.buffer.len()
    }

    /// Consume a chunk of inbound bytes, emitting zero or more events.
    ///
    /// A terminator emits the accumulated buffer as a frame if it is
    /// non-empty. A byte that would exceed capacity emits [`FrameEvent::Overflow`]
    /// and resets the buffer; the byte itself is discarded with the frame.
    pub fn feed(&mut self, data: &[u8], now: Instant) -> Vec<FrameEvent> {
        data.iter()
            .filter_map(|&byte| self.push(byte, now))
            .collect()
    }

    /// Consume a single inbound byte (see [`FrameReader::feed`])
    pub fn push(&mut self, byte: u8, now: Instant) -> Option<FrameEvent> {
        if byte == b'\n' || byte == b'\r' {
            if self.buffer.is_empty() {
                None
            } else {
                Some(FrameEvent::Frame(self.take_frame()))
            }
        } else if self.buffer.len() < self.capacity {
            self.buffer.extend_from_slice(&[byte]);
            self.last_byte_at = Some(now);
            None
        } else {
            self.buffer.clear();
            Some(FrameEvent::Overflow)
        }
    }

    /// Flush the partial frame if the stream has been idle past `window`.
    ///
    /// Returns the stalled frame, treating a dropped terminator as an
    /// implicit end of command.
    pub fn check_flush(&mut self, now: Instant, window: std::time::Duration) -> Option<Vec<u8>> {
        if self.buffer.is_empty() {
            return None;
        }
        let last = self.last_byte_at?;
        if now.duration_since(last) > window {
            Some(self.take_frame())
        } else {
            None
        }
    }

    /// Drop any accumulated bytes
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.last_byte_at = None;
    }

    fn take_frame(&mut self) -> Vec<u8> {
        self.buffer.split().freeze().to_vec()
    }
}
