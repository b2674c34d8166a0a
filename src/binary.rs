//! Raw binary transfer mode
//!
//! While a transfer is capturing, inbound bytes bypass line framing entirely
//! and land in a fixed-size capture buffer. The peer announces the payload
//! size with `binary_start`, streams exactly that many raw bytes, then
//! retrieves them with `binary_end`. Reaching the expected count stops the
//! capture but does not exit binary mode; the engine routes later bytes back
//! to line framing so the `binary_end` command can arrive.

use bytes::BytesMut;

use crate::error::EngineError;

/// Events produced while capturing binary data
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BinaryEvent {
    /// The expected byte count has been reached
    Complete { size: usize },
}

/// Fixed-size out-of-band byte capture
#[derive(Debug)]
pub struct BinaryTransfer {
    active: bool,
    buffer: BytesMut,
    capacity: usize,
    expected: usize,
}

impl BinaryTransfer {
    /// Create an inactive transfer engine with the given buffer capacity
    pub fn new(capacity: usize) -> Self {
        Self {
            active: false,
            buffer: BytesMut::with_capacity(capacity),
            capacity,
            expected: 0,
        }
    }

    /// Whether a transfer session is open (`binary_start` without `binary_end`)
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Whether inbound bytes should currently be diverted into the capture
    pub fn is_capturing(&self) -> bool {
        self.active && self.buffer.len() < self.expected
    }

    /// Bytes captured so far
    pub fn received(&self) -> usize {
        self.buffer.len()
    }

    /// Begin a transfer of exactly `size` bytes
    pub fn start(&mut self, size: usize) -> Result<usize, EngineError> {
        if size == 0 || size > self.capacity {
            return Err(EngineError::Validation(format!(
                "Invalid size: {} (max {})",
                size, self.capacity
            )));
        }

        self.active = true;
        self.expected = size;
        self.buffer.clear();
        Ok(size)
    }

    /// Store inbound bytes up to the expected count.
    ///
    /// Returns how many bytes were consumed and a completion event on the
    /// feed that reaches the expected count. Bytes past `expected` are never
    /// written; the caller routes them elsewhere.
    pub fn feed(&mut self, data: &[u8]) -> (usize, Option<BinaryEvent>) {
        if !self.is_capturing() {
            return (0, None);
        }

        let room = self.expected - self.buffer.len();
        let take = data.len().min(room);
        self.buffer.extend_from_slice(&data[..take]);

        let event = if self.buffer.len() >= self.expected {
            Some(BinaryEvent::Complete {
                size: self.buffer.len(),
            })
        } else {
            None
        };
        (take, event)
    }

    /// End the transfer, returning the captured bytes.
    ///
    /// The capture may be shorter than `expected` if the caller ends early.
    pub fn end(&mut self) -> Result<Vec<u8>, EngineError> {
        if !self.active {
            return Err(EngineError::InvalidState("Not in binary mode".into()));
        }

        let data = self.buffer.split().freeze().to_vec();
        self.active = false;
        self.expected = 0;
        Ok(data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_start_validates_size() {
        let mut transfer = BinaryTransfer::new(16);

        assert!(matches!(transfer.start(0), Err(EngineError::Validation(_))));
        assert!(matches!(transfer.start(17), Err(EngineError::Validation(_))));
        assert_eq!(transfer.start(16).expect("in-range size"), 16);
        assert!(transfer.is_active());
        assert!(transfer.is_capturing());
    }

    #[test]
    fn test_capture_exact_payload() {
        let mut transfer = BinaryTransfer::new(16);
        transfer.start(4).expect("start");

        assert_eq!(transfer.feed(&[1, 2]), (2, None));
        assert_eq!(
            transfer.feed(&[3, 4]),
            (2, Some(BinaryEvent::Complete { size: 4 }))
        );
        assert!(transfer.is_active());
        assert!(!transfer.is_capturing());

        let data = transfer.end().expect("end");
        assert_eq!(data, vec![1, 2, 3, 4]);
        assert!(!transfer.is_active());
    }

    #[test]
    fn test_excess_bytes_are_not_buffered() {
        let mut transfer = BinaryTransfer::new(16);
        transfer.start(3).expect("start");

        let (consumed, event) = transfer.feed(&[9, 9, 9, 7, 7]);
        assert_eq!(consumed, 3);
        assert_eq!(event, Some(BinaryEvent::Complete { size: 3 }));

        // Once complete the capture consumes nothing further
        assert_eq!(transfer.feed(&[5]), (0, None));
        assert_eq!(transfer.received(), 3);

        assert_eq!(transfer.end().expect("end"), vec![9, 9, 9]);
    }

    #[test]
    fn test_end_early_returns_short_capture() {
        let mut transfer = BinaryTransfer::new(16);
        transfer.start(10).expect("start");
        transfer.feed(&[1, 2, 3]);

        assert_eq!(transfer.end().expect("end"), vec![1, 2, 3]);
    }

    #[test]
    fn test_end_without_start_is_invalid() {
        let mut transfer = BinaryTransfer::new(16);
        assert!(matches!(transfer.end(), Err(EngineError::InvalidState(_))));
    }

    #[test]
    fn test_restart_clears_previous_capture() {
        let mut transfer = BinaryTransfer::new(16);
        transfer.start(2).expect("start");
        transfer.feed(&[1, 2]);
        transfer.end().expect("end");

        transfer.start(2).expect("restart");
        assert_eq!(transfer.received(), 0);
    }
}
