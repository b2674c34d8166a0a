//! Core byte-in, lines-out engine
//!
//! The engine owns the full inbound path: raw bytes are routed either into
//! the binary capture buffer (while a transfer is mid-flight) or into the
//! line framer, and every completed frame is dispatched to exactly one
//! reply. Transports stay dumb; they feed bytes in and write the returned
//! lines out.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{error, warn};

use crate::binary::BinaryEvent;
use crate::command::dispatcher::Dispatcher;
use crate::command::registry::HandlerRegistry;
use crate::config::DeviceConfig;
use crate::error::EngineError;
use crate::framing::{FrameEvent, FrameReader};
use crate::hal::DeviceBackend;
use crate::response::{encode_error, encode_reply, Reply, Response};

/// Uptime and traffic counters shared with the system handlers
#[derive(Debug)]
pub struct EngineStats {
    started: std::time::Instant,
    packets: AtomicU64,
}

impl EngineStats {
    pub fn new() -> Self {
        Self {
            started: std::time::Instant::now(),
            packets: AtomicU64::new(0),
        }
    }

    /// Count one dispatched frame
    pub fn record_packet(&self) {
        self.packets.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_count(&self) -> u64 {
        self.packets.load(Ordering::Relaxed)
    }

    /// Milliseconds since the engine came up
    pub fn uptime_ms(&self) -> u64 {
        self.started.elapsed().as_millis() as u64
    }
}

impl Default for EngineStats {
    fn default() -> Self {
        Self::new()
    }
}

/// The device-side command engine
pub struct Engine {
    reader: FrameReader,
    dispatcher: Dispatcher,
    stats: Arc<EngineStats>,
    flush_on_idle: bool,
    flush_timeout: Duration,
}

impl Engine {
    pub fn new(
        config: &DeviceConfig,
        registry: Arc<HandlerRegistry>,
        backend: Arc<dyn DeviceBackend>,
        stats: Arc<EngineStats>,
    ) -> Self {
        Self {
            reader: FrameReader::new(config.buffer_size),
            dispatcher: Dispatcher::new(
                registry,
                backend,
                stats.clone(),
                config.binary_buffer_size,
                config.fs_root.clone(),
            ),
            stats,
            flush_on_idle: config.flush_on_idle,
            flush_timeout: config.flush_timeout,
        }
    }

    /// Whether a `reboot` command has been acknowledged
    pub fn reboot_requested(&self) -> bool {
        self.dispatcher.reboot_requested()
    }

    /// Consume a chunk of inbound bytes and return the reply lines to send.
    ///
    /// While a binary transfer is still capturing, bytes are diverted into
    /// its buffer instead of the framer. Once the expected count has been
    /// captured, the remaining bytes flow back into line framing so the
    /// closing `binary_end` command can be parsed.
    pub async fn feed(&mut self, data: &[u8], now: Instant) -> Vec<String> {
        let mut out = Vec::new();
        let mut offset = 0;

        while offset < data.len() {
            if self.dispatcher.binary().is_capturing() {
                let (consumed, event) = self.dispatcher.binary_mut().feed(&data[offset..]);
                offset += consumed;
                if let Some(BinaryEvent::Complete { size }) = event {
                    push_reply(&mut out, Reply::Response(Response::BinaryReceived { size }));
                }
            } else {
                let byte = data[offset];
                offset += 1;
                if let Some(event) = self.reader.push(byte, now) {
                    self.handle_frame_event(event, &mut out).await;
                }
            }
        }

        out
    }

    /// Flush a stalled partial frame as a complete command.
    ///
    /// No-op unless idle flushing is enabled and the inactivity window has
    /// elapsed since the last inbound byte.
    pub async fn check_flush(&mut self, now: Instant) -> Vec<String> {
        let mut out = Vec::new();
        if !self.flush_on_idle || self.dispatcher.binary().is_capturing() {
            return out;
        }
        if let Some(frame) = self.reader.check_flush(now, self.flush_timeout) {
            self.handle_frame_event(FrameEvent::Frame(frame), &mut out)
                .await;
        }
        out
    }

    async fn handle_frame_event(&mut self, event: FrameEvent, out: &mut Vec<String>) {
        match event {
            FrameEvent::Frame(frame) => match self.dispatcher.dispatch_frame(&frame).await {
                Ok(reply) => push_reply(out, reply),
                Err(e) => {
                    if e.is_caller_error() {
                        warn!("command rejected: {e}");
                    } else {
                        error!("command failed: {e}");
                    }
                    out.push(encode_error(&e, self.stats.uptime_ms()));
                }
            },
            FrameEvent::Overflow => {
                warn!("inbound frame exceeded buffer capacity");
                out.push(encode_error(&EngineError::BufferOverflow, self.stats.uptime_ms()));
            }
        }
    }
}

fn push_reply(out: &mut Vec<String>, reply: Reply) {
    if let Some(line) = encode_reply(&reply) {
        out.push(line);
    }
}
