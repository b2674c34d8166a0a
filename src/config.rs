//! Engine configuration

use std::path::PathBuf;
use std::time::Duration;

/// Which transport the device terminates
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportKind {
    /// TCP listener (development host link)
    Tcp { listen: String },
    /// UART / USB-CDC serial port
    Serial { path: String, baudrate: u32 },
}

/// Configuration for the command engine
#[derive(Debug, Clone)]
pub struct DeviceConfig {
    /// Command buffer capacity in bytes
    pub buffer_size: usize,
    /// Binary capture buffer capacity in bytes
    pub binary_buffer_size: usize,
    /// Inactivity window after which a partial frame is flushed
    pub flush_timeout: Duration,
    /// Whether the inactivity flush is enabled at all.
    ///
    /// When enabled, a stalled unterminated line is submitted as a complete
    /// command after `flush_timeout`. Preserved from the original protocol as
    /// an explicit policy switch.
    pub flush_on_idle: bool,
    /// Root directory for file commands and OTA artifacts
    pub fs_root: PathBuf,
    /// Transport to serve
    pub transport: TransportKind,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            buffer_size: 2048,
            binary_buffer_size: 4096,
            flush_timeout: Duration::from_millis(100),
            flush_on_idle: true,
            fs_root: PathBuf::from("."),
            transport: TransportKind::Tcp {
                listen: "127.0.0.1:7700".into(),
            },
        }
    }
}

impl DeviceConfig {
    /// Build a config from environment variables, falling back to defaults.
    ///
    /// `WEBSERIAL_SERIAL` (with optional `WEBSERIAL_BAUD`) selects the serial
    /// transport; otherwise `WEBSERIAL_LISTEN` selects the TCP listen address.
    pub fn from_env() -> Self {
        let mut config = Self::default();

        if let Ok(root) = std::env::var("WEBSERIAL_ROOT") {
            config.fs_root = PathBuf::from(root);
        }

        if let Ok(port) = std::env::var("WEBSERIAL_SERIAL") {
            let baudrate = std::env::var("WEBSERIAL_BAUD")
                .ok()
                .and_then(|b| b.parse().ok())
                .unwrap_or(115_200);
            config.transport = TransportKind::Serial {
                path: port,
                baudrate,
            };
        } else if let Ok(listen) = std::env::var("WEBSERIAL_LISTEN") {
            config.transport = TransportKind::Tcp { listen };
        }

        config
    }
}
