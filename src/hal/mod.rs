//! Hardware abstraction boundary
//!
//! The engine never touches pins, buses, radios or storage itself; every
//! side effect goes through [`DeviceBackend`]. The trait is the call contract
//! for the platform port (ESP32, emulator, host simulation) and the only
//! thing the default command handlers depend on.

pub mod sim;

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by the platform backend, with a human-readable message
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct BackendError(pub String);

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self(message.into())
    }
}

/// Direction a GPIO pin is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GpioMode {
    Input,
    Output,
}

impl GpioMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            GpioMode::Input => "input",
            GpioMode::Output => "output",
        }
    }
}

/// Snapshot of one GPIO pin
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GpioState {
    pub value: u8,
    pub mode: GpioMode,
}

/// Averaged ADC sample
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdcReading {
    pub raw_value: u16,
    /// Volts against the 3.3V reference
    pub voltage: f64,
}

/// SPI bus pinning and speed for one transfer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpiBusConfig {
    pub mosi: u8,
    pub miso: u8,
    pub sck: u8,
    pub cs: Option<u8>,
    pub baudrate: u32,
}

/// One access point found by a scan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiNetwork {
    pub ssid: String,
    pub bssid: String,
    pub channel: u8,
    pub rssi: i32,
    pub security: String,
    pub hidden: bool,
}

/// Result of a successful association
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WifiConnection {
    pub ssid: String,
    pub ip_address: String,
    pub subnet_mask: String,
    pub gateway: String,
    pub dns: String,
}

/// One directory entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    pub name: String,
    pub size: u64,
    pub is_dir: bool,
}

/// Contents returned by a bounded file read
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileContent {
    pub content: String,
    pub truncated: bool,
}

/// The external collaborator owning all hardware, network and storage effects
#[async_trait]
pub trait DeviceBackend: Send + Sync {
    async fn gpio_read(&self, pin: u8) -> Result<GpioState, BackendError>;
    async fn gpio_write(&self, pin: u8, value: u8) -> Result<(), BackendError>;
    async fn adc_read(&self, pin: u8) -> Result<AdcReading, BackendError>;

    /// Scan the I2C bus on the given pins, returning responding addresses
    async fn i2c_scan(&self, scl: u8, sda: u8, freq: u32) -> Result<Vec<u8>, BackendError>;
    async fn i2c_read(
        &self,
        scl: u8,
        sda: u8,
        address: u8,
        register: Option<u8>,
        length: usize,
    ) -> Result<Vec<u8>, BackendError>;
    async fn i2c_write(
        &self,
        scl: u8,
        sda: u8,
        address: u8,
        register: Option<u8>,
        data: &[u8],
    ) -> Result<(), BackendError>;

    /// Full-duplex SPI transfer; returns the bytes clocked in
    async fn spi_transfer(&self, bus: SpiBusConfig, data: &[u8]) -> Result<Vec<u8>, BackendError>;

    async fn wifi_scan(&self) -> Result<Vec<WifiNetwork>, BackendError>;
    async fn wifi_connect(
        &self,
        ssid: &str,
        password: Option<&str>,
    ) -> Result<WifiConnection, BackendError>;

    async fn file_list(&self, path: &str) -> Result<Vec<FileEntry>, BackendError>;
    async fn file_read(&self, filename: &str, max_size: usize)
        -> Result<FileContent, BackendError>;
    /// Returns the file size after the write
    async fn file_write(
        &self,
        filename: &str,
        content: &str,
        append: bool,
    ) -> Result<u64, BackendError>;
    async fn file_delete(&self, path: &str) -> Result<(), BackendError>;
    async fn file_mkdir(&self, path: &str) -> Result<(), BackendError>;

    fn chip_id(&self) -> String;
    fn cpu_freq_mhz(&self) -> u32;
    fn free_memory(&self) -> u64;
    fn used_memory(&self) -> u64;

    /// Reset the device. Called by the run loop after the `reboot`
    /// acknowledgement has been flushed.
    async fn reboot(&self) -> Result<(), BackendError>;
}
