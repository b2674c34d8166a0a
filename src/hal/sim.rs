//! Simulated device backend
//!
//! Backs the engine on a development host and in tests: GPIO/ADC/I2C/SPI are
//! in-memory models, WiFi is a configurable static environment, and the file
//! commands operate on a real directory under the configured root.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::fs;

use super::{
    AdcReading, BackendError, DeviceBackend, FileContent, FileEntry, GpioMode, GpioState,
    SpiBusConfig, WifiConnection, WifiNetwork,
};

/// Pins that are never usable on the modeled board
const UNAVAILABLE_PINS: &[u8] = &[24, 28, 29, 30, 31];
const MAX_PIN: u8 = 39;

const DEFAULT_FREE_MEMORY: u64 = 4 * 1024 * 1024;
const DEFAULT_USED_MEMORY: u64 = 512 * 1024;

/// In-memory board model plus a real directory for storage
pub struct SimBackend {
    root: PathBuf,
    pins: Mutex<HashMap<u8, GpioState>>,
    i2c_devices: Mutex<HashMap<u8, HashMap<u8, u8>>>,
    networks: Vec<WifiNetwork>,
    free_memory: AtomicU64,
    rebooted: AtomicBool,
}

impl SimBackend {
    /// Create a backend storing files under `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pins: Mutex::new(HashMap::new()),
            i2c_devices: Mutex::new(HashMap::new()),
            networks: Vec::new(),
            free_memory: AtomicU64::new(DEFAULT_FREE_MEMORY),
            rebooted: AtomicBool::new(false),
        }
    }

    /// Attach an I2C device with preloaded registers
    pub fn with_i2c_device(self, address: u8, registers: &[(u8, u8)]) -> Self {
        self.i2c_devices
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(address, registers.iter().copied().collect());
        self
    }

    /// Make an access point visible to scans and connectable
    pub fn with_network(mut self, ssid: &str, rssi: i32) -> Self {
        self.networks.push(WifiNetwork {
            ssid: ssid.to_string(),
            bssid: format!("02a1b2c3d4{:02x}", self.networks.len()),
            channel: 6,
            rssi,
            security: "WPA2-PSK".into(),
            hidden: false,
        });
        self
    }

    /// Override the reported free memory (drives the OTA headroom policy)
    pub fn set_free_memory(&self, bytes: u64) {
        self.free_memory.store(bytes, Ordering::SeqCst);
    }

    /// Whether a reboot was requested through the backend
    pub fn was_rebooted(&self) -> bool {
        self.rebooted.load(Ordering::SeqCst)
    }

    fn check_pin(pin: u8) -> Result<(), BackendError> {
        if pin > MAX_PIN || UNAVAILABLE_PINS.contains(&pin) {
            return Err(BackendError::new(format!("Invalid GPIO pin: {pin}")));
        }
        Ok(())
    }

    fn resolve(&self, path: &str) -> PathBuf {
        self.root.join(path.trim_start_matches('/'))
    }
}

#[async_trait]
impl DeviceBackend for SimBackend {
    async fn gpio_read(&self, pin: u8) -> Result<GpioState, BackendError> {
        Self::check_pin(pin)?;
        let pins = self.pins.lock().unwrap_or_else(|e| e.into_inner());
        Ok(*pins.get(&pin).unwrap_or(&GpioState {
            value: 0,
            mode: GpioMode::Input,
        }))
    }

    async fn gpio_write(&self, pin: u8, value: u8) -> Result<(), BackendError> {
        Self::check_pin(pin)?;
        self.pins.lock().unwrap_or_else(|e| e.into_inner()).insert(
            pin,
            GpioState {
                value,
                mode: GpioMode::Output,
            },
        );
        Ok(())
    }

    async fn adc_read(&self, pin: u8) -> Result<AdcReading, BackendError> {
        Self::check_pin(pin)?;
        // Mid-scale reading on a 12-bit converter
        let raw_value = 2048u16;
        Ok(AdcReading {
            raw_value,
            voltage: (raw_value as f64 / 4095.0) * 3.3,
        })
    }

    async fn i2c_scan(&self, _scl: u8, _sda: u8, _freq: u32) -> Result<Vec<u8>, BackendError> {
        let devices = self.i2c_devices.lock().unwrap_or_else(|e| e.into_inner());
        let mut addresses: Vec<u8> = devices.keys().copied().collect();
        addresses.sort_unstable();
        Ok(addresses)
    }

    async fn i2c_read(
        &self,
        _scl: u8,
        _sda: u8,
        address: u8,
        register: Option<u8>,
        length: usize,
    ) -> Result<Vec<u8>, BackendError> {
        let devices = self.i2c_devices.lock().unwrap_or_else(|e| e.into_inner());
        let registers = devices
            .get(&address)
            .ok_or_else(|| BackendError::new(format!("I2C read failed: no device at {address:#04x}")))?;

        let start = register.unwrap_or(0);
        Ok((0..length)
            .map(|i| {
                registers
                    .get(&(start.wrapping_add(i as u8)))
                    .copied()
                    .unwrap_or(0)
            })
            .collect())
    }

    async fn i2c_write(
        &self,
        _scl: u8,
        _sda: u8,
        address: u8,
        register: Option<u8>,
        data: &[u8],
    ) -> Result<(), BackendError> {
        let mut devices = self.i2c_devices.lock().unwrap_or_else(|e| e.into_inner());
        let registers = devices
            .get_mut(&address)
            .ok_or_else(|| BackendError::new(format!("I2C write failed: no device at {address:#04x}")))?;

        let start = register.unwrap_or(0);
        for (i, &byte) in data.iter().enumerate() {
            registers.insert(start.wrapping_add(i as u8), byte);
        }
        Ok(())
    }

    async fn spi_transfer(
        &self,
        _bus: SpiBusConfig,
        data: &[u8],
    ) -> Result<Vec<u8>, BackendError> {
        // Loopback model: MISO mirrors MOSI
        Ok(data.to_vec())
    }

    async fn wifi_scan(&self) -> Result<Vec<WifiNetwork>, BackendError> {
        Ok(self.networks.clone())
    }

    async fn wifi_connect(
        &self,
        ssid: &str,
        _password: Option<&str>,
    ) -> Result<WifiConnection, BackendError> {
        if !self.networks.iter().any(|n| n.ssid == ssid) {
            return Err(BackendError::new("Connection timeout"));
        }
        Ok(WifiConnection {
            ssid: ssid.to_string(),
            ip_address: "192.168.4.2".into(),
            subnet_mask: "255.255.255.0".into(),
            gateway: "192.168.4.1".into(),
            dns: "192.168.4.1".into(),
        })
    }

    async fn file_list(&self, path: &str) -> Result<Vec<FileEntry>, BackendError> {
        let dir = self.resolve(path);
        let mut reader = fs::read_dir(&dir)
            .await
            .map_err(|e| BackendError::new(format!("Failed to list directory: {e}")))?;

        let mut entries = Vec::new();
        while let Some(entry) = reader
            .next_entry()
            .await
            .map_err(|e| BackendError::new(format!("Failed to list directory: {e}")))?
        {
            let metadata = entry
                .metadata()
                .await
                .map_err(|e| BackendError::new(format!("Failed to list directory: {e}")))?;
            entries.push(FileEntry {
                name: entry.file_name().to_string_lossy().into_owned(),
                size: metadata.len(),
                is_dir: metadata.is_dir(),
            });
        }
        Ok(entries)
    }

    async fn file_read(
        &self,
        filename: &str,
        max_size: usize,
    ) -> Result<FileContent, BackendError> {
        let data = fs::read_to_string(self.resolve(filename))
            .await
            .map_err(|e| BackendError::new(format!("Failed to read file: {e}")))?;

        let content: String = data.chars().take(max_size).collect();
        let truncated = content.chars().count() == max_size;
        Ok(FileContent { content, truncated })
    }

    async fn file_write(
        &self,
        filename: &str,
        content: &str,
        append: bool,
    ) -> Result<u64, BackendError> {
        let path = self.resolve(filename);
        let result = if append {
            use tokio::io::AsyncWriteExt;
            match fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .await
            {
                Ok(mut file) => file.write_all(content.as_bytes()).await,
                Err(e) => Err(e),
            }
        } else {
            fs::write(&path, content).await
        };
        result.map_err(|e| BackendError::new(format!("Failed to write file: {e}")))?;

        let metadata = fs::metadata(&path)
            .await
            .map_err(|e| BackendError::new(format!("Failed to write file: {e}")))?;
        Ok(metadata.len())
    }

    async fn file_delete(&self, path: &str) -> Result<(), BackendError> {
        let resolved = self.resolve(path);
        let metadata = fs::metadata(&resolved)
            .await
            .map_err(|_| BackendError::new(format!("Path not found: {path}")))?;

        let result = if metadata.is_dir() {
            fs::remove_dir(&resolved).await
        } else {
            fs::remove_file(&resolved).await
        };
        result.map_err(|e| BackendError::new(format!("Delete failed: {e}")))
    }

    async fn file_mkdir(&self, path: &str) -> Result<(), BackendError> {
        fs::create_dir(self.resolve(path))
            .await
            .map_err(|e| BackendError::new(format!("Mkdir failed: {e}")))
    }

    fn chip_id(&self) -> String {
        "sim-0000deadbeef".into()
    }

    fn cpu_freq_mhz(&self) -> u32 {
        240
    }

    fn free_memory(&self) -> u64 {
        self.free_memory.load(Ordering::SeqCst)
    }

    fn used_memory(&self) -> u64 {
        DEFAULT_USED_MEMORY
    }

    async fn reboot(&self) -> Result<(), BackendError> {
        self.rebooted.store(true, Ordering::SeqCst);
        Ok(())
    }
}

impl std::fmt::Debug for SimBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimBackend")
            .field("root", &self.root.display())
            .field("networks", &self.networks.len())
            .finish()
    }
}
