//! I2C and SPI bus handlers

use serde_json::json;

use crate::command::registry::HandlerResult;
use crate::command::{params, JsonMap};
use crate::error::EngineError;
use crate::hal::{DeviceBackend, SpiBusConfig};

use super::backend_err;

const DEFAULT_SCL: u8 = 22;
const DEFAULT_SDA: u8 = 21;
const DEFAULT_I2C_FREQ: u32 = 100_000;

const DEFAULT_MOSI: u8 = 23;
const DEFAULT_MISO: u8 = 19;
const DEFAULT_SCK: u8 = 18;
const DEFAULT_SPI_BAUDRATE: u32 = 1_000_000;

fn i2c_pins(p: &JsonMap) -> (u8, u8) {
    (
        params::get_int::<u8>(p, "scl").unwrap_or(DEFAULT_SCL),
        params::get_int::<u8>(p, "sda").unwrap_or(DEFAULT_SDA),
    )
}

fn hex_list(data: &[u8]) -> Vec<String> {
    data.iter().map(|b| format!("0x{b:02x}")).collect()
}

pub async fn i2c_scan(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let (scl, sda) = i2c_pins(p);
    let freq = params::get_int::<u32>(p, "freq").unwrap_or(DEFAULT_I2C_FREQ);

    let addresses = backend
        .i2c_scan(scl, sda, freq)
        .await
        .map_err(backend_err)?;

    let devices: Vec<_> = addresses
        .iter()
        .map(|addr| json!({"address": addr, "hex": format!("0x{addr:02x}")}))
        .collect();

    Ok(json!({
        "type": "i2c_scan",
        "devices": devices,
        "count": addresses.len(),
        "pins": {"scl": scl, "sda": sda},
    }))
}

pub async fn i2c_read(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let Some(address) = params::get_int::<u8>(p, "address") else {
        return Err(EngineError::Validation("I2C address required".into()));
    };
    let (scl, sda) = i2c_pins(p);
    let register = params::get_int::<u8>(p, "register");
    let length = params::get_int::<usize>(p, "length").unwrap_or(1);

    let data = backend
        .i2c_read(scl, sda, address, register, length)
        .await
        .map_err(backend_err)?;

    Ok(json!({
        "type": "i2c_read",
        "address": address,
        "register": register,
        "data": data,
        "hex": hex_list(&data),
    }))
}

pub async fn i2c_write(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let address = params::get_int::<u8>(p, "address");
    let data = params::get_bytes(p, "data")?.unwrap_or_default();
    let Some(address) = address else {
        return Err(EngineError::Validation("Address and data required".into()));
    };
    if data.is_empty() {
        return Err(EngineError::Validation("Address and data required".into()));
    }
    let (scl, sda) = i2c_pins(p);
    let register = params::get_int::<u8>(p, "register");

    backend
        .i2c_write(scl, sda, address, register, &data)
        .await
        .map_err(backend_err)?;

    Ok(json!({
        "type": "i2c_write",
        "address": address,
        "register": register,
        "bytes_written": data.len(),
        "success": true,
    }))
}

pub async fn spi_transfer(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let bus = SpiBusConfig {
        mosi: params::get_int::<u8>(p, "mosi").unwrap_or(DEFAULT_MOSI),
        miso: params::get_int::<u8>(p, "miso").unwrap_or(DEFAULT_MISO),
        sck: params::get_int::<u8>(p, "sck").unwrap_or(DEFAULT_SCK),
        cs: params::get_int::<u8>(p, "cs"),
        baudrate: params::get_int::<u32>(p, "baudrate").unwrap_or(DEFAULT_SPI_BAUDRATE),
    };
    let tx_data = params::get_bytes(p, "data")?.unwrap_or_else(|| vec![0]);

    let rx_data = backend
        .spi_transfer(bus, &tx_data)
        .await
        .map_err(|e| EngineError::Handler(format!("SPI transfer failed: {e}")))?;

    Ok(json!({
        "type": "spi_transfer",
        "tx_data": tx_data,
        "rx_data": rx_data,
        "hex_rx": hex_list(&rx_data),
    }))
}
