//! Pin I/O handlers

use serde_json::json;

use crate::command::registry::HandlerResult;
use crate::command::{params, JsonMap};
use crate::error::EngineError;
use crate::hal::DeviceBackend;

use super::backend_err;

/// Default pin for `gpio_read` (the usual on-board LED)
const DEFAULT_GPIO_PIN: u8 = 2;
/// Default ADC input (VP)
const DEFAULT_ADC_PIN: u8 = 36;

pub async fn read(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let pin = params::get_int::<u8>(p, "pin").unwrap_or(DEFAULT_GPIO_PIN);
    let state = backend.gpio_read(pin).await.map_err(backend_err)?;

    Ok(json!({
        "type": "gpio_read",
        "pin": pin,
        "value": state.value,
        "mode": state.mode.as_str(),
    }))
}

pub async fn write(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let (Some(pin), Some(value)) = (
        params::get_int::<u8>(p, "pin"),
        params::get_int::<u8>(p, "value"),
    ) else {
        return Err(EngineError::Validation("Missing pin or value".into()));
    };

    backend.gpio_write(pin, value).await.map_err(backend_err)?;

    Ok(json!({
        "type": "gpio_write",
        "pin": pin,
        "value": value,
        "success": true,
    }))
}

pub async fn adc_read(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let pin = params::get_int::<u8>(p, "pin").unwrap_or(DEFAULT_ADC_PIN);
    let reading = backend
        .adc_read(pin)
        .await
        .map_err(|e| EngineError::Handler(format!("ADC read failed on pin {pin}: {e}")))?;

    Ok(json!({
        "type": "adc_read",
        "pin": pin,
        "raw_value": reading.raw_value,
        "voltage": (reading.voltage * 1000.0).round() / 1000.0,
        "resolution": "12-bit",
    }))
}
