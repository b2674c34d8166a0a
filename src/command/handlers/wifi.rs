//! Network association handlers

use serde_json::json;

use crate::command::registry::HandlerResult;
use crate::command::{params, JsonMap};
use crate::error::EngineError;
use crate::hal::DeviceBackend;

pub async fn scan(backend: &dyn DeviceBackend, _p: &JsonMap) -> HandlerResult {
    let mut networks = backend
        .wifi_scan()
        .await
        .map_err(|e| EngineError::Handler(format!("WiFi scan failed: {e}")))?;

    // Strongest first
    networks.sort_by_key(|n| std::cmp::Reverse(n.rssi));

    Ok(json!({
        "type": "wifi_scan",
        "networks": networks
            .iter()
            .map(|n| json!({
                "ssid": n.ssid,
                "bssid": n.bssid,
                "channel": n.channel,
                "rssi": n.rssi,
                "security": n.security,
                "hidden": n.hidden,
            }))
            .collect::<Vec<_>>(),
        "count": networks.len(),
    }))
}

pub async fn connect(backend: &dyn DeviceBackend, p: &JsonMap) -> HandlerResult {
    let Some(ssid) = params::get_str(p, "ssid") else {
        return Err(EngineError::Validation("SSID required".into()));
    };
    let password = params::get_str(p, "password");

    let conn = backend
        .wifi_connect(ssid, password)
        .await
        .map_err(|e| EngineError::Handler(format!("WiFi connection failed: {e}")))?;

    Ok(json!({
        "type": "wifi_connect",
        "connected": true,
        "ssid": conn.ssid,
        "ip_address": conn.ip_address,
        "subnet_mask": conn.subnet_mask,
        "gateway": conn.gateway,
        "dns": conn.dns,
    }))
}
