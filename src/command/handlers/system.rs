//! Liveness and identity handlers

use serde_json::json;

use crate::command::registry::HandlerResult;
use crate::engine::EngineStats;
use crate::hal::DeviceBackend;

pub fn ping(stats: &EngineStats) -> HandlerResult {
    let uptime = stats.uptime_ms();
    Ok(json!({
        "type": "pong",
        "timestamp": uptime,
        "uptime": uptime,
    }))
}

pub fn version(backend: &dyn DeviceBackend) -> HandlerResult {
    Ok(json!({
        "type": "version",
        "firmware": env!("CARGO_PKG_VERSION"),
        "platform": "webserial-device",
        "machine": backend.chip_id(),
    }))
}

pub fn system_info(backend: &dyn DeviceBackend, stats: &EngineStats) -> HandlerResult {
    let free = backend.free_memory();
    let used = backend.used_memory();

    Ok(json!({
        "type": "system_info",
        "chip_id": backend.chip_id(),
        "free_memory": free,
        "used_memory": used,
        "total_memory": free + used,
        "freq_mhz": backend.cpu_freq_mhz(),
        "packet_count": stats.packet_count(),
        "uptime_ms": stats.uptime_ms(),
    }))
}
