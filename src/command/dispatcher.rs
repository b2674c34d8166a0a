//! Frame-to-command dispatch
//!
//! One frame comes in, one reply goes out. Object-shaped frames are JSON
//! commands routed to the engine's own sub-protocols (binary transfer, OTA,
//! batch, reboot) or to the handler registry; everything else is matched
//! against a small plain-text vocabulary. Every failure is recovered here
//! into an error reply; nothing a frame contains can take the engine down.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::json;
use tracing::debug;

use crate::binary::BinaryTransfer;
use crate::engine::EngineStats;
use crate::error::EngineError;
use crate::hal::DeviceBackend;
use crate::ota::OtaManager;
use crate::response::{Reply, Response};

use super::registry::HandlerRegistry;
use super::{batch, params, Command};

/// Commands the engine implements itself rather than through the registry
const BUILTIN_COMMANDS: &[&str] = &[
    "binary_start",
    "binary_end",
    "ota_start",
    "ota_chunk",
    "ota_finish",
    "ota_abort",
    "batch",
    "reboot",
];

const HELP_TEXT: &str = "Available commands: version, gpio, adc, i2c, spi, reboot, files";
const GPIO_USAGE: &str = "Usage: gpio <pin> <0/1>";

/// Routes parsed frames to handlers and the engine's sub-protocols
pub struct Dispatcher {
    registry: Arc<HandlerRegistry>,
    backend: Arc<dyn DeviceBackend>,
    stats: Arc<EngineStats>,
    binary: BinaryTransfer,
    ota: OtaManager,
    reboot_requested: bool,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        backend: Arc<dyn DeviceBackend>,
        stats: Arc<EngineStats>,
        binary_capacity: usize,
        fs_root: PathBuf,
    ) -> Self {
        Self {
            registry,
            backend,
            stats,
            binary: BinaryTransfer::new(binary_capacity),
            ota: OtaManager::new(fs_root),
            reboot_requested: false,
        }
    }

    pub fn binary(&self) -> &BinaryTransfer {
        &self.binary
    }

    pub fn binary_mut(&mut self) -> &mut BinaryTransfer {
        &mut self.binary
    }

    /// Set once a `reboot` command has been acknowledged
    pub fn reboot_requested(&self) -> bool {
        self.reboot_requested
    }

    /// Whether `name` is a built-in or registered command
    pub fn is_known(&self, name: &str) -> bool {
        BUILTIN_COMMANDS.contains(&name) || self.registry.contains(name)
    }

    /// Parse and execute one complete frame
    pub async fn dispatch_frame(&mut self, frame: &[u8]) -> Result<Reply, EngineError> {
        let text = std::str::from_utf8(frame)
            .map_err(|e| EngineError::Parse(format!("Processing error: {e}")))?;
        let text = text.trim();
        if text.is_empty() {
            return Ok(Reply::None);
        }

        self.stats.record_packet();
        debug!(frame = text, "dispatching frame");

        if text.starts_with('{') {
            let value: serde_json::Value = serde_json::from_str(text)
                .map_err(|e| EngineError::Parse(format!("Invalid JSON: {e}")))?;
            let map = value
                .as_object()
                .cloned()
                .ok_or_else(|| EngineError::Validation("No command specified".into()))?;
            let command = Command::from_map(map)?;

            if command.name == "batch" {
                batch::run(self, &command.params).await
            } else {
                self.dispatch_single(command).await
            }
        } else {
            self.dispatch_text(text).await
        }
    }

    /// Execute one non-batch command (also the per-item path for batches)
    pub(crate) async fn dispatch_single(&mut self, command: Command) -> Result<Reply, EngineError> {
        let p = &command.params;
        match command.name.as_str() {
            "binary_start" => {
                let size = params::get_u64(p, "size").unwrap_or(0);
                let expected = self.binary.start(usize::try_from(size).unwrap_or(0))?;
                Ok(Reply::Response(Response::BinaryReady {
                    expected_size: expected,
                }))
            }
            "binary_end" => {
                let data = self.binary.end()?;
                Ok(Reply::Response(Response::BinaryComplete {
                    size: data.len(),
                    data,
                }))
            }
            "ota_start" => {
                let filename = params::get_str(p, "filename").unwrap_or("main.py");
                let size = params::get_i64(p, "size").unwrap_or(0);
                if size <= 0 {
                    return Err(EngineError::Validation("Invalid file size".into()));
                }
                let checksum = params::get_str(p, "checksum").map(str::to_string);
                let free = self.backend.free_memory();

                let started = self.ota.start(filename, size as u64, checksum, free).await?;
                Ok(Reply::Response(Response::OtaReady {
                    filename: started.filename,
                    expected_size: started.expected_size,
                    temp_file: started.temp_file,
                }))
            }
            "ota_chunk" => {
                let data = params::get_bytes(p, "data")?.unwrap_or_default();
                let progress = self.ota.chunk(&data).await?;
                Ok(Reply::Response(Response::OtaProgress {
                    received: progress.received,
                    total: progress.total,
                    progress: progress.progress,
                }))
            }
            "ota_finish" => {
                let installed = self.ota.finish().await?;
                Ok(Reply::Response(Response::OtaComplete {
                    filename: installed.filename,
                    size: installed.size,
                    backup: installed.backup,
                    reboot_required: installed.reboot_required,
                }))
            }
            "ota_abort" => {
                self.ota.abort().await;
                Ok(Reply::Response(Response::OtaAborted { success: true }))
            }
            "reboot" => {
                self.reboot_requested = true;
                Ok(Reply::Response(Response::Reboot {
                    message: "Rebooting...".into(),
                }))
            }
            // Only reachable through a malformed direct invocation; the
            // batch executor rejects nested batches before this point
            "batch" => Err(EngineError::Validation("Nested batch not allowed".into())),
            name => match self.registry.get(name) {
                Some(handler) => handler
                    .handle(command.params.clone())
                    .await
                    .map(Reply::Raw),
                None => Err(EngineError::UnknownCommand(name.to_string())),
            },
        }
    }

    /// The small fixed plain-text vocabulary
    async fn dispatch_text(&mut self, line: &str) -> Result<Reply, EngineError> {
        let parts: Vec<&str> = line.split_whitespace().collect();
        let cmd = parts.first().map(|s| s.to_lowercase()).unwrap_or_default();

        match cmd.as_str() {
            "help" => Ok(Reply::Text(HELP_TEXT.into())),
            "version" => Ok(Reply::Text(format!(
                "webserial-device {}",
                env!("CARGO_PKG_VERSION")
            ))),
            "gpio" => {
                if parts.len() < 3 {
                    return Ok(Reply::Text(GPIO_USAGE.into()));
                }
                let (Ok(pin), Ok(value)) = (parts[1].parse::<u8>(), parts[2].parse::<u8>()) else {
                    return Err(EngineError::Validation(GPIO_USAGE.into()));
                };

                let map = json!({"command": "gpio_write", "pin": pin, "value": value});
                let command = Command::from_map(map.as_object().cloned().unwrap_or_default())?;
                self.dispatch_single(command).await
            }
            "reboot" => {
                self.reboot_requested = true;
                Ok(Reply::Response(Response::Reboot {
                    message: "Rebooting...".into(),
                }))
            }
            _ => Err(EngineError::UnknownCommand(cmd)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::command::handlers::default_registry;
    use crate::hal::sim::SimBackend;
    use crate::response::encode_reply;

    fn test_dispatcher(name: &str) -> Dispatcher {
        let root = std::env::temp_dir().join(format!("webserial-dispatch-{name}"));
        std::fs::create_dir_all(&root).expect("create test root");
        let backend = Arc::new(SimBackend::new(&root));
        let stats = Arc::new(EngineStats::new());
        let registry = Arc::new(default_registry(backend.clone(), stats.clone()));
        Dispatcher::new(registry, backend, stats, 4096, root)
    }

    async fn dispatch_json(d: &mut Dispatcher, frame: &str) -> serde_json::Value {
        let reply = d
            .dispatch_frame(frame.as_bytes())
            .await
            .expect("dispatch should succeed");
        let line = encode_reply(&reply).expect("reply should encode");
        serde_json::from_str(&line).expect("reply should be JSON")
    }

    #[tokio::test]
    async fn test_ping_roundtrip() {
        let mut d = test_dispatcher("ping");
        let reply = dispatch_json(&mut d, r#"{"command": "ping"}"#).await;
        assert_eq!(reply["type"], "pong");
    }

    #[tokio::test]
    async fn test_empty_frame_yields_no_reply() {
        let mut d = test_dispatcher("empty");
        let reply = d.dispatch_frame(b"  \t ").await.expect("dispatch");
        assert!(matches!(reply, Reply::None));
    }

    #[tokio::test]
    async fn test_invalid_json_is_parse_error() {
        let mut d = test_dispatcher("badjson");
        let err = d
            .dispatch_frame(b"{not json")
            .await
            .expect_err("malformed JSON must fail");
        assert!(err.to_string().starts_with("Invalid JSON:"));
    }

    #[tokio::test]
    async fn test_missing_command_key() {
        let mut d = test_dispatcher("nocmd");
        let err = d
            .dispatch_frame(br#"{"pin": 2}"#)
            .await
            .expect_err("object without command must fail");
        assert_eq!(err.to_string(), "No command specified");
    }

    #[tokio::test]
    async fn test_unknown_command() {
        let mut d = test_dispatcher("unknown");
        let err = d
            .dispatch_frame(br#"{"command": "warp_drive"}"#)
            .await
            .expect_err("unknown command must fail");
        assert_eq!(err.to_string(), "Unknown command: warp_drive");
    }

    #[tokio::test]
    async fn test_binary_start_and_end() {
        let mut d = test_dispatcher("binary");
        let reply = dispatch_json(&mut d, r#"{"command": "binary_start", "size": 4}"#).await;
        assert_eq!(reply["type"], "binary_ready");
        assert_eq!(reply["expected_size"], 4);
        assert!(d.binary().is_active());

        let (consumed, event) = d.binary_mut().feed(b"\xde\xad\xbe\xef");
        assert_eq!(consumed, 4);
        assert!(event.is_some());

        let reply = dispatch_json(&mut d, r#"{"command": "binary_end"}"#).await;
        assert_eq!(reply["type"], "binary_complete");
        assert_eq!(reply["size"], 4);
        assert_eq!(reply["data"][0], 0xde);
        assert!(!d.binary().is_active());
    }

    #[tokio::test]
    async fn test_binary_end_without_start() {
        let mut d = test_dispatcher("binary-end");
        let err = d
            .dispatch_frame(br#"{"command": "binary_end"}"#)
            .await
            .expect_err("end outside binary mode must fail");
        assert_eq!(err.to_string(), "Not in binary mode");
    }

    #[tokio::test]
    async fn test_reboot_sets_flag_after_ack() {
        let mut d = test_dispatcher("reboot");
        assert!(!d.reboot_requested());
        let reply = dispatch_json(&mut d, r#"{"command": "reboot"}"#).await;
        assert_eq!(reply["type"], "reboot");
        assert_eq!(reply["message"], "Rebooting...");
        assert!(d.reboot_requested());
    }

    #[tokio::test]
    async fn test_text_help_and_version() {
        let mut d = test_dispatcher("text");
        let reply = d.dispatch_frame(b"help").await.expect("dispatch");
        let Reply::Text(line) = reply else {
            panic!("help should be a text reply");
        };
        assert!(line.starts_with("Available commands:"));

        let reply = d.dispatch_frame(b"VERSION").await.expect("dispatch");
        let Reply::Text(line) = reply else {
            panic!("version should be a text reply");
        };
        assert!(line.contains(env!("CARGO_PKG_VERSION")));
    }

    #[tokio::test]
    async fn test_text_gpio_routes_to_handler() {
        let mut d = test_dispatcher("text-gpio");
        let reply = dispatch_json(&mut d, "gpio 5 1").await;
        assert_eq!(reply["type"], "gpio_write");
        assert_eq!(reply["pin"], 5);
        assert_eq!(reply["value"], 1);

        let reply = d.dispatch_frame(b"gpio 5").await.expect("dispatch");
        let Reply::Text(line) = reply else {
            panic!("short gpio should return usage");
        };
        assert_eq!(line, GPIO_USAGE);
    }

    #[tokio::test]
    async fn test_ota_lifecycle_over_dispatch() {
        let mut d = test_dispatcher("ota");
        let payload = b"print('ok')\n";
        let digest = format!("{:x}", md5::compute(payload));

        let frame = format!(
            r#"{{"command": "ota_start", "filename": "app.py", "size": {}, "checksum": "{digest}"}}"#,
            payload.len()
        );
        let reply = dispatch_json(&mut d, &frame).await;
        assert_eq!(reply["type"], "ota_ready");
        assert_eq!(reply["filename"], "app.py");

        let data: Vec<serde_json::Value> =
            payload.iter().map(|b| serde_json::json!(b)).collect();
        let frame = format!(
            r#"{{"command": "ota_chunk", "data": {}}}"#,
            serde_json::Value::Array(data)
        );
        let reply = dispatch_json(&mut d, &frame).await;
        assert_eq!(reply["type"], "ota_progress");
        assert_eq!(reply["progress"], 100.0);

        let reply = dispatch_json(&mut d, r#"{"command": "ota_finish"}"#).await;
        assert_eq!(reply["type"], "ota_complete");
        assert_eq!(reply["reboot_required"], false);
    }

    #[tokio::test]
    async fn test_ota_start_rejects_zero_size() {
        let mut d = test_dispatcher("ota-zero");
        let err = d
            .dispatch_frame(br#"{"command": "ota_start", "filename": "app.py"}"#)
            .await
            .expect_err("missing size must fail");
        assert_eq!(err.to_string(), "Invalid file size");
    }
}
