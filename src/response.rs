//! Outbound wire format
//!
//! Every response is one JSON object per line, tagged with a `type` field.
//! Responses the engine produces itself are closed variants of [`Response`];
//! results coming back from registry handlers pass through as open JSON maps
//! (they carry their own `type`). Errors always use the uniform envelope
//! `{type:"error", message, timestamp}`.

use serde::Serialize;
use serde_json::Value;
use tracing::error;

use crate::error::EngineError;

/// Engine-produced response payloads, tagged on `type`
#[derive(Debug, Clone, Serialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    BinaryReady {
        expected_size: usize,
    },
    BinaryReceived {
        size: usize,
    },
    BinaryComplete {
        size: usize,
        data: Vec<u8>,
    },
    OtaReady {
        filename: String,
        expected_size: u64,
        temp_file: String,
    },
    OtaProgress {
        received: u64,
        total: u64,
        progress: f64,
    },
    OtaComplete {
        filename: String,
        size: u64,
        backup: String,
        reboot_required: bool,
    },
    OtaAborted {
        success: bool,
    },
    BatchResult {
        total: usize,
        success_count: usize,
        error_count: usize,
        results: Vec<BatchItemResult>,
        errors: Vec<BatchItemError>,
    },
    Reboot {
        message: String,
    },
    Error {
        message: String,
        timestamp: u64,
    },
}

/// One successful batch item, keyed by its original index
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchItemResult {
    pub index: usize,
    pub result: Value,
}

/// One failed batch item, keyed by its original index
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct BatchItemError {
    pub index: usize,
    pub error: String,
}

/// What the dispatcher hands back for one frame
#[derive(Debug, Clone, PartialEq)]
pub enum Reply {
    /// A typed engine response
    Response(Response),
    /// A handler's result map, passed through unchanged
    Raw(Value),
    /// A plain-text line (text command vocabulary)
    Text(String),
    /// Nothing to send
    None,
}

/// Encode a reply as a single wire line, without the trailing terminator.
///
/// Serialization failures are logged and swallowed; they never propagate.
pub fn encode_reply(reply: &Reply) -> Option<String> {
    match reply {
        Reply::Response(response) => match serde_json::to_string(response) {
            Ok(line) => Some(line),
            Err(e) => {
                error!("failed to encode response: {e}");
                None
            }
        },
        Reply::Raw(value) => match serde_json::to_string(value) {
            Ok(line) => Some(line),
            Err(e) => {
                error!("failed to encode handler result: {e}");
                None
            }
        },
        Reply::Text(text) => Some(text.clone()),
        Reply::None => None,
    }
}

/// Encode any engine error into the uniform error envelope
pub fn encode_error(err: &EngineError, timestamp: u64) -> String {
    let response = Response::Error {
        message: err.to_string(),
        timestamp,
    };
    serde_json::to_string(&response).unwrap_or_else(|e| {
        error!("failed to encode error envelope: {e}");
        format!("{{\"type\":\"error\",\"message\":\"encoding failure\",\"timestamp\":{timestamp}}}")
    })
}
