//! Batch execution with per-item isolation
//!
//! Items run sequentially in request order. An item that fails is recorded
//! against its index and the batch keeps going; one bad item never poisons
//! the rest. Nested batches are rejected per item to keep execution flat.

use serde_json::Value;

use crate::error::EngineError;
use crate::response::{BatchItemError, BatchItemResult, Reply, Response};

use super::dispatcher::Dispatcher;
use super::{Command, JsonMap};

/// Execute a `batch` command's items and collect the aggregate report
pub async fn run(dispatcher: &mut Dispatcher, params: &JsonMap) -> Result<Reply, EngineError> {
    let commands = match params.get("commands").and_then(Value::as_array) {
        Some(items) if !items.is_empty() => items.clone(),
        _ => return Err(EngineError::Validation("No commands provided".into())),
    };

    let mut results = Vec::new();
    let mut errors = Vec::new();

    for (index, item) in commands.iter().enumerate() {
        match run_item(dispatcher, item).await {
            Ok(Some(result)) => results.push(BatchItemResult { index, result }),
            Ok(None) => {}
            Err(e) => errors.push(BatchItemError {
                index,
                error: e.to_string(),
            }),
        }
    }

    Ok(Reply::Response(Response::BatchResult {
        total: commands.len(),
        success_count: results.len(),
        error_count: errors.len(),
        results,
        errors,
    }))
}

async fn run_item(
    dispatcher: &mut Dispatcher,
    item: &Value,
) -> Result<Option<Value>, EngineError> {
    let map = item
        .as_object()
        .cloned()
        .ok_or_else(|| EngineError::Validation("No command specified".into()))?;
    let command = Command::from_map(map)?;
    if command.name == "batch" {
        return Err(EngineError::Validation("Nested batch not allowed".into()));
    }

    let reply = dispatcher.dispatch_single(command).await?;
    Ok(match reply {
        Reply::None => None,
        Reply::Raw(value) => Some(value),
        Reply::Text(line) => Some(Value::String(line)),
        Reply::Response(response) => {
            Some(serde_json::to_value(response).map_err(|e| EngineError::Handler(e.to_string()))?)
        }
    })
}
