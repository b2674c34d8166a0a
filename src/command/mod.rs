//! Command model and dispatch
//!
//! This module handles:
//! - Parsing frames into commands
//! - Dispatching to the handler registry or the engine's sub-protocols
//! - Batched execution with per-item failure isolation

pub mod batch;
pub mod dispatcher;
pub mod handlers;
pub mod registry;

use serde_json::Value;

use crate::error::EngineError;

/// Parameter object attached to a command
pub type JsonMap = serde_json::Map<String, Value>;

/// One parsed command: a name plus an open parameter map
#[derive(Debug, Clone)]
pub struct Command {
    pub name: String,
    pub params: JsonMap,
}

impl Command {
    /// Extract the required `command` field from a parsed object
    pub fn from_map(map: JsonMap) -> Result<Self, EngineError> {
        let name = map
            .get("command")
            .and_then(Value::as_str)
            .ok_or_else(|| EngineError::Validation("No command specified".into()))?
            .to_string();
        Ok(Self { name, params: map })
    }
}

/// Helpers for pulling loosely-typed values out of a parameter map
pub mod params {
    use super::JsonMap;
    use crate::error::EngineError;
    use serde_json::Value;

    pub fn get_str<'a>(map: &'a JsonMap, key: &str) -> Option<&'a str> {
        map.get(key).and_then(Value::as_str)
    }

    pub fn get_i64(map: &JsonMap, key: &str) -> Option<i64> {
        map.get(key).and_then(Value::as_i64)
    }

    pub fn get_u64(map: &JsonMap, key: &str) -> Option<u64> {
        map.get(key).and_then(Value::as_u64)
    }

    /// A `u64` that must also fit the narrower integer type `T`
    pub fn get_int<T: TryFrom<u64>>(map: &JsonMap, key: &str) -> Option<T> {
        get_u64(map, key).and_then(|v| T::try_from(v).ok())
    }

    /// Decode an array-of-integers parameter into bytes.
    ///
    /// Returns `Ok(None)` when absent; any element outside `0..=255` is a
    /// validation error.
    pub fn get_bytes(map: &JsonMap, key: &str) -> Result<Option<Vec<u8>>, EngineError> {
        let Some(value) = map.get(key) else {
            return Ok(None);
        };
        let items = value.as_array().ok_or_else(|| {
            EngineError::Validation(format!("Parameter '{key}' must be a byte array"))
        })?;

        items
            .iter()
            .map(|item| {
                item.as_u64()
                    .and_then(|v| u8::try_from(v).ok())
                    .ok_or_else(|| {
                        EngineError::Validation(format!("Invalid byte value in '{key}'"))
                    })
            })
            .collect::<Result<Vec<u8>, _>>()
            .map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(value: Value) -> JsonMap {
        value.as_object().expect("object").clone()
    }

    #[test]
    fn test_command_requires_name() {
        let cmd = Command::from_map(map(json!({"command": "ping", "x": 1}))).expect("parse");
        assert_eq!(cmd.name, "ping");
        assert_eq!(cmd.params["x"], 1);

        assert!(matches!(
            Command::from_map(map(json!({"x": 1}))),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_get_bytes_validates_range() {
        let m = map(json!({"data": [0, 128, 255]}));
        assert_eq!(
            params::get_bytes(&m, "data").expect("bytes"),
            Some(vec![0, 128, 255])
        );

        let m = map(json!({"data": [0, 256]}));
        assert!(params::get_bytes(&m, "data").is_err());

        let m = map(json!({"data": "nope"}));
        assert!(params::get_bytes(&m, "data").is_err());

        let m = map(json!({}));
        assert_eq!(params::get_bytes(&m, "data").expect("absent"), None);
    }
}
