//! Engine error taxonomy
//!
//! Every failure the engine can report over the wire is one of these kinds.
//! All of them are recovered at the dispatcher/manager boundary and turned
//! into an error response; none may terminate the run loop.

use thiserror::Error;

/// Errors produced while framing, parsing, dispatching or executing commands
#[derive(Error, Debug)]
pub enum EngineError {
    /// Frame could not be parsed as a command
    #[error("{0}")]
    Parse(String),

    /// Missing or invalid parameters (caller-fixable)
    #[error("{0}")]
    Validation(String),

    /// Command name not present in the registry or vocabulary
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Input buffer capacity exceeded; the partial frame was dropped
    #[error("Buffer overflow")]
    BufferOverflow,

    /// Operation not valid in the engine's current mode
    #[error("{0}")]
    InvalidState(String),

    /// OTA protocol failure (size/checksum mismatch, bad transition, io)
    #[error("{0}")]
    Ota(String),

    /// Failure reported by a registered collaborator handler
    #[error("Handler error: {0}")]
    Handler(String),
}

impl EngineError {
    /// True for failures the caller can fix by correcting the request
    pub fn is_caller_error(&self) -> bool {
        matches!(
            self,
            EngineError::Parse(_)
                | EngineError::Validation(_)
                | EngineError::UnknownCommand(_)
                | EngineError::InvalidState(_)
        )
    }
}
