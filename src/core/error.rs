//! Error types for fedsave.

use thiserror::Error;

/// Result type alias for fedsave operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in fedsave operations.
#[derive(Error, Debug)]
pub enum Error {
    // Parameter errors
    #[error("Invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("Aggregation failed: {0}")]
    Aggregation(String),

    // Persistence errors
    #[error("Persisting model parameters failed: {0}")]
    Persistence(String),

    // Transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Client disconnected: {0}")]
    Disconnected(String),

    #[error("Request timed out after {0:?}")]
    Timeout(std::time::Duration),

    #[error("Protocol violation: {0}")]
    Protocol(String),

    // Control channel errors
    #[error("Control channel closed")]
    ChannelClosed,

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    // Serialization errors
    #[error("Serialization error: {0}")]
    SerializationError(String),

    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        if err.is_data() || err.is_syntax() || err.is_eof() {
            Error::DeserializationError(err.to_string())
        } else {
            Error::SerializationError(err.to_string())
        }
    }
}

impl From<bincode::Error> for Error {
    fn from(err: bincode::Error) -> Self {
        Error::SerializationError(err.to_string())
    }
}

impl From<base64::DecodeError> for Error {
    fn from(err: base64::DecodeError) -> Self {
        Error::DeserializationError(err.to_string())
    }
}
