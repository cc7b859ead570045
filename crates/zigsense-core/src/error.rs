//! Unified error handling for zigsense.
//!
//! This module provides a common error type used across crates so that
//! storage, device and pipeline failures can be reported uniformly.

/// Unified error type for zigsense.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Configuration-related errors.
    #[error("Configuration error: {0}")]
    Config(String),

    /// Storage/database errors.
    #[error("Storage error: {0}")]
    Storage(String),

    /// Device-related errors.
    #[error("Device error: {0}")]
    Device(String),

    /// Transport (radio stack) errors.
    #[error("Transport error: {0}")]
    Transport(String),

    /// Serialization/deserialization errors.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Validation errors.
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found errors.
    #[error("Not found: {0}")]
    NotFound(String),
}

/// Result type alias for convenience.
pub type Result<T> = std::result::Result<T, Error>;

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

impl From<crate::storage::StorageError> for Error {
    fn from(e: crate::storage::StorageError) -> Self {
        match e {
            crate::storage::StorageError::KeyNotFound(k) => Error::NotFound(k),
            crate::storage::StorageError::Configuration(s) => Error::Config(s),
            crate::storage::StorageError::Serialization(s) => Error::Serialization(s),
            other => Error::Storage(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_error_conversion() {
        let err: Error = crate::storage::StorageError::KeyNotFound("profile:x".into()).into();
        assert!(matches!(err, Error::NotFound(ref k) if k == "profile:x"));
    }
}
