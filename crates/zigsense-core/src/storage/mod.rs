//! Core storage abstractions for zigsense.
//!
//! Backends are plain namespaced key-value stores. The calibration engine's
//! profile table is the only structured data kept in them today.

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;

/// Storage error types.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Key not found.
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Backend error.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Namespaced key-value storage backend.
///
/// Implementations are synchronous; async callers wrap them at the seam
/// where suspension is allowed.
pub trait StorageBackend: Send + Sync {
    /// Write a value to a key in the specified namespace.
    fn write(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()>;

    /// Read a value by key from the specified namespace.
    fn read(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>>;

    /// Delete a key. Returns whether the key existed.
    fn delete(&self, namespace: &str, key: &str) -> Result<bool>;

    /// List all keys in a namespace starting with `prefix`.
    fn keys(&self, namespace: &str, prefix: &str) -> Result<Vec<String>>;

    /// Whether data survives a process restart.
    fn is_persistent(&self) -> bool;
}
