//! Storage backend implementations.
//!
//! Each backend implements [`StorageBackend`] and is feature-gated.

use serde_json::Value;
use std::sync::Arc;
use zigsense_core::storage::{Result, StorageBackend, StorageError};

#[cfg(feature = "redb")]
pub mod redb;

#[cfg(feature = "memory")]
pub mod memory;

#[cfg(feature = "redb")]
pub use redb::{RedbBackend, RedbBackendConfig};

#[cfg(feature = "memory")]
pub use memory::{MemoryBackend, MemoryBackendConfig};

/// Create a storage backend by type identifier.
///
/// # Example
/// ```no_run
/// use zigsense_storage::backends::create_backend;
/// use serde_json::json;
///
/// # fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = create_backend("redb", &json!({ "path": "./data/zigsense.redb" }))?;
/// assert!(backend.is_persistent());
/// # Ok(())
/// # }
/// ```
pub fn create_backend(backend_type: &str, config: &Value) -> Result<Arc<dyn StorageBackend>> {
    match backend_type {
        #[cfg(feature = "redb")]
        "redb" => {
            let cfg: RedbBackendConfig = serde_json::from_value(config.clone()).map_err(|e| {
                StorageError::Configuration(format!("Invalid redb config: {}", e))
            })?;
            Ok(Arc::new(RedbBackend::new(cfg)?))
        }

        #[cfg(feature = "memory")]
        "memory" => {
            let cfg: MemoryBackendConfig = serde_json::from_value(config.clone()).map_err(|e| {
                StorageError::Configuration(format!("Invalid memory config: {}", e))
            })?;
            Ok(Arc::new(MemoryBackend::new(cfg)))
        }

        _ => Err(StorageError::Configuration(format!(
            "Unknown backend type: {}. Available backends: {}",
            backend_type,
            available_backends().join(", ")
        ))),
    }
}

/// Backend type identifiers compiled into this build.
pub fn available_backends() -> Vec<&'static str> {
    let mut backends = Vec::new();
    #[cfg(feature = "redb")]
    backends.push("redb");
    #[cfg(feature = "memory")]
    backends.push("memory");
    backends
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_available_backends() {
        assert!(!available_backends().is_empty());
    }

    #[test]
    fn test_create_backend_unknown() {
        let result = create_backend("sqlite", &serde_json::json!({}));
        assert!(matches!(result, Err(StorageError::Configuration(_))));
    }

    #[cfg(feature = "memory")]
    #[test]
    fn test_create_memory_backend() {
        let backend = create_backend("memory", &serde_json::json!({})).unwrap();
        assert!(!backend.is_persistent());
    }
}
