//! Structured-value persistence over a key-value backend.
//!
//! [`PersistenceStore`] is the collaborator the calibration engine writes its
//! manufacturer profiles through. Backend calls may block on disk I/O, so
//! [`KvPersistence`] moves them onto the blocking pool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use zigsense_core::StorageBackend;

use crate::{Error, Result};

/// Async `get`/`set` of structured values keyed by string.
#[async_trait]
pub trait PersistenceStore: Send + Sync {
    /// Fetch the value stored under `key`, if any.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Value) -> Result<()>;

    /// Remove `key`. Returns whether it existed.
    async fn delete(&self, key: &str) -> Result<bool>;
}

/// JSON values in one namespace of a [`StorageBackend`].
#[derive(Clone)]
pub struct KvPersistence {
    backend: Arc<dyn StorageBackend>,
    namespace: String,
}

impl KvPersistence {
    pub fn new(backend: Arc<dyn StorageBackend>, namespace: impl Into<String>) -> Self {
        Self {
            backend,
            namespace: namespace.into(),
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Keys currently stored in this namespace.
    pub async fn keys(&self) -> Result<Vec<String>> {
        let backend = self.backend.clone();
        let namespace = self.namespace.clone();
        let keys = tokio::task::spawn_blocking(move || backend.keys(&namespace, "")).await??;
        Ok(keys)
    }
}

fn validate_key(key: &str) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidInput("persistence key must not be empty".to_string()));
    }
    Ok(())
}

#[async_trait]
impl PersistenceStore for KvPersistence {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        validate_key(key)?;
        let backend = self.backend.clone();
        let namespace = self.namespace.clone();
        let key = key.to_string();

        let bytes = tokio::task::spawn_blocking(move || backend.read(&namespace, &key)).await??;
        match bytes {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        validate_key(key)?;
        let bytes = serde_json::to_vec(&value)?;
        let backend = self.backend.clone();
        let namespace = self.namespace.clone();
        let key = key.to_string();

        tokio::task::spawn_blocking(move || backend.write(&namespace, &key, &bytes)).await??;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        validate_key(key)?;
        let backend = self.backend.clone();
        let namespace = self.namespace.clone();
        let key = key.to_string();

        let existed = tokio::task::spawn_blocking(move || backend.delete(&namespace, &key)).await??;
        Ok(existed)
    }
}
