//! In-memory storage backend.
//!
//! Nothing survives the process; used by tests and dry runs.

use parking_lot::RwLock;
use std::collections::HashMap;
use zigsense_core::storage::{Result, StorageBackend};

/// Configuration for MemoryBackend.
#[derive(Debug, Clone, Default, serde::Deserialize, serde::Serialize)]
pub struct MemoryBackendConfig {
    /// Initial capacity hint.
    #[serde(default)]
    pub capacity: Option<usize>,
}

impl MemoryBackendConfig {
    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }
}

/// In-memory backend keyed by `namespace -> key`.
#[derive(Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, HashMap<String, Vec<u8>>>>,
}

impl MemoryBackend {
    pub fn new(config: MemoryBackendConfig) -> Self {
        let data = config
            .capacity
            .map(HashMap::with_capacity)
            .unwrap_or_default();
        Self {
            data: RwLock::new(data),
        }
    }

    /// Number of keys across all namespaces.
    pub fn len(&self) -> usize {
        self.data.read().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl StorageBackend for MemoryBackend {
    fn write(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        self.data
            .write()
            .entry(namespace.to_string())
            .or_default()
            .insert(key.to_string(), value.to_vec());
        Ok(())
    }

    fn read(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .data
            .read()
            .get(namespace)
            .and_then(|ns| ns.get(key))
            .cloned())
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        Ok(self
            .data
            .write()
            .get_mut(namespace)
            .and_then(|ns| ns.remove(key))
            .is_some())
    }

    fn keys(&self, namespace: &str, prefix: &str) -> Result<Vec<String>> {
        let data = self.data.read();
        let mut keys: Vec<String> = data
            .get(namespace)
            .map(|ns| {
                ns.keys()
                    .filter(|k| k.starts_with(prefix))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        keys.sort();
        Ok(keys)
    }

    fn is_persistent(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_read_delete() {
        let backend = MemoryBackend::default();
        backend.write("profiles", "_TZ3000_abc", b"{}").unwrap();

        assert_eq!(
            backend.read("profiles", "_TZ3000_abc").unwrap().as_deref(),
            Some(&b"{}"[..])
        );
        assert!(backend.read("other", "_TZ3000_abc").unwrap().is_none());

        assert!(backend.delete("profiles", "_TZ3000_abc").unwrap());
        assert!(!backend.delete("profiles", "_TZ3000_abc").unwrap());
        assert!(backend.is_empty());
    }

    #[test]
    fn test_keys_with_prefix() {
        let backend = MemoryBackend::new(MemoryBackendConfig::default().with_capacity(4));
        backend.write("ns", "b:2", b"2").unwrap();
        backend.write("ns", "a:1", b"1").unwrap();
        backend.write("ns", "b:1", b"1").unwrap();

        assert_eq!(backend.keys("ns", "b:").unwrap(), vec!["b:1", "b:2"]);
        assert_eq!(backend.keys("ns", "").unwrap().len(), 3);
        assert!(backend.keys("missing", "").unwrap().is_empty());
    }
}
