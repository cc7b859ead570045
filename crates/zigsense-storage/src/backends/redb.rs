//! Redb storage backend implementation.
//!
//! All namespaces share one table; keys are stored as `namespace:key`.

use lru::LruCache;
use parking_lot::Mutex;
use redb::backends::InMemoryBackend;
use redb::{Database, ReadableTable, TableDefinition, TableError};
use std::num::NonZeroUsize;
use std::path::Path;
use zigsense_core::storage::{Result, StorageBackend, StorageError};

const KV_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("zigsense_kv");

const DEFAULT_CACHE_CAPACITY: usize = 256;

const MEMORY_PATH: &str = ":memory:";

/// Configuration for RedbBackend.
#[derive(Debug, Clone, serde::Deserialize, serde::Serialize)]
pub struct RedbBackendConfig {
    /// Path to the database file, or `:memory:`.
    pub path: String,

    /// Create parent directories if they don't exist.
    #[serde(default = "default_create_dirs")]
    pub create_dirs: bool,

    /// LRU read cache capacity (entries). 0 disables the cache.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

fn default_create_dirs() -> bool {
    true
}

fn default_cache_capacity() -> usize {
    DEFAULT_CACHE_CAPACITY
}

impl RedbBackendConfig {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            create_dirs: true,
            cache_capacity: DEFAULT_CACHE_CAPACITY,
        }
    }

    pub fn with_create_dirs(mut self, create_dirs: bool) -> Self {
        self.create_dirs = create_dirs;
        self
    }

    pub fn with_cache_capacity(mut self, capacity: usize) -> Self {
        self.cache_capacity = capacity;
        self
    }

    /// Config for a database that lives only in memory.
    pub fn memory() -> Self {
        Self {
            path: MEMORY_PATH.to_string(),
            create_dirs: false,
            cache_capacity: 0,
        }
    }
}

fn make_key(namespace: &str, key: &str) -> String {
    let mut result = String::with_capacity(namespace.len() + key.len() + 1);
    result.push_str(namespace);
    result.push(':');
    result.push_str(key);
    result
}

fn backend_err(e: impl std::fmt::Display) -> StorageError {
    StorageError::Backend(e.to_string())
}

/// redb-backed persistent key-value store with a write-through LRU cache.
pub struct RedbBackend {
    db: Database,
    path: String,
    cache: Option<Mutex<LruCache<String, Vec<u8>>>>,
}

impl RedbBackend {
    pub fn new(config: RedbBackendConfig) -> Result<Self> {
        let db = if config.path == MEMORY_PATH {
            Database::builder()
                .create_with_backend(InMemoryBackend::new())
                .map_err(backend_err)?
        } else {
            let path = Path::new(&config.path);
            if config.create_dirs {
                if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                    std::fs::create_dir_all(parent)?;
                }
            }
            // `create` opens an existing file without truncating it
            Database::create(path).map_err(backend_err)?
        };

        let cache = NonZeroUsize::new(config.cache_capacity).map(|cap| Mutex::new(LruCache::new(cap)));

        tracing::debug!(path = %config.path, "Opened redb backend");

        Ok(Self {
            db,
            path: config.path,
            cache,
        })
    }

    /// Open or create a redb backend at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(RedbBackendConfig::new(path.as_ref().to_string_lossy().to_string()))
    }

    pub fn path(&self) -> &str {
        &self.path
    }
}

impl StorageBackend for RedbBackend {
    fn write(&self, namespace: &str, key: &str, value: &[u8]) -> Result<()> {
        let namespaced = make_key(namespace, key);

        let txn = self.db.begin_write().map_err(backend_err)?;
        {
            let mut table = txn.open_table(KV_TABLE).map_err(backend_err)?;
            table.insert(namespaced.as_str(), value).map_err(backend_err)?;
        }
        txn.commit().map_err(backend_err)?;

        if let Some(cache) = &self.cache {
            cache.lock().put(namespaced, value.to_vec());
        }
        Ok(())
    }

    fn read(&self, namespace: &str, key: &str) -> Result<Option<Vec<u8>>> {
        let namespaced = make_key(namespace, key);

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.lock().get(&namespaced) {
                return Ok(Some(hit.clone()));
            }
        }

        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = match txn.open_table(KV_TABLE) {
            Ok(table) => table,
            // Nothing has been written yet
            Err(TableError::TableDoesNotExist(_)) => return Ok(None),
            Err(e) => return Err(backend_err(e)),
        };

        let value = table
            .get(namespaced.as_str())
            .map_err(backend_err)?
            .map(|guard| guard.value().to_vec());

        if let (Some(cache), Some(data)) = (&self.cache, &value) {
            cache.lock().put(namespaced, data.clone());
        }
        Ok(value)
    }

    fn delete(&self, namespace: &str, key: &str) -> Result<bool> {
        let namespaced = make_key(namespace, key);

        if let Some(cache) = &self.cache {
            cache.lock().pop(&namespaced);
        }

        let txn = self.db.begin_write().map_err(backend_err)?;
        let removed = {
            let mut table = txn.open_table(KV_TABLE).map_err(backend_err)?;
            let existed = table.remove(namespaced.as_str()).map_err(backend_err)?.is_some();
            existed
        };
        txn.commit().map_err(backend_err)?;
        Ok(removed)
    }

    fn keys(&self, namespace: &str, prefix: &str) -> Result<Vec<String>> {
        let namespaced_prefix = make_key(namespace, prefix);
        let strip = namespace.len() + 1;

        let txn = self.db.begin_read().map_err(backend_err)?;
        let table = match txn.open_table(KV_TABLE) {
            Ok(table) => table,
            Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
            Err(e) => return Err(backend_err(e)),
        };

        let mut keys = Vec::new();
        for item in table.iter().map_err(backend_err)? {
            let (key, _) = item.map_err(backend_err)?;
            let key = key.value();
            if key.starts_with(&namespaced_prefix) {
                if let Some(rest) = key.get(strip..) {
                    keys.push(rest.to_string());
                }
            }
        }
        Ok(keys)
    }

    fn is_persistent(&self) -> bool {
        self.path != MEMORY_PATH
    }
}
