//! Storage backends and the persistence adapter for zigsense.
//!
//! ## Features
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `redb` | ✅ | Persistent backend on the redb embedded database |
//! | `memory` | ✅ | Non-persistent backend for tests and dry runs |
//!
//! Calibration profiles are written through [`PersistenceStore`], an async
//! structured-value facade over any [`zigsense_core::StorageBackend`].

pub mod backends;
pub mod error;
pub mod persistence;

pub use backends::{available_backends, create_backend};
#[cfg(feature = "memory")]
pub use backends::{MemoryBackend, MemoryBackendConfig};
#[cfg(feature = "redb")]
pub use backends::{RedbBackend, RedbBackendConfig};
pub use error::{Error, Result};
pub use persistence::{KvPersistence, PersistenceStore};
