//! Core traits and types for zigsense.
//!
//! This crate defines the foundational abstractions shared by the storage
//! and device crates: the unified error type, the key-value storage trait,
//! runtime configuration defaults and the capability-update event.

pub mod config;
pub mod error;
pub mod event;
pub mod storage;

pub use error::{Error, Result};
pub use event::{CapabilityUpdate, CapabilityValue};
pub use storage::{StorageBackend, StorageError};

/// Re-exports commonly used types.
pub mod prelude {
    pub use crate::config::{calibration, env_vars, journal, pipeline, poll};
    pub use crate::error::{Error, Result};
    pub use crate::event::{CapabilityUpdate, CapabilityValue};
    pub use crate::storage::{StorageBackend, StorageError};
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
