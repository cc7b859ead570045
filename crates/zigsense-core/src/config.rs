//! Shared configuration defaults.
//!
//! Every tunable used by more than one crate lives here, together with the
//! environment variables that override it at startup.

/// Poll scheduling defaults
pub mod poll {
    /// Default interval between poll-fallback reads (5 minutes)
    pub const DEFAULT_INTERVAL_SECS: u64 = 300;
    /// Lower bound accepted for a configured interval
    pub const MIN_INTERVAL_SECS: u64 = 5;
}

/// Frame journal defaults
pub mod journal {
    /// Number of debug records retained per interpreter
    pub const DEFAULT_CAPACITY: usize = 64;
    /// Longest hex prefix kept in a journal record (bytes)
    pub const MAX_HEX_BYTES: usize = 128;
}

/// Adaptive calibration defaults
pub mod calibration {
    /// Bounded sample history per manufacturer profile
    pub const HISTORY_CAPACITY: usize = 20;
    /// Consecutive agreeing samples needed when the evidence is physical
    pub const PHYSICAL_CONFIRMATIONS: usize = 3;
    /// Consecutive agreeing samples needed when the evidence is statistical
    pub const STATISTICAL_CONFIRMATIONS: usize = 5;
    /// Weight of the learned transform when blended with a physical estimate
    pub const LEARNED_BLEND_WEIGHT: f64 = 0.7;
    /// Maximum distance (percentage points) for a physical estimate to vouch for an encoding
    pub const ENCODING_MATCH_TOLERANCE: f64 = 12.0;
    /// Storage namespace for manufacturer profiles
    pub const PROFILE_NAMESPACE: &str = "manufacturer_profiles";
}

/// Observation pipeline defaults
pub mod pipeline {
    /// Buffered inbound events per device before `submit` waits
    pub const EVENT_CHANNEL_CAPACITY: usize = 256;
    /// Rolling values kept per capability in the last-known store
    pub const LAST_KNOWN_CAPACITY: usize = 8;
}

/// Environment variables
pub mod env_vars {
    use super::{calibration, journal, poll};

    pub const POLL_INTERVAL_SECS: &str = "ZIGSENSE_POLL_INTERVAL_SECS";
    pub const JOURNAL_CAPACITY: &str = "ZIGSENSE_JOURNAL_CAPACITY";
    pub const PROFILE_HISTORY: &str = "ZIGSENSE_PROFILE_HISTORY";

    /// Poll interval from the environment, or the default.
    ///
    /// Values below [`poll::MIN_INTERVAL_SECS`] are raised to the minimum.
    pub fn poll_interval_secs() -> u64 {
        std::env::var(POLL_INTERVAL_SECS)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(poll::DEFAULT_INTERVAL_SECS)
            .max(poll::MIN_INTERVAL_SECS)
    }

    /// Journal capacity from the environment, or the default.
    pub fn journal_capacity() -> usize {
        std::env::var(JOURNAL_CAPACITY)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(journal::DEFAULT_CAPACITY)
    }

    /// Profile history capacity from the environment, or the default.
    pub fn profile_history() -> usize {
        std::env::var(PROFILE_HISTORY)
            .ok()
            .and_then(|s| s.parse().ok())
            .filter(|n: &usize| *n > 0)
            .unwrap_or(calibration::HISTORY_CAPACITY)
    }
}
