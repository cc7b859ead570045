//! Device-layer errors.

use zigsense_core::Error as CoreError;

/// Errors raised by the registry, calibration engine and observation pipeline.
///
/// Frame decoding never fails with this type; malformed frames produce a
/// failed [`DecodedEvent`](crate::DecodedEvent) instead.
#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error("Device not found: {0}")]
    NotFound(String),

    #[error("Device already registered: {0}")]
    AlreadyRegistered(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Sink error: {0}")]
    Sink(String),

    #[error("Persistence error: {0}")]
    Persistence(#[from] zigsense_storage::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Channel closed for device {0}")]
    ChannelClosed(String),
}

pub type Result<T> = std::result::Result<T, DeviceError>;

impl From<DeviceError> for CoreError {
    fn from(e: DeviceError) -> Self {
        match e {
            DeviceError::NotFound(id) => CoreError::NotFound(id),
            DeviceError::InvalidConfig(msg) => CoreError::Config(msg),
            DeviceError::Transport(msg) => CoreError::Transport(msg),
            DeviceError::Serialization(e) => CoreError::Serialization(e.to_string()),
            DeviceError::Persistence(e) => CoreError::Storage(e.to_string()),
            other => CoreError::Device(other.to_string()),
        }
    }
}
