//! Collaborator seams: the transport that delivers and reads frames, and the
//! sink that receives capability updates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use zigsense_core::{CapabilityUpdate, CapabilityValue};

use crate::error::{DeviceError, Result};
use crate::frame::{DatapointValue, Direction};

/// Payload of an inbound event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Payload {
    /// Undecoded frame bytes
    Raw(Vec<u8>),
    /// Attribute value already parsed by the transport
    Attribute {
        attribute_id: u16,
        value: CapabilityValue,
    },
    /// Tuya datapoint already parsed by the transport
    Datapoint { index: u8, value: DatapointValue },
}

/// Asynchronous notification from the transport.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InboundEvent {
    pub device_id: String,
    pub endpoint_id: u8,
    pub cluster_id: u16,
    pub direction: Direction,
    pub payload: Payload,
    pub received_at: DateTime<Utc>,
}

impl InboundEvent {
    pub fn new(device_id: impl Into<String>, endpoint_id: u8, cluster_id: u16, payload: Payload) -> Self {
        Self {
            device_id: device_id.into(),
            endpoint_id,
            cluster_id,
            direction: Direction::ServerToClient,
            payload,
            received_at: Utc::now(),
        }
    }

    /// Raw-bytes event, the common case for Zigbee attribute reports.
    pub fn raw(device_id: impl Into<String>, endpoint_id: u8, cluster_id: u16, bytes: impl Into<Vec<u8>>) -> Self {
        Self::new(device_id, endpoint_id, cluster_id, Payload::Raw(bytes.into()))
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }
}

/// Attribute to read on each poll tick.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PollTarget {
    pub endpoint_id: u8,
    pub cluster_id: u16,
    pub attribute_id: u16,
}

impl PollTarget {
    pub fn new(endpoint_id: u8, cluster_id: u16, attribute_id: u16) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            attribute_id,
        }
    }
}

/// Source of physical reads for the poll fallback.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Read one attribute from a device.
    async fn read(&self, device_id: &str, target: &PollTarget) -> Result<Payload>;
}

/// Transport for push-only deployments. Every read fails.
#[derive(Debug, Default, Clone, Copy)]
pub struct PushOnlyTransport;

#[async_trait]
impl Transport for PushOnlyTransport {
    async fn read(&self, device_id: &str, _target: &PollTarget) -> Result<Payload> {
        Err(DeviceError::Transport(format!(
            "reads not supported for {}",
            device_id
        )))
    }
}

/// Receiver of final capability values.
#[async_trait]
pub trait CapabilitySink: Send + Sync {
    async fn publish(&self, update: CapabilityUpdate) -> Result<()>;
}

/// Sink that forwards updates into a bounded mpsc channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<CapabilityUpdate>,
}

impl ChannelSink {
    pub fn new(buffer: usize) -> (Self, mpsc::Receiver<CapabilityUpdate>) {
        let (tx, rx) = mpsc::channel(buffer.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl CapabilitySink for ChannelSink {
    async fn publish(&self, update: CapabilityUpdate) -> Result<()> {
        self.tx
            .send(update)
            .await
            .map_err(|e| DeviceError::Sink(format!("receiver dropped, lost {}", e.0.capability)))
    }
}
