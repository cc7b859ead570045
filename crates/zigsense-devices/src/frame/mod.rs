//! Frame interpretation.
//!
//! [`decode`] classifies a raw frame by its routing metadata and hands it to
//! the matching decoder. Every decoder is total: malformed input yields
//! [`DecodedEvent::Failed`] with a [`FailureReason`], never a panic.
//!
//! [`FrameInterpreter`] wraps [`decode`] with a bounded debug journal.

pub mod button;
pub mod ias;
pub mod journal;
pub mod numeric;
pub mod tuya;
pub mod zcl;

use serde::{Deserialize, Serialize};

use crate::registry::DeviceCategory;

pub use button::ButtonAction;
pub use ias::IasZoneStatus;
pub use journal::{FrameJournal, JournalRecord};
pub use numeric::{NumericCandidate, NumericEncoding};
pub use tuya::{Datapoint, DatapointType, DatapointValue, TuyaCommand};
pub use zcl::{AttributeRecord, AttributeValue, FrameType, GlobalBody, GlobalCommand, ZclHeader};

/// Well-known cluster identifiers.
pub mod cluster {
    pub const POWER_CONFIGURATION: u16 = 0x0001;
    pub const ON_OFF: u16 = 0x0006;
    pub const LEVEL_CONTROL: u16 = 0x0008;
    pub const COLOR_CONTROL: u16 = 0x0300;
    pub const ILLUMINANCE: u16 = 0x0400;
    pub const TEMPERATURE: u16 = 0x0402;
    pub const PRESSURE: u16 = 0x0403;
    pub const HUMIDITY: u16 = 0x0405;
    pub const OCCUPANCY: u16 = 0x0406;
    pub const IAS_ZONE: u16 = 0x0500;
    pub const METERING: u16 = 0x0702;
    pub const ELECTRICAL_MEASUREMENT: u16 = 0x0B04;
    /// Tuya manufacturer-specific datapoint cluster
    pub const TUYA_DATAPOINTS: u16 = 0xEF00;
    /// Tuya scene-switch button cluster
    pub const TUYA_BUTTON: u16 = 0xE000;
}

/// Frame direction relative to the cluster server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    ClientToServer,
    ServerToClient,
}

/// Routing metadata that accompanies every inbound frame.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingMeta {
    pub endpoint_id: u8,
    pub cluster_id: u16,
    pub direction: Direction,
    /// Manufacturer name reported by the device, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer: Option<String>,
    /// Category of the sending device, passed through untouched
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<DeviceCategory>,
}

impl RoutingMeta {
    pub fn new(endpoint_id: u8, cluster_id: u16) -> Self {
        Self {
            endpoint_id,
            cluster_id,
            direction: Direction::ServerToClient,
            manufacturer: None,
            category: None,
        }
    }

    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    pub fn with_manufacturer(mut self, manufacturer: impl Into<String>) -> Self {
        self.manufacturer = Some(manufacturer.into());
        self
    }

    pub fn with_category(mut self, category: DeviceCategory) -> Self {
        self.category = Some(category);
        self
    }
}

/// An owned frame as delivered by the transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawFrame {
    pub bytes: Vec<u8>,
    pub meta: RoutingMeta,
}

impl RawFrame {
    pub fn new(bytes: impl Into<Vec<u8>>, meta: RoutingMeta) -> Self {
        Self {
            bytes: bytes.into(),
            meta,
        }
    }
}

/// Why a frame could not be decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReason {
    EmptyFrame,
    TooShort,
    UnknownCommand,
    Malformed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::EmptyFrame => "empty_frame",
            Self::TooShort => "too_short",
            Self::UnknownCommand => "unknown_command",
            Self::Malformed => "malformed",
        }
    }
}

impl std::fmt::Display for FailureReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of interpreting one frame.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DecodedEvent {
    /// ZCL profile-wide command (report, read response, default response, ...)
    ZclGlobalCommand {
        header: ZclHeader,
        command: GlobalCommand,
        body: GlobalBody,
    },
    /// ZCL cluster-specific command; payload left for the cluster owner
    ZclClusterCommand { header: ZclHeader, payload: Vec<u8> },
    /// Tuya datapoint report (status, sequence, datapoints)
    TuyaDatapointReport {
        status: u8,
        sequence: u8,
        datapoints: Vec<Datapoint>,
    },
    /// Tuya command-style frame (MCU version, time sync, ...)
    TuyaCommand { command: TuyaCommand, payload: Vec<u8> },
    TuyaButtonAction { button: u8, action: ButtonAction },
    IasZoneStatus(IasZoneStatus),
    /// Heuristic fallback for unclassified frames
    GenericNumeric {
        candidates: Vec<NumericCandidate>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        text: Option<String>,
    },
    Failed { reason: FailureReason, detail: String },
}

impl DecodedEvent {
    pub(crate) fn failed(reason: FailureReason, detail: impl Into<String>) -> Self {
        Self::Failed {
            reason,
            detail: detail.into(),
        }
    }

    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed { .. })
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            Self::Failed { reason, .. } => Some(*reason),
            _ => None,
        }
    }

    /// Short tag naming the variant, used in logs and the journal.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ZclGlobalCommand { .. } => "zcl_global_command",
            Self::ZclClusterCommand { .. } => "zcl_cluster_command",
            Self::TuyaDatapointReport { .. } => "tuya_datapoint_report",
            Self::TuyaCommand { .. } => "tuya_command",
            Self::TuyaButtonAction { .. } => "tuya_button_action",
            Self::IasZoneStatus(_) => "ias_zone_status",
            Self::GenericNumeric { .. } => "generic_numeric",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Decode one frame. Pure and total.
pub fn decode(bytes: &[u8], meta: &RoutingMeta) -> DecodedEvent {
    if bytes.is_empty() {
        return DecodedEvent::failed(FailureReason::EmptyFrame, "frame has no bytes");
    }

    match meta.cluster_id {
        cluster::TUYA_DATAPOINTS => tuya::decode(bytes),
        cluster::IAS_ZONE => ias::decode(bytes),
        cluster::TUYA_BUTTON => button::decode(bytes, meta),
        _ if zcl::looks_like_header(bytes) => zcl::decode(bytes, meta),
        _ => numeric::decode(bytes),
    }
}

/// Frame decoder with a bounded journal of recent frames.
pub struct FrameInterpreter {
    journal: FrameJournal,
}

impl FrameInterpreter {
    pub fn new(journal_capacity: usize) -> Self {
        Self {
            journal: FrameJournal::new(journal_capacity),
        }
    }

    /// Decode a frame and record it in the journal.
    pub fn interpret(&mut self, bytes: &[u8], meta: &RoutingMeta) -> DecodedEvent {
        let event = decode(bytes, meta);
        if let DecodedEvent::Failed { reason, detail } = &event {
            tracing::debug!(
                cluster = %format!("0x{:04X}", meta.cluster_id),
                endpoint = meta.endpoint_id,
                %reason,
                "Frame decode failed: {}",
                detail
            );
        }
        self.journal.record(bytes, meta, event.kind());
        event
    }

    pub fn interpret_frame(&mut self, frame: &RawFrame) -> DecodedEvent {
        self.interpret(&frame.bytes, &frame.meta)
    }

    pub fn journal(&self) -> &FrameJournal {
        &self.journal
    }
}

impl Default for FrameInterpreter {
    fn default() -> Self {
        Self::new(zigsense_core::config::env_vars::journal_capacity())
    }
}
