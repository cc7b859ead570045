//! Zigbee sensor observation for zigsense.
//!
//! This crate turns raw Zigbee frames into normalized capability updates.
//!
//! ## Architecture
//!
//! - **frame**: interprets raw bytes (ZCL, Tuya datapoints, IAS zone status,
//!   Tuya buttons, numeric fallback) into a [`DecodedEvent`]
//! - **registry**: maps clusters and datapoints to capabilities and converters
//! - **calibration**: battery chemistry curves and per-manufacturer encoding
//!   learning
//! - **pipeline**: per-device observers combining push events with a poll
//!   fallback, publishing [`CapabilityUpdate`]s to a sink
//!
//! [`CapabilityUpdate`]: zigsense_core::CapabilityUpdate

pub mod calibration;
pub mod error;
pub mod frame;
pub mod pipeline;
pub mod registry;

pub use calibration::{
    CalibrationConfig, CalibrationEngine, Chemistry, ClassificationMethod, ClassificationResult,
    ClassifyInput, DataEncoding, ManufacturerProfile,
};
pub use error::{DeviceError, Result};
pub use frame::{DecodedEvent, Direction, FailureReason, FrameInterpreter, RawFrame, RoutingMeta};
pub use pipeline::{
    CapabilitySink, ChannelSink, DeviceSpec, InboundEvent, ObservationPipeline, Payload,
    PipelineConfig, PollTarget, Transport,
};
pub use registry::{
    Capability, CapabilityDescriptor, CapabilityRegistry, Converter, DescriptorSource,
    DeviceCategory,
};
