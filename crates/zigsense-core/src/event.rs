//! Capability values and the update event delivered to device-state sinks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Colour decoded from a composite hue/saturation/brightness encoding.
///
/// All components are normalized to `[0.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HsvColor {
    pub hue: f64,
    pub saturation: f64,
    pub brightness: f64,
}

/// Normalized value of a device capability.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum CapabilityValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
    Color(HsvColor),
    /// Opaque bytes (raw datapoints, unknown attribute types)
    Binary(Vec<u8>),
    Null,
}

impl CapabilityValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Integer(v) => Some(*v as f64),
            Self::Boolean(b) => Some(if *b { 1.0 } else { 0.0 }),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(v) => Some(*v),
            Self::Float(v) => Some(v.round() as i64),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(v) => Some(*v),
            Self::Integer(v) => Some(*v != 0),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(v) => Some(v),
            _ => None,
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer(_) | Self::Float(_))
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "integer",
            Self::Float(_) => "float",
            Self::Boolean(_) => "boolean",
            Self::String(_) => "string",
            Self::Color(_) => "color",
            Self::Binary(_) => "binary",
            Self::Null => "null",
        }
    }
}

impl From<i64> for CapabilityValue {
    fn from(v: i64) -> Self {
        Self::Integer(v)
    }
}

impl From<f64> for CapabilityValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for CapabilityValue {
    fn from(v: bool) -> Self {
        Self::Boolean(v)
    }
}

impl From<String> for CapabilityValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for CapabilityValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

/// Outbound capability update `{capabilityName, value, timestamp}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityUpdate {
    /// Device the update belongs to
    pub device_id: String,
    /// Capability name (e.g. `measure_battery`)
    pub capability: String,
    /// Final, converted value
    pub value: CapabilityValue,
    /// When the value was produced
    pub timestamp: DateTime<Utc>,
}

impl CapabilityUpdate {
    pub fn new(
        device_id: impl Into<String>,
        capability: impl Into<String>,
        value: CapabilityValue,
    ) -> Self {
        Self {
            device_id: device_id.into(),
            capability: capability.into(),
            value,
            timestamp: Utc::now(),
        }
    }
}
