//! Tuya datapoint protocol (cluster 0xEF00).
//!
//! Two payload shapes share the cluster:
//!
//! - datapoint report: `status(1) seq(1)` followed by blocks of
//!   `index(1) type(1) length(2, BE) value(length)`
//! - command frame: `command(1)` followed by a command-specific payload
//!
//! Datapoint values are big-endian.

use serde::{Deserialize, Serialize};
use zigsense_core::CapabilityValue;

use super::{DecodedEvent, FailureReason};

/// Smallest datapoint report: status, seq and one 5-byte block.
const MIN_REPORT_LEN: usize = 7;
const BLOCK_HEADER_LEN: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DatapointType {
    Raw,
    Bool,
    Value,
    String,
    Enum,
    Bitmap,
    Unknown(u8),
}

impl DatapointType {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x00 => Self::Raw,
            0x01 => Self::Bool,
            0x02 => Self::Value,
            0x03 => Self::String,
            0x04 => Self::Enum,
            0x05 => Self::Bitmap,
            other => Self::Unknown(other),
        }
    }

    pub fn id(&self) -> u8 {
        match self {
            Self::Raw => 0x00,
            Self::Bool => 0x01,
            Self::Value => 0x02,
            Self::String => 0x03,
            Self::Enum => 0x04,
            Self::Bitmap => 0x05,
            Self::Unknown(id) => *id,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum DatapointValue {
    Raw(Vec<u8>),
    Bool(bool),
    Value(i32),
    String(String),
    Enum(u8),
    Bitmap(u32),
}

impl DatapointValue {
    pub fn dp_type(&self) -> DatapointType {
        match self {
            Self::Raw(_) => DatapointType::Raw,
            Self::Bool(_) => DatapointType::Bool,
            Self::Value(_) => DatapointType::Value,
            Self::String(_) => DatapointType::String,
            Self::Enum(_) => DatapointType::Enum,
            Self::Bitmap(_) => DatapointType::Bitmap,
        }
    }
}

impl From<&DatapointValue> for CapabilityValue {
    fn from(value: &DatapointValue) -> Self {
        match value {
            DatapointValue::Raw(bytes) => CapabilityValue::Binary(bytes.clone()),
            DatapointValue::Bool(b) => CapabilityValue::Boolean(*b),
            DatapointValue::Value(v) => CapabilityValue::Integer(i64::from(*v)),
            DatapointValue::String(s) => CapabilityValue::String(s.clone()),
            DatapointValue::Enum(v) => CapabilityValue::Integer(i64::from(*v)),
            DatapointValue::Bitmap(v) => CapabilityValue::Integer(i64::from(*v)),
        }
    }
}

/// A single decoded datapoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Datapoint {
    pub index: u8,
    pub dp_type: DatapointType,
    /// Declared value length in bytes
    pub length: u16,
    pub value: DatapointValue,
}

impl Datapoint {
    /// Build a datapoint, choosing the wire length for its value.
    pub fn new(index: u8, value: DatapointValue) -> Self {
        let length = match &value {
            DatapointValue::Raw(bytes) => bytes.len(),
            DatapointValue::Bool(_) | DatapointValue::Enum(_) => 1,
            DatapointValue::Value(_) => 4,
            DatapointValue::String(s) => s.len(),
            DatapointValue::Bitmap(bits) if *bits <= 0xFF => 1,
            DatapointValue::Bitmap(bits) if *bits <= 0xFFFF => 2,
            DatapointValue::Bitmap(_) => 4,
        };
        Self {
            index,
            dp_type: value.dp_type(),
            length: u16::try_from(length).unwrap_or(u16::MAX),
            value,
        }
    }
}

/// Tuya cluster commands that are not datapoint reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TuyaCommand {
    McuVersionRequest,
    McuVersionResponse,
    OtaNotify,
    TimeSyncRequest,
    Other(u8),
}

impl TuyaCommand {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x10 => Self::McuVersionRequest,
            0x11 => Self::McuVersionResponse,
            0x12 => Self::OtaNotify,
            0x24 => Self::TimeSyncRequest,
            other => Self::Other(other),
        }
    }
}

/// Decode a Tuya cluster payload.
pub fn decode(bytes: &[u8]) -> DecodedEvent {
    let Some(&first) = bytes.first() else {
        return DecodedEvent::failed(FailureReason::EmptyFrame, "frame has no bytes");
    };

    if first <= 0x01 && bytes.len() >= MIN_REPORT_LEN {
        return decode_report(bytes);
    }

    DecodedEvent::TuyaCommand {
        command: TuyaCommand::from_id(first),
        payload: bytes[1..].to_vec(),
    }
}

fn decode_report(bytes: &[u8]) -> DecodedEvent {
    let status = bytes[0];
    let sequence = bytes[1];
    let mut datapoints = Vec::new();
    let mut pos = 2;

    // A trailing partial block header is ignored
    while bytes.len() >= pos + BLOCK_HEADER_LEN {
        let index = bytes[pos];
        let type_id = bytes[pos + 1];
        let length = u16::from_be_bytes([bytes[pos + 2], bytes[pos + 3]]);
        pos += BLOCK_HEADER_LEN;

        let end = pos + usize::from(length);
        let Some(raw) = bytes.get(pos..end) else {
            return DecodedEvent::failed(
                FailureReason::TooShort,
                format!(
                    "datapoint {} declares {} bytes, {} remain",
                    index,
                    length,
                    bytes.len() - pos
                ),
            );
        };
        pos = end;

        let dp_type = DatapointType::from_id(type_id);
        let value = match decode_value(dp_type, raw) {
            Some(value) => value,
            None => {
                return DecodedEvent::failed(
                    FailureReason::Malformed,
                    format!("datapoint {} has invalid {:?} length {}", index, dp_type, length),
                )
            }
        };

        datapoints.push(Datapoint {
            index,
            dp_type,
            length,
            value,
        });
    }

    DecodedEvent::TuyaDatapointReport {
        status,
        sequence,
        datapoints,
    }
}

fn be_unsigned(raw: &[u8]) -> Option<u32> {
    match raw.len() {
        1 | 2 | 4 => Some(raw.iter().fold(0u32, |acc, b| (acc << 8) | u32::from(*b))),
        _ => None,
    }
}

fn decode_value(dp_type: DatapointType, raw: &[u8]) -> Option<DatapointValue> {
    match dp_type {
        DatapointType::Raw | DatapointType::Unknown(_) => Some(DatapointValue::Raw(raw.to_vec())),
        DatapointType::Bool => raw.first().map(|b| DatapointValue::Bool(*b != 0)),
        DatapointType::Value => {
            let value = match raw.len() {
                1 => i32::from(raw[0] as i8),
                2 => i32::from(i16::from_be_bytes([raw[0], raw[1]])),
                4 => i32::from_be_bytes([raw[0], raw[1], raw[2], raw[3]]),
                _ => return None,
            };
            Some(DatapointValue::Value(value))
        }
        DatapointType::String => Some(DatapointValue::String(String::from_utf8_lossy(raw).into_owned())),
        DatapointType::Enum => raw.first().map(|b| DatapointValue::Enum(*b)),
        DatapointType::Bitmap => be_unsigned(raw).map(DatapointValue::Bitmap),
    }
}

/// Encode datapoints into a report payload (`status`, `sequence`, blocks).
pub fn encode_datapoints(status: u8, sequence: u8, datapoints: &[Datapoint]) -> Vec<u8> {
    let mut out = vec![status, sequence];
    for dp in datapoints {
        let mut value = encode_value(&dp.value, dp.length);
        // Values past the 16-bit length field are cut, never wrapped
        let length = u16::try_from(value.len()).unwrap_or(u16::MAX);
        value.truncate(usize::from(length));
        out.push(dp.index);
        out.push(dp.dp_type.id());
        out.extend_from_slice(&length.to_be_bytes());
        out.extend_from_slice(&value);
    }
    out
}

fn encode_value(value: &DatapointValue, length: u16) -> Vec<u8> {
    match value {
        DatapointValue::Raw(bytes) => bytes.clone(),
        DatapointValue::Bool(b) => vec![u8::from(*b)],
        DatapointValue::Value(v) => v.to_be_bytes().to_vec(),
        DatapointValue::String(s) => s.as_bytes().to_vec(),
        DatapointValue::Enum(v) => vec![*v],
        DatapointValue::Bitmap(bits) => {
            let bytes = bits.to_be_bytes();
            match length {
                1 => bytes[3..].to_vec(),
                2 => bytes[2..].to_vec(),
                _ => bytes.to_vec(),
            }
        }
    }
}
