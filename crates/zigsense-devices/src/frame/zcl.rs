//! Generic ZCL frame decoding.
//!
//! Header layout: frame control (1), optional manufacturer code (2, LE),
//! sequence number (1), command id (1). Attribute records are little-endian.

use serde::{Deserialize, Serialize};

use super::{cluster, ButtonAction, DecodedEvent, Direction, FailureReason, RoutingMeta};

const FRAME_TYPE_MASK: u8 = 0x03;
const MANUFACTURER_SPECIFIC: u8 = 0x04;
const DIRECTION_SERVER_TO_CLIENT: u8 = 0x08;
const DISABLE_DEFAULT_RESPONSE: u8 = 0x10;

/// Tuya on/off-cluster scene command carrying a button action
const TUYA_SCENE_COMMAND: u8 = 0xFD;

/// ZCL data type identifiers handled by the decoder.
pub mod data_type {
    pub const NO_DATA: u8 = 0x00;
    pub const DATA8: u8 = 0x08;
    pub const DATA16: u8 = 0x09;
    pub const DATA24: u8 = 0x0A;
    pub const DATA32: u8 = 0x0B;
    pub const BOOL: u8 = 0x10;
    pub const BITMAP8: u8 = 0x18;
    pub const BITMAP16: u8 = 0x19;
    pub const BITMAP24: u8 = 0x1A;
    pub const BITMAP32: u8 = 0x1B;
    pub const UINT8: u8 = 0x20;
    pub const UINT16: u8 = 0x21;
    pub const UINT24: u8 = 0x22;
    pub const UINT32: u8 = 0x23;
    pub const UINT48: u8 = 0x25;
    pub const INT8: u8 = 0x28;
    pub const INT16: u8 = 0x29;
    pub const INT24: u8 = 0x2A;
    pub const INT32: u8 = 0x2B;
    pub const ENUM8: u8 = 0x30;
    pub const ENUM16: u8 = 0x31;
    pub const FLOAT32: u8 = 0x39;
    pub const OCTET_STRING: u8 = 0x41;
    pub const CHAR_STRING: u8 = 0x42;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FrameType {
    Global,
    ClusterSpecific,
}

/// Decoded ZCL header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZclHeader {
    pub frame_type: FrameType,
    pub manufacturer_code: Option<u16>,
    pub direction: Direction,
    pub disable_default_response: bool,
    pub sequence: u8,
    pub command_id: u8,
}

impl ZclHeader {
    pub fn is_manufacturer_specific(&self) -> bool {
        self.manufacturer_code.is_some()
    }
}

/// Profile-wide commands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GlobalCommand {
    ReadAttributes,
    ReadAttributesResponse,
    WriteAttributes,
    WriteAttributesResponse,
    ConfigureReporting,
    ConfigureReportingResponse,
    ReportAttributes,
    DefaultResponse,
    DiscoverAttributes,
    DiscoverAttributesResponse,
    Other(u8),
}

impl GlobalCommand {
    pub fn from_id(id: u8) -> Self {
        match id {
            0x00 => Self::ReadAttributes,
            0x01 => Self::ReadAttributesResponse,
            0x02 => Self::WriteAttributes,
            0x04 => Self::WriteAttributesResponse,
            0x06 => Self::ConfigureReporting,
            0x07 => Self::ConfigureReportingResponse,
            0x0A => Self::ReportAttributes,
            0x0B => Self::DefaultResponse,
            0x0C => Self::DiscoverAttributes,
            0x0D => Self::DiscoverAttributesResponse,
            other => Self::Other(other),
        }
    }
}

/// Decoded attribute value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum AttributeValue {
    NoData,
    Bool(bool),
    Unsigned(u64),
    Signed(i64),
    Float(f64),
    String(String),
    Octets(Vec<u8>),
    /// Unsupported data type; remaining payload as lowercase hex
    Raw(String),
}

impl AttributeValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
            Self::Unsigned(v) => Some(*v as f64),
            Self::Signed(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<&AttributeValue> for zigsense_core::CapabilityValue {
    fn from(value: &AttributeValue) -> Self {
        use zigsense_core::CapabilityValue as V;
        match value {
            AttributeValue::NoData => V::Null,
            AttributeValue::Bool(b) => V::Boolean(*b),
            AttributeValue::Unsigned(v) => V::Integer(i64::try_from(*v).unwrap_or(i64::MAX)),
            AttributeValue::Signed(v) => V::Integer(*v),
            AttributeValue::Float(v) => V::Float(*v),
            AttributeValue::String(s) => V::String(s.clone()),
            AttributeValue::Octets(b) => V::Binary(b.clone()),
            AttributeValue::Raw(hex) => V::String(hex.clone()),
        }
    }
}

/// One attribute in a report or read response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttributeRecord {
    pub attribute_id: u16,
    /// 0 for success; read responses carry the per-attribute status
    pub status: u8,
    pub data_type: u8,
    pub value: AttributeValue,
}

impl AttributeRecord {
    pub fn is_success(&self) -> bool {
        self.status == 0
    }
}

/// Body of a global command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "body", rename_all = "snake_case")]
pub enum GlobalBody {
    Attributes { records: Vec<AttributeRecord> },
    DefaultResponse { command_id: u8, status: u8 },
    Raw { payload: Vec<u8> },
}

/// Whether the first byte encodes a known ZCL frame type.
pub fn looks_like_header(bytes: &[u8]) -> bool {
    bytes
        .first()
        .is_some_and(|b| b & FRAME_TYPE_MASK <= 1)
}

/// Parse the header; returns it with the offset of the payload.
pub fn parse_header(bytes: &[u8]) -> Result<(ZclHeader, usize), DecodedEvent> {
    let Some(&control) = bytes.first() else {
        return Err(DecodedEvent::failed(FailureReason::EmptyFrame, "frame has no bytes"));
    };

    let frame_type = match control & FRAME_TYPE_MASK {
        0 => FrameType::Global,
        1 => FrameType::ClusterSpecific,
        other => {
            return Err(DecodedEvent::failed(
                FailureReason::Malformed,
                format!("reserved frame type {}", other),
            ))
        }
    };

    let manufacturer_specific = control & MANUFACTURER_SPECIFIC != 0;
    let header_len = if manufacturer_specific { 5 } else { 3 };
    if bytes.len() < header_len {
        return Err(DecodedEvent::failed(
            FailureReason::TooShort,
            format!("ZCL header needs {} bytes, got {}", header_len, bytes.len()),
        ));
    }

    let (manufacturer_code, offset) = if manufacturer_specific {
        (Some(u16::from_le_bytes([bytes[1], bytes[2]])), 3)
    } else {
        (None, 1)
    };

    let direction = if control & DIRECTION_SERVER_TO_CLIENT != 0 {
        Direction::ServerToClient
    } else {
        Direction::ClientToServer
    };

    let header = ZclHeader {
        frame_type,
        manufacturer_code,
        direction,
        disable_default_response: control & DISABLE_DEFAULT_RESPONSE != 0,
        sequence: bytes[offset],
        command_id: bytes[offset + 1],
    };
    Ok((header, header_len))
}

/// Decode a full ZCL frame.
pub fn decode(bytes: &[u8], meta: &RoutingMeta) -> DecodedEvent {
    let (header, offset) = match parse_header(bytes) {
        Ok(parsed) => parsed,
        Err(failed) => return failed,
    };
    let payload = &bytes[offset..];

    if header.frame_type == FrameType::ClusterSpecific {
        if meta.cluster_id == cluster::ON_OFF && header.command_id == TUYA_SCENE_COMMAND {
            return match payload.first() {
                Some(&code) => match ButtonAction::from_code(code) {
                    Some(action) => DecodedEvent::TuyaButtonAction {
                        button: meta.endpoint_id,
                        action,
                    },
                    None => DecodedEvent::failed(
                        FailureReason::UnknownCommand,
                        format!("unknown scene action 0x{:02X}", code),
                    ),
                },
                None => DecodedEvent::failed(FailureReason::TooShort, "scene command without action"),
            };
        }
        return DecodedEvent::ZclClusterCommand {
            header,
            payload: payload.to_vec(),
        };
    }

    let command = GlobalCommand::from_id(header.command_id);
    let body = match command {
        GlobalCommand::ReportAttributes => GlobalBody::Attributes {
            records: decode_report(payload),
        },
        GlobalCommand::ReadAttributesResponse => GlobalBody::Attributes {
            records: decode_read_response(payload),
        },
        GlobalCommand::DefaultResponse if payload.len() >= 2 => GlobalBody::DefaultResponse {
            command_id: payload[0],
            status: payload[1],
        },
        GlobalCommand::DefaultResponse => {
            return DecodedEvent::failed(FailureReason::TooShort, "default response needs 2 bytes")
        }
        _ => GlobalBody::Raw {
            payload: payload.to_vec(),
        },
    };

    DecodedEvent::ZclGlobalCommand {
        header,
        command,
        body,
    }
}

/// `{id(2), type(1), value}` records; stops at the first incomplete record.
fn decode_report(payload: &[u8]) -> Vec<AttributeRecord> {
    let mut records = Vec::new();
    let mut pos = 0;
    while payload.len() >= pos + 3 {
        let attribute_id = u16::from_le_bytes([payload[pos], payload[pos + 1]]);
        let data_type = payload[pos + 2];
        pos += 3;
        match decode_value(data_type, &payload[pos..]) {
            Some((value, used)) => {
                records.push(AttributeRecord {
                    attribute_id,
                    status: 0,
                    data_type,
                    value,
                });
                pos += used;
            }
            None => break,
        }
    }
    records
}

/// `{id(2), status(1), [type(1), value]}` records.
fn decode_read_response(payload: &[u8]) -> Vec<AttributeRecord> {
    let mut records = Vec::new();
    let mut pos = 0;
    while payload.len() >= pos + 3 {
        let attribute_id = u16::from_le_bytes([payload[pos], payload[pos + 1]]);
        let status = payload[pos + 2];
        pos += 3;

        if status != 0 {
            records.push(AttributeRecord {
                attribute_id,
                status,
                data_type: data_type::NO_DATA,
                value: AttributeValue::NoData,
            });
            continue;
        }

        let Some(&data_type) = payload.get(pos) else {
            break;
        };
        pos += 1;
        match decode_value(data_type, &payload[pos..]) {
            Some((value, used)) => {
                records.push(AttributeRecord {
                    attribute_id,
                    status,
                    data_type,
                    value,
                });
                pos += used;
            }
            None => break,
        }
    }
    records
}

fn le_unsigned(bytes: &[u8], width: usize) -> Option<u64> {
    let slice = bytes.get(..width)?;
    Some(
        slice
            .iter()
            .rev()
            .fold(0u64, |acc, b| (acc << 8) | u64::from(*b)),
    )
}

fn le_signed(bytes: &[u8], width: usize) -> Option<i64> {
    let raw = le_unsigned(bytes, width)?;
    let shift = 64 - (width as u32 * 8);
    Some(((raw << shift) as i64) >> shift)
}

/// Decode one value; returns it with the number of bytes consumed.
fn decode_value(type_id: u8, bytes: &[u8]) -> Option<(AttributeValue, usize)> {
    use self::data_type as t;

    let unsigned = |width: usize| le_unsigned(bytes, width).map(|v| (AttributeValue::Unsigned(v), width));
    let signed = |width: usize| le_signed(bytes, width).map(|v| (AttributeValue::Signed(v), width));

    match type_id {
        t::NO_DATA => Some((AttributeValue::NoData, 0)),
        t::BOOL => bytes.first().map(|b| (AttributeValue::Bool(*b != 0), 1)),
        t::DATA8 | t::BITMAP8 | t::UINT8 | t::ENUM8 => unsigned(1),
        t::DATA16 | t::BITMAP16 | t::UINT16 | t::ENUM16 => unsigned(2),
        t::DATA24 | t::BITMAP24 | t::UINT24 => unsigned(3),
        t::DATA32 | t::BITMAP32 | t::UINT32 => unsigned(4),
        t::UINT48 => unsigned(6),
        t::INT8 => signed(1),
        t::INT16 => signed(2),
        t::INT24 => signed(3),
        t::INT32 => signed(4),
        t::FLOAT32 => {
            let raw: [u8; 4] = bytes.get(..4)?.try_into().ok()?;
            Some((AttributeValue::Float(f64::from(f32::from_le_bytes(raw))), 4))
        }
        t::OCTET_STRING | t::CHAR_STRING => {
            let len = usize::from(*bytes.first()?);
            let body = bytes.get(1..1 + len)?;
            let value = if type_id == t::CHAR_STRING {
                AttributeValue::String(String::from_utf8_lossy(body).into_owned())
            } else {
                AttributeValue::Octets(body.to_vec())
            };
            Some((value, 1 + len))
        }
        _ => Some((AttributeValue::Raw(hex::encode(bytes)), bytes.len())),
    }
}
