//! Tuya scene-switch buttons (cluster 0xE000).
//!
//! Frames arrive either bare (`action(1)`) or behind a cluster-specific ZCL
//! header. The button number is the source endpoint.

use serde::{Deserialize, Serialize};

use super::{zcl, DecodedEvent, FailureReason, RoutingMeta};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Single,
    Double,
    Hold,
}

impl ButtonAction {
    pub fn from_code(code: u8) -> Option<Self> {
        match code {
            0x00 => Some(Self::Single),
            0x01 => Some(Self::Double),
            0x02 => Some(Self::Hold),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Single => "single",
            Self::Double => "double",
            Self::Hold => "hold",
        }
    }
}

const ZCL_CLUSTER_SPECIFIC: u8 = 0x01;

pub fn decode(bytes: &[u8], meta: &RoutingMeta) -> DecodedEvent {
    let code = match bytes {
        [] => return DecodedEvent::failed(FailureReason::EmptyFrame, "frame has no bytes"),
        [code] => *code,
        // A ZCL header needs at least control, sequence and command bytes
        [control, _, _, ..] if control & 0x03 == ZCL_CLUSTER_SPECIFIC => {
            let offset = match zcl::parse_header(bytes) {
                Ok((_, offset)) => offset,
                Err(failed) => return failed,
            };
            match bytes.get(offset) {
                Some(code) => *code,
                None => return DecodedEvent::failed(FailureReason::TooShort, "button frame without action"),
            }
        }
        [code, ..] => *code,
    };

    match ButtonAction::from_code(code) {
        Some(action) => DecodedEvent::TuyaButtonAction {
            button: meta.endpoint_id,
            action,
        },
        None => DecodedEvent::failed(
            FailureReason::UnknownCommand,
            format!("unknown button action 0x{:02X}", code),
        ),
    }
}
