//! Heuristic decoding of frames no other decoder claims.
//!
//! Every fixed-width reading of the leading bytes is offered; the caller
//! picks the one that fits the capability it expects.

use serde::{Deserialize, Serialize};

use super::DecodedEvent;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NumericEncoding {
    U8,
    I8,
    U16Le,
    U16Be,
    I16Le,
    I16Be,
    U32Le,
    U32Be,
    I32Le,
    I32Be,
    F32Le,
    F32Be,
}

impl NumericEncoding {
    /// Width in bytes.
    pub fn width(&self) -> usize {
        match self {
            Self::U8 | Self::I8 => 1,
            Self::U16Le | Self::U16Be | Self::I16Le | Self::I16Be => 2,
            _ => 4,
        }
    }

    pub fn is_signed(&self) -> bool {
        matches!(
            self,
            Self::I8 | Self::I16Le | Self::I16Be | Self::I32Le | Self::I32Be | Self::F32Le | Self::F32Be
        )
    }

    pub fn is_little_endian(&self) -> bool {
        matches!(
            self,
            Self::U8 | Self::I8 | Self::U16Le | Self::I16Le | Self::U32Le | Self::I32Le | Self::F32Le
        )
    }
}

/// One possible reading of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct NumericCandidate {
    pub encoding: NumericEncoding,
    pub value: f64,
}

/// All candidates the buffer length supports.
pub fn candidates(bytes: &[u8]) -> Vec<NumericCandidate> {
    let mut out = Vec::new();
    let mut push = |encoding, value: f64| {
        if value.is_finite() {
            out.push(NumericCandidate { encoding, value });
        }
    };

    if let Some(&b) = bytes.first() {
        push(NumericEncoding::U8, f64::from(b));
        push(NumericEncoding::I8, f64::from(b as i8));
    }
    if let Some(w) = bytes.get(..2).and_then(|s| <[u8; 2]>::try_from(s).ok()) {
        push(NumericEncoding::U16Le, f64::from(u16::from_le_bytes(w)));
        push(NumericEncoding::U16Be, f64::from(u16::from_be_bytes(w)));
        push(NumericEncoding::I16Le, f64::from(i16::from_le_bytes(w)));
        push(NumericEncoding::I16Be, f64::from(i16::from_be_bytes(w)));
    }
    if let Some(w) = bytes.get(..4).and_then(|s| <[u8; 4]>::try_from(s).ok()) {
        push(NumericEncoding::U32Le, f64::from(u32::from_le_bytes(w)));
        push(NumericEncoding::U32Be, f64::from(u32::from_be_bytes(w)));
        push(NumericEncoding::I32Le, f64::from(i32::from_le_bytes(w)));
        push(NumericEncoding::I32Be, f64::from(i32::from_be_bytes(w)));
        push(NumericEncoding::F32Le, f64::from(f32::from_le_bytes(w)));
        push(NumericEncoding::F32Be, f64::from(f32::from_be_bytes(w)));
    }
    out
}

/// The buffer as text, when every byte is printable ASCII.
pub fn printable_text(bytes: &[u8]) -> Option<String> {
    if bytes.is_empty() || !bytes.iter().all(|b| (0x20..=0x7E).contains(b)) {
        return None;
    }
    Some(bytes.iter().map(|b| char::from(*b)).collect())
}

pub fn decode(bytes: &[u8]) -> DecodedEvent {
    DecodedEvent::GenericNumeric {
        candidates: candidates(bytes),
        text: printable_text(bytes),
    }
}

/// Candidate matching `encoding`, if the buffer supported it.
pub fn pick(candidates: &[NumericCandidate], encoding: NumericEncoding) -> Option<f64> {
    candidates
        .iter()
        .find(|c| c.encoding == encoding)
        .map(|c| c.value)
}
