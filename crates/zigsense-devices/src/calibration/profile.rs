//! Per-manufacturer learned battery encoding.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::curves::Chemistry;

/// How a manufacturer reports battery level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum DataEncoding {
    /// Already a percentage
    #[serde(rename = "0-100")]
    Percent100,
    /// Half-percent steps
    #[serde(rename = "0-200")]
    Percent200,
    /// Full byte range
    #[serde(rename = "0-255")]
    Scale255,
    #[default]
    #[serde(rename = "unknown")]
    Unknown,
}

impl DataEncoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Percent100 => "0-100",
            Self::Percent200 => "0-200",
            Self::Scale255 => "0-255",
            Self::Unknown => "unknown",
        }
    }

    /// Raw value as a percentage, unclamped. `None` for `Unknown`.
    pub fn to_percent(&self, raw: f64) -> Option<f64> {
        match self {
            Self::Percent100 => Some(raw),
            Self::Percent200 => Some(raw / 2.0),
            Self::Scale255 => Some(raw / 2.55),
            Self::Unknown => None,
        }
    }

    /// Encodings whose range can hold `raw`, as `(encoding, percentage)`.
    pub fn candidates(raw: f64) -> Vec<(DataEncoding, f64)> {
        [Self::Percent100, Self::Percent200, Self::Scale255]
            .into_iter()
            .filter(|e| raw >= 0.0 && raw <= e.max_raw())
            .filter_map(|e| e.to_percent(raw).map(|p| (e, p)))
            .collect()
    }

    /// Largest raw value the encoding can produce.
    pub fn max_raw(&self) -> f64 {
        match self {
            Self::Percent100 => 100.0,
            Self::Percent200 => 200.0,
            Self::Scale255 => 255.0,
            Self::Unknown => f64::INFINITY,
        }
    }

    pub fn is_known(&self) -> bool {
        *self != Self::Unknown
    }
}

impl std::fmt::Display for DataEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Source of a sample's encoding guess.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Evidence {
    /// Matched against a percentage derived from voltage/current
    Physical,
    /// Inferred from the raw magnitude alone
    Statistical,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub raw: f64,
    pub encoding: DataEncoding,
    pub evidence: Evidence,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub derived_percentage: Option<f64>,
    pub at: DateTime<Utc>,
}

impl Sample {
    pub fn new(raw: f64, encoding: DataEncoding, evidence: Evidence) -> Self {
        Self {
            raw,
            encoding,
            evidence,
            derived_percentage: None,
            at: Utc::now(),
        }
    }

    pub fn with_derived(mut self, percentage: f64) -> Self {
        self.derived_percentage = Some(percentage);
        self
    }
}

fn default_history_capacity() -> usize {
    zigsense_core::config::calibration::HISTORY_CAPACITY
}

/// Learned behaviour of one manufacturer identifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManufacturerProfile {
    pub manufacturer_id: String,
    pub data_encoding: DataEncoding,
    pub confirmed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_via: Option<Evidence>,
    #[serde(default)]
    pub history: VecDeque<Sample>,
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default)]
    pub voltage_supported: bool,
    #[serde(default)]
    pub current_supported: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chemistry_hint: Option<Chemistry>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confirmed_at: Option<DateTime<Utc>>,
}

impl ManufacturerProfile {
    pub fn new(manufacturer_id: impl Into<String>, history_capacity: usize) -> Self {
        let now = Utc::now();
        Self {
            manufacturer_id: manufacturer_id.into(),
            data_encoding: DataEncoding::Unknown,
            confirmed: false,
            confirmed_via: None,
            history: VecDeque::new(),
            history_capacity: history_capacity.max(1),
            voltage_supported: false,
            current_supported: false,
            chemistry_hint: None,
            created_at: now,
            updated_at: now,
            confirmed_at: None,
        }
    }

    /// Append a sample, evicting the oldest at capacity.
    pub fn record(&mut self, sample: Sample) {
        while self.history.len() >= self.history_capacity {
            self.history.pop_front();
        }
        self.history.push_back(sample);
        self.updated_at = Utc::now();
    }

    /// Encoding shared by the newest `count` samples, if they agree on a
    /// known encoding and (when `physical_only`) all physical.
    fn agreeing_tail(&self, count: usize, physical_only: bool) -> Option<DataEncoding> {
        if count == 0 || self.history.len() < count {
            return None;
        }
        let mut tail = self.history.iter().rev().take(count);
        let first = tail.next()?;
        if !first.encoding.is_known() || (physical_only && first.evidence != Evidence::Physical) {
            return None;
        }
        let agree = tail.all(|s| {
            s.encoding == first.encoding && (!physical_only || s.evidence == Evidence::Physical)
        });
        agree.then_some(first.encoding)
    }

    /// Confirmation the history supports: `physical` consecutive physical
    /// samples, or `statistical` consecutive samples of any evidence.
    pub fn pending_confirmation(&self, physical: usize, statistical: usize) -> Option<(DataEncoding, Evidence)> {
        if self.confirmed {
            return None;
        }
        if let Some(encoding) = self.agreeing_tail(physical, true) {
            return Some((encoding, Evidence::Physical));
        }
        self.agreeing_tail(statistical, false)
            .map(|encoding| (encoding, Evidence::Statistical))
    }

    /// Lock the encoding in. A confirmed profile never reverts on its own.
    pub fn confirm(&mut self, encoding: DataEncoding, via: Evidence) {
        if self.confirmed || !encoding.is_known() {
            return;
        }
        let now = Utc::now();
        self.data_encoding = encoding;
        self.confirmed = true;
        self.confirmed_via = Some(via);
        self.confirmed_at = Some(now);
        self.updated_at = now;
    }

    /// Apply a configured capacity, dropping the oldest samples if needed.
    pub(crate) fn set_history_capacity(&mut self, capacity: usize) {
        self.history_capacity = capacity.max(1);
        while self.history.len() > self.history_capacity {
            self.history.pop_front();
        }
    }

    /// Undo a confirmation that could not be persisted. The candidate
    /// encoding and history are kept so the next agreeing sample re-confirms.
    pub(crate) fn revoke_unpersisted_confirmation(&mut self) {
        self.confirmed = false;
        self.confirmed_via = None;
        self.confirmed_at = None;
    }
}
