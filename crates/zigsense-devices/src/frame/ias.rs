//! IAS zone status (cluster 0x0500).
//!
//! Payload: zone status bitmap (2, LE), then optionally extended status (1),
//! zone id (1) and delay in quarter seconds (2, LE).

use serde::{Deserialize, Serialize};

use super::{DecodedEvent, FailureReason};

const ALARM1: u16 = 1 << 0;
const ALARM2: u16 = 1 << 1;
const TAMPER: u16 = 1 << 2;
const BATTERY_LOW: u16 = 1 << 3;
const SUPERVISION_REPORTS: u16 = 1 << 4;
const RESTORE_REPORTS: u16 = 1 << 5;
const TROUBLE: u16 = 1 << 6;
const AC_MAINS_FAULT: u16 = 1 << 7;
const TEST_MODE: u16 = 1 << 8;
const BATTERY_DEFECT: u16 = 1 << 9;

/// Decoded zone status flags.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IasZoneStatus {
    /// Raw status word
    pub raw: u16,
    pub alarm1: bool,
    pub alarm2: bool,
    pub tamper: bool,
    pub battery_low: bool,
    pub supervision_reports: bool,
    pub restore_reports: bool,
    pub trouble: bool,
    pub ac_mains_fault: bool,
    pub test_mode: bool,
    pub battery_defect: bool,
    #[serde(default)]
    pub extended_status: u8,
    #[serde(default)]
    pub zone_id: u8,
    #[serde(default)]
    pub delay: u16,
}

impl IasZoneStatus {
    pub fn from_bits(raw: u16) -> Self {
        Self {
            raw,
            alarm1: raw & ALARM1 != 0,
            alarm2: raw & ALARM2 != 0,
            tamper: raw & TAMPER != 0,
            battery_low: raw & BATTERY_LOW != 0,
            supervision_reports: raw & SUPERVISION_REPORTS != 0,
            restore_reports: raw & RESTORE_REPORTS != 0,
            trouble: raw & TROUBLE != 0,
            ac_mains_fault: raw & AC_MAINS_FAULT != 0,
            test_mode: raw & TEST_MODE != 0,
            battery_defect: raw & BATTERY_DEFECT != 0,
            ..Self::default()
        }
    }

    /// Either alarm bit is set.
    pub fn any_alarm(&self) -> bool {
        self.alarm1 || self.alarm2
    }
}

pub fn decode(bytes: &[u8]) -> DecodedEvent {
    match bytes.len() {
        0 => return DecodedEvent::failed(FailureReason::EmptyFrame, "frame has no bytes"),
        1 => return DecodedEvent::failed(FailureReason::TooShort, "zone status needs 2 bytes"),
        _ => {}
    }

    let mut status = IasZoneStatus::from_bits(u16::from_le_bytes([bytes[0], bytes[1]]));
    if let Some(&ext) = bytes.get(2) {
        status.extended_status = ext;
    }
    if let Some(&zone) = bytes.get(3) {
        status.zone_id = zone;
    }
    if let Some(delay) = bytes.get(4..6) {
        status.delay = u16::from_le_bytes([delay[0], delay[1]]);
    }
    DecodedEvent::IasZoneStatus(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_alarm1_and_battery_low() {
        let DecodedEvent::IasZoneStatus(status) = decode(&[0x09, 0x00]) else {
            panic!("expected zone status");
        };
        assert!(status.alarm1);
        assert!(status.battery_low);
        assert!(!status.alarm2);
        assert!(!status.tamper);
        assert!(!status.supervision_reports);
        assert!(!status.restore_reports);
        assert!(!status.trouble);
        assert!(!status.ac_mains_fault);
        assert!(!status.test_mode);
        assert!(!status.battery_defect);
        assert_eq!(status.raw, 0x0009);
    }

    #[test]
    fn test_high_bits_and_trailer() {
        let DecodedEvent::IasZoneStatus(status) = decode(&[0x04, 0x03, 0x00, 0x07, 0x28, 0x00]) else {
            panic!("expected zone status");
        };
        assert!(status.tamper);
        assert!(status.test_mode);
        assert!(status.battery_defect);
        assert!(!status.any_alarm());
        assert_eq!(status.zone_id, 7);
        assert_eq!(status.delay, 40);
    }

    #[test]
    fn test_short_frames() {
        assert_eq!(decode(&[]).failure_reason(), Some(FailureReason::EmptyFrame));
        assert_eq!(decode(&[0x01]).failure_reason(), Some(FailureReason::TooShort));
    }
}
