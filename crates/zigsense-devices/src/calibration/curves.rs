//! Battery discharge curves.
//!
//! Each curve is ordered from full (100%) to empty (0%) with strictly
//! decreasing voltage and increasing internal resistance.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One point on a discharge curve.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CurvePoint {
    pub percentage: f64,
    /// Open-circuit voltage (V)
    pub voltage: f64,
    /// Internal resistance (ohm)
    pub resistance: f64,
}

const fn point(percentage: f64, voltage: f64, resistance: f64) -> CurvePoint {
    CurvePoint {
        percentage,
        voltage,
        resistance,
    }
}

const CR2032: &[CurvePoint] = &[
    point(100.0, 3.00, 10.0),
    point(90.0, 2.95, 12.0),
    point(80.0, 2.90, 15.0),
    point(70.0, 2.85, 18.0),
    point(60.0, 2.80, 22.0),
    point(50.0, 2.75, 28.0),
    point(40.0, 2.70, 35.0),
    point(30.0, 2.65, 45.0),
    point(20.0, 2.55, 60.0),
    point(10.0, 2.40, 90.0),
    point(5.0, 2.25, 130.0),
    point(0.0, 2.00, 200.0),
];

const CR2450: &[CurvePoint] = &[
    point(100.0, 3.00, 6.0),
    point(80.0, 2.90, 8.0),
    point(60.0, 2.82, 11.0),
    point(40.0, 2.74, 15.0),
    point(20.0, 2.60, 25.0),
    point(10.0, 2.45, 40.0),
    point(0.0, 2.00, 90.0),
];

const CR123A: &[CurvePoint] = &[
    point(100.0, 3.00, 0.15),
    point(80.0, 2.90, 0.20),
    point(60.0, 2.80, 0.25),
    point(40.0, 2.70, 0.35),
    point(20.0, 2.55, 0.50),
    point(10.0, 2.40, 0.80),
    point(0.0, 2.00, 1.50),
];

const AA_ALKALINE: &[CurvePoint] = &[
    point(100.0, 1.60, 0.15),
    point(80.0, 1.45, 0.18),
    point(60.0, 1.35, 0.22),
    point(40.0, 1.28, 0.28),
    point(20.0, 1.20, 0.40),
    point(10.0, 1.10, 0.60),
    point(0.0, 0.90, 1.20),
];

const AAA_ALKALINE: &[CurvePoint] = &[
    point(100.0, 1.60, 0.25),
    point(80.0, 1.45, 0.30),
    point(60.0, 1.35, 0.38),
    point(40.0, 1.27, 0.48),
    point(20.0, 1.18, 0.70),
    point(10.0, 1.08, 1.00),
    point(0.0, 0.90, 2.00),
];

/// Two alkaline cells in series
const AA_ALKALINE_X2: &[CurvePoint] = &[
    point(100.0, 3.20, 0.30),
    point(80.0, 2.90, 0.36),
    point(60.0, 2.70, 0.44),
    point(40.0, 2.56, 0.56),
    point(20.0, 2.40, 0.80),
    point(10.0, 2.20, 1.20),
    point(0.0, 1.80, 2.40),
];

const LI_ION: &[CurvePoint] = &[
    point(100.0, 4.20, 0.05),
    point(90.0, 4.10, 0.055),
    point(80.0, 4.00, 0.06),
    point(60.0, 3.85, 0.07),
    point(40.0, 3.75, 0.08),
    point(20.0, 3.65, 0.10),
    point(10.0, 3.50, 0.13),
    point(0.0, 3.00, 0.25),
];

const LIFEPO4: &[CurvePoint] = &[
    point(100.0, 3.60, 0.03),
    point(90.0, 3.35, 0.032),
    point(70.0, 3.30, 0.035),
    point(40.0, 3.25, 0.04),
    point(20.0, 3.20, 0.05),
    point(10.0, 3.00, 0.07),
    point(0.0, 2.50, 0.15),
];

/// Battery chemistry (and cell arrangement).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Chemistry {
    #[serde(rename = "CR2032")]
    Cr2032,
    #[serde(rename = "CR2450")]
    Cr2450,
    #[serde(rename = "CR123A")]
    Cr123a,
    #[serde(rename = "AA")]
    AaAlkaline,
    #[serde(rename = "AAA")]
    AaaAlkaline,
    #[serde(rename = "2xAA")]
    AaAlkalineX2,
    #[serde(rename = "Li-ion")]
    LiIon,
    #[serde(rename = "LiFePO4")]
    LiFePo4,
}

impl Chemistry {
    pub const ALL: [Chemistry; 8] = [
        Self::Cr2032,
        Self::Cr2450,
        Self::Cr123a,
        Self::AaAlkaline,
        Self::AaaAlkaline,
        Self::AaAlkalineX2,
        Self::LiIon,
        Self::LiFePo4,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Cr2032 => "CR2032",
            Self::Cr2450 => "CR2450",
            Self::Cr123a => "CR123A",
            Self::AaAlkaline => "AA",
            Self::AaaAlkaline => "AAA",
            Self::AaAlkalineX2 => "2xAA",
            Self::LiIon => "Li-ion",
            Self::LiFePo4 => "LiFePO4",
        }
    }

    pub fn curve(&self) -> &'static [CurvePoint] {
        match self {
            Self::Cr2032 => CR2032,
            Self::Cr2450 => CR2450,
            Self::Cr123a => CR123A,
            Self::AaAlkaline => AA_ALKALINE,
            Self::AaaAlkaline => AAA_ALKALINE,
            Self::AaAlkalineX2 => AA_ALKALINE_X2,
            Self::LiIon => LI_ION,
            Self::LiFePo4 => LIFEPO4,
        }
    }

    /// Fresh open-circuit voltage, used as the resistance reference.
    pub fn nominal_voltage(&self) -> f64 {
        self.curve()[0].voltage
    }

    /// Voltage at 0%.
    pub fn cutoff_voltage(&self) -> f64 {
        self.curve()[self.curve().len() - 1].voltage
    }

    /// Guess the chemistry from a single voltage reading.
    pub fn infer_from_voltage(voltage: f64) -> Option<Self> {
        if !voltage.is_finite() || voltage <= 0.0 {
            return None;
        }
        if voltage <= 1.8 {
            Some(Self::AaAlkaline)
        } else if voltage <= 3.3 {
            Some(Self::Cr2032)
        } else if voltage <= 4.35 {
            Some(Self::LiIon)
        } else {
            None
        }
    }

    /// Percentage for a voltage by linear interpolation on the curve.
    ///
    /// Clamped to 100 above the curve and 0 below it; monotonic in `voltage`.
    pub fn voltage_to_percent(&self, voltage: f64) -> f64 {
        let curve = self.curve();
        let first = curve[0];
        let last = curve[curve.len() - 1];

        if voltage >= first.voltage {
            return first.percentage;
        }
        if voltage <= last.voltage || voltage.is_nan() {
            return last.percentage;
        }

        for pair in curve.windows(2) {
            let (hi, lo) = (pair[0], pair[1]);
            if voltage <= hi.voltage && voltage >= lo.voltage {
                let t = (voltage - lo.voltage) / (hi.voltage - lo.voltage);
                return lo.percentage + t * (hi.percentage - lo.percentage);
            }
        }
        last.percentage
    }

    /// Voltage for a percentage; inverse of [`voltage_to_percent`](Self::voltage_to_percent).
    pub fn percent_to_voltage(&self, percentage: f64) -> f64 {
        let curve = self.curve();
        let first = curve[0];
        let last = curve[curve.len() - 1];

        if percentage >= first.percentage {
            return first.voltage;
        }
        if percentage <= last.percentage || percentage.is_nan() {
            return last.voltage;
        }

        for pair in curve.windows(2) {
            let (hi, lo) = (pair[0], pair[1]);
            if percentage <= hi.percentage && percentage >= lo.percentage {
                let t = (percentage - lo.percentage) / (hi.percentage - lo.percentage);
                return lo.voltage + t * (hi.voltage - lo.voltage);
            }
        }
        last.voltage
    }

    /// Percentage at the curve point whose resistance is closest to the
    /// estimate `(nominal - voltage) / current`.
    pub fn percent_from_resistance(&self, voltage: f64, current: f64) -> Option<f64> {
        if !(current.is_finite() && current > 0.0 && voltage.is_finite()) {
            return None;
        }
        let resistance = ((self.nominal_voltage() - voltage) / current).max(0.0);

        self.curve()
            .iter()
            .min_by(|a, b| {
                let da = (a.resistance - resistance).abs();
                let db = (b.resistance - resistance).abs();
                da.total_cmp(&db)
            })
            .map(|p| p.percentage)
    }
}

impl fmt::Display for Chemistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Chemistry {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized: String = s
            .chars()
            .filter(|c| c.is_ascii_alphanumeric())
            .collect::<String>()
            .to_ascii_uppercase();
        match normalized.as_str() {
            "CR2032" => Ok(Self::Cr2032),
            "CR2450" => Ok(Self::Cr2450),
            "CR123A" | "CR123" => Ok(Self::Cr123a),
            "AA" | "LR6" => Ok(Self::AaAlkaline),
            "AAA" | "LR03" => Ok(Self::AaaAlkaline),
            "2XAA" | "AAX2" => Ok(Self::AaAlkalineX2),
            "LIION" | "LIPO" | "18650" => Ok(Self::LiIon),
            "LIFEPO4" | "LFP" => Ok(Self::LiFePo4),
            _ => Err(format!("unknown battery chemistry: {}", s)),
        }
    }
}

/// All available curves, keyed by chemistry.
pub fn curves() -> impl Iterator<Item = (Chemistry, &'static [CurvePoint])> {
    Chemistry::ALL.into_iter().map(|c| (c, c.curve()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cr2032_endpoints() {
        let cr = Chemistry::Cr2032;
        assert_eq!(cr.voltage_to_percent(3.0), 100.0);
        assert_eq!(cr.voltage_to_percent(2.0), 0.0);
        let mid = cr.voltage_to_percent(2.5);
        assert!(mid > 0.0 && mid < 100.0, "got {}", mid);
    }

    #[test]
    fn test_clamped_outside_curve() {
        assert_eq!(Chemistry::Cr2032.voltage_to_percent(3.3), 100.0);
        assert_eq!(Chemistry::Cr2032.voltage_to_percent(1.2), 0.0);
        assert_eq!(Chemistry::LiIon.voltage_to_percent(f64::NAN), 0.0);
    }

    #[test]
    fn test_curves_are_well_formed() {
        for (chemistry, curve) in curves() {
            assert_eq!(curve[0].percentage, 100.0, "{}", chemistry);
            assert_eq!(curve[curve.len() - 1].percentage, 0.0, "{}", chemistry);
            for pair in curve.windows(2) {
                assert!(pair[0].voltage > pair[1].voltage, "{}", chemistry);
                assert!(pair[0].percentage > pair[1].percentage, "{}", chemistry);
                assert!(pair[0].resistance < pair[1].resistance, "{}", chemistry);
            }
        }
    }

    #[test]
    fn test_voltage_to_percent_is_monotonic() {
        for chemistry in Chemistry::ALL {
            let lo = chemistry.cutoff_voltage() - 0.2;
            let hi = chemistry.nominal_voltage() + 0.2;
            let mut prev = f64::NEG_INFINITY;
            let steps = 200;
            for i in 0..=steps {
                let v = lo + (hi - lo) * f64::from(i) / f64::from(steps);
                let p = chemistry.voltage_to_percent(v);
                assert!(p >= prev, "{} not monotonic at {}", chemistry, v);
                prev = p;
            }
        }
    }

    #[test]
    fn test_percent_to_voltage_inverts() {
        let cr = Chemistry::Cr2032;
        for pct in [0.0, 15.0, 42.0, 75.0, 100.0] {
            let v = cr.percent_to_voltage(pct);
            assert!((cr.voltage_to_percent(v) - pct).abs() < 1e-9);
        }
    }

    #[test]
    fn test_resistance_lookup() {
        // (3.0 - 2.9) / 0.0066 ~= 15.2 ohm -> 80%
        assert_eq!(Chemistry::Cr2032.percent_from_resistance(2.9, 0.0066), Some(80.0));
        // Voltage above nominal means a fresh cell
        assert_eq!(Chemistry::Cr2032.percent_from_resistance(3.1, 0.01), Some(100.0));
        assert_eq!(Chemistry::Cr2032.percent_from_resistance(2.9, 0.0), None);
    }

    #[test]
    fn test_infer_and_parse() {
        assert_eq!(Chemistry::infer_from_voltage(1.4), Some(Chemistry::AaAlkaline));
        assert_eq!(Chemistry::infer_from_voltage(2.9), Some(Chemistry::Cr2032));
        assert_eq!(Chemistry::infer_from_voltage(3.9), Some(Chemistry::LiIon));
        assert_eq!(Chemistry::infer_from_voltage(12.0), None);

        assert_eq!("cr2032".parse::<Chemistry>(), Ok(Chemistry::Cr2032));
        assert_eq!("Li-ion".parse::<Chemistry>(), Ok(Chemistry::LiIon));
        assert!("nicd".parse::<Chemistry>().is_err());
    }

    #[test]
    fn test_serde_names() {
        let json = serde_json::to_value(Chemistry::AaAlkalineX2).unwrap();
        assert_eq!(json, serde_json::json!("2xAA"));
        for chemistry in Chemistry::ALL {
            let json = serde_json::to_value(chemistry).unwrap();
            assert_eq!(json.as_str(), Some(chemistry.name()));
        }
    }
}
