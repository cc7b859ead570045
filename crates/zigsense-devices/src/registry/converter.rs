//! Declarative value converters.
//!
//! A converter turns a decoded primitive into the capability's value space.
//! Converters that cannot handle their input return `None`; the caller drops
//! the reading.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use zigsense_core::event::HsvColor;
use zigsense_core::CapabilityValue;

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Converter {
    /// Pass the value through unchanged
    #[default]
    Raw,
    Boolean {
        #[serde(default)]
        invert: bool,
    },
    /// Map `from[0]..from[1]` onto `to[0]..to[1]`, clamped to the target range
    LinearScale { from: [f64; 2], to: [f64; 2] },
    /// `value / divisor + offset`
    Divide {
        divisor: f64,
        #[serde(default)]
        offset: f64,
    },
    /// Integer or string key to a named state
    EnumLookup { table: BTreeMap<String, String> },
    /// ZCL illuminance `10000 * log10(lux) + 1` back to lux
    LogLux,
    /// Packed hue/saturation/brightness
    Composite {
        #[serde(default)]
        format: CompositeFormat,
    },
}

/// Wire shape of a composite colour value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompositeFormat {
    /// Detect from the value
    #[default]
    Auto,
    /// 12 hex digits `HHHHSSSSVVVV`, hue 0-360, saturation and value 0-1000
    Hex,
    /// `"h,s,v"`, hue 0-360, saturation and value 0-100
    Text,
}

impl Converter {
    pub fn apply(&self, value: &CapabilityValue) -> Option<CapabilityValue> {
        match self {
            Self::Raw => Some(value.clone()),
            Self::Boolean { invert } => to_bool(value).map(|b| CapabilityValue::Boolean(b ^ *invert)),
            Self::LinearScale { from, to } => {
                let v = value.as_f64()?;
                let span = from[1] - from[0];
                if span == 0.0 {
                    return None;
                }
                let scaled = to[0] + (v - from[0]) / span * (to[1] - to[0]);
                let (lo, hi) = (to[0].min(to[1]), to[0].max(to[1]));
                Some(CapabilityValue::Float(scaled.clamp(lo, hi)))
            }
            Self::Divide { divisor, offset } => {
                if *divisor == 0.0 {
                    return None;
                }
                Some(CapabilityValue::Float(value.as_f64()? / divisor + offset))
            }
            Self::EnumLookup { table } => {
                let key = match value {
                    CapabilityValue::String(s) => s.clone(),
                    other => other.as_i64()?.to_string(),
                };
                table.get(&key).cloned().map(CapabilityValue::String)
            }
            Self::LogLux => {
                let v = value.as_f64()?;
                if v <= 0.0 {
                    return Some(CapabilityValue::Float(0.0));
                }
                Some(CapabilityValue::Float(10f64.powf((v - 1.0) / 10000.0)))
            }
            Self::Composite { format } => decode_hsv(value, *format).map(CapabilityValue::Color),
        }
    }
}

fn to_bool(value: &CapabilityValue) -> Option<bool> {
    match value {
        CapabilityValue::String(s) => match s.to_ascii_lowercase().as_str() {
            "true" | "on" | "1" => Some(true),
            "false" | "off" | "0" => Some(false),
            _ => None,
        },
        CapabilityValue::Float(v) => Some(*v != 0.0),
        other => other.as_bool(),
    }
}

/// Decode a packed HSV colour into normalized components.
pub fn decode_hsv(value: &CapabilityValue, format: CompositeFormat) -> Option<HsvColor> {
    match value {
        CapabilityValue::Binary(bytes) => hsv_from_words(bytes),
        CapabilityValue::String(s) => {
            let s = s.trim();
            let is_text = match format {
                CompositeFormat::Text => true,
                CompositeFormat::Hex => false,
                CompositeFormat::Auto => s.contains(','),
            };
            if is_text {
                hsv_from_text(s)
            } else {
                hsv_from_words(&hex::decode(s).ok()?)
            }
        }
        _ => None,
    }
}

fn hsv_from_words(bytes: &[u8]) -> Option<HsvColor> {
    if bytes.len() != 6 {
        return None;
    }
    let word = |i: usize| f64::from(u16::from_be_bytes([bytes[i], bytes[i + 1]]));
    Some(HsvColor {
        hue: (word(0) / 360.0).clamp(0.0, 1.0),
        saturation: (word(2) / 1000.0).clamp(0.0, 1.0),
        brightness: (word(4) / 1000.0).clamp(0.0, 1.0),
    })
}

fn hsv_from_text(s: &str) -> Option<HsvColor> {
    let parts: Vec<f64> = s
        .split(',')
        .map(|p| p.trim().parse::<f64>())
        .collect::<Result<_, _>>()
        .ok()?;
    let [h, sat, v] = parts.as_slice() else {
        return None;
    };
    Some(HsvColor {
        hue: (h / 360.0).clamp(0.0, 1.0),
        saturation: (sat / 100.0).clamp(0.0, 1.0),
        brightness: (v / 100.0).clamp(0.0, 1.0),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn float(value: Option<CapabilityValue>) -> f64 {
        match value {
            Some(CapabilityValue::Float(v)) => v,
            other => panic!("expected float, got {:?}", other),
        }
    }

    #[test]
    fn test_boolean() {
        let conv = Converter::Boolean { invert: false };
        assert_eq!(conv.apply(&CapabilityValue::Integer(1)), Some(CapabilityValue::Boolean(true)));
        assert_eq!(conv.apply(&"off".into()), Some(CapabilityValue::Boolean(false)));

        let inverted = Converter::Boolean { invert: true };
        assert_eq!(inverted.apply(&CapabilityValue::Boolean(true)), Some(CapabilityValue::Boolean(false)));
        assert_eq!(conv.apply(&CapabilityValue::Null), None);
    }

    #[test]
    fn test_linear_scale_clamps() {
        let conv = Converter::LinearScale {
            from: [0.0, 254.0],
            to: [0.0, 1.0],
        };
        assert_eq!(float(conv.apply(&CapabilityValue::Integer(127))), 0.5);
        assert_eq!(float(conv.apply(&CapabilityValue::Integer(300))), 1.0);

        let reversed = Converter::LinearScale {
            from: [0.0, 1000.0],
            to: [1.0, 0.0],
        };
        assert_eq!(float(reversed.apply(&CapabilityValue::Integer(250))), 0.75);
    }

    #[test]
    fn test_divide() {
        let conv = Converter::Divide {
            divisor: 100.0,
            offset: 0.0,
        };
        assert_eq!(float(conv.apply(&CapabilityValue::Integer(2150))), 21.5);
        let zero = Converter::Divide {
            divisor: 0.0,
            offset: 0.0,
        };
        assert_eq!(zero.apply(&CapabilityValue::Integer(1)), None);
    }

    #[test]
    fn test_enum_lookup() {
        let table = BTreeMap::from([("0".to_string(), "auto".to_string()), ("1".to_string(), "heat".to_string())]);
        let conv = Converter::EnumLookup { table };
        assert_eq!(conv.apply(&CapabilityValue::Integer(1)), Some("heat".into()));
        assert_eq!(conv.apply(&CapabilityValue::Integer(7)), None);
    }

    #[test]
    fn test_log_lux() {
        let lux = float(Converter::LogLux.apply(&CapabilityValue::Integer(20001)));
        assert!((lux - 100.0).abs() < 1e-9);
    }

    #[test]
    fn test_composite_hex_and_text() {
        let hex = decode_hsv(&"00b403e801f4".into(), CompositeFormat::Auto).unwrap();
        assert_eq!(hex.hue, 0.5);
        assert_eq!(hex.saturation, 1.0);
        assert_eq!(hex.brightness, 0.5);

        let text = decode_hsv(&"90, 50, 100".into(), CompositeFormat::Auto).unwrap();
        assert_eq!(text.hue, 0.25);
        assert_eq!(text.saturation, 0.5);
        assert_eq!(text.brightness, 1.0);

        let raw = decode_hsv(&CapabilityValue::Binary(vec![0x00, 0xB4, 0x03, 0xE8, 0x01, 0xF4]), CompositeFormat::Hex);
        assert_eq!(raw, Some(hex));

        assert!(decode_hsv(&"zz".into(), CompositeFormat::Hex).is_none());
        assert!(decode_hsv(&"1,2".into(), CompositeFormat::Text).is_none());
    }

    #[test]
    fn test_converter_serde() {
        let conv: Converter = serde_json::from_value(serde_json::json!({"kind": "divide", "divisor": 10.0})).unwrap();
        assert_eq!(conv, Converter::Divide { divisor: 10.0, offset: 0.0 });
        let conv: Converter = serde_json::from_value(serde_json::json!({"kind": "boolean"})).unwrap();
        assert_eq!(conv, Converter::Boolean { invert: false });
    }
}
