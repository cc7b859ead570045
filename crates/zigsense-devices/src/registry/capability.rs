//! Capability names and device categories.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Semantic device capability.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Onoff,
    Dim,
    LightHue,
    LightSaturation,
    LightHsv,
    LightTemperature,
    LightMode,
    MeasureTemperature,
    MeasureHumidity,
    MeasureLuminance,
    MeasurePressure,
    MeasureCo2,
    MeasurePm25,
    MeasureBattery,
    MeasureVoltage,
    MeasureCurrent,
    MeasurePower,
    MeterPower,
    AlarmMotion,
    AlarmContact,
    AlarmSmoke,
    AlarmGas,
    AlarmWater,
    AlarmCo,
    AlarmTamper,
    AlarmBattery,
    AlarmGeneric,
    TargetTemperature,
    ThermostatMode,
    WindowcoveringsState,
    WindowcoveringsSet,
    Button,
}

impl Capability {
    pub const ALL: [Capability; 32] = [
        Self::Onoff,
        Self::Dim,
        Self::LightHue,
        Self::LightSaturation,
        Self::LightHsv,
        Self::LightTemperature,
        Self::LightMode,
        Self::MeasureTemperature,
        Self::MeasureHumidity,
        Self::MeasureLuminance,
        Self::MeasurePressure,
        Self::MeasureCo2,
        Self::MeasurePm25,
        Self::MeasureBattery,
        Self::MeasureVoltage,
        Self::MeasureCurrent,
        Self::MeasurePower,
        Self::MeterPower,
        Self::AlarmMotion,
        Self::AlarmContact,
        Self::AlarmSmoke,
        Self::AlarmGas,
        Self::AlarmWater,
        Self::AlarmCo,
        Self::AlarmTamper,
        Self::AlarmBattery,
        Self::AlarmGeneric,
        Self::TargetTemperature,
        Self::ThermostatMode,
        Self::WindowcoveringsState,
        Self::WindowcoveringsSet,
        Self::Button,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Onoff => "onoff",
            Self::Dim => "dim",
            Self::LightHue => "light_hue",
            Self::LightSaturation => "light_saturation",
            Self::LightHsv => "light_hsv",
            Self::LightTemperature => "light_temperature",
            Self::LightMode => "light_mode",
            Self::MeasureTemperature => "measure_temperature",
            Self::MeasureHumidity => "measure_humidity",
            Self::MeasureLuminance => "measure_luminance",
            Self::MeasurePressure => "measure_pressure",
            Self::MeasureCo2 => "measure_co2",
            Self::MeasurePm25 => "measure_pm25",
            Self::MeasureBattery => "measure_battery",
            Self::MeasureVoltage => "measure_voltage",
            Self::MeasureCurrent => "measure_current",
            Self::MeasurePower => "measure_power",
            Self::MeterPower => "meter_power",
            Self::AlarmMotion => "alarm_motion",
            Self::AlarmContact => "alarm_contact",
            Self::AlarmSmoke => "alarm_smoke",
            Self::AlarmGas => "alarm_gas",
            Self::AlarmWater => "alarm_water",
            Self::AlarmCo => "alarm_co",
            Self::AlarmTamper => "alarm_tamper",
            Self::AlarmBattery => "alarm_battery",
            Self::AlarmGeneric => "alarm_generic",
            Self::TargetTemperature => "target_temperature",
            Self::ThermostatMode => "thermostat_mode",
            Self::WindowcoveringsState => "windowcoverings_state",
            Self::WindowcoveringsSet => "windowcoverings_set",
            Self::Button => "button",
        }
    }

    /// Battery state of charge or a battery alarm.
    pub fn is_battery(&self) -> bool {
        matches!(self, Self::MeasureBattery | Self::AlarmBattery)
    }

    /// Electrical quantities.
    pub fn is_energy(&self) -> bool {
        matches!(
            self,
            Self::MeasureVoltage | Self::MeasureCurrent | Self::MeasurePower | Self::MeterPower
        )
    }

    pub fn is_alarm(&self) -> bool {
        self.name().starts_with("alarm_")
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Capability {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .iter()
            .copied()
            .find(|c| c.name() == s)
            .ok_or_else(|| format!("unknown capability: {}", s))
    }
}

/// Kind of device, used to pick between datapoint meanings that share an index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCategory {
    MotionSensor,
    ContactSensor,
    SmokeDetector,
    GasDetector,
    WaterLeakSensor,
    CoDetector,
    ClimateSensor,
    Thermostat,
    Switch,
    Plug,
    Light,
    Cover,
    Button,
}

impl DeviceCategory {
    /// Capability an IAS zone alarm maps to for this kind of device.
    pub fn alarm_capability(&self) -> Capability {
        match self {
            Self::MotionSensor => Capability::AlarmMotion,
            Self::ContactSensor => Capability::AlarmContact,
            Self::SmokeDetector => Capability::AlarmSmoke,
            Self::GasDetector => Capability::AlarmGas,
            Self::WaterLeakSensor => Capability::AlarmWater,
            Self::CoDetector => Capability::AlarmCo,
            _ => Capability::AlarmGeneric,
        }
    }
}
