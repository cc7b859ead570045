//! Battery calibration: discharge curves, manufacturer profiles and the
//! adaptive classification engine.

pub mod curves;
pub mod engine;
pub mod profile;

pub use curves::{curves, Chemistry, CurvePoint};
pub use engine::{
    CalibrationConfig, CalibrationEngine, ClassificationMethod, ClassificationResult, ClassifyInput,
    UNKNOWN_MANUFACTURER,
};
pub use profile::{DataEncoding, Evidence, ManufacturerProfile, Sample};
