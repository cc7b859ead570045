//! Adaptive battery classification.
//!
//! [`CalibrationEngine::classify`] turns an ambiguous raw battery reading into
//! a percentage. Branches, first applicable wins:
//!
//! 1. confirmed profile: apply the learned encoding, blended with a physical
//!    estimate when one is available
//! 2. voltage + current + chemistry: internal-resistance lookup
//! 3. voltage + chemistry: discharge-curve interpolation
//! 4. detection by magnitude
//!
//! Branches 2-4 feed a sample into the manufacturer's history, which confirms
//! an encoding after enough agreeing samples. Profiles live in a [`DashMap`];
//! entry guards are never held across an `.await`. Store writes for one
//! manufacturer are serialized and always write the current in-memory
//! profile, so a slow write cannot overwrite a newer one.

use std::sync::Arc;

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use zigsense_core::config::{calibration, env_vars};
use zigsense_storage::PersistenceStore;

use super::curves::Chemistry;
use super::profile::{DataEncoding, Evidence, ManufacturerProfile, Sample};
use crate::error::Result;

/// Key used when a device reports no manufacturer.
pub const UNKNOWN_MANUFACTURER: &str = "unknown";

const CONFIDENCE_BLENDED: f64 = 0.95;
const CONFIDENCE_LEARNED: f64 = 0.90;
const CONFIDENCE_PHYSICAL: f64 = 0.95;
const CONFIDENCE_PHYSICAL_VOLTAGE: f64 = 0.85;
const CONFIDENCE_PERCENT: f64 = 0.70;
const CONFIDENCE_AMBIGUOUS_RESOLVED: f64 = 0.80;
const CONFIDENCE_AMBIGUOUS_DEFAULT: f64 = 0.55;
const CONFIDENCE_SCALE255: f64 = 0.65;
const CONFIDENCE_ANOMALOUS: f64 = 0.30;

/// Engine tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationConfig {
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,
    #[serde(default = "default_physical_confirmations")]
    pub physical_confirmations: usize,
    #[serde(default = "default_statistical_confirmations")]
    pub statistical_confirmations: usize,
    #[serde(default = "default_blend_weight")]
    pub learned_blend_weight: f64,
    #[serde(default = "default_tolerance")]
    pub encoding_match_tolerance: f64,
}

fn default_history_capacity() -> usize {
    calibration::HISTORY_CAPACITY
}

fn default_physical_confirmations() -> usize {
    calibration::PHYSICAL_CONFIRMATIONS
}

fn default_statistical_confirmations() -> usize {
    calibration::STATISTICAL_CONFIRMATIONS
}

fn default_blend_weight() -> f64 {
    calibration::LEARNED_BLEND_WEIGHT
}

fn default_tolerance() -> f64 {
    calibration::ENCODING_MATCH_TOLERANCE
}

impl Default for CalibrationConfig {
    fn default() -> Self {
        Self {
            history_capacity: default_history_capacity(),
            physical_confirmations: default_physical_confirmations(),
            statistical_confirmations: default_statistical_confirmations(),
            learned_blend_weight: default_blend_weight(),
            encoding_match_tolerance: default_tolerance(),
        }
    }
}

impl CalibrationConfig {
    /// Defaults with the history capacity taken from the environment.
    pub fn from_env() -> Self {
        Self {
            history_capacity: env_vars::profile_history(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationMethod {
    Learned,
    LearnedBlend,
    /// Internal-resistance lookup from voltage and current
    Physical,
    PhysicalVoltage,
    Detection,
    Anomalous,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub percentage: u8,
    pub confidence: f64,
    pub method: ClassificationMethod,
    /// Encoding applied or inferred for this reading
    pub encoding: DataEncoding,
    /// The manufacturer's encoding is not confirmed yet
    pub needs_learning: bool,
    pub anomalous: bool,
}

/// One reading to classify.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClassifyInput<'a> {
    pub raw: f64,
    pub manufacturer_id: &'a str,
    /// Battery voltage (V)
    pub voltage: Option<f64>,
    /// Load current (A)
    pub current: Option<f64>,
    pub chemistry: Option<Chemistry>,
}

impl<'a> ClassifyInput<'a> {
    pub fn new(raw: f64, manufacturer_id: &'a str) -> Self {
        Self {
            raw,
            manufacturer_id,
            voltage: None,
            current: None,
            chemistry: None,
        }
    }

    pub fn with_voltage(mut self, voltage: impl Into<Option<f64>>) -> Self {
        self.voltage = voltage.into();
        self
    }

    pub fn with_current(mut self, current: impl Into<Option<f64>>) -> Self {
        self.current = current.into();
        self
    }

    pub fn with_chemistry(mut self, chemistry: impl Into<Option<Chemistry>>) -> Self {
        self.chemistry = chemistry.into();
        self
    }
}

fn percentage(value: f64) -> u8 {
    value.clamp(0.0, 100.0).round() as u8
}

fn usable(reading: Option<f64>) -> Option<f64> {
    reading.filter(|v| v.is_finite() && *v > 0.0)
}

/// Encoding whose reading of `raw` lands closest to `physical`, if within
/// `tolerance` percentage points.
fn infer_encoding(raw: f64, physical: f64, tolerance: f64) -> DataEncoding {
    DataEncoding::candidates(raw)
        .into_iter()
        .map(|(encoding, pct)| (encoding, (pct - physical).abs()))
        .filter(|(_, diff)| *diff <= tolerance)
        .min_by(|a, b| a.1.total_cmp(&b.1))
        .map(|(encoding, _)| encoding)
        .unwrap_or(DataEncoding::Unknown)
}

/// Result of evaluating one reading against a profile.
struct Evaluation {
    result: ClassificationResult,
    changed: bool,
    newly_confirmed: bool,
}

/// Classifies battery readings and learns per-manufacturer encodings.
pub struct CalibrationEngine {
    profiles: DashMap<String, ManufacturerProfile>,
    store: Option<Arc<dyn PersistenceStore>>,
    write_locks: DashMap<String, Arc<Mutex<()>>>,
    config: CalibrationConfig,
}

impl CalibrationEngine {
    /// Engine without persistence; profiles last for the process lifetime.
    pub fn new(config: CalibrationConfig) -> Self {
        Self {
            profiles: DashMap::new(),
            store: None,
            write_locks: DashMap::new(),
            config,
        }
    }

    /// Engine that loads profiles lazily from `store` and writes them back
    /// after every change.
    pub fn with_store(config: CalibrationConfig, store: Arc<dyn PersistenceStore>) -> Self {
        Self {
            profiles: DashMap::new(),
            store: Some(store),
            write_locks: DashMap::new(),
            config,
        }
    }

    pub fn config(&self) -> &CalibrationConfig {
        &self.config
    }

    pub async fn classify(&self, input: ClassifyInput<'_>) -> ClassificationResult {
        let id = normalize_id(input.manufacturer_id);
        self.ensure_loaded(&id).await;

        let evaluation = {
            let mut entry = self
                .profiles
                .entry(id.clone())
                .or_insert_with(|| ManufacturerProfile::new(id.as_str(), self.config.history_capacity));
            self.evaluate(entry.value_mut(), &input)
        };

        let Evaluation {
            mut result,
            changed,
            newly_confirmed,
        } = evaluation;

        if newly_confirmed {
            tracing::info!(
                manufacturer = %id,
                encoding = %result.encoding,
                "Battery encoding confirmed"
            );
        }

        if changed && self.store.is_some() {
            let lock = self.write_lock(&id);
            let _guard = lock.lock().await;
            // Write whatever is newest now, not the state this call produced
            let snapshot = self.profiles.get(&id).map(|p| p.value().clone());
            if let Some(snapshot) = snapshot {
                if let Err(e) = self.persist(&id, &snapshot).await {
                    tracing::warn!(manufacturer = %id, "Failed to persist manufacturer profile: {}", e);
                    if newly_confirmed {
                        if let Some(mut profile) = self.profiles.get_mut(&id) {
                            profile.revoke_unpersisted_confirmation();
                        }
                        result.needs_learning = true;
                    }
                }
            }
        }

        tracing::trace!(
            manufacturer = %id,
            raw = input.raw,
            percentage = result.percentage,
            method = ?result.method,
            confidence = result.confidence,
            "Classified battery reading"
        );
        result
    }

    /// Profile for `manufacturer_id`, loading it from the store if needed.
    pub async fn profile(&self, manufacturer_id: &str) -> Option<ManufacturerProfile> {
        let id = normalize_id(manufacturer_id);
        if !self.profiles.contains_key(&id) {
            if let Some(profile) = self.load(&id).await {
                self.profiles.entry(id.clone()).or_insert(profile);
            }
        }
        self.profiles.get(&id).map(|p| p.value().clone())
    }

    /// Profiles currently held in memory.
    pub fn profiles(&self) -> Vec<ManufacturerProfile> {
        let mut profiles: Vec<ManufacturerProfile> =
            self.profiles.iter().map(|entry| entry.value().clone()).collect();
        profiles.sort_by(|a, b| a.manufacturer_id.cmp(&b.manufacturer_id));
        profiles
    }

    /// Drop everything learned about a manufacturer, in memory and in the store.
    pub async fn forget(&self, manufacturer_id: &str) -> Result<bool> {
        let id = normalize_id(manufacturer_id);
        let lock = self.write_lock(&id);
        let _guard = lock.lock().await;
        let mut existed = self.profiles.remove(&id).is_some();
        if let Some(store) = &self.store {
            existed |= store.delete(&id).await?;
        }
        Ok(existed)
    }

    fn write_lock(&self, id: &str) -> Arc<Mutex<()>> {
        self.write_locks
            .entry(id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(())))
            .value()
            .clone()
    }

    async fn ensure_loaded(&self, id: &str) {
        if self.profiles.contains_key(id) {
            return;
        }
        let profile = match self.load(id).await {
            Some(profile) => profile,
            None => ManufacturerProfile::new(id, self.config.history_capacity),
        };
        // Another task may have won the race; keep its profile
        self.profiles.entry(id.to_string()).or_insert(profile);
    }

    async fn load(&self, id: &str) -> Option<ManufacturerProfile> {
        let store = self.store.as_ref()?;
        match store.get(id).await {
            Ok(Some(value)) => match serde_json::from_value::<ManufacturerProfile>(value) {
                Ok(mut profile) => {
                    profile.set_history_capacity(self.config.history_capacity);
                    tracing::debug!(
                        manufacturer = id,
                        confirmed = profile.confirmed,
                        encoding = %profile.data_encoding,
                        "Loaded manufacturer profile"
                    );
                    Some(profile)
                }
                Err(e) => {
                    tracing::warn!(manufacturer = id, "Discarding unreadable manufacturer profile: {}", e);
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                tracing::warn!(manufacturer = id, "Failed to load manufacturer profile: {}", e);
                None
            }
        }
    }

    async fn persist(&self, id: &str, profile: &ManufacturerProfile) -> Result<()> {
        let Some(store) = &self.store else {
            return Ok(());
        };
        let value = serde_json::to_value(profile)?;
        store.set(id, value).await?;
        Ok(())
    }

    fn try_confirm(&self, profile: &mut ManufacturerProfile) -> bool {
        match profile.pending_confirmation(
            self.config.physical_confirmations,
            self.config.statistical_confirmations,
        ) {
            Some((encoding, via)) => {
                profile.confirm(encoding, via);
                true
            }
            None => false,
        }
    }

    fn evaluate(&self, profile: &mut ManufacturerProfile, input: &ClassifyInput<'_>) -> Evaluation {
        let mut changed = false;
        let voltage = usable(input.voltage);
        let current = usable(input.current);

        if voltage.is_some() && !profile.voltage_supported {
            profile.voltage_supported = true;
            changed = true;
        }
        if current.is_some() && !profile.current_supported {
            profile.current_supported = true;
            changed = true;
        }
        if let Some(chemistry) = input.chemistry {
            if profile.chemistry_hint != Some(chemistry) {
                profile.chemistry_hint = Some(chemistry);
                changed = true;
            }
        }
        let chemistry = profile.chemistry_hint;
        let raw = input.raw;

        if !raw.is_finite() || raw < 0.0 {
            return Evaluation {
                result: ClassificationResult {
                    percentage: 0,
                    confidence: CONFIDENCE_ANOMALOUS,
                    method: ClassificationMethod::Anomalous,
                    encoding: DataEncoding::Unknown,
                    needs_learning: !profile.confirmed,
                    anomalous: true,
                },
                changed,
                newly_confirmed: false,
            };
        }

        // Learned encoding
        if profile.confirmed {
            let encoding = profile.data_encoding;
            let learned = encoding.to_percent(raw).unwrap_or(raw).clamp(0.0, 100.0);
            let physical = voltage.zip(chemistry).map(|(v, chem)| {
                current
                    .and_then(|i| chem.percent_from_resistance(v, i))
                    .unwrap_or_else(|| chem.voltage_to_percent(v))
            });
            let (value, confidence, method) = match physical {
                Some(physical) => {
                    let w = self.config.learned_blend_weight;
                    (
                        w * learned + (1.0 - w) * physical,
                        CONFIDENCE_BLENDED,
                        ClassificationMethod::LearnedBlend,
                    )
                }
                None => (learned, CONFIDENCE_LEARNED, ClassificationMethod::Learned),
            };
            return Evaluation {
                result: ClassificationResult {
                    percentage: percentage(value),
                    confidence,
                    method,
                    encoding,
                    needs_learning: false,
                    anomalous: raw > encoding.max_raw(),
                },
                changed,
                newly_confirmed: false,
            };
        }

        // Physical measurement
        if let (Some(v), Some(chem)) = (voltage, chemistry) {
            let (physical, confidence, method) = match current.and_then(|i| chem.percent_from_resistance(v, i)) {
                Some(p) => (p, CONFIDENCE_PHYSICAL, ClassificationMethod::Physical),
                None => (
                    chem.voltage_to_percent(v),
                    CONFIDENCE_PHYSICAL_VOLTAGE,
                    ClassificationMethod::PhysicalVoltage,
                ),
            };
            let encoding = infer_encoding(raw, physical, self.config.encoding_match_tolerance);
            profile.record(Sample::new(raw, encoding, Evidence::Physical).with_derived(physical));
            let newly_confirmed = self.try_confirm(profile);

            return Evaluation {
                result: ClassificationResult {
                    percentage: percentage(physical),
                    confidence,
                    method,
                    encoding,
                    needs_learning: !profile.confirmed,
                    anomalous: false,
                },
                changed: true,
                newly_confirmed,
            };
        }

        // Detection by magnitude
        let voltage_percent = voltage.and_then(|v| {
            chemistry
                .or_else(|| Chemistry::infer_from_voltage(v))
                .map(|chem| chem.voltage_to_percent(v))
        });

        let (value, confidence, encoding, anomalous) = if raw <= 100.0 {
            (raw, CONFIDENCE_PERCENT, DataEncoding::Percent100, false)
        } else if raw <= 200.0 {
            let halved = raw / 2.0;
            let scaled = raw / 2.55;
            match voltage_percent {
                Some(vp) if (scaled - vp).abs() < (halved - vp).abs() => {
                    (scaled, CONFIDENCE_AMBIGUOUS_RESOLVED, DataEncoding::Scale255, false)
                }
                Some(_) => (halved, CONFIDENCE_AMBIGUOUS_RESOLVED, DataEncoding::Percent200, false),
                None => (halved, CONFIDENCE_AMBIGUOUS_DEFAULT, DataEncoding::Percent200, false),
            }
        } else if raw <= 255.0 {
            (raw / 2.55, CONFIDENCE_SCALE255, DataEncoding::Scale255, false)
        } else {
            (100.0, CONFIDENCE_ANOMALOUS, DataEncoding::Unknown, true)
        };

        if anomalous {
            tracing::debug!(manufacturer = %profile.manufacturer_id, raw, "Battery reading out of range");
        }

        profile.record(Sample::new(raw, encoding, Evidence::Statistical));
        let newly_confirmed = self.try_confirm(profile);

        Evaluation {
            result: ClassificationResult {
                percentage: percentage(value),
                confidence,
                method: if anomalous {
                    ClassificationMethod::Anomalous
                } else {
                    ClassificationMethod::Detection
                },
                encoding,
                needs_learning: !profile.confirmed,
                anomalous,
            },
            changed: true,
            newly_confirmed,
        }
    }
}

fn normalize_id(manufacturer_id: &str) -> String {
    let trimmed = manufacturer_id.trim();
    if trimmed.is_empty() {
        UNKNOWN_MANUFACTURER.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::time::Duration;
    use zigsense_storage::{KvPersistence, MemoryBackend};

    fn engine() -> CalibrationEngine {
        CalibrationEngine::new(CalibrationConfig::default())
    }

    /// Store whose writes fail until `healthy` is set.
    #[derive(Default)]
    struct FlakyStore {
        healthy: AtomicBool,
    }

    #[async_trait]
    impl PersistenceStore for FlakyStore {
        async fn get(&self, _key: &str) -> zigsense_storage::Result<Option<Value>> {
            Ok(None)
        }

        async fn set(&self, _key: &str, _value: Value) -> zigsense_storage::Result<()> {
            if self.healthy.load(Ordering::SeqCst) {
                Ok(())
            } else {
                Err(zigsense_storage::Error::Storage("disk full".into()))
            }
        }

        async fn delete(&self, _key: &str) -> zigsense_storage::Result<bool> {
            Ok(false)
        }
    }

    /// Store that stalls writes of unconfirmed profiles.
    struct SlowUnconfirmedStore {
        inner: KvPersistence,
    }

    impl SlowUnconfirmedStore {
        fn new() -> Self {
            Self {
                inner: KvPersistence::new(Arc::new(MemoryBackend::default()), calibration::PROFILE_NAMESPACE),
            }
        }
    }

    #[async_trait]
    impl PersistenceStore for SlowUnconfirmedStore {
        async fn get(&self, key: &str) -> zigsense_storage::Result<Option<Value>> {
            self.inner.get(key).await
        }

        async fn set(&self, key: &str, value: Value) -> zigsense_storage::Result<()> {
            if value["confirmed"] == Value::Bool(false) {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
            self.inner.set(key, value).await
        }

        async fn delete(&self, key: &str) -> zigsense_storage::Result<bool> {
            self.inner.delete(key).await
        }
    }

    #[tokio::test]
    async fn test_statistical_confirmation_at_fifth_sample() {
        let engine = engine();
        for (i, raw) in [12.0, 12.0, 13.0, 11.0, 12.0].into_iter().enumerate() {
            let result = engine.classify(ClassifyInput::new(raw, "_TZ3000_new")).await;
            assert_eq!(result.method, ClassificationMethod::Detection);
            assert_eq!(result.encoding, DataEncoding::Percent100);

            let profile = engine.profile("_TZ3000_new").await.unwrap();
            if i < 4 {
                assert!(!profile.confirmed, "confirmed early at sample {}", i + 1);
                assert!(result.needs_learning);
            } else {
                assert!(profile.confirmed);
                assert_eq!(profile.data_encoding, DataEncoding::Percent100);
                assert_eq!(profile.confirmed_via, Some(Evidence::Statistical));
            }
        }

        let learned = engine.classify(ClassifyInput::new(40.0, "_TZ3000_new")).await;
        assert_eq!(learned.method, ClassificationMethod::Learned);
        assert_eq!(learned.percentage, 40);
        assert!(!learned.needs_learning);
    }

    #[tokio::test]
    async fn test_physical_confirmation_after_three_samples() {
        let engine = engine();
        for i in 0..3 {
            let input = ClassifyInput::new(160.0, "_TZE200_phys")
                .with_voltage(2.9)
                .with_current(0.0066)
                .with_chemistry(Chemistry::Cr2032);
            let result = engine.classify(input).await;
            assert_eq!(result.method, ClassificationMethod::Physical);
            assert_eq!(result.percentage, 80);
            assert_eq!(result.encoding, DataEncoding::Percent200);

            let profile = engine.profile("_TZE200_phys").await.unwrap();
            assert_eq!(profile.confirmed, i == 2);
        }

        let profile = engine.profile("_TZE200_phys").await.unwrap();
        assert_eq!(profile.data_encoding, DataEncoding::Percent200);
        assert_eq!(profile.confirmed_via, Some(Evidence::Physical));
        assert!(profile.voltage_supported && profile.current_supported);
    }

    #[tokio::test]
    async fn test_detection_magnitude_bands() {
        let engine = engine();
        let r = engine.classify(ClassifyInput::new(150.0, "a")).await;
        assert_eq!((r.percentage, r.encoding), (75, DataEncoding::Percent200));
        assert_eq!(r.confidence, CONFIDENCE_AMBIGUOUS_DEFAULT);

        let r = engine.classify(ClassifyInput::new(230.0, "b")).await;
        assert_eq!((r.percentage, r.encoding), (90, DataEncoding::Scale255));

        let r = engine.classify(ClassifyInput::new(300.0, "c")).await;
        assert!(r.anomalous);
        assert_eq!(r.method, ClassificationMethod::Anomalous);
        assert_eq!(r.percentage, 100);
        assert_eq!(r.confidence, CONFIDENCE_ANOMALOUS);

        let r = engine.classify(ClassifyInput::new(f64::NAN, "d")).await;
        assert!(r.anomalous);
        assert_eq!(r.percentage, 0);
    }

    #[tokio::test]
    async fn test_voltage_resolves_ambiguous_band() {
        let engine = engine();
        // 2.75 V on an inferred CR2032 is 50%; 128/2.55 = 50.2 beats 128/2 = 64
        let r = engine
            .classify(ClassifyInput::new(128.0, "amb").with_voltage(2.75))
            .await;
        assert_eq!(r.encoding, DataEncoding::Scale255);
        assert_eq!(r.confidence, CONFIDENCE_AMBIGUOUS_RESOLVED);
        assert_eq!(r.percentage, 50);
    }

    #[tokio::test]
    async fn test_single_voltage_with_chemistry() {
        let engine = engine();
        let r = engine
            .classify(
                ClassifyInput::new(55.0, "volt")
                    .with_voltage(2.75)
                    .with_chemistry(Chemistry::Cr2032),
            )
            .await;
        assert_eq!(r.method, ClassificationMethod::PhysicalVoltage);
        assert_eq!(r.percentage, 50);
        assert_eq!(r.encoding, DataEncoding::Percent100);
    }

    #[tokio::test]
    async fn test_blend_after_confirmation() {
        let engine = engine();
        for _ in 0..5 {
            engine.classify(ClassifyInput::new(100.0, "blend")).await;
        }
        // Learned 0-100 says 100%, the curve says 50%
        let r = engine
            .classify(
                ClassifyInput::new(100.0, "blend")
                    .with_voltage(2.75)
                    .with_chemistry(Chemistry::Cr2032),
            )
            .await;
        assert_eq!(r.method, ClassificationMethod::LearnedBlend);
        assert_eq!(r.percentage, 85);
    }

    #[tokio::test]
    async fn test_history_capacity_is_respected() {
        let engine = CalibrationEngine::new(CalibrationConfig {
            history_capacity: 4,
            ..CalibrationConfig::default()
        });
        // Alternate encodings so nothing confirms
        for i in 0..10 {
            let raw = if i % 2 == 0 { 50.0 } else { 230.0 };
            engine.classify(ClassifyInput::new(raw, "cap")).await;
        }
        let profile = engine.profile("cap").await.unwrap();
        assert!(!profile.confirmed);
        assert_eq!(profile.history.len(), 4);
    }

    #[tokio::test]
    async fn test_profiles_persist_and_reload() {
        let store: Arc<dyn PersistenceStore> = Arc::new(KvPersistence::new(
            Arc::new(MemoryBackend::default()),
            calibration::PROFILE_NAMESPACE,
        ));

        let first = CalibrationEngine::with_store(CalibrationConfig::default(), store.clone());
        for _ in 0..5 {
            first.classify(ClassifyInput::new(30.0, "_TZ3000_persist")).await;
        }
        drop(first);

        let second = CalibrationEngine::with_store(CalibrationConfig::default(), store.clone());
        let r = second.classify(ClassifyInput::new(30.0, "_TZ3000_persist")).await;
        assert_eq!(r.method, ClassificationMethod::Learned);

        assert!(second.forget("_TZ3000_persist").await.unwrap());
        assert!(store.get("_TZ3000_persist").await.unwrap().is_none());
        assert!(second.profile("_TZ3000_persist").await.is_none());
    }

    #[tokio::test]
    async fn test_failed_persist_rolls_back_confirmation() {
        let store = Arc::new(FlakyStore::default());
        let engine = CalibrationEngine::with_store(CalibrationConfig::default(), store.clone());

        let mut last = None;
        for _ in 0..5 {
            last = Some(engine.classify(ClassifyInput::new(20.0, "flaky")).await);
        }
        // Best-effort answer despite the failing store
        let last = last.unwrap();
        assert_eq!(last.percentage, 20);
        assert!(last.needs_learning);
        assert!(!engine.profile("flaky").await.unwrap().confirmed);

        // Once writes succeed the same history confirms again
        store.healthy.store(true, Ordering::SeqCst);
        engine.classify(ClassifyInput::new(20.0, "flaky")).await;
        assert!(engine.profile("flaky").await.unwrap().confirmed);
    }

    #[tokio::test]
    async fn test_concurrent_writes_keep_confirmation() {
        let store: Arc<dyn PersistenceStore> = Arc::new(SlowUnconfirmedStore::new());
        let engine = CalibrationEngine::with_store(CalibrationConfig::default(), store.clone());
        for _ in 0..3 {
            engine.classify(ClassifyInput::new(12.0, "m")).await;
        }

        // Fourth and fifth samples race; the fifth confirms
        tokio::join!(
            engine.classify(ClassifyInput::new(12.0, "m")),
            engine.classify(ClassifyInput::new(12.0, "m")),
        );
        assert!(engine.profile("m").await.unwrap().confirmed);

        let restarted = CalibrationEngine::with_store(CalibrationConfig::default(), store);
        let profile = restarted.profile("m").await.unwrap();
        assert!(profile.confirmed);
        assert_eq!(profile.history.len(), 5);
    }

    #[tokio::test]
    async fn test_empty_manufacturer_uses_shared_key() {
        let engine = engine();
        engine.classify(ClassifyInput::new(50.0, "  ")).await;
        assert!(engine.profile(UNKNOWN_MANUFACTURER).await.is_some());
    }

    #[test]
    fn test_infer_encoding() {
        assert_eq!(infer_encoding(160.0, 80.0, 12.0), DataEncoding::Percent200);
        assert_eq!(infer_encoding(80.0, 80.0, 12.0), DataEncoding::Percent100);
        assert_eq!(infer_encoding(20.0, 80.0, 12.0), DataEncoding::Unknown);
    }
}
