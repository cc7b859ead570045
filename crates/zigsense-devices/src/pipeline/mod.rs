//! Observation pipeline.
//!
//! Each registered device gets its own [`DeviceObserver`] task. The task owns
//! a bounded mpsc queue of inbound events, so per-device arrival order is
//! preserved while devices progress independently. A device may also have a
//! poll timer that reads its [`PollTarget`]s through the [`Transport`] and
//! feeds the results through the same path.
//!
//! ```text
//! Transport ──push──▶ submit() ──mpsc──▶ DeviceObserver ──▶ CapabilitySink
//!     ▲                                   │    │
//!     └───────────── read() ◀── poll tick ┘    └── CalibrationEngine (shared)
//! ```

pub mod last_known;
pub mod observer;
pub mod transport;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use zigsense_core::config::{env_vars, journal, pipeline as defaults, poll};

pub use last_known::LastKnownStore;
pub use observer::{DeviceObserver, ObserverContext, Origin, LOW_BATTERY_PERCENT};
pub use transport::{
    CapabilitySink, ChannelSink, InboundEvent, Payload, PollTarget, PushOnlyTransport, Transport,
};

use crate::calibration::{CalibrationEngine, Chemistry};
use crate::error::{DeviceError, Result};
use crate::registry::{CapabilityRegistry, DeviceCategory};

fn default_poll_interval_secs() -> u64 {
    poll::DEFAULT_INTERVAL_SECS
}

fn default_event_channel_capacity() -> usize {
    defaults::EVENT_CHANNEL_CAPACITY
}

fn default_last_known_capacity() -> usize {
    defaults::LAST_KNOWN_CAPACITY
}

fn default_journal_capacity() -> usize {
    journal::DEFAULT_CAPACITY
}

/// Pipeline-wide settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Poll interval for devices that do not set their own; 0 disables polling
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_event_channel_capacity")]
    pub event_channel_capacity: usize,
    #[serde(default = "default_last_known_capacity")]
    pub last_known_capacity: usize,
    #[serde(default = "default_journal_capacity")]
    pub journal_capacity: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            event_channel_capacity: default_event_channel_capacity(),
            last_known_capacity: default_last_known_capacity(),
            journal_capacity: default_journal_capacity(),
        }
    }
}

impl PipelineConfig {
    /// Defaults with environment overrides applied.
    pub fn from_env() -> Self {
        Self {
            poll_interval_secs: env_vars::poll_interval_secs(),
            journal_capacity: env_vars::journal_capacity(),
            ..Self::default()
        }
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = secs;
        self
    }

    pub fn with_event_channel_capacity(mut self, capacity: usize) -> Self {
        self.event_channel_capacity = capacity;
        self
    }

    pub fn with_last_known_capacity(mut self, capacity: usize) -> Self {
        self.last_known_capacity = capacity;
        self
    }

    pub fn with_journal_capacity(mut self, capacity: usize) -> Self {
        self.journal_capacity = capacity;
        self
    }
}

/// Static description of an observed device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceSpec {
    pub device_id: String,
    /// Learning key for battery calibration; the device id is used when absent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manufacturer_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<DeviceCategory>,
    /// Tuya datapoint dialect (`sensor`, `climate`, `light`, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub datapoint_dialect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chemistry: Option<Chemistry>,
    #[serde(default)]
    pub poll_targets: Vec<PollTarget>,
    /// Overrides the pipeline interval; 0 disables polling for this device
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub poll_interval_secs: Option<u64>,
}

impl DeviceSpec {
    pub fn new(device_id: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            manufacturer_id: None,
            category: None,
            datapoint_dialect: None,
            chemistry: None,
            poll_targets: Vec::new(),
            poll_interval_secs: None,
        }
    }

    pub fn with_manufacturer(mut self, manufacturer_id: impl Into<String>) -> Self {
        self.manufacturer_id = Some(manufacturer_id.into());
        self
    }

    pub fn with_category(mut self, category: DeviceCategory) -> Self {
        self.category = Some(category);
        self
    }

    pub fn with_dialect(mut self, dialect: impl Into<String>) -> Self {
        self.datapoint_dialect = Some(dialect.into());
        self
    }

    pub fn with_chemistry(mut self, chemistry: Chemistry) -> Self {
        self.chemistry = Some(chemistry);
        self
    }

    pub fn with_poll_target(mut self, target: PollTarget) -> Self {
        self.poll_targets.push(target);
        self
    }

    pub fn with_poll_interval_secs(mut self, secs: u64) -> Self {
        self.poll_interval_secs = Some(secs);
        self
    }
}

/// Effective poll period: `None` when disabled or nothing to poll.
fn effective_interval(period: Option<Duration>, has_targets: bool) -> Option<Duration> {
    period
        .filter(|p| has_targets && !p.is_zero())
        .map(|p| p.max(Duration::from_secs(poll::MIN_INTERVAL_SECS)))
}

struct DeviceHandle {
    events: mpsc::Sender<InboundEvent>,
    poll_interval: watch::Sender<Option<Duration>>,
    shutdown: watch::Sender<bool>,
    has_poll_targets: bool,
    task: JoinHandle<()>,
}

impl DeviceHandle {
    async fn stop(self, device_id: &str) {
        let _ = self.shutdown.send(true);
        if let Err(e) = self.task.await {
            tracing::warn!(device_id, "Device observer task failed: {}", e);
        }
    }
}

/// Owner of every device observer.
pub struct ObservationPipeline {
    ctx: ObserverContext,
    config: PipelineConfig,
    devices: RwLock<HashMap<String, DeviceHandle>>,
}

impl ObservationPipeline {
    pub fn new(
        registry: Arc<CapabilityRegistry>,
        calibration: Arc<CalibrationEngine>,
        transport: Arc<dyn Transport>,
        sink: Arc<dyn CapabilitySink>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            ctx: ObserverContext {
                registry,
                calibration,
                transport,
                sink,
            },
            config,
            devices: RwLock::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<CapabilityRegistry> {
        &self.ctx.registry
    }

    pub fn calibration(&self) -> &Arc<CalibrationEngine> {
        &self.ctx.calibration
    }

    /// Start observing a device. Must be called inside a tokio runtime.
    pub fn add_device(&self, spec: DeviceSpec) -> Result<()> {
        if spec.device_id.is_empty() {
            return Err(DeviceError::InvalidConfig("device id must not be empty".into()));
        }

        let mut devices = self.devices.write();
        if devices.contains_key(&spec.device_id) {
            return Err(DeviceError::AlreadyRegistered(spec.device_id));
        }

        let secs = spec.poll_interval_secs.unwrap_or(self.config.poll_interval_secs);
        let has_poll_targets = !spec.poll_targets.is_empty();
        let interval = effective_interval(Some(Duration::from_secs(secs)), has_poll_targets);

        let (events_tx, events_rx) = mpsc::channel(self.config.event_channel_capacity.max(1));
        let (interval_tx, interval_rx) = watch::channel(interval);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let device_id = spec.device_id.clone();
        let observer = DeviceObserver::new(spec, self.ctx.clone(), &self.config);
        let task = tokio::spawn(observer.run(events_rx, interval_rx, shutdown_rx));

        tracing::info!(device_id = %device_id, poll_interval = ?interval, "Device added to pipeline");
        devices.insert(
            device_id,
            DeviceHandle {
                events: events_tx,
                poll_interval: interval_tx,
                shutdown: shutdown_tx,
                has_poll_targets,
                task,
            },
        );
        Ok(())
    }

    /// Stop a device's observer and poll timer, waiting for the task to end.
    pub async fn remove_device(&self, device_id: &str) -> Result<()> {
        let handle = self
            .devices
            .write()
            .remove(device_id)
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))?;
        handle.stop(device_id).await;
        tracing::info!(device_id, "Device removed from pipeline");
        Ok(())
    }

    /// Queue an event for its device. Waits while the device queue is full.
    pub async fn submit(&self, event: InboundEvent) -> Result<()> {
        let sender = self
            .devices
            .read()
            .get(&event.device_id)
            .map(|h| h.events.clone())
            .ok_or_else(|| DeviceError::NotFound(event.device_id.clone()))?;

        sender
            .send(event)
            .await
            .map_err(|e| DeviceError::ChannelClosed(e.0.device_id))
    }

    /// Change or cancel (`None` or zero) a device's poll timer.
    pub fn set_poll_interval(&self, device_id: &str, interval: Option<Duration>) -> Result<()> {
        let devices = self.devices.read();
        let handle = devices
            .get(device_id)
            .ok_or_else(|| DeviceError::NotFound(device_id.to_string()))?;

        let effective = effective_interval(interval, handle.has_poll_targets);
        handle
            .poll_interval
            .send(effective)
            .map_err(|_| DeviceError::ChannelClosed(device_id.to_string()))?;
        tracing::debug!(device_id, poll_interval = ?effective, "Poll interval updated");
        Ok(())
    }

    /// Observed device ids, sorted.
    pub fn devices(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().keys().cloned().collect();
        ids.sort();
        ids
    }

    pub fn contains(&self, device_id: &str) -> bool {
        self.devices.read().contains_key(device_id)
    }

    /// Stop every observer.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, DeviceHandle)> = self.devices.write().drain().collect();
        let count = handles.len();
        futures::future::join_all(handles.into_iter().map(|(id, handle)| async move {
            handle.stop(&id).await;
        }))
        .await;
        tracing::info!(devices = count, "Observation pipeline stopped");
    }
}
