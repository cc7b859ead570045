//! Per-device observer task.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::time::{Instant, Interval, MissedTickBehavior};
use zigsense_core::{CapabilityUpdate, CapabilityValue};

use super::last_known::LastKnownStore;
use super::transport::{CapabilitySink, InboundEvent, Payload, Transport};
use super::{DeviceSpec, PipelineConfig};
use crate::calibration::{CalibrationEngine, ClassifyInput};
use crate::frame::{
    numeric, AttributeValue, DatapointValue, DecodedEvent, Direction, FrameInterpreter, GlobalBody,
    NumericEncoding, RoutingMeta,
};
use crate::registry::{Capability, CapabilityDescriptor, CapabilityRegistry};

/// Battery percentage at or below which `alarm_battery` is raised.
pub const LOW_BATTERY_PERCENT: u8 = 10;

/// Shared collaborators every observer needs.
#[derive(Clone)]
pub struct ObserverContext {
    pub registry: Arc<CapabilityRegistry>,
    pub calibration: Arc<CalibrationEngine>,
    pub transport: Arc<dyn Transport>,
    pub sink: Arc<dyn CapabilitySink>,
}

/// How an event reached the observer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    /// Pushed by the transport; always emitted
    Push,
    /// Result of a poll read; suppressed when equal to the baseline
    Poll,
}

/// One protocol-level value extracted from an event.
#[derive(Debug, Clone, PartialEq)]
enum Reading {
    Attribute {
        cluster_id: u16,
        attribute_id: u16,
        value: CapabilityValue,
    },
    /// Cluster-wide value with no attribute id (numeric fallback)
    Cluster { cluster_id: u16, value: CapabilityValue },
    Datapoint { index: u8, value: CapabilityValue },
    /// Already mapped to a capability by the decoder
    Direct {
        capability: Capability,
        value: CapabilityValue,
    },
}

/// Turns one device's events into capability updates.
pub struct DeviceObserver {
    spec: DeviceSpec,
    ctx: ObserverContext,
    interpreter: FrameInterpreter,
    last_known: LastKnownStore,
    battery_voltage: Option<f64>,
    battery_current: Option<f64>,
}

impl DeviceObserver {
    pub fn new(spec: DeviceSpec, ctx: ObserverContext, config: &PipelineConfig) -> Self {
        Self {
            spec,
            ctx,
            interpreter: FrameInterpreter::new(config.journal_capacity),
            last_known: LastKnownStore::new(config.last_known_capacity),
            battery_voltage: None,
            battery_current: None,
        }
    }

    pub fn spec(&self) -> &DeviceSpec {
        &self.spec
    }

    pub fn interpreter(&self) -> &FrameInterpreter {
        &self.interpreter
    }

    pub fn last_known(&self) -> &LastKnownStore {
        &self.last_known
    }

    /// Most recent battery voltage seen on this device, in volts.
    pub fn battery_voltage(&self) -> Option<f64> {
        self.battery_voltage
    }

    /// Most recent battery load current seen on this device, in amperes.
    pub fn battery_current(&self) -> Option<f64> {
        self.battery_current
    }

    /// Process one event and return the updates that were emitted.
    pub async fn handle_event(&mut self, event: InboundEvent, origin: Origin) -> Vec<CapabilityUpdate> {
        let readings = self.extract_readings(&event);
        let mut emitted = Vec::new();

        for reading in readings {
            for (capability, value) in self.resolve_reading(reading).await {
                if let Some(update) = self.emit(capability, value, origin).await {
                    emitted.push(update);
                }
            }
        }
        emitted
    }

    /// Read every poll target once and feed the results through the
    /// classification path.
    pub async fn poll(&mut self) -> Vec<CapabilityUpdate> {
        let mut emitted = Vec::new();
        let targets = self.spec.poll_targets.clone();

        for target in targets {
            match self.ctx.transport.read(&self.spec.device_id, &target).await {
                Ok(payload) => {
                    let event = InboundEvent {
                        device_id: self.spec.device_id.clone(),
                        endpoint_id: target.endpoint_id,
                        cluster_id: target.cluster_id,
                        direction: Direction::ServerToClient,
                        payload,
                        received_at: Utc::now(),
                    };
                    emitted.extend(self.handle_event(event, Origin::Poll).await);
                }
                Err(e) => {
                    tracing::warn!(
                        device_id = %self.spec.device_id,
                        cluster = %format!("0x{:04X}", target.cluster_id),
                        attribute = %format!("0x{:04X}", target.attribute_id),
                        "Poll read failed: {}",
                        e
                    );
                }
            }
        }
        emitted
    }

    fn routing_meta(&self, event: &InboundEvent) -> RoutingMeta {
        let mut meta = RoutingMeta::new(event.endpoint_id, event.cluster_id).with_direction(event.direction);
        if let Some(manufacturer) = &self.spec.manufacturer_id {
            meta = meta.with_manufacturer(manufacturer.clone());
        }
        if let Some(category) = self.spec.category {
            meta = meta.with_category(category);
        }
        meta
    }

    fn extract_readings(&mut self, event: &InboundEvent) -> Vec<Reading> {
        let bytes = match &event.payload {
            Payload::Attribute { attribute_id, value } => {
                return vec![Reading::Attribute {
                    cluster_id: event.cluster_id,
                    attribute_id: *attribute_id,
                    value: value.clone(),
                }];
            }
            Payload::Datapoint { index, value } => {
                return vec![datapoint_reading(*index, value)];
            }
            Payload::Raw(bytes) => bytes,
        };

        let meta = self.routing_meta(event);
        match self.interpreter.interpret(bytes, &meta) {
            DecodedEvent::ZclGlobalCommand {
                body: GlobalBody::Attributes { records },
                ..
            } => records
                .into_iter()
                .filter(|r| r.is_success() && !matches!(r.value, AttributeValue::NoData))
                .map(|r| Reading::Attribute {
                    cluster_id: event.cluster_id,
                    attribute_id: r.attribute_id,
                    value: CapabilityValue::from(&r.value),
                })
                .collect(),
            DecodedEvent::TuyaDatapointReport { datapoints, .. } => datapoints
                .iter()
                .map(|dp| datapoint_reading(dp.index, &dp.value))
                .collect(),
            DecodedEvent::IasZoneStatus(status) => {
                let alarm = self
                    .spec
                    .category
                    .map(|c| c.alarm_capability())
                    .unwrap_or(Capability::AlarmGeneric);
                vec![
                    Reading::Direct {
                        capability: alarm,
                        value: status.any_alarm().into(),
                    },
                    Reading::Direct {
                        capability: Capability::AlarmTamper,
                        value: status.tamper.into(),
                    },
                    Reading::Direct {
                        capability: Capability::AlarmBattery,
                        value: status.battery_low.into(),
                    },
                ]
            }
            DecodedEvent::TuyaButtonAction { button, action } => vec![Reading::Direct {
                capability: Capability::Button,
                value: CapabilityValue::String(format!("{}_{}", button, action.as_str())),
            }],
            DecodedEvent::GenericNumeric { candidates, .. } => {
                let encoding = match bytes.len() {
                    1 => NumericEncoding::U8,
                    2 | 3 => NumericEncoding::U16Le,
                    _ => NumericEncoding::U32Le,
                };
                match numeric::pick(&candidates, encoding) {
                    Some(v) => vec![Reading::Cluster {
                        cluster_id: event.cluster_id,
                        value: v.into(),
                    }],
                    None => Vec::new(),
                }
            }
            DecodedEvent::Failed { reason, detail } => {
                tracing::warn!(
                    device_id = %self.spec.device_id,
                    cluster = %format!("0x{:04X}", event.cluster_id),
                    %reason,
                    "Skipping undecodable frame: {}",
                    detail
                );
                Vec::new()
            }
            other => {
                tracing::trace!(
                    device_id = %self.spec.device_id,
                    kind = other.kind(),
                    "Frame carries no readings"
                );
                Vec::new()
            }
        }
    }

    fn descriptor(&self, reading: &Reading) -> Option<CapabilityDescriptor> {
        let registry = &self.ctx.registry;
        let found = match reading {
            Reading::Attribute {
                cluster_id,
                attribute_id,
                ..
            } => registry.resolve_attribute(*cluster_id, *attribute_id),
            Reading::Cluster { cluster_id, .. } => registry.resolve_by_cluster(*cluster_id),
            Reading::Datapoint { index, .. } => {
                let dialect = self.spec.datapoint_dialect.as_deref()?;
                registry.resolve_by_datapoint(dialect, *index, self.spec.category)
            }
            Reading::Direct { .. } => None,
        };
        found.cloned()
    }

    async fn resolve_reading(&mut self, reading: Reading) -> Vec<(Capability, CapabilityValue)> {
        let descriptor = match &reading {
            Reading::Direct { capability, value } => return vec![(*capability, value.clone())],
            _ => self.descriptor(&reading),
        };
        let value = match reading {
            Reading::Attribute { value, .. } | Reading::Cluster { value, .. } | Reading::Datapoint { value, .. } => {
                value
            }
            Reading::Direct { .. } => return Vec::new(),
        };

        let Some(descriptor) = descriptor else {
            tracing::debug!(
                device_id = %self.spec.device_id,
                ?value,
                "No capability descriptor for reading"
            );
            return Vec::new();
        };

        if descriptor.calibrate && descriptor.capabilities.iter().any(Capability::is_battery) {
            return self.classify_battery(&descriptor, &value).await;
        }

        let Some(converted) = descriptor.converter.apply(&value) else {
            tracing::debug!(
                device_id = %self.spec.device_id,
                capability = ?descriptor.primary(),
                ?value,
                "Converter rejected value"
            );
            return Vec::new();
        };

        // Calibrate-flagged electrical readings describe the battery
        if descriptor.calibrate {
            for capability in descriptor.capabilities.iter().filter(|c| c.is_energy()) {
                match capability {
                    Capability::MeasureVoltage => self.battery_voltage = converted.as_f64(),
                    Capability::MeasureCurrent => self.battery_current = converted.as_f64(),
                    _ => {}
                }
            }
        }

        descriptor
            .capabilities
            .iter()
            .map(|c| (*c, converted.clone()))
            .collect()
    }

    async fn classify_battery(
        &self,
        descriptor: &CapabilityDescriptor,
        value: &CapabilityValue,
    ) -> Vec<(Capability, CapabilityValue)> {
        let Some(raw) = value.as_f64() else {
            return Vec::new();
        };
        let manufacturer = self
            .spec
            .manufacturer_id
            .as_deref()
            .unwrap_or(&self.spec.device_id);
        let input = ClassifyInput::new(raw, manufacturer)
            .with_voltage(self.battery_voltage)
            .with_current(self.battery_current)
            .with_chemistry(self.spec.chemistry);
        let result = self.ctx.calibration.classify(input).await;

        descriptor
            .capabilities
            .iter()
            .map(|c| match c {
                Capability::AlarmBattery => (
                    *c,
                    CapabilityValue::Boolean(result.percentage <= LOW_BATTERY_PERCENT),
                ),
                _ => (*c, CapabilityValue::Integer(i64::from(result.percentage))),
            })
            .collect()
    }

    async fn emit(&mut self, capability: Capability, value: CapabilityValue, origin: Origin) -> Option<CapabilityUpdate> {
        if origin == Origin::Poll && self.last_known.latest(capability) == Some(&value) {
            tracing::trace!(
                device_id = %self.spec.device_id,
                capability = %capability,
                "Poll value unchanged"
            );
            return None;
        }
        self.last_known.record(capability, value.clone());

        let update = CapabilityUpdate::new(self.spec.device_id.clone(), capability.name(), value);
        if let Err(e) = self.ctx.sink.publish(update.clone()).await {
            tracing::warn!(
                device_id = %self.spec.device_id,
                capability = %capability,
                "Failed to publish capability update: {}",
                e
            );
        }
        Some(update)
    }

    /// Event loop. Runs until shutdown is signalled or every sender is gone.
    pub(crate) async fn run(
        mut self,
        mut events: mpsc::Receiver<InboundEvent>,
        mut poll_interval: watch::Receiver<Option<Duration>>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = poll_ticker(*poll_interval.borrow_and_update());
        tracing::info!(
            device_id = %self.spec.device_id,
            poll_interval = ?ticker.as_ref().map(Interval::period),
            "Device observer started"
        );

        loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                changed = poll_interval.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    ticker = poll_ticker(*poll_interval.borrow_and_update());
                    tracing::debug!(
                        device_id = %self.spec.device_id,
                        poll_interval = ?ticker.as_ref().map(Interval::period),
                        "Poll interval changed"
                    );
                }
                event = events.recv() => match event {
                    Some(event) => {
                        self.handle_event(event, Origin::Push).await;
                    }
                    None => break,
                },
                _ = next_tick(&mut ticker) => {
                    self.poll().await;
                }
            }
        }

        tracing::debug!(device_id = %self.spec.device_id, "Device observer stopped");
    }
}

fn datapoint_reading(index: u8, value: &DatapointValue) -> Reading {
    Reading::Datapoint {
        index,
        value: CapabilityValue::from(value),
    }
}

/// Poll timer whose first tick is one full period away.
fn poll_ticker(period: Option<Duration>) -> Option<Interval> {
    let period = period.filter(|p| !p.is_zero())?;
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    Some(interval)
}

async fn next_tick(ticker: &mut Option<Interval>) {
    match ticker {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}
