//! Rolling last-known capability values.

use std::collections::{HashMap, VecDeque};

use chrono::{DateTime, Utc};
use zigsense_core::CapabilityValue;

use crate::registry::Capability;

/// Bounded per-capability value history used as the poll baseline.
#[derive(Debug, Clone)]
pub struct LastKnownStore {
    capacity: usize,
    values: HashMap<Capability, VecDeque<(DateTime<Utc>, CapabilityValue)>>,
}

impl LastKnownStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            values: HashMap::new(),
        }
    }

    pub fn record(&mut self, capability: Capability, value: CapabilityValue) {
        let history = self.values.entry(capability).or_default();
        while history.len() >= self.capacity {
            history.pop_front();
        }
        history.push_back((Utc::now(), value));
    }

    /// Most recent value of a capability.
    pub fn latest(&self, capability: Capability) -> Option<&CapabilityValue> {
        self.values
            .get(&capability)
            .and_then(|h| h.back())
            .map(|(_, v)| v)
    }

    /// Retained values, oldest first.
    pub fn history(&self, capability: Capability) -> Vec<(DateTime<Utc>, CapabilityValue)> {
        self.values
            .get(&capability)
            .map(|h| h.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Capabilities with at least one value, sorted.
    pub fn capabilities(&self) -> Vec<Capability> {
        let mut caps: Vec<Capability> = self.values.keys().copied().collect();
        caps.sort();
        caps
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_latest_and_bounded_history() {
        let mut store = LastKnownStore::new(2);
        assert!(store.latest(Capability::MeasureTemperature).is_none());

        for v in [20.0, 20.5, 21.0] {
            store.record(Capability::MeasureTemperature, v.into());
        }
        assert_eq!(
            store.latest(Capability::MeasureTemperature),
            Some(&CapabilityValue::Float(21.0))
        );
        let values: Vec<CapabilityValue> = store
            .history(Capability::MeasureTemperature)
            .into_iter()
            .map(|(_, v)| v)
            .collect();
        assert_eq!(values, vec![20.5.into(), 21.0.into()]);
    }

    #[test]
    fn test_capabilities_are_independent() {
        let mut store = LastKnownStore::new(4);
        store.record(Capability::Onoff, true.into());
        store.record(Capability::Dim, 0.3.into());
        assert_eq!(store.capabilities(), vec![Capability::Onoff, Capability::Dim]);
        assert_eq!(store.latest(Capability::Onoff), Some(&CapabilityValue::Boolean(true)));
        assert!(!store.is_empty());
    }
}
