//! Capability registry.
//!
//! Maps ZCL clusters/attributes and Tuya datapoint indices to semantic
//! capabilities plus the converter that produces their values. The built-in
//! table is embedded JSON (`data/capabilities.json`); a registry is immutable
//! once built and is shared between observers behind an `Arc`.
//!
//! Datapoint indices are only meaningful within a dialect (`sensor`,
//! `climate`, `light`, ...). One index may carry several category-scoped
//! meanings; [`CapabilityRegistry::resolve_by_datapoint`] picks one using a
//! [`DeviceCategory`] hint.

pub mod capability;
pub mod converter;

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

pub use capability::{Capability, DeviceCategory};
pub use converter::{CompositeFormat, Converter};

use crate::error::{DeviceError, Result};

const BUILTIN_TABLE: &str = include_str!("../../data/capabilities.json");

/// Where a descriptor was bound.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DescriptorSource {
    Cluster {
        cluster_id: u16,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attribute_id: Option<u16>,
    },
    Datapoint { category: String, index: u8 },
}

/// Capabilities a protocol primitive feeds, and how to convert its value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CapabilityDescriptor {
    pub capabilities: Vec<Capability>,
    pub source: DescriptorSource,
    pub converter: Converter,
    /// Empty means the descriptor applies to every device category
    pub applies_to: Vec<DeviceCategory>,
    /// Raw value may need adaptive battery calibration
    pub calibrate: bool,
}

impl CapabilityDescriptor {
    pub fn is_universal(&self) -> bool {
        self.applies_to.is_empty()
    }

    pub fn primary(&self) -> Option<Capability> {
        self.capabilities.first().copied()
    }
}

#[derive(Debug, Deserialize)]
struct TableEntry {
    #[serde(default)]
    capabilities: Vec<Capability>,
    #[serde(default)]
    converter: Converter,
    #[serde(default)]
    applies_to: Vec<DeviceCategory>,
    #[serde(default)]
    calibrate: bool,
}

#[derive(Debug, Deserialize)]
struct ClusterEntry {
    #[serde(flatten)]
    entry: TableEntry,
    #[serde(default)]
    attributes: BTreeMap<String, TableEntry>,
}

#[derive(Debug, Deserialize)]
struct Table {
    #[serde(default)]
    clusters: BTreeMap<String, ClusterEntry>,
    #[serde(default)]
    datapoints: BTreeMap<String, BTreeMap<String, Vec<TableEntry>>>,
}

impl TableEntry {
    fn into_descriptor(self, source: DescriptorSource) -> CapabilityDescriptor {
        CapabilityDescriptor {
            capabilities: self.capabilities,
            source,
            converter: self.converter,
            applies_to: self.applies_to,
            calibrate: self.calibrate,
        }
    }
}

fn parse_hex_id(key: &str) -> Result<u16> {
    let digits = key
        .strip_prefix("0x")
        .or_else(|| key.strip_prefix("0X"))
        .unwrap_or(key);
    u16::from_str_radix(digits, 16)
        .map_err(|_| DeviceError::InvalidConfig(format!("invalid cluster/attribute id: {}", key)))
}

/// Immutable lookup tables.
#[derive(Debug, Default)]
pub struct CapabilityRegistry {
    clusters: HashMap<u16, CapabilityDescriptor>,
    attributes: HashMap<(u16, u16), CapabilityDescriptor>,
    datapoints: HashMap<String, HashMap<u8, Vec<CapabilityDescriptor>>>,
}

impl CapabilityRegistry {
    /// Registry built from the embedded table.
    pub fn builtin() -> Result<Self> {
        Self::from_json(BUILTIN_TABLE)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let table: Table = serde_json::from_str(json)?;
        let mut registry = Self::default();

        for (cluster_key, cluster_entry) in table.clusters {
            let cluster_id = parse_hex_id(&cluster_key)?;

            for (attr_key, entry) in cluster_entry.attributes {
                let attribute_id = parse_hex_id(&attr_key)?;
                if entry.capabilities.is_empty() {
                    continue;
                }
                let descriptor = entry.into_descriptor(DescriptorSource::Cluster {
                    cluster_id,
                    attribute_id: Some(attribute_id),
                });
                registry.attributes.insert((cluster_id, attribute_id), descriptor);
            }

            if !cluster_entry.entry.capabilities.is_empty() {
                let descriptor = cluster_entry.entry.into_descriptor(DescriptorSource::Cluster {
                    cluster_id,
                    attribute_id: None,
                });
                registry.clusters.insert(cluster_id, descriptor);
            }
        }

        for (category, indices) in table.datapoints {
            let by_index = registry.datapoints.entry(category.clone()).or_default();
            for (index_key, entries) in indices {
                let index: u8 = index_key.parse().map_err(|_| {
                    DeviceError::InvalidConfig(format!(
                        "invalid datapoint index {} in category {}",
                        index_key, category
                    ))
                })?;
                let descriptors = entries
                    .into_iter()
                    .filter(|e| !e.capabilities.is_empty())
                    .map(|e| {
                        e.into_descriptor(DescriptorSource::Datapoint {
                            category: category.clone(),
                            index,
                        })
                    })
                    .collect();
                by_index.insert(index, descriptors);
            }
        }

        tracing::debug!(
            clusters = registry.clusters.len(),
            attributes = registry.attributes.len(),
            datapoint_categories = registry.datapoints.len(),
            "Capability registry loaded"
        );
        Ok(registry)
    }

    /// Cluster-wide descriptor.
    pub fn resolve_by_cluster(&self, cluster_id: u16) -> Option<&CapabilityDescriptor> {
        self.clusters.get(&cluster_id)
    }

    /// Attribute-specific descriptor, falling back to the cluster-wide one.
    pub fn resolve_attribute(&self, cluster_id: u16, attribute_id: u16) -> Option<&CapabilityDescriptor> {
        self.attributes
            .get(&(cluster_id, attribute_id))
            .or_else(|| self.resolve_by_cluster(cluster_id))
    }

    /// Datapoint descriptor within a dialect.
    ///
    /// With a hint, an entry scoped to that category wins; otherwise (or if
    /// nothing is scoped to it) the first universal entry is used.
    pub fn resolve_by_datapoint(
        &self,
        category: &str,
        index: u8,
        hint: Option<DeviceCategory>,
    ) -> Option<&CapabilityDescriptor> {
        let entries = self.datapoints.get(category)?.get(&index)?;

        if let Some(hint) = hint {
            if let Some(scoped) = entries.iter().find(|d| d.applies_to.contains(&hint)) {
                return Some(scoped);
            }
        }
        entries.iter().find(|d| d.is_universal())
    }

    /// Descriptors for a device's clusters followed by those for its
    /// datapoints, each group in argument order. Unknown ids are skipped.
    pub fn resolve_all(
        &self,
        clusters: &[u16],
        category: &str,
        indices: &[u8],
        hint: Option<DeviceCategory>,
    ) -> Vec<&CapabilityDescriptor> {
        let by_cluster = clusters.iter().filter_map(|id| self.resolve_by_cluster(*id));
        let by_datapoint = indices
            .iter()
            .filter_map(|index| self.resolve_by_datapoint(category, *index, hint));
        by_cluster.chain(by_datapoint).collect()
    }

    /// Every meaning registered for a datapoint index.
    pub fn datapoint_alternatives(&self, category: &str, index: u8) -> &[CapabilityDescriptor] {
        self.datapoints
            .get(category)
            .and_then(|m| m.get(&index))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Datapoint dialects known to the registry, sorted.
    pub fn datapoint_categories(&self) -> Vec<&str> {
        let mut categories: Vec<&str> = self.datapoints.keys().map(String::as_str).collect();
        categories.sort_unstable();
        categories
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::cluster;

    fn registry() -> CapabilityRegistry {
        CapabilityRegistry::builtin().unwrap()
    }

    #[test]
    fn test_builtin_table_parses() {
        let reg = registry();
        assert!(reg.datapoint_categories().contains(&"sensor"));
        assert!(reg.datapoint_categories().contains(&"light"));
    }

    #[test]
    fn test_resolve_by_cluster() {
        let reg = registry();
        let onoff = reg.resolve_by_cluster(cluster::ON_OFF).unwrap();
        assert_eq!(onoff.capabilities, vec![Capability::Onoff]);
        assert_eq!(onoff.converter, Converter::Boolean { invert: false });
        assert!(reg.resolve_by_cluster(0xFC00).is_none());
    }

    #[test]
    fn test_resolve_attribute_override_and_fallback() {
        let reg = registry();
        let battery = reg.resolve_attribute(cluster::POWER_CONFIGURATION, 0x0021).unwrap();
        assert!(battery.calibrate);
        assert_eq!(battery.primary(), Some(Capability::MeasureBattery));

        // Attribute without an override uses the cluster entry
        let temp = reg.resolve_attribute(cluster::TEMPERATURE, 0x0000).unwrap();
        assert_eq!(temp.primary(), Some(Capability::MeasureTemperature));

        assert!(reg.resolve_attribute(cluster::POWER_CONFIGURATION, 0x0033).is_none());
    }

    #[test]
    fn test_datapoint_category_scoping() {
        let reg = registry();
        let contact = reg
            .resolve_by_datapoint("sensor", 1, Some(DeviceCategory::ContactSensor))
            .unwrap();
        assert_eq!(contact.primary(), Some(Capability::AlarmContact));

        assert_eq!(
            contact.converter.apply(&zigsense_core::CapabilityValue::Boolean(true)),
            Some(zigsense_core::CapabilityValue::Boolean(false))
        );

        let motion = reg
            .resolve_by_datapoint("sensor", 1, Some(DeviceCategory::MotionSensor))
            .unwrap();
        assert_eq!(motion.primary(), Some(Capability::AlarmMotion));

        let universal = reg.resolve_by_datapoint("sensor", 1, None).unwrap();
        assert_eq!(universal.primary(), Some(Capability::AlarmGeneric));

        // Hint with no scoped entry falls back to the universal one
        let plug = reg.resolve_by_datapoint("sensor", 1, Some(DeviceCategory::Plug)).unwrap();
        assert_eq!(plug.primary(), Some(Capability::AlarmGeneric));

        assert!(reg.datapoint_alternatives("sensor", 1).len() > 2);
    }

    #[test]
    fn test_scoped_only_index_without_hint_misses() {
        let reg = registry();
        assert!(reg.resolve_by_datapoint("sensor", 101, None).is_none());
        assert!(reg
            .resolve_by_datapoint("sensor", 101, Some(DeviceCategory::MotionSensor))
            .is_some());
        assert!(reg.resolve_by_datapoint("sensor", 200, None).is_none());
        assert!(reg.resolve_by_datapoint("unknown", 1, None).is_none());
    }

    #[test]
    fn test_resolve_all_lists_clusters_first() {
        let reg = registry();
        let all = reg.resolve_all(
            &[cluster::TEMPERATURE, 0xFC00, cluster::ON_OFF],
            "sensor",
            &[1, 200, 3],
            Some(DeviceCategory::ContactSensor),
        );
        let primaries: Vec<Option<Capability>> = all.iter().map(|d| d.primary()).collect();
        assert_eq!(
            primaries,
            vec![
                Some(Capability::MeasureTemperature),
                Some(Capability::Onoff),
                Some(Capability::AlarmContact),
                Some(Capability::AlarmBattery),
            ]
        );
        assert!(matches!(all[0].source, DescriptorSource::Cluster { .. }));
        assert!(matches!(all[3].source, DescriptorSource::Datapoint { .. }));

        assert!(reg.resolve_all(&[], "sensor", &[], None).is_empty());
    }

    #[test]
    fn test_invalid_table_is_config_error() {
        let err = CapabilityRegistry::from_json(r#"{"clusters": {"0xZZ": {"capabilities": ["onoff"]}}}"#)
            .unwrap_err();
        assert!(matches!(err, DeviceError::InvalidConfig(_)));

        let err = CapabilityRegistry::from_json("not json").unwrap_err();
        assert!(matches!(err, DeviceError::Serialization(_)));
    }

    #[test]
    fn test_composite_light_datapoint() {
        let reg = registry();
        let hsv = reg.resolve_by_datapoint("light", 24, None).unwrap();
        let value = hsv.converter.apply(&"00b403e801f4".into());
        assert!(matches!(value, Some(zigsense_core::CapabilityValue::Color(_))));
    }
}
