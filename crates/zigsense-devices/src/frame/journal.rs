//! Bounded journal of recently interpreted frames, for debugging.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zigsense_core::config::journal::MAX_HEX_BYTES;

use super::RoutingMeta;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JournalRecord {
    /// Monotonic per journal
    pub frame_id: u64,
    pub timestamp: DateTime<Utc>,
    /// Frame bytes as lowercase hex, cut at `MAX_HEX_BYTES`
    pub hex: String,
    pub length: usize,
    pub meta: RoutingMeta,
    /// Decoded event kind, or `failed`
    pub outcome: String,
}

/// Ring buffer of [`JournalRecord`]s; the oldest record is evicted first.
#[derive(Debug)]
pub struct FrameJournal {
    records: VecDeque<JournalRecord>,
    capacity: usize,
    next_id: u64,
}

impl FrameJournal {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
            next_id: 0,
        }
    }

    pub fn record(&mut self, bytes: &[u8], meta: &RoutingMeta, outcome: &str) -> u64 {
        let frame_id = self.next_id;
        self.next_id += 1;

        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(JournalRecord {
            frame_id,
            timestamp: Utc::now(),
            hex: hex::encode(&bytes[..bytes.len().min(MAX_HEX_BYTES)]),
            length: bytes.len(),
            meta: meta.clone(),
            outcome: outcome.to_string(),
        });
        frame_id
    }

    /// Records oldest first.
    pub fn records(&self) -> impl Iterator<Item = &JournalRecord> {
        self.records.iter()
    }

    pub fn latest(&self) -> Option<&JournalRecord> {
        self.records.back()
    }

    pub fn failures(&self) -> impl Iterator<Item = &JournalRecord> {
        self.records.iter().filter(|r| r.outcome == "failed")
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn clear(&mut self) {
        self.records.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eviction_keeps_newest() {
        let meta = RoutingMeta::new(1, 0x0006);
        let mut journal = FrameJournal::new(3);
        for i in 0..5u8 {
            journal.record(&[i], &meta, "zcl_global_command");
        }
        assert_eq!(journal.len(), 3);
        let ids: Vec<u64> = journal.records().map(|r| r.frame_id).collect();
        assert_eq!(ids, vec![2, 3, 4]);
        assert_eq!(journal.latest().map(|r| r.hex.as_str()), Some("04"));
    }

    #[test]
    fn test_hex_is_truncated() {
        let meta = RoutingMeta::new(1, 0x0006);
        let mut journal = FrameJournal::new(1);
        journal.record(&vec![0xAB; MAX_HEX_BYTES + 10], &meta, "generic_numeric");
        let record = journal.latest().unwrap();
        assert_eq!(record.hex.len(), MAX_HEX_BYTES * 2);
        assert_eq!(record.length, MAX_HEX_BYTES + 10);
    }

    #[test]
    fn test_failures_filter() {
        let meta = RoutingMeta::new(1, 0x0500);
        let mut journal = FrameJournal::new(0);
        assert_eq!(journal.capacity(), 1);
        journal.record(&[], &meta, "failed");
        assert_eq!(journal.failures().count(), 1);
        journal.clear();
        assert!(journal.is_empty());
    }
}
