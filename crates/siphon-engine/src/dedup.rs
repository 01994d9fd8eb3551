//! First-seen-wins deduplication by record key.

use std::collections::HashSet;

use indexmap::IndexMap;
use siphon_types::Record;

/// Collapses a record stream to one record per key.
///
/// Pending records are kept in insertion order until taken; the set of
/// keys already seen survives [`take_batch`](Self::take_batch), so memory
/// grows with distinct keys retained, never with rows scanned.
#[derive(Debug, Default)]
pub struct Deduplicator {
    pending: IndexMap<String, Record>,
    seen: HashSet<String>,
    dropped_empty_keys: u64,
}

impl Deduplicator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Offer one record. Returns `true` if it was kept.
    ///
    /// Records with a blank key are dropped and counted.
    pub fn offer(&mut self, record: Record) -> bool {
        if !record.has_key() {
            self.dropped_empty_keys += 1;
            return false;
        }
        if self.seen.contains(record.key()) {
            return false;
        }
        self.seen.insert(record.key().to_string());
        self.pending.insert(record.key().to_string(), record);
        true
    }

    /// Offer every record, returning how many were kept.
    pub fn extend(&mut self, records: impl IntoIterator<Item = Record>) -> usize {
        records
            .into_iter()
            .map(|r| usize::from(self.offer(r)))
            .sum()
    }

    /// Drain pending records in insertion order. Seen keys are retained.
    pub fn take_batch(&mut self) -> Vec<Record> {
        self.pending.drain(..).map(|(_, r)| r).collect()
    }

    /// Drain pending records into a key-ordered map.
    pub fn take_map(&mut self) -> IndexMap<String, Record> {
        std::mem::take(&mut self.pending)
    }

    /// Distinct keys accepted so far.
    #[must_use]
    pub fn unique_keys(&self) -> usize {
        self.seen.len()
    }

    #[must_use]
    pub fn dropped_empty_keys(&self) -> u64 {
        self.dropped_empty_keys
    }
}

/// Deduplicate a finite collection in one call.
pub fn dedup(records: impl IntoIterator<Item = Record>) -> Vec<Record> {
    let mut d = Deduplicator::new();
    d.extend(records);
    d.take_batch()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(key: &str, tag: i64) -> Record {
        Record::new(key, None).with_field("tag", tag)
    }

    #[test]
    fn first_seen_wins_and_order_is_kept() {
        let out = dedup(vec![rec("b", 1), rec("a", 2), rec("b", 3), rec("c", 4)]);
        let keys: Vec<_> = out.iter().map(Record::key).collect();
        assert_eq!(keys, vec!["b", "a", "c"]);
        assert_eq!(out[0].field("tag").and_then(|v| v.as_i64()), Some(1));
    }

    #[test]
    fn duplicates_across_batches_are_dropped() {
        let mut d = Deduplicator::new();
        d.extend(vec![rec("1", 0), rec("2", 0)]);
        assert_eq!(d.take_batch().len(), 2);
        d.extend(vec![rec("2", 1), rec("3", 1)]);
        let second = d.take_batch();
        assert_eq!(second.len(), 1);
        assert_eq!(second[0].key(), "3");
        assert_eq!(d.unique_keys(), 3);
        assert!(d.take_batch().is_empty());
    }

    #[test]
    fn empty_keys_are_counted_not_kept() {
        let mut d = Deduplicator::new();
        assert!(!d.offer(rec("", 0)));
        assert!(!d.offer(rec("  ", 0)));
        assert!(d.offer(rec("x", 0)));
        assert_eq!(d.dropped_empty_keys(), 2);
        assert_eq!(d.unique_keys(), 1);
    }

    #[test]
    fn rerunning_on_output_is_a_noop() {
        let once = dedup(vec![rec("a", 1), rec("a", 2), rec("b", 3)]);
        let twice = dedup(once.clone());
        assert_eq!(once, twice);
    }
}
