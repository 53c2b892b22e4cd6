use std::collections::HashMap;

use nostr_sdk::prelude::*;

use crate::key::QueryKey;

/// Highest `created_at` (seconds) across a batch of events; 0 for an empty
/// batch. Typically applied to a freshly fetched batch, not the merged cache.
pub fn last_queried(events: &[Event]) -> u64 {
    events
        .iter()
        .map(|e| e.created_at.as_u64())
        .max()
        .unwrap_or(0)
}

/// `max(current, last_queried(events))` — monotonic, never regresses.
pub fn advance_watermark(current: u64, events: &[Event]) -> u64 {
    current.max(last_queried(events))
}

/// Per-query watermarks: the highest timestamp observed so far for each
/// logical query, used to bound subsequent fetches to only-new events.
#[derive(Debug, Clone, Default)]
pub struct WatermarkStore {
    inner: HashMap<QueryKey, u64>,
}

impl WatermarkStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<u64> {
        self.inner.get(key).copied()
    }

    /// Record a watermark for `key`. Writes only when `watermark` is strictly
    /// greater than the stored value, so interleaved updates from overlapping
    /// fetches cannot move a watermark backwards. Returns whether it wrote.
    pub fn record(&mut self, key: &QueryKey, watermark: u64) -> bool {
        match self.inner.get(key) {
            Some(&current) if watermark <= current => false,
            _ => {
                self.inner.insert(key.clone(), watermark);
                true
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn note(keys: &Keys, created_at: u64) -> Event {
        EventBuilder::text_note("tick")
            .custom_created_at(Timestamp::from(created_at))
            .sign_with_keys(keys)
            .unwrap()
    }

    #[test]
    fn last_queried_of_empty_batch_is_zero() {
        assert_eq!(last_queried(&[]), 0);
    }

    #[test]
    fn last_queried_returns_max_timestamp() {
        let keys = Keys::generate();
        let events = vec![note(&keys, 5), note(&keys, 9), note(&keys, 3)];
        assert_eq!(last_queried(&events), 9);
    }

    #[test]
    fn advance_never_regresses() {
        let keys = Keys::generate();
        let events = vec![note(&keys, 5)];
        assert_eq!(advance_watermark(10, &events), 10);
        assert_eq!(advance_watermark(3, &events), 5);
        assert_eq!(advance_watermark(7, &[]), 7);
    }

    #[test]
    fn store_records_only_strictly_greater() {
        let key = QueryKey::from_parts(["comments", "t"]);
        let mut store = WatermarkStore::new();
        assert_eq!(store.get(&key), None);

        assert!(store.record(&key, 100));
        assert!(!store.record(&key, 100));
        assert!(!store.record(&key, 50));
        assert_eq!(store.get(&key), Some(100));

        assert!(store.record(&key, 150));
        assert_eq!(store.get(&key), Some(150));
    }

    #[test]
    fn store_partitions_by_key() {
        let a = QueryKey::from_parts(["comments", "t1"]);
        let b = QueryKey::from_parts(["comments", "t2"]);
        let mut store = WatermarkStore::new();
        store.record(&a, 10);
        store.record(&b, 20);
        assert_eq!(store.get(&a), Some(10));
        assert_eq!(store.get(&b), Some(20));
    }
}
