use std::collections::HashMap;

use nostr_sdk::prelude::*;

use crate::key::QueryKey;
use crate::merge::merge_events;
use crate::query::QueryOptions;
use crate::watermark::{WatermarkStore, advance_watermark};

/// In-memory event cache: one merged, deduplicated, newest-first event list
/// per query key.
#[derive(Debug, Clone, Default)]
pub struct EventCache {
    entries: HashMap<QueryKey, Vec<Event>>,
}

impl EventCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &QueryKey) -> Option<&[Event]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Merge a freshly fetched batch into the entry for `key`.
    ///
    /// When `allowed_kinds` is set, events of other kinds are dropped before
    /// merging. Returns the entry length after the merge.
    pub fn merge_into(
        &mut self,
        key: &QueryKey,
        new_events: &[Event],
        allowed_kinds: Option<&[Kind]>,
    ) -> usize {
        let filtered: Vec<Event>;
        let incoming = match allowed_kinds {
            Some(kinds) => {
                filtered = new_events
                    .iter()
                    .filter(|e| kinds.contains(&e.kind))
                    .cloned()
                    .collect();
                filtered.as_slice()
            }
            None => new_events,
        };

        let entry = self.entries.entry(key.clone()).or_default();
        *entry = merge_events(entry, incoming);
        entry.len()
    }
}

/// Shared state for incremental sync: the event cache plus the per-key
/// watermark store, as two separate typed maps addressed by the same key.
///
/// The API is two-phase so no lock is held across the fetch suspension point:
/// [`begin`](Self::begin) derives the bounded filter before the network call,
/// [`complete`](Self::complete) advances the watermark and merges after it.
#[derive(Debug, Clone, Default)]
pub struct SyncState {
    events: EventCache,
    watermarks: WatermarkStore,
}

impl SyncState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Derive the filter to send for this invocation.
    ///
    /// Raises `since` to `max(filter.since, watermark)`, where the watermark
    /// falls back to `options.initial_last_queried` when nothing has been
    /// recorded for `key` yet. The input filter is never mutated; when there
    /// is nothing to raise (or `update_filter` is off) an unchanged copy is
    /// returned.
    pub fn begin(&self, key: &QueryKey, filter: &Filter, options: &QueryOptions) -> Filter {
        if !options.update_filter {
            return filter.clone();
        }
        let watermark = self.watermark_or_seed(key, options);
        if watermark == 0 {
            return filter.clone();
        }
        let since = match filter.since {
            Some(existing) => existing.max(Timestamp::from(watermark)),
            None => Timestamp::from(watermark),
        };
        filter.clone().since(since)
    }

    /// Fold a fetched batch into the state: advance the watermark (persisted
    /// only when it actually moved) and merge the events into the cache entry.
    pub fn complete(&mut self, key: &QueryKey, new_events: &[Event], options: &QueryOptions) {
        let current = self.watermark_or_seed(key, options);
        let advanced = advance_watermark(current, new_events);
        if advanced > current {
            self.watermarks.record(key, advanced);
        }
        self.events
            .merge_into(key, new_events, options.filter_kinds.as_deref());
    }

    pub fn events(&self, key: &QueryKey) -> Option<&[Event]> {
        self.events.get(key)
    }

    pub fn watermark(&self, key: &QueryKey) -> Option<u64> {
        self.watermarks.get(key)
    }

    fn watermark_or_seed(&self, key: &QueryKey, options: &QueryOptions) -> u64 {
        self.watermarks
            .get(key)
            .unwrap_or(options.initial_last_queried)
    }
}
