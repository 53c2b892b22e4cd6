use std::collections::HashMap;

use nostr_sdk::prelude::*;

/// Merge two batches of events by id, newest-first.
///
/// The id→event map is seeded from `old` in input order, then every entry of
/// `new` is inserted over it. For an id present in both batches the `new`
/// occurrence wins unconditionally — even when its `created_at` is older.
/// Conflict resolution trusts recency of arrival, not recency of content,
/// which is what makes repeated application of the same batch idempotent.
///
/// The result contains each id at most once, sorted by `created_at`
/// descending. Relative order of equal timestamps is unspecified.
pub fn merge_events(old: &[Event], new: &[Event]) -> Vec<Event> {
    let mut by_id: HashMap<EventId, &Event> = HashMap::with_capacity(old.len() + new.len());
    for event in old {
        by_id.insert(event.id, event);
    }
    for event in new {
        by_id.insert(event.id, event);
    }

    let mut merged: Vec<Event> = by_id.into_values().cloned().collect();
    merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    merged
}
