use std::future::Future;

use nostr_sdk::prelude::*;

use crate::cache::SyncState;
use crate::error::{Error, Result};
use crate::key::QueryKey;

/// Per-query behavior of [`CachedFetch`].
#[derive(Debug, Clone)]
pub struct QueryOptions {
    /// When false the wrapper is a pure passthrough: no filter rewriting,
    /// no watermark reads or writes, no merge.
    pub use_event_cache: bool,
    /// When false the merge still happens but `since` is not rewritten.
    pub update_filter: bool,
    /// Seed watermark, used only while no watermark has been recorded for
    /// the key.
    pub initial_last_queried: u64,
    /// Allow-list of event kinds that participate in cache merging. The
    /// watermark still advances over the full fetched batch.
    pub filter_kinds: Option<Vec<Kind>>,
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            use_event_cache: true,
            update_filter: true,
            initial_last_queried: 0,
            filter_kinds: None,
        }
    }
}

/// Wraps a caller-supplied fetch so every invocation transparently bounds the
/// filter to the key's watermark, merges the fetched batch into the cached
/// entry, and advances the watermark.
///
/// The fetch is any `FnMut(Filter) -> Future<Output = Result<Vec<Event>>>`;
/// in production that is a closure over a relay client, in tests a canned
/// responder. Fetch errors surface unchanged and leave both the watermark and
/// the cache untouched.
pub struct CachedFetch<F> {
    options: QueryOptions,
    state: SyncState,
    fetch: Option<F>,
}

impl<F, Fut> CachedFetch<F>
where
    F: FnMut(Filter) -> Fut,
    Fut: Future<Output = Result<Vec<Event>>>,
{
    /// Create a wrapper with no fetch function. Executing a query on it
    /// fails fast with [`Error::MissingFetch`].
    pub fn new(options: QueryOptions) -> Self {
        Self {
            options,
            state: SyncState::new(),
            fetch: None,
        }
    }

    pub fn with_fetch(options: QueryOptions, fetch: F) -> Self {
        Self {
            options,
            state: SyncState::new(),
            fetch: Some(fetch),
        }
    }

    /// Run one fetch for `key`.
    ///
    /// Returns the freshly fetched batch (not the merged entry); the merged,
    /// newest-first entry is available via [`cached`](Self::cached).
    pub async fn execute(&mut self, key: &QueryKey, filter: &Filter) -> Result<Vec<Event>> {
        let fetch = self.fetch.as_mut().ok_or(Error::MissingFetch)?;

        if !self.options.use_event_cache {
            return fetch(filter.clone()).await;
        }

        let bounded = self.state.begin(key, filter, &self.options);
        let new_events = fetch(bounded).await?;
        self.state.complete(key, &new_events, &self.options);
        Ok(new_events)
    }

    /// The merged cache entry for `key`, if any fetch has populated it.
    pub fn cached(&self, key: &QueryKey) -> Option<&[Event]> {
        self.state.events(key)
    }

    /// The recorded watermark for `key`, if any.
    pub fn watermark(&self, key: &QueryKey) -> Option<u64> {
        self.state.watermark(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    fn note(keys: &Keys, text: &str, created_at: u64) -> Event {
        EventBuilder::text_note(text)
            .custom_created_at(Timestamp::from(created_at))
            .sign_with_keys(keys)
            .unwrap()
    }

    fn key() -> QueryKey {
        QueryKey::from_parts(["comments", "track-1"])
    }

    /// Fetch that records every filter it sees and returns canned batches in
    /// order.
    fn canned(
        batches: Vec<Vec<Event>>,
    ) -> (
        impl FnMut(Filter) -> std::future::Ready<Result<Vec<Event>>>,
        Arc<Mutex<Vec<Filter>>>,
    ) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_inner = seen.clone();
        let mut remaining = batches.into_iter();
        let fetch = move |filter: Filter| {
            seen_inner.lock().unwrap().push(filter);
            std::future::ready(Ok(remaining.next().unwrap_or_default()))
        };
        (fetch, seen)
    }

    #[tokio::test]
    async fn missing_fetch_fails_fast() {
        let mut cached: CachedFetch<fn(Filter) -> std::future::Ready<Result<Vec<Event>>>> =
            CachedFetch::new(QueryOptions::default());
        let err = cached
            .execute(&key(), &Filter::new().kind(Kind::TextNote))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::MissingFetch));
    }

    #[tokio::test]
    async fn first_fetch_unbounded_then_watermark_bounded() {
        let keys = Keys::generate();
        let first = vec![note(&keys, "a", 100), note(&keys, "b", 150)];
        let (fetch, seen) = canned(vec![first, vec![]]);
        let mut cached = CachedFetch::with_fetch(QueryOptions::default(), fetch);
        let filter = Filter::new().kind(Kind::TextNote);

        let batch = cached.execute(&key(), &filter).await.unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(cached.watermark(&key()), Some(150));

        cached.execute(&key(), &filter).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].since, None);
        assert_eq!(seen[1].since, Some(Timestamp::from(150)));
    }

    #[tokio::test]
    async fn seed_watermark_bounds_the_first_fetch() {
        let keys = Keys::generate();
        let (fetch, seen) = canned(vec![vec![note(&keys, "a", 150)], vec![]]);
        let options = QueryOptions {
            initial_last_queried: 100,
            ..Default::default()
        };
        let mut cached = CachedFetch::with_fetch(options, fetch);
        let filter = Filter::new().kind(Kind::TextNote);

        cached.execute(&key(), &filter).await.unwrap();
        cached.execute(&key(), &filter).await.unwrap();

        let seen = seen.lock().unwrap();
        assert_eq!(seen[0].since, Some(Timestamp::from(100)));
        assert_eq!(seen[1].since, Some(Timestamp::from(150)));
    }

    #[tokio::test]
    async fn cache_disabled_is_bit_identical_passthrough() {
        let keys = Keys::generate();
        let (fetch, seen) = canned(vec![vec![note(&keys, "a", 99)]]);
        let options = QueryOptions {
            use_event_cache: false,
            initial_last_queried: 42,
            ..Default::default()
        };
        let mut cached = CachedFetch::with_fetch(options, fetch);
        let filter = Filter::new().kind(Kind::TextNote).since(Timestamp::from(7));

        let batch = cached.execute(&key(), &filter).await.unwrap();
        assert_eq!(batch.len(), 1);

        assert_eq!(seen.lock().unwrap()[0], filter);
        assert_eq!(cached.watermark(&key()), None);
        assert!(cached.cached(&key()).is_none());
    }

    #[tokio::test]
    async fn fetch_error_propagates_without_watermark_update() {
        let fetch =
            |_filter: Filter| std::future::ready(Err(Error::Fetch("relay unreachable".into())));
        let mut cached = CachedFetch::with_fetch(QueryOptions::default(), fetch);

        let err = cached
            .execute(&key(), &Filter::new().kind(Kind::TextNote))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Fetch(_)));
        assert_eq!(cached.watermark(&key()), None);
        assert!(cached.cached(&key()).is_none());
    }

    #[tokio::test]
    async fn successive_batches_accumulate_in_cache() {
        let keys = Keys::generate();
        let (fetch, _) = canned(vec![
            vec![note(&keys, "a", 10)],
            vec![note(&keys, "b", 20)],
        ]);
        let mut cached = CachedFetch::with_fetch(QueryOptions::default(), fetch);
        let filter = Filter::new().kind(Kind::TextNote);

        cached.execute(&key(), &filter).await.unwrap();
        let second = cached.execute(&key(), &filter).await.unwrap();

        // Each call returns only the fresh batch; the merged entry has both.
        assert_eq!(second.len(), 1);
        let entry = cached.cached(&key()).unwrap();
        assert_eq!(entry.len(), 2);
        assert_eq!(entry[0].created_at.as_u64(), 20);
    }

    #[tokio::test]
    async fn keys_are_independent() {
        let keys = Keys::generate();
        let (fetch, _) = canned(vec![
            vec![note(&keys, "a", 10)],
            vec![note(&keys, "b", 20)],
        ]);
        let mut cached = CachedFetch::with_fetch(QueryOptions::default(), fetch);
        let filter = Filter::new().kind(Kind::TextNote);
        let other = QueryKey::from_parts(["comments", "track-2"]);

        cached.execute(&key(), &filter).await.unwrap();
        cached.execute(&other, &filter).await.unwrap();

        assert_eq!(cached.watermark(&key()), Some(10));
        assert_eq!(cached.watermark(&other), Some(20));
        assert_eq!(cached.cached(&key()).unwrap().len(), 1);
        assert_eq!(cached.cached(&other).unwrap().len(), 1);
    }
}
