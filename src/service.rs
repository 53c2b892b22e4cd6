use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use nostr_sdk::prelude::*;
use tokio::sync::broadcast;

use crate::cache::SyncState;
use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::filters::{
    COMMENT_TAG, Profile, TrackComment, ZapReceipt, build_comment_event, build_comment_filter,
    build_profile_filter, build_zap_receipt_filter, parse_comment_event, parse_profile_event,
    parse_zap_receipt_event,
};
use crate::key::QueryKey;
use crate::query::QueryOptions;

/// Cache key for a track's comments.
pub fn comment_key(content_id: &str) -> QueryKey {
    QueryKey::from_parts(["comments", content_id])
}

/// Cache key for zap receipts referencing a track event.
pub fn zap_key(target: &EventId) -> QueryKey {
    QueryKey::from_parts(["zaps", target.to_hex().as_str()])
}

/// Events emitted by the `CatalogSync` subscription loop.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// A new comment on a track was received.
    CommentReceived(TrackComment),
    /// A new zap receipt was received.
    ZapReceived(ZapReceipt),
}

/// Incremental catalog sync over Nostr relays.
///
/// Owns a relay client and the shared [`SyncState`]. One-shot fetches are
/// watermark-bounded: each call only asks relays for events newer than what
/// this key has already seen, merges the fresh batch into the cache, and
/// returns the full merged list. The optional subscription loop pushes
/// real-time [`SyncEvent`] notifications via `tokio::broadcast` and keeps the
/// same cache entries current.
pub struct CatalogSync {
    client: Client,
    keys: Keys,
    config: SyncConfig,
    state: Arc<Mutex<SyncState>>,
    tx: broadcast::Sender<SyncEvent>,
}

impl CatalogSync {
    /// Create a new `CatalogSync`.
    ///
    /// Returns the service and a broadcast receiver for sync events.
    pub fn new(keys: Keys, config: SyncConfig) -> (Self, broadcast::Receiver<SyncEvent>) {
        let (tx, rx) = broadcast::channel(256);
        let client = Client::new(keys.clone());
        (
            Self {
                client,
                keys,
                config,
                state: Arc::new(Mutex::new(SyncState::new())),
                tx,
            },
            rx,
        )
    }

    /// Get an additional broadcast receiver for sync events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.tx.subscribe()
    }

    /// Connect to configured relays and start the background subscription
    /// loop.
    ///
    /// Returns a `JoinHandle` the caller can abort to stop the loop.
    pub async fn start(&self) -> Result<tokio::task::JoinHandle<()>> {
        self.ensure_connected().await?;

        let client = self.client.clone();
        let state = self.state.clone();
        let tx = self.tx.clone();

        Ok(tokio::spawn(async move {
            run_subscription_loop(client, state, tx).await;
        }))
    }

    /// One-shot incremental fetch of comments for a track.
    ///
    /// Returns the merged, newest-first comment list for the track, not just
    /// the freshly fetched batch.
    pub async fn fetch_comments(&self, content_id: &str) -> Result<Vec<TrackComment>> {
        self.ensure_connected().await?;

        let key = comment_key(content_id);
        let filter = build_comment_filter(content_id);
        let options = QueryOptions::default();

        let bounded = self.lock_state()?.begin(&key, &filter, &options);
        let events = self
            .client
            .fetch_events(vec![bounded], self.config.fetch_timeout)
            .await
            .map_err(|e| Error::Fetch(format!("failed to fetch comment events: {e}")))?
            .into_iter()
            .collect::<Vec<_>>();

        let merged = {
            let mut state = self.lock_state()?;
            state.complete(&key, &events, &options);
            state.events(&key).map(<[Event]>::to_vec).unwrap_or_default()
        };

        let mut comments = Vec::new();
        for event in &merged {
            match parse_comment_event(event) {
                Ok(comment) => comments.push(comment),
                Err(e) => {
                    log::warn!("skipping unparseable comment event {}: {e}", event.id);
                }
            }
        }
        Ok(comments)
    }

    /// One-shot incremental fetch of zap receipts for a track event.
    pub async fn fetch_zaps(&self, target: &EventId) -> Result<Vec<ZapReceipt>> {
        self.ensure_connected().await?;

        let key = zap_key(target);
        let filter = build_zap_receipt_filter(target);
        let options = QueryOptions {
            filter_kinds: Some(vec![Kind::ZapReceipt]),
            ..Default::default()
        };

        let bounded = self.lock_state()?.begin(&key, &filter, &options);
        let events = self
            .client
            .fetch_events(vec![bounded], self.config.fetch_timeout)
            .await
            .map_err(|e| Error::Fetch(format!("failed to fetch zap events: {e}")))?
            .into_iter()
            .collect::<Vec<_>>();

        let merged = {
            let mut state = self.lock_state()?;
            state.complete(&key, &events, &options);
            state.events(&key).map(<[Event]>::to_vec).unwrap_or_default()
        };

        let mut zaps = Vec::new();
        for event in &merged {
            match parse_zap_receipt_event(event) {
                Ok(zap) => zaps.push(zap),
                Err(e) => {
                    log::warn!("skipping unparseable zap receipt {}: {e}", event.id);
                }
            }
        }
        Ok(zaps)
    }

    /// Fetch an author's profile metadata.
    ///
    /// Profiles are replaceable events, so a watermark bound would suppress
    /// refetches of the current version; this path bypasses the cache.
    pub async fn fetch_profile(&self, author: &PublicKey) -> Result<Option<Profile>> {
        self.ensure_connected().await?;

        let filter = build_profile_filter(author);
        let events = self
            .client
            .fetch_events(vec![filter], self.config.fetch_timeout)
            .await
            .map_err(|e| Error::Fetch(format!("failed to fetch profile: {e}")))?;

        match events.iter().next() {
            Some(event) => Ok(Some(parse_profile_event(event)?)),
            None => Ok(None),
        }
    }

    /// Publish a comment on a track.
    pub async fn post_comment(&self, content_id: &str, text: &str) -> Result<EventId> {
        self.ensure_connected().await?;

        let event = build_comment_event(&self.keys, content_id, text)?;
        let output = self
            .client
            .send_event(event)
            .await
            .map_err(|e| Error::Fetch(format!("failed to send comment event: {e}")))?;
        Ok(*output.id())
    }

    /// Cached comments for a track, without network activity.
    pub fn comments(&self, content_id: &str) -> Result<Vec<TrackComment>> {
        let state = self.lock_state()?;
        let events = state.events(&comment_key(content_id)).unwrap_or_default();
        Ok(events
            .iter()
            .filter_map(|e| parse_comment_event(e).ok())
            .collect())
    }

    /// Cached zap receipts for a track event, without network activity.
    pub fn zaps(&self, target: &EventId) -> Result<Vec<ZapReceipt>> {
        let state = self.lock_state()?;
        let events = state.events(&zap_key(target)).unwrap_or_default();
        Ok(events
            .iter()
            .filter_map(|e| parse_zap_receipt_event(e).ok())
            .collect())
    }

    /// The recorded watermark for a query key, if any.
    pub fn watermark(&self, key: &QueryKey) -> Result<Option<u64>> {
        Ok(self.lock_state()?.watermark(key))
    }

    /// Get a reference to the underlying Nostr client.
    pub fn client(&self) -> &Client {
        &self.client
    }

    // --- internal helpers ---

    async fn ensure_connected(&self) -> Result<()> {
        if self.client.relays().await.is_empty() {
            for url in &self.config.relays {
                self.client
                    .add_relay(url.as_str())
                    .await
                    .map_err(|e| Error::Fetch(format!("failed to add relay {url}: {e}")))?;
            }
            self.client
                .connect_with_timeout(Duration::from_secs(5))
                .await;
        }
        Ok(())
    }

    fn lock_state(&self) -> Result<MutexGuard<'_, SyncState>> {
        self.state.lock().map_err(|_| Error::StatePoisoned)
    }
}

/// Background subscription loop that listens for comment and zap events,
/// merges them into the shared cache, and broadcasts parsed payloads.
async fn run_subscription_loop(
    client: Client,
    state: Arc<Mutex<SyncState>>,
    tx: broadcast::Sender<SyncEvent>,
) {
    // Set up the notification receiver BEFORE subscribing so we don't miss
    // events
    let mut notifications = client.notifications();

    let comment_filter = Filter::new().kind(Kind::TextNote).hashtag(COMMENT_TAG);
    let zap_filter = Filter::new().kind(Kind::ZapReceipt);

    if let Err(e) = client.subscribe(vec![comment_filter, zap_filter], None).await {
        log::error!("failed to subscribe: {e}");
        return;
    }

    while let Ok(notification) = notifications.recv().await {
        if let RelayPoolNotification::Event { event, .. } = notification {
            let event = *event;
            if event.kind == Kind::ZapReceipt {
                match parse_zap_receipt_event(&event) {
                    Ok(zap) => {
                        if let Ok(target) = EventId::from_hex(&zap.target_event_id) {
                            merge_live_event(&state, &zap_key(&target), &event);
                        }
                        let _ = tx.send(SyncEvent::ZapReceived(zap));
                    }
                    Err(e) => {
                        log::warn!("skipping unparseable zap receipt {}: {e}", event.id);
                    }
                }
            } else {
                match parse_comment_event(&event) {
                    Ok(comment) => {
                        merge_live_event(&state, &comment_key(&comment.content_id), &event);
                        let _ = tx.send(SyncEvent::CommentReceived(comment));
                    }
                    Err(e) => {
                        log::warn!("skipping unparseable comment event {}: {e}", event.id);
                    }
                }
            }
        }
    }
}

fn merge_live_event(state: &Arc<Mutex<SyncState>>, key: &QueryKey, event: &Event) {
    if let Ok(mut state) = state.lock() {
        state.complete(key, std::slice::from_ref(event), &QueryOptions::default());
    }
}
