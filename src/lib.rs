//! Incremental Nostr event sync and cache for the Reverb music client.
//!
//! The core is a small incremental-sync layer between a relay query and a
//! per-key event cache: [`merge_events`] deduplicates batches by event id
//! (newest-first, arrival wins on conflict), the watermark tracker bounds
//! each fetch to only-new events, and [`CachedFetch`] / [`CatalogSync`] wire
//! the two around an async fetch.

pub mod cache;
pub mod config;
pub mod earning;
pub mod error;
pub mod filters;
pub mod key;
pub mod merge;
pub mod query;
pub mod service;
pub mod watermark;

// Core cache types
pub use cache::{EventCache, SyncState};
pub use error::{Error, Result};
pub use key::{KeyPart, QueryKey};
pub use merge::merge_events;
pub use query::{CachedFetch, QueryOptions};
pub use watermark::{WatermarkStore, advance_watermark, last_queried};

// Catalog filters and payloads
pub use filters::{
    COMMENT_KIND, COMMENT_TAG, Profile, TrackComment, ZapReceipt, build_comment_event,
    build_comment_filter, build_profile_filter, build_zap_receipt_filter, parse_comment_event,
    parse_profile_event, parse_zap_receipt_event,
};

// Sync service
pub use config::{DEFAULT_RELAYS, SyncConfig};
pub use service::{CatalogSync, SyncEvent, comment_key, zap_key};

// Listening rewards
pub use earning::{EarningController, EarningSession, PromoDetails, RewardEvent, RewardTotals};
