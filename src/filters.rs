use nostr_sdk::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Event kind used for track comments (plain text notes).
pub const COMMENT_KIND: Kind = Kind::TextNote;

/// Hashtag marking a note as a track comment from this client.
pub const COMMENT_TAG: &str = "reverb-comment";

/// A comment on a track, parsed from a Nostr event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackComment {
    pub id: String,
    pub content_id: String,
    pub author_pubkey: String,
    pub text: String,
    pub created_at: u64,
}

/// A zap receipt for a track event, parsed from a Nostr event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ZapReceipt {
    pub id: String,
    pub sender_pubkey: String,
    pub target_event_id: String,
    pub bolt11: Option<String>,
    pub amount_msat: Option<u64>,
    pub created_at: u64,
}

/// Profile metadata (kind 0 content), as published by the author.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Profile {
    #[serde(skip_deserializing)]
    pub pubkey: String,
    pub name: Option<String>,
    pub about: Option<String>,
    pub picture: Option<String>,
    /// Lightning address for zaps.
    pub lud16: Option<String>,
}

/// Build a Nostr event for a comment on a track.
pub fn build_comment_event(keys: &Keys, content_id: &str, text: &str) -> Result<Event> {
    let tags = vec![Tag::hashtag(COMMENT_TAG), Tag::hashtag(content_id)];
    EventBuilder::text_note(text)
        .tags(tags)
        .sign_with_keys(keys)
        .map_err(|e| Error::Event(format!("failed to build comment event: {e}")))
}

/// Build a filter for fetching comments on a specific track.
pub fn build_comment_filter(content_id: &str) -> Filter {
    Filter::new()
        .kind(COMMENT_KIND)
        .hashtag(COMMENT_TAG)
        .hashtag(content_id)
}

/// Build a filter for fetching zap receipts that reference a track event.
pub fn build_zap_receipt_filter(target: &EventId) -> Filter {
    Filter::new().kind(Kind::ZapReceipt).event(*target)
}

/// Build a filter for fetching an author's profile metadata.
pub fn build_profile_filter(author: &PublicKey) -> Filter {
    Filter::new().kind(Kind::Metadata).author(*author).limit(1)
}

fn hashtags(event: &Event) -> Vec<String> {
    event
        .tags
        .iter()
        .filter_map(|t| {
            let tag_vec = t.as_slice();
            if tag_vec.len() >= 2 && tag_vec[0] == "t" {
                Some(tag_vec[1].to_string())
            } else {
                None
            }
        })
        .collect()
}

fn tag_value(event: &Event, name: &str) -> Option<String> {
    event.tags.iter().find_map(|t| {
        let tag_vec = t.as_slice();
        if tag_vec.len() >= 2 && tag_vec[0] == name {
            Some(tag_vec[1].to_string())
        } else {
            None
        }
    })
}

/// Parse a Nostr event into a [`TrackComment`].
///
/// The content id is the first hashtag that is not the comment marker.
pub fn parse_comment_event(event: &Event) -> Result<TrackComment> {
    let content_id = hashtags(event)
        .into_iter()
        .find(|t| t != COMMENT_TAG)
        .ok_or_else(|| Error::Parse("comment event has no content id hashtag".to_string()))?;

    Ok(TrackComment {
        id: event.id.to_hex(),
        content_id,
        author_pubkey: event.pubkey.to_hex(),
        text: event.content.clone(),
        created_at: event.created_at.as_u64(),
    })
}

/// Parse a Nostr event into a [`ZapReceipt`].
///
/// The sender is taken from the uppercase `P` tag when present (the zap
/// request author), falling back to the receipt's own pubkey (the zapper
/// service key).
pub fn parse_zap_receipt_event(event: &Event) -> Result<ZapReceipt> {
    let target_event_id = tag_value(event, "e")
        .ok_or_else(|| Error::Parse("zap receipt has no target event tag".to_string()))?;

    let sender_pubkey = tag_value(event, "P").unwrap_or_else(|| event.pubkey.to_hex());
    let amount_msat = tag_value(event, "amount").and_then(|v| v.parse::<u64>().ok());

    Ok(ZapReceipt {
        id: event.id.to_hex(),
        sender_pubkey,
        target_event_id,
        bolt11: tag_value(event, "bolt11"),
        amount_msat,
        created_at: event.created_at.as_u64(),
    })
}

/// Parse a kind-0 event's content into a [`Profile`].
pub fn parse_profile_event(event: &Event) -> Result<Profile> {
    let mut profile: Profile = serde_json::from_str(&event.content)
        .map_err(|e| Error::Parse(format!("failed to parse profile metadata: {e}")))?;
    profile.pubkey = event.pubkey.to_hex();
    Ok(profile)
}
