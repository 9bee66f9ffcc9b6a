//! Append-only side-channel entries: comments and welcome events.
//!
//! Entries are immutable once written. Consumers prune by the validity
//! window on receipt; nothing is deleted from storage.

use serde::{Deserialize, Serialize};

use crate::ParticipantId;

/// Body of a room comment.
///
/// Content is opaque to the coordinator: text is relayed verbatim, images
/// travel as storage references resolved by the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum CommentBody {
    /// Plain text comment.
    Text(String),
    /// Reference to an uploaded image.
    ImageRef(String),
}

/// One entry in the room's comment log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommentEntry {
    /// Authoring participant.
    pub author_id: ParticipantId,
    /// Author display name at post time.
    pub author_name: String,
    /// Comment content.
    pub body: CommentBody,
    /// Wall-clock milliseconds at post time.
    pub timestamp_ms: u64,
}

impl CommentEntry {
    /// Whether this entry is older than the validity window at `now_ms`.
    pub fn is_stale(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) > crate::VALIDITY_WINDOW_MS
    }
}

/// Join notification appended when a participant enters the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WelcomeEvent {
    /// Joining participant.
    pub user_id: ParticipantId,
    /// Display name of the joiner.
    pub display_name: String,
    /// Wall-clock milliseconds at join time.
    pub timestamp_ms: u64,
}

impl WelcomeEvent {
    /// Whether this event is older than the validity window at `now_ms`.
    pub fn is_stale(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) > crate::VALIDITY_WINDOW_MS
    }
}
