//! Roster and room records.

use serde::{Deserialize, Serialize};

use crate::ParticipantId;

/// Room configuration, written once by the host at creation.
///
/// `topic` and the auto-grant flag are host-mutable afterwards; `host_id`
/// is fixed for the life of the room.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoomConfig {
    /// The host's participant id. Exactly one host per room.
    pub host_id: ParticipantId,
    /// Room topic, host-mutable.
    pub topic: String,
    /// Whether mic requests are granted without host action.
    pub auto_grant_mic: bool,
}

/// One participant's roster entry.
///
/// Field ownership is single-writer: `muted` and `is_speaking` are written
/// only by the participant itself, `is_speaker` only by the host. The
/// entry as a whole is created and removed by its owner on join/leave.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantEntry {
    /// Display name shown to other participants.
    pub display_name: String,
    /// Opaque avatar reference. `None` if the user has no avatar.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar_ref: Option<String>,
    /// Whether this participant is authorized to transmit audio.
    pub is_speaker: bool,
    /// Self-owned mute flag, orthogonal to speaker authorization.
    pub muted: bool,
    /// Live VAD output, written only by the owning participant.
    pub is_speaking: bool,
}

impl ParticipantEntry {
    /// Entry for a freshly joined listener.
    pub fn listener(display_name: impl Into<String>, avatar_ref: Option<String>) -> Self {
        Self {
            display_name: display_name.into(),
            avatar_ref,
            is_speaker: false,
            muted: false,
            is_speaking: false,
        }
    }

    /// Entry for a freshly joined speaker (the host).
    pub fn speaker(display_name: impl Into<String>, avatar_ref: Option<String>) -> Self {
        Self { is_speaker: true, ..Self::listener(display_name, avatar_ref) }
    }
}

/// A pending microphone request, keyed by `user_id` on the relay.
///
/// Re-requesting overwrites, so there is at most one outstanding request
/// per user. Destroyed when the host grants or denies, or when auto-grant
/// consumes it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MicRequest {
    /// Requesting user.
    pub user_id: ParticipantId,
    /// Display name at request time, for host UI.
    pub user_name: String,
    /// Wall-clock milliseconds when the request was written.
    pub timestamp_ms: u64,
}
