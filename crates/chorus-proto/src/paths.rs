//! Hierarchical relay path grammar.
//!
//! The relay is a plain key-value tree; these builders are the only place
//! path strings are assembled or taken apart. Layout under one room:
//!
//! ```text
//! room/{r}/config                value: RoomConfig
//! room/{r}/autoGrantMic          value: bool
//! room/{r}/participants/{u}      value: ParticipantEntry
//! room/{r}/micRequests/{u}       value: MicRequest
//! room/{r}/signals               append: SignalEnvelope
//! room/{r}/comments              append: CommentEntry
//! room/{r}/welcomeEvents         append: WelcomeEvent
//! ```

use crate::{ParticipantId, ProtocolError, RoomId};

/// Path builder and classifier for one room's relay subtree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoomPaths {
    room_id: RoomId,
}

/// What a relay path within a room's subtree refers to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PathKind {
    /// Room configuration record.
    Config,
    /// The host-toggled auto-grant flag.
    AutoGrant,
    /// A single participant's roster entry.
    Participant(ParticipantId),
    /// A single user's pending mic request.
    MicRequest(ParticipantId),
    /// The signal envelope append stream.
    Signals,
    /// The comment append stream.
    Comments,
    /// The welcome event append stream.
    WelcomeEvents,
}

impl RoomPaths {
    /// Path builder for the given room.
    pub fn new(room_id: impl Into<RoomId>) -> Self {
        Self { room_id: room_id.into() }
    }

    /// The room this builder addresses.
    pub fn room_id(&self) -> &RoomId {
        &self.room_id
    }

    /// Root of the room subtree. Removing it destroys the room.
    pub fn root(&self) -> String {
        format!("room/{}", self.room_id)
    }

    /// Room configuration record.
    pub fn config(&self) -> String {
        format!("room/{}/config", self.room_id)
    }

    /// The auto-grant flag.
    pub fn auto_grant(&self) -> String {
        format!("room/{}/autoGrantMic", self.room_id)
    }

    /// Parent of all roster entries (snapshot prefix).
    pub fn participants(&self) -> String {
        format!("room/{}/participants", self.room_id)
    }

    /// One participant's roster entry.
    pub fn participant(&self, user_id: &str) -> String {
        format!("room/{}/participants/{user_id}", self.room_id)
    }

    /// Parent of all pending mic requests (snapshot prefix).
    pub fn mic_requests(&self) -> String {
        format!("room/{}/micRequests", self.room_id)
    }

    /// One user's pending mic request.
    pub fn mic_request(&self, user_id: &str) -> String {
        format!("room/{}/micRequests/{user_id}", self.room_id)
    }

    /// Signal envelope append stream.
    pub fn signals(&self) -> String {
        format!("room/{}/signals", self.room_id)
    }

    /// Comment append stream.
    pub fn comments(&self) -> String {
        format!("room/{}/comments", self.room_id)
    }

    /// Welcome event append stream.
    pub fn welcome_events(&self) -> String {
        format!("room/{}/welcomeEvents", self.room_id)
    }

    /// Classify a path within this room's subtree.
    ///
    /// Returns `Ok(None)` for paths belonging to other rooms (they are not
    /// an error, just not ours).
    ///
    /// # Errors
    ///
    /// - `ProtocolError::MalformedPath` if the path is inside this room's
    ///   subtree but doesn't match the grammar.
    pub fn classify(&self, path: &str) -> Result<Option<PathKind>, ProtocolError> {
        let root = self.root();
        let Some(rest) = path.strip_prefix(&root) else {
            return Ok(None);
        };
        let Some(rest) = rest.strip_prefix('/') else {
            // Either the root itself or a room whose id shares our prefix.
            return Ok(None);
        };

        let kind = match rest {
            "config" => PathKind::Config,
            "autoGrantMic" => PathKind::AutoGrant,
            "signals" => PathKind::Signals,
            "comments" => PathKind::Comments,
            "welcomeEvents" => PathKind::WelcomeEvents,
            other => {
                if let Some(user) = other.strip_prefix("participants/") {
                    Self::leaf(user, path).map(PathKind::Participant)?
                } else if let Some(user) = other.strip_prefix("micRequests/") {
                    Self::leaf(user, path).map(PathKind::MicRequest)?
                } else {
                    return Err(ProtocolError::MalformedPath { path: path.to_string() });
                }
            },
        };

        Ok(Some(kind))
    }

    /// Validate that a trailing segment is a single leaf (no nesting).
    fn leaf(segment: &str, full: &str) -> Result<ParticipantId, ProtocolError> {
        if segment.is_empty() || segment.contains('/') {
            return Err(ProtocolError::MalformedPath { path: full.to_string() });
        }
        Ok(segment.to_string())
    }
}
