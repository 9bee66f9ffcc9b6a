//! Session error taxonomy.
//!
//! Four failure classes with distinct handling:
//!
//! - [`DeviceError`]: capture acquisition failed. Fatal to `join()`,
//!   surfaced to the caller, never retried automatically.
//! - `Signaling`: malformed or unroutable relay data. Logged, the
//!   offending value dropped, the event loop continues.
//! - `Connection`: transport failure on one peer. That connection is torn
//!   down; other peers are unaffected. No automatic reconnect.
//! - `Authorization`: host-only action by a non-host, or a downgrade
//!   aimed at the host. Rejected locally before any relay write.

use chorus_core::AuthorizationViolation;
use chorus_proto::{ParticipantId, ProtocolError};
use thiserror::Error;

/// Local audio capture could not be acquired.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("audio capture unavailable: {reason}")]
pub struct DeviceError {
    /// Platform error text (permission denied, no device, ...).
    pub reason: String,
}

impl DeviceError {
    /// Device error with the given reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self { reason: reason.into() }
    }
}

/// Errors surfaced by the session coordinator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Capture acquisition failed; `join()` aborted with no partial state.
    #[error(transparent)]
    Device(#[from] DeviceError),

    /// Malformed or unroutable signaling data.
    #[error("signaling fault: {reason}")]
    Signaling {
        /// What was wrong with the data.
        reason: String,
    },

    /// Transport failure on a single peer connection.
    #[error("peer transport failed for {remote_id}: {reason}")]
    Connection {
        /// The affected remote participant.
        remote_id: ParticipantId,
        /// Transport error text.
        reason: String,
    },

    /// Host-only action rejected locally.
    #[error(transparent)]
    Authorization(#[from] AuthorizationViolation),

    /// `join()` called while already joined.
    #[error("already joined")]
    AlreadyJoined,

    /// A room command issued before joining (or after leaving).
    #[error("not joined to the room")]
    NotJoined,

    /// An operation referenced a participant not present in the roster.
    #[error("unknown participant: {user_id}")]
    UnknownParticipant {
        /// The missing participant.
        user_id: ParticipantId,
    },
}

impl From<ProtocolError> for SessionError {
    fn from(err: ProtocolError) -> Self {
        Self::Signaling { reason: err.to_string() }
    }
}
