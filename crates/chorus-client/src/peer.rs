//! Per-peer connection state machine.
//!
//! One record per remote participant, owned exclusively by the
//! [`crate::PeerConnectionManager`] and referenced by id everywhere else.
//! Negotiation callbacks fire asynchronously at arbitrary times, so every
//! transition is written to tolerate duplicates: repeated events reduce
//! to idempotent no-ops rather than undefined behavior.
//!
//! # State Machine
//!
//! ```text
//! ┌──────┐ open  ┌─────────────┐ first track ┌───────────┐
//! │ Idle │──────>│ Negotiating │────────────>│ Connected │
//! └──────┘       └─────────────┘             └───────────┘
//!     │                 │                          │
//!     └────────── error / teardown ────────────────┘
//!                        ↓
//!                   ┌────────┐
//!                   │ Closed │
//!                   └────────┘
//! ```

use chorus_proto::ParticipantId;

/// Which side of the pairwise negotiation we are.
///
/// The joining participant is always the initiator toward every
/// participant already present; existing participants respond. This
/// join-order convention is what prevents glare.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerRole {
    /// We propose the session description.
    Initiator,
    /// We answer the remote proposal.
    Responder,
}

/// Connection lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PeerState {
    /// Created, transport not yet negotiating.
    Idle,
    /// Negotiation payloads in flight.
    Negotiating,
    /// Remote audio received at least once.
    Connected,
    /// Torn down; the record is about to be dropped.
    Closed,
}

/// Local record of one pairwise media connection.
#[derive(Debug, Clone)]
pub struct PeerConnection {
    remote_id: ParticipantId,
    role: PeerRole,
    state: PeerState,
}

impl PeerConnection {
    /// New idle connection record.
    pub fn new(remote_id: ParticipantId, role: PeerRole) -> Self {
        Self { remote_id, role, state: PeerState::Idle }
    }

    /// The remote participant this connection reaches.
    pub fn remote_id(&self) -> &str {
        &self.remote_id
    }

    /// Our negotiation role.
    pub fn role(&self) -> PeerRole {
        self.role
    }

    /// Current lifecycle state.
    pub fn state(&self) -> PeerState {
        self.state
    }

    /// Mark negotiation as underway. Idempotent; a connection that is
    /// already negotiating or connected stays put.
    pub fn begin_negotiation(&mut self) {
        if self.state == PeerState::Idle {
            self.state = PeerState::Negotiating;
        }
    }

    /// Record receipt of the remote media track.
    ///
    /// Returns `true` on the Negotiating/Idle -> Connected transition,
    /// `false` for duplicate track events.
    pub fn track_received(&mut self) -> bool {
        match self.state {
            PeerState::Idle | PeerState::Negotiating => {
                self.state = PeerState::Connected;
                true
            },
            PeerState::Connected | PeerState::Closed => false,
        }
    }

    /// Move to Closed. Idempotent.
    pub fn close(&mut self) {
        self.state = PeerState::Closed;
    }
}
