//! Microphone authorization policy.
//!
//! Speaker authorization is a protocol over roster entries and a pending
//! request queue: Listener -> RequestPending -> Speaker, with the host
//! granting (or auto-grant consuming) requests and revoking speakers.
//! Authorization is orthogonal to media connectivity - a listener stays
//! mesh-connected - and to the self-owned mute flag.
//!
//! All checks run locally before any relay write is issued. The host's
//! entry is always a speaker and can never be downgraded.

use std::collections::HashMap;

use chorus_proto::{MicRequest, ParticipantId};

use crate::{error::AuthorizationViolation, roster::Roster};

/// A participant's authorization state as observed from the roster plus
/// the pending request queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MicState {
    /// Not authorized to transmit; no request outstanding.
    Listener,
    /// Not authorized; a request is waiting for the host.
    RequestPending,
    /// Authorized to transmit.
    Speaker,
}

/// Host-anchored authorization checks.
#[derive(Debug, Clone)]
pub struct MicPolicy {
    host_id: ParticipantId,
}

impl MicPolicy {
    /// Policy for a room with the given host.
    pub fn new(host_id: impl Into<ParticipantId>) -> Self {
        Self { host_id: host_id.into() }
    }

    /// The fixed room host.
    pub fn host_id(&self) -> &str {
        &self.host_id
    }

    /// Whether `user_id` is the host.
    pub fn is_host(&self, user_id: &str) -> bool {
        self.host_id == user_id
    }

    /// Derive a participant's authorization state.
    ///
    /// A granted speaker with a stale queued request still counts as
    /// Speaker; the queue entry is a leftover the grant path removes.
    pub fn state_of(
        &self,
        roster: &Roster,
        pending: &HashMap<ParticipantId, MicRequest>,
        user_id: &str,
    ) -> MicState {
        if roster.get(user_id).is_some_and(|e| e.is_speaker) {
            MicState::Speaker
        } else if pending.contains_key(user_id) {
            MicState::RequestPending
        } else {
            MicState::Listener
        }
    }

    /// Check that `actor` may grant a mic request.
    pub fn authorize_grant(&self, actor: &str) -> Result<(), AuthorizationViolation> {
        if self.is_host(actor) {
            Ok(())
        } else {
            Err(AuthorizationViolation::HostOnly { operation: "grant the microphone" })
        }
    }

    /// Check that `actor` may revoke `target`'s speaker status.
    pub fn authorize_revoke(
        &self,
        actor: &str,
        target: &str,
    ) -> Result<(), AuthorizationViolation> {
        if !self.is_host(actor) {
            return Err(AuthorizationViolation::HostOnly { operation: "revoke the microphone" });
        }
        if self.is_host(target) {
            return Err(AuthorizationViolation::HostImmutable);
        }
        Ok(())
    }

    /// Check that `actor` may step down to listener voluntarily.
    pub fn authorize_step_down(&self, actor: &str) -> Result<(), AuthorizationViolation> {
        if self.is_host(actor) {
            Err(AuthorizationViolation::HostImmutable)
        } else {
            Ok(())
        }
    }

    /// Check that `actor` may mutate room settings (topic, auto-grant,
    /// room destruction).
    pub fn authorize_room_mutation(
        &self,
        actor: &str,
        operation: &'static str,
    ) -> Result<(), AuthorizationViolation> {
        if self.is_host(actor) {
            Ok(())
        } else {
            Err(AuthorizationViolation::HostOnly { operation })
        }
    }
}
