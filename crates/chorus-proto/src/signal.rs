//! Connection-negotiation signal envelopes.

use serde::{Deserialize, Serialize};

use crate::ParticipantId;

/// What kind of negotiation data a signal carries.
///
/// The negotiation data itself is opaque to everything but the media
/// transport. The kind tag exists because the connection manager must
/// distinguish an offer (which may create a responder connection for an
/// unknown peer) from stray answers and candidates arriving after a
/// teardown (which are dropped).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SignalKind {
    /// Session description proposed by the initiator.
    Offer,
    /// Session description answering an offer.
    Answer,
    /// Incremental transport candidate.
    Candidate,
}

/// Opaque negotiation payload plus its kind tag.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalPayload {
    /// Kind tag, the only part the coordinator inspects.
    pub kind: SignalKind,
    /// Transport-defined negotiation bytes (SDP, candidate line, ...).
    pub data: Vec<u8>,
}

impl SignalPayload {
    /// Offer payload.
    pub fn offer(data: impl Into<Vec<u8>>) -> Self {
        Self { kind: SignalKind::Offer, data: data.into() }
    }

    /// Answer payload.
    pub fn answer(data: impl Into<Vec<u8>>) -> Self {
        Self { kind: SignalKind::Answer, data: data.into() }
    }

    /// Candidate payload.
    pub fn candidate(data: impl Into<Vec<u8>>) -> Self {
        Self { kind: SignalKind::Candidate, data: data.into() }
    }
}

/// A signal addressed from one participant to another.
///
/// Envelopes are ephemeral: the relay guarantees per-(from,to) send order
/// but nothing across pairs, and the stream replays its most recent entry
/// to new subscribers. Receivers filter on `to` and drop envelopes older
/// than [`crate::VALIDITY_WINDOW_MS`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignalEnvelope {
    /// Sending participant.
    pub from: ParticipantId,
    /// Addressee. `None` for broadcast discovery on transports that need
    /// it; mesh negotiation always addresses a single peer.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub to: Option<ParticipantId>,
    /// The negotiation payload.
    pub payload: SignalPayload,
    /// Wall-clock milliseconds at send time, for staleness filtering.
    pub timestamp_ms: u64,
}

impl SignalEnvelope {
    /// Whether this envelope is addressed to `user_id`.
    ///
    /// Broadcast envelopes (no addressee) are for everyone but the sender.
    pub fn addressed_to(&self, user_id: &str) -> bool {
        match &self.to {
            Some(to) => to == user_id,
            None => self.from != user_id,
        }
    }

    /// Whether this envelope is older than the validity window at `now_ms`.
    pub fn is_stale(&self, now_ms: u64) -> bool {
        now_ms.saturating_sub(self.timestamp_ms) > crate::VALIDITY_WINDOW_MS
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn envelope(to: Option<&str>) -> SignalEnvelope {
        SignalEnvelope {
            from: "a".into(),
            to: to.map(String::from),
            payload: SignalPayload::offer(b"sdp".to_vec()),
            timestamp_ms: 10_000,
        }
    }

    #[test]
    fn addressing() {
        assert!(envelope(Some("b")).addressed_to("b"));
        assert!(!envelope(Some("b")).addressed_to("c"));
        // Broadcast reaches everyone except the sender
        assert!(envelope(None).addressed_to("b"));
        assert!(!envelope(None).addressed_to("a"));
    }

    #[test]
    fn staleness_window() {
        let e = envelope(Some("b"));
        assert!(!e.is_stale(10_000 + crate::VALIDITY_WINDOW_MS));
        assert!(e.is_stale(10_001 + crate::VALIDITY_WINDOW_MS));
        // Clock skew: an envelope from the "future" is never stale
        assert!(!e.is_stale(0));
    }
}
