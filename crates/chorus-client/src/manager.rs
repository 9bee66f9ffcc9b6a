//! Peer connection manager.
//!
//! Owns the set of per-remote-participant connection records: exactly one
//! active connection per other participant present in the room, keyed by
//! remote id, with single-owner lifetime. Output sinks are owned here too
//! and torn down exactly once.
//!
//! No retry is attempted for failed connections. A closed connection is
//! only re-established when a fresh signal or join event would create a
//! new entry - teardown already removed the old one, so that is a plain
//! create.

use std::collections::{HashMap, HashSet};

use chorus_proto::{ParticipantId, SignalEnvelope, SignalKind, SignalPayload};

use crate::{
    event::SessionAction,
    peer::{PeerConnection, PeerRole, PeerState},
};

/// Manager of all pairwise media connections for one session.
#[derive(Debug)]
pub struct PeerConnectionManager {
    self_id: ParticipantId,
    peers: HashMap<ParticipantId, PeerConnection>,
    sinks: HashSet<ParticipantId>,
}

impl PeerConnectionManager {
    /// Empty manager for the given local participant.
    pub fn new(self_id: impl Into<ParticipantId>) -> Self {
        Self { self_id: self_id.into(), peers: HashMap::new(), sinks: HashSet::new() }
    }

    /// Number of live connection records.
    pub fn connection_count(&self) -> usize {
        self.peers.len()
    }

    /// Whether a connection record exists for `remote_id`.
    pub fn has_connection(&self, remote_id: &str) -> bool {
        self.peers.contains_key(remote_id)
    }

    /// Ids of all connected-or-negotiating peers.
    pub fn peer_ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.peers.keys()
    }

    /// Lifecycle state of one connection.
    pub fn state_of(&self, remote_id: &str) -> Option<PeerState> {
        self.peers.get(remote_id).map(PeerConnection::state)
    }

    /// Negotiation role of one connection.
    pub fn role_of(&self, remote_id: &str) -> Option<PeerRole> {
        self.peers.get(remote_id).map(PeerConnection::role)
    }

    /// Ids of peers with an attached output sink.
    pub fn sink_ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.sinks.iter()
    }

    /// Ensure a connection toward `remote_id` exists, optionally feeding
    /// an inbound payload into it.
    ///
    /// - Existing connection, no payload: idempotent no-op. This is what
    ///   makes overlapping join events harmless.
    /// - Existing connection, payload supplied: the payload is forwarded
    ///   into the live negotiation (renegotiation, late candidates).
    /// - No connection, payload is an offer (or no payload): a new record
    ///   is created. An incoming offer forces the responder role
    ///   regardless of our roster view - the defensive fallback the glare
    ///   convention relies on.
    /// - No connection, payload is a stale answer/candidate: dropped. It
    ///   belongs to a connection that was already torn down.
    pub fn connect(
        &mut self,
        remote_id: &str,
        initiator: bool,
        incoming: Option<SignalPayload>,
    ) -> Vec<SessionAction> {
        if let Some(peer) = self.peers.get_mut(remote_id) {
            let Some(payload) = incoming else {
                return Vec::new();
            };
            peer.begin_negotiation();
            return vec![SessionAction::FeedTransport {
                remote_id: remote_id.to_string(),
                payload,
            }];
        }

        let role = match &incoming {
            Some(payload) if payload.kind == SignalKind::Offer => PeerRole::Responder,
            Some(_) => return Vec::new(),
            None if initiator => PeerRole::Initiator,
            None => PeerRole::Responder,
        };

        let mut peer = PeerConnection::new(remote_id.to_string(), role);
        peer.begin_negotiation();
        self.peers.insert(remote_id.to_string(), peer);

        let mut actions = vec![SessionAction::OpenTransport {
            remote_id: remote_id.to_string(),
            initiator: role == PeerRole::Initiator,
        }];
        if let Some(payload) = incoming {
            actions.push(SessionAction::FeedTransport {
                remote_id: remote_id.to_string(),
                payload,
            });
        }
        actions
    }

    /// A connection produced an outbound negotiation payload: wrap it in
    /// an envelope addressed to the peer.
    ///
    /// Payloads for peers we no longer track are dropped - the completion
    /// of an abandoned connect attempt after teardown is a no-op.
    pub fn on_local_signal(
        &mut self,
        remote_id: &str,
        payload: SignalPayload,
        now_ms: u64,
    ) -> Vec<SessionAction> {
        if !self.peers.contains_key(remote_id) {
            return Vec::new();
        }
        vec![SessionAction::SendSignal(SignalEnvelope {
            from: self.self_id.clone(),
            to: Some(remote_id.to_string()),
            payload,
            timestamp_ms: now_ms,
        })]
    }

    /// A connection received the remote party's audio: attach it to the
    /// peer's output sink.
    ///
    /// Re-attaching replaces the sink's source, so duplicate track events
    /// stay idempotent.
    pub fn on_remote_track(&mut self, remote_id: &str) -> Vec<SessionAction> {
        let Some(peer) = self.peers.get_mut(remote_id) else {
            return Vec::new();
        };
        peer.track_received();
        self.sinks.insert(remote_id.to_string());
        vec![SessionAction::AttachSink { remote_id: remote_id.to_string() }]
    }

    /// Transport error on one peer: close and remove that connection
    /// without touching the others.
    pub fn on_transport_error(&mut self, remote_id: &str) -> Vec<SessionAction> {
        self.teardown(remote_id)
    }

    /// The remote side closed the transport. Same cleanup as an error,
    /// minus destroying a transport that is already gone.
    pub fn on_transport_closed(&mut self, remote_id: &str) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if let Some(mut peer) = self.peers.remove(remote_id) {
            peer.close();
        }
        if self.sinks.remove(remote_id) {
            actions.push(SessionAction::ReleaseSink { remote_id: remote_id.to_string() });
        }
        actions
    }

    /// Destroy one connection and its output sink.
    ///
    /// Called on explicit leave, on roster removal of that participant,
    /// or on connection error. Idempotent.
    pub fn teardown(&mut self, remote_id: &str) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if let Some(mut peer) = self.peers.remove(remote_id) {
            peer.close();
            actions.push(SessionAction::CloseTransport { remote_id: remote_id.to_string() });
        }
        if self.sinks.remove(remote_id) {
            actions.push(SessionAction::ReleaseSink { remote_id: remote_id.to_string() });
        }
        actions
    }

    /// Destroy every connection; called when the local participant
    /// leaves.
    pub fn teardown_all(&mut self) -> Vec<SessionAction> {
        let ids: Vec<ParticipantId> = self.peers.keys().cloned().collect();
        let mut actions = Vec::new();
        for id in ids {
            actions.extend(self.teardown(&id));
        }
        actions
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn manager() -> PeerConnectionManager {
        PeerConnectionManager::new("a")
    }

    #[test]
    fn connect_is_idempotent() {
        let mut m = manager();
        let first = m.connect("b", true, None);
        assert!(matches!(first.as_slice(), [SessionAction::OpenTransport { initiator: true, .. }]));
        assert_eq!(m.connection_count(), 1);

        let second = m.connect("b", true, None);
        assert!(second.is_empty());
        assert_eq!(m.connection_count(), 1);
    }

    #[test]
    fn incoming_offer_creates_responder() {
        let mut m = manager();
        let actions = m.connect("b", true, Some(SignalPayload::offer(b"sdp".to_vec())));

        // Role is responder despite the initiator hint
        assert_eq!(m.role_of("b"), Some(PeerRole::Responder));
        assert!(matches!(
            actions.as_slice(),
            [
                SessionAction::OpenTransport { initiator: false, .. },
                SessionAction::FeedTransport { .. }
            ]
        ));
    }

    #[test]
    fn stale_candidate_for_unknown_peer_is_dropped() {
        let mut m = manager();
        let actions = m.connect("b", false, Some(SignalPayload::candidate(b"c".to_vec())));
        assert!(actions.is_empty());
        assert_eq!(m.connection_count(), 0);
    }

    #[test]
    fn payload_for_existing_connection_is_fed() {
        let mut m = manager();
        m.connect("b", true, None);
        let actions = m.connect("b", false, Some(SignalPayload::answer(b"sdp".to_vec())));
        assert!(matches!(actions.as_slice(), [SessionAction::FeedTransport { .. }]));
        // Still exactly one connection
        assert_eq!(m.connection_count(), 1);
    }

    #[test]
    fn local_signal_wraps_envelope() {
        let mut m = manager();
        m.connect("b", true, None);
        let actions = m.on_local_signal("b", SignalPayload::offer(b"sdp".to_vec()), 42);

        match actions.as_slice() {
            [SessionAction::SendSignal(envelope)] => {
                assert_eq!(envelope.from, "a");
                assert_eq!(envelope.to.as_deref(), Some("b"));
                assert_eq!(envelope.timestamp_ms, 42);
            },
            other => panic!("unexpected actions: {other:?}"),
        }
    }

    #[test]
    fn local_signal_after_teardown_is_dropped() {
        let mut m = manager();
        m.connect("b", true, None);
        m.teardown("b");
        let actions = m.on_local_signal("b", SignalPayload::candidate(b"c".to_vec()), 42);
        assert!(actions.is_empty());
    }

    #[test]
    fn track_attaches_sink_and_connects() {
        let mut m = manager();
        m.connect("b", true, None);
        let actions = m.on_remote_track("b");
        assert!(matches!(actions.as_slice(), [SessionAction::AttachSink { .. }]));
        assert_eq!(m.state_of("b"), Some(PeerState::Connected));

        // Duplicate track replaces the sink source, no duplicate records
        let again = m.on_remote_track("b");
        assert!(matches!(again.as_slice(), [SessionAction::AttachSink { .. }]));
        assert_eq!(m.sink_ids().count(), 1);
    }

    #[test]
    fn teardown_releases_sink_exactly_once() {
        let mut m = manager();
        m.connect("b", true, None);
        m.on_remote_track("b");

        let actions = m.teardown("b");
        assert!(matches!(
            actions.as_slice(),
            [SessionAction::CloseTransport { .. }, SessionAction::ReleaseSink { .. }]
        ));

        // Second teardown is a no-op
        assert!(m.teardown("b").is_empty());
        assert_eq!(m.connection_count(), 0);
    }

    #[test]
    fn error_tears_down_only_that_peer() {
        let mut m = manager();
        m.connect("b", true, None);
        m.connect("c", true, None);
        m.on_remote_track("b");
        m.on_remote_track("c");

        m.on_transport_error("b");
        assert!(!m.has_connection("b"));
        assert!(m.has_connection("c"));
        assert_eq!(m.sink_ids().count(), 1);
    }

    #[test]
    fn teardown_all_drains_everything() {
        let mut m = manager();
        m.connect("b", true, None);
        m.connect("c", true, None);
        m.on_remote_track("c");

        let actions = m.teardown_all();
        assert_eq!(m.connection_count(), 0);
        assert_eq!(m.sink_ids().count(), 0);
        // One close per peer plus one sink release
        assert_eq!(
            actions
                .iter()
                .filter(|a| matches!(a, SessionAction::CloseTransport { .. }))
                .count(),
            2
        );
        assert_eq!(
            actions.iter().filter(|a| matches!(a, SessionAction::ReleaseSink { .. })).count(),
            1
        );
    }

    #[test]
    fn fresh_signal_after_error_recreates() {
        let mut m = manager();
        m.connect("b", true, None);
        m.on_transport_error("b");

        // A fresh offer re-creates the connection as a plain create
        let actions = m.connect("b", false, Some(SignalPayload::offer(b"sdp".to_vec())));
        assert!(!actions.is_empty());
        assert_eq!(m.role_of("b"), Some(PeerRole::Responder));
    }

    mod properties {
        use proptest::prelude::*;

        use super::*;

        #[derive(Debug, Clone)]
        enum Op {
            Connect { initiator: bool, kind: Option<u8> },
            Track,
            Error,
            Closed,
            Teardown,
        }

        fn op() -> impl Strategy<Value = (u8, Op)> {
            let op = prop_oneof![
                (any::<bool>(), proptest::option::of(0u8..3))
                    .prop_map(|(initiator, kind)| Op::Connect { initiator, kind }),
                Just(Op::Track),
                Just(Op::Error),
                Just(Op::Closed),
                Just(Op::Teardown),
            ];
            (0u8..4, op)
        }

        fn payload(kind: u8) -> SignalPayload {
            match kind {
                0 => SignalPayload::offer(b"x".to_vec()),
                1 => SignalPayload::answer(b"x".to_vec()),
                _ => SignalPayload::candidate(b"x".to_vec()),
            }
        }

        proptest! {
            /// Any interleaving of connects, tracks, faults, and
            /// teardowns keeps at most one connection per peer and never
            /// leaks a sink past its connection.
            #[test]
            fn no_duplicates_and_no_sink_leaks(ops in proptest::collection::vec(op(), 0..64)) {
                let peers = ["p0", "p1", "p2", "p3"];
                let mut m = manager();
                for (peer, op) in ops {
                    let remote = peers[peer as usize];
                    match op {
                        Op::Connect { initiator, kind } => {
                            m.connect(remote, initiator, kind.map(payload));
                        },
                        Op::Track => {
                            m.on_remote_track(remote);
                        },
                        Op::Error => {
                            m.on_transport_error(remote);
                        },
                        Op::Closed => {
                            m.on_transport_closed(remote);
                        },
                        Op::Teardown => {
                            m.teardown(remote);
                        },
                    }

                    prop_assert!(m.connection_count() <= peers.len());
                    for sink in m.sink_ids() {
                        prop_assert!(m.has_connection(sink), "sink without connection");
                    }
                }
            }
        }
    }
}
