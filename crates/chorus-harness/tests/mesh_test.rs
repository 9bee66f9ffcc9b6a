//! Peer mesh scenarios: join order, glare avoidance, teardown, fault
//! isolation.

use chorus_client::{PeerRole, SessionError};
use chorus_core::Environment;
use chorus_harness::VoiceCluster;
use chorus_proto::{SignalEnvelope, SignalPayload, VALIDITY_WINDOW_MS};

const HOST: usize = 0;

fn three_joined() -> VoiceCluster {
    let mut cluster = VoiceCluster::new(1, "r1", &["a", "b", "c"]);
    cluster.create_room("rust", false).unwrap();
    cluster.join(0).unwrap();
    cluster.join(1).unwrap();
    cluster.join(2).unwrap();
    cluster
}

#[test]
fn three_clients_form_full_mesh() {
    let cluster = three_joined();
    cluster.check_invariants("after full join");

    for idx in 0..3 {
        assert_eq!(cluster.session(idx).connections().connection_count(), 2, "client {idx}");
        assert_eq!(cluster.session(idx).roster().len(), 3, "client {idx}");
    }
}

#[test]
fn joiner_initiates_existing_responds() {
    let cluster = three_joined();

    // b joined after a: b proposed, a answered
    assert_eq!(cluster.session(1).connections().role_of("a"), Some(PeerRole::Initiator));
    assert_eq!(cluster.session(0).connections().role_of("b"), Some(PeerRole::Responder));

    // c joined last: initiator toward both
    assert_eq!(cluster.session(2).connections().role_of("a"), Some(PeerRole::Initiator));
    assert_eq!(cluster.session(2).connections().role_of("b"), Some(PeerRole::Initiator));
    assert_eq!(cluster.session(1).connections().role_of("c"), Some(PeerRole::Responder));
}

#[test]
fn tracks_attach_sinks_on_both_sides() {
    let cluster = three_joined();
    for idx in 0..3 {
        assert_eq!(cluster.session(idx).connections().sink_ids().count(), 2, "client {idx}");
    }
}

#[test]
fn join_twice_is_rejected() {
    let mut cluster = three_joined();
    assert!(matches!(cluster.join(1), Err(SessionError::AlreadyJoined)));
}

#[test]
fn leave_tears_down_both_sides() {
    let mut cluster = three_joined();
    cluster.leave(1);
    cluster.check_invariants("after leave");

    assert!(!cluster.session(1).is_joined());
    assert_eq!(cluster.session(1).connections().connection_count(), 0);
    assert!(!cluster.capturing(1));

    // Remaining clients drop the leaver from roster and mesh
    for idx in [0, 2] {
        assert!(!cluster.session(idx).roster().contains("b"), "client {idx}");
        assert!(!cluster.session(idx).connections().has_connection("b"), "client {idx}");
        assert_eq!(cluster.session(idx).connections().sink_ids().count(), 1, "client {idx}");
    }
}

#[test]
fn leave_is_idempotent() {
    let mut cluster = three_joined();
    cluster.leave(1);
    cluster.leave(1);
    cluster.check_invariants("after double leave");
    assert_eq!(cluster.session(0).roster().len(), 2);
}

#[test]
fn rejoin_rebuilds_the_mesh() {
    let mut cluster = three_joined();
    cluster.leave(1);
    cluster.join(1).unwrap();
    cluster.check_invariants("after rejoin");

    assert_eq!(cluster.session(1).connections().connection_count(), 2);
    // Rejoiner initiates this time regardless of original order
    assert_eq!(cluster.session(1).connections().role_of("a"), Some(PeerRole::Initiator));
    for idx in 0..3 {
        assert_eq!(cluster.session(idx).roster().len(), 3, "client {idx}");
    }
}

#[test]
fn transport_fault_isolates_one_pair() {
    let mut cluster = three_joined();
    cluster.fail_transport(1, "c");
    cluster.check_invariants("after fault");

    // The faulted pair is disconnected with sinks released
    assert!(!cluster.session(1).connections().has_connection("c"));
    assert!(!cluster.session(2).connections().has_connection("b"));

    // No automatic reconnect, but the roster is untouched
    assert_eq!(cluster.session(1).roster().len(), 3);
    assert_eq!(cluster.session(2).roster().len(), 3);

    // The host's connections are unaffected
    assert_eq!(cluster.session(HOST).connections().connection_count(), 2);
}

#[test]
fn stale_signal_is_ignored() {
    let mut cluster = VoiceCluster::new(2, "r1", &["a", "b"]);
    cluster.create_room("rust", false).unwrap();
    cluster.join(0).unwrap();

    let stale = SignalEnvelope {
        from: "ghost".into(),
        to: Some("a".into()),
        payload: SignalPayload::offer(b"sdp".to_vec()),
        timestamp_ms: cluster.env.wall_clock_ms(),
    };
    cluster.env.advance(std::time::Duration::from_millis(VALIDITY_WINDOW_MS + 1));
    cluster.inject_signal(&stale);

    assert_eq!(cluster.session(0).connections().connection_count(), 0);
}

#[test]
fn foreign_addressed_signal_is_ignored() {
    let mut cluster = VoiceCluster::new(3, "r1", &["a", "b"]);
    cluster.create_room("rust", false).unwrap();
    cluster.join(0).unwrap();
    cluster.join(1).unwrap();

    let before_a = cluster.session(0).connections().connection_count();
    let foreign = SignalEnvelope {
        from: "ghost".into(),
        to: Some("someone-else".into()),
        payload: SignalPayload::offer(b"sdp".to_vec()),
        timestamp_ms: cluster.env.wall_clock_ms(),
    };
    cluster.inject_signal(&foreign);

    assert_eq!(cluster.session(0).connections().connection_count(), before_a);
    assert!(!cluster.session(0).connections().has_connection("ghost"));
}

#[test]
fn answer_for_torn_down_connection_is_dropped() {
    let mut cluster = VoiceCluster::new(4, "r1", &["a", "b"]);
    cluster.create_room("rust", false).unwrap();
    cluster.join(0).unwrap();

    // An answer from an unknown peer must not create a connection
    let stray = SignalEnvelope {
        from: "b".into(),
        to: Some("a".into()),
        payload: SignalPayload::answer(b"sdp".to_vec()),
        timestamp_ms: cluster.env.wall_clock_ms(),
    };
    cluster.inject_signal(&stray);
    assert_eq!(cluster.session(0).connections().connection_count(), 0);
}
