//! Room lifecycle scenarios: side channels, replay windows, topic
//! mutation, room destruction.

use std::time::Duration;

use chorus_client::SessionError;
use chorus_harness::VoiceCluster;
use chorus_proto::{CommentBody, VALIDITY_WINDOW_MS};

const HOST: usize = 0;
const GUEST: usize = 1;

fn joined_pair() -> VoiceCluster {
    let mut cluster = VoiceCluster::new(30, "r1", &["a", "b"]);
    cluster.create_room("rust", false).unwrap();
    cluster.join(HOST).unwrap();
    cluster.join(GUEST).unwrap();
    cluster
}

#[test]
fn comments_reach_all_participants() {
    let mut cluster = joined_pair();
    cluster.post_comment(GUEST, CommentBody::Text("hello".into())).unwrap();

    // Everyone gets the comment, author included (their own echo)
    assert_eq!(cluster.comments(HOST).len(), 1);
    assert_eq!(cluster.comments(GUEST).len(), 1);
    assert!(matches!(&cluster.comments(HOST)[0].body, CommentBody::Text(t) if t == "hello"));
    assert_eq!(cluster.comments(HOST)[0].author_id, "b");
}

#[test]
fn image_comments_travel_as_references() {
    let mut cluster = joined_pair();
    cluster.post_comment(HOST, CommentBody::ImageRef("uploads/cat.png".into())).unwrap();
    assert!(matches!(
        &cluster.comments(GUEST)[0].body,
        CommentBody::ImageRef(r) if r == "uploads/cat.png"
    ));
}

#[test]
fn welcome_reaches_existing_participants_not_the_joiner() {
    let cluster = joined_pair();

    // The host saw b's welcome; b filtered its own. The fresh replay of
    // a's welcome on subscribe may reach b, but never b's own.
    assert_eq!(cluster.welcomes(HOST).len(), 1);
    assert_eq!(cluster.welcomes(HOST)[0].user_id, "b");
    assert!(cluster.welcomes(GUEST).iter().all(|w| w.user_id != "b"));
}

#[test]
fn fresh_replay_is_delivered_to_late_joiner() {
    let mut cluster = VoiceCluster::new(31, "r1", &["a", "b", "c"]);
    cluster.create_room("rust", false).unwrap();
    cluster.join(0).unwrap();
    cluster.join(1).unwrap();

    // c joins within the validity window: the replayed most recent
    // welcome (b's) is still fresh and gets delivered
    cluster.join(2).unwrap();
    assert_eq!(cluster.welcomes(2).len(), 1);
    assert_eq!(cluster.welcomes(2)[0].user_id, "b");
}

#[test]
fn stale_replay_is_filtered_for_late_joiner() {
    let mut cluster = VoiceCluster::new(32, "r1", &["a", "b", "c"]);
    cluster.create_room("rust", false).unwrap();
    cluster.join(0).unwrap();
    cluster.join(1).unwrap();

    cluster.env.advance(Duration::from_millis(VALIDITY_WINDOW_MS + 1));
    cluster.join(2).unwrap();
    cluster.check_invariants("after late join");

    // The replayed welcome is older than the window; the mesh still
    // forms from the live roster
    assert!(cluster.welcomes(2).is_empty());
    assert_eq!(cluster.session(2).connections().connection_count(), 2);
}

#[test]
fn topic_is_host_mutable() {
    let mut cluster = joined_pair();
    cluster.set_topic(HOST, "upcoming release").unwrap();

    let bytes = cluster.store().get("room/r1/config").unwrap();
    let config: chorus_proto::RoomConfig = chorus_proto::decode(&bytes).unwrap();
    assert_eq!(config.topic, "upcoming release");
    assert_eq!(config.host_id, "a");

    assert!(matches!(
        cluster.set_topic(GUEST, "hijack"),
        Err(SessionError::Authorization(_))
    ));
}

#[test]
fn close_room_evicts_everyone() {
    let mut cluster = joined_pair();
    cluster.close_room(HOST).unwrap();
    cluster.check_invariants("after close");

    assert!(!cluster.session(HOST).is_joined());
    assert!(!cluster.session(GUEST).is_joined());

    // All transports and devices are released
    for idx in [HOST, GUEST] {
        assert_eq!(cluster.session(idx).connections().connection_count(), 0, "client {idx}");
        assert!(cluster.transports(idx).is_empty(), "client {idx}");
        assert!(!cluster.capturing(idx), "client {idx}");
        assert!(!cluster.mic_enabled(idx), "client {idx}");
    }

    // The whole subtree is gone from the relay
    assert!(cluster.store().get("room/r1/config").is_none());
    assert!(cluster.store().snapshot("room/r1/participants").is_empty());
}

#[test]
fn close_room_requires_host() {
    let mut cluster = joined_pair();
    assert!(matches!(cluster.close_room(GUEST), Err(SessionError::Authorization(_))));
    assert!(cluster.session(GUEST).is_joined());
}

#[test]
fn events_after_leave_are_discarded() {
    let mut cluster = joined_pair();
    cluster.leave(GUEST);

    // Writes from the remaining participant must not resurrect state in
    // the departed client
    cluster.post_comment(HOST, CommentBody::Text("anyone there?".into())).unwrap();
    cluster.audio_frame(HOST, 0.5);
    cluster.check_invariants("after post-leave traffic");

    assert!(cluster.comments(GUEST).is_empty());
    assert!(cluster.session(GUEST).roster().is_empty());
}
