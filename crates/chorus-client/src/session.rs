//! Room session state machine.
//!
//! The `RoomSession` is the top-level coordinator: it owns the roster
//! read-model, the peer connection manager, the VAD, and the mic
//! authorization policy, and wires the relay's event streams to them.
//!
//! This is a pure state machine: it consumes [`SessionEvent`] inputs and
//! produces [`SessionAction`] instructions for the driver to execute. All
//! relay callbacks, transport callbacks, and VAD frames interleave on one
//! logical thread, so no locks guard any of this state.

use std::collections::HashMap;

use chorus_core::{
    Environment, MicPolicy, MicState, Roster, VadConfig, VoiceActivityDetector,
};
use chorus_proto::{
    CommentBody, CommentEntry, MicRequest, ParticipantEntry, ParticipantId, RoomConfig, RoomId,
    RoomPaths, SignalEnvelope, WelcomeEvent,
};

use crate::{
    error::SessionError,
    event::{SessionAction, SessionEvent},
    manager::PeerConnectionManager,
};

/// The local user's presentation data.
#[derive(Debug, Clone)]
pub struct LocalProfile {
    /// Display name published in our roster entry.
    pub display_name: String,
    /// Opaque avatar reference, if any.
    pub avatar_ref: Option<String>,
}

/// Session coordinator for one participant in one room.
pub struct RoomSession<E: Environment> {
    env: E,
    paths: RoomPaths,
    policy: MicPolicy,
    self_id: ParticipantId,
    profile: LocalProfile,
    topic: String,
    joined: bool,
    auto_grant: bool,
    roster: Roster,
    pending: HashMap<ParticipantId, MicRequest>,
    manager: PeerConnectionManager,
    vad: VoiceActivityDetector<E::Instant>,
    /// Authoritative copy of our own roster entry. We own `muted` and
    /// `is_speaking`; the host owns `is_speaker` and we adopt observed
    /// writes to it.
    local_entry: ParticipantEntry,
    /// Last published state of the outgoing mic track.
    mic_enabled: bool,
}

impl<E: Environment> RoomSession<E> {
    /// New session for `self_id` in the given room. The session starts
    /// un-joined; call [`RoomSession::join`] once capture is acquired.
    pub fn new(
        env: E,
        room_id: impl Into<RoomId>,
        host_id: impl Into<ParticipantId>,
        self_id: impl Into<ParticipantId>,
        profile: LocalProfile,
        vad_config: VadConfig,
    ) -> Self {
        let self_id = self_id.into();
        let host_id = host_id.into();
        let local_entry = if host_id == self_id {
            ParticipantEntry::speaker(profile.display_name.clone(), profile.avatar_ref.clone())
        } else {
            ParticipantEntry::listener(profile.display_name.clone(), profile.avatar_ref.clone())
        };
        Self {
            env,
            paths: RoomPaths::new(room_id),
            policy: MicPolicy::new(host_id),
            manager: PeerConnectionManager::new(self_id.clone()),
            self_id,
            profile,
            topic: String::new(),
            joined: false,
            auto_grant: false,
            roster: Roster::new(),
            pending: HashMap::new(),
            vad: VoiceActivityDetector::new(vad_config),
            local_entry,
            mic_enabled: false,
        }
    }

    /// Our participant id.
    pub fn self_id(&self) -> &str {
        &self.self_id
    }

    /// Whether we are the room host.
    pub fn is_host(&self) -> bool {
        self.policy.is_host(&self.self_id)
    }

    /// Whether we are currently joined.
    pub fn is_joined(&self) -> bool {
        self.joined
    }

    /// Path builder for this room's relay subtree.
    pub fn paths(&self) -> &RoomPaths {
        &self.paths
    }

    /// The synchronized roster view.
    pub fn roster(&self) -> &Roster {
        &self.roster
    }

    /// Pending mic requests, keyed by user.
    pub fn pending_requests(&self) -> &HashMap<ParticipantId, MicRequest> {
        &self.pending
    }

    /// Current auto-grant flag.
    pub fn auto_grant(&self) -> bool {
        self.auto_grant
    }

    /// The peer connection manager (read access for inspection).
    pub fn connections(&self) -> &PeerConnectionManager {
        &self.manager
    }

    /// A participant's mic authorization state.
    pub fn mic_state(&self, user_id: &str) -> MicState {
        self.policy.state_of(&self.roster, &self.pending, user_id)
    }

    /// Host-only: produce the writes that create the room.
    ///
    /// Called before joining; the config record and the auto-grant flag
    /// are the room's durable roots.
    pub fn create_room(
        &mut self,
        topic: impl Into<String>,
        auto_grant: bool,
    ) -> Result<Vec<SessionAction>, SessionError> {
        self.policy.authorize_room_mutation(&self.self_id, "create the room")?;
        self.topic = topic.into();
        self.auto_grant = auto_grant;
        Ok(vec![
            SessionAction::PublishConfig(self.config()),
            SessionAction::PublishAutoGrant(auto_grant),
        ])
    }

    /// Join the room.
    ///
    /// The driver acquires the capture device *before* calling this, so a
    /// `DeviceError` aborts the join with no partial state. `snapshot` is
    /// the roster read at join time; per the glare convention we initiate
    /// toward every participant already present.
    pub fn join(
        &mut self,
        snapshot: Vec<(ParticipantId, ParticipantEntry)>,
        auto_grant: bool,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if self.joined {
            return Err(SessionError::AlreadyJoined);
        }
        self.joined = true;
        self.auto_grant = auto_grant;
        self.manager = PeerConnectionManager::new(self.self_id.clone());
        self.roster = Roster::new();
        self.pending.clear();
        self.vad.stop();

        let mut actions = Vec::new();

        let others: Vec<ParticipantId> = snapshot
            .iter()
            .filter(|(id, _)| *id != self.self_id)
            .map(|(id, _)| id.clone())
            .collect();
        for (id, entry) in snapshot {
            if id != self.self_id {
                self.roster.apply(id, entry);
            }
        }
        self.roster.apply(self.self_id.clone(), self.local_entry.clone());

        actions.push(SessionAction::PublishSelfEntry(self.local_entry.clone()));
        actions.push(SessionAction::AppendWelcome(WelcomeEvent {
            user_id: self.self_id.clone(),
            display_name: self.profile.display_name.clone(),
            timestamp_ms: self.env.wall_clock_ms(),
        }));

        for id in &others {
            actions.extend(self.manager.connect(id, true, None));
        }

        self.sync_mic_enabled(&mut actions);
        actions.push(SessionAction::RosterChanged);
        Ok(actions)
    }

    /// Leave the room.
    ///
    /// Idempotent: calling when not joined is a no-op. Stops the VAD
    /// (with its final `is_speaking = false` publish), tears down every
    /// connection, removes our roster entry, and releases capture.
    pub fn leave(&mut self) -> Vec<SessionAction> {
        if !self.joined {
            return Vec::new();
        }
        self.joined = false;
        self.vad.stop();
        self.local_entry.is_speaking = false;

        let mut actions = vec![SessionAction::PublishSelfEntry(self.local_entry.clone())];
        actions.extend(self.manager.teardown_all());
        if self.pending.remove(&self.self_id).is_some() {
            actions.push(SessionAction::RemoveMicRequest { user_id: self.self_id.clone() });
        }
        actions.push(SessionAction::RemoveSelfEntry);
        if self.mic_enabled {
            self.mic_enabled = false;
            actions.push(SessionAction::SetMicEnabled(false));
        }
        actions.push(SessionAction::ReleaseCapture);

        // Speaker status is host-owned; a rejoin starts from scratch.
        self.local_entry.is_speaker = self.is_host();
        self.roster.clear();
        self.pending.clear();
        actions
    }

    /// Process one event and return the actions to execute.
    ///
    /// Events arriving while not joined are discarded: they belong to
    /// subscriptions that are about to be torn down or to abandoned
    /// connect attempts, and their completion must be a no-op.
    pub fn handle(
        &mut self,
        event: SessionEvent<E::Instant>,
    ) -> Result<Vec<SessionAction>, SessionError> {
        if !self.joined {
            return Ok(Vec::new());
        }
        match event {
            SessionEvent::RosterEntryUpdated { user_id, entry } => {
                Ok(self.on_roster_updated(user_id, entry))
            },
            SessionEvent::RosterEntryRemoved { user_id } => Ok(self.on_roster_removed(&user_id)),
            SessionEvent::SignalReceived(envelope) => Ok(self.on_signal(envelope)),
            SessionEvent::TransportSignal { remote_id, payload } => {
                let now_ms = self.env.wall_clock_ms();
                Ok(self.manager.on_local_signal(&remote_id, payload, now_ms))
            },
            SessionEvent::TrackReceived { remote_id } => Ok(self.manager.on_remote_track(&remote_id)),
            SessionEvent::TransportError { remote_id, reason: _ } => {
                // The driver already logged the fault; only that peer's
                // connection is torn down.
                Ok(self.manager.on_transport_error(&remote_id))
            },
            SessionEvent::TransportClosed { remote_id } => {
                Ok(self.manager.on_transport_closed(&remote_id))
            },
            SessionEvent::MicRequestQueued(request) => Ok(self.on_mic_request(request)),
            SessionEvent::MicRequestRemoved { user_id } => {
                self.pending.remove(&user_id);
                Ok(Vec::new())
            },
            SessionEvent::AutoGrantChanged(enabled) => {
                // Affects only future requests, never existing state.
                self.auto_grant = enabled;
                Ok(Vec::new())
            },
            SessionEvent::CommentAppended(comment) => {
                if comment.is_stale(self.env.wall_clock_ms()) {
                    Ok(Vec::new())
                } else {
                    Ok(vec![SessionAction::DeliverComment(comment)])
                }
            },
            SessionEvent::WelcomeAppended(welcome) => {
                if welcome.is_stale(self.env.wall_clock_ms()) || welcome.user_id == self.self_id {
                    Ok(Vec::new())
                } else {
                    Ok(vec![SessionAction::DeliverWelcome(welcome)])
                }
            },
            SessionEvent::AudioFrame { energy, now } => Ok(self.on_audio_frame(energy, now)),
        }
    }

    /// Request the microphone.
    ///
    /// Re-requesting overwrites any stale prior request; at most one is
    /// outstanding per user. A no-op for speakers.
    pub fn request_mic(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        self.ensure_joined()?;
        if self.mic_state(&self.self_id) == MicState::Speaker {
            return Ok(Vec::new());
        }
        let request = MicRequest {
            user_id: self.self_id.clone(),
            user_name: self.profile.display_name.clone(),
            timestamp_ms: self.env.wall_clock_ms(),
        };
        self.pending.insert(self.self_id.clone(), request.clone());
        Ok(vec![SessionAction::PublishMicRequest(request)])
    }

    /// Host-only: grant a pending request (or promote directly).
    ///
    /// Idempotent: granting an existing speaker only clears any leftover
    /// queue entry.
    pub fn grant_mic(&mut self, user_id: &str) -> Result<Vec<SessionAction>, SessionError> {
        self.ensure_joined()?;
        self.policy.authorize_grant(&self.self_id)?;
        if !self.roster.contains(user_id) && !self.pending.contains_key(user_id) {
            return Err(SessionError::UnknownParticipant { user_id: user_id.to_string() });
        }
        Ok(self.grant_internal(user_id))
    }

    /// Host-only: revoke a speaker back to listener. Never the host.
    pub fn revoke_mic(&mut self, user_id: &str) -> Result<Vec<SessionAction>, SessionError> {
        self.ensure_joined()?;
        self.policy.authorize_revoke(&self.self_id, user_id)?;
        let Some(entry) = self.roster.get(user_id) else {
            return Err(SessionError::UnknownParticipant { user_id: user_id.to_string() });
        };
        if !entry.is_speaker {
            return Ok(Vec::new());
        }
        let mut updated = entry.clone();
        updated.is_speaker = false;
        self.roster.apply(user_id.to_string(), updated.clone());
        Ok(vec![
            SessionAction::PublishEntry { user_id: user_id.to_string(), entry: updated },
            SessionAction::RosterChanged,
        ])
    }

    /// Voluntarily step down from speaker to listener. Disallowed for
    /// the host.
    pub fn step_down(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        self.ensure_joined()?;
        self.policy.authorize_step_down(&self.self_id)?;
        if !self.local_entry.is_speaker {
            return Ok(Vec::new());
        }
        self.local_entry.is_speaker = false;
        self.roster.apply(self.self_id.clone(), self.local_entry.clone());
        let mut actions = vec![
            SessionAction::PublishSelfEntry(self.local_entry.clone()),
            SessionAction::RosterChanged,
        ];
        self.sync_mic_enabled(&mut actions);
        Ok(actions)
    }

    /// Set the self-owned mute flag.
    ///
    /// Muting forces `is_speaking = false`; the VAD stays suppressed
    /// until unmuted. Orthogonal to speaker authorization.
    pub fn set_muted(&mut self, muted: bool) -> Result<Vec<SessionAction>, SessionError> {
        self.ensure_joined()?;
        if self.local_entry.muted == muted {
            return Ok(Vec::new());
        }
        self.local_entry.muted = muted;
        if let Some(speaking) = self.vad.set_muted(muted) {
            self.local_entry.is_speaking = speaking;
        }
        self.roster.apply(self.self_id.clone(), self.local_entry.clone());
        let mut actions = vec![
            SessionAction::PublishSelfEntry(self.local_entry.clone()),
            SessionAction::RosterChanged,
        ];
        self.sync_mic_enabled(&mut actions);
        Ok(actions)
    }

    /// Append a comment to the room log.
    pub fn post_comment(&mut self, body: CommentBody) -> Result<Vec<SessionAction>, SessionError> {
        self.ensure_joined()?;
        Ok(vec![SessionAction::AppendComment(CommentEntry {
            author_id: self.self_id.clone(),
            author_name: self.profile.display_name.clone(),
            body,
            timestamp_ms: self.env.wall_clock_ms(),
        })])
    }

    /// Host-only: change the room topic.
    pub fn set_topic(&mut self, topic: impl Into<String>) -> Result<Vec<SessionAction>, SessionError> {
        self.ensure_joined()?;
        self.policy.authorize_room_mutation(&self.self_id, "set the topic")?;
        self.topic = topic.into();
        Ok(vec![SessionAction::PublishConfig(self.config())])
    }

    /// Host-only: toggle auto-grant. Affects only future requests.
    pub fn set_auto_grant(&mut self, enabled: bool) -> Result<Vec<SessionAction>, SessionError> {
        self.ensure_joined()?;
        self.policy.authorize_room_mutation(&self.self_id, "toggle auto-grant")?;
        self.auto_grant = enabled;
        Ok(vec![SessionAction::PublishAutoGrant(enabled)])
    }

    /// Host-only: destroy the room. Cascades: the whole subtree
    /// (participants, signals, requests, logs) is removed.
    pub fn close_room(&mut self) -> Result<Vec<SessionAction>, SessionError> {
        self.ensure_joined()?;
        self.policy.authorize_room_mutation(&self.self_id, "close the room")?;
        self.joined = false;
        self.vad.stop();
        let mut actions = self.manager.teardown_all();
        actions.push(SessionAction::RemoveRoom);
        if self.mic_enabled {
            self.mic_enabled = false;
            actions.push(SessionAction::SetMicEnabled(false));
        }
        actions.push(SessionAction::ReleaseCapture);
        self.roster.clear();
        self.pending.clear();
        Ok(actions)
    }

    fn config(&self) -> RoomConfig {
        RoomConfig {
            host_id: self.policy.host_id().to_string(),
            topic: self.topic.clone(),
            auto_grant_mic: self.auto_grant,
        }
    }

    fn ensure_joined(&self) -> Result<(), SessionError> {
        if self.joined {
            Ok(())
        } else {
            Err(SessionError::NotJoined)
        }
    }

    fn on_roster_updated(
        &mut self,
        user_id: ParticipantId,
        entry: ParticipantEntry,
    ) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if user_id == self.self_id {
            // The host owns is_speaker on our entry; we own the rest.
            if entry.is_speaker != self.local_entry.is_speaker {
                self.local_entry.is_speaker = entry.is_speaker;
                if entry.is_speaker {
                    // A grant consumed our request.
                    self.pending.remove(&self.self_id);
                }
                if self.roster.apply(user_id, self.local_entry.clone()) {
                    actions.push(SessionAction::RosterChanged);
                }
                self.sync_mic_enabled(&mut actions);
            }
            return actions;
        }
        if self.roster.apply(user_id, entry) {
            actions.push(SessionAction::RosterChanged);
        }
        actions
    }

    fn on_roster_removed(&mut self, user_id: &str) -> Vec<SessionAction> {
        if user_id == self.self_id {
            // Our entry vanished under us (room closed). Tear down
            // locally; capture is released like any other exit path.
            self.joined = false;
            self.vad.stop();
            let mut actions = self.manager.teardown_all();
            if self.mic_enabled {
                self.mic_enabled = false;
                actions.push(SessionAction::SetMicEnabled(false));
            }
            actions.push(SessionAction::ReleaseCapture);
            actions.push(SessionAction::RosterChanged);
            self.local_entry.is_speaker = self.is_host();
            self.roster.clear();
            self.pending.clear();
            return actions;
        }
        let mut actions = Vec::new();
        if self.roster.remove(user_id).is_some() {
            actions.push(SessionAction::RosterChanged);
        }
        actions.extend(self.manager.teardown(user_id));
        actions
    }

    fn on_signal(&mut self, envelope: SignalEnvelope) -> Vec<SessionAction> {
        if !envelope.addressed_to(&self.self_id) {
            return Vec::new();
        }
        if envelope.is_stale(self.env.wall_clock_ms()) {
            return Vec::new();
        }
        self.manager.connect(&envelope.from, false, Some(envelope.payload))
    }

    fn on_mic_request(&mut self, request: MicRequest) -> Vec<SessionAction> {
        let user_id = request.user_id.clone();
        self.pending.insert(user_id.clone(), request);
        if self.is_host() && self.auto_grant {
            return self.grant_internal(&user_id);
        }
        Vec::new()
    }

    /// Grant without authorization checks; shared by explicit grant and
    /// auto-grant.
    fn grant_internal(&mut self, user_id: &str) -> Vec<SessionAction> {
        let mut actions = Vec::new();
        if let Some(entry) = self.roster.get(user_id) {
            if !entry.is_speaker {
                let mut updated = entry.clone();
                updated.is_speaker = true;
                self.roster.apply(user_id.to_string(), updated.clone());
                actions.push(SessionAction::PublishEntry {
                    user_id: user_id.to_string(),
                    entry: updated,
                });
                actions.push(SessionAction::RosterChanged);
            }
        }
        if self.pending.remove(user_id).is_some() {
            actions.push(SessionAction::RemoveMicRequest { user_id: user_id.to_string() });
        }
        actions
    }

    fn on_audio_frame(&mut self, energy: f32, now: E::Instant) -> Vec<SessionAction> {
        let Some(speaking) = self.vad.sample(energy, now) else {
            return Vec::new();
        };
        self.local_entry.is_speaking = speaking;
        self.roster.apply(self.self_id.clone(), self.local_entry.clone());
        vec![SessionAction::PublishSelfEntry(self.local_entry.clone())]
    }

    /// Publish the outgoing-track state when the "unmuted speaker"
    /// conjunction changes.
    fn sync_mic_enabled(&mut self, actions: &mut Vec<SessionAction>) {
        let enabled = self.local_entry.is_speaker && !self.local_entry.muted;
        if enabled != self.mic_enabled {
            self.mic_enabled = enabled;
            actions.push(SessionAction::SetMicEnabled(enabled));
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{
            Arc,
            atomic::{AtomicU64, Ordering},
        },
        time::Duration,
    };

    use chorus_proto::SignalPayload;

    use super::*;

    /// Millisecond virtual instant.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
    struct At(u64);

    impl std::ops::Sub for At {
        type Output = Duration;
        fn sub(self, rhs: Self) -> Duration {
            Duration::from_millis(self.0 - rhs.0)
        }
    }

    /// Deterministic test environment with a settable wall clock.
    #[derive(Clone)]
    struct TestEnv {
        clock_ms: Arc<AtomicU64>,
    }

    impl TestEnv {
        fn new() -> Self {
            Self { clock_ms: Arc::new(AtomicU64::new(100_000)) }
        }
    }

    impl Environment for TestEnv {
        type Instant = At;

        fn now(&self) -> At {
            At(self.clock_ms.load(Ordering::Relaxed))
        }

        fn wall_clock_ms(&self) -> u64 {
            self.clock_ms.load(Ordering::Relaxed)
        }

        fn sleep(&self, _duration: Duration) -> impl std::future::Future<Output = ()> + Send {
            async {}
        }

        fn random_bytes(&self, buffer: &mut [u8]) {
            for (i, byte) in buffer.iter_mut().enumerate() {
                *byte = i as u8;
            }
        }
    }

    fn profile(name: &str) -> LocalProfile {
        LocalProfile { display_name: name.into(), avatar_ref: None }
    }

    fn host_session() -> RoomSession<TestEnv> {
        RoomSession::new(TestEnv::new(), "r1", "a", "a", profile("ada"), VadConfig::default())
    }

    fn guest_session(id: &str) -> RoomSession<TestEnv> {
        RoomSession::new(TestEnv::new(), "r1", "a", id, profile(id), VadConfig::default())
    }

    fn entry(speaker: bool) -> ParticipantEntry {
        ParticipantEntry {
            display_name: "x".into(),
            avatar_ref: None,
            is_speaker: speaker,
            muted: false,
            is_speaking: false,
        }
    }

    #[test]
    fn host_joins_empty_room_as_speaker() {
        let mut s = host_session();
        let actions = s.join(Vec::new(), false).unwrap();

        assert!(s.is_joined());
        assert!(s.roster().get("a").is_some_and(|e| e.is_speaker));
        assert!(actions.iter().any(|a| matches!(a, SessionAction::PublishSelfEntry(e) if e.is_speaker)));
        assert!(actions.iter().any(|a| matches!(a, SessionAction::AppendWelcome(_))));
        // Host's outgoing track comes up
        assert!(actions.contains(&SessionAction::SetMicEnabled(true)));
        // Empty room: nothing to connect to
        assert_eq!(s.connections().connection_count(), 0);
    }

    #[test]
    fn joiner_initiates_toward_existing_participants() {
        let mut s = guest_session("b");
        let actions = s.join(vec![("a".into(), entry(true))], false).unwrap();

        assert!(actions.iter().any(
            |a| matches!(a, SessionAction::OpenTransport { remote_id, initiator: true } if remote_id == "a")
        ));
        assert_eq!(s.connections().connection_count(), 1);
    }

    #[test]
    fn join_twice_fails() {
        let mut s = host_session();
        s.join(Vec::new(), false).unwrap();
        assert!(matches!(s.join(Vec::new(), false), Err(SessionError::AlreadyJoined)));
    }

    #[test]
    fn leave_is_idempotent() {
        let mut s = guest_session("b");
        assert!(s.leave().is_empty());

        s.join(vec![("a".into(), entry(true))], false).unwrap();
        let actions = s.leave();
        assert!(actions.contains(&SessionAction::RemoveSelfEntry));
        assert!(actions.contains(&SessionAction::ReleaseCapture));
        assert_eq!(s.connections().connection_count(), 0);

        assert!(s.leave().is_empty());
    }

    #[test]
    fn rejoin_after_grant_starts_as_listener() {
        let mut guest = guest_session("b");
        guest.join(vec![("a".into(), entry(true))], false).unwrap();

        // Host grants us (observed through the relay)
        let mut granted = entry(true);
        granted.display_name = "b".into();
        guest
            .handle(SessionEvent::RosterEntryUpdated { user_id: "b".into(), entry: granted })
            .unwrap();
        assert_eq!(guest.mic_state("b"), MicState::Speaker);

        guest.leave();
        let actions = guest.join(vec![("a".into(), entry(true))], false).unwrap();
        assert_eq!(guest.mic_state("b"), MicState::Listener);
        assert!(actions.iter().any(|a| matches!(
            a,
            SessionAction::PublishSelfEntry(e) if !e.is_speaker
        )));
        assert!(!actions.contains(&SessionAction::SetMicEnabled(true)));
    }

    #[test]
    fn leave_withdraws_own_pending_request() {
        let mut guest = guest_session("b");
        guest.join(vec![("a".into(), entry(true))], false).unwrap();
        guest.request_mic().unwrap();
        assert_eq!(guest.mic_state("b"), MicState::RequestPending);

        let actions = guest.leave();
        assert!(actions.iter().any(
            |a| matches!(a, SessionAction::RemoveMicRequest { user_id } if user_id == "b")
        ));
        assert!(guest.pending_requests().is_empty());
    }

    #[test]
    fn foreign_addressed_signal_is_ignored() {
        let mut s = host_session();
        s.join(Vec::new(), false).unwrap();

        let envelope = SignalEnvelope {
            from: "b".into(),
            to: Some("c".into()),
            payload: SignalPayload::offer(b"sdp".to_vec()),
            timestamp_ms: 100_000,
        };
        let actions = s.handle(SessionEvent::SignalReceived(envelope)).unwrap();
        assert!(actions.is_empty());
        assert_eq!(s.connections().connection_count(), 0);
    }

    #[test]
    fn stale_replayed_signal_is_ignored() {
        let mut s = host_session();
        s.join(Vec::new(), false).unwrap();

        let envelope = SignalEnvelope {
            from: "b".into(),
            to: Some("a".into()),
            payload: SignalPayload::offer(b"sdp".to_vec()),
            timestamp_ms: 100_000 - chorus_proto::VALIDITY_WINDOW_MS - 1,
        };
        let actions = s.handle(SessionEvent::SignalReceived(envelope)).unwrap();
        assert!(actions.is_empty());
        assert_eq!(s.connections().connection_count(), 0);
    }

    #[test]
    fn unexpected_offer_accepted_as_responder() {
        let mut s = host_session();
        s.join(Vec::new(), false).unwrap();

        let envelope = SignalEnvelope {
            from: "b".into(),
            to: Some("a".into()),
            payload: SignalPayload::offer(b"sdp".to_vec()),
            timestamp_ms: 100_000,
        };
        s.handle(SessionEvent::SignalReceived(envelope)).unwrap();
        assert!(s.connections().has_connection("b"));
        assert_eq!(
            s.connections().role_of("b"),
            Some(crate::peer::PeerRole::Responder)
        );
    }

    #[test]
    fn roster_removal_tears_down_connection() {
        let mut s = guest_session("b");
        s.join(vec![("a".into(), entry(true)), ("c".into(), entry(false))], false).unwrap();
        assert_eq!(s.connections().connection_count(), 2);

        let actions = s.handle(SessionEvent::RosterEntryRemoved { user_id: "c".into() }).unwrap();
        assert!(actions.iter().any(|a| matches!(a, SessionAction::CloseTransport { remote_id } if remote_id == "c")));
        assert_eq!(s.connections().connection_count(), 1);
        assert!(!s.roster().contains("c"));
    }

    #[test]
    fn mic_round_trip() {
        let mut host = host_session();
        host.join(Vec::new(), false).unwrap();
        host.handle(SessionEvent::RosterEntryUpdated { user_id: "b".into(), entry: entry(false) })
            .unwrap();

        let request =
            MicRequest { user_id: "b".into(), user_name: "b".into(), timestamp_ms: 100_000 };
        let queued = host.handle(SessionEvent::MicRequestQueued(request)).unwrap();
        assert!(queued.is_empty()); // auto-grant off: host must act
        assert_eq!(host.mic_state("b"), MicState::RequestPending);

        let actions = host.grant_mic("b").unwrap();
        assert!(actions.iter().any(|a| matches!(
            a,
            SessionAction::PublishEntry { user_id, entry } if user_id == "b" && entry.is_speaker
        )));
        assert!(actions.iter().any(|a| matches!(a, SessionAction::RemoveMicRequest { user_id } if user_id == "b")));
        assert_eq!(host.mic_state("b"), MicState::Speaker);

        // Repeating the grant is a no-op
        assert!(host.grant_mic("b").unwrap().is_empty());
    }

    #[test]
    fn auto_grant_consumes_request_without_host_action() {
        let mut host = host_session();
        host.join(Vec::new(), true).unwrap();
        host.handle(SessionEvent::RosterEntryUpdated { user_id: "b".into(), entry: entry(false) })
            .unwrap();

        let request =
            MicRequest { user_id: "b".into(), user_name: "b".into(), timestamp_ms: 100_000 };
        let actions = host.handle(SessionEvent::MicRequestQueued(request)).unwrap();
        assert!(actions.iter().any(|a| matches!(
            a,
            SessionAction::PublishEntry { user_id, entry } if user_id == "b" && entry.is_speaker
        )));
        assert!(actions.iter().any(|a| matches!(a, SessionAction::RemoveMicRequest { .. })));
        assert_eq!(host.mic_state("b"), MicState::Speaker);
    }

    #[test]
    fn revoke_host_is_rejected() {
        let mut host = host_session();
        host.join(Vec::new(), false).unwrap();
        assert!(matches!(
            host.revoke_mic("a"),
            Err(SessionError::Authorization(_))
        ));
        assert!(matches!(host.step_down(), Err(SessionError::Authorization(_))));
    }

    #[test]
    fn non_host_cannot_grant() {
        let mut guest = guest_session("b");
        guest.join(vec![("a".into(), entry(true))], false).unwrap();
        assert!(matches!(guest.grant_mic("c"), Err(SessionError::Authorization(_))));
        assert!(matches!(guest.set_auto_grant(true), Err(SessionError::Authorization(_))));
    }

    #[test]
    fn request_mic_is_noop_for_speaker() {
        let mut host = host_session();
        host.join(Vec::new(), false).unwrap();
        assert!(host.request_mic().unwrap().is_empty());
    }

    #[test]
    fn speaking_transitions_publish_self_entry() {
        let mut s = host_session();
        s.join(Vec::new(), false).unwrap();

        let actions = s.handle(SessionEvent::AudioFrame { energy: 0.5, now: At(100_000) }).unwrap();
        assert!(actions.iter().any(|a| matches!(a, SessionAction::PublishSelfEntry(e) if e.is_speaking)));

        // Steady speech publishes nothing further
        let actions = s.handle(SessionEvent::AudioFrame { energy: 0.5, now: At(100_010) }).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn mute_forces_silence_and_disables_track() {
        let mut s = host_session();
        s.join(Vec::new(), false).unwrap();
        s.handle(SessionEvent::AudioFrame { energy: 0.5, now: At(100_000) }).unwrap();

        let actions = s.set_muted(true).unwrap();
        assert!(actions.iter().any(|a| matches!(
            a,
            SessionAction::PublishSelfEntry(e) if e.muted && !e.is_speaking
        )));
        assert!(actions.contains(&SessionAction::SetMicEnabled(false)));

        // Frames while muted publish nothing
        let actions = s.handle(SessionEvent::AudioFrame { energy: 0.5, now: At(100_020) }).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn observed_revoke_updates_local_entry() {
        let mut guest = guest_session("b");
        guest.join(vec![("a".into(), entry(true))], false).unwrap();

        // Host grants us (observed through the relay)
        let mut granted = entry(true);
        granted.display_name = "b".into();
        let actions = guest
            .handle(SessionEvent::RosterEntryUpdated { user_id: "b".into(), entry: granted })
            .unwrap();
        assert!(actions.contains(&SessionAction::SetMicEnabled(true)));
        assert!(guest.roster().get("b").is_some_and(|e| e.is_speaker));

        // Host revokes
        let mut revoked = entry(false);
        revoked.display_name = "b".into();
        let actions = guest
            .handle(SessionEvent::RosterEntryUpdated { user_id: "b".into(), entry: revoked })
            .unwrap();
        assert!(actions.contains(&SessionAction::SetMicEnabled(false)));
    }

    #[test]
    fn events_while_not_joined_are_discarded() {
        let mut s = host_session();
        let envelope = SignalEnvelope {
            from: "b".into(),
            to: Some("a".into()),
            payload: SignalPayload::offer(b"sdp".to_vec()),
            timestamp_ms: 100_000,
        };
        let actions = s.handle(SessionEvent::SignalReceived(envelope)).unwrap();
        assert!(actions.is_empty());
    }

    #[test]
    fn close_room_cascades() {
        let mut host = host_session();
        host.join(Vec::new(), false).unwrap();
        host.handle(SessionEvent::RosterEntryUpdated { user_id: "b".into(), entry: entry(false) })
            .unwrap();

        let actions = host.close_room().unwrap();
        assert!(actions.contains(&SessionAction::RemoveRoom));
        assert!(actions.contains(&SessionAction::ReleaseCapture));
        assert!(!host.is_joined());
    }
}
