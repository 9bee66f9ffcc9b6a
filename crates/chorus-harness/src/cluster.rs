//! Deterministic voice-room cluster simulation.
//!
//! Drives N pure [`RoomSession`] state machines against one shared
//! [`RelayStore`] and a synchronous media-transport model, with every
//! event routed in-order on a single queue. No async runtime, no real
//! transports: the whole mesh negotiation settles deterministically so
//! tests can assert on exact final states and check invariants between
//! steps.
//!
//! The media model mirrors how pairwise audio transports behave at the
//! granularity the coordinator observes: an initiator emits an offer,
//! feeding an offer produces an answer plus the remote track, feeding an
//! answer produces the remote track, and closing a transport surfaces a
//! close on the other side.

use std::collections::{HashMap, HashSet, VecDeque};

use bytes::Bytes;
use chorus_client::{
    LocalProfile, RoomSession, SessionAction, SessionError, SessionEvent,
    driver::RelayNotification,
};
use chorus_core::{Environment, VadConfig};
use chorus_proto::{
    CommentEntry, MicRequest, ParticipantEntry, ParticipantId, PathKind, RoomPaths, SignalEnvelope,
    SignalKind, SignalPayload, WelcomeEvent, decode, encode,
};
use chorus_relay::{RelayStore, SubscriberId};
use tracing::warn;

use crate::{
    invariants::{ClientSnapshot, InvariantRegistry, SystemSnapshot},
    sim_env::{SimEnv, SimInstant},
};

/// One simulated participant: a session plus its fake I/O surfaces.
struct SimClient {
    id: ParticipantId,
    sub: SubscriberId,
    session: RoomSession<SimEnv>,
    /// Open media transports, keyed by remote id.
    transports: HashSet<ParticipantId>,
    /// Attached output sinks, keyed by remote id.
    sinks: HashSet<ParticipantId>,
    /// State of the outgoing mic track.
    mic_enabled: bool,
    /// Whether the capture device is held.
    capturing: bool,
    /// Comments delivered to this client's application layer.
    comments: Vec<CommentEntry>,
    /// Welcome events delivered to this client's application layer.
    welcomes: Vec<WelcomeEvent>,
}

/// Simulated cluster of voice-room participants sharing one relay.
pub struct VoiceCluster {
    /// Shared simulation environment (virtual clock, seeded RNG).
    pub env: SimEnv,
    paths: RoomPaths,
    host_id: ParticipantId,
    store: RelayStore,
    clients: Vec<SimClient>,
    sub_index: HashMap<SubscriberId, usize>,
    queue: VecDeque<(usize, SessionEvent<SimInstant>)>,
    registry: InvariantRegistry,
}

impl VoiceCluster {
    /// Cluster with one client per id in `participants`; the first id is
    /// the host.
    ///
    /// # Panics
    ///
    /// Panics if `participants` is empty.
    pub fn new(seed: u64, room_id: &str, participants: &[&str]) -> Self {
        assert!(!participants.is_empty(), "cluster needs at least a host");
        let env = SimEnv::with_seed(seed);
        let host_id = participants[0].to_string();

        let mut store = RelayStore::new();
        let mut clients = Vec::new();
        let mut sub_index = HashMap::new();
        for (i, id) in participants.iter().enumerate() {
            let sub = store.register();
            sub_index.insert(sub, i);
            let profile =
                LocalProfile { display_name: format!("{id} name"), avatar_ref: None };
            clients.push(SimClient {
                id: (*id).to_string(),
                sub,
                session: RoomSession::new(
                    env.clone(),
                    room_id,
                    host_id.clone(),
                    *id,
                    profile,
                    VadConfig::default(),
                ),
                transports: HashSet::new(),
                sinks: HashSet::new(),
                mic_enabled: false,
                capturing: false,
                comments: Vec::new(),
                welcomes: Vec::new(),
            });
        }

        Self {
            env,
            paths: RoomPaths::new(room_id),
            host_id,
            store,
            clients,
            sub_index,
            queue: VecDeque::new(),
            registry: InvariantRegistry::standard(),
        }
    }

    /// Host creates the room's durable records.
    pub fn create_room(&mut self, topic: &str, auto_grant: bool) -> Result<(), SessionError> {
        let actions = self.clients[0].session.create_room(topic, auto_grant)?;
        self.execute(0, actions);
        self.pump();
        Ok(())
    }

    /// Client `idx` joins the room, replicating the production join
    /// sequence: acquire capture, snapshot the roster and the auto-grant
    /// flag, subscribe, then run the session's join actions.
    pub fn join(&mut self, idx: usize) -> Result<(), SessionError> {
        self.clients[idx].capturing = true;

        let auto_grant = match self.store.get(&self.paths.auto_grant()) {
            Some(bytes) => decode(&bytes)?,
            None => false,
        };

        let mut snapshot: Vec<(ParticipantId, ParticipantEntry)> = Vec::new();
        for (path, bytes) in self.store.snapshot(&self.paths.participants()) {
            if let Ok(Some(PathKind::Participant(user_id))) = self.paths.classify(&path) {
                snapshot.push((user_id, decode(&bytes)?));
            }
        }

        let sub = self.clients[idx].sub;
        let mut replay = self.store.subscribe(sub, &self.paths.participants());
        replay.extend(self.store.subscribe(sub, &self.paths.auto_grant()));
        replay.extend(self.store.subscribe_append(sub, &self.paths.signals()));
        replay.extend(self.store.subscribe_append(sub, &self.paths.comments()));
        replay.extend(self.store.subscribe_append(sub, &self.paths.welcome_events()));
        if self.clients[idx].session.is_host() {
            replay.extend(self.store.subscribe(sub, &self.paths.mic_requests()));
        }

        let actions = match self.clients[idx].session.join(snapshot, auto_grant) {
            Ok(actions) => actions,
            Err(err) => {
                self.clients[idx].capturing = false;
                return Err(err);
            },
        };
        self.execute(idx, actions);
        for notification in replay {
            self.enqueue_notification(idx, notification);
        }
        self.pump();
        Ok(())
    }

    /// Client `idx` leaves the room, cancelling its subscriptions the way
    /// the production driver does.
    pub fn leave(&mut self, idx: usize) {
        let was_joined = self.clients[idx].session.is_joined();
        let actions = self.clients[idx].session.leave();
        self.execute(idx, actions);
        if was_joined {
            let sub = self.clients[idx].sub;
            self.store.unsubscribe(sub, &self.paths.participants());
            self.store.unsubscribe(sub, &self.paths.auto_grant());
            if self.clients[idx].session.is_host() {
                self.store.unsubscribe(sub, &self.paths.mic_requests());
            }
            self.store.unsubscribe_append(sub, &self.paths.signals());
            self.store.unsubscribe_append(sub, &self.paths.comments());
            self.store.unsubscribe_append(sub, &self.paths.welcome_events());
        }
        self.pump();
    }

    /// Client `idx` requests the microphone.
    pub fn request_mic(&mut self, idx: usize) -> Result<(), SessionError> {
        let actions = self.clients[idx].session.request_mic()?;
        self.execute(idx, actions);
        self.pump();
        Ok(())
    }

    /// Client `idx` grants `user` the microphone.
    pub fn grant_mic(&mut self, idx: usize, user: &str) -> Result<(), SessionError> {
        let actions = self.clients[idx].session.grant_mic(user)?;
        self.execute(idx, actions);
        self.pump();
        Ok(())
    }

    /// Client `idx` revokes `user`'s microphone.
    pub fn revoke_mic(&mut self, idx: usize, user: &str) -> Result<(), SessionError> {
        let actions = self.clients[idx].session.revoke_mic(user)?;
        self.execute(idx, actions);
        self.pump();
        Ok(())
    }

    /// Client `idx` steps down to listener.
    pub fn step_down(&mut self, idx: usize) -> Result<(), SessionError> {
        let actions = self.clients[idx].session.step_down()?;
        self.execute(idx, actions);
        self.pump();
        Ok(())
    }

    /// Client `idx` sets its mute flag.
    pub fn set_muted(&mut self, idx: usize, muted: bool) -> Result<(), SessionError> {
        let actions = self.clients[idx].session.set_muted(muted)?;
        self.execute(idx, actions);
        self.pump();
        Ok(())
    }

    /// Client `idx` posts a comment.
    pub fn post_comment(
        &mut self,
        idx: usize,
        body: chorus_proto::CommentBody,
    ) -> Result<(), SessionError> {
        let actions = self.clients[idx].session.post_comment(body)?;
        self.execute(idx, actions);
        self.pump();
        Ok(())
    }

    /// Client `idx` changes the room topic.
    pub fn set_topic(&mut self, idx: usize, topic: &str) -> Result<(), SessionError> {
        let actions = self.clients[idx].session.set_topic(topic)?;
        self.execute(idx, actions);
        self.pump();
        Ok(())
    }

    /// Client `idx` toggles auto-grant.
    pub fn set_auto_grant(&mut self, idx: usize, enabled: bool) -> Result<(), SessionError> {
        let actions = self.clients[idx].session.set_auto_grant(enabled)?;
        self.execute(idx, actions);
        self.pump();
        Ok(())
    }

    /// Client `idx` destroys the room.
    pub fn close_room(&mut self, idx: usize) -> Result<(), SessionError> {
        let actions = self.clients[idx].session.close_room()?;
        self.execute(idx, actions);
        self.pump();
        Ok(())
    }

    /// Feed one capture frame into client `idx`'s VAD at the current
    /// virtual time.
    pub fn audio_frame(&mut self, idx: usize, energy: f32) {
        let now = self.env.now();
        self.dispatch(idx, SessionEvent::AudioFrame { energy, now });
        self.pump();
    }

    /// Fail the media transport between client `idx` and `remote`, as a
    /// network fault would.
    pub fn fail_transport(&mut self, idx: usize, remote: &str) {
        self.clients[idx].transports.remove(remote);
        self.dispatch(idx, SessionEvent::TransportError {
            remote_id: remote.to_string(),
            reason: "simulated transport fault".to_string(),
        });
        self.pump();
    }

    /// The session of client `idx`, for assertions.
    pub fn session(&self, idx: usize) -> &RoomSession<SimEnv> {
        &self.clients[idx].session
    }

    /// Open media transports of client `idx`.
    pub fn transports(&self, idx: usize) -> &HashSet<ParticipantId> {
        &self.clients[idx].transports
    }

    /// Whether client `idx`'s outgoing mic track is live.
    pub fn mic_enabled(&self, idx: usize) -> bool {
        self.clients[idx].mic_enabled
    }

    /// Whether client `idx` holds the capture device.
    pub fn capturing(&self, idx: usize) -> bool {
        self.clients[idx].capturing
    }

    /// Comments delivered to client `idx`.
    pub fn comments(&self, idx: usize) -> &[CommentEntry] {
        &self.clients[idx].comments
    }

    /// Welcome events delivered to client `idx`.
    pub fn welcomes(&self, idx: usize) -> &[WelcomeEvent] {
        &self.clients[idx].welcomes
    }

    /// Direct access to the shared store, for injecting raw writes.
    pub fn store(&mut self) -> &mut RelayStore {
        &mut self.store
    }

    /// Inject a raw signal envelope into the room's signal stream, as a
    /// misbehaving or stale peer would.
    pub fn inject_signal(&mut self, envelope: &SignalEnvelope) {
        if let Ok(bytes) = encode(envelope) {
            let routed = self.store.append(&self.paths.signals(), Bytes::from(bytes));
            self.route(routed);
            self.pump();
        }
    }

    /// Extract the cluster's observable state.
    pub fn snapshot(&self) -> SystemSnapshot {
        let clients = self
            .clients
            .iter()
            .map(|client| ClientSnapshot {
                id: client.id.clone(),
                joined: client.session.is_joined(),
                is_host: client.session.is_host(),
                connections: client.session.connections().peer_ids().cloned().collect(),
                sinks: client.session.connections().sink_ids().cloned().collect(),
                roster: client
                    .session
                    .roster()
                    .iter()
                    .map(|(id, entry)| (id.clone(), entry.clone()))
                    .collect(),
                pending: client.session.pending_requests().keys().cloned().collect(),
                mic_enabled: client.mic_enabled,
                capturing: client.capturing,
            })
            .collect();
        SystemSnapshot { host_id: self.host_id.clone(), clients }
    }

    /// Check all standard invariants, panicking with `context` on
    /// violation.
    pub fn check_invariants(&self, context: &str) {
        self.registry.assert_all(&self.snapshot(), context);
    }

    fn index_of(&self, id: &str) -> Option<usize> {
        self.clients.iter().position(|c| c.id == id)
    }

    fn dispatch(&mut self, idx: usize, event: SessionEvent<SimInstant>) {
        match self.clients[idx].session.handle(event) {
            Ok(actions) => self.execute(idx, actions),
            Err(err) => warn!(client = %self.clients[idx].id, %err, "event rejected"),
        }
    }

    /// Drain the event queue until the cluster is quiescent.
    fn pump(&mut self) {
        while let Some((idx, event)) = self.queue.pop_front() {
            self.dispatch(idx, event);
        }
    }

    fn execute(&mut self, idx: usize, actions: Vec<SessionAction>) {
        for action in actions {
            self.execute_one(idx, action);
        }
    }

    fn execute_one(&mut self, idx: usize, action: SessionAction) {
        let self_id = self.clients[idx].id.clone();
        match action {
            SessionAction::PublishSelfEntry(entry) => {
                self.write(&self.paths.participant(&self_id), &entry);
            },
            SessionAction::RemoveSelfEntry => {
                let routed = self.store.remove(&self.paths.participant(&self_id));
                self.route(routed);
            },
            SessionAction::PublishEntry { user_id, entry } => {
                self.write(&self.paths.participant(&user_id), &entry);
            },
            SessionAction::SendSignal(envelope) => {
                self.append(&self.paths.signals(), &envelope);
            },
            SessionAction::PublishMicRequest(request) => {
                self.write(&self.paths.mic_request(&request.user_id), &request);
            },
            SessionAction::RemoveMicRequest { user_id } => {
                let routed = self.store.remove(&self.paths.mic_request(&user_id));
                self.route(routed);
            },
            SessionAction::PublishAutoGrant(enabled) => {
                self.write(&self.paths.auto_grant(), &enabled);
            },
            SessionAction::PublishConfig(config) => {
                self.write(&self.paths.config(), &config);
            },
            SessionAction::AppendComment(comment) => {
                self.append(&self.paths.comments(), &comment);
            },
            SessionAction::AppendWelcome(welcome) => {
                self.append(&self.paths.welcome_events(), &welcome);
            },
            SessionAction::RemoveRoom => {
                let routed = self.store.remove(&self.paths.root());
                self.route(routed);
            },
            SessionAction::OpenTransport { remote_id, initiator } => {
                self.clients[idx].transports.insert(remote_id.clone());
                if initiator {
                    let data = format!("offer:{self_id}->{remote_id}").into_bytes();
                    self.queue.push_back((idx, SessionEvent::TransportSignal {
                        remote_id,
                        payload: SignalPayload::offer(data),
                    }));
                }
            },
            SessionAction::FeedTransport { remote_id, payload } => {
                if !self.clients[idx].transports.contains(&remote_id) {
                    return;
                }
                match payload.kind {
                    SignalKind::Offer => {
                        let data = format!("answer:{self_id}->{remote_id}").into_bytes();
                        self.queue.push_back((idx, SessionEvent::TransportSignal {
                            remote_id: remote_id.clone(),
                            payload: SignalPayload::answer(data),
                        }));
                        self.queue
                            .push_back((idx, SessionEvent::TrackReceived { remote_id }));
                    },
                    SignalKind::Answer => {
                        self.queue
                            .push_back((idx, SessionEvent::TrackReceived { remote_id }));
                    },
                    SignalKind::Candidate => {},
                }
            },
            SessionAction::CloseTransport { remote_id } => {
                self.clients[idx].transports.remove(&remote_id);
                if let Some(remote_idx) = self.index_of(&remote_id) {
                    if self.clients[remote_idx].transports.remove(&self_id) {
                        self.queue.push_back((remote_idx, SessionEvent::TransportClosed {
                            remote_id: self_id,
                        }));
                    }
                }
            },
            SessionAction::AttachSink { remote_id } => {
                self.clients[idx].sinks.insert(remote_id);
            },
            SessionAction::ReleaseSink { remote_id } => {
                self.clients[idx].sinks.remove(&remote_id);
            },
            SessionAction::SetMicEnabled(enabled) => {
                self.clients[idx].mic_enabled = enabled;
            },
            SessionAction::ReleaseCapture => {
                self.clients[idx].capturing = false;
            },
            SessionAction::DeliverComment(comment) => {
                self.clients[idx].comments.push(comment);
            },
            SessionAction::DeliverWelcome(welcome) => {
                self.clients[idx].welcomes.push(welcome);
            },
            SessionAction::RosterChanged => {},
        }
    }

    fn write<T: serde::Serialize>(&mut self, path: &str, value: &T) {
        match encode(value) {
            Ok(bytes) => {
                let routed = self.store.publish(path, Bytes::from(bytes));
                self.route(routed);
            },
            Err(err) => warn!(%path, %err, "encode failed"),
        }
    }

    fn append<T: serde::Serialize>(&mut self, path: &str, value: &T) {
        match encode(value) {
            Ok(bytes) => {
                let routed = self.store.append(path, Bytes::from(bytes));
                self.route(routed);
            },
            Err(err) => warn!(%path, %err, "encode failed"),
        }
    }

    fn route(&mut self, routed: Vec<(SubscriberId, RelayNotification)>) {
        for (sub, notification) in routed {
            if let Some(&idx) = self.sub_index.get(&sub) {
                self.enqueue_notification(idx, notification);
            }
        }
    }

    /// Translate a relay notification into a session event, mirroring the
    /// production driver's routing.
    fn enqueue_notification(&mut self, idx: usize, notification: RelayNotification) {
        let event = match notification {
            RelayNotification::Set { path, value } => match self.paths.classify(&path) {
                Ok(Some(PathKind::Participant(user_id))) => decode::<ParticipantEntry>(&value)
                    .ok()
                    .map(|entry| SessionEvent::RosterEntryUpdated { user_id, entry }),
                Ok(Some(PathKind::MicRequest(_))) => {
                    decode::<MicRequest>(&value).ok().map(SessionEvent::MicRequestQueued)
                },
                Ok(Some(PathKind::AutoGrant)) => {
                    decode::<bool>(&value).ok().map(SessionEvent::AutoGrantChanged)
                },
                _ => None,
            },
            RelayNotification::Removed { path } => match self.paths.classify(&path) {
                Ok(Some(PathKind::Participant(user_id))) => {
                    Some(SessionEvent::RosterEntryRemoved { user_id })
                },
                Ok(Some(PathKind::MicRequest(user_id))) => {
                    Some(SessionEvent::MicRequestRemoved { user_id })
                },
                _ => None,
            },
            RelayNotification::Appended { path, value } => match self.paths.classify(&path) {
                Ok(Some(PathKind::Signals)) => {
                    decode::<SignalEnvelope>(&value).ok().map(SessionEvent::SignalReceived)
                },
                Ok(Some(PathKind::Comments)) => {
                    decode::<CommentEntry>(&value).ok().map(SessionEvent::CommentAppended)
                },
                Ok(Some(PathKind::WelcomeEvents)) => {
                    decode::<WelcomeEvent>(&value).ok().map(SessionEvent::WelcomeAppended)
                },
                _ => None,
            },
        };
        if let Some(event) = event {
            self.queue.push_back((idx, event));
        }
    }
}
