//! Async driver for the room session.
//!
//! Owns the relay, media engine, and capture implementations and pumps
//! their event streams through the Sans-IO [`RoomSession`]. All protocol
//! decisions happen in the session; this layer only translates bytes and
//! executes actions.
//!
//! Per-event faults (malformed values, failed relay writes after join)
//! are logged and the loop continues: one bad envelope must never take
//! the session down. Faults during `join` itself propagate, because the
//! caller can still abort cleanly at that point.

use chorus_core::Environment;
use chorus_proto::{
    CommentEntry, MicRequest, ParticipantEntry, ParticipantId, PathKind, SignalEnvelope,
    WelcomeEvent, decode, encode,
};
use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::{
    driver::{AudioCapture, MediaEngine, MediaEvent, RelayError, RelayNotification, SignalingRelay},
    error::SessionError,
    event::{SessionAction, SessionEvent},
    session::RoomSession,
};

/// Update surfaced to the embedding application.
#[derive(Debug, Clone)]
pub enum RoomUpdate {
    /// A fresh comment arrived.
    Comment(CommentEntry),
    /// A participant joined (their welcome event arrived fresh).
    Welcome(WelcomeEvent),
    /// The roster view changed; re-render participant lists.
    RosterChanged,
}

/// Session plus its I/O implementations, driven as one event loop.
pub struct Runtime<E, R, M, C>
where
    E: Environment,
    R: SignalingRelay,
    M: MediaEngine,
    C: AudioCapture,
{
    env: E,
    session: RoomSession<E>,
    relay: R,
    media: M,
    capture: C,
    capturing: bool,
    updates: mpsc::UnboundedSender<RoomUpdate>,
}

impl<E, R, M, C> Runtime<E, R, M, C>
where
    E: Environment,
    R: SignalingRelay,
    M: MediaEngine,
    C: AudioCapture,
{
    /// Bundle a session with its I/O implementations. Application-facing
    /// updates (comments, welcomes, roster changes) are delivered on the
    /// returned receiver.
    pub fn new(
        env: E,
        session: RoomSession<E>,
        relay: R,
        media: M,
        capture: C,
    ) -> (Self, mpsc::UnboundedReceiver<RoomUpdate>) {
        let (updates, updates_rx) = mpsc::unbounded_channel();
        (Self { env, session, relay, media, capture, capturing: false, updates }, updates_rx)
    }

    /// The session state machine (read access for inspection).
    pub fn session(&self) -> &RoomSession<E> {
        &self.session
    }

    /// Host-only: create the room's durable records on the relay.
    pub async fn create_room(
        &mut self,
        topic: impl Into<String>,
        auto_grant: bool,
    ) -> Result<(), SessionError> {
        let actions = self.session.create_room(topic, auto_grant)?;
        self.execute_all(actions, true).await
    }

    /// Join the room.
    ///
    /// Capture is acquired first so a device failure aborts with no relay
    /// footprint. Then the roster and auto-grant flag are snapshotted,
    /// subscriptions are registered, and the session's join actions run.
    pub async fn join(&mut self) -> Result<(), SessionError> {
        self.capture.acquire().await?;
        self.capturing = true;

        let result = self.join_inner().await;
        if result.is_err() {
            self.capture.release().await;
            self.capturing = false;
        }
        result
    }

    async fn join_inner(&mut self) -> Result<(), SessionError> {
        let paths = self.session.paths().clone();

        let auto_grant = match self.relay.get(&paths.auto_grant()).await.map_err(relay_fault)? {
            Some(bytes) => decode(&bytes)?,
            None => false,
        };

        let mut snapshot: Vec<(ParticipantId, ParticipantEntry)> = Vec::new();
        for (path, bytes) in
            self.relay.snapshot(&paths.participants()).await.map_err(relay_fault)?
        {
            match paths.classify(&path) {
                Ok(Some(PathKind::Participant(user_id))) => {
                    snapshot.push((user_id, decode(&bytes)?));
                },
                Ok(_) => {},
                Err(err) => {
                    warn!(%path, %err, "ignoring malformed roster path in snapshot");
                },
            }
        }

        self.relay.subscribe(&paths.participants()).await.map_err(relay_fault)?;
        self.relay.subscribe(&paths.auto_grant()).await.map_err(relay_fault)?;
        self.relay.subscribe_append(&paths.signals()).await.map_err(relay_fault)?;
        self.relay.subscribe_append(&paths.comments()).await.map_err(relay_fault)?;
        self.relay.subscribe_append(&paths.welcome_events()).await.map_err(relay_fault)?;
        if self.session.is_host() {
            self.relay.subscribe(&paths.mic_requests()).await.map_err(relay_fault)?;
        }

        let actions = self.session.join(snapshot, auto_grant)?;
        self.execute_all(actions, true).await
    }

    /// Leave the room, executing the session's teardown actions and
    /// cancelling every subscription registered at join time.
    pub async fn leave(&mut self) {
        let was_joined = self.session.is_joined();
        let actions = self.session.leave();
        if let Err(err) = self.execute_all(actions, false).await {
            warn!(%err, "relay writes failed during leave");
        }
        if was_joined {
            self.drop_subscriptions().await;
        }
    }

    async fn drop_subscriptions(&mut self) {
        let paths = self.session.paths().clone();
        let mut value_paths = vec![paths.participants(), paths.auto_grant()];
        if self.session.is_host() {
            value_paths.push(paths.mic_requests());
        }
        for path in value_paths {
            if let Err(err) = self.relay.unsubscribe(&path).await {
                warn!(%path, %err, "unsubscribe failed");
            }
        }
        for path in [paths.signals(), paths.comments(), paths.welcome_events()] {
            if let Err(err) = self.relay.unsubscribe_append(&path).await {
                warn!(%path, %err, "unsubscribe failed");
            }
        }
    }

    /// Request the microphone.
    pub async fn request_mic(&mut self) -> Result<(), SessionError> {
        let actions = self.session.request_mic()?;
        self.execute_all(actions, true).await
    }

    /// Host-only: grant a pending mic request.
    pub async fn grant_mic(&mut self, user_id: &str) -> Result<(), SessionError> {
        let actions = self.session.grant_mic(user_id)?;
        self.execute_all(actions, true).await
    }

    /// Host-only: revoke a speaker back to listener.
    pub async fn revoke_mic(&mut self, user_id: &str) -> Result<(), SessionError> {
        let actions = self.session.revoke_mic(user_id)?;
        self.execute_all(actions, true).await
    }

    /// Step down from speaker to listener.
    pub async fn step_down(&mut self) -> Result<(), SessionError> {
        let actions = self.session.step_down()?;
        self.execute_all(actions, true).await
    }

    /// Set the self-owned mute flag.
    pub async fn set_muted(&mut self, muted: bool) -> Result<(), SessionError> {
        let actions = self.session.set_muted(muted)?;
        self.execute_all(actions, true).await
    }

    /// Post a comment to the room log.
    pub async fn post_comment(
        &mut self,
        body: chorus_proto::CommentBody,
    ) -> Result<(), SessionError> {
        let actions = self.session.post_comment(body)?;
        self.execute_all(actions, true).await
    }

    /// Host-only: change the room topic.
    pub async fn set_topic(&mut self, topic: impl Into<String>) -> Result<(), SessionError> {
        let actions = self.session.set_topic(topic)?;
        self.execute_all(actions, true).await
    }

    /// Host-only: toggle auto-grant.
    pub async fn set_auto_grant(&mut self, enabled: bool) -> Result<(), SessionError> {
        let actions = self.session.set_auto_grant(enabled)?;
        self.execute_all(actions, true).await
    }

    /// Host-only: destroy the room.
    pub async fn close_room(&mut self) -> Result<(), SessionError> {
        let actions = self.session.close_room()?;
        self.execute_all(actions, false).await
    }

    /// Run one event-loop iteration: wait for the next input from any of
    /// the three I/O surfaces, feed it through the session, and execute
    /// the resulting actions.
    ///
    /// Returns `false` when every input stream has ended.
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            notification = self.relay.recv() => {
                let Some(notification) = notification else {
                    warn!("relay connection closed");
                    return false;
                };
                self.dispatch_relay(notification).await;
            },
            event = self.media.recv() => {
                let Some(event) = event else {
                    debug!("media engine shut down");
                    return false;
                };
                self.dispatch_media(event).await;
            },
            frame = self.capture.next_frame(), if self.capturing => {
                let Some(frame) = frame else {
                    self.capturing = false;
                    return true;
                };
                let now = self.env.now();
                self.dispatch(SessionEvent::AudioFrame { energy: frame.energy, now }).await;
            },
        }
        true
    }

    async fn dispatch_relay(&mut self, notification: RelayNotification) {
        let paths = self.session.paths().clone();
        let event = match &notification {
            RelayNotification::Set { path, value } => match paths.classify(path) {
                Ok(Some(PathKind::Participant(user_id))) => {
                    decode::<ParticipantEntry>(value)
                        .map(|entry| SessionEvent::RosterEntryUpdated { user_id, entry })
                },
                Ok(Some(PathKind::MicRequest(_))) => {
                    decode::<MicRequest>(value).map(SessionEvent::MicRequestQueued)
                },
                Ok(Some(PathKind::AutoGrant)) => {
                    decode::<bool>(value).map(SessionEvent::AutoGrantChanged)
                },
                Ok(_) => return,
                Err(err) => {
                    warn!(%path, %err, "ignoring unroutable relay write");
                    return;
                },
            },
            RelayNotification::Removed { path } => match paths.classify(path) {
                Ok(Some(PathKind::Participant(user_id))) => {
                    Ok(SessionEvent::RosterEntryRemoved { user_id })
                },
                Ok(Some(PathKind::MicRequest(user_id))) => {
                    Ok(SessionEvent::MicRequestRemoved { user_id })
                },
                Ok(_) => return,
                Err(err) => {
                    warn!(%path, %err, "ignoring unroutable relay removal");
                    return;
                },
            },
            RelayNotification::Appended { path, value } => match paths.classify(path) {
                Ok(Some(PathKind::Signals)) => {
                    decode::<SignalEnvelope>(value).map(SessionEvent::SignalReceived)
                },
                Ok(Some(PathKind::Comments)) => {
                    decode::<CommentEntry>(value).map(SessionEvent::CommentAppended)
                },
                Ok(Some(PathKind::WelcomeEvents)) => {
                    decode::<WelcomeEvent>(value).map(SessionEvent::WelcomeAppended)
                },
                Ok(_) => return,
                Err(err) => {
                    warn!(%path, %err, "ignoring unroutable relay append");
                    return;
                },
            },
        };

        match event {
            Ok(event) => self.dispatch(event).await,
            Err(err) => warn!(%err, "dropping malformed relay value"),
        }
    }

    async fn dispatch_media(&mut self, event: MediaEvent) {
        let event = match event {
            MediaEvent::Signal { remote_id, payload } => {
                SessionEvent::TransportSignal { remote_id, payload }
            },
            MediaEvent::Track { remote_id } => SessionEvent::TrackReceived { remote_id },
            MediaEvent::Error { remote_id, reason } => {
                warn!(%remote_id, %reason, "peer transport failed");
                SessionEvent::TransportError { remote_id, reason }
            },
            MediaEvent::Closed { remote_id } => SessionEvent::TransportClosed { remote_id },
        };
        self.dispatch(event).await;
    }

    async fn dispatch(&mut self, event: SessionEvent<E::Instant>) {
        match self.session.handle(event) {
            Ok(actions) => {
                if let Err(err) = self.execute_all(actions, false).await {
                    warn!(%err, "action execution failed; session continues degraded");
                }
            },
            Err(err) => warn!(%err, "event rejected"),
        }
    }

    /// Execute actions in order. With `strict`, the first failure aborts
    /// and propagates (join-time semantics); otherwise failures are
    /// logged and the rest still run.
    async fn execute_all(
        &mut self,
        actions: Vec<SessionAction>,
        strict: bool,
    ) -> Result<(), SessionError> {
        let mut first_fault: Option<SessionError> = None;
        for action in actions {
            if let Err(err) = self.execute(action).await {
                if strict {
                    return Err(err);
                }
                warn!(%err, "action failed");
                first_fault.get_or_insert(err);
            }
        }
        match first_fault {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }

    async fn execute(&mut self, action: SessionAction) -> Result<(), SessionError> {
        let paths = self.session.paths().clone();
        let self_id = self.session.self_id().to_string();
        match action {
            SessionAction::PublishSelfEntry(entry) => {
                let bytes = encode(&entry)?;
                self.relay
                    .publish(&paths.participant(&self_id), bytes.into())
                    .await
                    .map_err(relay_fault)?;
            },
            SessionAction::RemoveSelfEntry => {
                self.relay.remove(&paths.participant(&self_id)).await.map_err(relay_fault)?;
            },
            SessionAction::PublishEntry { user_id, entry } => {
                let bytes = encode(&entry)?;
                self.relay
                    .publish(&paths.participant(&user_id), bytes.into())
                    .await
                    .map_err(relay_fault)?;
            },
            SessionAction::SendSignal(envelope) => {
                let bytes = encode(&envelope)?;
                self.relay.append(&paths.signals(), bytes.into()).await.map_err(relay_fault)?;
            },
            SessionAction::PublishMicRequest(request) => {
                let bytes = encode(&request)?;
                self.relay
                    .publish(&paths.mic_request(&request.user_id), bytes.into())
                    .await
                    .map_err(relay_fault)?;
            },
            SessionAction::RemoveMicRequest { user_id } => {
                self.relay.remove(&paths.mic_request(&user_id)).await.map_err(relay_fault)?;
            },
            SessionAction::PublishAutoGrant(enabled) => {
                let bytes = encode(&enabled)?;
                self.relay.publish(&paths.auto_grant(), bytes.into()).await.map_err(relay_fault)?;
            },
            SessionAction::PublishConfig(config) => {
                let bytes = encode(&config)?;
                self.relay.publish(&paths.config(), bytes.into()).await.map_err(relay_fault)?;
            },
            SessionAction::AppendComment(comment) => {
                let bytes = encode(&comment)?;
                self.relay.append(&paths.comments(), bytes.into()).await.map_err(relay_fault)?;
            },
            SessionAction::AppendWelcome(welcome) => {
                let bytes = encode(&welcome)?;
                self.relay
                    .append(&paths.welcome_events(), bytes.into())
                    .await
                    .map_err(relay_fault)?;
            },
            SessionAction::RemoveRoom => {
                self.relay.remove(&paths.root()).await.map_err(relay_fault)?;
            },
            SessionAction::OpenTransport { remote_id, initiator } => {
                self.media.open(&remote_id, initiator).await;
            },
            SessionAction::FeedTransport { remote_id, payload } => {
                self.media.feed(&remote_id, payload).await;
            },
            SessionAction::CloseTransport { remote_id } => {
                self.media.close(&remote_id).await;
            },
            SessionAction::AttachSink { remote_id } => {
                self.media.attach_sink(&remote_id).await;
            },
            SessionAction::ReleaseSink { remote_id } => {
                self.media.release_sink(&remote_id).await;
            },
            SessionAction::SetMicEnabled(enabled) => {
                self.media.set_mic_enabled(enabled).await;
            },
            SessionAction::ReleaseCapture => {
                self.capture.release().await;
                self.capturing = false;
            },
            SessionAction::DeliverComment(comment) => {
                let _ = self.updates.send(RoomUpdate::Comment(comment));
            },
            SessionAction::DeliverWelcome(welcome) => {
                let _ = self.updates.send(RoomUpdate::Welcome(welcome));
            },
            SessionAction::RosterChanged => {
                let _ = self.updates.send(RoomUpdate::RosterChanged);
            },
        }
        Ok(())
    }
}

fn relay_fault(err: RelayError) -> SessionError {
    SessionError::Signaling { reason: err.to_string() }
}
