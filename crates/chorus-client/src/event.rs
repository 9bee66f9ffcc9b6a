//! Session events and actions.

use chorus_proto::{
    CommentEntry, MicRequest, ParticipantEntry, ParticipantId, RoomConfig, SignalEnvelope,
    SignalPayload, WelcomeEvent,
};

/// Events the driver feeds into the session.
///
/// The driver is responsible for:
/// - Translating relay notifications into roster/signal/queue events
/// - Forwarding media transport callbacks
/// - Pumping capture frames into the VAD
///
/// Generic over `I` (Instant type) to support both production
/// (`std::time::Instant`) and simulation (virtual time) environments.
#[derive(Debug, Clone)]
pub enum SessionEvent<I = std::time::Instant> {
    /// A roster entry was written (created or updated).
    RosterEntryUpdated {
        /// Entry owner.
        user_id: ParticipantId,
        /// The observed entry value.
        entry: ParticipantEntry,
    },

    /// A roster entry was removed - that participant left.
    RosterEntryRemoved {
        /// Entry owner.
        user_id: ParticipantId,
    },

    /// A signal envelope appeared on the room's signal stream.
    ///
    /// Envelopes not addressed to us and envelopes older than the
    /// validity window are discarded here.
    SignalReceived(SignalEnvelope),

    /// The local media transport produced an outbound negotiation
    /// payload for a peer.
    TransportSignal {
        /// Peer the payload is for.
        remote_id: ParticipantId,
        /// The payload to relay.
        payload: SignalPayload,
    },

    /// A peer's audio track arrived.
    TrackReceived {
        /// Peer whose audio arrived.
        remote_id: ParticipantId,
    },

    /// A peer transport failed.
    TransportError {
        /// The failing peer.
        remote_id: ParticipantId,
        /// Transport error text.
        reason: String,
    },

    /// A peer transport closed from the remote side.
    TransportClosed {
        /// The closed peer.
        remote_id: ParticipantId,
    },

    /// A mic request was written to the queue.
    MicRequestQueued(MicRequest),

    /// A mic request was removed from the queue.
    MicRequestRemoved {
        /// Requesting user whose entry disappeared.
        user_id: ParticipantId,
    },

    /// The host toggled auto-grant.
    AutoGrantChanged(bool),

    /// A comment was appended to the room log.
    CommentAppended(CommentEntry),

    /// A welcome event was appended to the room log.
    WelcomeAppended(WelcomeEvent),

    /// One capture frame's energy measure, driving the VAD.
    AudioFrame {
        /// Normalized [0, 1] frame energy.
        energy: f32,
        /// Frame time from the environment.
        now: I,
    },
}

/// Actions the session produces for the driver to execute.
///
/// Relay writes are typed here and CBOR-encoded at the driver boundary,
/// so the pure state machine never deals in bytes.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionAction {
    /// Write our own roster entry.
    PublishSelfEntry(ParticipantEntry),

    /// Delete our own roster entry (leaving).
    RemoveSelfEntry,

    /// Host write to another participant's entry (grant/revoke).
    PublishEntry {
        /// Entry owner.
        user_id: ParticipantId,
        /// New entry value.
        entry: ParticipantEntry,
    },

    /// Append a signal envelope to the room's signal stream.
    SendSignal(SignalEnvelope),

    /// Write our pending mic request (overwrites any prior one).
    PublishMicRequest(MicRequest),

    /// Remove a pending mic request from the queue.
    RemoveMicRequest {
        /// Requesting user.
        user_id: ParticipantId,
    },

    /// Host write of the auto-grant flag.
    PublishAutoGrant(bool),

    /// Write the room configuration record.
    PublishConfig(RoomConfig),

    /// Append a comment to the room log.
    AppendComment(CommentEntry),

    /// Append a welcome event to the room log.
    AppendWelcome(WelcomeEvent),

    /// Remove the whole room subtree (host destroying the room).
    RemoveRoom,

    /// Create a media transport toward a peer.
    OpenTransport {
        /// The peer to connect.
        remote_id: ParticipantId,
        /// Whether we propose (joiner) or answer (existing participant).
        initiator: bool,
    },

    /// Feed an inbound negotiation payload into a peer's transport.
    FeedTransport {
        /// The peer's transport.
        remote_id: ParticipantId,
        /// Inbound payload.
        payload: SignalPayload,
    },

    /// Destroy a peer's transport.
    CloseTransport {
        /// The peer to disconnect.
        remote_id: ParticipantId,
    },

    /// Route a peer's audio to its output sink (idempotent: replaces the
    /// sink's source rather than duplicating it).
    AttachSink {
        /// The peer whose audio to attach.
        remote_id: ParticipantId,
    },

    /// Release a peer's output sink.
    ReleaseSink {
        /// The peer whose sink to release.
        remote_id: ParticipantId,
    },

    /// Enable or disable the outgoing microphone track.
    ///
    /// The track is live exactly while the local participant is an
    /// unmuted speaker; listeners stay mesh-connected with the track
    /// disabled.
    SetMicEnabled(bool),

    /// Stop all capture tracks and release the device.
    ReleaseCapture,

    /// Deliver a fresh comment to the application layer.
    DeliverComment(CommentEntry),

    /// Deliver a fresh welcome event to the application layer.
    DeliverWelcome(WelcomeEvent),

    /// The local roster view changed; the application may re-render.
    RosterChanged,
}
