//! Boundary traits between the session state machine and the outside
//! world.
//!
//! Protocol logic stays in the Sans-IO [`crate::RoomSession`]; these
//! traits cover the three I/O surfaces it is driven by:
//!
//! - [`SignalingRelay`]: the shared hierarchical key/value + append-stream
//!   store used for roster sync, signaling, and side channels.
//! - [`MediaEngine`]: pairwise audio transports (negotiation in, tracks
//!   and faults out).
//! - [`AudioCapture`]: the local microphone, reduced to per-frame energy.
//!
//! Implementations are async; the [`crate::Runtime`] multiplexes their
//! event streams into [`crate::SessionEvent`]s.

use async_trait::async_trait;
use bytes::Bytes;
use chorus_proto::{ParticipantId, SignalPayload};
use thiserror::Error;

/// Relay connectivity or storage failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RelayError {
    /// The relay connection is gone; the session runs degraded until the
    /// application tears it down.
    #[error("relay disconnected")]
    Disconnected,

    /// The relay rejected or failed an operation.
    #[error("relay fault: {0}")]
    Fault(String),
}

/// One observed change on a subscribed relay path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayNotification {
    /// A value was written (created or updated).
    Set {
        /// Full path of the value.
        path: String,
        /// Encoded value bytes.
        value: Bytes,
    },
    /// A value (or subtree root) was removed.
    Removed {
        /// Full path of the removed value.
        path: String,
    },
    /// An entry was appended to a stream.
    Appended {
        /// Full path of the stream.
        path: String,
        /// Encoded entry bytes.
        value: Bytes,
    },
}

/// Shared hierarchical store with value and append-stream semantics.
///
/// Paths are `/`-separated; removing a path removes its whole subtree.
/// Value subscriptions replay the current value immediately; append
/// subscriptions replay at most the single most recent entry. All
/// notifications for one path arrive in write order.
#[async_trait]
pub trait SignalingRelay: Send + Sync {
    /// Write a value at `path`, creating or overwriting.
    async fn publish(&self, path: &str, value: Bytes) -> Result<(), RelayError>;

    /// Append an entry to the stream at `path`.
    async fn append(&self, path: &str, value: Bytes) -> Result<(), RelayError>;

    /// Remove `path` and everything beneath it.
    async fn remove(&self, path: &str) -> Result<(), RelayError>;

    /// Read the current value at `path`, if any.
    async fn get(&self, path: &str) -> Result<Option<Bytes>, RelayError>;

    /// Read all direct children of `prefix` as `(path, value)` pairs.
    async fn snapshot(&self, prefix: &str) -> Result<Vec<(String, Bytes)>, RelayError>;

    /// Subscribe to value changes at `path` and its direct children.
    async fn subscribe(&self, path: &str) -> Result<(), RelayError>;

    /// Subscribe to appends on the stream at `path`.
    async fn subscribe_append(&self, path: &str) -> Result<(), RelayError>;

    /// Drop the value subscription at `path`.
    async fn unsubscribe(&self, path: &str) -> Result<(), RelayError>;

    /// Drop the append subscription at `path`.
    async fn unsubscribe_append(&self, path: &str) -> Result<(), RelayError>;

    /// Next notification across all subscriptions. `None` means the relay
    /// connection closed.
    async fn recv(&mut self) -> Option<RelayNotification>;
}

/// Event surfaced by a peer media transport.
#[derive(Debug, Clone)]
pub enum MediaEvent {
    /// The transport produced an outbound negotiation payload.
    Signal {
        /// The peer being negotiated with.
        remote_id: ParticipantId,
        /// Payload to relay to that peer.
        payload: SignalPayload,
    },
    /// The remote party's audio track arrived.
    Track {
        /// The peer whose audio arrived.
        remote_id: ParticipantId,
    },
    /// The transport failed.
    Error {
        /// The failing peer.
        remote_id: ParticipantId,
        /// Transport error text.
        reason: String,
    },
    /// The remote side closed the transport.
    Closed {
        /// The closed peer.
        remote_id: ParticipantId,
    },
}

/// Pairwise audio transport engine.
///
/// One transport per remote participant, keyed by id. Commands are
/// fire-and-forget; outcomes come back through [`MediaEngine::recv`].
#[async_trait]
pub trait MediaEngine: Send + Sync {
    /// Create the transport toward `remote_id`. An initiator proposes the
    /// session; a responder waits for the remote proposal.
    async fn open(&mut self, remote_id: &str, initiator: bool);

    /// Feed an inbound negotiation payload into a transport.
    async fn feed(&mut self, remote_id: &str, payload: SignalPayload);

    /// Destroy a transport.
    async fn close(&mut self, remote_id: &str);

    /// Route a peer's audio to its output sink. Re-attaching replaces the
    /// source.
    async fn attach_sink(&mut self, remote_id: &str);

    /// Release a peer's output sink.
    async fn release_sink(&mut self, remote_id: &str);

    /// Enable or disable the outgoing microphone track on every
    /// transport.
    async fn set_mic_enabled(&mut self, enabled: bool);

    /// Next event from any transport. `None` means the engine shut down.
    async fn recv(&mut self) -> Option<MediaEvent>;
}

/// One capture frame reduced to its energy measure.
#[derive(Debug, Clone, Copy)]
pub struct AudioFrame {
    /// Normalized [0, 1] frame energy.
    pub energy: f32,
}

/// Local microphone capture.
#[async_trait]
pub trait AudioCapture: Send + Sync {
    /// Acquire the device. Failure aborts the join.
    async fn acquire(&mut self) -> Result<(), crate::DeviceError>;

    /// Next capture frame. `None` while the device is not acquired or
    /// after it was released.
    async fn next_frame(&mut self) -> Option<AudioFrame>;

    /// Stop all tracks and release the device.
    async fn release(&mut self);
}
