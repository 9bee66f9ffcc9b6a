//! Client
//!
//! Room session coordinator for the Chorus voice-room protocol. Manages
//! the pairwise peer connection mesh, roster synchronization, speaker
//! authorization, and voice activity publishing for one participant.
//!
//! # Architecture
//!
//! The coordinator follows the same Sans-IO and action-based patterns as
//! [`chorus_core`]. The [`RoomSession`] receives events ([`SessionEvent`])
//! from the relay, the media transports, and the capture device,
//! processes them through pure state machine logic, and returns actions
//! ([`SessionAction`]) for the driver to execute.
//!
//! # Components
//!
//! - [`RoomSession`]: Top-level state machine for one participant
//! - [`PeerConnectionManager`]: The pairwise connection mesh
//! - [`PeerConnection`]: One remote participant's connection record
//! - [`Runtime`]: Async event loop binding a session to its I/O
//! - [`driver`]: Boundary traits for relay, media, and capture

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod driver;
mod error;
mod event;
mod manager;
mod peer;
mod runtime;
mod session;

pub use chorus_core::{Environment, SystemEnv};
pub use chorus_proto::{ParticipantId, RoomId};
pub use error::{DeviceError, SessionError};
pub use event::{SessionAction, SessionEvent};
pub use manager::PeerConnectionManager;
pub use peer::{PeerConnection, PeerRole, PeerState};
pub use runtime::{RoomUpdate, Runtime};
pub use session::{LocalProfile, RoomSession};
