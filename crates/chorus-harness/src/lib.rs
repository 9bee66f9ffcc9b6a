//! Deterministic simulation harness for the Chorus voice-room protocol.
//!
//! Drives pure [`chorus_client::RoomSession`] state machines against a
//! shared in-memory relay and a synchronous media-transport model, with
//! virtual time and seeded randomness so every run is reproducible.
//!
//! # Invariant Testing
//!
//! The `invariants` module provides behavioral testing through invariant
//! checks. Invariants verify WHAT must be true across all execution
//! paths, not specific scenarios. Use [`InvariantRegistry::standard()`]
//! for the full coordinator set, or
//! [`VoiceCluster::check_invariants`] between scenario steps.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod cluster;
pub mod invariants;
pub mod microphone;
pub mod sim_env;

pub use cluster::VoiceCluster;
pub use invariants::{
    ClientSnapshot, ConnectionsWithinRoster, HostAlwaysSpeaker, Invariant, InvariantRegistry,
    InvariantResult, PendingRequestsAreListeners, RosterConvergence, SinksWithinConnections,
    SystemSnapshot, TrackMatchesAuthorization, Violation,
};
pub use microphone::ScriptedMicrophone;
pub use sim_env::{SimEnv, SimInstant};
