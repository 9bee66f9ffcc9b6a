//! Runtime-free domain logic for Chorus voice rooms.
//!
//! Everything here is a pure state machine or read-model: time is passed
//! in as a parameter (via the [`env::Environment`] abstraction), no I/O
//! happens, and no locks are needed because the session coordinator runs
//! on one logical thread.

pub mod env;
pub mod error;
pub mod mic;
pub mod roster;
pub mod vad;

pub use env::{Environment, SystemEnv};
pub use error::AuthorizationViolation;
pub use mic::{MicPolicy, MicState};
pub use roster::Roster;
pub use vad::{VadConfig, VoiceActivityDetector};
