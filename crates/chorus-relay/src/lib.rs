//! Chorus signaling relay.
//!
//! The relay is a routing-only node: a hierarchical store of opaque
//! values and append streams that clients use for roster sync, connection
//! negotiation, and side channels. It never deserializes values and holds
//! no protocol logic; everything it knows about the voice-room protocol
//! is the path namespace clients agree on.
//!
//! # Components
//!
//! - [`RelayStore`]: Synchronous store core with subscription routing
//! - [`LocalRelayHub`] / [`LocalRelay`]: In-process async relay for
//!   production-shaped wiring and integration tests

#![forbid(unsafe_code)]
#![deny(missing_docs)]

mod local;
mod store;

pub use local::{LocalRelay, LocalRelayHub};
pub use store::{RelayStore, Routed, SubscriberId};
