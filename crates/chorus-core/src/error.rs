//! Core error types.
//!
//! Authorization checks run locally before any relay write is issued, so
//! a violation never leaves partial state behind.

use thiserror::Error;

/// A host-only action attempted by a non-host, or a downgrade attempted
/// against the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AuthorizationViolation {
    /// The acting participant is not the room host.
    #[error("only the host may {operation}")]
    HostOnly {
        /// Operation that was attempted.
        operation: &'static str,
    },

    /// The host's speaker status is fixed and cannot be removed.
    #[error("the host cannot be downgraded to listener")]
    HostImmutable,
}
