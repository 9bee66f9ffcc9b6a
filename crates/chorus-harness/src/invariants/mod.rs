//! Invariant checking for deterministic simulation testing.
//!
//! Invariants are properties that must always hold during system
//! execution. Unlike example-based tests that check specific scenarios,
//! invariants verify behavioral properties across all execution paths.
//!
//! # Architecture
//!
//! The cluster extracts observable state into a [`SystemSnapshot`], then
//! runs registered [`Invariant`] checks against it. Violations trigger
//! panics with detailed context for debugging.
//!
//! # Usage
//!
//! ```ignore
//! let registry = InvariantRegistry::standard();
//! registry.assert_all(&cluster.snapshot(), "after join");
//! ```

mod checks;
mod snapshot;

pub use checks::{
    ConnectionsWithinRoster, HostAlwaysSpeaker, PendingRequestsAreListeners, RosterConvergence,
    SinksWithinConnections, TrackMatchesAuthorization,
};
pub use snapshot::{ClientSnapshot, SystemSnapshot};

/// Invariant check result.
pub type InvariantResult = Result<(), Violation>;

/// Invariant violation with context.
#[derive(Debug, Clone)]
pub struct Violation {
    /// Name of the violated invariant.
    pub invariant: &'static str,
    /// Description of what went wrong.
    pub message: String,
}

impl std::fmt::Display for Violation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.invariant, self.message)
    }
}

impl std::error::Error for Violation {}

/// An invariant that can be checked against system state.
///
/// Invariants are behavioral properties that must always hold.
/// They capture WHAT must be true, not specific test scenarios.
pub trait Invariant: Send + Sync {
    /// Invariant name for error reporting.
    fn name(&self) -> &'static str;

    /// Check the invariant against the current state.
    fn check(&self, state: &SystemSnapshot) -> InvariantResult;
}

/// Registry of invariants to check.
///
/// Collects multiple invariants and runs them all against system state.
/// Use [`InvariantRegistry::standard()`] for the full coordinator set.
pub struct InvariantRegistry {
    invariants: Vec<Box<dyn Invariant>>,
}

impl Default for InvariantRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl InvariantRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self { invariants: Vec::new() }
    }

    /// Create a registry with the standard coordinator invariants.
    ///
    /// Includes:
    /// - [`ConnectionsWithinRoster`]: no connection to self or unknowns
    /// - [`HostAlwaysSpeaker`]: the host is never a listener
    /// - [`SinksWithinConnections`]: sinks never outlive connections
    /// - [`RosterConvergence`]: joined clients agree on the roster
    /// - [`TrackMatchesAuthorization`]: mic track mirrors speaker+unmuted
    /// - [`PendingRequestsAreListeners`]: grants consume queue entries
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.add(ConnectionsWithinRoster);
        registry.add(HostAlwaysSpeaker);
        registry.add(SinksWithinConnections);
        registry.add(RosterConvergence);
        registry.add(TrackMatchesAuthorization);
        registry.add(PendingRequestsAreListeners);
        registry
    }

    /// Add an invariant to the registry.
    pub fn add<I: Invariant + 'static>(&mut self, invariant: I) {
        self.invariants.push(Box::new(invariant));
    }

    /// Check all invariants against the given state.
    ///
    /// Returns `Ok(())` if all invariants hold, or all violations found.
    pub fn check_all(&self, state: &SystemSnapshot) -> Result<(), Vec<Violation>> {
        let violations: Vec<_> =
            self.invariants.iter().filter_map(|inv| inv.check(state).err()).collect();

        if violations.is_empty() { Ok(()) } else { Err(violations) }
    }

    /// Check all invariants, panicking on violation.
    ///
    /// Use this in tests where you want immediate failure with context.
    #[allow(clippy::panic, reason = "Test assertion helper")]
    pub fn assert_all(&self, state: &SystemSnapshot, context: &str) {
        if let Err(violations) = self.check_all(state) {
            let messages: Vec<_> = violations.iter().map(|v| v.to_string()).collect();
            panic!("Invariant violation {context}:\n  {}", messages.join("\n  "));
        }
    }

    /// Number of registered invariants.
    pub fn len(&self) -> usize {
        self.invariants.len()
    }

    /// Check if registry is empty.
    pub fn is_empty(&self) -> bool {
        self.invariants.is_empty()
    }
}
