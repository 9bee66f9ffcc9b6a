//! Standard invariant checks for the voice-room coordinator.

use super::{Invariant, InvariantResult, SystemSnapshot, Violation};

/// A client never holds a connection record for itself or for a
/// participant absent from its roster view.
///
/// Connections may lag behind the roster (a failed transport is not
/// retried), but must never outlive it.
pub struct ConnectionsWithinRoster;

impl Invariant for ConnectionsWithinRoster {
    fn name(&self) -> &'static str {
        "ConnectionsWithinRoster"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in state.joined() {
            if client.connections.contains(&client.id) {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!("{} holds a connection to itself", client.id),
                });
            }
            for remote in &client.connections {
                if !client.roster.contains_key(remote) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "{} is connected to {remote}, who is not in its roster",
                            client.id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Every joined client sees the host as a speaker.
pub struct HostAlwaysSpeaker;

impl Invariant for HostAlwaysSpeaker {
    fn name(&self) -> &'static str {
        "HostAlwaysSpeaker"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in state.joined() {
            if let Some(entry) = client.roster.get(&state.host_id) {
                if !entry.is_speaker {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!("{} sees host {} as non-speaker", client.id, state.host_id),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Output sinks exist only for connected peers, so sinks can never leak
/// past connection teardown.
pub struct SinksWithinConnections;

impl Invariant for SinksWithinConnections {
    fn name(&self) -> &'static str {
        "SinksWithinConnections"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in &state.clients {
            for remote in &client.sinks {
                if !client.connections.contains(remote) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "{} holds a sink for {remote} without a connection",
                            client.id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// All joined clients converge on the same roster once routing settles.
pub struct RosterConvergence;

impl Invariant for RosterConvergence {
    fn name(&self) -> &'static str {
        "RosterConvergence"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        let mut joined = state.joined();
        let Some(reference) = joined.next() else {
            return Ok(());
        };
        for client in joined {
            if client.roster != reference.roster {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{} and {} disagree on the roster: {:?} vs {:?}",
                        reference.id,
                        client.id,
                        reference.roster.keys().collect::<Vec<_>>(),
                        client.roster.keys().collect::<Vec<_>>()
                    ),
                });
            }
        }
        Ok(())
    }
}

/// The outgoing mic track is live exactly while the local participant is
/// an unmuted speaker.
pub struct TrackMatchesAuthorization;

impl Invariant for TrackMatchesAuthorization {
    fn name(&self) -> &'static str {
        "TrackMatchesAuthorization"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in state.joined() {
            let Some(entry) = client.roster.get(&client.id) else {
                continue;
            };
            let expected = entry.is_speaker && !entry.muted;
            if client.mic_enabled != expected {
                return Err(Violation {
                    invariant: self.name(),
                    message: format!(
                        "{}: mic_enabled={} but is_speaker={} muted={}",
                        client.id, client.mic_enabled, entry.is_speaker, entry.muted
                    ),
                });
            }
        }
        Ok(())
    }
}

/// Once routing settles, no pending request belongs to a speaker: grants
/// and auto-grants always consume the queue entry.
pub struct PendingRequestsAreListeners;

impl Invariant for PendingRequestsAreListeners {
    fn name(&self) -> &'static str {
        "PendingRequestsAreListeners"
    }

    fn check(&self, state: &SystemSnapshot) -> InvariantResult {
        for client in state.joined() {
            for user in &client.pending {
                if client.roster.get(user).is_some_and(|e| e.is_speaker) {
                    return Err(Violation {
                        invariant: self.name(),
                        message: format!(
                            "{} sees a pending request from {user}, who is already a speaker",
                            client.id
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}
