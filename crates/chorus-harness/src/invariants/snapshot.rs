//! Observable state extraction for invariant checking.

use std::collections::{BTreeMap, BTreeSet};

use chorus_proto::{ParticipantEntry, ParticipantId};

/// One simulated client's observable state.
#[derive(Debug, Clone)]
pub struct ClientSnapshot {
    /// The client's participant id.
    pub id: ParticipantId,
    /// Whether the client is currently joined.
    pub joined: bool,
    /// Whether the client is the room host.
    pub is_host: bool,
    /// Remote ids with a live connection record.
    pub connections: BTreeSet<ParticipantId>,
    /// Remote ids with an attached output sink.
    pub sinks: BTreeSet<ParticipantId>,
    /// The client's synchronized roster view.
    pub roster: BTreeMap<ParticipantId, ParticipantEntry>,
    /// Users with a pending mic request in this client's view.
    pub pending: BTreeSet<ParticipantId>,
    /// Whether the outgoing mic track is enabled.
    pub mic_enabled: bool,
    /// Whether the capture device is held.
    pub capturing: bool,
}

/// Observable state of the whole cluster at one point in time.
#[derive(Debug, Clone)]
pub struct SystemSnapshot {
    /// The room's fixed host.
    pub host_id: ParticipantId,
    /// Per-client snapshots, join order.
    pub clients: Vec<ClientSnapshot>,
}

impl SystemSnapshot {
    /// Snapshot with no clients, for registry smoke tests.
    pub fn empty() -> Self {
        Self { host_id: ParticipantId::new(), clients: Vec::new() }
    }

    /// Snapshots of joined clients only.
    pub fn joined(&self) -> impl Iterator<Item = &ClientSnapshot> {
        self.clients.iter().filter(|c| c.joined)
    }
}
