//! Synchronized participant roster.
//!
//! The roster is a read-model fed by relay subscriptions: remote writes
//! arrive as whole-entry updates and are applied last-writer-wins. Each
//! field has exactly one writer-owner (the participant itself for
//! `muted`/`is_speaking`, the host for `is_speaker`), so concurrent
//! writers never conflict and no merge logic is needed beyond "most
//! recent write observed wins".

use std::collections::HashMap;

use chorus_proto::{ParticipantEntry, ParticipantId};

/// Read-model of the room's participants.
#[derive(Debug, Clone, Default)]
pub struct Roster {
    entries: HashMap<ParticipantId, ParticipantEntry>,
}

impl Roster {
    /// Empty roster.
    pub fn new() -> Self {
        Self::default()
    }

    /// Apply an observed write for one participant, replacing any prior
    /// entry. Returns `true` if the roster changed.
    pub fn apply(&mut self, user_id: ParticipantId, entry: ParticipantEntry) -> bool {
        match self.entries.get(&user_id) {
            Some(existing) if *existing == entry => false,
            _ => {
                self.entries.insert(user_id, entry);
                true
            },
        }
    }

    /// Remove a participant. Returns the removed entry, if any.
    pub fn remove(&mut self, user_id: &str) -> Option<ParticipantEntry> {
        self.entries.remove(user_id)
    }

    /// Entry for one participant.
    pub fn get(&self, user_id: &str) -> Option<&ParticipantEntry> {
        self.entries.get(user_id)
    }

    /// Whether a participant is present.
    pub fn contains(&self, user_id: &str) -> bool {
        self.entries.contains_key(user_id)
    }

    /// All participants.
    pub fn iter(&self) -> impl Iterator<Item = (&ParticipantId, &ParticipantEntry)> {
        self.entries.iter()
    }

    /// Ids of all participants.
    pub fn ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.entries.keys()
    }

    /// Ids of all authorized speakers.
    pub fn speaker_ids(&self) -> impl Iterator<Item = &ParticipantId> {
        self.entries.iter().filter(|(_, e)| e.is_speaker).map(|(id, _)| id)
    }

    /// Number of participants.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the room is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drop all entries (local teardown on leave).
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(speaker: bool) -> ParticipantEntry {
        ParticipantEntry {
            display_name: "x".into(),
            avatar_ref: None,
            is_speaker: speaker,
            muted: false,
            is_speaking: false,
        }
    }

    #[test]
    fn apply_is_last_writer_wins() {
        let mut roster = Roster::new();
        assert!(roster.apply("a".into(), entry(false)));
        assert!(roster.apply("a".into(), entry(true)));
        assert!(roster.get("a").is_some_and(|e| e.is_speaker));
    }

    #[test]
    fn apply_identical_entry_reports_unchanged() {
        let mut roster = Roster::new();
        assert!(roster.apply("a".into(), entry(false)));
        assert!(!roster.apply("a".into(), entry(false)));
    }

    #[test]
    fn remove_returns_entry() {
        let mut roster = Roster::new();
        roster.apply("a".into(), entry(true));
        assert!(roster.remove("a").is_some());
        assert!(roster.remove("a").is_none());
        assert!(roster.is_empty());
    }

    #[test]
    fn speaker_ids_filters() {
        let mut roster = Roster::new();
        roster.apply("a".into(), entry(true));
        roster.apply("b".into(), entry(false));
        let speakers: Vec<_> = roster.speaker_ids().collect();
        assert_eq!(speakers, vec!["a"]);
    }
}
