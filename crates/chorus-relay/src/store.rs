//! Synchronous relay store.
//!
//! The relay is a routing-only node: values are opaque bytes, never
//! deserialized here. Two storage shapes share one path namespace:
//!
//! - Values: last-writer-wins cells at a path; removing a path removes
//!   its whole subtree.
//! - Append streams: ordered logs at a path. Entries are immutable once
//!   written and nothing is deleted; consumers prune stale entries on
//!   receipt.
//!
//! Subscription replay: a value subscription immediately replays the
//! current value of the subscribed path and each direct child; an append
//! subscription replays at most the single most recent entry. After
//! replay, notifications for one path arrive in write order.
//!
//! This core is synchronous and deterministic so the simulation harness
//! can drive it directly; [`crate::LocalRelay`] wraps it for async use.

use std::collections::{BTreeMap, HashMap, HashSet};

use bytes::Bytes;
use chorus_client::driver::RelayNotification;

/// Handle identifying one subscriber's set of subscriptions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

/// Hierarchical value store with append streams and subscriptions.
#[derive(Debug, Default)]
pub struct RelayStore {
    /// Value cells, ordered so subtree scans are range scans.
    values: BTreeMap<String, Bytes>,
    /// Append streams. Kept whole; replay uses only the last entry.
    streams: HashMap<String, Vec<Bytes>>,
    /// Value-subscription prefixes per subscriber.
    value_subs: HashMap<SubscriberId, HashSet<String>>,
    /// Append-subscription paths per subscriber.
    append_subs: HashMap<SubscriberId, HashSet<String>>,
    next_id: u64,
}

/// A notification routed to one subscriber.
pub type Routed = (SubscriberId, RelayNotification);

impl RelayStore {
    /// Empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new subscriber.
    pub fn register(&mut self) -> SubscriberId {
        let id = SubscriberId(self.next_id);
        self.next_id += 1;
        self.value_subs.insert(id, HashSet::new());
        self.append_subs.insert(id, HashSet::new());
        id
    }

    /// Drop a subscriber and all its subscriptions.
    pub fn unregister(&mut self, id: SubscriberId) {
        self.value_subs.remove(&id);
        self.append_subs.remove(&id);
    }

    /// Write a value, creating or overwriting. Returns the notifications
    /// to deliver.
    pub fn publish(&mut self, path: &str, value: Bytes) -> Vec<Routed> {
        self.values.insert(path.to_string(), value.clone());
        self.route_value(path, RelayNotification::Set { path: path.to_string(), value })
    }

    /// Append an entry to the stream at `path`.
    pub fn append(&mut self, path: &str, value: Bytes) -> Vec<Routed> {
        self.streams.entry(path.to_string()).or_default().push(value.clone());
        let notification = RelayNotification::Appended { path: path.to_string(), value };
        self.append_subs
            .iter()
            .filter(|(_, paths)| paths.contains(path))
            .map(|(id, _)| (*id, notification.clone()))
            .collect()
    }

    /// Remove `path` and everything beneath it.
    ///
    /// Every removed value cell produces its own removal notification, so
    /// subscribers watching a child see that child go. Streams under the
    /// subtree are dropped without notifications; stream consumers react
    /// to the value removals instead.
    pub fn remove(&mut self, path: &str) -> Vec<Routed> {
        // Scan from "{path}/" rather than "{path}": keys like "{path}-x"
        // sort between the two and would end a single take_while early.
        let child_prefix = format!("{path}/");
        let mut removed: Vec<String> =
            if self.values.contains_key(path) { vec![path.to_string()] } else { Vec::new() };
        removed.extend(
            self.values
                .range(child_prefix.clone()..)
                .take_while(|(p, _)| p.starts_with(&child_prefix))
                .map(|(p, _)| p.clone()),
        );

        let mut routed = Vec::new();
        for p in removed {
            self.values.remove(&p);
            routed.extend(self.route_value(&p, RelayNotification::Removed { path: p.clone() }));
        }
        self.streams.retain(|p, _| p != path && !p.starts_with(&child_prefix));
        routed
    }

    /// Current value at `path`.
    pub fn get(&self, path: &str) -> Option<Bytes> {
        self.values.get(path).cloned()
    }

    /// All direct children of `prefix` as `(path, value)` pairs.
    pub fn snapshot(&self, prefix: &str) -> Vec<(String, Bytes)> {
        let child_prefix = format!("{prefix}/");
        self.values
            .range(child_prefix.clone()..)
            .take_while(|(p, _)| p.starts_with(&child_prefix))
            .filter(|(p, _)| !p[child_prefix.len()..].contains('/'))
            .map(|(p, v)| (p.clone(), v.clone()))
            .collect()
    }

    /// Subscribe `id` to value changes at `path` and its direct children.
    ///
    /// Returns the immediate replay: the current value at `path` (if any)
    /// followed by each direct child, as `Set` notifications.
    pub fn subscribe(&mut self, id: SubscriberId, path: &str) -> Vec<RelayNotification> {
        if let Some(paths) = self.value_subs.get_mut(&id) {
            paths.insert(path.to_string());
        }
        let mut replay = Vec::new();
        if let Some(value) = self.values.get(path) {
            replay.push(RelayNotification::Set { path: path.to_string(), value: value.clone() });
        }
        for (p, v) in self.snapshot(path) {
            replay.push(RelayNotification::Set { path: p, value: v });
        }
        replay
    }

    /// Subscribe `id` to appends on the stream at `path`.
    ///
    /// Returns at most the single most recent entry as the replay.
    pub fn subscribe_append(&mut self, id: SubscriberId, path: &str) -> Option<RelayNotification> {
        if let Some(paths) = self.append_subs.get_mut(&id) {
            paths.insert(path.to_string());
        }
        self.streams.get(path).and_then(|entries| entries.last()).map(|value| {
            RelayNotification::Appended { path: path.to_string(), value: value.clone() }
        })
    }

    /// Drop `id`'s value subscription at `path`.
    pub fn unsubscribe(&mut self, id: SubscriberId, path: &str) {
        if let Some(paths) = self.value_subs.get_mut(&id) {
            paths.remove(path);
        }
    }

    /// Drop `id`'s append subscription at `path`.
    pub fn unsubscribe_append(&mut self, id: SubscriberId, path: &str) {
        if let Some(paths) = self.append_subs.get_mut(&id) {
            paths.remove(path);
        }
    }

    /// Route a value notification to subscribers watching `path` itself
    /// or its direct parent.
    fn route_value(&self, path: &str, notification: RelayNotification) -> Vec<Routed> {
        let parent = path.rsplit_once('/').map(|(parent, _)| parent);
        self.value_subs
            .iter()
            .filter(|(_, paths)| {
                paths.contains(path) || parent.is_some_and(|parent| paths.contains(parent))
            })
            .map(|(id, _)| (*id, notification.clone()))
            .collect()
    }
}
