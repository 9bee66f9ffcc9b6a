//! In-process async relay.
//!
//! Wraps the synchronous [`RelayStore`] behind the
//! [`SignalingRelay`] trait so a production-shaped [`chorus_client::Runtime`]
//! can run against it. All clients of one hub share the store; routed
//! notifications are delivered over per-client channels in write order.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use bytes::Bytes;
use chorus_client::driver::{RelayError, RelayNotification, SignalingRelay};
use tokio::sync::{Mutex, mpsc};
use tracing::trace;

use crate::store::{RelayStore, SubscriberId};

struct Hub {
    store: RelayStore,
    senders: HashMap<SubscriberId, mpsc::UnboundedSender<RelayNotification>>,
}

impl Hub {
    fn deliver(&mut self, routed: Vec<(SubscriberId, RelayNotification)>) {
        for (id, notification) in routed {
            if let Some(sender) = self.senders.get(&id) {
                // A closed receiver means that client is gone; the hub
                // forgets it on its next recv attempt.
                let _ = sender.send(notification);
            }
        }
    }
}

/// Shared in-process relay hub. Clone handles with [`LocalRelayHub::client`].
#[derive(Clone)]
pub struct LocalRelayHub {
    inner: Arc<Mutex<Hub>>,
}

impl Default for LocalRelayHub {
    fn default() -> Self {
        Self::new()
    }
}

impl LocalRelayHub {
    /// Empty hub.
    pub fn new() -> Self {
        Self { inner: Arc::new(Mutex::new(Hub { store: RelayStore::new(), senders: HashMap::new() })) }
    }

    /// Register a new client connection on this hub.
    pub async fn client(&self) -> LocalRelay {
        let mut hub = self.inner.lock().await;
        let id = hub.store.register();
        let (tx, rx) = mpsc::unbounded_channel();
        hub.senders.insert(id, tx);
        LocalRelay { inner: Arc::clone(&self.inner), id, rx }
    }
}

/// One client's connection to a [`LocalRelayHub`].
pub struct LocalRelay {
    inner: Arc<Mutex<Hub>>,
    id: SubscriberId,
    rx: mpsc::UnboundedReceiver<RelayNotification>,
}

impl Drop for LocalRelay {
    fn drop(&mut self) {
        // Best-effort: if the lock is contended the hub keeps a dead
        // sender, which deliver() tolerates.
        if let Ok(mut hub) = self.inner.try_lock() {
            hub.store.unregister(self.id);
            hub.senders.remove(&self.id);
        }
    }
}

#[async_trait]
impl SignalingRelay for LocalRelay {
    async fn publish(&self, path: &str, value: Bytes) -> Result<(), RelayError> {
        let mut hub = self.inner.lock().await;
        trace!(%path, "publish");
        let routed = hub.store.publish(path, value);
        hub.deliver(routed);
        Ok(())
    }

    async fn append(&self, path: &str, value: Bytes) -> Result<(), RelayError> {
        let mut hub = self.inner.lock().await;
        trace!(%path, "append");
        let routed = hub.store.append(path, value);
        hub.deliver(routed);
        Ok(())
    }

    async fn remove(&self, path: &str) -> Result<(), RelayError> {
        let mut hub = self.inner.lock().await;
        trace!(%path, "remove");
        let routed = hub.store.remove(path);
        hub.deliver(routed);
        Ok(())
    }

    async fn get(&self, path: &str) -> Result<Option<Bytes>, RelayError> {
        Ok(self.inner.lock().await.store.get(path))
    }

    async fn snapshot(&self, prefix: &str) -> Result<Vec<(String, Bytes)>, RelayError> {
        Ok(self.inner.lock().await.store.snapshot(prefix))
    }

    async fn subscribe(&self, path: &str) -> Result<(), RelayError> {
        let mut hub = self.inner.lock().await;
        let replay = hub.store.subscribe(self.id, path);
        let routed = replay.into_iter().map(|n| (self.id, n)).collect();
        hub.deliver(routed);
        Ok(())
    }

    async fn subscribe_append(&self, path: &str) -> Result<(), RelayError> {
        let mut hub = self.inner.lock().await;
        if let Some(replay) = hub.store.subscribe_append(self.id, path) {
            hub.deliver(vec![(self.id, replay)]);
        }
        Ok(())
    }

    async fn unsubscribe(&self, path: &str) -> Result<(), RelayError> {
        self.inner.lock().await.store.unsubscribe(self.id, path);
        Ok(())
    }

    async fn unsubscribe_append(&self, path: &str) -> Result<(), RelayError> {
        self.inner.lock().await.store.unsubscribe_append(self.id, path);
        Ok(())
    }

    async fn recv(&mut self) -> Option<RelayNotification> {
        self.rx.recv().await
    }
}
