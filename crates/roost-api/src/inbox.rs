use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, MutexGuard, PoisonError},
};

use async_trait::async_trait;
use roost_core::{EventKind, SpawnEvent, Subscribe};
use roost_model::{PeerId, message::SpawnStatusChange};
use tracing::debug;

/// Per-peer mailbox of status changes, filled from coordinator events and drained by
/// polling peers.
///
/// Each mailbox is bounded; when it is full the oldest notification is dropped.
#[derive(Debug)]
pub struct StatusInbox {
    capacity: usize,
    boxes: Mutex<HashMap<PeerId, VecDeque<SpawnStatusChange>>>,
}

impl StatusInbox {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            boxes: Mutex::new(HashMap::new()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<PeerId, VecDeque<SpawnStatusChange>>> {
        self.boxes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, peer: &PeerId, change: SpawnStatusChange) {
        let mut boxes = self.lock();
        let queue = boxes.entry(peer.clone()).or_default();
        if queue.len() == self.capacity {
            queue.pop_front();
            debug!(target: "roost.api", peer = %peer, "status inbox full; dropped oldest");
        }
        queue.push_back(change);
    }

    /// Take every pending notification of `peer`, oldest first.
    pub fn drain(&self, peer: &PeerId) -> Vec<SpawnStatusChange> {
        self.lock()
            .remove(peer)
            .map(Vec::from)
            .unwrap_or_default()
    }

    pub fn forget(&self, peer: &PeerId) {
        self.lock().remove(peer);
    }

    pub fn pending(&self, peer: &PeerId) -> usize {
        self.lock().get(peer).map_or(0, VecDeque::len)
    }
}

#[async_trait]
impl Subscribe for StatusInbox {
    async fn on_event(&self, event: &SpawnEvent) {
        if event.kind != EventKind::StatusChanged {
            return;
        }
        let (Some(spawn_id), Some(status)) = (event.spawn_id, event.status) else {
            return;
        };
        for peer in &event.watchers {
            self.push(peer, SpawnStatusChange { spawn_id, status });
        }
    }

    fn name(&self) -> &'static str {
        "status-inbox"
    }
}
