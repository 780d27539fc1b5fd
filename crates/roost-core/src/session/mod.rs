//! Per-peer bookkeeping of the coordinator.
//!
//! A session is created the first time a peer does something that has to be tracked
//! (requests a spawn, registers a spawner, registers as a spawned process) and is
//! dropped when the peer disconnects or when nothing references it anymore.

use std::{collections::HashMap, time::Instant};

use roost_model::{PeerId, SpawnTaskId, SpawnerId};

#[derive(Debug, Clone)]
pub struct PeerSession {
    /// Last spawn request issued by the peer.
    pub active_request: Option<SpawnTaskId>,
    /// Spawners registered by the peer.
    pub spawners: Vec<SpawnerId>,
    /// Task the peer registered for as a spawned process.
    pub process_task: Option<SpawnTaskId>,
    pub created_at: Instant,
    pub last_seen: Instant,
}

impl PeerSession {
    fn new() -> Self {
        let now = Instant::now();
        Self {
            active_request: None,
            spawners: Vec::new(),
            process_task: None,
            created_at: now,
            last_seen: now,
        }
    }

    fn is_empty(&self) -> bool {
        self.active_request.is_none() && self.spawners.is_empty() && self.process_task.is_none()
    }
}

#[derive(Debug, Default)]
pub struct Sessions {
    by_peer: HashMap<PeerId, PeerSession>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Session of `peer`, created on first use.
    pub fn touch(&mut self, peer: &PeerId) -> &mut PeerSession {
        let session = self
            .by_peer
            .entry(peer.clone())
            .or_insert_with(PeerSession::new);
        session.last_seen = Instant::now();
        session
    }

    pub fn get(&self, peer: &PeerId) -> Option<&PeerSession> {
        self.by_peer.get(peer)
    }

    pub fn remove(&mut self, peer: &PeerId) -> Option<PeerSession> {
        self.by_peer.remove(peer)
    }

    pub fn len(&self) -> usize {
        self.by_peer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_peer.is_empty()
    }

    pub fn remove_spawner(&mut self, peer: &PeerId, id: SpawnerId) {
        self.update(peer, |s| s.spawners.retain(|&sid| sid != id));
    }

    /// Forget every reference to an evicted task.
    pub fn forget_task(&mut self, peer: Option<&PeerId>, registered: Option<&PeerId>, id: SpawnTaskId) {
        if let Some(peer) = peer {
            self.update(peer, |s| {
                if s.active_request == Some(id) {
                    s.active_request = None;
                }
            });
        }
        if let Some(peer) = registered {
            self.update(peer, |s| {
                if s.process_task == Some(id) {
                    s.process_task = None;
                }
            });
        }
    }

    fn update(&mut self, peer: &PeerId, f: impl FnOnce(&mut PeerSession)) {
        if let Some(session) = self.by_peer.get_mut(peer) {
            f(session);
            if session.is_empty() {
                self.by_peer.remove(peer);
            }
        }
    }
}
