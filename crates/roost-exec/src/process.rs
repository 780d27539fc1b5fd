use std::{
    collections::HashMap,
    sync::{Mutex, MutexGuard, PoisonError},
    time::Instant,
};

use roost_model::SpawnTaskId;
use tokio_util::sync::CancellationToken;

/// A process launched (or being launched) for a spawn task.
#[derive(Debug, Clone)]
pub struct ProcessEntry {
    /// `None` until the OS process exists.
    pub pid: Option<u32>,
    pub port: Option<u16>,
    pub claimed_at: Instant,
    stop: CancellationToken,
}

impl ProcessEntry {
    /// Cancelled when the process must be killed.
    pub fn stop_token(&self) -> CancellationToken {
        self.stop.clone()
    }
}

/// Spawn task id → process. Launch, kill and exit cleanup run on different tasks and
/// all go through this table.
#[derive(Debug, Default)]
pub struct ProcessTable {
    inner: Mutex<HashMap<SpawnTaskId, ProcessEntry>>,
}

impl ProcessTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<SpawnTaskId, ProcessEntry>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Reserve the slot of `id` before launching. Returns `None` if it is already taken.
    pub fn claim(&self, id: SpawnTaskId) -> Option<CancellationToken> {
        let mut map = self.lock();
        if map.contains_key(&id) {
            return None;
        }
        let stop = CancellationToken::new();
        map.insert(
            id,
            ProcessEntry {
                pid: None,
                port: None,
                claimed_at: Instant::now(),
                stop: stop.clone(),
            },
        );
        Some(stop)
    }

    /// Record the OS process of a claimed slot.
    pub fn set_started(&self, id: SpawnTaskId, pid: u32, port: u16) {
        if let Some(entry) = self.lock().get_mut(&id) {
            entry.pid = Some(pid);
            entry.port = Some(port);
        }
    }

    pub fn get(&self, id: SpawnTaskId) -> Option<ProcessEntry> {
        self.lock().get(&id).cloned()
    }

    pub fn remove(&self, id: SpawnTaskId) -> Option<ProcessEntry> {
        self.lock().remove(&id)
    }

    /// Request the kill of `id`. Returns `false` if no such process is known.
    pub fn stop(&self, id: SpawnTaskId) -> bool {
        match self.lock().get(&id) {
            Some(entry) => {
                entry.stop.cancel();
                true
            }
            None => false,
        }
    }

    /// Request the kill of every process. Returns how many were signalled.
    pub fn stop_all(&self) -> usize {
        let map = self.lock();
        for entry in map.values() {
            entry.stop.cancel();
        }
        map.len()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn claim_is_exclusive() {
        let table = ProcessTable::new();
        let id = SpawnTaskId(1);
        assert!(table.claim(id).is_some());
        assert!(table.claim(id).is_none());

        table.remove(id);
        assert!(table.claim(id).is_some());
    }

    #[test]
    fn stop_cancels_the_claimed_token() {
        let table = ProcessTable::new();
        let token = table.claim(SpawnTaskId(1)).unwrap();
        table.set_started(SpawnTaskId(1), 99, 1500);

        assert!(!table.stop(SpawnTaskId(2)));
        assert!(table.stop(SpawnTaskId(1)));
        assert!(token.is_cancelled());

        let entry = table.get(SpawnTaskId(1)).unwrap();
        assert_eq!((entry.pid, entry.port), (Some(99), Some(1500)));
    }

    #[test]
    fn stop_all_signals_everything() {
        let table = ProcessTable::new();
        let a = table.claim(SpawnTaskId(1)).unwrap();
        let b = table.claim(SpawnTaskId(2)).unwrap();
        assert_eq!(table.stop_all(), 2);
        assert!(a.is_cancelled() && b.is_cancelled());
        assert_eq!(table.len(), 2);
    }
}
