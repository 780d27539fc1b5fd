use std::time::SystemTime;

use roost_model::{PeerId, SpawnStatus, SpawnTaskId, SpawnerId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A worker registered a spawner.
    SpawnerRegistered,
    /// A spawner was removed (unregistered, disconnected or silent).
    SpawnerRemoved,
    /// A spawn task was created and queued.
    TaskCreated,
    /// A spawn task changed status.
    StatusChanged,
    /// The worker reported the process exited; status may be unchanged.
    ProcessExited,
    /// Dispatch failed in transport; the task was requeued.
    DispatchRetry,
    /// Dispatch failed for good; the task was aborted.
    DispatchFailed,
    /// A terminal task was dropped from the registry.
    TaskEvicted,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::SpawnerRegistered => "spawner_registered",
            EventKind::SpawnerRemoved => "spawner_removed",
            EventKind::TaskCreated => "task_created",
            EventKind::StatusChanged => "status_changed",
            EventKind::ProcessExited => "process_exited",
            EventKind::DispatchRetry => "dispatch_retry",
            EventKind::DispatchFailed => "dispatch_failed",
            EventKind::TaskEvicted => "task_evicted",
        }
    }
}

/// One coordinator event. Fields not relevant to the kind are left empty.
#[derive(Debug, Clone)]
pub struct SpawnEvent {
    pub kind: EventKind,
    /// Monotonic sequence number assigned by the bus.
    pub seq: u64,
    pub at: SystemTime,
    pub spawn_id: Option<SpawnTaskId>,
    pub spawner_id: Option<SpawnerId>,
    /// Spawner owner or task requester, depending on the kind.
    pub peer: Option<PeerId>,
    pub status: Option<SpawnStatus>,
    /// Peers that should be told about a status change.
    pub watchers: Vec<PeerId>,
    pub attempt: Option<u32>,
    pub reason: Option<String>,
}

impl SpawnEvent {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            seq: 0,
            at: SystemTime::now(),
            spawn_id: None,
            spawner_id: None,
            peer: None,
            status: None,
            watchers: Vec::new(),
            attempt: None,
            reason: None,
        }
    }

    pub fn with_spawn(mut self, id: SpawnTaskId) -> Self {
        self.spawn_id = Some(id);
        self
    }

    pub fn with_spawner(mut self, id: SpawnerId) -> Self {
        self.spawner_id = Some(id);
        self
    }

    pub fn with_peer(mut self, peer: PeerId) -> Self {
        self.peer = Some(peer);
        self
    }

    pub fn with_status(mut self, status: SpawnStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_watchers(mut self, watchers: Vec<PeerId>) -> Self {
        self.watchers = watchers;
        self
    }

    pub fn with_attempt(mut self, attempt: u32) -> Self {
        self.attempt = Some(attempt);
        self
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }
}
