//! Master-side registry of spawners and spawn tasks.
//!
//! All state lives behind one mutex. Handlers take the lock, apply a transition,
//! publish events and release it; calls to workers are made after the lock is
//! dropped so a slow worker never stalls the registry.

mod protocol;
mod tick;


use std::{
    collections::HashMap,
    sync::{Arc, Mutex, MutexGuard, PoisonError},
};

use roost_model::{
    Page, Peer, PeerId, Properties, SpawnQuery, SpawnStatus, SpawnTaskId, SpawnTaskInfo,
    SpawnerId, SpawnerInfo, SpawnerOptions, message::KillProcessRequest,
};
use tokio::sync::oneshot;
use tracing::{debug, info};
use uuid::Uuid;

use crate::{
    config::CoordinatorConfig,
    error::CoreError,
    events::{EventBus, EventKind, SpawnEvent, Subscribe},
    link::SpawnerLink,
    session::{PeerSession, Sessions},
    spawner::RegisteredSpawner,
    task::SpawnTask,
};

/// A kill to send once the registry lock is released.
type PendingKill = (Arc<dyn SpawnerLink>, KillProcessRequest);

#[derive(Default)]
struct Registry {
    spawners: HashMap<SpawnerId, RegisteredSpawner>,
    tasks: HashMap<SpawnTaskId, SpawnTask>,
    sessions: Sessions,
    next_spawner: u64,
    next_task: u64,
}

impl Registry {
    fn spawner_id(&mut self) -> SpawnerId {
        self.next_spawner += 1;
        SpawnerId(self.next_spawner)
    }

    fn task_id(&mut self) -> SpawnTaskId {
        self.next_task += 1;
        SpawnTaskId(self.next_task)
    }

    /// Pick the spawner for a new task: region filter, most free slots first,
    /// lowest id on ties, first one that can take another process.
    fn select_spawner(&self, region: &str) -> Option<SpawnerId> {
        let mut candidates: Vec<&RegisteredSpawner> = self
            .spawners
            .values()
            .filter(|s| s.serves_region(region))
            .collect();
        candidates.sort_by(|a, b| {
            b.free_slot_estimate()
                .cmp(&a.free_slot_estimate())
                .then(a.id().cmp(&b.id()))
        });
        candidates
            .into_iter()
            .find(|s| s.can_dispatch_another())
            .map(RegisteredSpawner::id)
    }
}

/// The coordinator. Shared as `Arc<SpawnCoordinator>` between transports and the tick loop.
pub struct SpawnCoordinator {
    cfg: CoordinatorConfig,
    registry: Mutex<Registry>,
    events: EventBus,
}

impl SpawnCoordinator {
    /// Create a coordinator publishing to `subscribers`.
    ///
    /// Must be called from within a Tokio runtime when `subscribers` is not empty.
    pub fn new(
        cfg: CoordinatorConfig,
        subscribers: Vec<Arc<dyn Subscribe>>,
    ) -> Result<Arc<Self>, CoreError> {
        cfg.validate()?;
        Ok(Arc::new(Self {
            cfg,
            registry: Mutex::new(Registry::default()),
            events: EventBus::new(subscribers),
        }))
    }

    pub fn config(&self) -> &CoordinatorConfig {
        &self.cfg
    }

    fn registry(&self) -> MutexGuard<'_, Registry> {
        self.registry.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn publish_status(&self, task: &SpawnTask) {
        debug!(
            target: "roost.core",
            task_id = %task.id(),
            status = %task.status(),
            "spawn task status changed"
        );
        self.events.publish(
            SpawnEvent::new(EventKind::StatusChanged)
                .with_spawn(task.id())
                .with_spawner(task.spawner_id())
                .with_status(task.status())
                .with_watchers(task.watchers().to_vec()),
        );
    }

    // ------------------------------------------------------------------
    // spawners
    // ------------------------------------------------------------------

    /// Register a spawner owned by `peer`, reachable through `link`.
    pub fn register_spawner(
        &self,
        peer: &Peer,
        options: SpawnerOptions,
        link: Arc<dyn SpawnerLink>,
    ) -> Result<SpawnerId, CoreError> {
        if !peer.has_permission(self.cfg.register_spawner_permission) {
            return Err(CoreError::Unauthorized(format!(
                "{} may not register spawners",
                peer.id
            )));
        }

        let mut reg = self.registry();
        let id = reg.spawner_id();
        let region = options.region.clone();
        info!(
            target: "roost.core",
            spawner_id = %id,
            peer = %peer.id,
            region = %region,
            max_processes = options.max_processes,
            "spawner registered"
        );
        reg.spawners.insert(
            id,
            RegisteredSpawner::new(id, peer.id.clone(), options, link),
        );
        reg.sessions.touch(&peer.id).spawners.push(id);

        self.events.publish(
            SpawnEvent::new(EventKind::SpawnerRegistered)
                .with_spawner(id)
                .with_peer(peer.id.clone()),
        );
        Ok(id)
    }

    /// Remove a spawner at the request of its owner (or an administrator).
    ///
    /// The worker is still there: processes of its unfinished tasks are killed.
    pub async fn unregister_spawner(&self, peer: &Peer, id: SpawnerId) -> Result<(), CoreError> {
        let kills = {
            let mut guard = self.registry();
            let reg = &mut *guard;
            let spawner = reg
                .spawners
                .get(&id)
                .ok_or(CoreError::SpawnerNotFound(id))?;
            if spawner.owner() != &peer.id && !peer.has_permission(self.cfg.admin_permission) {
                return Err(CoreError::Unauthorized(format!(
                    "{} does not own spawner {id}",
                    peer.id
                )));
            }
            self.remove_spawner_locked(reg, id, "unregistered")
        };

        for (link, req) in kills {
            self.send_kill(link, req).await;
        }
        Ok(())
    }

    /// Drop a spawner and force every unfinished task on it to `Aborted`.
    ///
    /// Returns kills for the tasks that had already been dispatched to the worker.
    fn remove_spawner_locked(
        &self,
        reg: &mut Registry,
        id: SpawnerId,
        reason: &str,
    ) -> Vec<PendingKill> {
        let Some(spawner) = reg.spawners.remove(&id) else {
            return Vec::new();
        };
        reg.sessions.remove_spawner(spawner.owner(), id);

        let mut kills = Vec::new();
        let mut swept = 0usize;
        for task in reg
            .tasks
            .values_mut()
            .filter(|t| t.spawner_id() == id && !t.is_terminal())
        {
            if !spawner.is_queued(task.id()) && task.dispatch_attempts() > 0 {
                kills.push((
                    spawner.link(),
                    KillProcessRequest {
                        spawner_id: id,
                        spawn_id: task.id(),
                    },
                ));
            }
            if task.force_abort() {
                swept += 1;
                self.publish_status(task);
            }
        }

        info!(
            target: "roost.core",
            spawner_id = %id,
            peer = %spawner.owner(),
            reason,
            swept,
            kills = kills.len(),
            "spawner removed"
        );
        self.events.publish(
            SpawnEvent::new(EventKind::SpawnerRemoved)
                .with_spawner(id)
                .with_peer(spawner.owner().clone())
                .with_reason(reason),
        );
        kills
    }

    // ------------------------------------------------------------------
    // spawning
    // ------------------------------------------------------------------

    /// Create a task on the best spawner for `region` and queue it.
    ///
    /// Returns `None` when no spawner serves the region or all of them are full;
    /// nothing is created in that case.
    pub fn spawn(
        &self,
        options: Properties,
        region: &str,
        custom_options: Properties,
    ) -> Option<SpawnTaskId> {
        let mut reg = self.registry();
        self.spawn_locked(&mut reg, None, options, region, custom_options)
    }

    fn spawn_locked(
        &self,
        reg: &mut Registry,
        requester: Option<PeerId>,
        options: Properties,
        region: &str,
        custom_options: Properties,
    ) -> Option<SpawnTaskId> {
        let spawner_id = reg.select_spawner(region)?;
        let id = reg.task_id();
        let code = Uuid::new_v4().simple().to_string();

        let task = SpawnTask::new(
            id,
            spawner_id,
            code,
            region.to_string(),
            options,
            custom_options,
            requester.clone(),
        );
        reg.tasks.insert(id, task);
        reg.spawners.get_mut(&spawner_id)?.enqueue(id);

        info!(
            target: "roost.core",
            task_id = %id,
            spawner_id = %spawner_id,
            region,
            "spawn task created"
        );
        let mut ev = SpawnEvent::new(EventKind::TaskCreated)
            .with_spawn(id)
            .with_spawner(spawner_id)
            .with_status(SpawnStatus::None);
        if let Some(peer) = requester {
            ev = ev.with_peer(peer);
        }
        self.events.publish(ev);
        Some(id)
    }

    // ------------------------------------------------------------------
    // read side
    // ------------------------------------------------------------------

    pub fn task(&self, id: SpawnTaskId) -> Option<SpawnTaskInfo> {
        self.registry().tasks.get(&id).map(SpawnTask::info)
    }

    pub fn spawner(&self, id: SpawnerId) -> Option<SpawnerInfo> {
        self.registry().spawners.get(&id).map(RegisteredSpawner::info)
    }

    /// All spawners ordered by id.
    pub fn spawners(&self) -> Vec<SpawnerInfo> {
        let reg = self.registry();
        let mut out: Vec<_> = reg.spawners.values().map(RegisteredSpawner::info).collect();
        out.sort_by_key(|s| s.id);
        out
    }

    /// Tasks matching `q`, ordered by id.
    pub fn query(&self, q: &SpawnQuery) -> Page<SpawnTaskInfo> {
        let reg = self.registry();
        let mut matched: Vec<&SpawnTask> = reg
            .tasks
            .values()
            .filter(|t| q.status.is_none_or(|s| t.status() == s))
            .filter(|t| q.spawner.is_none_or(|s| t.spawner_id() == s))
            .filter(|t| {
                q.requester
                    .as_ref()
                    .is_none_or(|p| t.requester() == Some(p))
            })
            .collect();
        matched.sort_by_key(|t| t.id());

        let total = matched.len();
        let items = matched
            .into_iter()
            .skip(q.offset)
            .take(q.limit)
            .map(SpawnTask::info)
            .collect();
        Page { items, total }
    }

    pub fn session(&self, peer: &PeerId) -> Option<PeerSession> {
        self.registry().sessions.get(peer).cloned()
    }

    /// Resolves with the task's terminal status; at once if it already is terminal.
    pub fn wait_done(&self, id: SpawnTaskId) -> Result<oneshot::Receiver<SpawnStatus>, CoreError> {
        let mut reg = self.registry();
        let task = reg.tasks.get_mut(&id).ok_or(CoreError::TaskNotFound(id))?;
        Ok(task.wait_done())
    }
}
