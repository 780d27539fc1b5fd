//! Handlers for the messages of the spawn protocol.

use std::sync::Arc;

use roost_model::{
    Peer, PeerId, SpawnTaskId, SpawnerId,
    message::{
        ClientSpawnRequest, CompleteSpawnProcess, KillProcessRequest, ProcessKilled,
        ProcessStarted, RegisterSpawnedProcess, RegisterSpawnedProcessResponse,
        SpawnFinalizationData, UpdateSpawnerProcessesCount,
    },
};
use tokio::time;
use tracing::{debug, info, warn};

use super::{Registry, SpawnCoordinator};
use crate::{
    error::CoreError,
    events::{EventKind, SpawnEvent},
    link::SpawnerLink,
    spawner::RegisteredSpawner,
    task::AbortPlan,
};

fn owned_spawner<'a>(
    reg: &'a mut Registry,
    peer: &PeerId,
    id: SpawnerId,
) -> Result<&'a mut RegisteredSpawner, CoreError> {
    let spawner = reg
        .spawners
        .get_mut(&id)
        .ok_or(CoreError::SpawnerNotFound(id))?;
    if spawner.owner() != peer {
        return Err(CoreError::Unauthorized(format!(
            "{peer} does not own spawner {id}"
        )));
    }
    Ok(spawner)
}

impl SpawnCoordinator {
    /// A requester asks for a new process.
    ///
    /// Rejected while the requester's previous request has not started its process yet.
    pub fn handle_client_spawn_request(
        &self,
        peer: &Peer,
        req: ClientSpawnRequest,
    ) -> Result<SpawnTaskId, CoreError> {
        if !peer.has_permission(self.cfg.client_spawn_permission) {
            return Err(CoreError::Unauthorized(format!(
                "{} may not request spawns",
                peer.id
            )));
        }

        let mut guard = self.registry();
        let reg = &mut *guard;

        let pending = reg
            .sessions
            .get(&peer.id)
            .and_then(|s| s.active_request)
            .and_then(|id| reg.tasks.get(&id))
            .filter(|t| !t.is_done_starting_process());
        if let Some(task) = pending {
            return Err(CoreError::DuplicateRequest(format!(
                "{} already has an unfinished spawn request ({})",
                peer.id,
                task.id()
            )));
        }

        let id = self
            .spawn_locked(
                reg,
                Some(peer.id.clone()),
                req.options,
                &req.region,
                req.custom_options,
            )
            .ok_or_else(|| {
                let region = if req.region.is_empty() {
                    "any region"
                } else {
                    req.region.as_str()
                };
                CoreError::NoCapacity(format!("all spawners for {region} are busy"))
            })?;
        reg.sessions.touch(&peer.id).active_request = Some(id);
        Ok(id)
    }

    /// Abort a task on behalf of its requester or an administrator.
    pub async fn handle_abort_request(&self, peer: &Peer, id: SpawnTaskId) -> Result<(), CoreError> {
        {
            let reg = self.registry();
            let task = reg.tasks.get(&id).ok_or(CoreError::TaskNotFound(id))?;
            if task.requester() != Some(&peer.id) && !peer.has_permission(self.cfg.admin_permission)
            {
                return Err(CoreError::Unauthorized(format!(
                    "{} may not abort spawn task {id}",
                    peer.id
                )));
            }
        }
        self.abort_task(id).await
    }

    /// `Aborting`, then kill on the worker (or unqueue), then `Aborted`.
    ///
    /// The abort completes even when the worker fails to acknowledge the kill in time.
    pub(crate) async fn abort_task(&self, id: SpawnTaskId) -> Result<(), CoreError> {
        let (link, req) = {
            let mut guard = self.registry();
            let reg = &mut *guard;
            let task = reg.tasks.get_mut(&id).ok_or(CoreError::TaskNotFound(id))?;
            if task.begin_abort()? == AbortPlan::InProgress {
                return Ok(());
            }
            self.publish_status(task);

            let spawner_id = task.spawner_id();
            let dispatched = reg.spawners.get_mut(&spawner_id).and_then(|spawner| {
                (!spawner.remove_queued(id)).then(|| {
                    let req = KillProcessRequest {
                        spawner_id,
                        spawn_id: id,
                    };
                    (spawner.link(), req)
                })
            });
            match dispatched {
                Some(kill) => kill,
                None => {
                    task.confirm_aborted();
                    self.publish_status(task);
                    info!(target: "roost.core", task_id = %id, "queued spawn task aborted");
                    return Ok(());
                }
            }
        };

        self.send_kill(link, req).await;

        let mut guard = self.registry();
        let reg = &mut *guard;
        if let Some(spawner) = reg.spawners.get_mut(&req.spawner_id) {
            spawner.release(id);
        }
        if let Some(task) = reg.tasks.get_mut(&id) {
            if task.confirm_aborted() {
                self.publish_status(task);
            }
        }
        info!(target: "roost.core", task_id = %id, "spawn task aborted");
        Ok(())
    }

    pub(super) async fn send_kill(&self, link: Arc<dyn SpawnerLink>, req: KillProcessRequest) {
        let timeout = self.cfg.link_timeout();
        match time::timeout(timeout, link.kill_process(req)).await {
            Ok(Ok(ack)) if ack.success => {
                debug!(target: "roost.core", task_id = %req.spawn_id, "kill acknowledged");
            }
            Ok(Ok(ack)) => {
                warn!(
                    target: "roost.core",
                    task_id = %req.spawn_id,
                    message = %ack.message,
                    "worker refused kill"
                );
            }
            Ok(Err(e)) => {
                warn!(target: "roost.core", task_id = %req.spawn_id, error = %e, "kill failed");
            }
            Err(_) => {
                warn!(
                    target: "roost.core",
                    task_id = %req.spawn_id,
                    timeout_ms = timeout.as_millis() as u64,
                    "kill timed out"
                );
            }
        }
    }

    /// A spawned process proves its identity with the task's unique code and receives
    /// the task's options.
    pub fn handle_process_registration(
        &self,
        peer: &PeerId,
        msg: RegisterSpawnedProcess,
    ) -> Result<RegisterSpawnedProcessResponse, CoreError> {
        let mut guard = self.registry();
        let reg = &mut *guard;
        let task = reg
            .tasks
            .get_mut(&msg.spawn_id)
            .ok_or(CoreError::TaskNotFound(msg.spawn_id))?;

        if let Err(e) = task.on_registered(peer.clone(), &msg.unique_code) {
            warn!(
                target: "roost.core",
                task_id = %msg.spawn_id,
                peer = %peer,
                error = %e,
                "process registration refused"
            );
            return Err(e);
        }
        self.publish_status(task);
        let options = task.options().clone();
        // a registered process is running even if its started notice got lost
        if let Some(spawner) = reg.spawners.get_mut(&task.spawner_id()) {
            spawner.release(msg.spawn_id);
        }
        reg.sessions.touch(peer).process_task = Some(msg.spawn_id);

        info!(target: "roost.core", task_id = %msg.spawn_id, peer = %peer, "process registered");
        Ok(RegisterSpawnedProcessResponse { options })
    }

    /// The registered process reports its result.
    pub fn handle_finalization(
        &self,
        peer: &PeerId,
        msg: CompleteSpawnProcess,
    ) -> Result<(), CoreError> {
        let mut reg = self.registry();
        let task = reg
            .tasks
            .get_mut(&msg.spawn_id)
            .ok_or(CoreError::TaskNotFound(msg.spawn_id))?;
        task.on_finalized(peer, msg.finalization_data)?;
        self.publish_status(task);

        info!(target: "roost.core", task_id = %msg.spawn_id, peer = %peer, "spawn task finalized");
        Ok(())
    }

    /// Finalization data of a task, for its requester or an administrator.
    pub fn get_finalization_data(
        &self,
        peer: &Peer,
        id: SpawnTaskId,
    ) -> Result<SpawnFinalizationData, CoreError> {
        let mut guard = self.registry();
        let reg = &mut *guard;
        let task = reg.tasks.get(&id).ok_or(CoreError::TaskNotFound(id))?;
        if task.requester() != Some(&peer.id) && !peer.has_permission(self.cfg.admin_permission) {
            return Err(CoreError::Unauthorized(format!(
                "{} may not read spawn task {id}",
                peer.id
            )));
        }
        let data = task
            .finalization()
            .cloned()
            .ok_or(CoreError::NotFinalized(id))?;

        if self.cfg.purge_on_fetch {
            self.evict_locked(reg, id);
        }
        Ok(SpawnFinalizationData { spawn_id: id, data })
    }

    /// The worker launched the process of a task.
    ///
    /// A process that starts after its task was aborted is killed right away.
    pub async fn handle_process_started(
        &self,
        peer: &PeerId,
        msg: ProcessStarted,
    ) -> Result<(), CoreError> {
        let orphan = {
            let mut guard = self.registry();
            let reg = &mut *guard;
            let spawner_id = reg
                .tasks
                .get(&msg.spawn_id)
                .ok_or(CoreError::TaskNotFound(msg.spawn_id))?
                .spawner_id();
            let spawner = owned_spawner(reg, peer, spawner_id)?;
            spawner.release(msg.spawn_id);
            let link = spawner.link();

            let task = reg
                .tasks
                .get_mut(&msg.spawn_id)
                .ok_or(CoreError::TaskNotFound(msg.spawn_id))?;
            if task.on_process_started(msg.process_id, msg.args) {
                debug!(
                    target: "roost.core",
                    task_id = %msg.spawn_id,
                    pid = msg.process_id,
                    "process started"
                );
                self.publish_status(task);
                None
            } else if task.is_aborted() {
                Some((
                    link,
                    KillProcessRequest {
                        spawner_id,
                        spawn_id: msg.spawn_id,
                    },
                ))
            } else {
                None
            }
        };

        if let Some((link, req)) = orphan {
            warn!(
                target: "roost.core",
                task_id = %req.spawn_id,
                pid = msg.process_id,
                "process started for aborted task; killing"
            );
            self.send_kill(link, req).await;
        }
        Ok(())
    }

    /// The worker reports the process of a task exited.
    pub fn handle_process_killed(&self, peer: &PeerId, msg: ProcessKilled) -> Result<(), CoreError> {
        let mut guard = self.registry();
        let reg = &mut *guard;
        let spawner_id = reg
            .tasks
            .get(&msg.spawn_id)
            .ok_or(CoreError::TaskNotFound(msg.spawn_id))?
            .spawner_id();
        owned_spawner(reg, peer, spawner_id)?.release(msg.spawn_id);

        let task = reg
            .tasks
            .get_mut(&msg.spawn_id)
            .ok_or(CoreError::TaskNotFound(msg.spawn_id))?;
        let changed = task.on_killed();
        self.events.publish(
            SpawnEvent::new(EventKind::ProcessExited)
                .with_spawn(msg.spawn_id)
                .with_spawner(spawner_id)
                .with_status(task.status()),
        );
        if changed {
            self.publish_status(task);
        }
        Ok(())
    }

    /// The worker reports how many processes it runs.
    pub fn handle_process_count_update(
        &self,
        peer: &PeerId,
        msg: UpdateSpawnerProcessesCount,
    ) -> Result<(), CoreError> {
        let mut reg = self.registry();
        owned_spawner(&mut reg, peer, msg.spawner_id)?.set_running(msg.count);
        Ok(())
    }

    /// A peer went away: sweep its spawners and, if configured, abort its
    /// request that has not started a process yet.
    pub async fn handle_peer_disconnected(&self, peer: &PeerId) {
        let abort = {
            let mut guard = self.registry();
            let reg = &mut *guard;
            let Some(session) = reg.sessions.remove(peer) else {
                return;
            };
            // the worker is gone, there is no one to deliver kills to
            for spawner_id in session.spawners {
                self.remove_spawner_locked(reg, spawner_id, "owner disconnected");
            }
            session
                .active_request
                .filter(|_| self.cfg.abort_on_requester_disconnect)
                .filter(|id| {
                    reg.tasks
                        .get(id)
                        .is_some_and(|t| !t.is_done_starting_process())
                })
        };

        if let Some(id) = abort {
            info!(target: "roost.core", task_id = %id, peer = %peer, "requester disconnected; aborting");
            if let Err(e) = self.abort_task(id).await {
                debug!(target: "roost.core", task_id = %id, error = %e, "abort on disconnect skipped");
            }
        }
    }
}
