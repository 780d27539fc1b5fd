//! Periodic work: dispatching queued tasks, evicting old ones and reaping silent spawners.

use std::{sync::Arc, time::Instant};

use roost_model::{SpawnStatus, SpawnTaskId, SpawnerId, message::SpawnProcessRequest};
use tokio::{
    task::JoinSet,
    time::{self, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::{Registry, SpawnCoordinator};
use crate::{
    error::LinkError,
    events::{EventKind, SpawnEvent},
    link::SpawnerLink,
};

struct Dispatch {
    order: usize,
    attempt: u32,
    link: Arc<dyn SpawnerLink>,
    req: SpawnProcessRequest,
}

struct Failure {
    order: usize,
    spawner_id: SpawnerId,
    spawn_id: SpawnTaskId,
    attempt: u32,
    error: LinkError,
}

impl SpawnCoordinator {
    /// Tick until `cancel` fires. Ticks never overlap; missed ticks are skipped.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) {
        let mut interval = time::interval(self.cfg.tick_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
        info!(
            target: "roost.core",
            tick_ms = self.cfg.tick_interval_ms,
            "coordinator loop started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = interval.tick() => self.tick().await,
            }
        }
        info!(target: "roost.core", "coordinator loop stopped");
    }

    /// One pass of the periodic work.
    pub async fn tick(&self) {
        self.reap_silent_spawners();
        self.dispatch_pending().await;
        self.evict_expired();
    }

    /// Send every queued task its spawner has room for, concurrently.
    ///
    /// A failing or hanging spawner only affects its own tasks.
    pub async fn dispatch_pending(&self) {
        let batch = self.collect_dispatches();
        if batch.is_empty() {
            return;
        }

        let timeout = self.cfg.link_timeout();
        let mut set = JoinSet::new();
        for d in batch {
            set.spawn(async move {
                let res = match time::timeout(timeout, d.link.spawn_process(d.req.clone())).await {
                    Ok(Ok(ack)) if ack.success => Ok(()),
                    Ok(Ok(ack)) => Err(LinkError::Rejected(ack.message)),
                    Ok(Err(e)) => Err(e),
                    Err(_) => Err(LinkError::Timeout(timeout)),
                };
                res.err().map(|error| Failure {
                    order: d.order,
                    spawner_id: d.req.spawner_id,
                    spawn_id: d.req.spawn_id,
                    attempt: d.attempt,
                    error,
                })
            });
        }

        let mut failures = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Some(failure)) => failures.push(failure),
                Ok(None) => {}
                Err(e) => error!(target: "roost.core", error = %e, "dispatch task panicked"),
            }
        }
        if failures.is_empty() {
            return;
        }

        // requeue back to front so the original queue order survives
        failures.sort_by(|a, b| b.order.cmp(&a.order));
        let mut guard = self.registry();
        let reg = &mut *guard;
        for failure in failures {
            self.apply_dispatch_failure(reg, failure);
        }
    }

    fn collect_dispatches(&self) -> Vec<Dispatch> {
        let mut guard = self.registry();
        let reg = &mut *guard;
        let mut batch = Vec::new();

        for spawner in reg.spawners.values_mut() {
            for id in spawner.take_dispatchable() {
                let Some(task) = reg.tasks.get_mut(&id) else {
                    spawner.release(id);
                    continue;
                };
                if task.status() != SpawnStatus::None {
                    spawner.release(id);
                    continue;
                }
                let attempt = task.mark_dispatched();
                debug!(
                    target: "roost.core",
                    task_id = %id,
                    spawner_id = %spawner.id(),
                    attempt,
                    "dispatching spawn task"
                );
                batch.push(Dispatch {
                    order: batch.len(),
                    attempt,
                    link: spawner.link(),
                    req: SpawnProcessRequest {
                        spawner_id: spawner.id(),
                        spawn_id: id,
                        unique_code: task.unique_code().to_string(),
                        options: task.options().clone(),
                        custom_options: task.custom_options().clone(),
                    },
                });
            }
        }
        batch
    }

    fn apply_dispatch_failure(&self, reg: &mut Registry, f: Failure) {
        let spawner = reg.spawners.get_mut(&f.spawner_id);
        let Some(task) = reg.tasks.get_mut(&f.spawn_id) else {
            if let Some(spawner) = spawner {
                spawner.release(f.spawn_id);
            }
            return;
        };

        // started, aborted or swept while the call was in flight
        if task.status() != SpawnStatus::None {
            if let Some(spawner) = spawner {
                spawner.release(f.spawn_id);
            }
            return;
        }

        let event = SpawnEvent::new(EventKind::DispatchRetry)
            .with_spawn(f.spawn_id)
            .with_spawner(f.spawner_id)
            .with_attempt(f.attempt)
            .with_reason(f.error.to_string());

        match spawner {
            Some(spawner) if f.error.is_retryable() && f.attempt < self.cfg.dispatch_attempts => {
                warn!(
                    target: "roost.core",
                    task_id = %f.spawn_id,
                    spawner_id = %f.spawner_id,
                    attempt = f.attempt,
                    error = %f.error,
                    "dispatch failed; requeued"
                );
                spawner.requeue_front(f.spawn_id);
                self.events.publish(event);
            }
            spawner => {
                error!(
                    target: "roost.core",
                    task_id = %f.spawn_id,
                    spawner_id = %f.spawner_id,
                    attempt = f.attempt,
                    error = %f.error,
                    "dispatch failed; aborting spawn task"
                );
                if let Some(spawner) = spawner {
                    spawner.release(f.spawn_id);
                }
                let mut event = event;
                event.kind = EventKind::DispatchFailed;
                self.events.publish(event);
                if task.force_abort() {
                    self.publish_status(task);
                }
            }
        }
    }

    /// Drop terminal tasks older than the configured TTL. Returns how many were dropped.
    pub fn evict_expired(&self) -> usize {
        let ttl = self.cfg.completed_task_ttl();
        let now = Instant::now();

        let mut guard = self.registry();
        let reg = &mut *guard;
        let expired: Vec<SpawnTaskId> = reg
            .tasks
            .values()
            .filter(|t| t.is_expired(now, ttl))
            .map(|t| t.id())
            .collect();
        for id in &expired {
            self.evict_locked(reg, *id);
        }
        expired.len()
    }

    pub(super) fn evict_locked(&self, reg: &mut Registry, id: SpawnTaskId) {
        let Some(task) = reg.tasks.remove(&id) else {
            return;
        };
        reg.sessions
            .forget_task(task.requester(), task.registered_peer(), id);
        debug!(target: "roost.core", task_id = %id, status = %task.status(), "spawn task evicted");
        self.events.publish(
            SpawnEvent::new(EventKind::TaskEvicted)
                .with_spawn(id)
                .with_spawner(task.spawner_id())
                .with_status(task.status()),
        );
    }

    /// Sweep spawners whose worker stopped reporting. Returns the removed ids.
    pub fn reap_silent_spawners(&self) -> Vec<SpawnerId> {
        let Some(timeout) = self.cfg.spawner_timeout() else {
            return Vec::new();
        };
        let now = Instant::now();

        let mut guard = self.registry();
        let reg = &mut *guard;
        let silent: Vec<SpawnerId> = reg
            .spawners
            .values()
            .filter(|s| s.silent_for(now) >= timeout)
            .map(|s| s.id())
            .collect();
        // a silent worker is treated as gone; it has to register again
        for id in &silent {
            self.remove_spawner_locked(reg, *id, "no process count report");
        }
        silent
    }
}
