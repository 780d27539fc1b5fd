//! Master-side record of a worker's spawner.

use std::{
    collections::{HashSet, VecDeque},
    sync::Arc,
    time::{Instant, SystemTime},
};

use roost_model::{PeerId, SpawnTaskId, SpawnerId, SpawnerInfo, SpawnerOptions};

use crate::link::SpawnerLink;

/// A registered spawner: declared capacity, last reported load and its task queue.
///
/// Capacity accounting counts both the processes the worker reported and the tasks
/// dispatched to it but not yet confirmed (`reserved`), so a burst of dispatches
/// within one report interval cannot overshoot `max_processes`.
pub struct RegisteredSpawner {
    id: SpawnerId,
    owner: PeerId,
    options: SpawnerOptions,
    link: Arc<dyn SpawnerLink>,

    running: u32,
    queue: VecDeque<SpawnTaskId>,
    reserved: HashSet<SpawnTaskId>,

    registered_at: SystemTime,
    last_report_at: SystemTime,
    last_report: Instant,
}

impl RegisteredSpawner {
    pub fn new(
        id: SpawnerId,
        owner: PeerId,
        options: SpawnerOptions,
        link: Arc<dyn SpawnerLink>,
    ) -> Self {
        let now = SystemTime::now();
        Self {
            id,
            owner,
            options,
            link,
            running: 0,
            queue: VecDeque::new(),
            reserved: HashSet::new(),
            registered_at: now,
            last_report_at: now,
            last_report: Instant::now(),
        }
    }

    pub fn id(&self) -> SpawnerId {
        self.id
    }

    pub fn owner(&self) -> &PeerId {
        &self.owner
    }

    pub fn options(&self) -> &SpawnerOptions {
        &self.options
    }

    pub fn link(&self) -> Arc<dyn SpawnerLink> {
        Arc::clone(&self.link)
    }

    pub fn running(&self) -> u32 {
        self.running
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn reserved(&self) -> usize {
        self.reserved.len()
    }

    /// Empty `region` matches every spawner.
    pub fn serves_region(&self, region: &str) -> bool {
        region.is_empty() || self.options.region == region
    }

    fn occupied(&self) -> u64 {
        u64::from(self.running) + self.reserved.len() as u64
    }

    pub fn can_dispatch_another(&self) -> bool {
        self.options.max_processes == 0 || self.occupied() < u64::from(self.options.max_processes)
    }

    /// Free slots for ranking candidates; queued tasks count as taken.
    /// Unlimited spawners rank first.
    pub fn free_slot_estimate(&self) -> i64 {
        if self.options.max_processes == 0 {
            return i64::MAX;
        }
        let taken = self.occupied() + self.queue.len() as u64;
        i64::from(self.options.max_processes) - i64::try_from(taken).unwrap_or(i64::MAX)
    }

    pub fn enqueue(&mut self, id: SpawnTaskId) {
        self.queue.push_back(id);
    }

    /// Put a task whose dispatch failed back at the head of the queue.
    pub fn requeue_front(&mut self, id: SpawnTaskId) {
        self.reserved.remove(&id);
        self.queue.push_front(id);
    }

    pub fn is_queued(&self, id: SpawnTaskId) -> bool {
        self.queue.contains(&id)
    }

    /// Drop a task that is still waiting. Returns `false` if it was not queued.
    pub fn remove_queued(&mut self, id: SpawnTaskId) -> bool {
        match self.queue.iter().position(|&q| q == id) {
            Some(pos) => {
                self.queue.remove(pos);
                true
            }
            None => false,
        }
    }

    /// Pop queued tasks while capacity allows, reserving a slot for each.
    pub fn take_dispatchable(&mut self) -> Vec<SpawnTaskId> {
        let mut out = Vec::new();
        while self.can_dispatch_another() {
            let Some(id) = self.queue.pop_front() else {
                break;
            };
            self.reserved.insert(id);
            out.push(id);
        }
        out
    }

    /// The task's process started, exited or will never start.
    pub fn release(&mut self, id: SpawnTaskId) -> bool {
        self.reserved.remove(&id)
    }

    pub fn set_running(&mut self, count: u32) {
        self.running = count;
        self.last_report_at = SystemTime::now();
        self.last_report = Instant::now();
    }

    /// Time since the worker last reported its process count (or registered).
    pub fn silent_for(&self, now: Instant) -> std::time::Duration {
        now.saturating_duration_since(self.last_report)
    }

    pub fn info(&self) -> SpawnerInfo {
        SpawnerInfo {
            id: self.id,
            owner: self.owner.clone(),
            options: self.options.clone(),
            running_processes: self.running,
            reserved: u32::try_from(self.reserved.len()).unwrap_or(u32::MAX),
            queued: self.queue.len(),
            registered_at: self.registered_at,
            last_report_at: self.last_report_at,
        }
    }
}

#[cfg(test)]
mod tests {
    use async_trait::async_trait;
    use roost_model::message::{Ack, KillProcessRequest, SpawnProcessRequest};

    use super::*;
    use crate::error::LinkError;

    struct Nop;

    #[async_trait]
    impl SpawnerLink for Nop {
        async fn spawn_process(&self, _: SpawnProcessRequest) -> Result<Ack, LinkError> {
            Ok(Ack::ok())
        }
        async fn kill_process(&self, _: KillProcessRequest) -> Result<Ack, LinkError> {
            Ok(Ack::ok())
        }
    }

    fn spawner(max: u32) -> RegisteredSpawner {
        RegisteredSpawner::new(
            SpawnerId(1),
            PeerId::from("worker"),
            SpawnerOptions::new("10.0.0.1", max, "EU"),
            Arc::new(Nop),
        )
    }

    #[test]
    fn capacity_counts_running_and_reserved() {
        let mut s = spawner(2);
        assert!(s.can_dispatch_another());
        assert_eq!(s.free_slot_estimate(), 2);

        s.set_running(1);
        s.enqueue(SpawnTaskId(1));
        s.enqueue(SpawnTaskId(2));
        assert_eq!(s.free_slot_estimate(), -1);

        assert_eq!(s.take_dispatchable(), vec![SpawnTaskId(1)]);
        assert!(!s.can_dispatch_another());
        assert_eq!(s.queued(), 1);

        assert!(s.release(SpawnTaskId(1)));
        assert!(s.can_dispatch_another());
    }

    #[test]
    fn unlimited_spawner_always_dispatches() {
        let mut s = spawner(0);
        s.set_running(10_000);
        assert!(s.can_dispatch_another());
        assert_eq!(s.free_slot_estimate(), i64::MAX);

        for i in 0..5 {
            s.enqueue(SpawnTaskId(i));
        }
        assert_eq!(s.take_dispatchable().len(), 5);
    }

    #[test]
    fn queue_is_fifo_and_requeue_goes_first() {
        let mut s = spawner(1);
        s.enqueue(SpawnTaskId(1));
        s.enqueue(SpawnTaskId(2));

        let first = s.take_dispatchable();
        assert_eq!(first, vec![SpawnTaskId(1)]);
        s.requeue_front(SpawnTaskId(1));
        assert_eq!(s.reserved(), 0);
        assert_eq!(s.take_dispatchable(), vec![SpawnTaskId(1)]);
    }

    #[test]
    fn remove_queued_only_touches_waiting_tasks() {
        let mut s = spawner(1);
        s.enqueue(SpawnTaskId(1));
        s.enqueue(SpawnTaskId(2));
        s.take_dispatchable();

        assert!(!s.remove_queued(SpawnTaskId(1)));
        assert!(s.remove_queued(SpawnTaskId(2)));
        assert_eq!(s.queued(), 0);
    }

    #[test]
    fn region_filter() {
        let s = spawner(1);
        assert!(s.serves_region(""));
        assert!(s.serves_region("EU"));
        assert!(!s.serves_region("US"));
    }
}
