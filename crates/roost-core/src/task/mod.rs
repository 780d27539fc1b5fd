//! Spawn task record and its state machine.
//!
//! ```text
//! None ──started──▶ WaitingForProcess ──registered──▶ ProcessRegistered ──finalized──▶ Finalized
//!   │                     │                                  │
//!   └──────────abort──────┴────────────abort─────────────────┘
//!                          ▼
//!                      Aborting ──confirmed / killed──▶ Aborted
//! ```
//!
//! `Killed` is reached when the worker reports the process exited before the task
//! finished. A kill report on a task that is already terminal only sets the `killed`
//! flag.

use std::time::{Instant, SystemTime};

use roost_model::{PeerId, Properties, Region, SpawnStatus, SpawnTaskId, SpawnTaskInfo, SpawnerId};
use tokio::sync::oneshot;

use crate::error::CoreError;

/// What the caller must do after [`SpawnTask::begin_abort`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortPlan {
    /// The task just entered `Aborting`; the process (if any) has to be stopped.
    Started,
    /// An abort is already in flight.
    InProgress,
}

#[derive(Debug)]
pub struct SpawnTask {
    id: SpawnTaskId,
    spawner_id: SpawnerId,
    unique_code: String,
    region: Region,
    options: Properties,
    custom_options: Properties,

    status: SpawnStatus,
    killed: bool,
    requester: Option<PeerId>,
    registered_peer: Option<PeerId>,
    watchers: Vec<PeerId>,
    process_id: Option<u32>,
    process_args: Option<String>,
    finalization: Option<Properties>,
    dispatch_attempts: u32,

    created_at: SystemTime,
    updated_at: SystemTime,
    finished_at: Option<Instant>,
    waiters: Vec<oneshot::Sender<SpawnStatus>>,
}

impl SpawnTask {
    pub fn new(
        id: SpawnTaskId,
        spawner_id: SpawnerId,
        unique_code: String,
        region: Region,
        options: Properties,
        custom_options: Properties,
        requester: Option<PeerId>,
    ) -> Self {
        let now = SystemTime::now();
        let watchers = requester.iter().cloned().collect();
        Self {
            id,
            spawner_id,
            unique_code,
            region,
            options,
            custom_options,
            status: SpawnStatus::None,
            killed: false,
            requester,
            registered_peer: None,
            watchers,
            process_id: None,
            process_args: None,
            finalization: None,
            dispatch_attempts: 0,
            created_at: now,
            updated_at: now,
            finished_at: None,
            waiters: Vec::new(),
        }
    }

    pub fn id(&self) -> SpawnTaskId {
        self.id
    }

    pub fn spawner_id(&self) -> SpawnerId {
        self.spawner_id
    }

    pub fn status(&self) -> SpawnStatus {
        self.status
    }

    pub fn killed(&self) -> bool {
        self.killed
    }

    pub fn unique_code(&self) -> &str {
        &self.unique_code
    }

    pub fn options(&self) -> &Properties {
        &self.options
    }

    pub fn custom_options(&self) -> &Properties {
        &self.custom_options
    }

    pub fn requester(&self) -> Option<&PeerId> {
        self.requester.as_ref()
    }

    pub fn registered_peer(&self) -> Option<&PeerId> {
        self.registered_peer.as_ref()
    }

    pub fn watchers(&self) -> &[PeerId] {
        &self.watchers
    }

    pub fn finalization(&self) -> Option<&Properties> {
        self.finalization.as_ref()
    }

    pub fn dispatch_attempts(&self) -> u32 {
        self.dispatch_attempts
    }

    pub fn finished_at(&self) -> Option<Instant> {
        self.finished_at
    }

    #[inline]
    pub fn is_aborted(&self) -> bool {
        self.status.is_aborted()
    }

    #[inline]
    pub fn is_process_started(&self) -> bool {
        self.status.is_process_started()
    }

    /// The request no longer blocks its requester from issuing another one.
    #[inline]
    pub fn is_done_starting_process(&self) -> bool {
        self.is_aborted() || self.is_process_started()
    }

    #[inline]
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Compare `code` with the task's unique code without early exit.
    pub fn code_matches(&self, code: &str) -> bool {
        let (a, b) = (self.unique_code.as_bytes(), code.as_bytes());
        if a.len() != b.len() {
            return false;
        }
        a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
    }

    /// Count a dispatch attempt and return the new total.
    pub fn mark_dispatched(&mut self) -> u32 {
        self.dispatch_attempts += 1;
        self.dispatch_attempts
    }

    /// The worker launched the process.
    ///
    /// Returns `false` (and changes nothing) unless the task is still `None`.
    pub fn on_process_started(&mut self, process_id: u32, args: String) -> bool {
        if self.status != SpawnStatus::None {
            return false;
        }
        self.process_id = Some(process_id);
        self.process_args = Some(args);
        self.set_status(SpawnStatus::WaitingForProcess);
        true
    }

    /// The spawned process presented `code` from connection `peer`.
    pub fn on_registered(&mut self, peer: PeerId, code: &str) -> Result<(), CoreError> {
        if !self.code_matches(code) {
            return Err(CoreError::Unauthorized(format!(
                "invalid unique code for spawn task {}",
                self.id
            )));
        }
        if self.registered_peer.is_some() {
            return Err(CoreError::InvalidState(format!(
                "spawn task {} already has a registered process",
                self.id
            )));
        }
        match self.status {
            SpawnStatus::None | SpawnStatus::WaitingForProcess => {
                self.registered_peer = Some(peer);
                self.set_status(SpawnStatus::ProcessRegistered);
                Ok(())
            }
            other => Err(CoreError::InvalidState(format!(
                "spawn task {} cannot accept a process in state {other}",
                self.id
            ))),
        }
    }

    /// The registered process delivered its finalization data.
    pub fn on_finalized(&mut self, peer: &PeerId, data: Properties) -> Result<(), CoreError> {
        if self.registered_peer.as_ref() != Some(peer) {
            return Err(CoreError::Unauthorized(format!(
                "{peer} is not the registered process of spawn task {}",
                self.id
            )));
        }
        match self.status {
            SpawnStatus::ProcessRegistered => {
                self.finalization = Some(data);
                self.set_status(SpawnStatus::Finalized);
                Ok(())
            }
            SpawnStatus::Finalized => Err(CoreError::AlreadyFinalized(self.id)),
            other => Err(CoreError::InvalidState(format!(
                "spawn task {} cannot finalize in state {other}",
                self.id
            ))),
        }
    }

    /// Move the task into `Aborting`.
    pub fn begin_abort(&mut self) -> Result<AbortPlan, CoreError> {
        match self.status {
            SpawnStatus::Finalized => Err(CoreError::AlreadyFinalized(self.id)),
            SpawnStatus::Aborted | SpawnStatus::Killed => Err(CoreError::InvalidState(format!(
                "spawn task {} is already {}",
                self.id, self.status
            ))),
            SpawnStatus::Aborting => Ok(AbortPlan::InProgress),
            SpawnStatus::None | SpawnStatus::WaitingForProcess | SpawnStatus::ProcessRegistered => {
                self.set_status(SpawnStatus::Aborting);
                Ok(AbortPlan::Started)
            }
        }
    }

    /// Complete an abort started with [`begin_abort`](Self::begin_abort).
    pub fn confirm_aborted(&mut self) -> bool {
        if self.status != SpawnStatus::Aborting {
            return false;
        }
        self.set_status(SpawnStatus::Aborted);
        true
    }

    /// The worker reported the process exited. Returns `true` if the status changed.
    pub fn on_killed(&mut self) -> bool {
        self.killed = true;
        match self.status {
            SpawnStatus::Finalized | SpawnStatus::Aborted | SpawnStatus::Killed => {
                self.updated_at = SystemTime::now();
                false
            }
            SpawnStatus::Aborting => {
                self.set_status(SpawnStatus::Aborted);
                true
            }
            SpawnStatus::None | SpawnStatus::WaitingForProcess | SpawnStatus::ProcessRegistered => {
                self.set_status(SpawnStatus::Killed);
                true
            }
        }
    }

    /// Terminate a non-terminal task without talking to its worker.
    pub fn force_abort(&mut self) -> bool {
        if self.is_terminal() {
            return false;
        }
        self.set_status(SpawnStatus::Aborted);
        true
    }

    /// Receiver resolved with the terminal status. Resolves at once for a terminal task.
    pub fn wait_done(&mut self) -> oneshot::Receiver<SpawnStatus> {
        let (tx, rx) = oneshot::channel();
        if self.is_terminal() {
            let _ = tx.send(self.status);
        } else {
            self.waiters.push(tx);
        }
        rx
    }

    /// Terminal for at least `ttl` as of `now`.
    pub fn is_expired(&self, now: Instant, ttl: std::time::Duration) -> bool {
        self.finished_at
            .is_some_and(|at| now.saturating_duration_since(at) >= ttl)
    }

    pub fn info(&self) -> SpawnTaskInfo {
        SpawnTaskInfo {
            id: self.id,
            spawner_id: self.spawner_id,
            region: self.region.clone(),
            status: self.status,
            killed: self.killed,
            requester: self.requester.clone(),
            registered_peer: self.registered_peer.clone(),
            process_id: self.process_id,
            process_args: self.process_args.clone(),
            options: self.options.clone(),
            custom_options: self.custom_options.clone(),
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }

    fn set_status(&mut self, status: SpawnStatus) {
        self.status = status;
        self.updated_at = SystemTime::now();
        if status.is_terminal() && self.finished_at.is_none() {
            self.finished_at = Some(Instant::now());
            for tx in self.waiters.drain(..) {
                let _ = tx.send(status);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> SpawnTask {
        SpawnTask::new(
            SpawnTaskId(1),
            SpawnerId(1),
            "secret-code".into(),
            String::new(),
            Properties::single("map", "arena"),
            Properties::new(),
            Some(PeerId::from("client")),
        )
    }

    #[test]
    fn happy_path_reaches_finalized() {
        let mut t = task();
        assert!(!t.is_done_starting_process());

        assert!(t.on_process_started(42, "--x 1".into()));
        assert_eq!(t.status(), SpawnStatus::WaitingForProcess);
        assert!(t.is_done_starting_process());

        t.on_registered(PeerId::from("proc"), "secret-code").unwrap();
        assert_eq!(t.status(), SpawnStatus::ProcessRegistered);

        t.on_finalized(&PeerId::from("proc"), Properties::single("score", "7"))
            .unwrap();
        assert_eq!(t.status(), SpawnStatus::Finalized);
        assert_eq!(t.finalization().and_then(|d| d.get("score")), Some("7"));
        assert!(t.finished_at().is_some());
    }

    #[test]
    fn registration_may_precede_process_started() {
        let mut t = task();
        t.on_registered(PeerId::from("proc"), "secret-code").unwrap();
        assert_eq!(t.status(), SpawnStatus::ProcessRegistered);

        assert!(!t.on_process_started(42, String::new()));
        assert_eq!(t.status(), SpawnStatus::ProcessRegistered);
    }

    #[test]
    fn wrong_code_is_rejected_without_transition() {
        let mut t = task();
        let err = t.on_registered(PeerId::from("proc"), "guess").unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));
        assert_eq!(t.status(), SpawnStatus::None);
        assert!(t.registered_peer().is_none());
    }

    #[test]
    fn second_registration_is_rejected() {
        let mut t = task();
        t.on_registered(PeerId::from("a"), "secret-code").unwrap();
        assert!(t.on_registered(PeerId::from("b"), "secret-code").is_err());
        assert_eq!(t.registered_peer(), Some(&PeerId::from("a")));
    }

    #[test]
    fn finalize_requires_registered_peer() {
        let mut t = task();
        t.on_registered(PeerId::from("a"), "secret-code").unwrap();
        let err = t
            .on_finalized(&PeerId::from("b"), Properties::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::Unauthorized(_)));

        t.on_finalized(&PeerId::from("a"), Properties::new()).unwrap();
        let err = t
            .on_finalized(&PeerId::from("a"), Properties::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::AlreadyFinalized(_)));
    }

    #[test]
    fn abort_then_confirm() {
        let mut t = task();
        assert_eq!(t.begin_abort().unwrap(), AbortPlan::Started);
        assert_eq!(t.status(), SpawnStatus::Aborting);
        assert_eq!(t.begin_abort().unwrap(), AbortPlan::InProgress);

        assert!(t.confirm_aborted());
        assert_eq!(t.status(), SpawnStatus::Aborted);
        assert!(t.begin_abort().is_err());
    }

    #[test]
    fn aborted_task_refuses_registration() {
        let mut t = task();
        t.begin_abort().unwrap();
        assert!(t.on_registered(PeerId::from("p"), "secret-code").is_err());
        assert!(!t.on_process_started(1, String::new()));
    }

    #[test]
    fn kill_after_finalized_only_sets_flag() {
        let mut t = task();
        t.on_registered(PeerId::from("p"), "secret-code").unwrap();
        t.on_finalized(&PeerId::from("p"), Properties::new()).unwrap();

        assert!(!t.on_killed());
        assert_eq!(t.status(), SpawnStatus::Finalized);
        assert!(t.killed());
    }

    #[test]
    fn kill_while_aborting_completes_abort() {
        let mut t = task();
        t.begin_abort().unwrap();
        assert!(t.on_killed());
        assert_eq!(t.status(), SpawnStatus::Aborted);
        assert!(t.killed());
    }

    #[test]
    fn kill_of_running_task_marks_killed() {
        let mut t = task();
        t.on_process_started(7, String::new());
        assert!(t.on_killed());
        assert_eq!(t.status(), SpawnStatus::Killed);
        assert!(t.begin_abort().is_err());
    }

    #[test]
    fn finalize_cannot_follow_abort() {
        let mut t = task();
        t.on_registered(PeerId::from("p"), "secret-code").unwrap();
        t.begin_abort().unwrap();
        assert!(t.on_finalized(&PeerId::from("p"), Properties::new()).is_err());
    }

    #[tokio::test]
    async fn waiters_fire_once_on_terminal() {
        let mut t = task();
        let a = t.wait_done();
        let b = t.wait_done();
        t.force_abort();
        assert_eq!(a.await.unwrap(), SpawnStatus::Aborted);
        assert_eq!(b.await.unwrap(), SpawnStatus::Aborted);

        // killed flag after terminal must not refire or change the status
        t.on_killed();
        let late = t.wait_done();
        assert_eq!(late.await.unwrap(), SpawnStatus::Aborted);
    }

    #[test]
    fn expiry_counts_from_terminal_transition() {
        let mut t = task();
        let ttl = std::time::Duration::from_secs(60);
        assert!(!t.is_expired(Instant::now(), ttl));

        t.force_abort();
        let done = t.finished_at().unwrap();
        assert!(!t.is_expired(done, ttl));
        assert!(t.is_expired(done + ttl, ttl));
    }
}
