use std::{cmp::Ordering, fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Progress of a spawn task.
///
/// Ordered by [`SpawnStatus::code`]: the abort branch is negative, normal progress is
/// `None(0) < WaitingForProcess(1) < ProcessRegistered(2) < Finalized(3)`.
/// `Killed` sits below the abort branch: a process that died without finalizing.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SpawnStatus {
    /// The process exited (crash, graceful stop, external kill) before finalizing.
    Killed,
    /// Abort confirmed by the worker, or forced by the coordinator.
    Aborted,
    /// Abort requested; waiting for the worker to acknowledge the kill.
    Aborting,
    /// Task accepted and queued on a spawner.
    #[default]
    None,
    /// The worker launched the OS process; waiting for it to register.
    WaitingForProcess,
    /// The process connected to the master and presented the task's unique code.
    ProcessRegistered,
    /// The process reported its finalization data.
    Finalized,
}

impl SpawnStatus {
    /// Integer code of the state; defines the ordering.
    pub const fn code(self) -> i8 {
        match self {
            SpawnStatus::Killed => -3,
            SpawnStatus::Aborted => -2,
            SpawnStatus::Aborting => -1,
            SpawnStatus::None => 0,
            SpawnStatus::WaitingForProcess => 1,
            SpawnStatus::ProcessRegistered => 2,
            SpawnStatus::Finalized => 3,
        }
    }

    /// Returns `true` for states that admit no further forward transition.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SpawnStatus::Finalized | SpawnStatus::Aborted | SpawnStatus::Killed
        )
    }

    /// Returns `true` for every state of the abort/kill branch (`code < 0`).
    pub fn is_aborted(self) -> bool {
        self.code() < SpawnStatus::None.code()
    }

    /// Returns `true` once the worker confirmed the process launched.
    pub fn is_process_started(self) -> bool {
        self.code() >= SpawnStatus::WaitingForProcess.code()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SpawnStatus::Killed => "killed",
            SpawnStatus::Aborted => "aborted",
            SpawnStatus::Aborting => "aborting",
            SpawnStatus::None => "none",
            SpawnStatus::WaitingForProcess => "waitingForProcess",
            SpawnStatus::ProcessRegistered => "processRegistered",
            SpawnStatus::Finalized => "finalized",
        }
    }
}

impl PartialOrd for SpawnStatus {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for SpawnStatus {
    fn cmp(&self, other: &Self) -> Ordering {
        self.code().cmp(&other.code())
    }
}

impl fmt::Display for SpawnStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SpawnStatus {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "killed" => Ok(SpawnStatus::Killed),
            "aborted" => Ok(SpawnStatus::Aborted),
            "aborting" => Ok(SpawnStatus::Aborting),
            "none" | "queued" => Ok(SpawnStatus::None),
            "waitingforprocess" | "waiting" => Ok(SpawnStatus::WaitingForProcess),
            "processregistered" | "registered" => Ok(SpawnStatus::ProcessRegistered),
            "finalized" => Ok(SpawnStatus::Finalized),
            _ => Err(ModelError::InvalidStatus(s.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ordering_follows_codes() {
        assert!(SpawnStatus::Killed < SpawnStatus::Aborted);
        assert!(SpawnStatus::Aborted < SpawnStatus::Aborting);
        assert!(SpawnStatus::Aborting < SpawnStatus::None);
        assert!(SpawnStatus::None < SpawnStatus::WaitingForProcess);
        assert!(SpawnStatus::WaitingForProcess < SpawnStatus::ProcessRegistered);
        assert!(SpawnStatus::ProcessRegistered < SpawnStatus::Finalized);
    }

    #[test]
    fn terminal_states() {
        assert!(SpawnStatus::Finalized.is_terminal());
        assert!(SpawnStatus::Aborted.is_terminal());
        assert!(SpawnStatus::Killed.is_terminal());

        assert!(!SpawnStatus::Aborting.is_terminal());
        assert!(!SpawnStatus::None.is_terminal());
        assert!(!SpawnStatus::WaitingForProcess.is_terminal());
        assert!(!SpawnStatus::ProcessRegistered.is_terminal());
    }

    #[test]
    fn derived_predicates() {
        assert!(SpawnStatus::Aborting.is_aborted());
        assert!(SpawnStatus::Killed.is_aborted());
        assert!(!SpawnStatus::None.is_aborted());

        assert!(SpawnStatus::WaitingForProcess.is_process_started());
        assert!(SpawnStatus::Finalized.is_process_started());
        assert!(!SpawnStatus::None.is_process_started());
    }

    #[test]
    fn parse_accepts_wire_names_and_aliases() {
        for status in [
            SpawnStatus::Killed,
            SpawnStatus::Aborted,
            SpawnStatus::Aborting,
            SpawnStatus::None,
            SpawnStatus::WaitingForProcess,
            SpawnStatus::ProcessRegistered,
            SpawnStatus::Finalized,
        ] {
            assert_eq!(status.as_str().parse::<SpawnStatus>().unwrap(), status);
        }
        assert_eq!("waiting".parse::<SpawnStatus>().unwrap(), SpawnStatus::WaitingForProcess);
        assert!("running".parse::<SpawnStatus>().is_err());
    }

    #[test]
    fn new_tasks_start_in_none() {
        assert_eq!(SpawnStatus::default(), SpawnStatus::None);
    }

    #[test]
    fn serde_uses_camel_case() {
        let json = serde_json::to_string(&SpawnStatus::WaitingForProcess).unwrap();
        assert_eq!(json, r#""waitingForProcess""#);
    }
}
