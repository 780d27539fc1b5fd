use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::{PeerId, Properties, Region, SpawnerId};

/// Capacity and placement data a worker declares when it registers.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnerOptions {
    /// Address spawned processes are reachable at.
    #[serde(default)]
    pub machine_ip: String,
    /// Maximum concurrent processes; `0` means unlimited.
    #[serde(default)]
    pub max_processes: u32,
    /// Region label used by region-filtered spawn requests.
    #[serde(default)]
    pub region: Region,
    /// Free-form properties of the worker.
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub custom: Properties,
}

impl SpawnerOptions {
    pub fn new(machine_ip: impl Into<String>, max_processes: u32, region: impl Into<Region>) -> Self {
        Self {
            machine_ip: machine_ip.into(),
            max_processes,
            region: region.into(),
            custom: Properties::new(),
        }
    }

    pub fn with_custom(mut self, custom: Properties) -> Self {
        self.custom = custom;
        self
    }
}

/// Read-only snapshot of a registered spawner.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnerInfo {
    pub id: SpawnerId,
    /// Network identity of the worker that registered the spawner.
    pub owner: PeerId,
    pub options: SpawnerOptions,
    /// Last process count reported by the worker.
    pub running_processes: u32,
    /// Tasks dispatched but not yet confirmed started.
    pub reserved: u32,
    /// Tasks waiting in the spawner queue.
    pub queued: usize,
    #[serde(with = "super::spawn_info::time_serde")]
    pub registered_at: SystemTime,
    /// Last time the worker reported its process count.
    #[serde(with = "super::spawn_info::time_serde")]
    pub last_report_at: SystemTime,
}
