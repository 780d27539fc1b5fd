//! Messages of the spawn protocol.
//!
//! Grouped by who sends them. Field names are camelCase on the wire.

use serde::{Deserialize, Serialize};

use crate::{Properties, Region, SpawnStatus, SpawnTaskId, SpawnerId, SpawnerOptions};

/// Generic acknowledgement carrying a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ack {
    pub success: bool,
    #[serde(default)]
    pub message: String,
}

impl Ack {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: String::new(),
        }
    }

    pub fn fail(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// requester -> master
// ---------------------------------------------------------------------------

/// Ask the master to start a process somewhere.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSpawnRequest {
    /// What to run; forwarded to the process as command-line data.
    #[serde(default)]
    pub options: Properties,
    /// Empty accepts any region.
    #[serde(default)]
    pub region: Region,
    /// Extra data merged into the final argument set.
    #[serde(default)]
    pub custom_options: Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSpawnResponse {
    pub spawn_id: SpawnTaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AbortSpawnRequest {
    pub spawn_id: SpawnTaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GetSpawnFinalizationData {
    pub spawn_id: SpawnTaskId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnFinalizationData {
    pub spawn_id: SpawnTaskId,
    pub data: Properties,
}

// ---------------------------------------------------------------------------
// master -> requester (push)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnStatusChange {
    pub spawn_id: SpawnTaskId,
    pub status: SpawnStatus,
}

// ---------------------------------------------------------------------------
// worker -> master
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSpawner {
    pub options: SpawnerOptions,
    /// Where the master reaches the worker, for transports that dial back.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSpawnerResponse {
    pub spawner_id: SpawnerId,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessStarted {
    pub spawn_id: SpawnTaskId,
    /// OS process id.
    pub process_id: u32,
    /// Argument string used to launch the process, for diagnostics.
    #[serde(default)]
    pub args: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessKilled {
    pub spawn_id: SpawnTaskId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSpawnerProcessesCount {
    pub spawner_id: SpawnerId,
    pub count: u32,
}

// ---------------------------------------------------------------------------
// master -> worker
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnProcessRequest {
    pub spawner_id: SpawnerId,
    pub spawn_id: SpawnTaskId,
    pub unique_code: String,
    #[serde(default)]
    pub options: Properties,
    #[serde(default)]
    pub custom_options: Properties,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KillProcessRequest {
    pub spawner_id: SpawnerId,
    pub spawn_id: SpawnTaskId,
}

// ---------------------------------------------------------------------------
// spawned process -> master
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSpawnedProcess {
    pub spawn_id: SpawnTaskId,
    pub unique_code: String,
}

/// The process's operating instructions: the options the task was created with.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterSpawnedProcessResponse {
    pub options: Properties,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteSpawnProcess {
    pub spawn_id: SpawnTaskId,
    #[serde(default)]
    pub finalization_data: Properties,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_spawn_request_accepts_minimal_body() {
        let req: ClientSpawnRequest = serde_json::from_str("{}").unwrap();
        assert!(req.options.is_empty());
        assert!(req.region.is_empty());
    }

    #[test]
    fn spawn_process_request_wire_shape() {
        let req = SpawnProcessRequest {
            spawner_id: SpawnerId(2),
            spawn_id: SpawnTaskId(9),
            unique_code: "abc".into(),
            options: Properties::single("map", "arena"),
            custom_options: Properties::new(),
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["spawnerId"], 2);
        assert_eq!(json["spawnId"], 9);
        assert_eq!(json["uniqueCode"], "abc");
        assert_eq!(json["options"]["map"], "arena");
    }

    #[test]
    fn status_change_wire_shape() {
        let change = SpawnStatusChange {
            spawn_id: SpawnTaskId(1),
            status: SpawnStatus::ProcessRegistered,
        };
        let json = serde_json::to_string(&change).unwrap();
        assert_eq!(json, r#"{"spawnId":1,"status":"processRegistered"}"#);
    }

    #[test]
    fn register_spawner_omits_missing_endpoint() {
        let msg = RegisterSpawner::default();
        let json = serde_json::to_string(&msg).unwrap();
        assert!(!json.contains("endpoint"));
    }
}
