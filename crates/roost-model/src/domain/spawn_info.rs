use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::{PeerId, Properties, Region, SpawnStatus, SpawnTaskId, SpawnerId};

/// Detailed, read-only view of a spawn task.
///
/// The unique code is deliberately absent: it only ever travels to the worker that launches the process.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpawnTaskInfo {
    pub id: SpawnTaskId,
    /// Spawner the task was queued on.
    pub spawner_id: SpawnerId,
    /// Region the request asked for (empty when any region was accepted).
    #[serde(default)]
    pub region: Region,
    pub status: SpawnStatus,
    /// Set when the worker reported the process exited, whatever the recorded status.
    #[serde(default)]
    pub killed: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub requester: Option<PeerId>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registered_peer: Option<PeerId>,
    /// OS process id reported by the worker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_id: Option<u32>,
    /// Argument string the process was launched with.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub process_args: Option<String>,
    pub options: Properties,
    #[serde(default, skip_serializing_if = "Properties::is_empty")]
    pub custom_options: Properties,
    #[serde(with = "time_serde")]
    pub created_at: SystemTime,
    #[serde(with = "time_serde")]
    pub updated_at: SystemTime,
}

pub(crate) mod time_serde {
    use serde::{Deserialize, Deserializer, Serialize, Serializer};
    use std::time::{SystemTime, UNIX_EPOCH};

    pub fn serialize<S>(time: &SystemTime, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let since_epoch = time
            .duration_since(UNIX_EPOCH)
            .map_err(serde::ser::Error::custom)?;
        since_epoch.as_secs().serialize(serializer)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<SystemTime, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(UNIX_EPOCH + std::time::Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> SpawnTaskInfo {
        SpawnTaskInfo {
            id: SpawnTaskId(3),
            spawner_id: SpawnerId(1),
            region: "EU".to_string(),
            status: SpawnStatus::WaitingForProcess,
            killed: false,
            requester: Some(PeerId::from("client-1")),
            registered_peer: None,
            process_id: Some(4242),
            process_args: None,
            options: Properties::single("map", "arena"),
            custom_options: Properties::new(),
            created_at: SystemTime::now(),
            updated_at: SystemTime::now(),
        }
    }

    #[test]
    fn spawn_info_serde_roundtrip() {
        let info = sample();
        let json = serde_json::to_string(&info).unwrap();
        let back: SpawnTaskInfo = serde_json::from_str(&json).unwrap();

        assert_eq!(back.id, info.id);
        assert_eq!(back.spawner_id, info.spawner_id);
        assert_eq!(back.status, info.status);
        assert_eq!(back.requester, info.requester);
        assert_eq!(back.options, info.options);
    }

    #[test]
    fn spawn_info_omits_absent_fields() {
        let json = serde_json::to_string(&sample()).unwrap();
        assert!(!json.contains("registeredPeer"));
        assert!(!json.contains("processArgs"));
        assert!(!json.contains("customOptions"));
        assert!(json.contains("\"processId\":4242"));
    }
}
