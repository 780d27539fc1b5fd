use std::time::Duration;

use roost_model::{PermissionLevel, TimeoutMs};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Settings of the master-side coordinator.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Interval of the queue-draining tick.
    pub tick_interval_ms: TimeoutMs,
    /// Minimum permission level to register a spawner.
    pub register_spawner_permission: PermissionLevel,
    /// Minimum permission level to issue a client spawn request.
    pub client_spawn_permission: PermissionLevel,
    /// Permission level allowed to act on tasks it did not request.
    pub admin_permission: PermissionLevel,
    /// Attempts per task before a dispatch that keeps failing in transport aborts it.
    pub dispatch_attempts: u32,
    /// Upper bound for a single dispatch or kill call to a worker.
    pub link_timeout_ms: TimeoutMs,
    /// How long a terminal task stays queryable before eviction.
    pub completed_task_ttl_ms: TimeoutMs,
    /// Evict a finalized task as soon as its finalization data has been fetched.
    pub purge_on_fetch: bool,
    /// Sweep spawners that have not reported a process count for this long.
    pub spawner_timeout_ms: Option<TimeoutMs>,
    /// Abort a requester's unfinished request when the requester disconnects.
    pub abort_on_requester_disconnect: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 100,
            register_spawner_permission: 0,
            client_spawn_permission: 0,
            admin_permission: 100,
            dispatch_attempts: 3,
            link_timeout_ms: 5_000,
            completed_task_ttl_ms: 600_000,
            purge_on_fetch: false,
            spawner_timeout_ms: None,
            abort_on_requester_disconnect: true,
        }
    }
}

impl CoordinatorConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn link_timeout(&self) -> Duration {
        Duration::from_millis(self.link_timeout_ms)
    }

    pub fn completed_task_ttl(&self) -> Duration {
        Duration::from_millis(self.completed_task_ttl_ms)
    }

    pub fn spawner_timeout(&self) -> Option<Duration> {
        self.spawner_timeout_ms.map(Duration::from_millis)
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.tick_interval_ms == 0 {
            return Err(CoreError::InvalidConfig("tick_interval_ms cannot be zero".into()));
        }
        if self.dispatch_attempts == 0 {
            return Err(CoreError::InvalidConfig("dispatch_attempts cannot be zero".into()));
        }
        if self.link_timeout_ms == 0 {
            return Err(CoreError::InvalidConfig("link_timeout_ms cannot be zero".into()));
        }
        if self.spawner_timeout_ms == Some(0) {
            return Err(CoreError::InvalidConfig("spawner_timeout_ms cannot be zero".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = CoordinatorConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.tick_interval(), Duration::from_millis(100));
        assert!(cfg.spawner_timeout().is_none());
    }

    #[test]
    fn zero_values_are_rejected() {
        let cfg = CoordinatorConfig {
            dispatch_attempts: 0,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(CoreError::InvalidConfig(_))));

        let cfg = CoordinatorConfig {
            spawner_timeout_ms: Some(0),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }
}
