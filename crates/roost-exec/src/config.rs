use std::{path::PathBuf, time::Duration};

use roost_model::{Properties, Region, SpawnerOptions, TimeoutMs};
use serde::{Deserialize, Serialize};

use crate::{error::ExecError, limits::RlimitConfig};

/// Worker-local execution settings.
///
/// Held by the controller behind a lock and read again on every dispatch, so an
/// operator can change it while the worker runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnerConfig {
    /// Default executable; a task's `executable` option takes priority.
    pub executable_path: Option<PathBuf>,
    /// Address advertised to clients and passed to spawned processes.
    pub machine_ip: String,
    /// Replace `machine_ip` with the address reported by `public_ip_url` at start-up.
    pub use_public_ip: bool,
    pub public_ip_url: String,
    pub region: Region,
    /// `0` means unlimited.
    pub max_processes: u32,
    /// Master address passed to spawned processes, if it differs from the one the worker uses.
    pub master_ip: Option<String>,
    pub master_port: Option<u16>,
    /// First port handed to spawned processes.
    pub port_range_start: u16,
    /// Last port handed to spawned processes (inclusive).
    pub port_range_end: u16,
    /// Free-form properties announced with the spawner.
    pub custom_options: Properties,
    /// Appended verbatim after all generated arguments.
    pub extra_args: Vec<String>,
    /// Time between SIGTERM and SIGKILL when a process is killed.
    pub kill_grace_ms: TimeoutMs,
    /// Interval of the periodic process-count report.
    pub report_interval_ms: TimeoutMs,
    /// Forward the stdout/stderr lines of spawned processes to the log.
    pub log_process_output: bool,
    pub rlimits: RlimitConfig,
}

impl Default for SpawnerConfig {
    fn default() -> Self {
        Self {
            executable_path: None,
            machine_ip: "127.0.0.1".to_string(),
            use_public_ip: false,
            public_ip_url: "https://api.ipify.org".to_string(),
            region: String::new(),
            max_processes: 0,
            master_ip: None,
            master_port: None,
            port_range_start: 1500,
            port_range_end: 4000,
            custom_options: Properties::new(),
            extra_args: Vec::new(),
            kill_grace_ms: 3_000,
            report_interval_ms: 5_000,
            log_process_output: false,
            rlimits: RlimitConfig::default(),
        }
    }
}

impl SpawnerConfig {
    pub fn kill_grace(&self) -> Duration {
        Duration::from_millis(self.kill_grace_ms)
    }

    pub fn report_interval(&self) -> Duration {
        Duration::from_millis(self.report_interval_ms)
    }

    /// What the worker declares when it registers.
    pub fn spawner_options(&self) -> SpawnerOptions {
        SpawnerOptions::new(self.machine_ip.clone(), self.max_processes, self.region.clone())
            .with_custom(self.custom_options.clone())
    }

    pub fn validate(&self) -> Result<(), ExecError> {
        if self.machine_ip.trim().is_empty() && !self.use_public_ip {
            return Err(ExecError::InvalidConfig("machine_ip is empty".into()));
        }
        if self.use_public_ip && self.public_ip_url.trim().is_empty() {
            return Err(ExecError::InvalidConfig(
                "use_public_ip requires public_ip_url".into(),
            ));
        }
        if self.port_range_start == 0 || self.port_range_start > self.port_range_end {
            return Err(ExecError::InvalidConfig(format!(
                "invalid port range {}..={}",
                self.port_range_start, self.port_range_end
            )));
        }
        if self.report_interval_ms == 0 {
            return Err(ExecError::InvalidConfig(
                "report_interval_ms cannot be zero".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let cfg = SpawnerConfig::default();
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.kill_grace(), Duration::from_secs(3));
    }

    #[test]
    fn bad_port_range_is_rejected() {
        let cfg = SpawnerConfig {
            port_range_start: 5000,
            port_range_end: 4000,
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(ExecError::InvalidConfig(_))));
    }

    #[test]
    fn spawner_options_follow_config() {
        let cfg = SpawnerConfig {
            machine_ip: "10.1.2.3".into(),
            region: "EU".into(),
            max_processes: 8,
            custom_options: Properties::single("gpu", "yes"),
            ..Default::default()
        };
        let opts = cfg.spawner_options();
        assert_eq!(opts.machine_ip, "10.1.2.3");
        assert_eq!(opts.region, "EU");
        assert_eq!(opts.max_processes, 8);
        assert_eq!(opts.custom.get("gpu"), Some("yes"));
    }
}
