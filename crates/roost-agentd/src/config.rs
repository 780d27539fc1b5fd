use std::{fs, path::Path, time::Duration};

use anyhow::Context;
use roost_api::ApiConfig;
use roost_core::CoordinatorConfig;
use roost_exec::SpawnerConfig;
use roost_observe::LoggerConfig;
use serde::{Deserialize, de::DeserializeOwned};

/// `roost-agentd master` configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MasterFile {
    pub logger: LoggerConfig,
    pub coordinator: CoordinatorConfig,
    pub api: ApiConfig,
    /// Serve `/metrics` next to the API.
    pub metrics: bool,
}

impl Default for MasterFile {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            coordinator: CoordinatorConfig::default(),
            api: ApiConfig::default(),
            metrics: true,
        }
    }
}

/// `roost-agentd spawner` configuration file.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SpawnerFile {
    pub logger: LoggerConfig,
    pub spawner: SpawnerConfig,
    pub api: ApiConfig,
    /// Base URL of the master API.
    pub master_url: String,
    /// Base URL the master uses to reach this worker.
    pub endpoint: String,
    /// Pause between registration attempts while the master is unreachable.
    pub register_retry_ms: u64,
}

impl Default for SpawnerFile {
    fn default() -> Self {
        Self {
            logger: LoggerConfig::default(),
            spawner: SpawnerConfig::default(),
            api: ApiConfig {
                listen: "0.0.0.0:8081".to_string(),
                ..Default::default()
            },
            master_url: "http://127.0.0.1:8080".to_string(),
            endpoint: "http://127.0.0.1:8081".to_string(),
            register_retry_ms: 2_000,
        }
    }
}

impl SpawnerFile {
    pub fn register_retry(&self) -> Duration {
        Duration::from_millis(self.register_retry_ms.max(100))
    }
}

pub fn load<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse(&text).with_context(|| format!("parsing config {}", path.display()))
}

fn parse<T: DeserializeOwned>(text: &str) -> anyhow::Result<T> {
    Ok(toml::from_str(text)?)
}

#[cfg(test)]
mod tests {
    use roost_observe::LoggerFormat;

    use super::*;

    #[test]
    fn master_file_sections() {
        let file: MasterFile = parse(
            r#"
            metrics = true

            [logger]
            format = "json"
            level = "info,roost.core=debug"

            [coordinator]
            tick_interval_ms = 250
            admin_permission = 10
            spawner_timeout_ms = 30000

            [api]
            listen = "127.0.0.1:9000"
            access_tokens = { "ops-token" = 10 }
            "#,
        )
        .unwrap();

        assert!(file.metrics);
        assert_eq!(file.logger.format, LoggerFormat::Json);
        assert_eq!(file.coordinator.tick_interval_ms, 250);
        assert_eq!(file.coordinator.spawner_timeout_ms, Some(30_000));
        assert_eq!(file.coordinator.dispatch_attempts, 3);
        assert_eq!(file.api.access_tokens.get("ops-token"), Some(&10));
    }

    #[test]
    fn spawner_file_defaults() {
        let file: SpawnerFile = parse(
            r#"
            master_url = "http://master:8080"
            endpoint = "http://10.0.0.7:8081"

            [spawner]
            executable_path = "/opt/game/server"
            region = "EU"
            max_processes = 8
            extra_args = ["-nographics"]

            [spawner.custom_options]
            tier = "gold"
            "#,
        )
        .unwrap();

        assert_eq!(file.master_url, "http://master:8080");
        assert_eq!(file.api.listen, "0.0.0.0:8081");
        assert_eq!(file.spawner.max_processes, 8);
        assert_eq!(file.spawner.custom_options.get("tier"), Some("gold"));
        assert_eq!(file.spawner.port_range_start, 1500);
        assert_eq!(file.register_retry(), Duration::from_secs(2));
    }

    #[test]
    fn unknown_log_format_fails() {
        assert!(parse::<MasterFile>("[logger]\nformat = \"xml\"").is_err());
    }
}
