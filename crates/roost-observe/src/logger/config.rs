use std::io::IsTerminal;

use serde::{Deserialize, Serialize};

use crate::logger::format::LoggerFormat;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggerConfig {
    pub format: LoggerFormat,
    /// `EnvFilter` directives, e.g. `info` or `info,roost.exec=debug`.
    pub level: String,
    pub with_targets: bool,
    /// Ignored by the json and journald formats.
    pub use_color: bool,
    /// Level for lines printed by spawned processes; `None` follows `level`.
    pub process_output: Option<String>,
}

impl Default for LoggerConfig {
    fn default() -> Self {
        Self {
            format: LoggerFormat::Text,
            level: "info".to_string(),
            with_targets: true,
            use_color: std::io::stdout().is_terminal(),
            process_output: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_config_uses_defaults() {
        let cfg: LoggerConfig =
            serde_json::from_str(r#"{"format":"json","level":"debug,roost.core=trace"}"#).unwrap();
        assert_eq!(cfg.format, LoggerFormat::Json);
        assert_eq!(cfg.level, "debug,roost.core=trace");
        assert!(cfg.with_targets);
        assert!(cfg.process_output.is_none());
    }

    #[test]
    fn unknown_format_is_rejected() {
        let err = serde_json::from_str::<LoggerConfig>(r#"{"format":"xml"}"#).unwrap_err();
        assert!(err.to_string().contains("xml"));
    }
}
