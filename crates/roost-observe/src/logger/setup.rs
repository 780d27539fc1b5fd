use time::{UtcOffset, format_description::well_known::Rfc3339};
use tracing_subscriber::{
    EnvFilter, Layer, Registry, fmt, fmt::time::OffsetTime, layer::SubscriberExt,
    util::SubscriberInitExt,
};

use crate::logger::{config::LoggerConfig, error::LoggerError, format::LoggerFormat};

/// Environment variable overriding the configured filter.
pub const LEVEL_ENV: &str = "ROOST_LOG";

const OUTPUT_TARGET: &str = "roost.exec.output";

type BoxedLayer = Box<dyn Layer<Registry> + Send + Sync + 'static>;

pub(crate) fn install(cfg: &LoggerConfig, env_level: Option<String>) -> Result<(), LoggerError> {
    let filter = mk_filter(&directives(cfg, env_level))?;
    let output = output_layer(cfg)?.with_filter(filter);
    tracing_subscriber::registry()
        .with(output)
        .try_init()
        .map_err(as_error)
}

/// Filter directives: the env override or the configured level, then the
/// spawned-process output level if one is set.
fn directives(cfg: &LoggerConfig, env_level: Option<String>) -> String {
    let base = env_level
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| cfg.level.clone());
    match &cfg.process_output {
        Some(level) => format!("{base},{OUTPUT_TARGET}={level}"),
        None => base,
    }
}

fn mk_filter(directives: &str) -> Result<EnvFilter, LoggerError> {
    EnvFilter::try_new(directives)
        .map_err(|_| LoggerError::InvalidLogLevel(directives.to_string()))
}

fn output_layer(cfg: &LoggerConfig) -> Result<BoxedLayer, LoggerError> {
    let layer = match cfg.format {
        LoggerFormat::Text => fmt::layer()
            .with_ansi(cfg.use_color)
            .with_target(cfg.with_targets)
            .with_timer(local_rfc3339())
            .boxed(),
        LoggerFormat::Json => fmt::layer()
            .json()
            .with_ansi(false)
            .with_target(cfg.with_targets)
            .with_timer(local_rfc3339())
            .boxed(),
        LoggerFormat::Journald => journald_layer()?,
    };
    Ok(layer)
}

fn local_rfc3339() -> OffsetTime<Rfc3339> {
    let offset = UtcOffset::current_local_offset().unwrap_or(UtcOffset::UTC);
    OffsetTime::new(offset, Rfc3339)
}

fn as_error(e: impl std::fmt::Display) -> LoggerError {
    let msg = e.to_string();
    if msg.contains("already") {
        LoggerError::AlreadyInitialized
    } else {
        LoggerError::InitializationFailed(msg)
    }
}

#[cfg(all(target_os = "linux", feature = "journald"))]
fn journald_layer() -> Result<BoxedLayer, LoggerError> {
    tracing_journald::layer()
        .map(|layer| layer.boxed())
        .map_err(|e| LoggerError::InitializationFailed(format!("journald: {e}")))
}

#[cfg(not(all(target_os = "linux", feature = "journald")))]
fn journald_layer() -> Result<BoxedLayer, LoggerError> {
    Err(LoggerError::JournaldNotSupported)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_filter_is_reported() {
        assert!(matches!(
            mk_filter("info,roost.core=loud"),
            Err(LoggerError::InvalidLogLevel(_))
        ));
        assert!(mk_filter("warn,roost.exec=debug").is_ok());
    }

    #[test]
    fn env_level_replaces_configured_level() {
        let cfg = LoggerConfig {
            level: "info".into(),
            ..Default::default()
        };
        assert_eq!(directives(&cfg, None), "info");
        assert_eq!(directives(&cfg, Some("  ".into())), "info");
        assert_eq!(directives(&cfg, Some("roost.core=trace".into())), "roost.core=trace");
    }

    #[test]
    fn process_output_gets_its_own_directive() {
        let cfg = LoggerConfig {
            level: "warn".into(),
            process_output: Some("off".into()),
            ..Default::default()
        };
        assert_eq!(directives(&cfg, None), "warn,roost.exec.output=off");
        assert!(mk_filter(&directives(&cfg, None)).is_ok());
    }

    #[test]
    fn second_install_fails() {
        let cfg = LoggerConfig {
            format: LoggerFormat::Json,
            use_color: false,
            ..Default::default()
        };
        install(&cfg, None).unwrap();
        assert!(matches!(
            install(&cfg, None),
            Err(LoggerError::AlreadyInitialized)
        ));
    }
}
