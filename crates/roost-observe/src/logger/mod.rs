//! Logger initialisation.
//!
//! roost components log under `roost.*` targets: `roost.core`, `roost.events`,
//! `roost.exec`, `roost.exec.output` (lines printed by spawned processes) and
//! `roost.api`. [`LoggerConfig::level`] takes `EnvFilter` directives over those
//! targets; a non-empty [`LEVEL_ENV`] variable replaces it.

mod config;
mod error;
mod format;
mod setup;

pub use config::LoggerConfig;
pub use error::LoggerError;
pub use format::LoggerFormat;
pub use setup::LEVEL_ENV;

/// Install the process-wide subscriber. Fails if one is already installed.
pub fn logger_init(cfg: &LoggerConfig) -> Result<(), LoggerError> {
    setup::install(cfg, std::env::var(LEVEL_ENV).ok())
}
