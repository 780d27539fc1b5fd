//! POSIX resource limits for spawned processes.
//!
//! On Unix the limits are installed with a `pre_exec` hook, i.e. in the child after
//! `fork()` and before `execve()`, so the process never runs without them. Elsewhere
//! a non-empty config is logged and ignored.

use serde::{Deserialize, Serialize};
use tokio::process::Command;
#[cfg(not(unix))]
use tracing::warn;

/// Limits applied to every process a worker launches. `None` keeps the inherited value.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RlimitConfig {
    /// `RLIMIT_NOFILE`.
    pub max_open_files: Option<u64>,
    /// `RLIMIT_FSIZE`, in bytes.
    pub max_file_size_bytes: Option<u64>,
    /// `RLIMIT_AS`, in bytes.
    pub max_address_space_bytes: Option<u64>,
    /// Set `RLIMIT_CORE` to zero.
    pub disable_core_dumps: bool,
}

impl RlimitConfig {
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.max_open_files.is_none()
            && self.max_file_size_bytes.is_none()
            && self.max_address_space_bytes.is_none()
            && !self.disable_core_dumps
    }
}

pub fn attach_rlimits(cmd: &mut Command, config: &RlimitConfig) {
    if config.is_empty() {
        return;
    }

    platform::attach_rlimits(cmd, config.clone());
}

cfg_if::cfg_if! {
    if #[cfg(unix)] {
        use unix_impl as platform;
    } else {
        mod platform {
            use tokio::process::Command;

            use super::{RlimitConfig, warn};

            pub fn attach_rlimits(_: &mut Command, config: RlimitConfig) {
                warn!(
                    target: "roost.exec",
                    ?config,
                    "rlimits are not supported on this platform; ignoring"
                );
            }
        }
    }
}

#[cfg(unix)]
mod unix_impl {
    use std::io;

    use tokio::process::Command;

    use super::RlimitConfig;

    pub fn attach_rlimits(cmd: &mut Command, config: RlimitConfig) {
        // SAFETY: the hook only calls async-signal-safe `setrlimit`.
        unsafe {
            cmd.pre_exec(move || {
                if let Some(n) = config.max_open_files {
                    set(libc::RLIMIT_NOFILE, n)?;
                }
                if let Some(n) = config.max_file_size_bytes {
                    set(libc::RLIMIT_FSIZE, n)?;
                }
                if let Some(n) = config.max_address_space_bytes {
                    set(libc::RLIMIT_AS, n)?;
                }
                if config.disable_core_dumps {
                    set(libc::RLIMIT_CORE, 0)?;
                }
                Ok(())
            });
        }
    }

    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    type Resource = libc::__rlimit_resource_t;
    #[cfg(not(all(target_os = "linux", target_env = "gnu")))]
    type Resource = libc::c_int;

    fn set(resource: Resource, value: u64) -> io::Result<()> {
        let rlim = libc::rlimit {
            rlim_cur: value as libc::rlim_t,
            rlim_max: value as libc::rlim_t,
        };
        // SAFETY: `rlim` is a valid, initialised struct for the duration of the call.
        if unsafe { libc::setrlimit(resource, &rlim) } != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }
}
