//! Worker side of roost: launches, watches and kills the processes the master
//! dispatches to this machine.
//!
//! [`SpawnerController`] implements [`roost_core::SpawnerLink`], so it can be driven
//! in-process by a coordinator or from the HTTP worker router in `roost-api`.

mod args;
pub use args::{LaunchArgs, LaunchIdentity, shell_quote};

mod config;
pub use config::SpawnerConfig;

mod controller;
pub use controller::SpawnerController;

mod error;
pub use error::ExecError;

mod limits;
pub use limits::{RlimitConfig, attach_rlimits};

mod port;
pub use port::PortAllocator;

mod process;
pub use process::{ProcessEntry, ProcessTable};

mod util;
pub use util::{describe_exit, kill_graceful};
