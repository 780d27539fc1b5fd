//! Well-known command-line keys and option names.
//!
//! A spawned process learns who it is and where to report from these arguments.
//! Keeping them here gives the worker (which writes them) and process-side helpers
//! (which read them) a single source of truth.

/// Address of the master the spawned process must connect to.
pub const ARG_MASTER_IP: &str = "--roost-master-ip";
/// Port of the master the spawned process must connect to.
pub const ARG_MASTER_PORT: &str = "--roost-master-port";
/// Port allocated by the worker for the process to listen on.
pub const ARG_ASSIGNED_PORT: &str = "--roost-assigned-port";
/// Address the worker machine advertises to clients.
pub const ARG_MACHINE_IP: &str = "--roost-machine-ip";
/// Spawn task id the process belongs to.
pub const ARG_SPAWN_ID: &str = "--roost-spawn-id";
/// One-time code the process presents when it registers with the master.
pub const ARG_SPAWN_CODE: &str = "--roost-spawn-code";

/// Every argument key written by the worker itself; caller options may not override these.
pub const RESERVED_ARGS: [&str; 6] = [
    ARG_MASTER_IP,
    ARG_MASTER_PORT,
    ARG_ASSIGNED_PORT,
    ARG_MACHINE_IP,
    ARG_SPAWN_ID,
    ARG_SPAWN_CODE,
];

/// Spawn option selecting the executable for a single task.
///
/// Takes priority over the worker's configured default and is not forwarded to the process.
pub const OPT_EXECUTABLE: &str = "executable";
