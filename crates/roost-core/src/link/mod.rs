//! Seams between the coordinator and the peers it talks to.
//!
//! [`SpawnerLink`] is how the master reaches a worker; [`MasterLink`] is how a worker
//! reaches the master. Both are transport-agnostic: the HTTP implementations live in
//! `roost-api`, the in-process one in [`local`].

mod local;
pub use local::LocalMasterLink;

use async_trait::async_trait;
use roost_model::{
    SpawnerId, SpawnerOptions,
    message::{
        Ack, KillProcessRequest, ProcessKilled, ProcessStarted, SpawnProcessRequest,
        UpdateSpawnerProcessesCount,
    },
};

use crate::error::LinkError;

/// Master-to-worker channel of a registered spawner.
#[async_trait]
pub trait SpawnerLink: Send + Sync + 'static {
    /// Ask the worker to launch the process for a task.
    async fn spawn_process(&self, req: SpawnProcessRequest) -> Result<Ack, LinkError>;

    /// Ask the worker to terminate the process of a task.
    ///
    /// Killing a task the worker does not know about is not an error.
    async fn kill_process(&self, req: KillProcessRequest) -> Result<Ack, LinkError>;
}

/// Worker-to-master channel.
#[async_trait]
pub trait MasterLink: Send + Sync + 'static {
    async fn register_spawner(&self, options: SpawnerOptions) -> Result<SpawnerId, LinkError>;

    async fn process_started(&self, msg: ProcessStarted) -> Result<(), LinkError>;

    async fn process_killed(&self, msg: ProcessKilled) -> Result<(), LinkError>;

    async fn update_process_count(&self, msg: UpdateSpawnerProcessesCount) -> Result<(), LinkError>;

    /// Address spawned processes should use to reach the master, when the link knows it.
    fn master_address(&self) -> Option<(String, u16)> {
        None
    }
}
