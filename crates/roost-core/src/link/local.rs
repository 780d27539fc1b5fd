use std::sync::{Arc, OnceLock, Weak};

use async_trait::async_trait;
use roost_model::{
    Peer, SpawnerId, SpawnerOptions,
    message::{ProcessKilled, ProcessStarted, UpdateSpawnerProcessesCount},
};

use super::{MasterLink, SpawnerLink};
use crate::{coordinator::SpawnCoordinator, error::LinkError};

/// [`MasterLink`] that calls a coordinator living in the same process.
///
/// Holds weak references in both directions so a coordinator, its spawners and their
/// master links never keep each other alive.
pub struct LocalMasterLink {
    coordinator: Weak<SpawnCoordinator>,
    peer: Peer,
    spawner: OnceLock<Weak<dyn SpawnerLink>>,
}

impl LocalMasterLink {
    /// Link acting as `peer` towards `coordinator`.
    pub fn new(coordinator: &Arc<SpawnCoordinator>, peer: Peer) -> Self {
        Self {
            coordinator: Arc::downgrade(coordinator),
            peer,
            spawner: OnceLock::new(),
        }
    }

    /// Set the worker side handed to the coordinator on registration. Later calls are ignored.
    pub fn attach(&self, spawner: &Arc<dyn SpawnerLink>) {
        let _ = self.spawner.set(Arc::downgrade(spawner));
    }

    pub fn peer(&self) -> &Peer {
        &self.peer
    }

    fn coordinator(&self) -> Result<Arc<SpawnCoordinator>, LinkError> {
        self.coordinator
            .upgrade()
            .ok_or_else(|| LinkError::Unreachable("coordinator is gone".into()))
    }
}

#[async_trait]
impl MasterLink for LocalMasterLink {
    async fn register_spawner(&self, options: SpawnerOptions) -> Result<SpawnerId, LinkError> {
        let spawner = self
            .spawner
            .get()
            .and_then(Weak::upgrade)
            .ok_or_else(|| LinkError::Unreachable("no spawner attached".into()))?;
        let id = self
            .coordinator()?
            .register_spawner(&self.peer, options, spawner)?;
        Ok(id)
    }

    async fn process_started(&self, msg: ProcessStarted) -> Result<(), LinkError> {
        self.coordinator()?
            .handle_process_started(&self.peer.id, msg)
            .await?;
        Ok(())
    }

    async fn process_killed(&self, msg: ProcessKilled) -> Result<(), LinkError> {
        self.coordinator()?
            .handle_process_killed(&self.peer.id, msg)?;
        Ok(())
    }

    async fn update_process_count(
        &self,
        msg: UpdateSpawnerProcessesCount,
    ) -> Result<(), LinkError> {
        self.coordinator()?
            .handle_process_count_update(&self.peer.id, msg)?;
        Ok(())
    }
}
