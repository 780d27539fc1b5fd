//! Master-side coordination of process spawning.
//!
//! The [`SpawnCoordinator`] keeps the registry of worker spawners and spawn tasks,
//! picks a spawner for every request, drains spawner queues on a fixed tick and
//! terminates the spawn protocol. Workers are reached through [`SpawnerLink`];
//! workers reach the master through [`MasterLink`].

mod config;
pub use config::CoordinatorConfig;

mod coordinator;
pub use coordinator::SpawnCoordinator;

mod error;
pub use error::{CoreError, LinkError};

pub mod events;
pub use events::{EventBus, EventKind, SpawnEvent, Subscribe};

mod link;
pub use link::{LocalMasterLink, MasterLink, SpawnerLink};

mod session;
pub use session::{PeerSession, Sessions};

mod spawner;
pub use spawner::RegisteredSpawner;

mod task;
pub use task::{AbortPlan, SpawnTask};
