mod ids;
pub use ids::{Peer, PeerId, PermissionLevel, SpawnTaskId, SpawnerId};

mod properties;
pub use properties::Properties;

mod spawn_status;
pub use spawn_status::SpawnStatus;

mod spawner;
pub use spawner::{SpawnerInfo, SpawnerOptions};

mod spawn_info;
pub use spawn_info::SpawnTaskInfo;

mod spawn_query;
pub use spawn_query::{Page, SpawnQuery};

/// Region label used to filter eligible spawners. Empty means "any region".
pub type Region = String;

/// Duration value in milliseconds, as it appears in configuration files.
pub type TimeoutMs = u64;
