use std::sync::Arc;

use roost_core::SpawnerLink;

use crate::error::ApiError;

/// Builds the master-to-worker link for a spawner registering with an endpoint.
pub trait SpawnerConnector: Send + Sync + 'static {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn SpawnerLink>, ApiError>;
}
