//! Request bodies and query strings that only exist on the HTTP transport.

use serde::{Deserialize, Serialize};

/// Body of `POST /api/v1/spawners/{id}/count`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountReport {
    pub count: u32,
}

/// Query of `GET /api/v1/spawns`. `status` accepts the short names as well.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SpawnListQuery {
    pub status: Option<String>,
    pub spawner: Option<u64>,
    pub requester: Option<String>,
    pub limit: Option<usize>,
    pub offset: Option<usize>,
}
