use serde::Serialize;

use crate::{PeerId, SpawnStatus, SpawnerId};

const DEFAULT_LIMIT: usize = 100;
const MAX_LIMIT: usize = 1000;

/// Filters and pagination for listing spawn tasks.
#[derive(Debug, Clone)]
pub struct SpawnQuery {
    pub status: Option<SpawnStatus>,
    pub spawner: Option<SpawnerId>,
    pub requester: Option<PeerId>,
    pub limit: usize,
    pub offset: usize,
}

/// One page of a filtered listing. `total` counts every match, before pagination.
#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub total: usize,
}

impl SpawnQuery {
    pub fn new() -> Self {
        Self {
            status: None,
            spawner: None,
            requester: None,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn with_status(mut self, status: SpawnStatus) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_spawner(mut self, spawner: SpawnerId) -> Self {
        self.spawner = Some(spawner);
        self
    }

    pub fn with_requester(mut self, requester: impl Into<PeerId>) -> Self {
        self.requester = Some(requester.into());
        self
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit.min(MAX_LIMIT);
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

impl Default for SpawnQuery {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn limit_is_clamped() {
        let q = SpawnQuery::new().with_limit(1_000_000);
        assert_eq!(q.limit, MAX_LIMIT);
        assert_eq!(SpawnQuery::default().limit, DEFAULT_LIMIT);
    }
}
