use std::collections::HashMap;

use roost_model::{PeerId, PermissionLevel};
use serde::{Deserialize, Serialize};

use crate::error::ApiError;

/// HTTP transport settings shared by the master and worker sides.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Socket address the router is served on.
    pub listen: String,
    /// Bearer token → permission level. Callers without a token get level 0.
    pub access_tokens: HashMap<String, PermissionLevel>,
    /// Unread status notifications kept per peer; older ones are dropped first.
    pub inbox_capacity: usize,
    /// Permission a caller needs on the worker routes.
    pub worker_permission: PermissionLevel,
    /// Identity sent in `x-roost-peer` on outgoing calls.
    pub peer_name: String,
    /// Bearer token sent on outgoing calls.
    pub token: Option<String>,
    /// Per-request timeout of outgoing calls.
    pub request_timeout_ms: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            access_tokens: HashMap::new(),
            inbox_capacity: 256,
            worker_permission: 0,
            peer_name: hostname::get()
                .ok()
                .and_then(|h| h.into_string().ok())
                .unwrap_or_else(|| "roost-node".to_string()),
            token: None,
            request_timeout_ms: 10_000,
        }
    }
}

impl ApiConfig {
    pub fn validate(&self) -> Result<(), ApiError> {
        if self.listen.trim().is_empty() {
            return Err(ApiError::InvalidRequest("listen address is empty".into()));
        }
        if self.peer_name.trim().is_empty() {
            return Err(ApiError::InvalidRequest("peer_name is empty".into()));
        }
        if self.inbox_capacity == 0 {
            return Err(ApiError::InvalidRequest("inbox_capacity cannot be zero".into()));
        }
        Ok(())
    }

    /// Permission granted by `token`; `None` for an unknown token.
    pub fn permission_for(&self, token: Option<&str>) -> Option<PermissionLevel> {
        match token {
            None => Some(0),
            Some(t) => self.access_tokens.get(t).copied(),
        }
    }

    pub fn peer_id(&self) -> PeerId {
        PeerId::new(self.peer_name.clone())
    }
}
