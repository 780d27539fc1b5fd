use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRef, Path, State},
    routing::post,
};
use roost_core::SpawnerLink;
use roost_model::{
    Peer,
    message::{Ack, KillProcessRequest, SpawnProcessRequest},
};

use crate::{caller::Caller, config::ApiConfig, error::ApiError};

#[derive(Clone)]
struct WorkerState {
    spawner: Arc<dyn SpawnerLink>,
    config: Arc<ApiConfig>,
}

impl FromRef<WorkerState> for Arc<ApiConfig> {
    fn from_ref(state: &WorkerState) -> Self {
        Arc::clone(&state.config)
    }
}

impl WorkerState {
    fn authorize(&self, peer: &Peer) -> Result<(), ApiError> {
        if peer.has_permission(self.config.worker_permission) {
            Ok(())
        } else {
            Err(ApiError::Unauthorized(format!(
                "{} may not command this spawner",
                peer.id
            )))
        }
    }
}

/// HTTP front of a worker, the receiving end of an `HttpSpawnerLink`.
pub struct WorkerApi {
    state: WorkerState,
}

impl WorkerApi {
    pub fn new(spawner: Arc<dyn SpawnerLink>, config: Arc<ApiConfig>) -> Self {
        Self {
            state: WorkerState { spawner, config },
        }
    }

    /// Routes:
    /// - POST /api/v1/processes           - Launch the process of a task
    /// - POST /api/v1/processes/{id}/kill - Kill the process of a task
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/processes", post(spawn_process))
            .route("/api/v1/processes/{id}/kill", post(kill_process))
            .with_state(self.state)
    }
}

async fn spawn_process(
    State(s): State<WorkerState>,
    Caller(peer): Caller,
    Json(req): Json<SpawnProcessRequest>,
) -> Result<Json<Ack>, ApiError> {
    s.authorize(&peer)?;
    Ok(Json(s.spawner.spawn_process(req).await?))
}

async fn kill_process(
    State(s): State<WorkerState>,
    Caller(peer): Caller,
    Path(id): Path<u64>,
    Json(req): Json<KillProcessRequest>,
) -> Result<Json<Ack>, ApiError> {
    s.authorize(&peer)?;
    if req.spawn_id.get() != id {
        return Err(ApiError::InvalidRequest(format!(
            "path id {id} does not match spawn id {}",
            req.spawn_id
        )));
    }
    Ok(Json(s.spawner.kill_process(req).await?))
}
