use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{FromRef, Path, Query, State},
    routing::{delete, get, post},
};
use roost_core::SpawnCoordinator;
use roost_model::{
    Page, SpawnQuery, SpawnStatus, SpawnTaskId, SpawnTaskInfo, SpawnerId, SpawnerInfo,
    message::{
        Ack, ClientSpawnRequest, ClientSpawnResponse, CompleteSpawnProcess, ProcessKilled,
        ProcessStarted, RegisterSpawnedProcess, RegisterSpawnedProcessResponse, RegisterSpawner,
        RegisterSpawnerResponse, SpawnFinalizationData, SpawnStatusChange,
        UpdateSpawnerProcessesCount,
    },
};
use tracing::info;

use crate::{
    caller::Caller,
    config::ApiConfig,
    connector::SpawnerConnector,
    error::ApiError,
    inbox::StatusInbox,
    wire::{CountReport, SpawnListQuery},
};

#[derive(Clone)]
struct MasterState {
    coordinator: Arc<SpawnCoordinator>,
    inbox: Arc<StatusInbox>,
    connector: Arc<dyn SpawnerConnector>,
    config: Arc<ApiConfig>,
}

impl FromRef<MasterState> for Arc<ApiConfig> {
    fn from_ref(state: &MasterState) -> Self {
        Arc::clone(&state.config)
    }
}

/// HTTP front of a [`SpawnCoordinator`].
pub struct MasterApi {
    state: MasterState,
}

impl MasterApi {
    /// `inbox` must also be subscribed to the coordinator's events to receive anything.
    pub fn new(
        coordinator: Arc<SpawnCoordinator>,
        inbox: Arc<StatusInbox>,
        connector: Arc<dyn SpawnerConnector>,
        config: Arc<ApiConfig>,
    ) -> Self {
        Self {
            state: MasterState {
                coordinator,
                inbox,
                connector,
                config,
            },
        }
    }

    /// Routes:
    /// - POST   /api/v1/spawners                 - Register a spawner (worker)
    /// - GET    /api/v1/spawners                 - List spawners
    /// - DELETE /api/v1/spawners/{id}            - Unregister a spawner (owner or admin)
    /// - POST   /api/v1/spawners/{id}/count      - Running process count (worker)
    /// - POST   /api/v1/spawns                   - Request a spawn (requester)
    /// - GET    /api/v1/spawns                   - List spawn tasks
    /// - GET    /api/v1/spawns/{id}              - Spawn task snapshot
    /// - POST   /api/v1/spawns/{id}/abort        - Abort a spawn task
    /// - GET    /api/v1/spawns/{id}/finalization - Finalization data
    /// - POST   /api/v1/process/started          - Process launched (worker)
    /// - POST   /api/v1/process/killed           - Process exited (worker)
    /// - POST   /api/v1/process/register         - Spawned process registration
    /// - POST   /api/v1/process/complete         - Spawned process finalization
    /// - GET    /api/v1/notifications            - Drain the caller's status changes
    /// - POST   /api/v1/peers/disconnect         - Caller leaves
    pub fn router(self) -> Router {
        Router::new()
            .route("/api/v1/spawners", post(register_spawner).get(list_spawners))
            .route("/api/v1/spawners/{id}", delete(unregister_spawner))
            .route("/api/v1/spawners/{id}/count", post(report_count))
            .route("/api/v1/spawns", post(request_spawn).get(list_spawns))
            .route("/api/v1/spawns/{id}", get(get_spawn))
            .route("/api/v1/spawns/{id}/abort", post(abort_spawn))
            .route("/api/v1/spawns/{id}/finalization", get(finalization))
            .route("/api/v1/process/started", post(process_started))
            .route("/api/v1/process/killed", post(process_killed))
            .route("/api/v1/process/register", post(register_process))
            .route("/api/v1/process/complete", post(complete_process))
            .route("/api/v1/notifications", get(notifications))
            .route("/api/v1/peers/disconnect", post(disconnect))
            .with_state(self.state)
    }
}

// ============================================================================
// Spawners
// ============================================================================

async fn register_spawner(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Json(req): Json<RegisterSpawner>,
) -> Result<Json<RegisterSpawnerResponse>, ApiError> {
    let endpoint = req
        .endpoint
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::InvalidRequest("spawner endpoint is required".into()))?;
    let link = s.connector.connect(&endpoint)?;
    let spawner_id = s.coordinator.register_spawner(&peer, req.options, link)?;

    info!(target: "roost.api", spawner_id = %spawner_id, peer = %peer.id, %endpoint, "spawner connected");
    Ok(Json(RegisterSpawnerResponse { spawner_id }))
}

async fn list_spawners(State(s): State<MasterState>, Caller(_): Caller) -> Json<Vec<SpawnerInfo>> {
    Json(s.coordinator.spawners())
}

async fn unregister_spawner(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Path(id): Path<u64>,
) -> Result<Json<Ack>, ApiError> {
    s.coordinator
        .unregister_spawner(&peer, SpawnerId(id))
        .await?;
    Ok(Json(Ack::ok()))
}

async fn report_count(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Path(id): Path<u64>,
    Json(report): Json<CountReport>,
) -> Result<Json<Ack>, ApiError> {
    s.coordinator.handle_process_count_update(
        &peer.id,
        UpdateSpawnerProcessesCount {
            spawner_id: SpawnerId(id),
            count: report.count,
        },
    )?;
    Ok(Json(Ack::ok()))
}

// ============================================================================
// Spawn tasks
// ============================================================================

async fn request_spawn(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Json(req): Json<ClientSpawnRequest>,
) -> Result<Json<ClientSpawnResponse>, ApiError> {
    let spawn_id = s.coordinator.handle_client_spawn_request(&peer, req)?;
    Ok(Json(ClientSpawnResponse { spawn_id }))
}

/// Non-admin callers only ever see their own requests.
async fn list_spawns(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Query(q): Query<SpawnListQuery>,
) -> Result<Json<Page<SpawnTaskInfo>>, ApiError> {
    let mut query = SpawnQuery::new();
    if let Some(status) = q.status {
        let status = status
            .parse::<SpawnStatus>()
            .map_err(|e| ApiError::InvalidRequest(e.to_string()))?;
        query = query.with_status(status);
    }
    if let Some(spawner) = q.spawner {
        query = query.with_spawner(SpawnerId(spawner));
    }
    if peer.has_permission(s.coordinator.config().admin_permission) {
        if let Some(requester) = q.requester {
            query = query.with_requester(requester);
        }
    } else {
        query = query.with_requester(peer.id.clone());
    }
    if let Some(limit) = q.limit {
        query = query.with_limit(limit);
    }
    if let Some(offset) = q.offset {
        query = query.with_offset(offset);
    }
    Ok(Json(s.coordinator.query(&query)))
}

async fn get_spawn(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Path(id): Path<u64>,
) -> Result<Json<SpawnTaskInfo>, ApiError> {
    let id = SpawnTaskId(id);
    let info = s
        .coordinator
        .task(id)
        .ok_or_else(|| ApiError::NotFound(format!("spawn task {id}")))?;
    let admin = peer.has_permission(s.coordinator.config().admin_permission);
    if !admin && info.requester.as_ref() != Some(&peer.id) {
        return Err(ApiError::Unauthorized(format!(
            "{} may not read spawn task {id}",
            peer.id
        )));
    }
    Ok(Json(info))
}

async fn abort_spawn(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Path(id): Path<u64>,
) -> Result<Json<Ack>, ApiError> {
    s.coordinator
        .handle_abort_request(&peer, SpawnTaskId(id))
        .await?;
    Ok(Json(Ack::ok()))
}

async fn finalization(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Path(id): Path<u64>,
) -> Result<Json<SpawnFinalizationData>, ApiError> {
    Ok(Json(
        s.coordinator.get_finalization_data(&peer, SpawnTaskId(id))?,
    ))
}

// ============================================================================
// Process lifecycle
// ============================================================================

async fn process_started(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Json(msg): Json<ProcessStarted>,
) -> Result<Json<Ack>, ApiError> {
    s.coordinator.handle_process_started(&peer.id, msg).await?;
    Ok(Json(Ack::ok()))
}

async fn process_killed(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Json(msg): Json<ProcessKilled>,
) -> Result<Json<Ack>, ApiError> {
    s.coordinator.handle_process_killed(&peer.id, msg)?;
    Ok(Json(Ack::ok()))
}

async fn register_process(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Json(msg): Json<RegisterSpawnedProcess>,
) -> Result<Json<RegisterSpawnedProcessResponse>, ApiError> {
    Ok(Json(
        s.coordinator.handle_process_registration(&peer.id, msg)?,
    ))
}

async fn complete_process(
    State(s): State<MasterState>,
    Caller(peer): Caller,
    Json(msg): Json<CompleteSpawnProcess>,
) -> Result<Json<Ack>, ApiError> {
    s.coordinator.handle_finalization(&peer.id, msg)?;
    Ok(Json(Ack::ok()))
}

// ============================================================================
// Peers
// ============================================================================

async fn notifications(
    State(s): State<MasterState>,
    Caller(peer): Caller,
) -> Json<Vec<SpawnStatusChange>> {
    Json(s.inbox.drain(&peer.id))
}

async fn disconnect(State(s): State<MasterState>, Caller(peer): Caller) -> Json<Ack> {
    s.coordinator.handle_peer_disconnected(&peer.id).await;
    s.inbox.forget(&peer.id);
    info!(target: "roost.api", peer = %peer.id, "peer disconnected");
    Json(Ack::ok())
}
