use std::{
    sync::{Arc, Mutex},
    time::Duration,
};

use async_trait::async_trait;
use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode},
};
use roost_api::{ApiConfig, ApiError, MasterApi, PEER_HEADER, SpawnerConnector, StatusInbox};
use roost_core::{CoordinatorConfig, LinkError, SpawnCoordinator, SpawnerLink, Subscribe};
use roost_model::{
    Properties, SpawnStatus, SpawnerOptions,
    message::{
        Ack, ClientSpawnRequest, ClientSpawnResponse, CompleteSpawnProcess, KillProcessRequest,
        ProcessStarted, RegisterSpawnedProcess, RegisterSpawnedProcessResponse, RegisterSpawner,
        RegisterSpawnerResponse, SpawnFinalizationData, SpawnProcessRequest, SpawnStatusChange,
    },
};
use serde::{Serialize, de::DeserializeOwned};
use serde_json::Value;
use tower::ServiceExt;

#[derive(Default)]
struct Recording {
    spawns: Mutex<Vec<SpawnProcessRequest>>,
    kills: Mutex<Vec<KillProcessRequest>>,
}

#[async_trait]
impl SpawnerLink for Recording {
    async fn spawn_process(&self, req: SpawnProcessRequest) -> Result<Ack, LinkError> {
        self.spawns.lock().unwrap().push(req);
        Ok(Ack::ok())
    }

    async fn kill_process(&self, req: KillProcessRequest) -> Result<Ack, LinkError> {
        self.kills.lock().unwrap().push(req);
        Ok(Ack::ok())
    }
}

struct Fixed(Arc<Recording>);

impl SpawnerConnector for Fixed {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn SpawnerLink>, ApiError> {
        assert_eq!(endpoint, "http://worker-1:8081");
        Ok(self.0.clone())
    }
}

struct Setup {
    router: Router,
    coordinator: Arc<SpawnCoordinator>,
    worker: Arc<Recording>,
}

fn setup() -> Setup {
    let inbox = Arc::new(StatusInbox::new(64));
    let subscribers = vec![inbox.clone() as Arc<dyn Subscribe>];
    let coordinator = SpawnCoordinator::new(CoordinatorConfig::default(), subscribers).unwrap();

    let mut api = ApiConfig::default();
    api.access_tokens.insert("admin-token".into(), 100);

    let worker = Arc::new(Recording::default());
    let router = MasterApi::new(
        coordinator.clone(),
        inbox,
        Arc::new(Fixed(worker.clone())),
        Arc::new(api),
    )
    .router();
    Setup {
        router,
        coordinator,
        worker,
    }
}

async fn call(
    router: &Router,
    method: &str,
    uri: &str,
    peer: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut req = Request::builder().method(method).uri(uri);
    if let Some(peer) = peer {
        req = req.header(PEER_HEADER, peer);
    }
    let body = match body {
        Some(v) => {
            req = req.header("content-type", "application/json");
            Body::from(v.to_string())
        }
        None => Body::empty(),
    };
    let resp = router.clone().oneshot(req.body(body).unwrap()).await.unwrap();
    let status = resp.status();
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

async fn post<B: Serialize, R: DeserializeOwned>(router: &Router, uri: &str, peer: &str, body: &B) -> R {
    let (status, json) = call(
        router,
        "POST",
        uri,
        Some(peer),
        Some(serde_json::to_value(body).unwrap()),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "POST {uri}: {json}");
    serde_json::from_value(json).unwrap()
}

async fn get<R: DeserializeOwned>(router: &Router, uri: &str, peer: &str) -> R {
    let (status, json) = call(router, "GET", uri, Some(peer), None).await;
    assert_eq!(status, StatusCode::OK, "GET {uri}: {json}");
    serde_json::from_value(json).unwrap()
}

async fn register_worker(router: &Router) -> RegisterSpawnerResponse {
    post(
        router,
        "/api/v1/spawners",
        "worker-1",
        &RegisterSpawner {
            options: SpawnerOptions::new("10.0.0.2", 2, "EU"),
            endpoint: Some("http://worker-1:8081".into()),
        },
    )
    .await
}

fn spawn_request() -> ClientSpawnRequest {
    ClientSpawnRequest {
        options: Properties::single("map", "arena"),
        region: "EU".into(),
        custom_options: Properties::new(),
    }
}

#[tokio::test]
async fn spawn_protocol_over_http() {
    let s = setup();
    let spawner = register_worker(&s.router).await;

    let created: ClientSpawnResponse =
        post(&s.router, "/api/v1/spawns", "client-1", &spawn_request()).await;
    let id = created.spawn_id;

    s.coordinator.tick().await;
    let dispatched = s.worker.spawns.lock().unwrap().pop().unwrap();
    assert_eq!(dispatched.spawner_id, spawner.spawner_id);
    assert_eq!(dispatched.spawn_id, id);

    let _: Ack = post(
        &s.router,
        "/api/v1/process/started",
        "worker-1",
        &ProcessStarted {
            spawn_id: id,
            process_id: 4242,
            args: "--map arena".into(),
        },
    )
    .await;

    let registered: RegisterSpawnedProcessResponse = post(
        &s.router,
        "/api/v1/process/register",
        "proc-1",
        &RegisterSpawnedProcess {
            spawn_id: id,
            unique_code: dispatched.unique_code,
        },
    )
    .await;
    assert_eq!(registered.options.get("map"), Some("arena"));

    let _: Ack = post(
        &s.router,
        "/api/v1/process/complete",
        "proc-1",
        &CompleteSpawnProcess {
            spawn_id: id,
            finalization_data: Properties::single("port", "7777"),
        },
    )
    .await;

    let data: SpawnFinalizationData = get(
        &s.router,
        &format!("/api/v1/spawns/{id}/finalization"),
        "client-1",
    )
    .await;
    assert_eq!(data.data.get("port"), Some("7777"));

    let mut seen = Vec::new();
    for _ in 0..100 {
        let batch: Vec<SpawnStatusChange> =
            get(&s.router, "/api/v1/notifications", "client-1").await;
        seen.extend(batch.into_iter().map(|c| c.status));
        if seen.last() == Some(&SpawnStatus::Finalized) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(
        seen,
        vec![
            SpawnStatus::WaitingForProcess,
            SpawnStatus::ProcessRegistered,
            SpawnStatus::Finalized
        ]
    );
}

#[tokio::test]
async fn errors_carry_status_codes() {
    let s = setup();

    let (status, _) = call(&s.router, "GET", "/api/v1/spawns/1", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = serde_json::to_value(spawn_request()).unwrap();
    let (status, json) = call(&s.router, "POST", "/api/v1/spawns", Some("client-1"), Some(body.clone())).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(json["error"].as_str().unwrap().contains("busy"));

    register_worker(&s.router).await;
    let (status, json) = call(&s.router, "POST", "/api/v1/spawns", Some("client-1"), Some(body.clone())).await;
    assert_eq!(status, StatusCode::OK);
    let id = json["spawnId"].as_u64().unwrap();
    let (status, _) = call(&s.router, "POST", "/api/v1/spawns", Some("client-1"), Some(body)).await;
    assert_eq!(status, StatusCode::CONFLICT);

    let task = format!("/api/v1/spawns/{id}");
    let (status, _) = call(&s.router, "GET", &task, Some("someone-else"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = call(&s.router, "GET", "/api/v1/spawns/999", Some("client-1"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (status, _) = call(&s.router, "GET", &format!("{task}/finalization"), Some("client-1"), None).await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn listing_is_scoped_to_the_caller() {
    let s = setup();
    register_worker(&s.router).await;
    let _: ClientSpawnResponse = post(&s.router, "/api/v1/spawns", "client-1", &spawn_request()).await;
    let _: ClientSpawnResponse = post(&s.router, "/api/v1/spawns", "client-2", &spawn_request()).await;

    let mine: Value = get(&s.router, "/api/v1/spawns", "client-1").await;
    assert_eq!(mine["total"], 1);

    let req = Request::builder()
        .uri("/api/v1/spawns?status=none&limit=1")
        .header(PEER_HEADER, "ops")
        .header("authorization", "Bearer admin-token")
        .body(Body::empty())
        .unwrap();
    let resp = s.router.clone().oneshot(req).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
    let all: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(all["total"], 2);
    assert_eq!(all["items"].as_array().unwrap().len(), 1);

    let (status, _) = call(&s.router, "GET", "/api/v1/spawns?status=bogus", Some("client-1"), None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn disconnect_removes_the_workers_spawners() {
    let s = setup();
    let spawner = register_worker(&s.router).await;
    let spawners: Value = get(&s.router, "/api/v1/spawners", "client-1").await;
    assert_eq!(spawners.as_array().unwrap().len(), 1);

    let created: ClientSpawnResponse =
        post(&s.router, "/api/v1/spawns", "client-1", &spawn_request()).await;

    let _: Ack = post(&s.router, "/api/v1/peers/disconnect", "worker-1", &Value::Null).await;
    assert!(s.coordinator.spawner(spawner.spawner_id).is_none());
    assert_eq!(
        s.coordinator.task(created.spawn_id).unwrap().status,
        SpawnStatus::Aborted
    );
}
