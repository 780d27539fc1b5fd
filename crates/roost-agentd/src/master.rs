use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use roost_api::{ApiConfig, HttpClient, HttpConnector, MasterApi, StatusInbox};
use roost_core::{SpawnCoordinator, Subscribe};
use roost_observe::EventLog;
use roost_prometheus::{Encoder, PrometheusMetrics, TextEncoder};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::config::MasterFile;

pub async fn run(file: MasterFile, shutdown: CancellationToken) -> anyhow::Result<()> {
    file.api.validate()?;
    let api = Arc::new(file.api);

    let inbox = Arc::new(StatusInbox::new(api.inbox_capacity));
    let metrics = PrometheusMetrics::new()?;
    let mut subscribers: Vec<Arc<dyn Subscribe>> = Vec::new();
    subscribers.push(Arc::new(EventLog::new()));
    subscribers.push(inbox.clone());
    if file.metrics {
        subscribers.push(Arc::new(metrics.clone()));
    }

    let coordinator = SpawnCoordinator::new(file.coordinator, subscribers)?;
    let connector = Arc::new(HttpConnector::new(HttpClient::new(&api)?));

    let mut router = MasterApi::new(coordinator.clone(), inbox, connector, api.clone()).router();
    if file.metrics {
        router = router.merge(metrics_router(metrics));
    }

    let ticker = tokio::spawn(coordinator.clone().run(shutdown.clone()));

    let listener = TcpListener::bind(&api.listen).await?;
    info!(listen = %api.listen, metrics = file.metrics, "master listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown.clone().cancelled_owned())
        .await?;

    shutdown.cancel();
    if let Err(e) = ticker.await {
        warn!(error = %e, "tick loop ended abnormally");
    }
    info!("master stopped");
    Ok(())
}

fn metrics_router(metrics: PrometheusMetrics) -> Router {
    Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(metrics)
}

async fn render_metrics(State(metrics): State<PrometheusMetrics>) -> Response {
    match metrics.render() {
        Ok(body) => (
            [(header::CONTENT_TYPE, TextEncoder::new().format_type().to_string())],
            body,
        )
            .into_response(),
        Err(e) => (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response(),
    }
}
