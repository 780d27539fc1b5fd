use async_trait::async_trait;
use prometheus::{
    Encoder, IntCounter, IntCounterVec, IntGauge, Opts, Registry, TextEncoder,
    proto::MetricFamily,
};
use roost_core::{EventKind, SpawnEvent, Subscribe};
use roost_model::SpawnStatus;

use crate::error::MetricsError;

/// Coordinator metrics backed by a private Prometheus registry.
///
/// Cloning is cheap and every clone updates the same series.
#[derive(Clone)]
pub struct PrometheusMetrics {
    registry: Registry,
    spawners: IntGauge,
    created: IntCounter,
    finished: IntCounterVec,
    dispatch_failures: IntCounter,
}

impl PrometheusMetrics {
    pub fn new() -> Result<Self, MetricsError> {
        let registry = Registry::new();

        let spawners = IntGauge::new(
            "roost_spawners_registered",
            "Spawners currently registered with the coordinator",
        )?;
        let created = IntCounter::new(
            "roost_spawn_tasks_created_total",
            "Spawn tasks created",
        )?;
        let finished = IntCounterVec::new(
            Opts::new(
                "roost_spawn_tasks_finished_total",
                "Spawn tasks that reached a terminal status",
            ),
            &["outcome"],
        )?;
        let dispatch_failures = IntCounter::new(
            "roost_spawn_dispatch_failures_total",
            "Failed attempts to hand a spawn task to its spawner",
        )?;

        registry.register(Box::new(spawners.clone()))?;
        registry.register(Box::new(created.clone()))?;
        registry.register(Box::new(finished.clone()))?;
        registry.register(Box::new(dispatch_failures.clone()))?;

        Ok(Self {
            registry,
            spawners,
            created,
            finished,
            dispatch_failures,
        })
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn gather(&self) -> Vec<MetricFamily> {
        self.registry.gather()
    }

    /// Text exposition format, as served on `/metrics`.
    pub fn render(&self) -> Result<String, MetricsError> {
        let mut buf = Vec::new();
        TextEncoder::new().encode(&self.gather(), &mut buf)?;
        Ok(String::from_utf8(buf)?)
    }

    pub fn record(&self, event: &SpawnEvent) {
        match event.kind {
            EventKind::SpawnerRegistered => self.spawners.inc(),
            EventKind::SpawnerRemoved => self.spawners.dec(),
            EventKind::TaskCreated => self.created.inc(),
            EventKind::StatusChanged => {
                if let Some(status) = event.status.filter(|s| s.is_terminal()) {
                    self.finished.with_label_values(&[outcome(status)]).inc();
                }
            }
            EventKind::DispatchRetry | EventKind::DispatchFailed => self.dispatch_failures.inc(),
            EventKind::ProcessExited | EventKind::TaskEvicted => {}
        }
    }
}

fn outcome(status: SpawnStatus) -> &'static str {
    match status {
        SpawnStatus::Finalized => "finalized",
        SpawnStatus::Killed => "killed",
        _ => "aborted",
    }
}

#[async_trait]
impl Subscribe for PrometheusMetrics {
    async fn on_event(&self, event: &SpawnEvent) {
        self.record(event);
    }

    fn name(&self) -> &'static str {
        "prometheus"
    }
}
