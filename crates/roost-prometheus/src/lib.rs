//! Prometheus metrics for the roost spawn coordinator.
//!
//! [`PrometheusMetrics`] is a [`roost_core::Subscribe`] implementation: register it with
//! the coordinator and it keeps its own registry up to date from coordinator events.
//!
//! ## Metrics
//! - `roost_spawners_registered` - Gauge
//! - `roost_spawn_tasks_created_total` - Counter
//! - `roost_spawn_tasks_finished_total{outcome}` - Counter (`finalized`, `aborted`, `killed`)
//! - `roost_spawn_dispatch_failures_total` - Counter (every failed dispatch attempt)
//!
//! ## HTTP Server
//! This crate does NOT serve `/metrics`; [`PrometheusMetrics::render`] returns the text
//! exposition for whatever HTTP framework the application already uses.

mod backend;
pub use backend::PrometheusMetrics;

mod error;
pub use error::MetricsError;

pub use prometheus::{Encoder, Registry, TextEncoder};
