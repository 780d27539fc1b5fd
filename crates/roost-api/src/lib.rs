//! HTTP transport for roost.
//!
//! - [`MasterApi`]: axum router in front of a [`roost_core::SpawnCoordinator`].
//! - [`WorkerApi`]: axum router in front of any [`roost_core::SpawnerLink`], normally
//!   the worker's controller.
//! - [`HttpSpawnerLink`] / [`HttpMasterLink`]: reqwest clients for the two directions.
//!
//! Callers identify themselves with the [`PEER_HEADER`] header and may present a
//! bearer token that maps to a permission level through [`ApiConfig::access_tokens`].

/// Header carrying the caller's peer id.
pub const PEER_HEADER: &str = "x-roost-peer";

mod config;
pub use config::ApiConfig;

mod connector;
pub use connector::SpawnerConnector;

mod error;
pub use error::ApiError;

mod inbox;
pub use inbox::StatusInbox;

pub mod wire;

#[cfg(feature = "http")]
mod caller;
#[cfg(feature = "http")]
pub use caller::Caller;

#[cfg(feature = "http")]
mod master;
#[cfg(feature = "http")]
pub use master::MasterApi;

#[cfg(feature = "http")]
mod worker;
#[cfg(feature = "http")]
pub use worker::WorkerApi;

#[cfg(feature = "http")]
pub use axum;

#[cfg(feature = "client")]
mod client;
#[cfg(feature = "client")]
pub use client::{HttpClient, HttpConnector, HttpMasterLink, HttpSpawnerLink, discover_public_ip};
