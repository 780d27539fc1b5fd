//! Shared data model for the roost spawn orchestration core.
//!
//! Everything in this crate is plain, serializable data: identifiers, option bags,
//! task/spawner snapshots and the messages exchanged between requesters, the master,
//! spawner workers and spawned processes. No runtime lives here.

mod constants;
pub use constants::*;

mod domain;
pub use domain::*;

mod error;
pub use error::ModelError;

pub mod message;
