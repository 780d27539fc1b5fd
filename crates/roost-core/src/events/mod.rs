//! Coordinator events and their fan-out to subscribers.
//!
//! Every state change the coordinator makes is published as a [`SpawnEvent`]. Each
//! subscriber owns a bounded queue drained by its own worker task, so a slow
//! subscriber never blocks the coordinator; when its queue is full the event is
//! dropped for that subscriber only.
//!
//! Events are published while the coordinator holds its registry lock, so every
//! subscriber sees the transitions of a task in the order they happened.

mod bus;
pub use bus::EventBus;

mod event;
pub use event::{EventKind, SpawnEvent};

use async_trait::async_trait;

/// Consumer of coordinator events.
#[async_trait]
pub trait Subscribe: Send + Sync + 'static {
    async fn on_event(&self, event: &SpawnEvent);

    /// Name used in logs.
    fn name(&self) -> &'static str;

    /// Capacity of the subscriber's queue.
    fn queue_capacity(&self) -> usize {
        1024
    }
}
