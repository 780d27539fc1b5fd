use async_trait::async_trait;
use roost_core::{SpawnEvent, Subscribe};

use crate::subscriber::view::log_event;

/// Writes every coordinator event to the log.
#[derive(Debug, Default)]
pub struct EventLog;

impl EventLog {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Subscribe for EventLog {
    async fn on_event(&self, event: &SpawnEvent) {
        log_event(event);
    }

    fn name(&self) -> &'static str {
        "event-log"
    }

    fn queue_capacity(&self) -> usize {
        2048
    }
}
