use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use tokio::sync::mpsc::{self, error::TrySendError};
use tracing::{debug, warn};

use super::{SpawnEvent, Subscribe};

struct Sink {
    name: &'static str,
    tx: mpsc::Sender<Arc<SpawnEvent>>,
}

/// Fan-out of coordinator events to subscribers.
#[derive(Clone, Default)]
pub struct EventBus {
    sinks: Arc<Vec<Sink>>,
    seq: Arc<AtomicU64>,
}

impl EventBus {
    /// Start one worker task per subscriber.
    ///
    /// Must be called from within a Tokio runtime when `subscribers` is not empty.
    pub fn new(subscribers: Vec<Arc<dyn Subscribe>>) -> Self {
        let mut sinks = Vec::with_capacity(subscribers.len());
        for sub in subscribers {
            let (tx, mut rx) = mpsc::channel::<Arc<SpawnEvent>>(sub.queue_capacity().max(1));
            let name = sub.name();
            tokio::spawn(async move {
                while let Some(ev) = rx.recv().await {
                    sub.on_event(&ev).await;
                }
                debug!(target: "roost.core", subscriber = name, "event subscriber stopped");
            });
            sinks.push(Sink { name, tx });
        }
        Self {
            sinks: Arc::new(sinks),
            seq: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Queue an event for every subscriber without waiting.
    pub fn publish(&self, mut event: SpawnEvent) {
        event.seq = self.seq.fetch_add(1, Ordering::Relaxed) + 1;
        if self.sinks.is_empty() {
            return;
        }
        let event = Arc::new(event);
        for sink in self.sinks.iter() {
            match sink.tx.try_send(Arc::clone(&event)) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    warn!(
                        target: "roost.core",
                        subscriber = sink.name,
                        kind = event.kind.as_str(),
                        "subscriber queue full; event dropped"
                    );
                }
                Err(TrySendError::Closed(_)) => {
                    debug!(target: "roost.core", subscriber = sink.name, "subscriber closed");
                }
            }
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.sinks.len()
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::events::EventKind;

    struct Collect(Mutex<Vec<(u64, EventKind)>>);

    #[async_trait]
    impl Subscribe for Collect {
        async fn on_event(&self, event: &SpawnEvent) {
            self.0.lock().await.push((event.seq, event.kind));
        }
        fn name(&self) -> &'static str {
            "collect"
        }
    }

    #[tokio::test]
    async fn events_arrive_in_publish_order() {
        let sub = Arc::new(Collect(Mutex::new(Vec::new())));
        let bus = EventBus::new(vec![sub.clone()]);

        bus.publish(SpawnEvent::new(EventKind::TaskCreated));
        bus.publish(SpawnEvent::new(EventKind::StatusChanged));
        bus.publish(SpawnEvent::new(EventKind::TaskEvicted));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let seen = sub.0.lock().await.clone();
        assert_eq!(
            seen,
            vec![
                (1, EventKind::TaskCreated),
                (2, EventKind::StatusChanged),
                (3, EventKind::TaskEvicted),
            ]
        );
    }

    #[test]
    fn publish_without_subscribers_is_noop() {
        let bus = EventBus::default();
        bus.publish(SpawnEvent::new(EventKind::TaskCreated));
        assert_eq!(bus.subscriber_count(), 0);
    }
}
