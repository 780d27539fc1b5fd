use roost_core::{EventKind, SpawnEvent};
use roost_model::SpawnStatus;
use tracing::{debug, error, info, warn};

#[inline]
pub fn message_for(kind: EventKind) -> &'static str {
    match kind {
        // spawners
        EventKind::SpawnerRegistered => "spawner registered",
        EventKind::SpawnerRemoved => "spawner removed; its unfinished tasks were aborted",

        // tasks
        EventKind::TaskCreated => "spawn task created and queued",
        EventKind::StatusChanged => "spawn task changed status",
        EventKind::ProcessExited => "spawned process exited",
        EventKind::TaskEvicted => "finished spawn task evicted",

        // dispatch
        EventKind::DispatchRetry => "dispatch failed; task requeued",
        EventKind::DispatchFailed => "dispatch failed; task aborted",
    }
}

fn id_or_dash<T: ToString>(v: Option<T>) -> String {
    v.map_or_else(|| "-".to_string(), |v| v.to_string())
}

#[inline]
pub fn log_event(e: &SpawnEvent) {
    let msg = message_for(e.kind);
    let task = id_or_dash(e.spawn_id);
    let spawner = id_or_dash(e.spawner_id);
    let peer = id_or_dash(e.peer.as_ref());
    let reason = e.reason.as_deref().unwrap_or("");

    match e.kind {
        EventKind::SpawnerRegistered => info!(target: "roost.events", %spawner, %peer, "{msg}"),
        EventKind::SpawnerRemoved => warn!(target: "roost.events", %spawner, %peer, reason, "{msg}"),

        EventKind::TaskCreated => debug!(target: "roost.events", %task, %spawner, %peer, "{msg}"),
        EventKind::StatusChanged => {
            let status = e.status.map_or("-", SpawnStatus::as_str);
            match e.status {
                Some(SpawnStatus::Aborting | SpawnStatus::Aborted | SpawnStatus::Killed) => {
                    warn!(target: "roost.events", %task, %spawner, status, "{msg}")
                }
                Some(SpawnStatus::Finalized | SpawnStatus::ProcessRegistered) => {
                    info!(target: "roost.events", %task, %spawner, status, "{msg}")
                }
                _ => debug!(target: "roost.events", %task, %spawner, status, "{msg}"),
            }
        }
        EventKind::ProcessExited => info!(target: "roost.events", %task, %spawner, "{msg}"),
        EventKind::TaskEvicted => debug!(target: "roost.events", %task, "{msg}"),

        EventKind::DispatchRetry => warn!(
            target: "roost.events",
            %task,
            %spawner,
            attempt = e.attempt.unwrap_or(0),
            reason,
            "{msg}"
        ),
        EventKind::DispatchFailed => error!(
            target: "roost.events",
            %task,
            %spawner,
            attempt = e.attempt.unwrap_or(0),
            reason,
            "{msg}"
        ),
    }
}

#[cfg(test)]
mod tests {
    use roost_model::{SpawnTaskId, SpawnerId};

    use super::*;

    #[test]
    fn every_kind_has_a_message() {
        for kind in [
            EventKind::SpawnerRegistered,
            EventKind::SpawnerRemoved,
            EventKind::TaskCreated,
            EventKind::StatusChanged,
            EventKind::ProcessExited,
            EventKind::DispatchRetry,
            EventKind::DispatchFailed,
            EventKind::TaskEvicted,
        ] {
            assert!(!message_for(kind).is_empty());
        }
    }

    #[test]
    fn logging_sparse_events_does_not_panic() {
        log_event(&SpawnEvent::new(EventKind::DispatchFailed));
        log_event(
            &SpawnEvent::new(EventKind::StatusChanged)
                .with_spawn(SpawnTaskId(1))
                .with_spawner(SpawnerId(2))
                .with_status(SpawnStatus::Aborted),
        );
    }
}
