//! Background drain scheduling.
//!
//! Boot, reconnect, heartbeat, and save triggers all funnel into one
//! worker task, so at most one drain runs per client.

use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;

use super::engine::{SyncEngine, SyncSummary, SyncTrigger};

enum Command {
    Drain(SyncTrigger),
    Manual(oneshot::Sender<SyncSummary>),
    Stop,
}

/// Handle to a running (or detached) sync scheduler
#[derive(Clone)]
pub struct SyncHandle {
    engine: SyncEngine,
    tx: Option<mpsc::Sender<Command>>,
}

impl SyncHandle {
    /// Handle that drains inline on the caller's task, without a worker
    pub const fn detached(engine: SyncEngine) -> Self {
        Self { engine, tx: None }
    }

    pub const fn engine(&self) -> &SyncEngine {
        &self.engine
    }

    /// Best-effort wake-up; coalesces with a drain that is already queued.
    pub fn kick(&self, trigger: SyncTrigger) {
        let Some(tx) = &self.tx else {
            return;
        };
        match tx.try_send(Command::Drain(trigger)) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::debug!("Drain already queued; coalescing {} trigger", trigger);
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                tracing::debug!("Sync worker stopped; dropping {} trigger", trigger);
            }
        }
    }

    /// Manual "sync now" that waits for the drain to finish.
    pub async fn trigger_sync(&self) -> SyncSummary {
        if let Some(tx) = &self.tx {
            let (reply_tx, reply_rx) = oneshot::channel();
            if tx.send(Command::Manual(reply_tx)).await.is_ok() {
                if let Ok(summary) = reply_rx.await {
                    return summary;
                }
            }
            tracing::warn!("Sync worker unavailable; draining inline");
        }
        self.engine.drain(SyncTrigger::Manual).await
    }

    pub async fn pending_count(&self) -> usize {
        self.engine.pending_count().await
    }

    /// Stop the worker after its current record.
    pub async fn shutdown(&self) {
        self.engine.request_stop();
        if let Some(tx) = &self.tx {
            let _ = tx.send(Command::Stop).await;
        }
    }
}

/// Spawned tasks behind a [`SyncHandle`]
pub struct SyncWorker {
    worker: JoinHandle<()>,
    producers: Vec<JoinHandle<()>>,
}

impl SyncWorker {
    /// Wait for the worker to exit, then stop the trigger producers.
    pub async fn join(self) {
        if let Err(error) = self.worker.await {
            tracing::error!("Sync worker panicked: {}", error);
        }
        for producer in self.producers {
            producer.abort();
        }
    }
}

/// Start the worker plus its boot, heartbeat, and reconnect producers.
///
/// The boot drain is queued immediately. When `connectivity` is given, each
/// offline -> online transition queues a reconnect drain.
pub fn start_background(
    engine: SyncEngine,
    connectivity: Option<watch::Receiver<bool>>,
    heartbeat: Duration,
) -> (SyncHandle, SyncWorker) {
    let (tx, rx) = mpsc::channel(1);
    let handle = SyncHandle {
        engine: engine.clone(),
        tx: Some(tx.clone()),
    };
    handle.kick(SyncTrigger::Boot);

    let worker = tokio::spawn(run_worker(engine, rx));
    let mut producers = vec![tokio::spawn(run_heartbeat(tx.clone(), heartbeat))];
    if let Some(connectivity) = connectivity {
        producers.push(tokio::spawn(run_reconnect(tx, connectivity)));
    }

    tracing::info!(
        "Sync scheduler started (heartbeat every {}s)",
        heartbeat.as_secs()
    );
    (handle, SyncWorker { worker, producers })
}

async fn run_worker(engine: SyncEngine, mut rx: mpsc::Receiver<Command>) {
    while let Some(command) = rx.recv().await {
        match command {
            Command::Drain(trigger) => {
                engine.drain(trigger).await;
            }
            Command::Manual(reply) => {
                let summary = engine.drain(SyncTrigger::Manual).await;
                let _ = reply.send(summary);
            }
            Command::Stop => break,
        }
    }
    tracing::info!("Sync worker stopped");
}

async fn run_heartbeat(tx: mpsc::Sender<Command>, every: Duration) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    // The first tick completes immediately and boot already queued a drain
    interval.tick().await;
    loop {
        interval.tick().await;
        match tx.try_send(Command::Drain(SyncTrigger::Heartbeat)) {
            Ok(()) | Err(mpsc::error::TrySendError::Full(_)) => {}
            Err(mpsc::error::TrySendError::Closed(_)) => break,
        }
    }
}

async fn run_reconnect(tx: mpsc::Sender<Command>, mut connectivity: watch::Receiver<bool>) {
    let mut was_online = *connectivity.borrow_and_update();
    while connectivity.changed().await.is_ok() {
        let online = *connectivity.borrow_and_update();
        if online && !was_online {
            tracing::info!("Connectivity restored; queueing drain");
            if tx.send(Command::Drain(SyncTrigger::Reconnected)).await.is_err() {
                break;
            }
        }
        was_online = online;
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use serde_json::json;

    use super::*;
    use crate::config::SyncSettings;
    use crate::models::{IncidentCode, IncidentRecord};
    use crate::sync::engine::tests::{harness, harness_with, ScriptedStore};

    async fn wait_for_empty(handle: &SyncHandle) {
        tokio::time::timeout(Duration::from_secs(5), async {
            while handle.pending_count().await > 0 {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        })
        .await
        .unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn boot_trigger_drains_existing_outbox() {
        let h = harness().await;
        h.outbox
            .enqueue(&IncidentRecord::new(IncidentCode::new(1, 2025), json!({})))
            .await
            .unwrap();

        let (handle, worker) = start_background(h.engine.clone(), None, Duration::from_secs(3_600));
        wait_for_empty(&handle).await;
        assert_eq!(h.remote.inner.len().await, 1);

        handle.shutdown().await;
        worker.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn reconnect_trigger_drains_after_coming_online() {
        let h = harness_with(Arc::new(ScriptedStore::default()), &SyncSettings::default()).await;
        h.monitor.set_online(false);
        let (handle, worker) = start_background(
            h.engine.clone(),
            Some(h.monitor.subscribe()),
            Duration::from_secs(3_600),
        );

        h.outbox
            .enqueue(&IncidentRecord::new(IncidentCode::new(1, 2025), json!({})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(handle.pending_count().await, 1);

        h.monitor.set_online(true);
        wait_for_empty(&handle).await;

        handle.shutdown().await;
        worker.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn heartbeat_retries_after_transient_failure() {
        let h = harness().await;
        let record = IncidentRecord::new(IncidentCode::new(1, 2025), json!({}));
        h.outbox.enqueue(&record).await.unwrap();
        h.remote.fail_transiently(record.id);

        let (handle, worker) =
            start_background(h.engine.clone(), None, Duration::from_millis(20));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(handle.pending_count().await, 1);

        h.remote.heal(&record.id);
        wait_for_empty(&handle).await;

        handle.shutdown().await;
        worker.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn manual_trigger_returns_summary() {
        let h = harness().await;
        let (handle, worker) = start_background(h.engine.clone(), None, Duration::from_secs(3_600));
        wait_for_empty(&handle).await;

        h.outbox
            .enqueue(&IncidentRecord::new(IncidentCode::new(1, 2025), json!({})))
            .await
            .unwrap();
        let summary = handle.trigger_sync().await;
        // The boot drain may have raced the enqueue; either way it is gone now
        assert_eq!(summary.pending, 0);
        assert_eq!(h.remote.inner.len().await, 1);

        handle.shutdown().await;
        worker.join().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn detached_handle_drains_inline() {
        let h = harness().await;
        h.outbox
            .enqueue(&IncidentRecord::new(IncidentCode::new(1, 2025), json!({})))
            .await
            .unwrap();

        let handle = SyncHandle::detached(h.engine.clone());
        handle.kick(SyncTrigger::Save);
        assert_eq!(handle.pending_count().await, 1);

        let summary = handle.trigger_sync().await;
        assert_eq!(summary.synced, 1);
        assert_eq!(summary.pending, 0);
    }
}
