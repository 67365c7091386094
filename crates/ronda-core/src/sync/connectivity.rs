//! Injected connectivity signals.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::remote::RemoteIncidentStore;

/// "Is the remote reachable right now?" predicate consulted between records
pub trait ConnectivityStatus: Send + Sync {
    fn is_online(&self) -> bool;
}

/// Provider for environments that never report offline
#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysOnline;

impl ConnectivityStatus for AlwaysOnline {
    fn is_online(&self) -> bool {
        true
    }
}

/// Settable online flag that also publishes transitions.
///
/// Subscribers receive every change; the scheduler only reacts to
/// offline -> online.
#[derive(Clone)]
pub struct ConnectivityMonitor {
    tx: Arc<watch::Sender<bool>>,
}

impl ConnectivityMonitor {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    /// Update the flag, returning whether it changed
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.tx.send_if_modified(|current| {
            if *current == online {
                false
            } else {
                *current = online;
                true
            }
        });
        if changed {
            tracing::info!(
                "Connectivity changed: {}",
                if online { "online" } else { "offline" }
            );
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

impl ConnectivityStatus for ConnectivityMonitor {
    fn is_online(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Periodically ping the remote store and feed the result into `monitor`.
///
/// Catches the case where the host claims to be connected but the remote is
/// unreachable, and vice versa.
pub fn spawn_probe(
    remote: Arc<dyn RemoteIncidentStore>,
    monitor: ConnectivityMonitor,
    every: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            interval.tick().await;
            match remote.ping().await {
                Ok(()) => {
                    monitor.set_online(true);
                }
                Err(error) => {
                    if monitor.set_online(false) {
                        tracing::warn!("Remote store unreachable: {}", error);
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::MemoryIncidentStore;

    #[test]
    fn set_online_reports_transitions_only() {
        let monitor = ConnectivityMonitor::new(false);
        assert!(!monitor.is_online());
        assert!(monitor.set_online(true));
        assert!(!monitor.set_online(true));
        assert!(monitor.is_online());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn subscribers_see_changes() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();

        monitor.set_online(true);
        rx.changed().await.unwrap();
        assert!(*rx.borrow_and_update());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn probe_marks_reachable_store_online() {
        let monitor = ConnectivityMonitor::new(false);
        let mut rx = monitor.subscribe();
        let probe = spawn_probe(
            Arc::new(MemoryIncidentStore::new()),
            monitor.clone(),
            Duration::from_millis(10),
        );

        tokio::time::timeout(Duration::from_secs(5), rx.changed())
            .await
            .unwrap()
            .unwrap();
        assert!(monitor.is_online());
        probe.abort();
    }
}
