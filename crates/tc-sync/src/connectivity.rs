//! Network reachability signal.
//!
//! [`Connectivity`] is the single place the rest of the crate asks "are we
//! online?" and subscribes to changes. Anything can publish into it: the
//! [`ProbeMonitor`], a platform network callback, or a test.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::time::{self, MissedTickBehavior};

use crate::engine::MIN_TICK_PERIOD;
use crate::store::EventStore;

/// Shared online/offline flag with change subscription.
#[derive(Debug, Clone)]
pub struct Connectivity {
    tx: Arc<watch::Sender<bool>>,
}

impl Connectivity {
    pub fn new(online: bool) -> Self {
        let (tx, _rx) = watch::channel(online);
        Self { tx: Arc::new(tx) }
    }

    pub fn is_online(&self) -> bool {
        *self.tx.borrow()
    }

    /// Publishes the current state. Returns whether it changed.
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
            tracing::info!(online, "connectivity changed");
        }
        changed
    }

    /// Receiver that wakes on every change.
    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Periodically probes an [`EventStore`] and publishes the result.
pub struct ProbeMonitor<S> {
    store: Arc<S>,
    connectivity: Connectivity,
    interval: Duration,
    timeout: Duration,
}

impl<S: EventStore> ProbeMonitor<S> {
    pub fn new(
        store: Arc<S>,
        connectivity: Connectivity,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            store,
            connectivity,
            interval: interval.max(MIN_TICK_PERIOD),
            timeout,
        }
    }

    /// Probes once; a probe that outlives the timeout counts as offline.
    pub async fn probe_once(&self) -> bool {
        let online = time::timeout(self.timeout, self.store.probe())
            .await
            .unwrap_or(false);
        self.connectivity.set_online(online);
        online
    }

    /// Probes on every interval tick until `shutdown` flips to true or its
    /// sender is dropped.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        while !*shutdown.borrow() {
            tokio::select! {
                _ = ticker.tick() => {
                    self.probe_once().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
        tracing::debug!("probe monitor stopped");
    }
}
