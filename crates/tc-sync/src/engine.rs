//! Drains the offline queue into the event store.
//!
//! # Sync Pass
//!
//! A pass delivers queued entries strictly in enqueue order. The first entry
//! that fails (error, timeout, or a failed acknowledge) ends the pass, so
//! nothing queued after it is delivered ahead of it. Only one pass runs at a
//! time; a trigger that arrives while a pass is running is dropped.
//!
//! # Triggers
//!
//! [`SyncEngine::run`] starts a pass on startup, after connectivity comes
//! back (once the stabilization delay passes without dropping again), on a
//! fixed interval while online, and whenever a [`SyncHandle`] requests one.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{Mutex, Notify, watch};
use tokio::time::{self, Instant, MissedTickBehavior};

use tc_db::{DbError, OfflineQueue};

use crate::connectivity::Connectivity;
use crate::store::{DeliveryError, EventStore};

/// Shortest period the background tickers will run at; zero periods are
/// raised to this.
pub const MIN_TICK_PERIOD: Duration = Duration::from_secs(1);

/// Timing knobs for the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncSettings {
    /// Period of the background pass while online.
    pub interval: Duration,
    /// Wait after coming back online before syncing.
    pub stabilization_delay: Duration,
    /// Deadline for each store call.
    pub submit_timeout: Duration,
    /// Period of the connectivity probe.
    pub probe_interval: Duration,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            stabilization_delay: Duration::from_secs(1),
            submit_timeout: Duration::from_secs(10),
            probe_interval: Duration::from_secs(15),
        }
    }
}

/// Counts from one sync pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SyncOutcome {
    pub success: usize,
    pub failed: usize,
}

impl SyncOutcome {
    /// Whether the pass did nothing (busy, offline, or empty queue).
    pub const fn is_noop(&self) -> bool {
        self.success == 0 && self.failed == 0
    }
}

/// Point-in-time view for presentation layers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub queue_length: usize,
    pub last_sync: Option<DateTime<Utc>>,
    pub is_syncing: bool,
}

/// Requests a sync pass from a running engine loop.
#[derive(Debug, Clone)]
pub struct SyncHandle {
    notify: Arc<Notify>,
}

impl SyncHandle {
    /// Asks the loop for a pass. Requests made while one is pending collapse.
    pub fn request(&self) {
        self.notify.notify_one();
    }
}

/// Releases the busy flag when a pass ends, however it ends.
struct BusyGuard<'a>(&'a AtomicBool);

impl<'a> BusyGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Owns the offline queue and delivers it to `S`.
pub struct SyncEngine<S> {
    store: Arc<S>,
    queue: Mutex<OfflineQueue>,
    connectivity: Connectivity,
    settings: SyncSettings,
    busy: AtomicBool,
    last_sync: Mutex<Option<DateTime<Utc>>>,
    requests: Arc<Notify>,
}

impl<S: EventStore> SyncEngine<S> {
    pub fn new(
        store: Arc<S>,
        queue: OfflineQueue,
        connectivity: Connectivity,
        settings: SyncSettings,
    ) -> Self {
        Self {
            store,
            queue: Mutex::new(queue),
            connectivity,
            settings,
            busy: AtomicBool::new(false),
            last_sync: Mutex::new(None),
            requests: Arc::new(Notify::new()),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub const fn queue(&self) -> &Mutex<OfflineQueue> {
        &self.queue
    }

    pub const fn connectivity(&self) -> &Connectivity {
        &self.connectivity
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn handle(&self) -> SyncHandle {
        SyncHandle {
            notify: Arc::clone(&self.requests),
        }
    }

    /// Runs one sync pass.
    ///
    /// Returns `{0, 0}` without touching the store when a pass is already
    /// running or the engine is offline. `last_sync` moves only when at least
    /// one entry was delivered.
    pub async fn sync_now(&self) -> SyncOutcome {
        let Some(_busy) = BusyGuard::acquire(&self.busy) else {
            tracing::debug!("sync already in progress");
            return SyncOutcome::default();
        };
        if !self.connectivity.is_online() {
            tracing::debug!("offline, skipping sync");
            return SyncOutcome::default();
        }

        let entries = match self.queue.lock().await.list_ordered() {
            Ok(entries) => entries,
            Err(err) => {
                tracing::error!(error = %err, "failed to read offline queue");
                return SyncOutcome::default();
            }
        };
        if entries.is_empty() {
            return SyncOutcome::default();
        }

        let mut outcome = SyncOutcome::default();
        for entry in entries {
            let delivery = time::timeout(self.settings.submit_timeout, self.store.submit(&entry.event))
                .await
                .unwrap_or(Err(DeliveryError::Timeout(self.settings.submit_timeout)));

            let receipt = match delivery {
                Ok(receipt) => receipt,
                Err(err) => {
                    tracing::warn!(
                        local_id = %entry.local_id,
                        staff_id = %entry.event.staff_id,
                        error = %err,
                        "delivery failed, halting sync pass"
                    );
                    outcome.failed += 1;
                    break;
                }
            };

            if let Err(err) = self.queue.lock().await.acknowledge(&entry.local_id) {
                tracing::warn!(
                    local_id = %entry.local_id,
                    server_id = receipt.server_id,
                    error = %err,
                    "acknowledge failed, halting sync pass"
                );
                outcome.failed += 1;
                break;
            }
            tracing::debug!(
                local_id = %entry.local_id,
                server_id = receipt.server_id,
                "event delivered"
            );
            outcome.success += 1;
        }

        if outcome.success > 0 {
            *self.last_sync.lock().await = Some(Utc::now());
        }
        tracing::info!(
            success = outcome.success,
            failed = outcome.failed,
            "sync pass finished"
        );
        outcome
    }

    /// Current status, with the queue length read fresh.
    pub async fn status(&self) -> Result<SyncStatus, DbError> {
        let queue_length = self.queue.lock().await.count()?;
        Ok(SyncStatus {
            is_online: self.connectivity.is_online(),
            queue_length,
            last_sync: *self.last_sync.lock().await,
            is_syncing: self.busy.load(Ordering::Acquire),
        })
    }

    /// Runs sync passes on every trigger until `shutdown` flips to true or
    /// its sender is dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut online_rx = self.connectivity.subscribe();
        let mut was_online = *online_rx.borrow_and_update();

        self.sync_now().await;

        let period = self.settings.interval.max(MIN_TICK_PERIOD);
        let mut ticker = time::interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let reconnect = time::sleep(Duration::ZERO);
        tokio::pin!(reconnect);
        let mut reconnect_pending = false;

        while !*shutdown.borrow() {
            tokio::select! {
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                changed = online_rx.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let online = *online_rx.borrow_and_update();
                    if online && !was_online {
                        tracing::debug!(
                            delay_ms = u64::try_from(self.settings.stabilization_delay.as_millis())
                                .unwrap_or(u64::MAX),
                            "back online, waiting before sync"
                        );
                        reconnect
                            .as_mut()
                            .reset(Instant::now() + self.settings.stabilization_delay);
                        reconnect_pending = true;
                    } else if !online {
                        reconnect_pending = false;
                    }
                    was_online = online;
                }
                () = &mut reconnect, if reconnect_pending => {
                    reconnect_pending = false;
                    self.sync_now().await;
                }
                _ = ticker.tick() => {
                    if self.connectivity.is_online() {
                        self.sync_now().await;
                    }
                }
                () = self.requests.notified() => {
                    self.sync_now().await;
                }
            }
        }
        tracing::debug!("sync loop stopped");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use tc_core::{EventDraft, EventType, LocalId};

    use crate::testing::ScriptedStore;

    fn draft(minute: u32) -> EventDraft {
        let at = Utc.with_ymd_and_hms(2025, 3, 10, 9, minute, 0).unwrap();
        EventDraft::new("s-1", "kiosk", EventType::ClockIn, at)
    }

    fn engine_with(store: ScriptedStore, online: bool) -> (Arc<SyncEngine<ScriptedStore>>, Connectivity) {
        let connectivity = Connectivity::new(online);
        let engine = SyncEngine::new(
            Arc::new(store),
            OfflineQueue::open_in_memory().unwrap(),
            connectivity.clone(),
            SyncSettings::default(),
        );
        (Arc::new(engine), connectivity)
    }

    async fn enqueue(engine: &SyncEngine<ScriptedStore>, minute: u32) -> LocalId {
        engine.queue().lock().await.enqueue(&draft(minute)).unwrap().local_id
    }

    async fn queued_ids(engine: &SyncEngine<ScriptedStore>) -> Vec<LocalId> {
        engine
            .queue()
            .lock()
            .await
            .list_ordered()
            .unwrap()
            .into_iter()
            .map(|e| e.local_id)
            .collect()
    }

    #[tokio::test]
    async fn first_failure_halts_pass_and_keeps_order() {
        let store = ScriptedStore::new();
        let (engine, _) = engine_with(store, true);
        let a = enqueue(&engine, 0).await;
        let b = enqueue(&engine, 1).await;
        let c = enqueue(&engine, 2).await;
        engine.store().fail_minute(0);

        let outcome = engine.sync_now().await;

        assert_eq!(outcome, SyncOutcome { success: 0, failed: 1 });
        assert_eq!(queued_ids(&engine).await, vec![a, b, c]);
        assert_eq!(engine.store().submitted().len(), 0);
        assert!(engine.status().await.unwrap().last_sync.is_none());
    }

    #[tokio::test]
    async fn failure_mid_queue_keeps_the_rest() {
        let (engine, _) = engine_with(ScriptedStore::new(), true);
        enqueue(&engine, 0).await;
        let b = enqueue(&engine, 1).await;
        let c = enqueue(&engine, 2).await;
        engine.store().fail_minute(1);

        let outcome = engine.sync_now().await;

        assert_eq!(outcome, SyncOutcome { success: 1, failed: 1 });
        assert_eq!(queued_ids(&engine).await, vec![b, c]);
        assert!(engine.status().await.unwrap().last_sync.is_some());
    }

    #[tokio::test]
    async fn successful_pass_empties_queue() {
        let (engine, _) = engine_with(ScriptedStore::new(), true);
        enqueue(&engine, 0).await;
        enqueue(&engine, 1).await;

        let outcome = engine.sync_now().await;

        assert_eq!(outcome, SyncOutcome { success: 2, failed: 0 });
        let status = engine.status().await.unwrap();
        assert_eq!(status.queue_length, 0);
        assert!(status.last_sync.is_some());
        assert!(!status.is_syncing);

        let minutes: Vec<u32> = engine
            .store()
            .submitted()
            .iter()
            .map(|e| chrono::Timelike::minute(&e.occurred_at))
            .collect();
        assert_eq!(minutes, vec![0, 1]);
    }

    #[tokio::test]
    async fn offline_pass_is_noop() {
        let (engine, _) = engine_with(ScriptedStore::new(), false);
        enqueue(&engine, 0).await;

        let outcome = engine.sync_now().await;

        assert!(outcome.is_noop());
        assert_eq!(engine.status().await.unwrap().queue_length, 1);
        assert!(engine.store().submitted().is_empty());
    }

    #[tokio::test]
    async fn empty_queue_does_not_touch_last_sync() {
        let (engine, _) = engine_with(ScriptedStore::new(), true);
        assert!(engine.sync_now().await.is_noop());
        assert!(engine.status().await.unwrap().last_sync.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_trigger_is_rejected_while_busy() {
        let (engine, _) = engine_with(ScriptedStore::new().with_delay(Duration::from_secs(2)), true);
        enqueue(&engine, 0).await;

        let first = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.sync_now().await }
        });
        time::sleep(Duration::from_millis(100)).await;

        assert!(engine.status().await.unwrap().is_syncing);
        assert!(engine.sync_now().await.is_noop());

        assert_eq!(first.await.unwrap(), SyncOutcome { success: 1, failed: 0 });
        assert!(!engine.status().await.unwrap().is_syncing);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_counts_as_failure() {
        let (engine, _) = engine_with(ScriptedStore::new().with_delay(Duration::from_secs(60)), true);
        let a = enqueue(&engine, 0).await;

        let outcome = engine.sync_now().await;

        assert_eq!(outcome, SyncOutcome { success: 0, failed: 1 });
        assert_eq!(queued_ids(&engine).await, vec![a]);
    }

    #[tokio::test]
    async fn redelivery_after_lost_ack_is_harmless() {
        let store = ScriptedStore::new();
        let (engine, _) = engine_with(store, true);
        let queued = engine.queue().lock().await.enqueue(&draft(0)).unwrap();

        // Delivered once already, but the acknowledgement never happened.
        engine.store().submit(&queued.event).await.unwrap();
        let outcome = engine.sync_now().await;

        assert_eq!(outcome, SyncOutcome { success: 1, failed: 0 });
        assert_eq!(engine.store().stored_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_waits_for_stabilization_delay() {
        let (engine, connectivity) = engine_with(ScriptedStore::new(), false);
        enqueue(&engine, 0).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run(shutdown_rx).await }
        });
        time::sleep(Duration::from_millis(10)).await;

        connectivity.set_online(true);
        time::sleep(Duration::from_millis(500)).await;
        assert_eq!(engine.status().await.unwrap().queue_length, 1);

        time::sleep(Duration::from_millis(600)).await;
        assert_eq!(engine.status().await.unwrap().queue_length, 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn zero_interval_runs_at_minimum_period() {
        let connectivity = Connectivity::new(true);
        let engine = Arc::new(SyncEngine::new(
            Arc::new(ScriptedStore::new()),
            OfflineQueue::open_in_memory().unwrap(),
            connectivity,
            SyncSettings {
                interval: Duration::ZERO,
                ..SyncSettings::default()
            },
        ));
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run(shutdown_rx).await }
        });
        time::sleep(Duration::from_millis(10)).await;

        enqueue(&engine, 0).await;
        time::sleep(MIN_TICK_PERIOD).await;
        assert_eq!(engine.status().await.unwrap().queue_length, 0);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn flapping_connection_cancels_pending_sync() {
        let (engine, connectivity) = engine_with(ScriptedStore::new(), false);
        enqueue(&engine, 0).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run(shutdown_rx).await }
        });
        time::sleep(Duration::from_millis(10)).await;

        connectivity.set_online(true);
        time::sleep(Duration::from_millis(300)).await;
        connectivity.set_online(false);
        time::sleep(Duration::from_secs(2)).await;

        assert_eq!(engine.status().await.unwrap().queue_length, 1);
        assert!(engine.store().submitted().is_empty());

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn interval_and_manual_triggers() {
        let (engine, _) = engine_with(ScriptedStore::new(), true);
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run(shutdown_rx).await }
        });
        time::sleep(Duration::from_millis(10)).await;

        enqueue(&engine, 0).await;
        time::sleep(Duration::from_secs(31)).await;
        assert_eq!(engine.status().await.unwrap().queue_length, 0);

        enqueue(&engine, 1).await;
        engine.handle().request();
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(engine.status().await.unwrap().queue_length, 0);
        assert_eq!(engine.store().submitted().len(), 2);

        shutdown_tx.send(true).unwrap();
        task.await.unwrap();
    }

    #[tokio::test]
    async fn startup_pass_drains_backlog() {
        let (engine, _) = engine_with(ScriptedStore::new(), true);
        enqueue(&engine, 0).await;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let task = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run(shutdown_rx).await }
        });

        tokio::task::yield_now().await;
        for _ in 0..100 {
            if engine.status().await.unwrap().queue_length == 0 {
                break;
            }
            tokio::task::yield_now().await;
        }
        assert_eq!(engine.status().await.unwrap().queue_length, 0);

        drop(shutdown_tx);
        task.await.unwrap();
    }
}
