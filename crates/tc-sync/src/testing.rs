//! In-memory store double for unit tests.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use chrono::{DateTime, Timelike, Utc};
use tc_core::{Event, StaffId, StoredEvent};

use crate::store::{DeliveryError, EventStore, SubmitReceipt};

/// Deduplicates on the natural key like a real store, and can be told to
/// fail specific events or to answer slowly.
pub struct ScriptedStore {
    stored: Mutex<Vec<StoredEvent>>,
    submitted: Mutex<Vec<Event>>,
    failing_minutes: Mutex<HashSet<u32>>,
    delay: Duration,
    reachable: AtomicBool,
}

impl ScriptedStore {
    pub fn new() -> Self {
        Self {
            stored: Mutex::new(Vec::new()),
            submitted: Mutex::new(Vec::new()),
            failing_minutes: Mutex::new(HashSet::new()),
            delay: Duration::ZERO,
            reachable: AtomicBool::new(true),
        }
    }

    /// Every call (including probes) sleeps this long first.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Submissions of events occurring at this minute fail with a 503.
    pub fn fail_minute(&self, minute: u32) {
        self.failing_minutes.lock().unwrap().insert(minute);
    }

    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Successful submit calls, in call order.
    pub fn submitted(&self) -> Vec<Event> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn stored_count(&self) -> usize {
        self.stored.lock().unwrap().len()
    }

    async fn pause(&self) {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
    }
}

impl EventStore for ScriptedStore {
    async fn submit(&self, event: &Event) -> Result<SubmitReceipt, DeliveryError> {
        self.pause().await;
        if self
            .failing_minutes
            .lock()
            .unwrap()
            .contains(&event.occurred_at.minute())
        {
            return Err(DeliveryError::Unavailable { status: 503 });
        }

        self.submitted.lock().unwrap().push(event.clone());
        let mut stored = self.stored.lock().unwrap();
        let key = event.natural_key();
        if let Some(existing) = stored.iter().find(|s| s.event.natural_key() == key) {
            return Ok(SubmitReceipt {
                server_id: existing.server_id,
            });
        }
        let server_id = i64::try_from(stored.len()).unwrap() + 1;
        stored.push(StoredEvent {
            server_id,
            event: event.clone(),
        });
        Ok(SubmitReceipt { server_id })
    }

    async fn list_events(
        &self,
        staff_id: &StaffId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DeliveryError> {
        let all = self.list_all_events(from, to).await?;
        Ok(all
            .into_iter()
            .filter(|s| &s.event.staff_id == staff_id)
            .collect())
    }

    async fn list_all_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DeliveryError> {
        self.pause().await;
        let mut events: Vec<StoredEvent> = self
            .stored
            .lock()
            .unwrap()
            .iter()
            .filter(|s| s.event.occurred_at >= from && s.event.occurred_at < to)
            .cloned()
            .collect();
        tc_core::sort_chronologically(&mut events);
        Ok(events)
    }

    async fn latest_event(&self, staff_id: &StaffId) -> Result<Option<StoredEvent>, DeliveryError> {
        self.pause().await;
        Ok(self
            .stored
            .lock()
            .unwrap()
            .iter()
            .filter(|s| &s.event.staff_id == staff_id)
            .max_by_key(|s| (s.event.occurred_at, s.server_id))
            .cloned())
    }

    async fn probe(&self) -> bool {
        self.pause().await;
        self.reachable.load(Ordering::SeqCst)
    }
}
