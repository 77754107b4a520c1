//! Clock actions: rule check, durable staging, opportunistic delivery.
//!
//! Every action is enqueued first and then offered to the store, so an action
//! taken while offline succeeds and stays pending until a later sync pass.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;
use tokio::time;

use tc_core::{
    DUPLICATE_PUNCH_WINDOW_SECS, Event, EventDraft, ManualOverride, RuleViolation, StaffId,
    StoredEvent, ValidationError, check_punch,
};
use tc_db::{DbError, QueuedEvent};

use crate::engine::{SyncEngine, SyncOutcome};
use crate::store::{DeliveryError, EventStore};

/// Why a clock action was refused.
#[derive(Debug, Error)]
pub enum ClockError {
    #[error(transparent)]
    Invalid(#[from] ValidationError),
    #[error(transparent)]
    Rule(#[from] RuleViolation),
    #[error("offline queue error: {0}")]
    Queue(#[from] DbError),
}

/// Result of an accepted clock action.
#[derive(Debug, Clone)]
pub struct PunchReceipt {
    pub queued: QueuedEvent,
    /// The sync pass run right after enqueueing.
    pub sync: SyncOutcome,
    /// False while the event is still waiting in the offline queue.
    pub delivered: bool,
}

/// Entry point for staff punches and administrator corrections.
pub struct ClockService<S> {
    engine: Arc<SyncEngine<S>>,
}

impl<S: EventStore> ClockService<S> {
    pub const fn new(engine: Arc<SyncEngine<S>>) -> Self {
        Self { engine }
    }

    pub const fn engine(&self) -> &Arc<SyncEngine<S>> {
        &self.engine
    }

    /// Records a staff punch after checking the clock-in/out rules.
    pub async fn punch(&self, draft: &EventDraft) -> Result<PunchReceipt, ClockError> {
        let event = draft.validate()?;
        let timeline = self.timeline(&event.staff_id, event.occurred_at).await?;
        check_punch(&event.staff_id, &timeline, event.event_type, event.occurred_at)?;
        self.record(draft).await
    }

    /// Records an administrator correction. Clock rules are not applied.
    pub async fn manual_override(&self, request: ManualOverride) -> Result<PunchReceipt, ClockError> {
        let draft = request.into_draft()?;
        draft.validate()?;
        tracing::info!(
            staff_id = %draft.staff_id,
            admin_id = draft.admin_id.as_deref().unwrap_or_default(),
            event_type = %draft.event_type,
            "recording manual override"
        );
        self.record(&draft).await
    }

    /// What is known about a staff member's punches around `at`: the store's
    /// events from the preceding minute plus its latest event, when it answers
    /// in time, followed by anything still queued.
    pub async fn timeline(
        &self,
        staff_id: &StaffId,
        at: DateTime<Utc>,
    ) -> Result<Vec<Event>, ClockError> {
        let mut timeline = Vec::new();
        if self.engine.connectivity().is_online() {
            let timeout = self.engine.settings().submit_timeout;
            match time::timeout(timeout, self.stored_around(staff_id, at)).await {
                Ok(Ok(stored)) => timeline.extend(stored.into_iter().map(|entry| entry.event)),
                Ok(Err(err)) => {
                    tracing::warn!(%staff_id, error = %err, "store lookup failed, using queued events only");
                }
                Err(_) => {
                    tracing::warn!(%staff_id, "store lookup timed out, using queued events only");
                }
            }
        }

        let queued = self.engine.queue().lock().await.list_for_staff(staff_id)?;
        timeline.extend(queued.into_iter().map(|entry| entry.event));
        Ok(timeline)
    }

    async fn stored_around(
        &self,
        staff_id: &StaffId,
        at: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DeliveryError> {
        let store = self.engine.store();
        let since = at - Duration::seconds(DUPLICATE_PUNCH_WINDOW_SECS);
        let mut stored = store
            .list_events(staff_id, since, at + Duration::milliseconds(1))
            .await?;
        if let Some(latest) = store.latest_event(staff_id).await? {
            if !stored.iter().any(|entry| entry.server_id == latest.server_id) {
                stored.push(latest);
            }
        }
        Ok(stored)
    }

    async fn record(&self, draft: &EventDraft) -> Result<PunchReceipt, ClockError> {
        let queued = self.engine.queue().lock().await.enqueue(draft)?;
        let sync = self.engine.sync_now().await;
        let delivered = self
            .engine
            .queue()
            .lock()
            .await
            .get(&queued.local_id)?
            .is_none();
        if !delivered {
            tracing::info!(local_id = %queued.local_id, "event pending sync");
        }
        Ok(PunchReceipt {
            queued,
            sync,
            delivered,
        })
    }
}
