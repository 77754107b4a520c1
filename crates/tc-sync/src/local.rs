//! Event store backed by a local SQLite file.

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

use tc_core::{Event, StaffId, StoredEvent};
use tc_db::Database;

use crate::store::{DeliveryError, EventStore, SubmitReceipt};

/// [`EventStore`] over a [`Database`] in the same process.
///
/// Used when no server is configured, and in tests.
pub struct SqliteEventStore {
    db: Mutex<Database>,
}

impl SqliteEventStore {
    pub fn new(db: Database) -> Self {
        Self { db: Mutex::new(db) }
    }
}

impl EventStore for SqliteEventStore {
    async fn submit(&self, event: &Event) -> Result<SubmitReceipt, DeliveryError> {
        let outcome = self.db.lock().await.append(event)?;
        Ok(SubmitReceipt {
            server_id: outcome.server_id,
        })
    }

    async fn list_events(
        &self,
        staff_id: &StaffId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DeliveryError> {
        Ok(self.db.lock().await.list_events(staff_id, from, to)?)
    }

    async fn list_all_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DeliveryError> {
        Ok(self.db.lock().await.list_all_events(from, to)?)
    }

    async fn latest_event(&self, staff_id: &StaffId) -> Result<Option<StoredEvent>, DeliveryError> {
        Ok(self.db.lock().await.latest_event(staff_id)?)
    }
}
