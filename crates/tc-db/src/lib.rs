//! Storage layer for the time clock.
//!
//! Provides two `rusqlite`-backed stores:
//! - [`OfflineQueue`]: the client-side durable buffer of events not yet
//!   confirmed by the authoritative store
//! - [`Database`]: an append-only event store that deduplicates on the natural
//!   key `(staff_id, device_id, event_type, occurred_at)`
//!
//! # Thread Safety
//!
//! Both types wrap a `rusqlite::Connection`, which is `Send` but not `Sync`.
//! Share them across tasks behind a `Mutex`, or open one instance per thread;
//! SQLite serializes writers on the same file.
//!
//! # Timestamp Format
//!
//! Timestamps are stored as TEXT in RFC 3339 UTC with fixed millisecond
//! precision (e.g., `2025-01-15T10:30:00.000Z`), so lexicographic ordering
//! matches chronological ordering.

mod queue;
mod store;

use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use tc_core::{AdminId, DeviceId, Event, EventType, StaffId, ValidationError};

pub use queue::{OfflineQueue, QueuedEvent};
pub use store::{AppendOutcome, Database};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// A draft was rejected before reaching storage.
    #[error("invalid event: {0}")]
    Invalid(#[from] ValidationError),
    /// A stored row could not be turned back into an event.
    #[error("corrupt row {row_id}: {message}")]
    CorruptRow { row_id: String, message: String },
}

/// Event columns as read from either table.
struct EventRow {
    row_id: String,
    staff_id: String,
    device_id: String,
    admin_id: Option<String>,
    event_type: String,
    occurred_at: String,
    reason: Option<String>,
}

impl EventRow {
    fn into_event(self) -> Result<Event, DbError> {
        let row_id = self.row_id;
        let corrupt = |message: String| DbError::CorruptRow {
            row_id: row_id.clone(),
            message,
        };
        let event_type: EventType = self
            .event_type
            .parse()
            .map_err(|err: tc_core::UnknownEventType| corrupt(err.to_string()))?;
        Ok(Event {
            staff_id: StaffId::new(self.staff_id).map_err(|err| corrupt(err.to_string()))?,
            device_id: DeviceId::new(self.device_id).map_err(|err| corrupt(err.to_string()))?,
            admin_id: self
                .admin_id
                .map(AdminId::new)
                .transpose()
                .map_err(|err| corrupt(err.to_string()))?,
            event_type,
            occurred_at: parse_timestamp(&self.occurred_at, &row_id)?,
            reason: self.reason,
        })
    }
}

fn parse_timestamp(timestamp: &str, row_id: &str) -> Result<DateTime<Utc>, DbError> {
    DateTime::parse_from_rfc3339(timestamp)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|err| DbError::CorruptRow {
            row_id: row_id.to_string(),
            message: format!("invalid timestamp {timestamp}: {err}"),
        })
}

fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
