//! Durable client-side queue of events awaiting confirmation.
//!
//! Delivery is at-least-once: an entry stays queued until [`OfflineQueue::acknowledge`]
//! is called for it, which happens only after the authoritative store confirmed
//! persistence. Entries are never deduplicated here; the store's natural-key
//! idempotency makes re-delivery harmless.

use std::path::Path;

use chrono::{DateTime, SubsecRound, Utc};
use rusqlite::{Connection, OptionalExtension, params};
use uuid::Uuid;

use tc_core::{Event, EventDraft, LocalId, StaffId};

use crate::{DbError, EventRow, format_timestamp, parse_timestamp};

/// An event draft staged in the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedEvent {
    pub local_id: LocalId,
    pub enqueued_at: DateTime<Utc>,
    pub event: Event,
}

/// Offline queue backed by a SQLite file.
pub struct OfflineQueue {
    conn: Connection,
}

impl OfflineQueue {
    /// Opens the queue at the given path, creating it if necessary.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let queue = Self { conn };
        queue.init()?;
        Ok(queue)
    }

    /// Opens an in-memory queue. Entries are lost when it is dropped.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let queue = Self { conn };
        queue.init()?;
        Ok(queue)
    }

    fn init(&self) -> Result<(), DbError> {
        let mode: String =
            self.conn
                .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        tracing::trace!(%mode, "offline queue journal mode");
        self.conn.pragma_update(None, "synchronous", "FULL")?;
        self.conn.execute_batch(
            "
            -- seq: insertion order, breaks enqueued_at ties
            -- enqueued_at: never decreases, so FIFO by time equals FIFO by insertion
            CREATE TABLE IF NOT EXISTS queued_events (
                seq INTEGER PRIMARY KEY AUTOINCREMENT,
                local_id TEXT NOT NULL UNIQUE,
                staff_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                admin_id TEXT,
                event_type TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                reason TEXT,
                enqueued_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_queued_events_enqueued ON queued_events(enqueued_at, seq);
            CREATE INDEX IF NOT EXISTS idx_queued_events_staff ON queued_events(staff_id);
            ",
        )?;
        Ok(())
    }

    /// Validates and appends a draft.
    ///
    /// The row is committed before this returns. Invalid drafts are rejected
    /// with [`DbError::Invalid`] and never stored.
    pub fn enqueue(&mut self, draft: &EventDraft) -> Result<QueuedEvent, DbError> {
        let event = draft.validate()?;
        let local_id = LocalId::new(Uuid::new_v4().to_string())?;

        let tx = self.conn.transaction()?;
        let last: Option<String> =
            tx.query_row("SELECT MAX(enqueued_at) FROM queued_events", [], |row| {
                row.get(0)
            })?;
        let now = Utc::now().trunc_subsecs(3);
        let enqueued_at = match last {
            Some(last) => parse_timestamp(&last, "max(enqueued_at)")?.max(now),
            None => now,
        };
        tx.execute(
            "
            INSERT INTO queued_events
            (local_id, staff_id, device_id, admin_id, event_type, occurred_at, reason, enqueued_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                local_id.as_str(),
                event.staff_id.as_str(),
                event.device_id.as_str(),
                event.admin_id.as_ref().map(tc_core::AdminId::as_str),
                event.event_type.as_str(),
                format_timestamp(event.occurred_at),
                event.reason,
                format_timestamp(enqueued_at),
            ],
        )?;
        tx.commit()?;

        tracing::debug!(
            local_id = %local_id,
            staff_id = %event.staff_id,
            event_type = %event.event_type,
            "event queued"
        );
        Ok(QueuedEvent {
            local_id,
            enqueued_at,
            event,
        })
    }

    /// Lists every queued entry in enqueue order.
    pub fn list_ordered(&self) -> Result<Vec<QueuedEvent>, DbError> {
        self.query(
            "
            SELECT local_id, staff_id, device_id, admin_id, event_type, occurred_at, reason, enqueued_at
            FROM queued_events
            ORDER BY enqueued_at ASC, seq ASC
            ",
            &[],
        )
    }

    /// Lists one staff member's queued entries in enqueue order.
    pub fn list_for_staff(&self, staff_id: &StaffId) -> Result<Vec<QueuedEvent>, DbError> {
        self.query(
            "
            SELECT local_id, staff_id, device_id, admin_id, event_type, occurred_at, reason, enqueued_at
            FROM queued_events
            WHERE staff_id = ?
            ORDER BY enqueued_at ASC, seq ASC
            ",
            &[&staff_id.as_str()],
        )
    }

    /// Removes an entry after the store confirmed it.
    ///
    /// Returns whether an entry was removed; acknowledging twice is harmless.
    pub fn acknowledge(&mut self, local_id: &LocalId) -> Result<bool, DbError> {
        let removed = self.conn.execute(
            "DELETE FROM queued_events WHERE local_id = ?",
            params![local_id.as_str()],
        )?;
        Ok(removed > 0)
    }

    /// Current backlog size.
    pub fn count(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM queued_events", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    /// Looks up a single entry.
    pub fn get(&self, local_id: &LocalId) -> Result<Option<QueuedEvent>, DbError> {
        let row = self
            .conn
            .query_row(
                "
                SELECT local_id, staff_id, device_id, admin_id, event_type, occurred_at, reason, enqueued_at
                FROM queued_events
                WHERE local_id = ?
                ",
                params![local_id.as_str()],
                read_row,
            )
            .optional()?;
        row.map(QueuedRow::into_queued).transpose()
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<QueuedEvent>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, read_row)?;
        let mut entries = Vec::new();
        for row in rows {
            entries.push(row?.into_queued()?);
        }
        Ok(entries)
    }
}

struct QueuedRow {
    event: EventRow,
    enqueued_at: String,
}

impl QueuedRow {
    fn into_queued(self) -> Result<QueuedEvent, DbError> {
        let local_id = LocalId::new(self.event.row_id.as_str())?;
        let enqueued_at = parse_timestamp(&self.enqueued_at, local_id.as_str())?;
        Ok(QueuedEvent {
            local_id,
            enqueued_at,
            event: self.event.into_event()?,
        })
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<QueuedRow> {
    Ok(QueuedRow {
        event: EventRow {
            row_id: row.get(0)?,
            staff_id: row.get(1)?,
            device_id: row.get(2)?,
            admin_id: row.get(3)?,
            event_type: row.get(4)?,
            occurred_at: row.get(5)?,
            reason: row.get(6)?,
        },
        enqueued_at: row.get(7)?,
    })
}
