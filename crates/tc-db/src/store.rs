//! Append-only event store.
//!
//! The `events` table carries a uniqueness constraint on the natural key, so
//! re-submitting an already stored event returns the existing row instead of
//! adding a duplicate. `server_id` increases with insertion order and breaks
//! `occurred_at` ties when listing.

use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{Connection, OptionalExtension, params};

use tc_core::{Event, StaffId, StoredEvent};

use crate::{DbError, EventRow, format_timestamp};

const EVENT_COLUMNS: &str =
    "server_id, staff_id, device_id, admin_id, event_type, occurred_at, reason";

/// Database connection wrapper for the event store.
///
/// See the [crate documentation](crate) for thread safety considerations.
pub struct Database {
    conn: Connection,
}

/// Result of appending an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppendOutcome {
    pub server_id: i64,
    /// False when the natural key was already present.
    pub inserted: bool,
}

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch(
            "
            -- Events are never updated or deleted.
            -- occurred_at: RFC 3339 UTC, millisecond precision
            CREATE TABLE IF NOT EXISTS events (
                server_id INTEGER PRIMARY KEY AUTOINCREMENT,
                staff_id TEXT NOT NULL,
                device_id TEXT NOT NULL,
                admin_id TEXT,
                event_type TEXT NOT NULL,
                occurred_at TEXT NOT NULL,
                reason TEXT,
                recorded_at TEXT NOT NULL,
                UNIQUE (staff_id, device_id, event_type, occurred_at)
            );

            CREATE INDEX IF NOT EXISTS idx_events_staff_occurred ON events(staff_id, occurred_at);
            CREATE INDEX IF NOT EXISTS idx_events_occurred ON events(occurred_at);
            ",
        )?;
        Ok(())
    }

    /// Appends an event, returning the existing row when its natural key is already stored.
    pub fn append(&mut self, event: &Event) -> Result<AppendOutcome, DbError> {
        let occurred_at = format_timestamp(event.occurred_at);
        let tx = self.conn.transaction()?;
        let inserted = tx.execute(
            "
            INSERT INTO events
            (staff_id, device_id, admin_id, event_type, occurred_at, reason, recorded_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT (staff_id, device_id, event_type, occurred_at) DO NOTHING
            ",
            params![
                event.staff_id.as_str(),
                event.device_id.as_str(),
                event.admin_id.as_ref().map(tc_core::AdminId::as_str),
                event.event_type.as_str(),
                occurred_at,
                event.reason,
                format_timestamp(Utc::now()),
            ],
        )? > 0;
        let server_id: i64 = tx.query_row(
            "
            SELECT server_id FROM events
            WHERE staff_id = ? AND device_id = ? AND event_type = ? AND occurred_at = ?
            ",
            params![
                event.staff_id.as_str(),
                event.device_id.as_str(),
                event.event_type.as_str(),
                occurred_at,
            ],
            |row| row.get(0),
        )?;
        tx.commit()?;

        if inserted {
            tracing::debug!(server_id, staff_id = %event.staff_id, "event stored");
        } else {
            tracing::debug!(server_id, staff_id = %event.staff_id, "duplicate submission ignored");
        }
        Ok(AppendOutcome {
            server_id,
            inserted,
        })
    }

    /// Lists one staff member's events within a time range.
    ///
    /// The range is inclusive of `from` and exclusive of `to`. Rows are ordered
    /// by `occurred_at`, then by insertion order.
    pub fn list_events(
        &self,
        staff_id: &StaffId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DbError> {
        if to <= from {
            return Ok(Vec::new());
        }
        self.query(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE staff_id = ? AND occurred_at >= ? AND occurred_at < ?
                 ORDER BY occurred_at ASC, server_id ASC"
            ),
            &[
                &staff_id.as_str(),
                &format_timestamp(from),
                &format_timestamp(to),
            ],
        )
    }

    /// Lists every staff member's events within a time range, same ordering as
    /// [`Database::list_events`].
    pub fn list_all_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DbError> {
        if to <= from {
            return Ok(Vec::new());
        }
        self.query(
            &format!(
                "SELECT {EVENT_COLUMNS} FROM events
                 WHERE occurred_at >= ? AND occurred_at < ?
                 ORDER BY occurred_at ASC, server_id ASC"
            ),
            &[&format_timestamp(from), &format_timestamp(to)],
        )
    }

    /// Most recent event for a staff member; the later insert wins a tie.
    pub fn latest_event(&self, staff_id: &StaffId) -> Result<Option<StoredEvent>, DbError> {
        let row = self
            .conn
            .query_row(
                &format!(
                    "SELECT {EVENT_COLUMNS} FROM events
                     WHERE staff_id = ?
                     ORDER BY occurred_at DESC, server_id DESC
                     LIMIT 1"
                ),
                params![staff_id.as_str()],
                read_row,
            )
            .optional()?;
        row.map(StoredRow::into_stored).transpose()
    }

    /// Distinct staff IDs with at least one event, ordered.
    pub fn staff_ids(&self) -> Result<Vec<StaffId>, DbError> {
        let mut stmt = self
            .conn
            .prepare("SELECT DISTINCT staff_id FROM events ORDER BY staff_id ASC")?;
        let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;
        let mut ids = Vec::new();
        for row in rows {
            ids.push(StaffId::new(row?)?);
        }
        Ok(ids)
    }

    /// Total number of stored events.
    pub fn count_events(&self) -> Result<usize, DbError> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM events", [], |row| row.get(0))?;
        Ok(usize::try_from(count).unwrap_or_default())
    }

    fn query(
        &self,
        sql: &str,
        params: &[&dyn rusqlite::ToSql],
    ) -> Result<Vec<StoredEvent>, DbError> {
        let mut stmt = self.conn.prepare(sql)?;
        let rows = stmt.query_map(params, read_row)?;
        let mut events = Vec::new();
        for row in rows {
            events.push(row?.into_stored()?);
        }
        Ok(events)
    }
}

struct StoredRow {
    server_id: i64,
    event: EventRow,
}

impl StoredRow {
    fn into_stored(self) -> Result<StoredEvent, DbError> {
        Ok(StoredEvent {
            server_id: self.server_id,
            event: self.event.into_event()?,
        })
    }
}

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<StoredRow> {
    let server_id: i64 = row.get(0)?;
    Ok(StoredRow {
        server_id,
        event: EventRow {
            row_id: server_id.to_string(),
            staff_id: row.get(1)?,
            device_id: row.get(2)?,
            admin_id: row.get(3)?,
            event_type: row.get(4)?,
            occurred_at: row.get(5)?,
            reason: row.get(6)?,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use tc_core::{EventDraft, EventType};

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    fn event(staff: &str, device: &str, event_type: EventType, time: DateTime<Utc>) -> Event {
        EventDraft::new(staff, device, event_type, time)
            .validate()
            .unwrap()
    }

    fn staff(id: &str) -> StaffId {
        StaffId::new(id).unwrap()
    }

    #[test]
    fn open_in_memory_database() {
        let db = Database::open_in_memory();
        assert!(db.is_ok());
    }

    #[test]
    fn schema_has_natural_key_constraint() {
        let db = Database::open_in_memory().unwrap();
        let mut stmt = db.conn.prepare("PRAGMA index_list(events)").unwrap();
        let indexes: HashSet<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))
            .unwrap()
            .map(|r| r.unwrap())
            .collect();
        assert!(indexes.contains("idx_events_staff_occurred"));
        assert!(indexes.iter().any(|name| name.starts_with("sqlite_autoindex_events")));
    }

    #[test]
    fn append_is_idempotent_on_natural_key() {
        let mut db = Database::open_in_memory().unwrap();
        let e = event("s-1", "kiosk", EventType::ClockIn, at(9, 0));

        let first = db.append(&e).unwrap();
        let second = db.append(&e).unwrap();

        assert!(first.inserted);
        assert!(!second.inserted);
        assert_eq!(first.server_id, second.server_id);
        assert_eq!(db.count_events().unwrap(), 1);
    }

    #[test]
    fn same_instant_from_other_device_is_a_new_event() {
        let mut db = Database::open_in_memory().unwrap();
        db.append(&event("s-1", "kiosk", EventType::ClockIn, at(9, 0)))
            .unwrap();
        let other = db
            .append(&event("s-1", "phone", EventType::ClockIn, at(9, 0)))
            .unwrap();
        assert!(other.inserted);
        assert_eq!(db.count_events().unwrap(), 2);
    }

    #[test]
    fn list_events_orders_by_time_then_insertion() {
        let mut db = Database::open_in_memory().unwrap();
        db.append(&event("s-1", "kiosk", EventType::ClockOut, at(17, 0)))
            .unwrap();
        db.append(&event("s-1", "kiosk", EventType::BreakEnd, at(12, 0)))
            .unwrap();
        db.append(&event("s-1", "kiosk", EventType::BreakStart, at(12, 0)))
            .unwrap();
        db.append(&event("s-2", "kiosk", EventType::ClockIn, at(8, 0)))
            .unwrap();

        let events = db.list_events(&staff("s-1"), at(0, 0), at(23, 0)).unwrap();
        let types: Vec<EventType> = events.iter().map(|e| e.event.event_type).collect();
        assert_eq!(
            types,
            vec![EventType::BreakEnd, EventType::BreakStart, EventType::ClockOut]
        );
    }

    #[test]
    fn list_events_range_is_half_open() {
        let mut db = Database::open_in_memory().unwrap();
        db.append(&event("s-1", "kiosk", EventType::ClockIn, at(9, 0)))
            .unwrap();
        db.append(&event("s-1", "kiosk", EventType::ClockOut, at(17, 0)))
            .unwrap();

        let events = db.list_events(&staff("s-1"), at(9, 0), at(17, 0)).unwrap();
        assert_eq!(events.len(), 1);
        assert!(db.list_events(&staff("s-1"), at(17, 0), at(9, 0)).unwrap().is_empty());
    }

    #[test]
    fn latest_event_prefers_later_insert_on_tie() {
        let mut db = Database::open_in_memory().unwrap();
        assert!(db.latest_event(&staff("s-1")).unwrap().is_none());

        db.append(&event("s-1", "kiosk", EventType::ClockIn, at(9, 0)))
            .unwrap();
        db.append(&event("s-1", "phone", EventType::ClockOut, at(9, 0)))
            .unwrap();
        let latest = db.latest_event(&staff("s-1")).unwrap().unwrap();
        assert_eq!(latest.event.event_type, EventType::ClockOut);
    }

    #[test]
    fn override_provenance_is_stored() {
        let mut db = Database::open_in_memory().unwrap();
        let e = EventDraft::new("s-1", "office", EventType::ClockOut, at(17, 0))
            .with_admin("admin-1")
            .with_reason("missed punch")
            .validate()
            .unwrap();
        db.append(&e).unwrap();

        let stored = db.latest_event(&staff("s-1")).unwrap().unwrap();
        assert_eq!(stored.event, e);
        assert!(stored.event.is_manual_override());
    }

    #[test]
    fn list_all_and_staff_ids() {
        let mut db = Database::open_in_memory().unwrap();
        db.append(&event("s-2", "kiosk", EventType::ClockIn, at(9, 0)))
            .unwrap();
        db.append(&event("s-1", "kiosk", EventType::ClockIn, at(10, 0)))
            .unwrap();

        let all = db.list_all_events(at(0, 0), at(23, 0)).unwrap();
        assert_eq!(all.len(), 2);
        let ids: Vec<String> = db
            .staff_ids()
            .unwrap()
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(ids, vec!["s-1", "s-2"]);
    }
}
