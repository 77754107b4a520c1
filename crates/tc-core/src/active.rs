//! Active-session detection.
//!
//! A staff member is active at `T` when their most recent event at or before
//! `T` is a `CLOCK_IN`. Override punches count like any other punch.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};

use crate::event::Event;
use crate::event_type::EventType;
use crate::types::StaffId;

/// Most recent event at or before `at`.
///
/// Events with the same `occurred_at` resolve to the one later in `events`,
/// which callers keep in storage order.
pub fn latest_event_at(events: &[Event], at: DateTime<Utc>) -> Option<&Event> {
    events
        .iter()
        .filter(|e| e.occurred_at <= at)
        .fold(None, |latest: Option<&Event>, e| match latest {
            Some(current) if current.occurred_at > e.occurred_at => Some(current),
            _ => Some(e),
        })
}

/// Whether the staff member whose timeline this is was clocked in at `at`.
pub fn is_active_at(events: &[Event], at: DateTime<Utc>) -> bool {
    latest_event_at(events, at).is_some_and(|e| e.event_type == EventType::ClockIn)
}

/// Whether the latest event of the full timeline is a `CLOCK_IN`.
pub fn is_active(events: &[Event]) -> bool {
    latest_event_at(events, DateTime::<Utc>::MAX_UTC)
        .is_some_and(|e| e.event_type == EventType::ClockIn)
}

/// Staff members clocked in at `at`, ordered by ID.
///
/// With a `lookback`, only events within that span before `at` are considered,
/// so a shift left open long ago does not keep someone on the roster.
pub fn active_staff(events: &[Event], at: DateTime<Utc>, lookback: Option<Duration>) -> Vec<StaffId> {
    let since = lookback.map(|span| at - span);
    let mut latest: BTreeMap<&StaffId, &Event> = BTreeMap::new();
    for event in events {
        if event.occurred_at > at || since.is_some_and(|s| event.occurred_at < s) {
            continue;
        }
        latest
            .entry(&event.staff_id)
            .and_modify(|current| {
                if event.occurred_at >= current.occurred_at {
                    *current = event;
                }
            })
            .or_insert(event);
    }
    latest
        .into_iter()
        .filter(|(_, e)| e.event_type == EventType::ClockIn)
        .map(|(staff_id, _)| staff_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventDraft;
    use chrono::TimeZone;

    fn at(h: u32, m: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 3, 10, h, m, 0).unwrap()
    }

    fn ev_for(staff: &str, event_type: EventType, time: DateTime<Utc>) -> Event {
        EventDraft::new(staff, "kiosk", event_type, time)
            .validate()
            .unwrap()
    }

    fn ev(event_type: EventType, time: DateTime<Utc>) -> Event {
        ev_for("s-1", event_type, time)
    }

    #[test]
    fn empty_timeline_is_not_active() {
        assert!(!is_active(&[]));
        assert!(!is_active_at(&[], at(12, 0)));
    }

    #[test]
    fn open_clock_in_is_active() {
        assert!(is_active(&[ev(EventType::ClockIn, at(9, 0))]));
    }

    #[test]
    fn clock_out_after_in_is_inactive() {
        let events = [
            ev(EventType::ClockIn, at(9, 0)),
            ev(EventType::ClockOut, at(17, 0)),
        ];
        assert!(!is_active(&events));
        assert!(is_active_at(&events, at(12, 0)));
        assert!(!is_active_at(&events, at(17, 0)));
        assert!(!is_active_at(&events, at(8, 0)));
    }

    #[test]
    fn break_start_as_latest_is_inactive() {
        let events = [
            ev(EventType::ClockIn, at(9, 0)),
            ev(EventType::BreakStart, at(12, 0)),
        ];
        assert!(!is_active(&events));
    }

    #[test]
    fn unordered_input_uses_latest_occurrence() {
        let events = [
            ev(EventType::ClockOut, at(17, 0)),
            ev(EventType::ClockIn, at(9, 0)),
        ];
        assert!(!is_active(&events));
    }

    #[test]
    fn same_instant_resolves_to_storage_order() {
        let events = [
            ev(EventType::ClockOut, at(9, 0)),
            ev(EventType::ClockIn, at(9, 0)),
        ];
        assert!(is_active(&events));
    }

    #[test]
    fn override_clock_out_ends_session() {
        let events = [
            ev(EventType::ClockIn, at(9, 0)),
            EventDraft::new("s-1", "office", EventType::ClockOut, at(17, 0))
                .with_admin("admin-1")
                .with_reason("missed punch")
                .validate()
                .unwrap(),
        ];
        assert!(!is_active(&events));
    }

    #[test]
    fn roster_lists_clocked_in_staff() {
        let events = [
            ev_for("s-1", EventType::ClockIn, at(9, 0)),
            ev_for("s-2", EventType::ClockIn, at(9, 0)),
            ev_for("s-2", EventType::ClockOut, at(11, 0)),
            ev_for("s-3", EventType::ClockIn, at(10, 0)),
        ];
        let roster = active_staff(&events, at(12, 0), None);
        let ids: Vec<&str> = roster.iter().map(StaffId::as_str).collect();
        assert_eq!(ids, vec!["s-1", "s-3"]);
    }

    #[test]
    fn roster_lookback_drops_stale_shifts() {
        let events = [
            ev_for("s-1", EventType::ClockIn, at(1, 0)),
            ev_for("s-2", EventType::ClockIn, at(10, 0)),
        ];
        let roster = active_staff(&events, at(12, 0), Some(Duration::hours(8)));
        let ids: Vec<&str> = roster.iter().map(StaffId::as_str).collect();
        assert_eq!(ids, vec!["s-2"]);
    }
}
