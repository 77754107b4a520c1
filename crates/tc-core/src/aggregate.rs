//! Hour totals over daily and weekly windows.
//!
//! Sessions are clipped to the window they are summed into and accumulated in
//! whole milliseconds, so adjacent windows partition a longer one exactly: the
//! seven daily work and break totals of a week add up to the weekly ones.
//! Net time is clamped at zero per window, so a day with more break than work
//! contributes zero to the sum of daily nets while its break still reduces the
//! weekly net. Rounding to two decimals happens only in
//! [`HoursSummary::display`].

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use serde::Serialize;

use crate::event::Event;
use crate::format::round_hours;
use crate::reconcile::{Anomaly, Reconciliation, SessionKind, reconcile};
use crate::types::StaffId;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// A half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Window {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl Window {
    pub const fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    /// Local calendar day, midnight to midnight in `tz`.
    pub fn day<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> Self {
        Self {
            start: local_midnight_to_utc(date, tz),
            end: local_midnight_to_utc(date + Duration::days(1), tz),
        }
    }

    /// Seven consecutive local days starting at `start_date`.
    pub fn week<Tz: TimeZone>(start_date: NaiveDate, tz: &Tz) -> Self {
        Self {
            start: local_midnight_to_utc(start_date, tz),
            end: local_midnight_to_utc(start_date + Duration::days(7), tz),
        }
    }

    pub fn contains(&self, at: DateTime<Utc>) -> bool {
        at >= self.start && at < self.end
    }
}

/// Converts a local date at midnight to UTC.
/// Handles DST ambiguity by picking the earlier time.
fn local_midnight_to_utc<Tz: TimeZone>(date: NaiveDate, tz: &Tz) -> DateTime<Utc> {
    let midnight = date.and_time(NaiveTime::MIN);
    match tz.from_local_datetime(&midnight) {
        // Single or ambiguous (DST fall-back): use the earlier time
        LocalResult::Single(dt) | LocalResult::Ambiguous(dt, _) => dt.with_timezone(&Utc),
        // Spring-forward gap at midnight: the day starts at 1am local
        LocalResult::None => tz
            .from_local_datetime(&(midnight + Duration::hours(1)))
            .earliest()
            .map_or_else(|| midnight.and_utc(), |dt| dt.with_timezone(&Utc)),
    }
}

/// Totals for one staff member over one window.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HoursSummary {
    pub staff_id: StaffId,
    pub window: Window,
    pub work_ms: i64,
    pub break_ms: i64,
    /// Anomalies whose event falls inside the window.
    pub anomalies: Vec<Anomaly>,
}

impl HoursSummary {
    #[allow(clippy::cast_precision_loss)]
    pub fn work_hours(&self) -> f64 {
        self.work_ms as f64 / MS_PER_HOUR
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn break_hours(&self) -> f64 {
        self.break_ms as f64 / MS_PER_HOUR
    }

    /// Work minus breaks, never negative.
    ///
    /// The clamp applies to this window only; summing the nets of sub-windows
    /// can exceed the net of the whole.
    pub fn net_ms(&self) -> i64 {
        (self.work_ms - self.break_ms).max(0)
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn net_hours(&self) -> f64 {
        self.net_ms() as f64 / MS_PER_HOUR
    }

    pub fn is_empty(&self) -> bool {
        self.work_ms == 0 && self.break_ms == 0 && self.anomalies.is_empty()
    }

    /// Rounded values for presentation.
    pub fn display(&self) -> HoursDisplay {
        HoursDisplay {
            staff_id: self.staff_id.clone(),
            from: self.window.start,
            to: self.window.end,
            work_hours: round_hours(self.work_hours()),
            break_hours: round_hours(self.break_hours()),
            net_hours: round_hours(self.net_hours()),
            anomalies: self.anomalies.iter().map(ToString::to_string).collect(),
        }
    }

    fn from_reconciliation(
        staff_id: &StaffId,
        reconciliation: &Reconciliation,
        window: Window,
    ) -> Self {
        let clipped = |kind: SessionKind| -> i64 {
            reconciliation
                .outcome(kind)
                .sessions
                .iter()
                .map(|s| s.overlap_ms(window.start, window.end))
                .sum()
        };
        Self {
            staff_id: staff_id.clone(),
            window,
            work_ms: clipped(SessionKind::Work),
            break_ms: clipped(SessionKind::Break),
            anomalies: reconciliation
                .anomalies()
                .filter(|a| window.contains(a.event.occurred_at))
                .cloned()
                .collect(),
        }
    }
}

/// Presentation form of [`HoursSummary`], rounded to two decimals.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HoursDisplay {
    pub staff_id: StaffId,
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
    pub work_hours: f64,
    pub break_hours: f64,
    pub net_hours: f64,
    pub anomalies: Vec<String>,
}

/// Daily breakdown of a seven-day window plus the window total.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklySummary {
    pub days: Vec<HoursSummary>,
    pub total: HoursSummary,
}

/// Sums one staff member's sessions inside `window`.
///
/// Events belonging to other staff members are ignored. Sessions are paired
/// over the whole input before clipping, so pass events from a little before
/// and after the window to keep shifts that cross its edges.
pub fn summarize(staff_id: &StaffId, events: &[Event], window: Window) -> HoursSummary {
    let reconciliation = reconcile_staff(staff_id, events);
    HoursSummary::from_reconciliation(staff_id, &reconciliation, window)
}

/// Totals for the local calendar day `date`.
pub fn daily_summary<Tz: TimeZone>(
    staff_id: &StaffId,
    events: &[Event],
    date: NaiveDate,
    tz: &Tz,
) -> HoursSummary {
    summarize(staff_id, events, Window::day(date, tz))
}

/// Totals for the seven local days starting at `start_date`.
pub fn weekly_summary<Tz: TimeZone>(
    staff_id: &StaffId,
    events: &[Event],
    start_date: NaiveDate,
    tz: &Tz,
) -> WeeklySummary {
    let reconciliation = reconcile_staff(staff_id, events);
    let days = (0..7)
        .map(|offset| {
            let window = Window::day(start_date + Duration::days(offset), tz);
            HoursSummary::from_reconciliation(staff_id, &reconciliation, window)
        })
        .collect();
    let total = HoursSummary::from_reconciliation(
        staff_id,
        &reconciliation,
        Window::week(start_date, tz),
    );
    WeeklySummary { days, total }
}

/// Totals for every staff member appearing in `events`, ordered by staff ID.
///
/// Staff with no work, no breaks, and no anomalies in the window are omitted.
pub fn summarize_all(events: &[Event], window: Window) -> Vec<HoursSummary> {
    let mut by_staff: BTreeMap<&StaffId, Vec<Event>> = BTreeMap::new();
    for event in events {
        by_staff
            .entry(&event.staff_id)
            .or_default()
            .push(event.clone());
    }
    by_staff
        .into_iter()
        .map(|(staff_id, staff_events)| {
            let reconciliation = reconcile(&staff_events);
            HoursSummary::from_reconciliation(staff_id, &reconciliation, window)
        })
        .filter(|summary| !summary.is_empty())
        .collect()
}

fn reconcile_staff(staff_id: &StaffId, events: &[Event]) -> Reconciliation {
    let own: Vec<Event> = events
        .iter()
        .filter(|e| &e.staff_id == staff_id)
        .cloned()
        .collect();
    reconcile(&own)
}
