//! Report command: worked hours per staff member for a day or a week.
//!
//! Hours come from the event store only. Events still waiting in the offline
//! queue show up once they are delivered.

use std::collections::BTreeSet;
use std::fmt::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, Duration, Local, NaiveDate, TimeZone, Utc};
use serde::Serialize;

use tc_core::{
    Event, HoursDisplay, HoursSummary, StaffId, Window, format_hours, sort_chronologically,
    summarize, weekly_summary,
};
use tc_sync::EventStore;

use crate::Config;
use crate::backend;
use crate::cli::ReportArgs;
use crate::commands::util;

/// Events this far outside the window are fetched so shifts crossing its
/// edges still pair up.
const FETCH_MARGIN_DAYS: i64 = 1;

/// Period type for JSON output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    Week,
    Day,
}

impl PeriodType {
    const fn word(self) -> &'static str {
        match self {
            Self::Week => "week",
            Self::Day => "day",
        }
    }
}

/// Totals for one staff member, with a per-day breakdown for weeks.
#[derive(Debug, Clone)]
pub struct StaffHours {
    pub total: HoursSummary,
    pub days: Vec<HoursSummary>,
}

/// Computed report data.
#[derive(Debug)]
pub struct ReportData {
    pub generated_at: DateTime<Utc>,
    pub start_date: NaiveDate,
    pub window: Window,
    pub period_type: PeriodType,
    pub timezone: String,
    pub staff: Vec<StaffHours>,
}

// ========== Period Calculation ==========

/// Monday of the week containing `date`.
pub fn week_start(date: NaiveDate) -> NaiveDate {
    date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
}

/// UTC window of the period starting on the local date `start_date`.
pub fn period_window<Tz: TimeZone>(period_type: PeriodType, start_date: NaiveDate, tz: &Tz) -> Window {
    match period_type {
        PeriodType::Day => Window::day(start_date, tz),
        PeriodType::Week => Window::week(start_date, tz),
    }
}

// ========== Report Generation ==========

/// Builds the report from events already fetched around the window.
///
/// With `staff` set, that staff member is reported even without hours.
/// Otherwise everyone appearing in `events` with hours or anomalies is listed.
pub fn build_report<Tz: TimeZone>(
    events: &[Event],
    staff: Option<&StaffId>,
    period_type: PeriodType,
    start_date: NaiveDate,
    tz: &Tz,
    timezone: &str,
    generated_at: DateTime<Utc>,
) -> ReportData {
    let window = period_window(period_type, start_date, tz);

    let staff_ids: Vec<StaffId> = match staff {
        Some(id) => vec![id.clone()],
        None => events
            .iter()
            .map(|e| e.staff_id.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect(),
    };

    let staff_hours = staff_ids
        .iter()
        .map(|staff_id| match period_type {
            PeriodType::Day => StaffHours {
                total: summarize(staff_id, events, window),
                days: Vec::new(),
            },
            PeriodType::Week => {
                let week = weekly_summary(staff_id, events, start_date, tz);
                StaffHours {
                    total: week.total,
                    days: week.days,
                }
            }
        })
        .filter(|hours| staff.is_some() || !hours.total.is_empty())
        .collect();

    ReportData {
        generated_at,
        start_date,
        window,
        period_type,
        timezone: timezone.to_string(),
        staff: staff_hours,
    }
}

/// Formats the period description for the report header.
fn format_period_description(data: &ReportData) -> String {
    match data.period_type {
        // "Week of Mar 10, 2025"
        PeriodType::Week => format!("Week of {}", data.start_date.format("%b %-d, %Y")),
        // "Monday, Mar 10, 2025"
        PeriodType::Day => data.start_date.format("%A, %b %-d, %Y").to_string(),
    }
}

/// Formats the human-readable report output.
pub fn format_report(data: &ReportData) -> Result<String> {
    let mut output = String::new();

    writeln!(
        output,
        "TIME REPORT: {} ({})",
        format_period_description(data),
        data.timezone
    )?;

    if data.staff.is_empty() {
        writeln!(output)?;
        writeln!(output, "No hours recorded this {}.", data.period_type.word())?;
        writeln!(output)?;
        writeln!(
            output,
            "Hint: Run 'tc status' to check for events still waiting to sync."
        )?;
        return Ok(output);
    }

    for hours in &data.staff {
        let total = &hours.total;
        writeln!(output)?;
        writeln!(output, "{}", total.staff_id)?;
        writeln!(output, "  Worked:  {}", format_hours(total.work_hours()))?;
        writeln!(output, "  Breaks:  {}", format_hours(total.break_hours()))?;
        writeln!(output, "  Net:     {}", format_hours(total.net_hours()))?;

        if !hours.days.is_empty() {
            writeln!(output, "  Days:")?;
            for (offset, day) in (0_i64..).zip(&hours.days) {
                let date = data.start_date + Duration::days(offset);
                writeln!(
                    output,
                    "    {}  {:>7}",
                    date.format("%a %b %-d"),
                    format_hours(day.net_hours())
                )?;
            }
        }

        if !total.anomalies.is_empty() {
            writeln!(output, "  Anomalies:")?;
            for anomaly in &total.anomalies {
                writeln!(output, "    {anomaly}")?;
            }
        }
    }

    Ok(output)
}

// ========== JSON Output ==========

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct JsonReport {
    pub generated_at: String,
    pub timezone: String,
    pub period: JsonPeriod,
    pub staff: Vec<JsonStaffHours>,
}

#[derive(Debug, Serialize)]
pub struct JsonPeriod {
    pub start: String,
    pub end: String,
    #[serde(rename = "type")]
    pub period_type: PeriodType,
}

#[derive(Debug, Serialize)]
pub struct JsonStaffHours {
    #[serde(flatten)]
    pub total: HoursDisplay,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub days: Vec<HoursDisplay>,
}

/// Formats report data as JSON.
pub fn format_report_json(data: &ReportData) -> Result<String> {
    let last_day = match data.period_type {
        PeriodType::Day => data.start_date,
        PeriodType::Week => data.start_date + Duration::days(6),
    };

    let report = JsonReport {
        generated_at: data.generated_at.to_rfc3339(),
        timezone: data.timezone.clone(),
        period: JsonPeriod {
            start: data.start_date.format("%Y-%m-%d").to_string(),
            end: last_day.format("%Y-%m-%d").to_string(),
            period_type: data.period_type,
        },
        staff: data
            .staff
            .iter()
            .map(|hours| JsonStaffHours {
                total: hours.total.display(),
                days: hours.days.iter().map(HoursSummary::display).collect(),
            })
            .collect(),
    };

    Ok(serde_json::to_string_pretty(&report)?)
}

// ========== Public Interface ==========

/// Runs the report command against the configured store.
pub fn run<W: std::io::Write>(writer: &mut W, args: &ReportArgs, config: &Config) -> Result<()> {
    let period_type = if args.week {
        PeriodType::Week
    } else {
        PeriodType::Day
    };
    let today = Local::now().date_naive();
    let start_date = match (period_type, args.date) {
        (PeriodType::Day, date) => date.unwrap_or(today),
        (PeriodType::Week, date) => date.unwrap_or_else(|| week_start(today)),
    };
    let staff = args
        .staff
        .as_deref()
        .map(StaffId::new)
        .transpose()
        .context("--staff must not be blank")?;

    let window = period_window(period_type, start_date, &Local);
    let from = window.start - Duration::days(FETCH_MARGIN_DAYS);
    let to = window.end + Duration::days(FETCH_MARGIN_DAYS);

    let mut stored = util::runtime()?.block_on(async {
        let store = backend::open_store(config)?;
        let events = match &staff {
            Some(staff_id) => store.list_events(staff_id, from, to).await,
            None => store.list_all_events(from, to).await,
        };
        events.context("failed to fetch events")
    })?;
    sort_chronologically(&mut stored);
    let events: Vec<Event> = stored.into_iter().map(|s| s.event).collect();
    tracing::debug!(count = events.len(), %from, %to, "fetched events for report");

    let timezone = iana_time_zone::get_timezone().unwrap_or_else(|_| "UTC".to_string());
    let data = build_report(
        &events,
        staff.as_ref(),
        period_type,
        start_date,
        &Local,
        &timezone,
        Utc::now(),
    );

    if args.json {
        writeln!(writer, "{}", format_report_json(&data)?)?;
    } else {
        write!(writer, "{}", format_report(&data)?)?;
    }
    Ok(())
}
