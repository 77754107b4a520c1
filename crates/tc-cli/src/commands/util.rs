//! Shared utilities for CLI commands.

use std::sync::LazyLock;

use anyhow::Context;
use chrono::{DateTime, Duration, Local, NaiveTime, TimeZone, Utc};
use regex::Regex;

use crate::Config;

/// `<amount> <unit> ago`, e.g. "15 minutes ago" or "2h ago".
static AGO_RE: LazyLock<Result<Regex, regex::Error>> =
    LazyLock::new(|| Regex::new(r"^(?<amount>\d{1,9})\s*(?<unit>[a-z]+)\s+ago$"));

const TIME_FORMS: &str =
    "use RFC 3339 (2025-03-10T09:00:00Z), a clock time (09:15), 'now', or '<n> minutes ago'";

/// Parses a `--at` value against the current time in the local zone.
pub fn parse_datetime(s: &str) -> anyhow::Result<DateTime<Utc>> {
    parse_at(s, Utc::now(), &Local)
}

/// Parses a punch time, resolving the relative forms against `now` in `tz`.
///
/// Accepted forms: RFC 3339, `now`, `HH:MM[:SS]` on the current local date,
/// and `<n> <unit> ago` with units from minutes up to weeks.
pub fn parse_at<Tz: TimeZone>(
    s: &str,
    now: DateTime<Utc>,
    tz: &Tz,
) -> anyhow::Result<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    let lower = s.to_ascii_lowercase();
    if lower == "now" {
        return Ok(now);
    }
    if let Some(time) = ["%H:%M:%S", "%H:%M"]
        .iter()
        .find_map(|format| NaiveTime::parse_from_str(s, format).ok())
    {
        return clock_time_on_local_date(time, now, tz);
    }

    let re = AGO_RE
        .as_ref()
        .map_err(|err| anyhow::anyhow!("invalid relative time pattern: {err}"))?;
    let caps = re
        .captures(&lower)
        .with_context(|| format!("invalid time '{s}': {TIME_FORMS}"))?;
    let unit = &caps["unit"];
    let minutes_per_unit =
        unit_minutes(unit).with_context(|| format!("unknown time unit '{unit}' in '{s}'"))?;
    let amount: i64 = caps["amount"].parse()?;

    amount
        .checked_mul(minutes_per_unit)
        .and_then(Duration::try_minutes)
        .and_then(|ago| now.checked_sub_signed(ago))
        .with_context(|| format!("'{s}' is too far in the past"))
}

fn unit_minutes(unit: &str) -> Option<i64> {
    match unit {
        "m" | "min" | "mins" | "minute" | "minutes" => Some(1),
        "h" | "hr" | "hrs" | "hour" | "hours" => Some(60),
        "d" | "day" | "days" => Some(24 * 60),
        "w" | "week" | "weeks" => Some(7 * 24 * 60),
        _ => None,
    }
}

/// `time` on the local date of `now`. A time repeated by a DST fold resolves
/// to its first occurrence.
fn clock_time_on_local_date<Tz: TimeZone>(
    time: NaiveTime,
    now: DateTime<Utc>,
    tz: &Tz,
) -> anyhow::Result<DateTime<Utc>> {
    let local = now.with_timezone(tz).date_naive().and_time(time);
    tz.from_local_datetime(&local)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .with_context(|| format!("{time} is skipped by a DST change on {}", local.date()))
}

/// `--at` value, or now.
pub fn resolve_time(at: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    at.map_or_else(|| Ok(Utc::now()), parse_datetime)
}

/// `--staff` value, or `staff_id` from config.
pub fn resolve_staff(staff: Option<&str>, config: &Config) -> anyhow::Result<String> {
    staff
        .or(config.staff_id.as_deref())
        .map(str::trim)
        .filter(|id| !id.is_empty())
        .map(String::from)
        .context("no staff member given: pass --staff or set staff_id in the config")
}

pub fn runtime() -> anyhow::Result<tokio::runtime::Runtime> {
    tokio::runtime::Runtime::new().context("failed to initialize tokio runtime")
}
