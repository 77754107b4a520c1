//! Active command: who is clocked in right now.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, SecondsFormat, Utc};
use serde::Serialize;

use tc_core::{Event, StaffId, active_staff, latest_event_at, sort_chronologically};
use tc_sync::EventStore;

use crate::Config;
use crate::backend;
use crate::commands::util;

/// A staff member on the clock and since when.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActiveEntry {
    pub staff_id: StaffId,
    pub since: DateTime<Utc>,
}

/// Staff clocked in at `at`, each with the punch that put them there.
pub fn find_active(events: &[Event], at: DateTime<Utc>, lookback: Option<Duration>) -> Vec<ActiveEntry> {
    active_staff(events, at, lookback)
        .into_iter()
        .filter_map(|staff_id| {
            let own: Vec<Event> = events
                .iter()
                .filter(|e| e.staff_id == staff_id)
                .cloned()
                .collect();
            let since = latest_event_at(&own, at)?.occurred_at;
            Some(ActiveEntry { staff_id, since })
        })
        .collect()
}

pub fn format_active(entries: &[ActiveEntry]) -> String {
    if entries.is_empty() {
        return "Nobody is clocked in.\n".to_string();
    }
    let mut output = format!("{} clocked in:\n", entries.len());
    for entry in entries {
        output.push_str(&format!(
            "  {:<12} since {}\n",
            entry.staff_id.as_str(),
            entry.since.to_rfc3339_opts(SecondsFormat::Secs, true)
        ));
    }
    output
}

pub fn run<W: Write>(
    writer: &mut W,
    lookback_hours: Option<u32>,
    json: bool,
    config: &Config,
) -> Result<()> {
    let now = Utc::now();
    let lookback = lookback_hours.map(|hours| Duration::hours(i64::from(hours)));
    let from = lookback.map_or(DateTime::UNIX_EPOCH, |span| now - span);
    // The store range is half-open; include punches stamped at `now`.
    let to = now + Duration::milliseconds(1);

    let mut stored = util::runtime()?.block_on(async {
        let store = backend::open_store(config)?;
        store
            .list_all_events(from, to)
            .await
            .context("failed to fetch events")
    })?;
    sort_chronologically(&mut stored);
    let events: Vec<Event> = stored.into_iter().map(|s| s.event).collect();

    let entries = find_active(&events, now, lookback);
    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&entries)?)?;
    } else {
        write!(writer, "{}", format_active(&entries))?;
    }
    Ok(())
}
