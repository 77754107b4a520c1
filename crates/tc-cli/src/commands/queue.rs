//! Queue command: lists events waiting to be delivered, oldest first.

use std::io::Write;

use anyhow::{Context, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::Serialize;

use tc_core::{AdminId, EventType, StaffId};
use tc_db::{OfflineQueue, QueuedEvent};

use crate::Config;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct QueueEntry<'a> {
    local_id: &'a str,
    enqueued_at: DateTime<Utc>,
    staff_id: &'a str,
    device_id: &'a str,
    event_type: EventType,
    occurred_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    admin_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    reason: Option<&'a str>,
}

impl<'a> From<&'a QueuedEvent> for QueueEntry<'a> {
    fn from(entry: &'a QueuedEvent) -> Self {
        let event = &entry.event;
        Self {
            local_id: entry.local_id.as_str(),
            enqueued_at: entry.enqueued_at,
            staff_id: event.staff_id.as_str(),
            device_id: event.device_id.as_str(),
            event_type: event.event_type,
            occurred_at: event.occurred_at,
            admin_id: event.admin_id.as_ref().map(AdminId::as_str),
            reason: event.reason.as_deref(),
        }
    }
}

pub fn run<W: Write>(
    writer: &mut W,
    staff: Option<&str>,
    json: bool,
    config: &Config,
) -> Result<()> {
    let entries = if config.queue_path.exists() {
        let queue = OfflineQueue::open(&config.queue_path)
            .with_context(|| format!("failed to open {}", config.queue_path.display()))?;
        match staff {
            Some(id) => {
                let staff_id = StaffId::new(id).context("--staff must not be blank")?;
                queue.list_for_staff(&staff_id)?
            }
            None => queue.list_ordered()?,
        }
    } else {
        Vec::new()
    };

    if json {
        let rows: Vec<QueueEntry<'_>> = entries.iter().map(QueueEntry::from).collect();
        writeln!(writer, "{}", serde_json::to_string_pretty(&rows)?)?;
    } else {
        write!(writer, "{}", format_queue(&entries))?;
    }
    Ok(())
}

pub fn format_queue(entries: &[QueuedEvent]) -> String {
    if entries.is_empty() {
        return "Queue is empty.\n".to_string();
    }
    let mut output = format!("{} event(s) waiting to sync:\n", entries.len());
    for entry in entries {
        let event = &entry.event;
        output.push_str(&format!(
            "  {}  {:<8} {}  {}\n",
            event.occurred_at.to_rfc3339_opts(SecondsFormat::Secs, true),
            event.staff_id.as_str(),
            event.description(),
            entry.local_id
        ));
    }
    output
}
