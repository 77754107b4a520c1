//! Status command: connectivity, backlog, and last sync.

use std::io::Write;

use anyhow::Result;
use chrono::SecondsFormat;

use tc_sync::SyncStatus;

use crate::Config;
use crate::backend;
use crate::commands::{sync, util};

pub fn run<W: Write>(writer: &mut W, json: bool, config: &Config) -> Result<()> {
    let (mut status, store) = util::runtime()?.block_on(async {
        let engine = backend::connect(config).await?;
        let status = engine.status().await?;
        anyhow::Ok((status, engine.store().describe(config)))
    })?;
    status.last_sync = status.last_sync.max(sync::recorded_last_sync(config)?);

    if json {
        writeln!(writer, "{}", serde_json::to_string_pretty(&status)?)?;
    } else {
        write!(writer, "{}", format_status(&status, &store))?;
    }
    Ok(())
}

pub fn format_status(status: &SyncStatus, store: &str) -> String {
    let connection = if status.is_online { "online" } else { "offline" };
    let last_sync = status.last_sync.map_or_else(
        || "never".to_string(),
        |at| at.to_rfc3339_opts(SecondsFormat::Secs, true),
    );
    let syncing = if status.is_syncing { "yes" } else { "no" };
    format!(
        "Time clock status\n\
         Store:      {store}\n\
         Connection: {connection}\n\
         Queue:      {} pending\n\
         Last sync:  {last_sync}\n\
         Syncing:    {syncing}\n",
        status.queue_length
    )
}
