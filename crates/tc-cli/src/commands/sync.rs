//! Sync command: one delivery pass over the offline queue.
//!
//! Also keeps `sync.json` next to the queue so later runs can report when the
//! last successful pass happened.

use std::fs;
use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use tc_sync::{SyncOutcome, SyncStatus};

use crate::Config;
use crate::backend;
use crate::commands::util;

pub fn run<W: Write>(writer: &mut W, json: bool, config: &Config) -> Result<()> {
    let (outcome, status) = util::runtime()?.block_on(async {
        let engine = backend::connect(config).await?;
        let outcome = engine.sync_now().await;
        let status = engine.status().await?;
        anyhow::Ok((outcome, status))
    })?;
    remember_last_sync(config, status.last_sync)?;

    if json {
        let output = serde_json::json!({
            "success": outcome.success,
            "failed": outcome.failed,
            "queueLength": status.queue_length,
            "isOnline": status.is_online,
        });
        writeln!(writer, "{}", serde_json::to_string_pretty(&output)?)?;
    } else {
        write!(writer, "{}", format_outcome(outcome, &status))?;
    }
    Ok(())
}

/// Human-readable summary of one pass.
pub fn format_outcome(outcome: SyncOutcome, status: &SyncStatus) -> String {
    if !status.is_online {
        return format!(
            "Offline: {} event(s) still queued.\n",
            status.queue_length
        );
    }
    format!(
        "Delivered {}, failed {}; {} event(s) still queued.\n",
        outcome.success, outcome.failed, status.queue_length
    )
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct SyncState {
    last_sync: Option<DateTime<Utc>>,
}

impl SyncState {
    fn load(path: &Path) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(contents) => {
                let parsed = serde_json::from_str(&contents)
                    .with_context(|| format!("failed to parse {}", path.display()))?;
                Ok(parsed)
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(Self::default()),
            Err(err) => Err(err).with_context(|| format!("failed to read {}", path.display())),
        }
    }

    fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let json = serde_json::to_string_pretty(self).context("failed to encode sync state")?;
        fs::write(path, json).with_context(|| format!("failed to write {}", path.display()))?;
        Ok(())
    }

    fn record_sync(&mut self, synced_at: DateTime<Utc>) -> bool {
        if self.last_sync.is_some_and(|last| last >= synced_at) {
            return false;
        }
        self.last_sync = Some(synced_at);
        true
    }
}

/// Persists `last_sync` if it is newer than what was recorded before.
pub fn remember_last_sync(config: &Config, last_sync: Option<DateTime<Utc>>) -> Result<()> {
    let Some(synced_at) = last_sync else {
        return Ok(());
    };
    let path = config.sync_state_path();
    let mut state = SyncState::load(&path)?;
    if state.record_sync(synced_at) {
        state.save(&path)?;
    }
    Ok(())
}

/// Last successful sync recorded by any previous run.
pub fn recorded_last_sync(config: &Config) -> Result<Option<DateTime<Utc>>> {
    Ok(SyncState::load(&config.sync_state_path())?.last_sync)
}
