//! Watch command: keeps the sync loop and connectivity probe running in the
//! foreground until Ctrl-C.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::watch;

use crate::Config;
use crate::backend;
use crate::commands::{sync, util};

pub fn run<W: Write>(writer: &mut W, config: &Config) -> Result<()> {
    let (last_sync, queue_length) = util::runtime()?.block_on(async {
        let engine = backend::connect(config).await?;
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let monitor = backend::probe_monitor(engine.store(), engine.connectivity(), config);
        let probing = tokio::spawn(monitor.run(shutdown_rx.clone()));
        let syncing = tokio::spawn({
            let engine = Arc::clone(&engine);
            async move { engine.run(shutdown_rx).await }
        });

        let settings = engine.settings();
        tracing::info!(
            interval_secs = settings.interval.as_secs(),
            probe_interval_secs = settings.probe_interval.as_secs(),
            "watching offline queue"
        );

        tokio::signal::ctrl_c()
            .await
            .context("failed to listen for Ctrl-C")?;
        tracing::info!("shutting down");

        // Receivers may already be gone if a task ended early.
        let _ = shutdown_tx.send(true);
        probing.await.context("probe task failed")?;
        syncing.await.context("sync task failed")?;

        let status = engine.status().await?;
        anyhow::Ok((status.last_sync, status.queue_length))
    })?;
    sync::remember_last_sync(config, last_sync)?;

    writeln!(writer, "Stopped; {queue_length} event(s) still queued.")?;
    Ok(())
}
