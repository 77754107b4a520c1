//! Wiring from configuration to a running sync engine.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};

use tc_core::{Event, StaffId, StoredEvent};
use tc_db::{Database, OfflineQueue};
use tc_sync::{
    Connectivity, DeliveryError, EventStore, HttpEventStore, ProbeMonitor, SqliteEventStore,
    SubmitReceipt, SyncEngine,
};

use crate::Config;

/// The store selected by configuration.
pub enum AnyStore {
    Local(SqliteEventStore),
    Remote(HttpEventStore),
}

impl AnyStore {
    /// Human-readable description for status output.
    pub fn describe(&self, config: &Config) -> String {
        match self {
            Self::Local(_) => format!("local ({})", config.store_path.display()),
            Self::Remote(store) => format!("server ({})", store.base_url()),
        }
    }
}

impl EventStore for AnyStore {
    async fn submit(&self, event: &Event) -> Result<SubmitReceipt, DeliveryError> {
        match self {
            Self::Local(store) => store.submit(event).await,
            Self::Remote(store) => store.submit(event).await,
        }
    }

    async fn list_events(
        &self,
        staff_id: &StaffId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DeliveryError> {
        match self {
            Self::Local(store) => store.list_events(staff_id, from, to).await,
            Self::Remote(store) => store.list_events(staff_id, from, to).await,
        }
    }

    async fn list_all_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DeliveryError> {
        match self {
            Self::Local(store) => store.list_all_events(from, to).await,
            Self::Remote(store) => store.list_all_events(from, to).await,
        }
    }

    async fn latest_event(&self, staff_id: &StaffId) -> Result<Option<StoredEvent>, DeliveryError> {
        match self {
            Self::Local(store) => store.latest_event(staff_id).await,
            Self::Remote(store) => store.latest_event(staff_id).await,
        }
    }

    async fn probe(&self) -> bool {
        match self {
            Self::Local(store) => store.probe().await,
            Self::Remote(store) => store.probe().await,
        }
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

/// Opens the configured event store.
pub fn open_store(config: &Config) -> Result<AnyStore> {
    let settings = config.sync.settings();
    match config.server_url.as_deref().map(str::trim) {
        Some(url) if !url.is_empty() => {
            let store = HttpEventStore::new(url, settings.submit_timeout)
                .context("failed to create event store client")?;
            Ok(AnyStore::Remote(store))
        }
        _ => {
            ensure_parent(&config.store_path)?;
            let db = Database::open(&config.store_path)
                .with_context(|| format!("failed to open {}", config.store_path.display()))?;
            Ok(AnyStore::Local(SqliteEventStore::new(db)))
        }
    }
}

/// Opens the queue and store and probes connectivity once.
pub async fn connect(config: &Config) -> Result<Arc<SyncEngine<AnyStore>>> {
    ensure_parent(&config.queue_path)?;
    let queue = OfflineQueue::open(&config.queue_path)
        .with_context(|| format!("failed to open {}", config.queue_path.display()))?;
    let store = Arc::new(open_store(config)?);
    let settings = config.sync.settings();

    let connectivity = Connectivity::new(false);
    let online = probe_monitor(&store, &connectivity, config).probe_once().await;
    tracing::debug!(online, "initial connectivity probe");

    Ok(Arc::new(SyncEngine::new(
        store,
        queue,
        connectivity,
        settings,
    )))
}

/// Monitor publishing the store's reachability into `connectivity`.
pub fn probe_monitor(
    store: &Arc<AnyStore>,
    connectivity: &Connectivity,
    config: &Config,
) -> ProbeMonitor<AnyStore> {
    let settings = config.sync.settings();
    ProbeMonitor::new(
        Arc::clone(store),
        connectivity.clone(),
        settings.probe_interval,
        settings.submit_timeout,
    )
}
