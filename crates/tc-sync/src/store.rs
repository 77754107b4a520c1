//! The authoritative event store as seen from the client.

use std::future::Future;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use tc_core::{Event, StaffId, StoredEvent};

/// Why a store call did not complete.
///
/// Every variant is transient from the sync engine's point of view: the
/// entry stays queued and is retried on the next pass.
#[derive(Debug, Error)]
pub enum DeliveryError {
    /// The call did not finish within its deadline.
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    /// HTTP transport failed before a response arrived.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The store answered but is not accepting work right now.
    #[error("store unavailable (status {status})")]
    Unavailable { status: u16 },
    /// The store refused the request.
    #[error("store rejected request (status {status}): {message}")]
    Rejected { status: u16, message: String },
    /// The response body could not be decoded.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
    /// The configured server URL is unusable.
    #[error("server URL must start with http:// or https://: {0:?}")]
    InvalidBaseUrl(String),
    /// Local storage behind the store failed.
    #[error("storage error: {0}")]
    Storage(String),
}

impl From<tc_db::DbError> for DeliveryError {
    fn from(err: tc_db::DbError) -> Self {
        Self::Storage(err.to_string())
    }
}

/// Confirmation that an event is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitReceipt {
    pub server_id: i64,
}

/// Append-only, authoritative event persistence.
///
/// `submit` must be idempotent on the event's natural key so that
/// re-delivering an already stored event is harmless.
pub trait EventStore: Send + Sync {
    fn submit(
        &self,
        event: &Event,
    ) -> impl Future<Output = Result<SubmitReceipt, DeliveryError>> + Send;

    /// One staff member's events in `[from, to)`, ordered by `occurred_at`
    /// and then storage order.
    fn list_events(
        &self,
        staff_id: &StaffId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, DeliveryError>> + Send;

    /// Every staff member's events in `[from, to)`, same ordering.
    fn list_all_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> impl Future<Output = Result<Vec<StoredEvent>, DeliveryError>> + Send;

    fn latest_event(
        &self,
        staff_id: &StaffId,
    ) -> impl Future<Output = Result<Option<StoredEvent>, DeliveryError>> + Send;

    /// Cheap reachability check.
    fn probe(&self) -> impl Future<Output = bool> + Send {
        async { true }
    }
}
