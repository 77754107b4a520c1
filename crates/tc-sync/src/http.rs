//! Event store reached over HTTP.
//!
//! Routes, relative to the configured base URL:
//! - `POST /api/events` submits one event and answers `{"serverId": ...}`
//! - `GET /api/events?staffId=&from=&to=` lists events (`staffId` optional)
//! - `GET /api/events/latest?staffId=` returns the latest event, or 404
//! - `GET /api/health` answers any 2xx while the store is reachable

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, SecondsFormat, Utc};
use reqwest::StatusCode;
use serde::Deserialize;
use serde::de::DeserializeOwned;

use tc_core::{Event, StaffId, StoredEvent};

use crate::store::{DeliveryError, EventStore, SubmitReceipt};

/// Default per-request timeout.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// HTTP client for a remote event store.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Clone)]
pub struct HttpEventStore {
    http: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl fmt::Debug for HttpEventStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpEventStore")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl HttpEventStore {
    /// Creates a client for the store at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is not `http(s)://` or the HTTP client
    /// fails to build.
    pub fn new(base_url: impl Into<String>, timeout: Duration) -> Result<Self, DeliveryError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(DeliveryError::InvalidBaseUrl(base_url));
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(DeliveryError::Network)?;

        Ok(Self {
            http,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn transport_error(&self, err: reqwest::Error) -> DeliveryError {
        if err.is_timeout() {
            DeliveryError::Timeout(self.timeout)
        } else {
            DeliveryError::Network(err)
        }
    }

    async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<Option<T>, DeliveryError> {
        let response = self
            .http
            .get(self.url(path))
            .query(query)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body = response.text().await.map_err(|err| self.transport_error(err))?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        serde_json::from_str(&body)
            .map(Some)
            .map_err(|err| DeliveryError::InvalidResponse(err.to_string()))
    }
}

impl EventStore for HttpEventStore {
    async fn submit(&self, event: &Event) -> Result<SubmitReceipt, DeliveryError> {
        let response = self
            .http
            .post(self.url("/api/events"))
            .json(event)
            .send()
            .await
            .map_err(|err| self.transport_error(err))?;

        let status = response.status();
        let body = response.text().await.map_err(|err| self.transport_error(err))?;
        if !status.is_success() {
            return Err(status_error(status, &body));
        }
        serde_json::from_str(&body).map_err(|err| DeliveryError::InvalidResponse(err.to_string()))
    }

    async fn list_events(
        &self,
        staff_id: &StaffId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DeliveryError> {
        let query = [
            ("staffId", staff_id.to_string()),
            ("from", format_query_time(from)),
            ("to", format_query_time(to)),
        ];
        Ok(self.get_json("/api/events", &query).await?.unwrap_or_default())
    }

    async fn list_all_events(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<StoredEvent>, DeliveryError> {
        let query = [("from", format_query_time(from)), ("to", format_query_time(to))];
        Ok(self.get_json("/api/events", &query).await?.unwrap_or_default())
    }

    async fn latest_event(&self, staff_id: &StaffId) -> Result<Option<StoredEvent>, DeliveryError> {
        self.get_json("/api/events/latest", &[("staffId", staff_id.to_string())])
            .await
    }

    async fn probe(&self) -> bool {
        match self.http.get(self.url("/api/health")).send().await {
            Ok(response) => response.status().is_success(),
            Err(err) => {
                tracing::debug!(error = %err, "health probe failed");
                false
            }
        }
    }
}

fn format_query_time(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Maps a non-success status to the delivery taxonomy.
///
/// Server-side and throttling statuses mean "try again later"; other client
/// errors carry the store's message.
fn status_error(status: StatusCode, body: &str) -> DeliveryError {
    if status.is_server_error()
        || status == StatusCode::TOO_MANY_REQUESTS
        || status == StatusCode::REQUEST_TIMEOUT
    {
        return DeliveryError::Unavailable {
            status: status.as_u16(),
        };
    }
    DeliveryError::Rejected {
        status: status.as_u16(),
        message: parse_error_message(body).unwrap_or_else(|| body.trim().to_string()),
    }
}

fn parse_error_message(body: &str) -> Option<String> {
    #[derive(Deserialize)]
    struct ErrorPayload {
        error: String,
    }

    serde_json::from_str::<ErrorPayload>(body)
        .ok()
        .map(|payload| payload.error)
}
