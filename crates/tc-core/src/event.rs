//! Attendance events and the drafts they are built from.

use chrono::{DateTime, SubsecRound, Utc};
use serde::{Deserialize, Serialize};

use crate::event_type::EventType;
use crate::types::{AdminId, DeviceId, StaffId, ValidationError};

/// A timestamped attendance action tied to a staff member and device.
///
/// Events are append-only: once persisted they are never mutated or deleted.
/// Corrections are recorded as new events carrying an `admin_id` and `reason`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub staff_id: StaffId,
    pub device_id: DeviceId,
    /// Administrator who recorded this event on the staff member's behalf.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub admin_id: Option<AdminId>,
    pub event_type: EventType,
    /// When the action happened, at millisecond precision.
    pub occurred_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// The identity an event store deduplicates submissions on.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NaturalKey {
    pub staff_id: StaffId,
    pub device_id: DeviceId,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
}

impl Event {
    /// Returns the `(staff, device, type, occurred_at)` key used for idempotent submission.
    pub fn natural_key(&self) -> NaturalKey {
        NaturalKey {
            staff_id: self.staff_id.clone(),
            device_id: self.device_id.clone(),
            event_type: self.event_type,
            occurred_at: self.occurred_at,
        }
    }

    /// Whether this event was recorded through the administrative override path.
    pub fn is_manual_override(&self) -> bool {
        self.admin_id.is_some() || self.event_type == EventType::ManualOverride
    }

    /// Human-readable description, e.g. `clock in (forgot badge)`.
    pub fn description(&self) -> String {
        let mut desc = self.event_type.as_str().replace('_', " ").to_lowercase();
        if let Some(reason) = &self.reason {
            desc.push_str(" (");
            desc.push_str(reason);
            desc.push(')');
        }
        desc
    }
}

/// An event as returned by the authoritative store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredEvent {
    /// Store-assigned identifier; increases with insertion order.
    pub server_id: i64,
    #[serde(flatten)]
    pub event: Event,
}

/// Sorts events by `occurred_at`, keeping storage order for ties.
pub fn sort_chronologically(events: &mut [StoredEvent]) {
    events.sort_by(|a, b| {
        a.event
            .occurred_at
            .cmp(&b.event.occurred_at)
            .then(a.server_id.cmp(&b.server_id))
    });
}

/// An unvalidated event as produced by a clock action.
///
/// Identifiers are kept as raw strings so a missing value can be reported as a
/// [`ValidationError`] instead of being unrepresentable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventDraft {
    pub staff_id: String,
    pub device_id: String,
    pub event_type: EventType,
    pub occurred_at: DateTime<Utc>,
    pub admin_id: Option<String>,
    pub reason: Option<String>,
}

impl EventDraft {
    /// Creates a draft for an ordinary (non-override) punch.
    pub fn new(
        staff_id: impl Into<String>,
        device_id: impl Into<String>,
        event_type: EventType,
        occurred_at: DateTime<Utc>,
    ) -> Self {
        Self {
            staff_id: staff_id.into(),
            device_id: device_id.into(),
            event_type,
            occurred_at,
            admin_id: None,
            reason: None,
        }
    }

    #[must_use]
    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    #[must_use]
    pub fn with_admin(mut self, admin_id: impl Into<String>) -> Self {
        self.admin_id = Some(admin_id.into());
        self
    }

    /// Validates the draft and produces an [`Event`].
    ///
    /// `occurred_at` is truncated to milliseconds, the precision the stores keep,
    /// so the natural key survives a storage round trip unchanged.
    pub fn validate(&self) -> Result<Event, ValidationError> {
        let staff_id = StaffId::new(self.staff_id.as_str())?;
        let device_id = DeviceId::new(self.device_id.as_str())?;
        let admin_id = self.admin_id.as_deref().map(AdminId::new).transpose()?;
        let reason = self
            .reason
            .as_deref()
            .map(str::trim)
            .filter(|r| !r.is_empty())
            .map(String::from);

        if admin_id.is_some() && reason.is_none() {
            return Err(ValidationError::MissingReason);
        }
        if self.event_type == EventType::ManualOverride && admin_id.is_none() {
            return Err(ValidationError::MissingAdmin);
        }

        Ok(Event {
            staff_id,
            device_id,
            admin_id,
            event_type: self.event_type,
            occurred_at: self.occurred_at.trunc_subsecs(3),
            reason,
        })
    }
}

impl From<Event> for EventDraft {
    fn from(event: Event) -> Self {
        Self {
            staff_id: event.staff_id.into(),
            device_id: event.device_id.into(),
            event_type: event.event_type,
            occurred_at: event.occurred_at,
            admin_id: event.admin_id.map(String::from),
            reason: event.reason,
        }
    }
}

/// An administrator's correction of a missed or wrong punch.
///
/// The resulting event carries the corrected punch as its type, so pairing and
/// active-session detection treat it like any other punch; the `admin_id` and
/// `reason` record its provenance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ManualOverride {
    pub staff_id: StaffId,
    pub device_id: DeviceId,
    pub admin_id: AdminId,
    pub punch: EventType,
    pub occurred_at: DateTime<Utc>,
    pub reason: String,
}

impl ManualOverride {
    pub fn into_draft(self) -> Result<EventDraft, ValidationError> {
        if !self.punch.is_punch() {
            return Err(ValidationError::InvalidOverridePunch(
                self.punch.to_string(),
            ));
        }
        Ok(EventDraft {
            staff_id: self.staff_id.into(),
            device_id: self.device_id.into(),
            event_type: self.punch,
            occurred_at: self.occurred_at,
            admin_id: Some(self.admin_id.into()),
            reason: Some(self.reason),
        })
    }
}
