//! Core domain logic for the time clock.
//!
//! This crate contains the fundamental types and logic for:
//! - Events: the append-only attendance record and the drafts it is built from
//! - Reconciliation: pairing start/end events into sessions and anomalies
//! - Aggregation: daily and weekly hour totals
//! - Active sessions: whether a staff member is currently clocked in
//! - Rules: business rules gating direct clock actions

pub mod active;
pub mod aggregate;
pub mod event;
pub mod event_type;
pub mod format;
pub mod reconcile;
pub mod rules;
pub mod types;

pub use active::{active_staff, is_active, is_active_at, latest_event_at};
pub use aggregate::{
    HoursDisplay, HoursSummary, WeeklySummary, Window, daily_summary, summarize, summarize_all,
    weekly_summary,
};
pub use event::{Event, EventDraft, ManualOverride, NaturalKey, StoredEvent, sort_chronologically};
pub use event_type::{EventType, UnknownEventType};
pub use format::{format_hours, round_hours};
pub use reconcile::{
    Anomaly, AnomalyKind, PairOutcome, Reconciliation, Session, SessionKind, pair_events,
    reconcile,
};
pub use rules::{DUPLICATE_PUNCH_WINDOW_SECS, RuleViolation, check_punch};
pub use types::{AdminId, DeviceId, LocalId, StaffId, ValidationError};
