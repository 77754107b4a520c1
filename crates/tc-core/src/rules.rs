//! Business rules gating direct clock actions.
//!
//! Only `CLOCK_IN` and `CLOCK_OUT` are gated. The administrative override path
//! does not consult these rules.

use chrono::{DateTime, Duration, Utc};
use thiserror::Error;

use crate::active::is_active_at;
use crate::event::Event;
use crate::event_type::EventType;
use crate::types::StaffId;

/// Seconds in which a repeated punch of the same type is treated as a duplicate.
pub const DUPLICATE_PUNCH_WINDOW_SECS: i64 = 60;

/// A clock action refused by a business rule.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuleViolation {
    #[error("staff member {staff_id} is already clocked in")]
    AlreadyClockedIn { staff_id: StaffId },

    #[error("staff member {staff_id} is not clocked in")]
    NotClockedIn { staff_id: StaffId },

    #[error("duplicate {event_type} for {staff_id}: previous one at {previous_at}")]
    DuplicatePunch {
        staff_id: StaffId,
        event_type: EventType,
        previous_at: DateTime<Utc>,
    },
}

impl RuleViolation {
    /// Stable machine-readable code.
    #[must_use]
    pub const fn code(&self) -> &'static str {
        match self {
            Self::AlreadyClockedIn { .. } => "ALREADY_CLOCKED_IN",
            Self::NotClockedIn { .. } => "NOT_CLOCKED_IN",
            Self::DuplicatePunch {
                event_type: EventType::ClockOut,
                ..
            } => "DUPLICATE_CLOCK_OUT",
            Self::DuplicatePunch { .. } => "DUPLICATE_CLOCK_IN",
        }
    }
}

/// Checks whether `staff_id` may record `punch` at `at`, given their known timeline.
///
/// The timeline should hold the latest authoritative event plus any events
/// still waiting in the offline queue.
pub fn check_punch(
    staff_id: &StaffId,
    timeline: &[Event],
    punch: EventType,
    at: DateTime<Utc>,
) -> Result<(), RuleViolation> {
    if !punch.is_clock() {
        return Ok(());
    }

    let active = is_active_at(timeline, at);
    match punch {
        EventType::ClockIn if active => {
            return Err(RuleViolation::AlreadyClockedIn {
                staff_id: staff_id.clone(),
            });
        }
        EventType::ClockOut if !active => {
            return Err(RuleViolation::NotClockedIn {
                staff_id: staff_id.clone(),
            });
        }
        _ => {}
    }

    let since = at - Duration::seconds(DUPLICATE_PUNCH_WINDOW_SECS);
    if let Some(previous) = timeline
        .iter()
        .filter(|e| e.event_type == punch && e.occurred_at >= since && e.occurred_at <= at)
        .max_by_key(|e| e.occurred_at)
    {
        return Err(RuleViolation::DuplicatePunch {
            staff_id: staff_id.clone(),
            event_type: punch,
            previous_at: previous.occurred_at,
        });
    }

    Ok(())
}
