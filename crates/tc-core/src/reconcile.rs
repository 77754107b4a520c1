//! Session reconciliation.
//!
//! Pairs one staff member's start/end events into sessions and flags the
//! events that cannot be paired.
//!
//! # Algorithm Summary
//!
//! Each type pair ((`CLOCK_IN`, `CLOCK_OUT`) and (`BREAK_START`, `BREAK_END`)) is
//! paired independently:
//!
//! 1. Visit events in ascending `occurred_at`, keeping input order for ties
//! 2. A start event is pushed onto a stack of open starts
//! 3. An end event pops the most recent open start; the pair becomes a session
//!    when its duration is positive and a `non-positive-duration` anomaly otherwise.
//!    An end with nothing to pop is an `unmatched-end` anomaly
//! 4. Starts still open at the end are `unmatched-start` anomalies
//!
//! Most-recent-first matching closes the innermost open interval first, so a
//! break nested in a shift pairs correctly. Each pair only inspects its own two
//! types, so the two passes are order-independent.

use std::fmt;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::event::Event;
use crate::event_type::EventType;

const MS_PER_HOUR: f64 = 3_600_000.0;

/// Which pair of event types a session was built from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionKind {
    Work,
    Break,
}

impl SessionKind {
    pub const ALL: [Self; 2] = [Self::Work, Self::Break];

    #[must_use]
    pub const fn start_type(self) -> EventType {
        match self {
            Self::Work => EventType::ClockIn,
            Self::Break => EventType::BreakStart,
        }
    }

    #[must_use]
    pub const fn end_type(self) -> EventType {
        match self {
            Self::Work => EventType::ClockOut,
            Self::Break => EventType::BreakEnd,
        }
    }
}

/// A reconciled start/end pair with a positive duration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub kind: SessionKind,
    pub start: Event,
    pub end: Event,
}

impl Session {
    pub fn duration(&self) -> Duration {
        self.end.occurred_at - self.start.occurred_at
    }

    pub fn duration_ms(&self) -> i64 {
        self.duration().num_milliseconds()
    }

    #[allow(clippy::cast_precision_loss)]
    pub fn duration_hours(&self) -> f64 {
        self.duration_ms() as f64 / MS_PER_HOUR
    }

    /// Milliseconds of this session falling inside `[from, to)`.
    pub fn overlap_ms(&self, from: DateTime<Utc>, to: DateTime<Utc>) -> i64 {
        let start = self.start.occurred_at.max(from);
        let end = self.end.occurred_at.min(to);
        (end - start).num_milliseconds().max(0)
    }
}

/// Data-quality classification of an event that could not be paired validly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AnomalyKind {
    UnmatchedStart,
    UnmatchedEnd,
    NonPositiveDuration,
}

impl AnomalyKind {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::UnmatchedStart => "unmatched-start",
            Self::UnmatchedEnd => "unmatched-end",
            Self::NonPositiveDuration => "non-positive-duration",
        }
    }
}

impl fmt::Display for AnomalyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An anomaly attached to the offending event.
///
/// For `non-positive-duration` the event is the end punch and `counterpart`
/// holds the start it was popped against.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Anomaly {
    pub kind: AnomalyKind,
    pub pair: SessionKind,
    pub event: Event,
    pub counterpart: Option<Event>,
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {} at {}",
            self.kind,
            self.event.event_type,
            self.event.occurred_at.to_rfc3339()
        )
    }
}

/// Sessions and anomalies for a single type pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PairOutcome {
    /// Sessions in the order their end events were visited.
    pub sessions: Vec<Session>,
    /// Anomalies in visit order, followed by unmatched starts oldest first.
    pub anomalies: Vec<Anomaly>,
}

impl PairOutcome {
    pub fn total_ms(&self) -> i64 {
        self.sessions.iter().map(Session::duration_ms).sum()
    }
}

/// Reconciliation result for one staff member.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Reconciliation {
    pub work: PairOutcome,
    pub breaks: PairOutcome,
}

impl Reconciliation {
    pub const fn outcome(&self, kind: SessionKind) -> &PairOutcome {
        match kind {
            SessionKind::Work => &self.work,
            SessionKind::Break => &self.breaks,
        }
    }

    pub fn sessions(&self) -> impl Iterator<Item = &Session> {
        self.work.sessions.iter().chain(&self.breaks.sessions)
    }

    pub fn anomalies(&self) -> impl Iterator<Item = &Anomaly> {
        self.work.anomalies.iter().chain(&self.breaks.anomalies)
    }

    pub fn is_clean(&self) -> bool {
        self.work.anomalies.is_empty() && self.breaks.anomalies.is_empty()
    }
}

/// Reconciles one staff member's events into work and break sessions.
///
/// Events are expected in storage order; they are visited by ascending
/// `occurred_at` with ties kept in that order.
pub fn reconcile(events: &[Event]) -> Reconciliation {
    let order = chronological_order(events);
    let reconciliation = Reconciliation {
        work: pair_in_order(events, &order, SessionKind::Work),
        breaks: pair_in_order(events, &order, SessionKind::Break),
    };
    if !reconciliation.is_clean() {
        tracing::debug!(
            work_anomalies = reconciliation.work.anomalies.len(),
            break_anomalies = reconciliation.breaks.anomalies.len(),
            "reconciliation produced anomalies"
        );
    }
    reconciliation
}

/// Pairs a single type pair.
pub fn pair_events(events: &[Event], kind: SessionKind) -> PairOutcome {
    let order = chronological_order(events);
    pair_in_order(events, &order, kind)
}

/// Indices of `events` sorted by `occurred_at`; the sort is stable so ties keep input order.
fn chronological_order(events: &[Event]) -> Vec<usize> {
    let mut order: Vec<usize> = (0..events.len()).collect();
    order.sort_by_key(|&idx| events[idx].occurred_at);
    order
}

fn pair_in_order(events: &[Event], order: &[usize], kind: SessionKind) -> PairOutcome {
    let start_type = kind.start_type();
    let end_type = kind.end_type();
    let mut open: Vec<usize> = Vec::new();
    let mut outcome = PairOutcome::default();

    for &idx in order {
        let event = &events[idx];
        if event.event_type == start_type {
            open.push(idx);
        } else if event.event_type == end_type {
            let Some(start_idx) = open.pop() else {
                outcome.anomalies.push(Anomaly {
                    kind: AnomalyKind::UnmatchedEnd,
                    pair: kind,
                    event: event.clone(),
                    counterpart: None,
                });
                continue;
            };
            let start = &events[start_idx];
            if event.occurred_at > start.occurred_at {
                outcome.sessions.push(Session {
                    kind,
                    start: start.clone(),
                    end: event.clone(),
                });
            } else {
                outcome.anomalies.push(Anomaly {
                    kind: AnomalyKind::NonPositiveDuration,
                    pair: kind,
                    event: event.clone(),
                    counterpart: Some(start.clone()),
                });
            }
        }
    }

    outcome
        .anomalies
        .extend(open.into_iter().map(|idx| Anomaly {
            kind: AnomalyKind::UnmatchedStart,
            pair: kind,
            event: events[idx].clone(),
            counterpart: None,
        }));
    outcome
}
