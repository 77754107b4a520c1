//! Event type enum as the single source of truth for event type strings.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Attendance actions that can be recorded for a staff member.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventType {
    ClockIn,
    ClockOut,
    BreakStart,
    BreakEnd,
    ManualOverride,
}

impl EventType {
    /// Canonical storage and wire representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::ClockIn => "CLOCK_IN",
            Self::ClockOut => "CLOCK_OUT",
            Self::BreakStart => "BREAK_START",
            Self::BreakEnd => "BREAK_END",
            Self::ManualOverride => "MANUAL_OVERRIDE",
        }
    }

    /// Whether this type is one half of a start/end pair.
    #[must_use]
    pub const fn is_punch(&self) -> bool {
        !matches!(self, Self::ManualOverride)
    }

    /// Whether this type opens or closes a work shift.
    #[must_use]
    pub const fn is_clock(&self) -> bool {
        matches!(self, Self::ClockIn | Self::ClockOut)
    }

    /// Whether this type opens or closes a break.
    #[must_use]
    pub const fn is_break(&self) -> bool {
        matches!(self, Self::BreakStart | Self::BreakEnd)
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for EventType {
    type Err = UnknownEventType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_uppercase().replace('-', "_");
        match normalized.as_str() {
            "CLOCK_IN" | "IN" => Ok(Self::ClockIn),
            "CLOCK_OUT" | "OUT" => Ok(Self::ClockOut),
            "BREAK_START" => Ok(Self::BreakStart),
            "BREAK_END" => Ok(Self::BreakEnd),
            "MANUAL_OVERRIDE" => Ok(Self::ManualOverride),
            _ => Err(UnknownEventType(s.to_string())),
        }
    }
}

impl Serialize for EventType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for EventType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Error type for unknown event type strings.
#[derive(Debug, Clone)]
pub struct UnknownEventType(String);

impl fmt::Display for UnknownEventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown event type: {}", self.0)
    }
}

impl std::error::Error for UnknownEventType {}
