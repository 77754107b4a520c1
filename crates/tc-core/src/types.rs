//! Core type definitions with validation.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for event drafts and identifiers.
///
/// A draft that fails validation is rejected synchronously and never enters
/// the offline queue.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// A required identifier was empty or whitespace-only.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// An administrative event was submitted without a reason.
    #[error("a reason is required for manual overrides")]
    MissingReason,

    /// A bare `MANUAL_OVERRIDE` event was submitted without an admin.
    #[error("manual override events must name the performing admin")]
    MissingAdmin,

    /// The corrected punch of an override was not a punch type.
    #[error("cannot override with event type {0}")]
    InvalidOverridePunch(String),
}

/// Generates a validated string ID newtype with common trait implementations.
macro_rules! define_string_id {
    (
        $(#[$meta:meta])*
        $name:ident, $field_name:literal
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID after validation. Surrounding whitespace is trimmed.
            pub fn new(id: impl Into<String>) -> Result<Self, ValidationError> {
                let id = id.into();
                let trimmed = id.trim();
                if trimmed.is_empty() {
                    return Err(ValidationError::Empty { field: $field_name });
                }
                if trimmed.len() == id.len() {
                    Ok(Self(id))
                } else {
                    Ok(Self(trimmed.to_string()))
                }
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                Self::new(value)
            }
        }

        impl From<$name> for String {
            fn from(id: $name) -> Self {
                id.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

define_string_id!(
    /// Identifier of a staff member.
    StaffId,
    "staff_id"
);

define_string_id!(
    /// Identifier of the device an event was captured on.
    DeviceId,
    "device_id"
);

define_string_id!(
    /// Identifier of the administrator who performed a manual override.
    AdminId,
    "admin_id"
);

define_string_id!(
    /// Client-side identifier of a queued event, assigned at enqueue time.
    LocalId,
    "local_id"
);
