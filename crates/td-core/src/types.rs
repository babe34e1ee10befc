//! Core type definitions with validation.
//!
//! Every enum stored in the database round-trips through `as_str`/`FromStr`,
//! so a malformed value is rejected before it reaches a write path.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Validation errors for core types.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum ValidationError {
    /// The provided value was empty.
    #[error("{field} cannot be empty")]
    Empty { field: &'static str },

    /// A session must end after it starts.
    #[error("end time {end} must be after start time {start}")]
    EndNotAfterStart { start: String, end: String },

    /// Monetary amounts cannot be negative.
    #[error("amount cannot be negative, got {value}")]
    NegativeAmount { value: f64 },

    /// Invalid session status value.
    #[error("invalid session status: {value}")]
    InvalidSessionStatus { value: String },

    /// Invalid session location value.
    #[error("invalid location: {value}")]
    InvalidLocation { value: String },

    /// Invalid session type value.
    #[error("invalid session type: {value}")]
    InvalidSessionType { value: String },

    /// Invalid attendance status value.
    #[error("invalid attendance status: {value}")]
    InvalidAttendanceStatus { value: String },

    /// Invalid invoice status value.
    #[error("invalid invoice status: {value}")]
    InvalidInvoiceStatus { value: String },
}

/// Generates a validated string-backed enum with database and serde round-trips.
macro_rules! define_status_enum {
    (
        $(#[$meta:meta])*
        $name:ident, $error:ident {
            $($variant:ident => $repr:literal $(| $alias:literal)*),+ $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(try_from = "String", into = "String")]
        pub enum $name {
            $($variant,)+
        }

        impl $name {
            /// String representation for database storage.
            #[must_use]
            pub const fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $repr,)+
                }
            }

            /// All valid values, in declaration order.
            #[must_use]
            pub const fn all() -> &'static [Self] {
                &[$(Self::$variant,)+]
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = ValidationError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($repr $(| $alias)* => Ok(Self::$variant),)+
                    _ => Err(ValidationError::$error {
                        value: s.to_string(),
                    }),
                }
            }
        }

        impl TryFrom<String> for $name {
            type Error = ValidationError;

            fn try_from(value: String) -> Result<Self, Self::Error> {
                value.parse()
            }
        }

        impl From<$name> for String {
            fn from(value: $name) -> Self {
                value.as_str().to_string()
            }
        }
    };
}

define_status_enum!(
    /// Lifecycle status of a tutoring session.
    ///
    /// `Planned` is the initial state. The remaining states are terminal for
    /// billing purposes; a rescheduled session is closed and a fresh `Planned`
    /// session is created in its place. Status changes are validated-enum
    /// assignment, not a strict transition table.
    SessionStatus, InvalidSessionStatus {
        Planned => "planned",
        Completed => "completed",
        Cancelled => "cancelled",
        NoShow => "no-show",
        Rescheduled => "rescheduled",
        Unavailable => "unavailable",
    }
);

impl SessionStatus {
    /// Only completed sessions produce billable work.
    #[must_use]
    pub const fn is_billable(&self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl Default for SessionStatus {
    fn default() -> Self {
        Self::Planned
    }
}

define_status_enum!(
    /// Where a session takes place.
    Location, InvalidLocation {
        Online => "online",
        Centre => "centre",
        Home => "home",
        Other => "other",
    }
);

define_status_enum!(
    /// Session format. Accepts the legacy `1:1` spelling on input.
    SessionType, InvalidSessionType {
        OneToOne => "one-to-one" | "1:1",
        Group => "group",
    }
);

define_status_enum!(
    /// Per-student attendance outcome for a session.
    AttendanceStatus, InvalidAttendanceStatus {
        Present => "present",
        Absent => "absent",
        Late => "late",
        Excused => "excused",
    }
);

define_status_enum!(
    /// Invoice lifecycle status.
    ///
    /// New invoices always start `Pending`. `Paid` is one-directional and
    /// only reachable through the mark-paid operation; the overdue sweep
    /// moves `Pending` to `Overdue` and touches nothing else.
    InvoiceStatus, InvalidInvoiceStatus {
        Pending => "pending",
        Paid => "paid",
        Overdue => "overdue",
        Cancelled => "cancelled",
    }
);

/// Why a timesheet approval found nothing to bill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum NoEligibleWorkReason {
    /// No sessions exist for the tutor in the requested window.
    NoSessions,
    /// Sessions exist, but none have attendance marked.
    AttendanceNotMarked,
    /// Every attendance-marked session in the window is already invoiced.
    AlreadyInvoiced,
}

impl NoEligibleWorkReason {
    /// Human-readable explanation for CLI output.
    #[must_use]
    pub const fn message(&self) -> &'static str {
        match self {
            Self::NoSessions => "no sessions exist for this tutor in this date range",
            Self::AttendanceNotMarked => "sessions exist but attendance has not been marked",
            Self::AlreadyInvoiced => "all sessions in this period have already been invoiced",
        }
    }
}

impl fmt::Display for NoEligibleWorkReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}
