//! Core domain logic for the tutoring back office.
//!
//! This crate contains the fundamental types and logic for:
//! - Session lifecycle: validated status, location, and attendance enums
//! - Scheduling: half-open interval overlap analysis for conflict detection
//! - Billing: hour/earning arithmetic and invoice number formats

pub mod schedule;
pub mod timesheet;
pub mod types;

pub use schedule::{ConflictReport, ScheduledSession, TimeSlot, find_conflicts};
pub use timesheet::{
    DEFAULT_HOURLY_RATE, TimesheetTotals, duration_hours, is_online_location,
    monthly_invoice_number, round2, timesheet_invoice_number, week_window,
};
pub use types::{
    AttendanceStatus, InvoiceStatus, Location, NoEligibleWorkReason, SessionStatus, SessionType,
    ValidationError,
};
