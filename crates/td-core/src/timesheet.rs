//! Hour and earning arithmetic shared by billing and reporting.
//!
//! Both the timesheet approval path and the tutor hours report go through
//! these functions, so "pending timesheet" totals and "approved invoice"
//! totals can never disagree for the same underlying sessions.

use chrono::NaiveDate;
use serde::Serialize;

use crate::schedule::TimeSlot;

/// Hourly rate applied when a tutor record has none set.
pub const DEFAULT_HOURLY_RATE: f64 = 100.0;

/// Wall-clock session length in fractional hours.
///
/// Minutes divided by 60, both endpoints on the session's own date.
#[must_use]
pub fn duration_hours(slot: &TimeSlot) -> f64 {
    #[expect(clippy::cast_precision_loss, reason = "session lengths fit in f64 exactly")]
    let minutes = slot.minutes() as f64;
    minutes / 60.0
}

/// Whether a session location counts as online for the hours breakdown.
///
/// Empty locations and `online`/`home` (any case) are online; everything
/// else, `centre` included, is offline. Takes the raw stored string so legacy
/// rows with unusual casing classify the same way everywhere.
#[must_use]
pub fn is_online_location(location: &str) -> bool {
    location.is_empty()
        || location.eq_ignore_ascii_case("online")
        || location.eq_ignore_ascii_case("home")
}

/// Rounds a monetary or hour value to two decimal places.
#[must_use]
pub fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Accumulated hours for a set of billable sessions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct TimesheetTotals {
    pub total_hours: f64,
    pub online_hours: f64,
    pub offline_hours: f64,
}

impl TimesheetTotals {
    /// Adds one session's hours, classified by its location.
    pub fn add(&mut self, slot: &TimeSlot, location: &str) {
        let hours = duration_hours(slot);
        self.total_hours += hours;
        if is_online_location(location) {
            self.online_hours += hours;
        } else {
            self.offline_hours += hours;
        }
    }

    /// Amount owed at the given hourly rate, rounded to cents.
    #[must_use]
    pub fn amount(&self, hourly_rate: f64) -> f64 {
        round2(self.total_hours * hourly_rate)
    }

    /// One-line hours breakdown used as the invoice item description.
    #[must_use]
    pub fn summary(&self) -> String {
        format!(
            "Tutoring hours: {}h (Online: {}h, Offline: {}h)",
            format_hours(self.total_hours),
            format_hours(self.online_hours),
            format_hours(self.offline_hours),
        )
    }
}

/// Formats an hour count without trailing zeros (`3`, `1.5`, `0.75`).
#[must_use]
pub fn format_hours(hours: f64) -> String {
    let rounded = round2(hours);
    if (rounded - rounded.trunc()).abs() < f64::EPSILON {
        format!("{rounded:.0}")
    } else {
        let formatted = format!("{rounded:.2}");
        formatted.trim_end_matches('0').to_string()
    }
}

/// Invoice number for a weekly timesheet approval.
///
/// `INV-TUTOR-{tutorId}-{YYYYMMDD}-{0000}` where the trailing sequence is
/// per tutor. Uniqueness is ultimately enforced by the database constraint;
/// callers retry with a bumped sequence on collision.
#[must_use]
pub fn timesheet_invoice_number(tutor_id: &str, issued_on: NaiveDate, sequence: u32) -> String {
    format!(
        "INV-TUTOR-{tutor_id}-{}-{sequence:04}",
        issued_on.format("%Y%m%d")
    )
}

/// Invoice number for the general creation path: `INV-{YYYY}-{MM}-{0000}`.
#[must_use]
pub fn monthly_invoice_number(issued_on: NaiveDate, sequence: u32) -> String {
    format!("INV-{}-{sequence:04}", issued_on.format("%Y-%m"))
}

/// The inclusive 7-day window ending on `week_ending`.
#[must_use]
pub fn week_window(week_ending: NaiveDate) -> (NaiveDate, NaiveDate) {
    (week_ending - chrono::Duration::days(6), week_ending)
}
