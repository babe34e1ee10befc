//! Session time windows and schedule conflict analysis.
//!
//! A session occupies a half-open interval `[start, end)` on a single
//! calendar date. Two sessions for the same tutor conflict when their
//! intervals overlap; merely touching at a boundary does not count.

use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};

use crate::types::ValidationError;

/// The time window a session occupies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSlot {
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl TimeSlot {
    /// Creates a slot, rejecting windows that do not end after they start.
    ///
    /// Both times are interpreted on `date`; cross-midnight sessions are not
    /// modeled.
    pub fn new(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Result<Self, ValidationError> {
        if end <= start {
            return Err(ValidationError::EndNotAfterStart {
                start: start.format("%H:%M").to_string(),
                end: end.format("%H:%M").to_string(),
            });
        }
        Ok(Self { date, start, end })
    }

    /// Half-open overlap test: `a.start < b.end AND a.end > b.start`.
    ///
    /// Slots on different dates never overlap, and a slot ending exactly when
    /// another begins does not overlap it.
    #[must_use]
    pub fn overlaps(&self, other: &Self) -> bool {
        self.date == other.date && self.start < other.end && self.end > other.start
    }

    /// Session length in whole minutes.
    #[must_use]
    pub fn minutes(&self) -> i64 {
        (self.end - self.start).num_minutes()
    }
}

/// A session id paired with its time window, as fed to conflict analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduledSession {
    pub id: String,
    pub slot: TimeSlot,
}

/// Result of a conflict scan over one tutor's schedule.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ConflictReport {
    /// Number of sessions involved in at least one overlapping pair.
    pub count: usize,
    /// Ids of those sessions, in input order, deduplicated.
    pub session_ids: Vec<String>,
}

/// Finds every session that overlaps at least one other session.
///
/// Quadratic in sessions per tutor per day, which stays small in practice.
/// Purely advisory: callers surface conflicts for manual resolution and never
/// block scheduling on them.
#[must_use]
pub fn find_conflicts(sessions: &[ScheduledSession]) -> ConflictReport {
    let mut conflicted = vec![false; sessions.len()];
    for (i, a) in sessions.iter().enumerate() {
        for (j, b) in sessions.iter().enumerate().skip(i + 1) {
            if a.slot.overlaps(&b.slot) {
                conflicted[i] = true;
                conflicted[j] = true;
            }
        }
    }

    let session_ids: Vec<String> = sessions
        .iter()
        .zip(&conflicted)
        .filter(|(_, hit)| **hit)
        .map(|(session, _)| session.id.clone())
        .collect();
    ConflictReport {
        count: session_ids.len(),
        session_ids,
    }
}
