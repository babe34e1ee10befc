//! Storage layer for the tutoring back office.
//!
//! Provides persistence for tutors, sessions, attendance records, and
//! invoices using `rusqlite`.
//!
//! # Thread Safety
//!
//! The [`Database`] type wraps a `rusqlite::Connection`, which is `Send` but
//! not `Sync`. A `Database` instance can be moved between threads but cannot
//! be shared without external synchronization (`Mutex<Database>`, a pool, or
//! one instance per thread).
//!
//! # Schema
//!
//! Calendar dates are stored as TEXT in `YYYY-MM-DD` form and wall-clock
//! times as `HH:MM`, both of which order lexicographically the same way they
//! order chronologically. Audit timestamps are RFC 3339 UTC.
//!
//! Two booleans carry the billing invariants:
//! - `sessions.attendance_marked` is set by the first attendance upsert and
//!   never cleared.
//! - `sessions.ready_for_invoicing` is monotonic false→true and is the sole
//!   guard against double billing. Only the timesheet approval transaction
//!   and the direct session-invoice path set it, and both re-check it is
//!   still false inside their transaction.

mod billing;
mod report;

use std::path::Path;

use chrono::{DateTime, NaiveDate, NaiveTime, SecondsFormat, Utc};
use rusqlite::{Connection, Row, params};
use serde::Serialize;
use thiserror::Error;
use tracing::debug;
use uuid::Uuid;

use td_core::{
    AttendanceStatus, ConflictReport, Location, NoEligibleWorkReason, SessionStatus, SessionType,
    TimeSlot, ValidationError, round2,
};

pub use billing::{InvoiceFilter, InvoiceItemRecord, InvoiceRecord, NewInvoice, NewInvoiceItem};
pub use report::{HoursReport, HoursReportFilter, HoursReportRow, HoursSummary};

/// Database errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// An error from the underlying database.
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Input failed domain validation before any write.
    #[error(transparent)]
    Validation(#[from] ValidationError),
    /// The referenced row does not exist.
    #[error("{entity} not found: {id}")]
    NotFound { entity: &'static str, id: String },
    /// The supplied invoice number is already in use; nothing was persisted.
    #[error("invoice number already in use: {number}")]
    DuplicateInvoiceNumber { number: String },
    /// A concurrent approval claimed one of the candidate sessions first.
    #[error("session already claimed by a concurrent timesheet approval")]
    ConcurrentClaim,
    /// A timesheet approval found nothing to bill.
    #[error("no billable work for this timesheet period: {0}")]
    NoEligibleWork(NoEligibleWorkReason),
    /// The operation is not legal from the invoice's current status.
    #[error("invalid invoice state: {message}")]
    InvalidState { message: String },
}

/// Database connection wrapper.
///
/// See the [module documentation](self) for thread safety considerations.
pub struct Database {
    pub(crate) conn: Connection,
}

/// A tutor directory entry: the billing core only consumes id and rate.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TutorRecord {
    pub id: String,
    pub name: String,
    /// Hourly rate in invoice currency. `None` falls back to the default.
    pub hourly_rate: Option<f64>,
}

/// Input for creating a session.
#[derive(Debug, Clone)]
pub struct NewSession {
    pub tutor_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub student_ids: Vec<String>,
    pub subject: String,
    pub location: Location,
    pub session_type: SessionType,
    pub class_id: Option<String>,
}

/// A stored tutoring session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub tutor_id: String,
    pub class_id: Option<String>,
    pub subject: String,
    /// Stored location string. Kept raw so the online/offline split
    /// classifies legacy casing the same way on every read path.
    pub location: String,
    pub session_type: SessionType,
    pub status: SessionStatus,
    pub lesson_note: Option<String>,
    pub attendance_marked: bool,
    pub ready_for_invoicing: bool,
}

impl SessionRecord {
    /// The session's time window.
    pub fn slot(&self) -> Result<TimeSlot, ValidationError> {
        TimeSlot::new(self.date, self.start_time, self.end_time)
    }
}

/// One student's attendance entry for a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AttendanceRecord {
    pub session_id: String,
    pub student_id: String,
    /// `None` until attendance is marked for this student.
    pub attendance_status: Option<AttendanceStatus>,
}

/// Aggregated attendance counts for one session.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttendanceStats {
    pub total_students: usize,
    pub present: usize,
    pub absent: usize,
    pub late: usize,
    pub excused: usize,
    /// Percentage of enrolled students marked present, to two decimals.
    pub attendance_rate: f64,
}

const SESSION_COLUMNS: &str = "id, date, start_time, end_time, tutor_id, class_id, subject, \
     location, session_type, status, lesson_note, attendance_marked, ready_for_invoicing";

impl Database {
    /// Opens a database at the given path, creating it if necessary.
    ///
    /// The database schema is automatically initialized on first open.
    pub fn open(path: &Path) -> Result<Self, DbError> {
        let conn = Connection::open(path)?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Opens an in-memory database.
    ///
    /// Useful for testing. The database is destroyed when the connection closes.
    pub fn open_in_memory() -> Result<Self, DbError> {
        let conn = Connection::open_in_memory()?;
        let db = Self { conn };
        db.init()?;
        Ok(db)
    }

    /// Initializes the database schema.
    ///
    /// This is idempotent - safe to call on an already-initialized database.
    fn init(&self) -> Result<(), DbError> {
        self.conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        self.conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS tutors (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                hourly_rate REAL
            );

            -- Sessions table: one row per scheduled or completed engagement
            -- date: 'YYYY-MM-DD'; start_time/end_time: 'HH:MM' on that date
            CREATE TABLE IF NOT EXISTS sessions (
                id TEXT PRIMARY KEY,
                date TEXT NOT NULL,
                start_time TEXT NOT NULL,
                end_time TEXT NOT NULL,
                tutor_id TEXT NOT NULL,
                class_id TEXT,
                subject TEXT NOT NULL,
                location TEXT NOT NULL,
                session_type TEXT NOT NULL,
                status TEXT NOT NULL DEFAULT 'planned',
                lesson_note TEXT,
                attendance_marked INTEGER NOT NULL DEFAULT 0,
                ready_for_invoicing INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                FOREIGN KEY (tutor_id) REFERENCES tutors(id)
            );

            CREATE INDEX IF NOT EXISTS idx_sessions_tutor_date ON sessions(tutor_id, date);
            CREATE INDEX IF NOT EXISTS idx_sessions_status ON sessions(status);

            CREATE TABLE IF NOT EXISTS attendance (
                session_id TEXT NOT NULL,
                student_id TEXT NOT NULL,
                attendance_status TEXT,
                PRIMARY KEY (session_id, student_id),
                FOREIGN KEY (session_id) REFERENCES sessions(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_attendance_student ON attendance(student_id);

            CREATE TABLE IF NOT EXISTS invoices (
                id TEXT PRIMARY KEY,
                invoice_number TEXT NOT NULL UNIQUE,
                tutor_id TEXT,
                student_id TEXT,
                parent_id TEXT,
                session_id TEXT,
                amount REAL NOT NULL,
                currency TEXT NOT NULL DEFAULT 'USD',
                status TEXT NOT NULL DEFAULT 'pending',
                issue_date TEXT NOT NULL,
                due_date TEXT NOT NULL,
                period_start TEXT,
                period_end TEXT,
                description TEXT,
                paid_date TEXT,
                payment_method TEXT,
                transaction_id TEXT,
                created_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_invoices_tutor ON invoices(tutor_id);
            CREATE INDEX IF NOT EXISTS idx_invoices_status ON invoices(status);

            CREATE TABLE IF NOT EXISTS invoice_items (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                invoice_id TEXT NOT NULL,
                description TEXT NOT NULL,
                amount REAL NOT NULL,
                credits REAL,
                FOREIGN KEY (invoice_id) REFERENCES invoices(id) ON DELETE CASCADE
            );

            CREATE INDEX IF NOT EXISTS idx_invoice_items_invoice ON invoice_items(invoice_id);
            ",
        )?;
        Ok(())
    }

    /// Inserts a tutor, updating name and rate if the id already exists.
    pub fn upsert_tutor(&mut self, tutor: &TutorRecord) -> Result<(), DbError> {
        self.conn.execute(
            "
            INSERT INTO tutors (id, name, hourly_rate) VALUES (?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                name = excluded.name,
                hourly_rate = excluded.hourly_rate
            ",
            params![tutor.id, tutor.name, tutor.hourly_rate],
        )?;
        Ok(())
    }

    /// Fetches a tutor by id.
    pub fn get_tutor(&self, id: &str) -> Result<TutorRecord, DbError> {
        self.conn
            .query_row(
                "SELECT id, name, hourly_rate FROM tutors WHERE id = ?",
                [id],
                |row| {
                    Ok(TutorRecord {
                        id: row.get(0)?,
                        name: row.get(1)?,
                        hourly_rate: row.get(2)?,
                    })
                },
            )
            .map_err(|err| not_found_or("tutor", id, err))
    }

    /// Creates a session in `planned` status with its student enrollment.
    ///
    /// Rejects windows where the end does not come after the start, before
    /// any write. Attendance rows are created unmarked for each student.
    pub fn create_session(&mut self, session: &NewSession) -> Result<SessionRecord, DbError> {
        TimeSlot::new(session.date, session.start_time, session.end_time)?;
        if session.subject.is_empty() {
            return Err(ValidationError::Empty { field: "subject" }.into());
        }
        self.get_tutor(&session.tutor_id)?;

        let id = Uuid::new_v4().to_string();
        let now = format_timestamp(Utc::now());
        let tx = self.conn.transaction()?;
        tx.execute(
            "
            INSERT INTO sessions
            (id, date, start_time, end_time, tutor_id, class_id, subject, location,
             session_type, status, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ",
            params![
                id,
                format_date(session.date),
                format_time(session.start_time),
                format_time(session.end_time),
                session.tutor_id,
                session.class_id,
                session.subject,
                session.location.as_str(),
                session.session_type.as_str(),
                SessionStatus::Planned.as_str(),
                now,
                now,
            ],
        )?;
        {
            let mut stmt = tx.prepare(
                "INSERT OR IGNORE INTO attendance (session_id, student_id) VALUES (?, ?)",
            )?;
            for student_id in &session.student_ids {
                stmt.execute(params![id, student_id])?;
            }
        }
        tx.commit()?;

        debug!(session_id = %id, tutor_id = %session.tutor_id, "session created");
        self.get_session(&id)
    }

    /// Fetches a session by id.
    pub fn get_session(&self, id: &str) -> Result<SessionRecord, DbError> {
        self.conn
            .query_row(
                &format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE id = ?"),
                [id],
                map_session_row,
            )
            .map_err(|err| not_found_or("session", id, err))
    }

    /// Assigns a new status to a session.
    ///
    /// Any valid status may be assigned from any other; the enum itself is
    /// the only gate. Unknown ids are rejected with `NotFound`.
    pub fn update_session_status(
        &mut self,
        id: &str,
        status: SessionStatus,
    ) -> Result<SessionRecord, DbError> {
        let changed = self.conn.execute(
            "UPDATE sessions SET status = ?, updated_at = ? WHERE id = ?",
            params![status.as_str(), format_timestamp(Utc::now()), id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound {
                entity: "session",
                id: id.to_string(),
            });
        }
        debug!(session_id = %id, status = %status, "session status updated");
        self.get_session(id)
    }

    /// Records per-student attendance for a session.
    ///
    /// Upserts each `(session, student)` pair and sets `attendance_marked`.
    /// Idempotent: re-invocation overwrites prior statuses and leaves the
    /// marked flag set. Does not require the session to be completed.
    pub fn mark_attendance(
        &mut self,
        session_id: &str,
        records: &[(String, AttendanceStatus)],
    ) -> Result<SessionRecord, DbError> {
        let tx = self.conn.transaction()?;
        // Flag first so an unknown session reads as NotFound rather than a
        // foreign key violation from the attendance insert.
        let changed = tx.execute(
            "UPDATE sessions SET attendance_marked = 1, updated_at = ? WHERE id = ?",
            params![format_timestamp(Utc::now()), session_id],
        )?;
        if changed == 0 {
            return Err(DbError::NotFound {
                entity: "session",
                id: session_id.to_string(),
            });
        }
        {
            let mut stmt = tx.prepare(
                "
                INSERT INTO attendance (session_id, student_id, attendance_status)
                VALUES (?, ?, ?)
                ON CONFLICT(session_id, student_id) DO UPDATE SET
                    attendance_status = excluded.attendance_status
                ",
            )?;
            for (student_id, status) in records {
                if student_id.is_empty() {
                    return Err(ValidationError::Empty {
                        field: "student ID",
                    }
                    .into());
                }
                stmt.execute(params![session_id, student_id, status.as_str()])?;
            }
        }
        tx.commit()?;

        debug!(session_id, count = records.len(), "attendance marked");
        self.get_session(session_id)
    }

    /// Lists attendance entries for a session, ordered by student id.
    pub fn list_attendance(&self, session_id: &str) -> Result<Vec<AttendanceRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT session_id, student_id, attendance_status
            FROM attendance
            WHERE session_id = ?
            ORDER BY student_id ASC
            ",
        )?;
        let rows = stmt.query_map([session_id], |row| {
            let status: Option<String> = row.get(2)?;
            Ok(AttendanceRecord {
                session_id: row.get(0)?,
                student_id: row.get(1)?,
                attendance_status: status
                    .map(|s| parse_column(2, &s))
                    .transpose()?,
            })
        })?;
        let mut records = Vec::new();
        for row in rows {
            records.push(row?);
        }
        Ok(records)
    }

    /// Aggregated present/absent/late counts for a session.
    pub fn attendance_stats(&self, session_id: &str) -> Result<AttendanceStats, DbError> {
        let records = self.list_attendance(session_id)?;
        let total_students = records.len();
        let count = |status: AttendanceStatus| {
            records
                .iter()
                .filter(|r| r.attendance_status == Some(status))
                .count()
        };
        let present = count(AttendanceStatus::Present);
        #[expect(clippy::cast_precision_loss, reason = "roster sizes are tiny")]
        let attendance_rate = if total_students == 0 {
            0.0
        } else {
            round2(present as f64 / total_students as f64 * 100.0)
        };
        Ok(AttendanceStats {
            total_students,
            present,
            absent: count(AttendanceStatus::Absent),
            late: count(AttendanceStatus::Late),
            excused: count(AttendanceStatus::Excused),
            attendance_rate,
        })
    }

    /// Finds sessions of one tutor that overlap another session on the same
    /// date, restricted to `date >= from`.
    ///
    /// Overlap is half-open: sessions that merely touch at a boundary do not
    /// conflict. Purely advisory; scheduling is never blocked on the result.
    pub fn detect_conflicts(
        &self,
        tutor_id: &str,
        from: NaiveDate,
    ) -> Result<ConflictReport, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT DISTINCT a.id
            FROM sessions a
            JOIN sessions b
              ON b.tutor_id = a.tutor_id
             AND b.date = a.date
             AND b.id <> a.id
             AND a.start_time < b.end_time
             AND a.end_time > b.start_time
            WHERE a.tutor_id = ? AND a.date >= ?
            ORDER BY a.date ASC, a.start_time ASC, a.id ASC
            ",
        )?;
        let rows = stmt.query_map(params![tutor_id, format_date(from)], |row| {
            row.get::<_, String>(0)
        })?;
        let mut session_ids = Vec::new();
        for row in rows {
            session_ids.push(row?);
        }
        Ok(ConflictReport {
            count: session_ids.len(),
            session_ids,
        })
    }
}

/// Maps a `SELECT {SESSION_COLUMNS}` row to a typed record.
fn map_session_row(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let date: String = row.get(1)?;
    let start: String = row.get(2)?;
    let end: String = row.get(3)?;
    let session_type: String = row.get(8)?;
    let status: String = row.get(9)?;
    Ok(SessionRecord {
        id: row.get(0)?,
        date: parse_date_column(1, &date)?,
        start_time: parse_time_column(2, &start)?,
        end_time: parse_time_column(3, &end)?,
        tutor_id: row.get(4)?,
        class_id: row.get(5)?,
        subject: row.get(6)?,
        location: row.get(7)?,
        session_type: parse_column(8, &session_type)?,
        status: parse_column(9, &status)?,
        lesson_note: row.get(10)?,
        attendance_marked: row.get(11)?,
        ready_for_invoicing: row.get(12)?,
    })
}

/// Parses a stored enum value, surfacing corruption as a conversion failure.
pub(crate) fn parse_column<T: std::str::FromStr<Err = ValidationError>>(
    idx: usize,
    value: &str,
) -> rusqlite::Result<T> {
    value.parse().map_err(|err: ValidationError| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

pub(crate) fn parse_date_column(idx: usize, value: &str) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d").map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

pub(crate) fn parse_time_column(idx: usize, value: &str) -> rusqlite::Result<NaiveTime> {
    NaiveTime::parse_from_str(value, "%H:%M").map_err(|err| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(err))
    })
}

/// Collapses `QueryReturnedNoRows` into a typed `NotFound`.
pub(crate) fn not_found_or(entity: &'static str, id: &str, err: rusqlite::Error) -> DbError {
    if matches!(err, rusqlite::Error::QueryReturnedNoRows) {
        DbError::NotFound {
            entity,
            id: id.to_string(),
        }
    } else {
        DbError::Sqlite(err)
    }
}

pub(crate) fn format_date(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

pub(crate) fn format_time(time: NaiveTime) -> String {
    time.format("%H:%M").to_string()
}

pub(crate) fn format_timestamp(timestamp: DateTime<Utc>) -> String {
    timestamp.to_rfc3339_opts(SecondsFormat::Millis, true)
}
