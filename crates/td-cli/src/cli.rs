//! Command-line argument definitions.

use std::path::PathBuf;

use chrono::{NaiveDate, NaiveTime};
use clap::{Parser, Subcommand};

use td_core::{AttendanceStatus, InvoiceStatus, Location, SessionStatus, SessionType};

/// Tutoring back-office CLI.
///
/// Manages tutors, sessions, attendance, and the timesheet-to-invoice
/// billing pipeline on top of a local SQLite database.
#[derive(Debug, Parser)]
#[command(name = "td", version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output.
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Path to config file.
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available subcommands.
#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Manage tutors.
    Tutor {
        #[command(subcommand)]
        action: TutorAction,
    },

    /// Manage sessions and attendance.
    Session {
        #[command(subcommand)]
        action: SessionAction,
    },

    /// Weekly timesheet operations.
    Timesheet {
        #[command(subcommand)]
        action: TimesheetAction,
    },

    /// Manage the invoice ledger.
    Invoice {
        #[command(subcommand)]
        action: InvoiceAction,
    },

    /// Reporting queries.
    Report {
        #[command(subcommand)]
        action: ReportAction,
    },
}

#[derive(Debug, Subcommand)]
pub enum TutorAction {
    /// Add a tutor or update an existing one.
    Add {
        /// Tutor identifier.
        #[arg(long)]
        id: String,

        /// Display name.
        #[arg(long)]
        name: String,

        /// Hourly rate; omitted means the default rate applies.
        #[arg(long)]
        rate: Option<f64>,
    },
}

#[derive(Debug, Subcommand)]
pub enum SessionAction {
    /// Create a session with its student roster.
    Create {
        /// Tutor identifier.
        #[arg(long)]
        tutor: String,

        /// Session date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date_arg)]
        date: NaiveDate,

        /// Start time (HH:MM).
        #[arg(long, value_parser = parse_time_arg)]
        start: NaiveTime,

        /// End time (HH:MM), must be after start.
        #[arg(long, value_parser = parse_time_arg)]
        end: NaiveTime,

        /// Subject taught.
        #[arg(long)]
        subject: String,

        /// Student identifiers; repeat for each student.
        #[arg(long = "student")]
        students: Vec<String>,

        /// Where the session takes place.
        #[arg(long, default_value = "online", value_parser = parse_location_arg)]
        location: Location,

        /// Session format.
        #[arg(long = "type", default_value = "one-to-one", value_parser = parse_session_type_arg)]
        session_type: SessionType,

        /// Optional class identifier for group sessions.
        #[arg(long)]
        class: Option<String>,
    },

    /// Change a session's status.
    SetStatus {
        /// Session identifier.
        session_id: String,

        /// New status.
        #[arg(value_parser = parse_status_arg)]
        status: SessionStatus,
    },

    /// Record per-student attendance for a session.
    Attendance {
        /// Session identifier.
        session_id: String,

        /// One record per student, as student=status.
        #[arg(long = "record", required = true, value_parser = parse_attendance_record)]
        records: Vec<AttendanceRecordArg>,
    },

    /// Detect double-booked sessions for a tutor.
    Conflicts {
        /// Tutor identifier.
        #[arg(long)]
        tutor: String,

        /// Only consider sessions on or after this date.
        #[arg(long, value_parser = parse_date_arg)]
        from: NaiveDate,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum TimesheetAction {
    /// Approve a tutor's weekly timesheet and generate the invoice.
    Approve {
        /// Tutor identifier.
        #[arg(long)]
        tutor: String,

        /// Last day of the 7-day billing window (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date_arg)]
        week_ending: NaiveDate,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(Debug, Subcommand)]
pub enum InvoiceAction {
    /// Create an invoice with line items.
    Create {
        /// Explicit invoice number; generated when omitted.
        #[arg(long)]
        number: Option<String>,

        /// Tutor the invoice belongs to.
        #[arg(long)]
        tutor: Option<String>,

        /// Student the invoice belongs to.
        #[arg(long)]
        student: Option<String>,

        /// Parent the invoice belongs to.
        #[arg(long)]
        parent: Option<String>,

        /// Session to bill; the session is consumed for billing.
        #[arg(long)]
        session: Option<String>,

        /// Total amount; defaults to the sum of item amounts.
        #[arg(long)]
        amount: Option<f64>,

        /// Issue date (YYYY-MM-DD).
        #[arg(long, value_parser = parse_date_arg)]
        issue_date: NaiveDate,

        /// Due date; defaults to 30 days after issue.
        #[arg(long, value_parser = parse_date_arg)]
        due_date: Option<NaiveDate>,

        /// Billing period start.
        #[arg(long, value_parser = parse_date_arg)]
        period_start: Option<NaiveDate>,

        /// Billing period end.
        #[arg(long, value_parser = parse_date_arg)]
        period_end: Option<NaiveDate>,

        /// Free-form description.
        #[arg(long)]
        description: Option<String>,

        /// Line items, as "description=amount" or "description=amount@credits".
        #[arg(long = "item", value_parser = parse_invoice_item)]
        items: Vec<InvoiceItemArg>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Mark an invoice as paid.
    Pay {
        /// Invoice identifier.
        invoice_id: String,

        /// Payment method (e.g. bank-transfer, cash).
        #[arg(long)]
        method: String,

        /// External transaction reference.
        #[arg(long)]
        txn: Option<String>,
    },

    /// Cancel an unpaid invoice.
    Cancel {
        /// Invoice identifier.
        invoice_id: String,
    },

    /// List invoices.
    List {
        /// Only invoices for this tutor.
        #[arg(long)]
        tutor: Option<String>,

        /// Only invoices in this status.
        #[arg(long, value_parser = parse_invoice_status_arg)]
        status: Option<InvoiceStatus>,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Move pending invoices past their due date to overdue.
    SweepOverdue,
}

#[derive(Debug, Subcommand)]
pub enum ReportAction {
    /// Hours and earnings report over a tutor's completed sessions.
    Hours {
        /// Tutor identifier.
        #[arg(long)]
        tutor: String,

        /// Only sessions on or after this date.
        #[arg(long, value_parser = parse_date_arg)]
        from: Option<NaiveDate>,

        /// Only sessions on or before this date.
        #[arg(long, value_parser = parse_date_arg)]
        to: Option<NaiveDate>,

        /// Only sessions billed through a paid invoice.
        #[arg(long, conflicts_with = "unpaid")]
        paid: bool,

        /// Only sessions not yet paid out.
        #[arg(long)]
        unpaid: bool,

        /// Output as JSON.
        #[arg(long)]
        json: bool,
    },
}

/// A single student=status attendance record.
#[derive(Debug, Clone)]
pub struct AttendanceRecordArg {
    pub student_id: String,
    pub status: AttendanceStatus,
}

/// A single description=amount[@credits] line item.
#[derive(Debug, Clone)]
pub struct InvoiceItemArg {
    pub description: String,
    pub amount: f64,
    pub credits: Option<f64>,
}

fn parse_date_arg(value: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(value, "%Y-%m-%d")
        .map_err(|_| format!("invalid date '{value}', expected YYYY-MM-DD"))
}

fn parse_time_arg(value: &str) -> Result<NaiveTime, String> {
    NaiveTime::parse_from_str(value, "%H:%M")
        .map_err(|_| format!("invalid time '{value}', expected HH:MM"))
}

fn parse_status_arg(value: &str) -> Result<SessionStatus, String> {
    value.parse::<SessionStatus>().map_err(|err| err.to_string())
}

fn parse_location_arg(value: &str) -> Result<Location, String> {
    value.parse::<Location>().map_err(|err| err.to_string())
}

fn parse_session_type_arg(value: &str) -> Result<SessionType, String> {
    value.parse::<SessionType>().map_err(|err| err.to_string())
}

fn parse_invoice_status_arg(value: &str) -> Result<InvoiceStatus, String> {
    value.parse::<InvoiceStatus>().map_err(|err| err.to_string())
}

fn parse_attendance_record(value: &str) -> Result<AttendanceRecordArg, String> {
    let (student, status) = value
        .split_once('=')
        .ok_or_else(|| format!("invalid record '{value}', expected student=status"))?;
    if student.is_empty() {
        return Err(format!("invalid record '{value}', student id is empty"));
    }
    Ok(AttendanceRecordArg {
        student_id: student.to_string(),
        status: status.parse().map_err(|err: td_core::ValidationError| err.to_string())?,
    })
}

fn parse_invoice_item(value: &str) -> Result<InvoiceItemArg, String> {
    let (description, rest) = value
        .split_once('=')
        .ok_or_else(|| format!("invalid item '{value}', expected description=amount"))?;
    if description.is_empty() {
        return Err(format!("invalid item '{value}', description is empty"));
    }
    let (amount, credits) = match rest.split_once('@') {
        Some((amount, credits)) => {
            let credits: f64 = credits
                .parse()
                .map_err(|_| format!("invalid credits in item '{value}'"))?;
            (amount, Some(credits))
        }
        None => (rest, None),
    };
    let amount: f64 = amount
        .parse()
        .map_err(|_| format!("invalid amount in item '{value}'"))?;
    Ok(InvoiceItemArg {
        description: description.to_string(),
        amount,
        credits,
    })
}
