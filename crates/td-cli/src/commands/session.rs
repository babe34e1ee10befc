//! Session lifecycle, attendance, and conflict commands.

use std::fmt::Write;

use anyhow::{Context, Result};
use chrono::{NaiveDate, NaiveTime};
use serde::Serialize;

use td_core::{ConflictReport, Location, SessionStatus, SessionType};
use td_db::{AttendanceStats, Database, NewSession};

use crate::cli::AttendanceRecordArg;

#[expect(
    clippy::too_many_arguments,
    reason = "mirrors the flag surface of the create subcommand"
)]
pub fn create(
    db: &mut Database,
    tutor: &str,
    date: NaiveDate,
    start: NaiveTime,
    end: NaiveTime,
    subject: &str,
    students: Vec<String>,
    location: Location,
    session_type: SessionType,
    class: Option<String>,
) -> Result<()> {
    let session = db
        .create_session(&NewSession {
            tutor_id: tutor.to_string(),
            date,
            start_time: start,
            end_time: end,
            student_ids: students,
            subject: subject.to_string(),
            location,
            session_type,
            class_id: class,
        })
        .context("failed to create session")?;
    println!(
        "Created session {} for {} on {} {}-{}",
        session.id,
        session.tutor_id,
        session.date,
        session.start_time.format("%H:%M"),
        session.end_time.format("%H:%M"),
    );
    Ok(())
}

pub fn set_status(db: &mut Database, session_id: &str, status: SessionStatus) -> Result<()> {
    let session = db
        .update_session_status(session_id, status)
        .context("failed to update session status")?;
    println!("Session {} is now {}", session.id, session.status);
    Ok(())
}

/// Records attendance and prints the resulting roster stats.
pub fn attendance(
    db: &mut Database,
    session_id: &str,
    records: &[AttendanceRecordArg],
) -> Result<()> {
    let pairs: Vec<(String, td_core::AttendanceStatus)> = records
        .iter()
        .map(|r| (r.student_id.clone(), r.status))
        .collect();
    db.mark_attendance(session_id, &pairs)
        .context("failed to record attendance")?;
    let stats = db
        .attendance_stats(session_id)
        .context("failed to load attendance stats")?;
    print!("{}", format_attendance_stats(session_id, &stats));
    Ok(())
}

/// Format roster stats for human-readable output.
fn format_attendance_stats(session_id: &str, stats: &AttendanceStats) -> String {
    let mut output = String::new();
    writeln!(output, "Attendance recorded for session {session_id}").unwrap();
    writeln!(
        output,
        "  {} students: {} present, {} absent, {} late, {} excused ({}% attendance)",
        stats.total_students,
        stats.present,
        stats.absent,
        stats.late,
        stats.excused,
        stats.attendance_rate,
    )
    .unwrap();
    output
}

/// Runs the conflicts command.
pub fn conflicts(db: &Database, tutor: &str, from: NaiveDate, json: bool) -> Result<()> {
    let report = db
        .detect_conflicts(tutor, from)
        .context("failed to detect conflicts")?;
    if json {
        println!("{}", format_conflicts_json(tutor, from, &report)?);
    } else {
        print!("{}", format_conflicts(tutor, from, &report));
    }
    Ok(())
}

/// Format the conflict report for human-readable output.
fn format_conflicts(tutor: &str, from: NaiveDate, report: &ConflictReport) -> String {
    let mut output = String::new();
    if report.count == 0 {
        writeln!(output, "No conflicts for {tutor} from {from}").unwrap();
        return output;
    }
    writeln!(
        output,
        "{} conflicting session(s) for {tutor} from {from}:",
        report.count
    )
    .unwrap();
    for id in &report.session_ids {
        writeln!(output, "  {id}").unwrap();
    }
    output
}

#[derive(Debug, Serialize)]
struct JsonConflicts<'a> {
    tutor_id: &'a str,
    from: String,
    count: usize,
    session_ids: &'a [String],
}

fn format_conflicts_json(tutor: &str, from: NaiveDate, report: &ConflictReport) -> Result<String> {
    Ok(serde_json::to_string_pretty(&JsonConflicts {
        tutor_id: tutor,
        from: from.format("%Y-%m-%d").to_string(),
        count: report.count,
        session_ids: &report.session_ids,
    })?)
}
