//! Hours report command.

use std::fmt::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use td_db::{Database, HoursReport, HoursReportFilter};

/// Runs `td report hours`.
pub fn hours(
    db: &Database,
    tutor: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    paid: Option<bool>,
    json: bool,
) -> Result<()> {
    let report = db
        .tutor_hours_report(tutor, &HoursReportFilter { from, to, paid })
        .context("failed to build hours report")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print!("{}", format_hours_report(&report));
    }
    Ok(())
}

/// Format the report for human-readable output.
fn format_hours_report(report: &HoursReport) -> String {
    let mut output = String::new();
    writeln!(
        output,
        "Hours for {} (rate {:.2}/h)",
        report.tutor_id, report.hourly_rate
    )
    .unwrap();
    writeln!(output).unwrap();

    if report.sessions.is_empty() {
        writeln!(output, "No completed sessions in range.").unwrap();
        return output;
    }

    writeln!(
        output,
        "{:<10}  {:<5}  {:<5}  {:<16}  {:>6}  {:>9}  {:<7}  Paid",
        "Date", "Start", "End", "Subject", "Hours", "Earnings", "Where"
    )
    .unwrap();
    for row in &report.sessions {
        // Truncate by characters, not bytes, to avoid panics on multi-byte UTF-8
        let subject = if row.subject.chars().count() > 16 {
            format!("{}...", row.subject.chars().take(13).collect::<String>())
        } else {
            row.subject.clone()
        };
        writeln!(
            output,
            "{:<10}  {:<5}  {:<5}  {:<16}  {:>6.2}  {:>9.2}  {:<7}  {}",
            row.date,
            row.start_time.format("%H:%M"),
            row.end_time.format("%H:%M"),
            subject,
            row.hours,
            row.earnings,
            if row.online { "online" } else { "offline" },
            if row.paid { "yes" } else { "no" },
        )
        .unwrap();
    }

    let s = &report.summary;
    writeln!(output).unwrap();
    writeln!(
        output,
        "Total: {} sessions, {:.2}h ({:.2}h online, {:.2}h offline), earnings {:.2}",
        s.total_sessions, s.total_hours, s.online_hours, s.offline_hours, s.total_earnings
    )
    .unwrap();
    writeln!(
        output,
        "Paid: {:.2}h / {:.2}   Pending: {:.2}h / {:.2}",
        s.paid_hours, s.paid_earnings, s.pending_hours, s.pending_earnings
    )
    .unwrap();
    output
}
