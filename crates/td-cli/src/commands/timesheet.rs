//! Timesheet approval command.

use std::fmt::Write;

use anyhow::{Context, Result};
use chrono::NaiveDate;

use td_db::{Database, DbError, InvoiceRecord};

/// Runs `td timesheet approve`.
///
/// An empty eligible selection is reported as a normal failure with the
/// specific reason rather than a silent zero-amount invoice.
pub fn approve(db: &mut Database, tutor: &str, week_ending: NaiveDate, json: bool) -> Result<()> {
    let invoice = match db.approve_timesheet(tutor, week_ending) {
        Ok(invoice) => invoice,
        Err(DbError::NoEligibleWork(reason)) => {
            anyhow::bail!("cannot approve timesheet for {tutor}: {}", reason.message());
        }
        Err(err) => return Err(err).context("failed to approve timesheet"),
    };
    if json {
        println!("{}", serde_json::to_string_pretty(&invoice)?);
    } else {
        let items = db
            .invoice_items(&invoice.id)
            .context("failed to load invoice items")?;
        let summary = items.first().map_or("", |item| item.description.as_str());
        print!("{}", format_approval(&invoice, summary));
    }
    Ok(())
}

/// Format the generated invoice for human-readable output.
fn format_approval(invoice: &InvoiceRecord, summary: &str) -> String {
    let mut output = String::new();
    writeln!(output, "Timesheet approved").unwrap();
    writeln!(output, "  Invoice:  {}", invoice.invoice_number).unwrap();
    writeln!(output, "  Amount:   {:.2} {}", invoice.amount, invoice.currency).unwrap();
    if let (Some(start), Some(end)) = (invoice.period_start, invoice.period_end) {
        writeln!(output, "  Period:   {start} to {end}").unwrap();
    }
    writeln!(output, "  Due:      {}", invoice.due_date).unwrap();
    if !summary.is_empty() {
        writeln!(output, "  Work:     {summary}").unwrap();
    }
    output
}
