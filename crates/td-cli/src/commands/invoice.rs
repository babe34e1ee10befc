//! Invoice ledger commands.

use std::fmt::Write;

use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};

use td_core::InvoiceStatus;
use td_db::{Database, InvoiceFilter, InvoiceRecord, NewInvoice, NewInvoiceItem};

use crate::cli::InvoiceItemArg;

pub struct CreateArgs {
    pub number: Option<String>,
    pub tutor: Option<String>,
    pub student: Option<String>,
    pub parent: Option<String>,
    pub session: Option<String>,
    pub amount: Option<f64>,
    pub issue_date: NaiveDate,
    pub due_date: Option<NaiveDate>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub description: Option<String>,
    pub items: Vec<InvoiceItemArg>,
}

/// Runs `td invoice create`.
pub fn create(db: &mut Database, args: CreateArgs, json: bool) -> Result<()> {
    let invoice = db
        .create_invoice(&NewInvoice {
            invoice_number: args.number,
            tutor_id: args.tutor,
            student_id: args.student,
            parent_id: args.parent,
            session_id: args.session,
            amount: args.amount,
            currency: None,
            issue_date: args.issue_date,
            due_date: args.due_date,
            period_start: args.period_start,
            period_end: args.period_end,
            description: args.description,
            items: args
                .items
                .into_iter()
                .map(|item| NewInvoiceItem {
                    description: item.description,
                    amount: item.amount,
                    credits: item.credits,
                })
                .collect(),
        })
        .context("failed to create invoice")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&invoice)?);
    } else {
        println!(
            "Created invoice {} for {:.2} {} (due {})",
            invoice.invoice_number, invoice.amount, invoice.currency, invoice.due_date
        );
        println!("  id: {}", invoice.id);
    }
    Ok(())
}

pub fn pay(db: &mut Database, invoice_id: &str, method: &str, txn: Option<&str>) -> Result<()> {
    let invoice = db
        .mark_invoice_paid(invoice_id, method, txn)
        .context("failed to mark invoice paid")?;
    println!(
        "Invoice {} paid via {} ({:.2} {})",
        invoice.invoice_number, method, invoice.amount, invoice.currency
    );
    Ok(())
}

pub fn cancel(db: &mut Database, invoice_id: &str) -> Result<()> {
    let invoice = db
        .cancel_invoice(invoice_id)
        .context("failed to cancel invoice")?;
    println!("Invoice {} cancelled", invoice.invoice_number);
    Ok(())
}

/// Runs `td invoice list`.
pub fn list(
    db: &Database,
    tutor: Option<String>,
    status: Option<InvoiceStatus>,
    json: bool,
) -> Result<()> {
    let invoices = db
        .list_invoices(&InvoiceFilter {
            tutor_id: tutor,
            status,
            session_id: None,
        })
        .context("failed to list invoices")?;
    if json {
        println!("{}", serde_json::to_string_pretty(&invoices)?);
    } else {
        print!("{}", format_invoice_list(&invoices));
    }
    Ok(())
}

/// Runs `td invoice sweep-overdue` against today's local date.
pub fn sweep_overdue(db: &mut Database) -> Result<()> {
    let today = Local::now().date_naive();
    let updated = db
        .sweep_overdue_invoices(today)
        .context("failed to sweep overdue invoices")?;
    println!("{updated} invoice(s) moved to overdue");
    Ok(())
}

/// Format invoices as a fixed-width table.
fn format_invoice_list(invoices: &[InvoiceRecord]) -> String {
    let mut output = String::new();
    if invoices.is_empty() {
        writeln!(output, "No invoices.").unwrap();
        return output;
    }
    writeln!(
        output,
        "{:<32}  {:<10}  {:>10}  {:<10}  {:<10}  Tutor",
        "Number", "Status", "Amount", "Issued", "Due"
    )
    .unwrap();
    for invoice in invoices {
        writeln!(
            output,
            "{:<32}  {:<10}  {:>10.2}  {:<10}  {:<10}  {}",
            invoice.invoice_number,
            invoice.status.as_str(),
            invoice.amount,
            invoice.issue_date,
            invoice.due_date,
            invoice.tutor_id.as_deref().unwrap_or("-"),
        )
        .unwrap();
    }
    output
}
