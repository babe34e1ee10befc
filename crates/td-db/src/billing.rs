//! Invoice generation and the invoice ledger.
//!
//! The timesheet approval here is the one critical section in the system:
//! selecting a tutor's unbilled work, flagging it consumed, and creating the
//! invoice must be a single transaction, with the flag update re-checking
//! `ready_for_invoicing = 0` so two concurrent approvals can never bill the
//! same session twice. Invoice numbers lean on the UNIQUE constraint with a
//! bounded retry instead of trusting a count+1 read.

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{Connection, Row, params, params_from_iter};
use serde::Serialize;
use tracing::{debug, info};
use uuid::Uuid;

use td_core::{
    DEFAULT_HOURLY_RATE, InvoiceStatus, NoEligibleWorkReason, TimeSlot, TimesheetTotals,
    ValidationError, monthly_invoice_number, round2, timesheet_invoice_number, week_window,
};

use crate::{
    Database, DbError, format_date, format_timestamp, not_found_or, parse_date_column,
    parse_time_column,
};

/// How many bumped sequence numbers to try before giving up on a collision.
const NUMBER_RETRY_LIMIT: u32 = 25;

/// A stored invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceRecord {
    pub id: String,
    pub invoice_number: String,
    pub tutor_id: Option<String>,
    pub student_id: Option<String>,
    pub parent_id: Option<String>,
    pub session_id: Option<String>,
    pub amount: f64,
    pub currency: String,
    pub status: InvoiceStatus,
    pub issue_date: NaiveDate,
    pub due_date: NaiveDate,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub description: Option<String>,
    pub paid_date: Option<String>,
    pub payment_method: Option<String>,
    pub transaction_id: Option<String>,
}

/// A line item belonging to exactly one invoice.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InvoiceItemRecord {
    pub id: i64,
    pub invoice_id: String,
    pub description: String,
    pub amount: f64,
    pub credits: Option<f64>,
}

/// Input line item for the general invoice creation path.
#[derive(Debug, Clone)]
pub struct NewInvoiceItem {
    pub description: String,
    pub amount: f64,
    pub credits: Option<f64>,
}

/// Input for the general invoice creation path.
#[derive(Debug, Clone, Default)]
pub struct NewInvoice {
    /// Explicit number, which must be unused; generated when `None`.
    pub invoice_number: Option<String>,
    pub tutor_id: Option<String>,
    pub student_id: Option<String>,
    pub parent_id: Option<String>,
    /// Ties the invoice to a single session and consumes it for billing.
    pub session_id: Option<String>,
    /// Defaults to the sum of item amounts.
    pub amount: Option<f64>,
    pub currency: Option<String>,
    pub issue_date: NaiveDate,
    /// Defaults to 30 days after the issue date.
    pub due_date: Option<NaiveDate>,
    pub period_start: Option<NaiveDate>,
    pub period_end: Option<NaiveDate>,
    pub description: Option<String>,
    pub items: Vec<NewInvoiceItem>,
}

/// Filters for the invoice ledger listing.
#[derive(Debug, Clone, Default)]
pub struct InvoiceFilter {
    pub tutor_id: Option<String>,
    pub status: Option<InvoiceStatus>,
    pub session_id: Option<String>,
}

const INVOICE_COLUMNS: &str = "id, invoice_number, tutor_id, student_id, parent_id, session_id, \
     amount, currency, status, issue_date, due_date, period_start, period_end, description, \
     paid_date, payment_method, transaction_id";

#[derive(Debug)]
struct EligibleSession {
    id: String,
    slot: TimeSlot,
    location: String,
}

impl Database {
    /// Approves a tutor's weekly timesheet and generates the invoice.
    ///
    /// Selects the tutor's attendance-marked, not-yet-invoiced sessions in
    /// the inclusive 7-day window ending on `week_ending`, flags them
    /// consumed, and creates one pending invoice with a single summary item.
    /// All of it happens in one transaction; a concurrent approval claiming
    /// any candidate session aborts the whole operation.
    ///
    /// An empty selection never succeeds silently: the error carries whether
    /// no sessions exist, attendance is unmarked, or the week is already
    /// invoiced.
    pub fn approve_timesheet(
        &mut self,
        tutor_id: &str,
        week_ending: NaiveDate,
    ) -> Result<InvoiceRecord, DbError> {
        self.approve_timesheet_at(tutor_id, week_ending, Utc::now())
    }

    pub(crate) fn approve_timesheet_at(
        &mut self,
        tutor_id: &str,
        week_ending: NaiveDate,
        now: DateTime<Utc>,
    ) -> Result<InvoiceRecord, DbError> {
        let (week_start, week_end) = week_window(week_ending);
        debug!(
            tutor_id,
            week_start = %week_start,
            week_end = %week_end,
            "timesheet approval requested"
        );

        let tx = self.conn.transaction()?;
        let eligible = eligible_sessions(&tx, tutor_id, week_start, week_end)?;
        if eligible.is_empty() {
            let reason = classify_empty_selection(&tx, tutor_id, week_start, week_end)?;
            return Err(DbError::NoEligibleWork(reason));
        }

        let hourly_rate = tutor_rate(&tx, tutor_id)?;
        let mut totals = TimesheetTotals::default();
        for session in &eligible {
            totals.add(&session.slot, &session.location);
        }
        let amount = totals.amount(hourly_rate);

        // Consume the sessions, re-checking the flag so a concurrent approval
        // that claimed any of them forces a full abort.
        let mut flag_params: Vec<String> = vec![format_timestamp(now)];
        flag_params.extend(eligible.iter().map(|s| s.id.clone()));
        let placeholders = vec!["?"; eligible.len()].join(", ");
        let changed = tx.execute(
            &format!(
                "UPDATE sessions SET ready_for_invoicing = 1, updated_at = ? \
                 WHERE id IN ({placeholders}) AND ready_for_invoicing = 0"
            ),
            params_from_iter(flag_params.iter()),
        )?;
        if changed != eligible.len() {
            return Err(DbError::ConcurrentClaim);
        }

        let issue_date = now.date_naive();
        let due_date = issue_date + chrono::Duration::days(30);
        let invoice_id = Uuid::new_v4().to_string();
        let description = format!("Tutor timesheet for week ending {week_end}");
        let base_sequence: u32 = tx.query_row(
            "SELECT COUNT(*) FROM invoices WHERE tutor_id = ?",
            [tutor_id],
            |row| row.get::<_, u32>(0),
        )? + 1;

        let mut invoice_number = None;
        for attempt in 0..NUMBER_RETRY_LIMIT {
            let candidate =
                timesheet_invoice_number(tutor_id, issue_date, base_sequence + attempt);
            match insert_invoice(
                &tx,
                &InvoiceInsert {
                    id: &invoice_id,
                    invoice_number: &candidate,
                    tutor_id: Some(tutor_id),
                    student_id: None,
                    parent_id: None,
                    session_id: None,
                    amount,
                    currency: "USD",
                    issue_date,
                    due_date,
                    period_start: Some(week_start),
                    period_end: Some(week_end),
                    description: Some(&description),
                },
                now,
            ) {
                Ok(()) => {
                    invoice_number = Some(candidate);
                    break;
                }
                Err(err) if is_unique_violation(&err) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        let Some(invoice_number) = invoice_number else {
            return Err(DbError::DuplicateInvoiceNumber {
                number: timesheet_invoice_number(tutor_id, issue_date, base_sequence),
            });
        };

        tx.execute(
            "INSERT INTO invoice_items (invoice_id, description, amount) VALUES (?, ?, ?)",
            params![invoice_id, totals.summary(), amount],
        )?;
        tx.commit()?;

        info!(
            tutor_id,
            invoice_number,
            sessions = eligible.len(),
            amount,
            "timesheet approved"
        );
        self.get_invoice(&invoice_id)
    }

    /// Creates an invoice with line items.
    ///
    /// Explicit invoice numbers must be unused, otherwise the call fails and
    /// nothing is persisted; omitted numbers are generated from a monthly
    /// sequence with retry on collision. The amount defaults to the sum of
    /// item amounts, and a linked session is flagged `ready_for_invoicing`
    /// in the same transaction.
    pub fn create_invoice(&mut self, new: &NewInvoice) -> Result<InvoiceRecord, DbError> {
        self.create_invoice_at(new, Utc::now())
    }

    pub(crate) fn create_invoice_at(
        &mut self,
        new: &NewInvoice,
        now: DateTime<Utc>,
    ) -> Result<InvoiceRecord, DbError> {
        for item in &new.items {
            if item.description.is_empty() {
                return Err(ValidationError::Empty {
                    field: "item description",
                }
                .into());
            }
            if item.amount < 0.0 {
                return Err(ValidationError::NegativeAmount { value: item.amount }.into());
            }
        }
        let amount = match new.amount {
            Some(amount) if amount < 0.0 => {
                return Err(ValidationError::NegativeAmount { value: amount }.into());
            }
            Some(amount) => amount,
            None => {
                if new.items.is_empty() {
                    return Err(ValidationError::Empty { field: "items" }.into());
                }
                round2(new.items.iter().map(|item| item.amount).sum())
            }
        };
        let due_date = new
            .due_date
            .unwrap_or(new.issue_date + chrono::Duration::days(30));

        let invoice_id = Uuid::new_v4().to_string();
        let tx = self.conn.transaction()?;

        if let Some(session_id) = &new.session_id {
            let changed = tx.execute(
                "UPDATE sessions SET ready_for_invoicing = 1, updated_at = ? WHERE id = ?",
                params![format_timestamp(now), session_id],
            )?;
            if changed == 0 {
                return Err(DbError::NotFound {
                    entity: "session",
                    id: session_id.clone(),
                });
            }
        }

        let insert = |number: &str| {
            insert_invoice(
                &tx,
                &InvoiceInsert {
                    id: &invoice_id,
                    invoice_number: number,
                    tutor_id: new.tutor_id.as_deref(),
                    student_id: new.student_id.as_deref(),
                    parent_id: new.parent_id.as_deref(),
                    session_id: new.session_id.as_deref(),
                    amount,
                    currency: new.currency.as_deref().unwrap_or("USD"),
                    issue_date: new.issue_date,
                    due_date,
                    period_start: new.period_start,
                    period_end: new.period_end,
                    description: new.description.as_deref(),
                },
                now,
            )
        };

        if let Some(number) = &new.invoice_number {
            if number.is_empty() {
                return Err(ValidationError::Empty {
                    field: "invoice number",
                }
                .into());
            }
            insert(number).map_err(|err| {
                if is_unique_violation(&err) {
                    DbError::DuplicateInvoiceNumber {
                        number: number.clone(),
                    }
                } else {
                    err.into()
                }
            })?;
        } else {
            let month_prefix = new.issue_date.format("INV-%Y-%m-").to_string();
            let base_sequence: u32 = tx.query_row(
                "SELECT COUNT(*) FROM invoices WHERE invoice_number LIKE ? || '%'",
                [&month_prefix],
                |row| row.get::<_, u32>(0),
            )? + 1;
            let mut inserted = false;
            for attempt in 0..NUMBER_RETRY_LIMIT {
                let candidate = monthly_invoice_number(new.issue_date, base_sequence + attempt);
                match insert(&candidate) {
                    Ok(()) => {
                        inserted = true;
                        break;
                    }
                    Err(err) if is_unique_violation(&err) => continue,
                    Err(err) => return Err(err.into()),
                }
            }
            if !inserted {
                return Err(DbError::DuplicateInvoiceNumber {
                    number: monthly_invoice_number(new.issue_date, base_sequence),
                });
            }
        }

        {
            let mut stmt = tx.prepare(
                "INSERT INTO invoice_items (invoice_id, description, amount, credits) \
                 VALUES (?, ?, ?, ?)",
            )?;
            for item in &new.items {
                stmt.execute(params![invoice_id, item.description, item.amount, item.credits])?;
            }
        }
        tx.commit()?;

        debug!(invoice_id = %invoice_id, "invoice created");
        self.get_invoice(&invoice_id)
    }

    /// Fetches an invoice by id.
    pub fn get_invoice(&self, id: &str) -> Result<InvoiceRecord, DbError> {
        self.conn
            .query_row(
                &format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE id = ?"),
                [id],
                map_invoice_row,
            )
            .map_err(|err| not_found_or("invoice", id, err))
    }

    /// Lists an invoice's line items in insertion order.
    pub fn invoice_items(&self, invoice_id: &str) -> Result<Vec<InvoiceItemRecord>, DbError> {
        let mut stmt = self.conn.prepare(
            "
            SELECT id, invoice_id, description, amount, credits
            FROM invoice_items
            WHERE invoice_id = ?
            ORDER BY id ASC
            ",
        )?;
        let rows = stmt.query_map([invoice_id], |row| {
            Ok(InvoiceItemRecord {
                id: row.get(0)?,
                invoice_id: row.get(1)?,
                description: row.get(2)?,
                amount: row.get(3)?,
                credits: row.get(4)?,
            })
        })?;
        let mut items = Vec::new();
        for row in rows {
            items.push(row?);
        }
        Ok(items)
    }

    /// Lists invoices matching the filter, newest issue date first.
    pub fn list_invoices(&self, filter: &InvoiceFilter) -> Result<Vec<InvoiceRecord>, DbError> {
        let mut sql = format!("SELECT {INVOICE_COLUMNS} FROM invoices WHERE 1 = 1");
        let mut args: Vec<String> = Vec::new();
        if let Some(tutor_id) = &filter.tutor_id {
            sql.push_str(" AND tutor_id = ?");
            args.push(tutor_id.clone());
        }
        if let Some(status) = filter.status {
            sql.push_str(" AND status = ?");
            args.push(status.as_str().to_string());
        }
        if let Some(session_id) = &filter.session_id {
            sql.push_str(" AND session_id = ?");
            args.push(session_id.clone());
        }
        sql.push_str(" ORDER BY issue_date DESC, invoice_number DESC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map_invoice_row)?;
        let mut invoices = Vec::new();
        for row in rows {
            invoices.push(row?);
        }
        Ok(invoices)
    }

    /// Marks a pending or overdue invoice as paid.
    ///
    /// The only transition into `paid`, and one-directional: paying an
    /// already-paid or cancelled invoice is rejected.
    pub fn mark_invoice_paid(
        &mut self,
        id: &str,
        payment_method: &str,
        transaction_id: Option<&str>,
    ) -> Result<InvoiceRecord, DbError> {
        self.mark_invoice_paid_at(id, payment_method, transaction_id, Utc::now())
    }

    pub(crate) fn mark_invoice_paid_at(
        &mut self,
        id: &str,
        payment_method: &str,
        transaction_id: Option<&str>,
        now: DateTime<Utc>,
    ) -> Result<InvoiceRecord, DbError> {
        let invoice = self.get_invoice(id)?;
        match invoice.status {
            InvoiceStatus::Paid => {
                return Err(DbError::InvalidState {
                    message: format!("invoice {} is already paid", invoice.invoice_number),
                });
            }
            InvoiceStatus::Cancelled => {
                return Err(DbError::InvalidState {
                    message: format!(
                        "invoice {} is cancelled and cannot be paid",
                        invoice.invoice_number
                    ),
                });
            }
            InvoiceStatus::Pending | InvoiceStatus::Overdue => {}
        }
        self.conn.execute(
            "
            UPDATE invoices
            SET status = ?, paid_date = ?, payment_method = ?, transaction_id = ?
            WHERE id = ?
            ",
            params![
                InvoiceStatus::Paid.as_str(),
                format_timestamp(now),
                payment_method,
                transaction_id,
                id,
            ],
        )?;
        info!(invoice_id = %id, payment_method, "invoice marked paid");
        self.get_invoice(id)
    }

    /// Cancels an invoice. Paid invoices cannot be cancelled.
    pub fn cancel_invoice(&mut self, id: &str) -> Result<InvoiceRecord, DbError> {
        let invoice = self.get_invoice(id)?;
        if invoice.status == InvoiceStatus::Paid {
            return Err(DbError::InvalidState {
                message: format!(
                    "invoice {} is paid and cannot be cancelled",
                    invoice.invoice_number
                ),
            });
        }
        self.conn.execute(
            "UPDATE invoices SET status = ? WHERE id = ?",
            params![InvoiceStatus::Cancelled.as_str(), id],
        )?;
        self.get_invoice(id)
    }

    /// Moves every pending invoice past its due date to `overdue`.
    ///
    /// Idempotent, and never touches paid or cancelled invoices regardless
    /// of due date. Returns the number of rows updated.
    pub fn sweep_overdue_invoices(&mut self, today: NaiveDate) -> Result<usize, DbError> {
        let updated = self.conn.execute(
            "UPDATE invoices SET status = ? WHERE status = ? AND due_date < ?",
            params![
                InvoiceStatus::Overdue.as_str(),
                InvoiceStatus::Pending.as_str(),
                format_date(today),
            ],
        )?;
        if updated > 0 {
            info!(updated, "invoices swept to overdue");
        }
        Ok(updated)
    }
}

struct InvoiceInsert<'a> {
    id: &'a str,
    invoice_number: &'a str,
    tutor_id: Option<&'a str>,
    student_id: Option<&'a str>,
    parent_id: Option<&'a str>,
    session_id: Option<&'a str>,
    amount: f64,
    currency: &'a str,
    issue_date: NaiveDate,
    due_date: NaiveDate,
    period_start: Option<NaiveDate>,
    period_end: Option<NaiveDate>,
    description: Option<&'a str>,
}

fn insert_invoice(
    conn: &Connection,
    invoice: &InvoiceInsert<'_>,
    now: DateTime<Utc>,
) -> rusqlite::Result<()> {
    conn.execute(
        "
        INSERT INTO invoices
        (id, invoice_number, tutor_id, student_id, parent_id, session_id, amount, currency,
         status, issue_date, due_date, period_start, period_end, description, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ",
        params![
            invoice.id,
            invoice.invoice_number,
            invoice.tutor_id,
            invoice.student_id,
            invoice.parent_id,
            invoice.session_id,
            invoice.amount,
            invoice.currency,
            InvoiceStatus::Pending.as_str(),
            format_date(invoice.issue_date),
            format_date(invoice.due_date),
            invoice.period_start.map(format_date),
            invoice.period_end.map(format_date),
            invoice.description,
            format_timestamp(now),
        ],
    )?;
    Ok(())
}

fn is_unique_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(e, Some(msg))
            if e.code == rusqlite::ErrorCode::ConstraintViolation
                && msg.contains("invoice_number")
    )
}

fn eligible_sessions(
    conn: &Connection,
    tutor_id: &str,
    week_start: NaiveDate,
    week_end: NaiveDate,
) -> Result<Vec<EligibleSession>, DbError> {
    let mut stmt = conn.prepare(
        "
        SELECT id, date, start_time, end_time, location
        FROM sessions
        WHERE tutor_id = ?
          AND attendance_marked = 1
          AND date >= ? AND date <= ?
          AND ready_for_invoicing = 0
        ORDER BY date ASC, start_time ASC
        ",
    )?;
    let rows = stmt.query_map(
        params![tutor_id, format_date(week_start), format_date(week_end)],
        |row| {
            let date: String = row.get(1)?;
            let start: String = row.get(2)?;
            let end: String = row.get(3)?;
            Ok((
                row.get::<_, String>(0)?,
                parse_date_column(1, &date)?,
                parse_time_column(2, &start)?,
                parse_time_column(3, &end)?,
                row.get::<_, String>(4)?,
            ))
        },
    )?;
    let mut sessions = Vec::new();
    for row in rows {
        let (id, date, start, end, location) = row?;
        sessions.push(EligibleSession {
            id,
            slot: TimeSlot::new(date, start, end)?,
            location,
        });
    }
    Ok(sessions)
}

/// Explains an empty eligible-session selection.
fn classify_empty_selection(
    conn: &Connection,
    tutor_id: &str,
    week_start: NaiveDate,
    week_end: NaiveDate,
) -> Result<NoEligibleWorkReason, DbError> {
    let count_where = |extra: &str| -> Result<i64, rusqlite::Error> {
        conn.query_row(
            &format!(
                "SELECT COUNT(*) FROM sessions \
                 WHERE tutor_id = ? AND date >= ? AND date <= ?{extra}"
            ),
            params![tutor_id, format_date(week_start), format_date(week_end)],
            |row| row.get(0),
        )
    };
    let total = count_where("")?;
    if total == 0 {
        return Ok(NoEligibleWorkReason::NoSessions);
    }
    let marked = count_where(" AND attendance_marked = 1")?;
    if marked == 0 {
        return Ok(NoEligibleWorkReason::AttendanceNotMarked);
    }
    Ok(NoEligibleWorkReason::AlreadyInvoiced)
}

/// Looks up a tutor's hourly rate, defaulting when unset.
fn tutor_rate(conn: &Connection, tutor_id: &str) -> Result<f64, DbError> {
    let rate: Option<f64> = conn
        .query_row(
            "SELECT hourly_rate FROM tutors WHERE id = ?",
            [tutor_id],
            |row| row.get(0),
        )
        .map_err(|err| not_found_or("tutor", tutor_id, err))?;
    Ok(rate.unwrap_or(DEFAULT_HOURLY_RATE))
}

fn map_invoice_row(row: &Row<'_>) -> rusqlite::Result<InvoiceRecord> {
    let status: String = row.get(8)?;
    let issue_date: String = row.get(9)?;
    let due_date: String = row.get(10)?;
    let period_start: Option<String> = row.get(11)?;
    let period_end: Option<String> = row.get(12)?;
    Ok(InvoiceRecord {
        id: row.get(0)?,
        invoice_number: row.get(1)?,
        tutor_id: row.get(2)?,
        student_id: row.get(3)?,
        parent_id: row.get(4)?,
        session_id: row.get(5)?,
        amount: row.get(6)?,
        currency: row.get(7)?,
        status: crate::parse_column(8, &status)?,
        issue_date: parse_date_column(9, &issue_date)?,
        due_date: parse_date_column(10, &due_date)?,
        period_start: period_start
            .map(|value| parse_date_column(11, &value))
            .transpose()?,
        period_end: period_end
            .map(|value| parse_date_column(12, &value))
            .transpose()?,
        description: row.get(13)?,
        paid_date: row.get(14)?,
        payment_method: row.get(15)?,
        transaction_id: row.get(16)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_tutor, date, make_session, time};
    use td_core::Location;

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-17T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    /// Creates a completed, attendance-marked session ready for billing.
    fn billable_session(
        db: &mut Database,
        tutor_id: &str,
        day: chrono::NaiveDate,
        start: chrono::NaiveTime,
        end: chrono::NaiveTime,
        location: Location,
    ) -> String {
        let session = make_session(db, tutor_id, day, start, end, location);
        db.update_session_status(&session.id, td_core::SessionStatus::Completed)
            .unwrap();
        db.mark_attendance(
            &session.id,
            &[("student-1".to_string(), td_core::AttendanceStatus::Present)],
        )
        .unwrap();
        session.id
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "exact amounts expected")]
    fn approve_timesheet_bills_week_and_flags_sessions() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", Some(40.0));
        // Week ending Sunday 2025-03-16: Monday 3h online, Wednesday 2h centre
        let monday = billable_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 10),
            time(9, 0),
            time(12, 0),
            Location::Online,
        );
        let wednesday = billable_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 12),
            time(14, 0),
            time(16, 0),
            Location::Centre,
        );

        let invoice = db
            .approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now())
            .unwrap();

        assert_eq!(invoice.amount, 200.0);
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.invoice_number, "INV-TUTOR-tutor-1-20250317-0001");
        assert_eq!(invoice.issue_date, date(2025, 3, 17));
        assert_eq!(invoice.due_date, date(2025, 4, 16));
        assert_eq!(invoice.period_start, Some(date(2025, 3, 10)));
        assert_eq!(invoice.period_end, Some(date(2025, 3, 16)));

        let items = db.invoice_items(&invoice.id).unwrap();
        assert_eq!(items.len(), 1);
        assert_eq!(
            items[0].description,
            "Tutoring hours: 5h (Online: 3h, Offline: 2h)"
        );
        assert_eq!(items[0].amount, 200.0);

        assert!(db.get_session(&monday).unwrap().ready_for_invoicing);
        assert!(db.get_session(&wednesday).unwrap().ready_for_invoicing);
    }

    #[test]
    fn approve_timesheet_twice_reports_already_invoiced() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", Some(40.0));
        billable_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 10),
            time(9, 0),
            time(12, 0),
            Location::Online,
        );

        db.approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now())
            .unwrap();
        let second = db.approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now());

        assert!(matches!(
            second,
            Err(DbError::NoEligibleWork(
                NoEligibleWorkReason::AlreadyInvoiced
            ))
        ));
        // no second invoice row
        let invoices = db.list_invoices(&InvoiceFilter::default()).unwrap();
        assert_eq!(invoices.len(), 1);
    }

    #[test]
    fn approve_timesheet_distinguishes_empty_reasons() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", Some(40.0));

        // (a) no sessions at all in range
        let result = db.approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now());
        assert!(matches!(
            result,
            Err(DbError::NoEligibleWork(NoEligibleWorkReason::NoSessions))
        ));

        // (b) sessions exist but attendance unmarked
        make_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 11),
            time(9, 0),
            time(10, 0),
            Location::Online,
        );
        let result = db.approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now());
        assert!(matches!(
            result,
            Err(DbError::NoEligibleWork(
                NoEligibleWorkReason::AttendanceNotMarked
            ))
        ));
    }

    #[test]
    fn approve_timesheet_ignores_sessions_outside_window() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", Some(40.0));
        // Day before the 7-day window [Mar 10, Mar 16]
        billable_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 9),
            time(9, 0),
            time(12, 0),
            Location::Online,
        );

        let result = db.approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now());
        assert!(matches!(
            result,
            Err(DbError::NoEligibleWork(NoEligibleWorkReason::NoSessions))
        ));
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "exact amounts expected")]
    fn approve_timesheet_defaults_missing_rate_to_100() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", None);
        billable_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 10),
            time(9, 0),
            time(11, 0),
            Location::Home,
        );

        let invoice = db
            .approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now())
            .unwrap();
        assert_eq!(invoice.amount, 200.0);
    }

    #[test]
    fn approve_timesheet_sequences_invoice_numbers_per_tutor() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", Some(50.0));
        billable_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 10),
            time(9, 0),
            time(10, 0),
            Location::Online,
        );
        billable_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 18),
            time(9, 0),
            time(10, 0),
            Location::Online,
        );

        let first = db
            .approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now())
            .unwrap();
        let second = db
            .approve_timesheet_at("tutor-1", date(2025, 3, 23), fixed_now())
            .unwrap();

        assert_eq!(first.invoice_number, "INV-TUTOR-tutor-1-20250317-0001");
        assert_eq!(second.invoice_number, "INV-TUTOR-tutor-1-20250317-0002");
    }

    #[test]
    fn create_invoice_rejects_duplicate_number_and_persists_nothing() {
        let mut db = Database::open_in_memory().unwrap();
        let new = NewInvoice {
            invoice_number: Some("INV-X-1".to_string()),
            issue_date: date(2025, 3, 1),
            items: vec![NewInvoiceItem {
                description: "Tutoring".to_string(),
                amount: 50.0,
                credits: None,
            }],
            ..NewInvoice::default()
        };
        db.create_invoice_at(&new, fixed_now()).unwrap();

        let duplicate = db.create_invoice_at(&new, fixed_now());
        assert!(matches!(
            duplicate,
            Err(DbError::DuplicateInvoiceNumber { ref number }) if number == "INV-X-1"
        ));

        let invoices = db.list_invoices(&InvoiceFilter::default()).unwrap();
        assert_eq!(invoices.len(), 1);
        let item_count: i64 = db
            .conn
            .query_row("SELECT COUNT(*) FROM invoice_items", [], |row| row.get(0))
            .unwrap();
        assert_eq!(item_count, 1);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "exact amounts expected")]
    fn create_invoice_defaults_amount_to_item_sum() {
        let mut db = Database::open_in_memory().unwrap();
        let invoice = db
            .create_invoice_at(
                &NewInvoice {
                    issue_date: date(2025, 3, 1),
                    items: vec![
                        NewInvoiceItem {
                            description: "Week 1".to_string(),
                            amount: 120.0,
                            credits: Some(3.0),
                        },
                        NewInvoiceItem {
                            description: "Week 2".to_string(),
                            amount: 80.0,
                            credits: Some(2.0),
                        },
                    ],
                    ..NewInvoice::default()
                },
                fixed_now(),
            )
            .unwrap();

        assert_eq!(invoice.amount, 200.0);
        assert_eq!(invoice.status, InvoiceStatus::Pending);
        assert_eq!(invoice.invoice_number, "INV-2025-03-0001");
        assert_eq!(invoice.due_date, date(2025, 3, 31));

        let items = db.invoice_items(&invoice.id).unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].credits, Some(3.0));
    }

    #[test]
    fn create_invoice_generates_sequential_monthly_numbers() {
        let mut db = Database::open_in_memory().unwrap();
        let base = NewInvoice {
            issue_date: date(2025, 3, 1),
            amount: Some(10.0),
            ..NewInvoice::default()
        };
        let first = db.create_invoice_at(&base, fixed_now()).unwrap();
        let second = db.create_invoice_at(&base, fixed_now()).unwrap();
        assert_eq!(first.invoice_number, "INV-2025-03-0001");
        assert_eq!(second.invoice_number, "INV-2025-03-0002");
    }

    #[test]
    fn create_invoice_with_session_consumes_it() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", Some(40.0));
        let session = make_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 10),
            time(9, 0),
            time(10, 0),
            Location::Centre,
        );

        db.create_invoice_at(
            &NewInvoice {
                tutor_id: Some("tutor-1".to_string()),
                session_id: Some(session.id.clone()),
                issue_date: date(2025, 3, 10),
                amount: Some(40.0),
                ..NewInvoice::default()
            },
            fixed_now(),
        )
        .unwrap();

        assert!(db.get_session(&session.id).unwrap().ready_for_invoicing);
    }

    #[test]
    fn create_invoice_rejects_negative_amounts() {
        let mut db = Database::open_in_memory().unwrap();
        let result = db.create_invoice_at(
            &NewInvoice {
                issue_date: date(2025, 3, 1),
                amount: Some(-5.0),
                ..NewInvoice::default()
            },
            fixed_now(),
        );
        assert!(matches!(
            result,
            Err(DbError::Validation(ValidationError::NegativeAmount { .. }))
        ));
    }

    #[test]
    fn mark_paid_is_one_directional() {
        let mut db = Database::open_in_memory().unwrap();
        let invoice = db
            .create_invoice_at(
                &NewInvoice {
                    issue_date: date(2025, 3, 1),
                    amount: Some(100.0),
                    ..NewInvoice::default()
                },
                fixed_now(),
            )
            .unwrap();

        let paid = db
            .mark_invoice_paid_at(&invoice.id, "bank-transfer", Some("txn-9"), fixed_now())
            .unwrap();
        assert_eq!(paid.status, InvoiceStatus::Paid);
        assert_eq!(paid.payment_method.as_deref(), Some("bank-transfer"));
        assert_eq!(paid.transaction_id.as_deref(), Some("txn-9"));
        assert!(paid.paid_date.is_some());

        let again = db.mark_invoice_paid_at(&invoice.id, "cash", None, fixed_now());
        assert!(matches!(again, Err(DbError::InvalidState { .. })));
    }

    #[test]
    fn cancelled_invoice_cannot_be_paid() {
        let mut db = Database::open_in_memory().unwrap();
        let invoice = db
            .create_invoice_at(
                &NewInvoice {
                    issue_date: date(2025, 3, 1),
                    amount: Some(100.0),
                    ..NewInvoice::default()
                },
                fixed_now(),
            )
            .unwrap();
        db.cancel_invoice(&invoice.id).unwrap();

        let result = db.mark_invoice_paid_at(&invoice.id, "cash", None, fixed_now());
        assert!(matches!(result, Err(DbError::InvalidState { .. })));
    }

    #[test]
    fn paid_invoice_cannot_be_cancelled() {
        let mut db = Database::open_in_memory().unwrap();
        let invoice = db
            .create_invoice_at(
                &NewInvoice {
                    issue_date: date(2025, 3, 1),
                    amount: Some(100.0),
                    ..NewInvoice::default()
                },
                fixed_now(),
            )
            .unwrap();
        db.mark_invoice_paid_at(&invoice.id, "cash", None, fixed_now())
            .unwrap();

        assert!(matches!(
            db.cancel_invoice(&invoice.id),
            Err(DbError::InvalidState { .. })
        ));
    }

    #[test]
    fn sweep_overdue_flips_stale_pending_only() {
        let mut db = Database::open_in_memory().unwrap();
        let stale = db
            .create_invoice_at(
                &NewInvoice {
                    issue_date: date(2025, 1, 1),
                    due_date: Some(date(2025, 1, 31)),
                    amount: Some(100.0),
                    ..NewInvoice::default()
                },
                fixed_now(),
            )
            .unwrap();
        let current = db
            .create_invoice_at(
                &NewInvoice {
                    issue_date: date(2025, 3, 1),
                    due_date: Some(date(2025, 3, 31)),
                    amount: Some(100.0),
                    ..NewInvoice::default()
                },
                fixed_now(),
            )
            .unwrap();
        let paid = db
            .create_invoice_at(
                &NewInvoice {
                    issue_date: date(2025, 1, 1),
                    due_date: Some(date(2025, 1, 31)),
                    amount: Some(100.0),
                    ..NewInvoice::default()
                },
                fixed_now(),
            )
            .unwrap();
        db.mark_invoice_paid_at(&paid.id, "cash", None, fixed_now())
            .unwrap();

        let updated = db.sweep_overdue_invoices(date(2025, 3, 17)).unwrap();
        assert_eq!(updated, 1);
        assert_eq!(db.get_invoice(&stale.id).unwrap().status, InvoiceStatus::Overdue);
        assert_eq!(
            db.get_invoice(&current.id).unwrap().status,
            InvoiceStatus::Pending
        );
        assert_eq!(db.get_invoice(&paid.id).unwrap().status, InvoiceStatus::Paid);

        // second sweep makes no further change
        assert_eq!(db.sweep_overdue_invoices(date(2025, 3, 17)).unwrap(), 0);
    }

    #[test]
    fn list_invoices_filters_by_tutor_and_status() {
        let mut db = Database::open_in_memory().unwrap();
        let a = db
            .create_invoice_at(
                &NewInvoice {
                    tutor_id: Some("tutor-1".to_string()),
                    issue_date: date(2025, 3, 1),
                    amount: Some(100.0),
                    ..NewInvoice::default()
                },
                fixed_now(),
            )
            .unwrap();
        db.create_invoice_at(
            &NewInvoice {
                tutor_id: Some("tutor-2".to_string()),
                issue_date: date(2025, 3, 2),
                amount: Some(50.0),
                ..NewInvoice::default()
            },
            fixed_now(),
        )
        .unwrap();

        let mine = db
            .list_invoices(&InvoiceFilter {
                tutor_id: Some("tutor-1".to_string()),
                ..InvoiceFilter::default()
            })
            .unwrap();
        assert_eq!(mine.len(), 1);
        assert_eq!(mine[0].id, a.id);

        let pending = db
            .list_invoices(&InvoiceFilter {
                status: Some(InvoiceStatus::Pending),
                ..InvoiceFilter::default()
            })
            .unwrap();
        assert_eq!(pending.len(), 2);
    }
}
