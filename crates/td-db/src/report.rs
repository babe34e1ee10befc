//! Tutor hours and earnings reporting.
//!
//! The report reuses the same td-core arithmetic as timesheet approval, so
//! reported hours and earnings can never drift from what gets invoiced.

use chrono::{NaiveDate, NaiveTime};
use rusqlite::{Row, params_from_iter};
use serde::Serialize;

use td_core::{
    DEFAULT_HOURLY_RATE, TimeSlot, duration_hours, is_online_location, round2,
};

use crate::{Database, DbError, format_date, parse_date_column, parse_time_column};

/// One completed session in the report.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoursReportRow {
    pub session_id: String,
    pub date: NaiveDate,
    pub start_time: NaiveTime,
    pub end_time: NaiveTime,
    pub subject: String,
    pub location: String,
    pub hours: f64,
    pub earnings: f64,
    pub online: bool,
    /// Billed through a paid invoice covering the session date.
    pub paid: bool,
}

/// Aggregates over the filtered rows, rounded to 2 decimal places.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct HoursSummary {
    pub total_sessions: usize,
    pub total_hours: f64,
    pub online_hours: f64,
    pub offline_hours: f64,
    pub paid_hours: f64,
    pub pending_hours: f64,
    pub total_earnings: f64,
    pub paid_earnings: f64,
    pub pending_earnings: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HoursReport {
    pub tutor_id: String,
    pub hourly_rate: f64,
    pub sessions: Vec<HoursReportRow>,
    pub summary: HoursSummary,
}

/// Filters for the hours report.
#[derive(Debug, Clone, Default)]
pub struct HoursReportFilter {
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    /// `Some(true)` keeps only paid sessions, `Some(false)` only unpaid.
    pub paid: Option<bool>,
}

impl Database {
    /// Builds a tutor's hours and earnings report over completed sessions.
    ///
    /// A session counts as paid when it has been consumed for billing and a
    /// paid invoice for the tutor has a period containing its date. The
    /// summary aggregates exactly the rows returned, so date and paid
    /// filters narrow both.
    pub fn tutor_hours_report(
        &self,
        tutor_id: &str,
        filter: &HoursReportFilter,
    ) -> Result<HoursReport, DbError> {
        let hourly_rate: Option<f64> = self
            .conn
            .query_row(
                "SELECT hourly_rate FROM tutors WHERE id = ?",
                [tutor_id],
                |row| row.get(0),
            )
            .map_err(|err| crate::not_found_or("tutor", tutor_id, err))?;
        let hourly_rate = hourly_rate.unwrap_or(DEFAULT_HOURLY_RATE);

        let mut sql = String::from(
            "
            SELECT s.id, s.date, s.start_time, s.end_time, s.subject, s.location,
                   s.ready_for_invoicing AND EXISTS (
                       SELECT 1 FROM invoices i
                       WHERE i.tutor_id = s.tutor_id
                         AND i.status = 'paid'
                         AND i.period_start IS NOT NULL
                         AND i.period_start <= s.date
                         AND i.period_end >= s.date
                   ) AS paid
            FROM sessions s
            WHERE s.tutor_id = ? AND s.status = 'completed'
            ",
        );
        let mut args: Vec<String> = vec![tutor_id.to_string()];
        if let Some(from) = filter.from {
            sql.push_str(" AND s.date >= ?");
            args.push(format_date(from));
        }
        if let Some(to) = filter.to {
            sql.push_str(" AND s.date <= ?");
            args.push(format_date(to));
        }
        sql.push_str(" ORDER BY s.date ASC, s.start_time ASC");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(args.iter()), map_report_row)?;

        let mut sessions = Vec::new();
        let mut summary = HoursSummary::default();
        for row in rows {
            let raw = row?;
            let slot = TimeSlot::new(raw.date, raw.start_time, raw.end_time)?;
            let hours = duration_hours(&slot);
            let row = HoursReportRow {
                session_id: raw.session_id,
                date: raw.date,
                start_time: raw.start_time,
                end_time: raw.end_time,
                subject: raw.subject,
                online: is_online_location(&raw.location),
                location: raw.location,
                hours,
                earnings: round2(hours * hourly_rate),
                paid: raw.paid,
            };
            if filter.paid.is_some_and(|wanted| wanted != row.paid) {
                continue;
            }
            summary.total_sessions += 1;
            summary.total_hours += hours;
            if row.online {
                summary.online_hours += hours;
            } else {
                summary.offline_hours += hours;
            }
            if row.paid {
                summary.paid_hours += hours;
            } else {
                summary.pending_hours += hours;
            }
            sessions.push(row);
        }
        summary.total_hours = round2(summary.total_hours);
        summary.online_hours = round2(summary.online_hours);
        summary.offline_hours = round2(summary.offline_hours);
        summary.paid_hours = round2(summary.paid_hours);
        summary.pending_hours = round2(summary.pending_hours);
        summary.total_earnings = round2(summary.total_hours * hourly_rate);
        summary.paid_earnings = round2(summary.paid_hours * hourly_rate);
        summary.pending_earnings = round2(summary.pending_hours * hourly_rate);

        Ok(HoursReport {
            tutor_id: tutor_id.to_string(),
            hourly_rate,
            sessions,
            summary,
        })
    }
}

struct RawReportRow {
    session_id: String,
    date: NaiveDate,
    start_time: NaiveTime,
    end_time: NaiveTime,
    subject: String,
    location: String,
    paid: bool,
}

fn map_report_row(row: &Row<'_>) -> rusqlite::Result<RawReportRow> {
    let date: String = row.get(1)?;
    let start: String = row.get(2)?;
    let end: String = row.get(3)?;
    Ok(RawReportRow {
        session_id: row.get(0)?,
        date: parse_date_column(1, &date)?,
        start_time: parse_time_column(2, &start)?,
        end_time: parse_time_column(3, &end)?,
        subject: row.get(4)?,
        location: row.get(5)?,
        paid: row.get(6)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{add_tutor, date, make_session, time};
    use chrono::{DateTime, Utc};
    use td_core::{AttendanceStatus, Location, SessionStatus};

    fn fixed_now() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-03-17T12:00:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn completed_session(
        db: &mut Database,
        tutor_id: &str,
        day: chrono::NaiveDate,
        start: chrono::NaiveTime,
        end: chrono::NaiveTime,
        location: Location,
    ) -> String {
        let session = make_session(db, tutor_id, day, start, end, location);
        db.update_session_status(&session.id, SessionStatus::Completed)
            .unwrap();
        db.mark_attendance(
            &session.id,
            &[("student-1".to_string(), AttendanceStatus::Present)],
        )
        .unwrap();
        session.id
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "exact amounts expected")]
    fn report_totals_match_invoice_arithmetic() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", Some(40.0));
        completed_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 10),
            time(9, 0),
            time(12, 0),
            Location::Online,
        );
        completed_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 12),
            time(14, 0),
            time(16, 0),
            Location::Centre,
        );
        // planned session must not appear
        make_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 13),
            time(9, 0),
            time(10, 0),
            Location::Online,
        );

        let report = db
            .tutor_hours_report("tutor-1", &HoursReportFilter::default())
            .unwrap();

        assert_eq!(report.sessions.len(), 2);
        assert_eq!(report.summary.total_sessions, 2);
        assert_eq!(report.summary.total_hours, 5.0);
        assert_eq!(report.summary.online_hours, 3.0);
        assert_eq!(report.summary.offline_hours, 2.0);
        assert_eq!(report.summary.total_earnings, 200.0);
        assert!(report.sessions[0].online);
        assert!(!report.sessions[1].online);
        assert_eq!(report.sessions[0].earnings, 120.0);

        let invoice = db
            .approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now())
            .unwrap();
        assert_eq!(invoice.amount, report.summary.total_earnings);
    }

    #[test]
    #[expect(clippy::float_cmp, reason = "exact amounts expected")]
    fn paid_flag_requires_paid_invoice_covering_date() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", Some(40.0));
        completed_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 10),
            time(9, 0),
            time(11, 0),
            Location::Online,
        );

        // consumed, but invoice still pending
        let invoice = db
            .approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now())
            .unwrap();
        let report = db
            .tutor_hours_report("tutor-1", &HoursReportFilter::default())
            .unwrap();
        assert!(!report.sessions[0].paid);
        assert_eq!(report.summary.pending_hours, 2.0);

        db.mark_invoice_paid_at(&invoice.id, "bank-transfer", None, fixed_now())
            .unwrap();
        let report = db
            .tutor_hours_report("tutor-1", &HoursReportFilter::default())
            .unwrap();
        assert!(report.sessions[0].paid);
        assert_eq!(report.summary.paid_hours, 2.0);
        assert_eq!(report.summary.paid_earnings, 80.0);
        assert_eq!(report.summary.pending_hours, 0.0);
    }

    #[test]
    fn date_and_paid_filters_narrow_rows_and_summary() {
        let mut db = Database::open_in_memory().unwrap();
        add_tutor(&mut db, "tutor-1", Some(40.0));
        completed_session(
            &mut db,
            "tutor-1",
            date(2025, 3, 10),
            time(9, 0),
            time(10, 0),
            Location::Online,
        );
        completed_session(
            &mut db,
            "tutor-1",
            date(2025, 4, 2),
            time(9, 0),
            time(10, 0),
            Location::Online,
        );
        let invoice = db
            .approve_timesheet_at("tutor-1", date(2025, 3, 16), fixed_now())
            .unwrap();
        db.mark_invoice_paid_at(&invoice.id, "cash", None, fixed_now())
            .unwrap();

        let march = db
            .tutor_hours_report(
                "tutor-1",
                &HoursReportFilter {
                    from: Some(date(2025, 3, 1)),
                    to: Some(date(2025, 3, 31)),
                    paid: None,
                },
            )
            .unwrap();
        assert_eq!(march.sessions.len(), 1);
        assert_eq!(march.summary.total_sessions, 1);

        let unpaid = db
            .tutor_hours_report(
                "tutor-1",
                &HoursReportFilter {
                    paid: Some(false),
                    ..HoursReportFilter::default()
                },
            )
            .unwrap();
        assert_eq!(unpaid.sessions.len(), 1);
        assert_eq!(unpaid.sessions[0].date, date(2025, 4, 2));
    }

    #[test]
    fn report_for_unknown_tutor_is_not_found() {
        let db = Database::open_in_memory().unwrap();
        let result = db.tutor_hours_report("nobody", &HoursReportFilter::default());
        assert!(matches!(
            result,
            Err(DbError::NotFound { entity: "tutor", .. })
        ));
    }
}
