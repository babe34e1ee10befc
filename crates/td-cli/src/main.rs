use std::path::Path;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use td_cli::commands::{invoice, report, session, timesheet, tutor};
use td_cli::{
    Cli, Commands, Config, InvoiceAction, ReportAction, SessionAction, TimesheetAction,
    TutorAction,
};

/// Load config and open database, ensuring the parent directory exists.
fn open_database(config_path: Option<&Path>) -> Result<(td_db::Database, Config)> {
    let config = Config::load_from(config_path).context("failed to load configuration")?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(parent) = config.database_path.parent() {
        std::fs::create_dir_all(parent).context("failed to create database directory")?;
    }

    let db = td_db::Database::open(&config.database_path).context("failed to open database")?;
    Ok((db, config))
}

#[expect(
    clippy::too_many_lines,
    reason = "CLI command dispatch is inherently verbose"
)]
fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize tracing with verbose flag support
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::from_default_env()
    };
    // Use try_init to avoid panic if tracing is already initialized (e.g., in tests)
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();

    match cli.command {
        Some(Commands::Tutor { action }) => match action {
            TutorAction::Add { id, name, rate } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                tutor::add(&mut db, &id, &name, rate)?;
            }
        },
        Some(Commands::Session { action }) => match action {
            SessionAction::Create {
                tutor,
                date,
                start,
                end,
                subject,
                students,
                location,
                session_type,
                class,
            } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                session::create(
                    &mut db,
                    &tutor,
                    date,
                    start,
                    end,
                    &subject,
                    students,
                    location,
                    session_type,
                    class,
                )?;
            }
            SessionAction::SetStatus { session_id, status } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                session::set_status(&mut db, &session_id, status)?;
            }
            SessionAction::Attendance {
                session_id,
                records,
            } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                session::attendance(&mut db, &session_id, &records)?;
            }
            SessionAction::Conflicts { tutor, from, json } => {
                let (db, _config) = open_database(cli.config.as_deref())?;
                session::conflicts(&db, &tutor, from, json)?;
            }
        },
        Some(Commands::Timesheet { action }) => match action {
            TimesheetAction::Approve {
                tutor,
                week_ending,
                json,
            } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                timesheet::approve(&mut db, &tutor, week_ending, json)?;
            }
        },
        Some(Commands::Invoice { action }) => match action {
            InvoiceAction::Create {
                number,
                tutor,
                student,
                parent,
                session,
                amount,
                issue_date,
                due_date,
                period_start,
                period_end,
                description,
                items,
                json,
            } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                invoice::create(
                    &mut db,
                    invoice::CreateArgs {
                        number,
                        tutor,
                        student,
                        parent,
                        session,
                        amount,
                        issue_date,
                        due_date,
                        period_start,
                        period_end,
                        description,
                        items,
                    },
                    json,
                )?;
            }
            InvoiceAction::Pay {
                invoice_id,
                method,
                txn,
            } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                invoice::pay(&mut db, &invoice_id, &method, txn.as_deref())?;
            }
            InvoiceAction::Cancel { invoice_id } => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                invoice::cancel(&mut db, &invoice_id)?;
            }
            InvoiceAction::List {
                tutor,
                status,
                json,
            } => {
                let (db, _config) = open_database(cli.config.as_deref())?;
                invoice::list(&db, tutor, status, json)?;
            }
            InvoiceAction::SweepOverdue => {
                let (mut db, _config) = open_database(cli.config.as_deref())?;
                invoice::sweep_overdue(&mut db)?;
            }
        },
        Some(Commands::Report { action }) => match action {
            ReportAction::Hours {
                tutor,
                from,
                to,
                paid,
                unpaid,
                json,
            } => {
                let (db, _config) = open_database(cli.config.as_deref())?;
                let paid_filter = if paid {
                    Some(true)
                } else if unpaid {
                    Some(false)
                } else {
                    None
                };
                report::hours(&db, &tutor, from, to, paid_filter, json)?;
            }
        },
        None => {
            // No subcommand, show help
            use clap::CommandFactory;
            Cli::command().print_help()?;
            println!();
        }
    }

    Ok(())
}
