//! Tutoring back-office CLI library.
//!
//! This crate provides the CLI interface for the back office.

mod cli;
pub mod commands;
mod config;

pub use cli::{
    AttendanceRecordArg, Cli, Commands, InvoiceAction, InvoiceItemArg, ReportAction,
    SessionAction, TimesheetAction, TutorAction,
};
pub use config::Config;
