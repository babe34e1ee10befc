//! CLI subcommand implementations.

pub mod invoice;
pub mod report;
pub mod session;
pub mod timesheet;
pub mod tutor;
