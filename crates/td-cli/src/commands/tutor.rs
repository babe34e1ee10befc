//! Tutor management commands.

use anyhow::{Context, Result};
use td_db::{Database, TutorRecord};

/// Runs `td tutor add`, which also updates an existing tutor in place.
pub fn add(db: &mut Database, id: &str, name: &str, rate: Option<f64>) -> Result<()> {
    let tutor = TutorRecord {
        id: id.to_string(),
        name: name.to_string(),
        hourly_rate: rate,
    };
    db.upsert_tutor(&tutor).context("failed to save tutor")?;
    match rate {
        Some(rate) => println!("Saved tutor {id} ({name}) at {rate:.2}/h"),
        None => println!("Saved tutor {id} ({name}) at the default rate"),
    }
    Ok(())
}
