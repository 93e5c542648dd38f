use anyhow::{Context, Result};

use super::OutputFormat;
use crate::db::Database;
use crate::monitor;

/// Evaluate dashboard health against a database file without sending alerts
pub fn run_health(db_path: &str, format: OutputFormat) -> Result<()> {
    let db = Database::open(db_path)
        .with_context(|| format!("Failed to open database at {}", db_path))?;
    let report = monitor::inspect(&db)?;
    format.print(&report);
    Ok(())
}
