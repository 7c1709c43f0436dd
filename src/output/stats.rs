//! Run history from the ledger
//!
//! This module provides functionality for extracting and displaying the
//! history of harvest runs recorded in the SQLite ledger.

use crate::storage::{RunLedger, RunRecord, RunStatus, StorageResult};
use chrono::{DateTime, Utc};

/// Ledger summary shown by `--stats`
#[derive(Debug, Clone)]
pub struct RunHistory {
    /// Most recent runs, newest first
    pub runs: Vec<RunRecord>,

    /// Records held in the export table
    pub total_records: u64,
}

impl RunHistory {
    /// Number of runs that ended with the given status
    pub fn count_with_status(&self, status: RunStatus) -> usize {
        self.runs.iter().filter(|run| run.status == status).count()
    }
}

/// Loads the most recent runs from the ledger
///
/// # Arguments
///
/// * `ledger` - The run ledger to query
/// * `limit` - Maximum number of runs to load
pub fn load_run_history(ledger: &RunLedger, limit: usize) -> StorageResult<RunHistory> {
    Ok(RunHistory {
        runs: ledger.recent_runs(limit)?,
        total_records: ledger.count_records()?,
    })
}

/// Wall-clock duration of a finished run, in seconds
pub fn run_duration_secs(run: &RunRecord) -> Option<i64> {
    let started = run.started_at.parse::<DateTime<Utc>>().ok()?;
    let finished = run.finished_at.as_ref()?.parse::<DateTime<Utc>>().ok()?;
    Some((finished - started).num_seconds())
}

fn format_duration(secs: i64) -> String {
    let hours = secs / 3600;
    let minutes = (secs % 3600) / 60;
    let seconds = secs % 60;
    if hours > 0 {
        format!("{}h {:02}m {:02}s", hours, minutes, seconds)
    } else if minutes > 0 {
        format!("{}m {:02}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

/// Prints run history to stdout in a formatted manner
pub fn print_run_history(history: &RunHistory) {
    println!("=== Harvest Runs ===\n");

    println!("Overview:");
    println!("  Runs shown: {}", history.runs.len());
    println!("  Records in export table: {}", history.total_records);
    for status in [
        RunStatus::Completed,
        RunStatus::BudgetExceeded,
        RunStatus::Interrupted,
        RunStatus::WatchdogRestart,
        RunStatus::Running,
    ] {
        let count = history.count_with_status(status);
        if count > 0 {
            println!("  {:?}: {}", status, count);
        }
    }
    println!();

    if history.runs.is_empty() {
        println!("No runs recorded yet.");
        return;
    }

    println!(
        "{:>5}  {:<25}  {:<16}  {:>7}  {:>9}  {:>10}",
        "Run", "Started", "Status", "Cursor", "Records", "Duration"
    );
    for run in &history.runs {
        let pages = match run.end_page {
            Some(end) => format!("{}->{}", run.start_page, end),
            None => format!("{}->", run.start_page),
        };
        let duration = run_duration_secs(run)
            .map(format_duration)
            .unwrap_or_else(|| "-".to_string());

        println!(
            "{:>5}  {:<25}  {:<16}  {:>7}  {:>9}  {:>10}",
            run.id,
            run.started_at,
            run.status.to_db_string(),
            pages,
            run.scraped_count,
            duration
        );
    }
}
