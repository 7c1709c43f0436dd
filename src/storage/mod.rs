//! Storage module for persisting harvest progress
//!
//! This module handles everything that outlives a process:
//! - JSON checkpoint files (collected records + page cursor) for resumption
//! - SQLite run ledger with run history and the final record export

mod checkpoint;
mod schema;
mod sqlite;
mod traits;

pub use checkpoint::{
    read_records, write_records, CheckpointState, JsonCheckpointStore, KEY_COLUMN, LINK_COLUMN,
    PARENT_COLUMN, TITLE_COLUMN,
};
pub use sqlite::RunLedger;
pub use traits::{CheckpointStore, StorageError, StorageResult};

/// Represents a harvesting run in the ledger
#[derive(Debug, Clone)]
pub struct RunRecord {
    pub id: i64,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub config_hash: String,
    pub status: RunStatus,
    pub start_page: u32,
    pub end_page: Option<u32>,
    pub scraped_count: usize,
}

/// Status of a harvesting run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    BudgetExceeded,
    Interrupted,
    WatchdogRestart,
    Failed,
}

impl RunStatus {
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::Running => "running",
            Self::Completed => "completed",
            Self::BudgetExceeded => "budget_exceeded",
            Self::Interrupted => "interrupted",
            Self::WatchdogRestart => "watchdog_restart",
            Self::Failed => "failed",
        }
    }

    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "budget_exceeded" => Some(Self::BudgetExceeded),
            "interrupted" => Some(Self::Interrupted),
            "watchdog_restart" => Some(Self::WatchdogRestart),
            "failed" => Some(Self::Failed),
            _ => None,
        }
    }
}
