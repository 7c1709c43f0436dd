//! Storage traits and error types
//!
//! This module defines the trait interface for checkpoint backends and
//! associated error types.

use crate::state::CrawlState;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Invalid checkpoint: {0}")]
    InvalidCheckpoint(String),

    #[error("Checkpoint lock poisoned")]
    LockPoisoned,

    #[error("Run not found: {0}")]
    RunNotFound(i64),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for durable crawl checkpoints
///
/// A checkpoint is a snapshot of `CrawlState`: every collected record plus
/// the page cursor. Implementations must make `save` and `load` mutually
/// exclusive so a load never observes half of a save.
pub trait CheckpointStore: Send + Sync {
    /// Persists a snapshot of the crawl state
    ///
    /// On success the persisted record count equals `state.scraped_count()`.
    fn save(&self, state: &CrawlState) -> StorageResult<()>;

    /// Loads the most recent snapshot
    ///
    /// # Returns
    ///
    /// * `Ok(Some(state))` - A valid checkpoint was found
    /// * `Ok(None)` - No checkpoint exists
    /// * `Err(StorageError)` - A checkpoint exists but cannot be used
    fn load(&self) -> StorageResult<Option<CrawlState>>;

    /// Removes any persisted checkpoint
    fn clear(&self) -> StorageResult<()>;
}
