//! Database schema definitions
//!
//! The run ledger database records every harvesting run and the final export
//! of collected records.

/// SQL schema for the database
pub const SCHEMA_SQL: &str = r#"
-- Track harvesting runs
CREATE TABLE IF NOT EXISTS runs (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    started_at TEXT NOT NULL,
    finished_at TEXT,
    config_hash TEXT NOT NULL,
    status TEXT NOT NULL,
    start_page INTEGER NOT NULL,
    end_page INTEGER,
    scraped_count INTEGER NOT NULL DEFAULT 0
);

-- Exported records, one row per record key
CREATE TABLE IF NOT EXISTS records (
    record_key TEXT PRIMARY KEY,
    title TEXT NOT NULL,
    parent TEXT NOT NULL,
    link TEXT NOT NULL,
    fields_json TEXT NOT NULL,
    exported_run INTEGER NOT NULL REFERENCES runs(id),
    exported_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_records_run ON records(exported_run);
"#;

/// Initializes the database schema
///
/// # Arguments
///
/// * `conn` - The database connection
///
/// # Returns
///
/// * `Ok(())` - Schema initialized successfully
/// * `Err(rusqlite::Error)` - Failed to initialize schema
pub fn initialize_schema(conn: &rusqlite::Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(SCHEMA_SQL)?;
    Ok(())
}
