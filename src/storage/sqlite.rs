//! SQLite run ledger
//!
//! Keeps a history of harvesting runs and the latest export of every record.
//! The ledger is an audit trail only; resumption never depends on it.

use crate::state::Record;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{StorageError, StorageResult};
use crate::storage::{RunRecord, RunStatus};
use chrono::Utc;
use rusqlite::{params, Connection, Row};
use serde_json::{Map, Value};
use std::path::Path;

const RUN_COLUMNS: &str =
    "id, started_at, finished_at, config_hash, status, start_page, end_page, scraped_count";

/// SQLite-backed history of runs and exported records
pub struct RunLedger {
    conn: Connection,
}

impl RunLedger {
    /// Opens or creates the ledger database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    pub fn open(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA foreign_keys = ON;
        ",
        )?;

        initialize_schema(&conn)?;

        Ok(Self { conn })
    }

    /// Creates an in-memory ledger (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        initialize_schema(&conn)?;
        Ok(Self { conn })
    }

    /// Records the start of a run and returns its ID
    pub fn start_run(&mut self, config_hash: &str, start_page: u32) -> StorageResult<i64> {
        let now = Utc::now().to_rfc3339();
        self.conn.execute(
            "INSERT INTO runs (started_at, config_hash, status, start_page) VALUES (?1, ?2, ?3, ?4)",
            params![now, config_hash, RunStatus::Running.to_db_string(), start_page],
        )?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Marks a run as finished with its final status and progress
    pub fn finish_run(
        &mut self,
        run_id: i64,
        status: RunStatus,
        end_page: u32,
        scraped_count: usize,
    ) -> StorageResult<()> {
        let now = Utc::now().to_rfc3339();
        let updated = self.conn.execute(
            "UPDATE runs SET status = ?1, finished_at = ?2, end_page = ?3, scraped_count = ?4
             WHERE id = ?5",
            params![
                status.to_db_string(),
                now,
                end_page,
                scraped_count as i64,
                run_id
            ],
        )?;

        if updated == 0 {
            return Err(StorageError::RunNotFound(run_id));
        }
        Ok(())
    }

    /// Gets a run by ID
    pub fn get_run(&self, run_id: i64) -> StorageResult<RunRecord> {
        let sql = format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS);
        self.conn
            .query_row(&sql, params![run_id], run_from_row)
            .map_err(|_| StorageError::RunNotFound(run_id))
    }

    /// Gets the most recent runs, newest first
    pub fn recent_runs(&self, limit: usize) -> StorageResult<Vec<RunRecord>> {
        let sql = format!("SELECT {} FROM runs ORDER BY id DESC LIMIT ?1", RUN_COLUMNS);
        let mut stmt = self.conn.prepare(&sql)?;
        let runs = stmt
            .query_map(params![limit as i64], run_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(runs)
    }

    /// Exports records, replacing earlier exports of the same keys
    ///
    /// Returns the number of rows written.
    pub fn export_records(&mut self, run_id: i64, records: &[Record]) -> StorageResult<usize> {
        let now = Utc::now().to_rfc3339();
        let tx = self.conn.transaction()?;
        {
            let mut stmt = tx.prepare(
                "INSERT INTO records (record_key, title, parent, link, fields_json, exported_run, exported_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                 ON CONFLICT(record_key) DO UPDATE SET
                    title = excluded.title,
                    parent = excluded.parent,
                    link = excluded.link,
                    fields_json = excluded.fields_json,
                    exported_run = excluded.exported_run,
                    exported_at = excluded.exported_at",
            )?;

            for record in records {
                let fields_json = fields_to_json(record)?;
                stmt.execute(params![
                    record.key().as_str(),
                    record.stub.title,
                    record.stub.parent,
                    record.stub.link,
                    fields_json,
                    run_id,
                    now
                ])?;
            }
        }
        tx.commit()?;
        Ok(records.len())
    }

    /// Counts exported records
    pub fn count_records(&self) -> StorageResult<u64> {
        let count: i64 = self
            .conn
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get(0))?;
        Ok(count as u64)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<RunRecord> {
    Ok(RunRecord {
        id: row.get(0)?,
        started_at: row.get(1)?,
        finished_at: row.get(2)?,
        config_hash: row.get(3)?,
        status: RunStatus::from_db_string(&row.get::<_, String>(4)?).unwrap_or(RunStatus::Failed),
        start_page: row.get(5)?,
        end_page: row.get(6)?,
        scraped_count: row.get::<_, i64>(7)? as usize,
    })
}

fn fields_to_json(record: &Record) -> StorageResult<String> {
    let mut fields = Map::new();
    for (name, value) in record.fields() {
        fields.insert(name.to_string(), serde_json::to_value(value)?);
    }
    Ok(serde_json::to_string(&Value::Object(fields))?)
}
