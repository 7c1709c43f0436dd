//! JSON checkpoint files
//!
//! A checkpoint is a pair of files:
//!
//! - the data file, a JSON array with one flat object per collected record
//!   (`Key`, `Title`, `Parent`, `Link`, then every enrichment field)
//! - the state file, `{"current_page": N, "scraped_count": M}`
//!
//! Both are replaced atomically (write to a temp file, then rename), data file
//! first, so the state file never claims more rows than the data file holds.

use crate::state::{CrawlState, FieldValue, Record, RecordKey, RecordStub};
use crate::storage::traits::{CheckpointStore, StorageError, StorageResult};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tempfile::NamedTempFile;

pub const KEY_COLUMN: &str = "Key";
pub const TITLE_COLUMN: &str = "Title";
pub const PARENT_COLUMN: &str = "Parent";
pub const LINK_COLUMN: &str = "Link";

const RESERVED_COLUMNS: [&str; 4] = [KEY_COLUMN, TITLE_COLUMN, PARENT_COLUMN, LINK_COLUMN];

/// Contents of the state file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckpointState {
    pub current_page: u32,
    pub scraped_count: usize,
}

/// Checkpoint store backed by a data file and a state file
pub struct JsonCheckpointStore {
    data_path: PathBuf,
    state_path: PathBuf,
    /// Guards the file pair so saves and loads never interleave
    lock: Mutex<()>,
}

impl JsonCheckpointStore {
    /// Creates a store for the given file pair; nothing is touched on disk yet
    pub fn new(data_path: impl Into<PathBuf>, state_path: impl Into<PathBuf>) -> Self {
        Self {
            data_path: data_path.into(),
            state_path: state_path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn data_path(&self) -> &Path {
        &self.data_path
    }

    pub fn state_path(&self) -> &Path {
        &self.state_path
    }

    /// Reads the state file alone
    ///
    /// Returns `Ok(None)` if the file does not exist.
    pub fn read_state(&self) -> StorageResult<Option<CheckpointState>> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        read_state_file(&self.state_path)
    }
}

impl CheckpointStore for JsonCheckpointStore {
    fn save(&self, state: &CrawlState) -> StorageResult<()> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        tracing::info!(
            "Saving progress at page {}, scraped count {}",
            state.current_page(),
            state.scraped_count()
        );

        write_records(&self.data_path, state.collected())?;

        let snapshot = CheckpointState {
            current_page: state.current_page(),
            scraped_count: state.scraped_count(),
        };
        write_atomic(&self.state_path, &serde_json::to_vec(&snapshot)?)?;

        Ok(())
    }

    fn load(&self) -> StorageResult<Option<CrawlState>> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;

        let data_exists = self.data_path.exists();
        let snapshot = read_state_file(&self.state_path)?;

        let snapshot = match (snapshot, data_exists) {
            (None, false) => return Ok(None),
            (Some(snapshot), true) => snapshot,
            (Some(_), false) => {
                return Err(StorageError::InvalidCheckpoint(format!(
                    "state file present but data file {} is missing",
                    self.data_path.display()
                )))
            }
            (None, true) => {
                return Err(StorageError::InvalidCheckpoint(format!(
                    "data file present but state file {} is missing",
                    self.state_path.display()
                )))
            }
        };

        let records = read_records(&self.data_path)?;
        if records.len() != snapshot.scraped_count {
            tracing::warn!(
                "Checkpoint state claims {} records but data file holds {}; trusting the data file",
                snapshot.scraped_count,
                records.len()
            );
        }

        let state = CrawlState::restore(snapshot.current_page, records);
        tracing::info!(
            "Progress loaded. Current page: {}, records scraped: {}",
            state.current_page(),
            state.scraped_count()
        );
        Ok(Some(state))
    }

    fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().map_err(|_| StorageError::LockPoisoned)?;
        for path in [&self.data_path, &self.state_path] {
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(())
    }
}

/// Writes records to a JSON data file, replacing it atomically
///
/// Used for checkpoints and for the final export.
pub fn write_records(path: &Path, records: &[Record]) -> StorageResult<()> {
    let rows: Vec<RecordRow<'_>> = records.iter().map(RecordRow).collect();
    write_atomic_with(path, |writer| {
        serde_json::to_writer(&mut *writer, &rows)?;
        Ok(())
    })
}

/// Reads records back from a JSON data file
pub fn read_records(path: &Path) -> StorageResult<Vec<Record>> {
    let content = fs::read_to_string(path)?;
    let rows: Vec<Map<String, Value>> = serde_json::from_str(&content)?;
    rows.into_iter().map(record_from_row).collect()
}

fn read_state_file(path: &Path) -> StorageResult<Option<CheckpointState>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    // Both keys are required; a partial state file is unusable
    let snapshot: CheckpointState = serde_json::from_str(&content)
        .map_err(|e| StorageError::InvalidCheckpoint(format!("{}: {}", path.display(), e)))?;

    if snapshot.current_page < 1 {
        return Err(StorageError::InvalidCheckpoint(format!(
            "{}: current_page must be >= 1",
            path.display()
        )));
    }

    Ok(Some(snapshot))
}

/// Serializes a record as one flat data-file row
struct RecordRow<'a>(&'a Record);

impl Serialize for RecordRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let record = self.0;
        let mut map = serializer.serialize_map(None)?;
        map.serialize_entry(KEY_COLUMN, record.key())?;
        map.serialize_entry(TITLE_COLUMN, &record.stub.title)?;
        map.serialize_entry(PARENT_COLUMN, &record.stub.parent)?;
        map.serialize_entry(LINK_COLUMN, &record.stub.link)?;
        for (name, value) in record.fields() {
            if !RESERVED_COLUMNS.contains(&name) {
                map.serialize_entry(name, value)?;
            }
        }
        map.end()
    }
}

fn record_from_row(mut row: Map<String, Value>) -> StorageResult<Record> {
    let mut take = |column: &str| -> StorageResult<String> {
        match row.remove(column) {
            Some(Value::String(s)) => Ok(s),
            _ => Err(StorageError::InvalidCheckpoint(format!(
                "row is missing string column '{}'",
                column
            ))),
        }
    };

    let key = take(KEY_COLUMN)?;
    let title = take(TITLE_COLUMN)?;
    let parent = take(PARENT_COLUMN)?;
    let link = take(LINK_COLUMN)?;

    let mut record = Record::new(RecordStub {
        key: RecordKey::from_canonical(key),
        title,
        parent,
        link,
    });

    for (name, value) in row {
        if value.is_null() {
            continue;
        }
        let value: FieldValue = serde_json::from_value(value)?;
        record.set_field(name, value);
    }

    Ok(record)
}

fn write_atomic(path: &Path, contents: &[u8]) -> StorageResult<()> {
    write_atomic_with(path, |writer| {
        writer.write_all(contents)?;
        Ok(())
    })
}

fn write_atomic_with<F>(path: &Path, write: F) -> StorageResult<()>
where
    F: FnOnce(&mut BufWriter<&mut fs::File>) -> StorageResult<()>,
{
    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(dir)?;

    let mut temp = NamedTempFile::new_in(dir)?;
    {
        let mut writer = BufWriter::new(temp.as_file_mut());
        write(&mut writer)?;
        writer.flush()?;
    }
    temp.as_file_mut().sync_all()?;
    temp.persist(path).map_err(|e| StorageError::Io(e.error))?;
    Ok(())
}
