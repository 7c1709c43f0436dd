//! In-memory crawl progress
//!
//! `CrawlState` is owned by the coordinator and is the only place collected
//! records live during a run. Workers never touch it; they hand their results
//! back and the coordinator merges them one at a time.

use crate::state::record::{Record, RecordKey, RecordStub};
use std::collections::HashSet;

/// Set of record keys that have already been collected
#[derive(Debug, Default, Clone)]
pub struct DedupIndex {
    keys: HashSet<RecordKey>,
}

impl DedupIndex {
    /// Builds the index from records loaded out of a checkpoint
    pub fn from_records<'a>(records: impl IntoIterator<Item = &'a Record>) -> Self {
        Self {
            keys: records.into_iter().map(|r| r.key().clone()).collect(),
        }
    }

    pub fn contains(&self, key: &RecordKey) -> bool {
        self.keys.contains(key)
    }

    /// Adds a key, returning false if it was already present
    pub fn insert(&mut self, key: RecordKey) -> bool {
        self.keys.insert(key)
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }
}

/// Progress of a crawl: the page cursor plus everything collected so far
#[derive(Debug, Clone)]
pub struct CrawlState {
    /// Next listing page not yet fully processed (1-based)
    current_page: u32,
    collected: Vec<Record>,
    index: DedupIndex,
}

impl Default for CrawlState {
    fn default() -> Self {
        Self::new()
    }
}

impl CrawlState {
    /// Creates an empty state positioned on the first page
    pub fn new() -> Self {
        Self {
            current_page: 1,
            collected: Vec::new(),
            index: DedupIndex::default(),
        }
    }

    /// Rebuilds a state from checkpointed data
    ///
    /// Records whose key repeats an earlier one are dropped, so a damaged data
    /// file can never smuggle duplicates back into a run.
    pub fn restore(current_page: u32, records: Vec<Record>) -> Self {
        let mut state = Self {
            current_page: current_page.max(1),
            collected: Vec::with_capacity(records.len()),
            index: DedupIndex::default(),
        };

        for record in records {
            if !state.merge(record) {
                tracing::warn!("Dropping duplicate record found in checkpoint data");
            }
        }

        state
    }

    pub fn current_page(&self) -> u32 {
        self.current_page
    }

    /// Number of records merged so far; always equal to `collected().len()`
    pub fn scraped_count(&self) -> usize {
        self.collected.len()
    }

    pub fn collected(&self) -> &[Record] {
        &self.collected
    }

    pub fn into_records(self) -> Vec<Record> {
        self.collected
    }

    pub fn is_collected(&self, key: &RecordKey) -> bool {
        self.index.contains(key)
    }

    /// Keeps only the stubs that still need enrichment
    ///
    /// A stub is dropped if its key is already collected or if an earlier stub
    /// in the same batch has the same key. Batch order is preserved.
    pub fn filter_new(&self, stubs: Vec<RecordStub>) -> Vec<RecordStub> {
        let mut seen = HashSet::new();
        stubs
            .into_iter()
            .filter(|stub| !self.index.contains(&stub.key) && seen.insert(stub.key.clone()))
            .collect()
    }

    /// Appends an enriched record
    ///
    /// Returns false, leaving the state untouched, if the key is already collected.
    pub fn merge(&mut self, record: Record) -> bool {
        if !self.index.insert(record.key().clone()) {
            return false;
        }
        self.collected.push(record);
        true
    }

    /// Moves the cursor to the next listing page
    ///
    /// Saturates at `u32::MAX`; configured page counts stay below it.
    pub fn advance_page(&mut self) {
        self.current_page = self.current_page.saturating_add(1);
    }
}
