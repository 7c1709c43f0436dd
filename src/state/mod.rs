//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RecordKey`, `RecordStub`, `Record`: listing identity and enriched data
//! - `CrawlState`: the page cursor and collected records owned by the coordinator
//! - `DedupIndex`: set of keys already collected

mod crawl_state;
mod record;

// Re-export main types
pub use crawl_state::{CrawlState, DedupIndex};
pub use record::{FieldValue, Record, RecordKey, RecordStub};
