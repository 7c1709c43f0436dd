//! Output module for reporting on harvest runs
//!
//! The final record export itself is written by the storage layer; this
//! module turns the run ledger into human-readable statistics.

pub mod stats;

pub use stats::{load_run_history, print_run_history, run_duration_secs, RunHistory};
