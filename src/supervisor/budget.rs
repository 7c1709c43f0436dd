//! Wall-clock ceiling for a single run

use std::time::Duration;
use tokio::time::Instant;

/// Tracks elapsed time against a fixed ceiling
///
/// Pure bookkeeping: the crawl loop asks once per iteration and stops on its
/// own when the budget is spent.
#[derive(Debug, Clone, Copy)]
pub struct RuntimeBudget {
    started: Instant,
    ceiling: Duration,
}

impl RuntimeBudget {
    /// Starts a budget now
    pub fn new(ceiling: Duration) -> Self {
        Self::starting_at(Instant::now(), ceiling)
    }

    pub fn starting_at(started: Instant, ceiling: Duration) -> Self {
        Self { started, ceiling }
    }

    pub fn ceiling(&self) -> Duration {
        self.ceiling
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    pub fn remaining(&self) -> Duration {
        self.ceiling.saturating_sub(self.elapsed())
    }

    /// True once strictly more than the ceiling has elapsed
    pub fn is_exceeded(&self) -> bool {
        self.elapsed() > self.ceiling
    }
}
