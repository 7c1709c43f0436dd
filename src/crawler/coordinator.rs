//! Crawler coordinator - main crawl orchestration logic
//!
//! The coordinator owns the `CrawlState` and is the only code that mutates
//! it. Each iteration of the loop:
//! 1. Stops if the pages or the record limit are exhausted, or the runtime
//!    budget is spent
//! 2. Fetches and parses the current listing page
//! 3. Drops stubs that are already collected
//! 4. Fans the rest out to the detail pool and merges results as they finish
//! 5. Advances the page cursor
//! 6. Applies backpressure and the inter-page pause
//!
//! Interrupts and watchdog requests arrive on the stop channel and cancel the
//! current iteration at its next await point. Every exit path checkpoints.

use crate::config::Config;
use crate::crawler::fetcher::{FetchPolicy, Renderer};
use crate::crawler::parser::Extractor;
use crate::crawler::pool::{DetailOutcome, DetailPool, PageBatch, PagePool};
use crate::crawler::CrawlOutcome;
use crate::state::CrawlState;
use crate::storage::CheckpointStore;
use crate::supervisor::{LoadSampler, RuntimeBudget, StopReason, StopSignal, SystemLoadSampler};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};

/// Main crawler coordinator structure
pub struct Coordinator<R: Renderer, E: Extractor, S: CheckpointStore> {
    config: Arc<Config>,
    state: CrawlState,
    store: S,
    pages: PagePool<R, E>,
    details: DetailPool<R, E>,
    budget: RuntimeBudget,
    load: Box<dyn LoadSampler>,
}

impl<R: Renderer, E: Extractor, S: CheckpointStore> Coordinator<R, E, S> {
    /// Creates a coordinator starting from an empty state
    ///
    /// # Arguments
    ///
    /// * `config` - The harvest configuration
    /// * `store` - Where checkpoints are written
    /// * `renderer` - Engine used for every fetch
    /// * `extractor` - Turns rendered pages into stubs and records
    pub fn new(config: Arc<Config>, store: S, renderer: R, extractor: E) -> Self {
        let policy = Arc::new(FetchPolicy::new(renderer, config.fetch.clone()));
        let extractor = Arc::new(extractor);

        let pages = PagePool::new(
            Arc::clone(&policy),
            Arc::clone(&extractor),
            config.crawler.base_url.clone(),
            config.crawler.page_workers,
        );
        let details = DetailPool::new(policy, extractor, config.crawler.detail_workers);
        let budget = RuntimeBudget::new(Duration::from_secs(config.crawler.runtime_budget_secs));

        Self {
            config,
            state: CrawlState::new(),
            store,
            pages,
            details,
            budget,
            load: Box::new(SystemLoadSampler::new()),
        }
    }

    /// Resumes from a previously loaded state
    pub fn with_state(mut self, state: CrawlState) -> Self {
        self.state = state;
        self
    }

    /// Replaces the default budget, e.g. one started at process launch
    pub fn with_budget(mut self, budget: RuntimeBudget) -> Self {
        self.budget = budget;
        self
    }

    /// Replaces the sampler used for the inline backpressure check
    pub fn with_load_sampler(mut self, sampler: Box<dyn LoadSampler>) -> Self {
        self.load = sampler;
        self
    }

    pub fn state(&self) -> &CrawlState {
        &self.state
    }

    pub fn into_state(self) -> CrawlState {
        self.state
    }

    /// Runs the crawl loop until it completes, runs out of time, or is stopped
    ///
    /// The state is checkpointed before this returns, whatever the outcome.
    pub async fn run(&mut self, stop: &mut StopSignal) -> CrawlOutcome {
        let limit = self.config.crawler.limit;
        let max_pages = self.config.crawler.max_pages;

        tracing::info!(
            "Starting crawl at page {} with {} records already collected",
            self.state.current_page(),
            self.state.scraped_count()
        );

        let mut prefetched: Option<(u32, JoinHandle<PageBatch>)> = None;

        let outcome = loop {
            if self.state.current_page() > max_pages || self.state.scraped_count() >= limit {
                break CrawlOutcome::Completed;
            }

            if self.budget.is_exceeded() {
                tracing::info!(
                    "Maximum runtime of {}s exceeded. Saving progress and stopping.",
                    self.budget.ceiling().as_secs()
                );
                break CrawlOutcome::BudgetExceeded;
            }

            let stopped = tokio::select! {
                biased;
                Some(reason) = stop.recv() => Some(reason),
                () = self.process_current_page(&mut prefetched) => None,
            };
            if let Some(reason) = stopped {
                break Self::stop_outcome(reason);
            }

            if self.state.current_page() > max_pages || self.state.scraped_count() >= limit {
                continue;
            }

            let stopped = tokio::select! {
                biased;
                Some(reason) = stop.recv() => Some(reason),
                () = self.relieve_pressure() => None,
            };
            if let Some(reason) = stopped {
                break Self::stop_outcome(reason);
            }
        };

        if let Some((page, handle)) = prefetched.take() {
            tracing::debug!("Discarding prefetched listing page {}", page);
            handle.abort();
        }

        self.checkpoint();
        tracing::info!(
            "Crawl finished ({:?}) at page {} with {} records",
            outcome,
            self.state.current_page(),
            self.state.scraped_count()
        );
        outcome
    }

    fn stop_outcome(reason: StopReason) -> CrawlOutcome {
        match reason {
            StopReason::Interrupted => CrawlOutcome::Interrupted,
            StopReason::Overloaded => CrawlOutcome::WatchdogRestart,
        }
    }

    /// Processes the page under the cursor, then advances the cursor
    async fn process_current_page(&mut self, prefetched: &mut Option<(u32, JoinHandle<PageBatch>)>) {
        let page = self.state.current_page();

        let handle = match prefetched.take() {
            Some((p, handle)) if p == page => handle,
            Some((_, stale)) => {
                stale.abort();
                self.pages.spawn(page)
            }
            None => self.pages.spawn(page),
        };

        let batch = match handle.await {
            Ok(batch) => batch,
            Err(e) => {
                tracing::error!("Listing task for page {} failed: {}", page, e);
                PageBatch {
                    page,
                    stubs: Vec::new(),
                    fetched: false,
                }
            }
        };

        if self.config.crawler.page_workers >= 2 && page < self.config.crawler.max_pages {
            *prefetched = Some((page + 1, self.pages.spawn(page + 1)));
        }

        let found = batch.stubs.len();
        let fresh = self.state.filter_new(batch.stubs);
        tracing::info!(
            "Page {}: {} listings found, {} new",
            page,
            found,
            fresh.len()
        );

        if !fresh.is_empty() {
            let mut tasks = self.details.submit(fresh);
            self.merge_details(page, &mut tasks).await;
        }

        self.state.advance_page();
    }

    /// Merges detail results in completion order
    ///
    /// Stops merging once the record limit is reached; unfinished tasks are
    /// detached and their results ignored.
    async fn merge_details(&mut self, page: u32, tasks: &mut JoinSet<DetailOutcome>) {
        let limit = self.config.crawler.limit;
        let interval = self.config.crawler.checkpoint_interval.max(1);

        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(DetailOutcome::Enriched(record)) => {
                    let title = record.stub.title.clone();
                    if !self.state.merge(record) {
                        tracing::debug!("Skipping duplicate record '{}'", title);
                        continue;
                    }

                    let count = self.state.scraped_count();
                    tracing::info!(
                        "Scraped {}/{} (page {}): {}",
                        count,
                        limit,
                        page,
                        title
                    );

                    if count % interval == 0 {
                        self.checkpoint();
                    }

                    if count >= limit {
                        tracing::info!("Reached the limit of {} records", limit);
                        tasks.detach_all();
                        break;
                    }
                }
                Ok(DetailOutcome::Failed { stub, reason }) => {
                    tracing::warn!("Dropping '{}' ({}): {}", stub.title, stub.link, reason);
                }
                Err(e) => {
                    tracing::error!("Detail task failed: {}", e);
                }
            }
        }
    }

    /// Inline backpressure check followed by the fixed inter-page pause
    ///
    /// Runs whether or not the watchdog task is enabled.
    async fn relieve_pressure(&mut self) {
        let watchdog = &self.config.watchdog;
        let load = self.load.sample();
        if load > watchdog.threshold_percent {
            tracing::warn!("High CPU usage detected ({:.1}%). Pausing...", load);
            tokio::time::sleep(Duration::from_millis(watchdog.backpressure_pause_ms)).await;
        }

        tokio::time::sleep(Duration::from_millis(self.config.crawler.page_pause_ms)).await;
    }

    /// Saves a checkpoint; failures are logged and the run continues
    fn checkpoint(&self) {
        if let Err(e) = self.store.save(&self.state) {
            tracing::error!("Error saving progress: {}", e);
        }
    }
}
