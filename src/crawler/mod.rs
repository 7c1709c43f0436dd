//! Crawler module for listing harvesting
//!
//! This module contains the core crawling logic, including:
//! - Rendering with retry and settle policy
//! - Listing and detail extraction
//! - Bounded page and detail worker pools
//! - Overall crawl coordination

mod coordinator;
mod fetcher;
mod parser;
mod pool;

#[cfg(test)]
pub(crate) mod testing;

pub use coordinator::Coordinator;
pub use fetcher::{
    build_http_client, FetchError, FetchKind, FetchPolicy, FetchResult, HttpRenderer, HttpSession,
    RenderSession, Renderer,
};
pub use parser::{Extractor, SelectorExtractor};
pub use pool::{DetailOutcome, DetailPool, PageBatch, PagePool};

use crate::config::{validate, Config};
use crate::state::CrawlState;
use crate::storage::{write_records, CheckpointStore, JsonCheckpointStore, RunLedger, RunStatus};
use crate::supervisor::{
    spawn_interrupt_listener, spawn_watchdog, stop_channel, LoadSampler, RestartMarker,
    RuntimeBudget, SystemLoadSampler, RESTART_EXIT_CODE,
};
use crate::Result;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

/// How a crawl run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrawlOutcome {
    /// Ran out of pages or reached the record limit
    Completed,
    /// The runtime budget was spent
    BudgetExceeded,
    /// Stopped by Ctrl+C
    Interrupted,
    /// Stopped by the watchdog; the process should be relaunched
    WatchdogRestart,
}

impl CrawlOutcome {
    /// Process exit code for this outcome
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::WatchdogRestart => RESTART_EXIT_CODE,
            _ => 0,
        }
    }

    fn run_status(&self) -> RunStatus {
        match self {
            Self::Completed => RunStatus::Completed,
            Self::BudgetExceeded => RunStatus::BudgetExceeded,
            Self::Interrupted => RunStatus::Interrupted,
            Self::WatchdogRestart => RunStatus::WatchdogRestart,
        }
    }

    /// Whether the collected records should be exported as final output
    fn exports_results(&self) -> bool {
        matches!(self, Self::Completed | Self::BudgetExceeded)
    }
}

/// Per-invocation options that are not part of the configuration file
#[derive(Debug, Clone, Default)]
pub struct CrawlOptions {
    /// Ignore and overwrite any existing checkpoint
    pub fresh: bool,
    /// Overrides `crawler.runtime-budget-secs`
    pub runtime_budget: Option<Duration>,
    /// Hash of the configuration, recorded in the run ledger
    pub config_hash: String,
}

/// Summary of a finished crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub outcome: CrawlOutcome,
    pub current_page: u32,
    pub scraped_count: usize,
    pub run_id: Option<i64>,
    pub elapsed: Duration,
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Validate the configuration
/// 2. Consume a restart marker, waiting out the grace period
/// 3. Load the checkpoint (or start fresh)
/// 4. Record the run in the ledger
/// 5. Start the interrupt listener and the watchdog
/// 6. Run the coordinator
/// 7. Export results, or leave a restart marker behind
///
/// # Arguments
///
/// * `config` - The harvest configuration
/// * `options` - Invocation options
///
/// # Returns
///
/// * `Ok(CrawlReport)` - The crawl stopped cleanly; see `outcome` for why
/// * `Err(HarvestError)` - Setup failed before crawling could start
pub async fn crawl(config: Config, options: CrawlOptions) -> Result<CrawlReport> {
    crawl_with_samplers(
        config,
        options,
        SystemLoadSampler::new(),
        Box::new(SystemLoadSampler::new()),
    )
    .await
}

/// Runs a crawl with explicit load samplers
///
/// `watchdog_sampler` feeds the background watchdog (when enabled) and
/// `inline_sampler` the per-page backpressure check. `crawl` uses the
/// host's CPU load for both.
pub async fn crawl_with_samplers<W>(
    config: Config,
    options: CrawlOptions,
    watchdog_sampler: W,
    inline_sampler: Box<dyn LoadSampler>,
) -> Result<CrawlReport>
where
    W: LoadSampler + 'static,
{
    validate(&config)?;

    let ceiling = options
        .runtime_budget
        .unwrap_or_else(|| Duration::from_secs(config.crawler.runtime_budget_secs));
    let budget = RuntimeBudget::new(ceiling);

    let marker = RestartMarker::new(&config.output.marker_path);
    if marker.consume()? {
        tracing::info!(
            "Restart marker found. Waiting {}s for the previous instance to exit...",
            config.crawler.restart_grace_secs
        );
        tokio::time::sleep(Duration::from_secs(config.crawler.restart_grace_secs)).await;
    }

    let store = JsonCheckpointStore::new(&config.output.data_path, &config.output.state_path);
    let state = load_initial_state(&store, options.fresh)?;

    let mut ledger = open_ledger(&config.output.database_path);
    let run_id = ledger.as_mut().and_then(|ledger| {
        ledger
            .start_run(&options.config_hash, state.current_page())
            .map_err(|e| tracing::warn!("Failed to record run start: {}", e))
            .ok()
    });
    if let Some(id) = run_id {
        tracing::info!("Starting run {}", id);
    }

    let (stop_handle, mut stop_signal) = stop_channel();
    let interrupt = spawn_interrupt_listener(stop_handle.clone());
    let watchdog = config.watchdog.enabled.then(|| {
        spawn_watchdog(&config.watchdog, watchdog_sampler, stop_handle.clone())
    });
    drop(stop_handle);

    let renderer = HttpRenderer::from_config(&config.fetch)?;
    let extractor = SelectorExtractor::from_config(&config.extractor)?;
    let config = Arc::new(config);

    let mut coordinator = Coordinator::new(Arc::clone(&config), store, renderer, extractor)
        .with_state(state)
        .with_budget(budget)
        .with_load_sampler(inline_sampler);

    let outcome = coordinator.run(&mut stop_signal).await;

    interrupt.abort();
    if let Some(watchdog) = watchdog {
        watchdog.abort();
    }

    let state = coordinator.into_state();

    if outcome.exports_results() {
        export_final(&config.output.final_path, &state);
    }

    if outcome == CrawlOutcome::WatchdogRestart {
        match marker.write() {
            Ok(()) => tracing::info!("Restart marker written to {}", marker.path().display()),
            Err(e) => tracing::error!("Failed to write restart marker: {}", e),
        }
    }

    if let (Some(ledger), Some(run_id)) = (ledger.as_mut(), run_id) {
        record_run_end(ledger, run_id, outcome, &state);
    }

    Ok(CrawlReport {
        outcome,
        current_page: state.current_page(),
        scraped_count: state.scraped_count(),
        run_id,
        elapsed: budget.elapsed(),
    })
}

/// Loads the checkpoint, falling back to an empty state
///
/// An unusable checkpoint is logged and ignored rather than failing the run.
fn load_initial_state(store: &JsonCheckpointStore, fresh: bool) -> Result<CrawlState> {
    if fresh {
        tracing::info!("Starting fresh crawl (ignoring previous progress)");
        store.clear()?;
        return Ok(CrawlState::new());
    }

    match store.load() {
        Ok(Some(state)) => Ok(state),
        Ok(None) => {
            tracing::info!("No saved progress found, starting from page 1");
            Ok(CrawlState::new())
        }
        Err(e) => {
            tracing::error!("Error loading progress: {}. Starting from page 1", e);
            Ok(CrawlState::new())
        }
    }
}

fn open_ledger(path: &str) -> Option<RunLedger> {
    if path.is_empty() {
        return None;
    }

    match RunLedger::open(Path::new(path)) {
        Ok(ledger) => Some(ledger),
        Err(e) => {
            tracing::warn!("Run ledger unavailable ({}): {}", path, e);
            None
        }
    }
}

fn export_final(path: &str, state: &CrawlState) {
    match write_records(Path::new(path), state.collected()) {
        Ok(()) => tracing::info!(
            "Scraping completed. Total records scraped: {}. Saved to {}",
            state.scraped_count(),
            path
        ),
        Err(e) => tracing::error!("Failed to write final export {}: {}", path, e),
    }
}

fn record_run_end(ledger: &mut RunLedger, run_id: i64, outcome: CrawlOutcome, state: &CrawlState) {
    if outcome.exports_results() {
        match ledger.export_records(run_id, state.collected()) {
            Ok(count) => tracing::debug!("Exported {} records to the run ledger", count),
            Err(e) => tracing::warn!("Failed to export records to the run ledger: {}", e),
        }
    }

    if let Err(e) = ledger.finish_run(
        run_id,
        outcome.run_status(),
        state.current_page(),
        state.scraped_count(),
    ) {
        tracing::warn!("Failed to record run end: {}", e);
    }
}
