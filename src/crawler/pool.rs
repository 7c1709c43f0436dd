//! Bounded worker pools for listing and detail fetches
//!
//! Both pools live for the whole run. Each holds a semaphore sized to its
//! worker count; every task takes a permit before touching the renderer, so
//! the number of fetches in flight never exceeds the configured bound no
//! matter how many tasks are queued.

use crate::crawler::fetcher::{FetchKind, FetchPolicy, FetchResult, Renderer};
use crate::crawler::parser::Extractor;
use crate::state::{Record, RecordStub};
use crate::url::page_url;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinHandle, JoinSet};
use url::Url;

/// Stubs found on one listing page
#[derive(Debug)]
pub struct PageBatch {
    pub page: u32,
    pub stubs: Vec<RecordStub>,
    /// False if the page could not be fetched at all
    pub fetched: bool,
}

impl PageBatch {
    fn unavailable(page: u32) -> Self {
        Self {
            page,
            stubs: Vec::new(),
            fetched: false,
        }
    }
}

/// Fetches and parses listing pages
pub struct PagePool<R: Renderer, E: Extractor> {
    policy: Arc<FetchPolicy<R>>,
    extractor: Arc<E>,
    base_url: String,
    permits: Arc<Semaphore>,
}

impl<R: Renderer, E: Extractor> PagePool<R, E> {
    pub fn new(
        policy: Arc<FetchPolicy<R>>,
        extractor: Arc<E>,
        base_url: impl Into<String>,
        workers: usize,
    ) -> Self {
        Self {
            policy,
            extractor,
            base_url: base_url.into(),
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Starts fetching listing page `page`
    pub fn spawn(&self, page: u32) -> JoinHandle<PageBatch> {
        let policy = Arc::clone(&self.policy);
        let extractor = Arc::clone(&self.extractor);
        let permits = Arc::clone(&self.permits);
        let url = page_url(&self.base_url, page);

        tokio::spawn(async move {
            let Ok(_permit) = permits.acquire_owned().await else {
                return PageBatch::unavailable(page);
            };

            let listing_url = match Url::parse(&url) {
                Ok(u) => u,
                Err(e) => {
                    tracing::error!("Invalid listing URL {}: {}", url, e);
                    return PageBatch::unavailable(page);
                }
            };

            tracing::debug!("Fetching listing page {}", page);
            match policy.fetch(&url, FetchKind::Listing).await {
                FetchResult::Document(html) => PageBatch {
                    page,
                    stubs: extractor.parse_listing(&html, &listing_url),
                    fetched: true,
                },
                FetchResult::ErrorPage => PageBatch::unavailable(page),
                FetchResult::Unavailable { .. } => {
                    tracing::error!("Skipping listing page {}: unavailable", page);
                    PageBatch::unavailable(page)
                }
            }
        })
    }
}

/// Result of enriching one stub
#[derive(Debug)]
pub enum DetailOutcome {
    Enriched(Record),
    Failed { stub: RecordStub, reason: String },
}

/// Fetches detail pages and enriches stubs
pub struct DetailPool<R: Renderer, E: Extractor> {
    policy: Arc<FetchPolicy<R>>,
    extractor: Arc<E>,
    permits: Arc<Semaphore>,
}

impl<R: Renderer, E: Extractor> DetailPool<R, E> {
    pub fn new(policy: Arc<FetchPolicy<R>>, extractor: Arc<E>, workers: usize) -> Self {
        Self {
            policy,
            extractor,
            permits: Arc::new(Semaphore::new(workers.max(1))),
        }
    }

    /// Permits currently free; equals the worker count when idle
    pub fn available_workers(&self) -> usize {
        self.permits.available_permits()
    }

    /// Starts one enrichment task per stub
    ///
    /// Tasks are independent: one failing or panicking shows up only in its
    /// own join result.
    pub fn submit(&self, stubs: Vec<RecordStub>) -> JoinSet<DetailOutcome> {
        let mut tasks = JoinSet::new();

        for stub in stubs {
            let policy = Arc::clone(&self.policy);
            let extractor = Arc::clone(&self.extractor);
            let permits = Arc::clone(&self.permits);

            tasks.spawn(async move {
                let Ok(_permit) = permits.acquire_owned().await else {
                    return DetailOutcome::Failed {
                        stub,
                        reason: "detail pool closed".to_string(),
                    };
                };

                match policy.fetch(&stub.link, FetchKind::Detail).await {
                    FetchResult::Document(html) => {
                        DetailOutcome::Enriched(extractor.enrich(stub, &html))
                    }
                    FetchResult::ErrorPage => DetailOutcome::Failed {
                        stub,
                        reason: "site error page".to_string(),
                    },
                    FetchResult::Unavailable {
                        attempts,
                        last_error,
                    } => DetailOutcome::Failed {
                        stub,
                        reason: format!("unavailable after {} attempts: {}", attempts, last_error),
                    },
                }
            });
        }

        tasks
    }
}
