//! Rendering and fetch policy
//!
//! This module handles every remote read the crawler makes:
//! - The `Renderer`/`RenderSession` seam for whatever engine produces HTML
//! - `HttpRenderer`, the default engine, built on reqwest
//! - `FetchPolicy`, which wraps one render in retries, settle delays and
//!   error-page detection

use crate::config::FetchConfig;
use async_trait::async_trait;
use rand::{rng, Rng};
use reqwest::Client;
use std::ops::RangeInclusive;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by a single render attempt
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("Timed out waiting for {url}")]
    Timeout { url: String },

    #[error("HTTP {status} from {url}")]
    Status { url: String, status: u16 },

    #[error("Request to {url} failed: {source}")]
    Transport {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Rendering {url} failed: {message}")]
    Render { url: String, message: String },
}

/// A rendering engine that hands out sessions
///
/// A session is the unit of engine resources (a browser tab, a connection).
/// Callers must release every session they acquire.
#[async_trait]
pub trait Renderer: Send + Sync + 'static {
    type Session: RenderSession;

    async fn acquire(&self) -> Result<Self::Session, FetchError>;
}

/// One acquired rendering session
#[async_trait]
pub trait RenderSession: Send + Sized {
    /// Loads `url` and returns its HTML once ready, waiting at most `wait`
    async fn render(&mut self, url: &str, wait: Duration) -> Result<String, FetchError>;

    /// Returns the session's resources to the engine
    async fn release(self);
}

/// Builds an HTTP client with the configured user agent
///
/// # Arguments
///
/// * `config` - The fetch configuration
///
/// # Returns
///
/// * `Ok(Client)` - Successfully built HTTP client
/// * `Err(reqwest::Error)` - Failed to build client
pub fn build_http_client(config: &FetchConfig) -> Result<Client, reqwest::Error> {
    Client::builder()
        .user_agent(config.user_agent.as_str())
        .connect_timeout(Duration::from_secs(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Default renderer: a plain HTTP GET per render
///
/// Tracks how many sessions are open so leaks show up in logs and tests.
#[derive(Debug, Clone)]
pub struct HttpRenderer {
    client: Client,
    open_sessions: Arc<AtomicUsize>,
}

impl HttpRenderer {
    pub fn new(client: Client) -> Self {
        Self {
            client,
            open_sessions: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn from_config(config: &FetchConfig) -> Result<Self, reqwest::Error> {
        Ok(Self::new(build_http_client(config)?))
    }

    /// Number of sessions acquired and not yet released
    pub fn open_sessions(&self) -> usize {
        self.open_sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Renderer for HttpRenderer {
    type Session = HttpSession;

    async fn acquire(&self) -> Result<HttpSession, FetchError> {
        self.open_sessions.fetch_add(1, Ordering::SeqCst);
        Ok(HttpSession {
            client: self.client.clone(),
            open_sessions: Arc::clone(&self.open_sessions),
        })
    }
}

/// Session handed out by `HttpRenderer`
///
/// Dropping the session releases it as well, so a cancelled fetch cannot
/// leave the gauge raised.
#[derive(Debug)]
pub struct HttpSession {
    client: Client,
    open_sessions: Arc<AtomicUsize>,
}

#[async_trait]
impl RenderSession for HttpSession {
    async fn render(&mut self, url: &str, wait: Duration) -> Result<String, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(wait)
            .send()
            .await
            .map_err(|e| classify_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        response.text().await.map_err(|e| classify_error(url, e))
    }

    async fn release(self) {
        drop(self);
    }
}

impl Drop for HttpSession {
    fn drop(&mut self) {
        self.open_sessions.fetch_sub(1, Ordering::SeqCst);
    }
}

fn classify_error(url: &str, error: reqwest::Error) -> FetchError {
    if error.is_timeout() {
        FetchError::Timeout {
            url: url.to_string(),
        }
    } else {
        FetchError::Transport {
            url: url.to_string(),
            source: error,
        }
    }
}

/// What is being fetched; selects the readiness wait and settle delay
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchKind {
    Listing,
    Detail,
}

/// Outcome of a policy-wrapped fetch
#[derive(Debug)]
pub enum FetchResult {
    /// Rendered HTML
    Document(String),

    /// The site served its error page; not retried
    ErrorPage,

    /// Every attempt failed
    Unavailable {
        attempts: u32,
        last_error: FetchError,
    },
}

/// Retry, settle and error-page policy around a `Renderer`
pub struct FetchPolicy<R: Renderer> {
    renderer: R,
    config: FetchConfig,
}

impl<R: Renderer> FetchPolicy<R> {
    pub fn new(renderer: R, config: FetchConfig) -> Self {
        Self { renderer, config }
    }

    /// Fetches `url`, retrying failed renders
    ///
    /// # Retry Logic
    ///
    /// | Condition | Action |
    /// |-----------|--------|
    /// | Render error | Retry up to `max_attempts` total, 1-2 s jittered gap |
    /// | Error marker in HTML | Immediate → ErrorPage |
    /// | No-results marker in HTML | Warn, return Document |
    /// | Success | Settle delay, return Document |
    pub async fn fetch(&self, url: &str, kind: FetchKind) -> FetchResult {
        let max_attempts = self.config.max_attempts.max(1);
        let mut attempt = 1;

        loop {
            match self.attempt(url, kind).await {
                Ok(html) => return self.classify_document(url, html),
                Err(error) if attempt >= max_attempts => {
                    tracing::error!(
                        "Giving up on {} after {} attempts: {}",
                        url,
                        attempt,
                        error
                    );
                    return FetchResult::Unavailable {
                        attempts: attempt,
                        last_error: error,
                    };
                }
                Err(error) => {
                    tracing::warn!(
                        "Attempt {}/{} for {} failed: {}",
                        attempt,
                        max_attempts,
                        url,
                        error
                    );
                }
            }

            attempt += 1;
            tokio::time::sleep(jitter(
                self.config.retry_delay_min_ms..=self.config.retry_delay_max_ms,
            ))
            .await;
        }
    }

    /// One scoped render: acquire, render, settle, release
    async fn attempt(&self, url: &str, kind: FetchKind) -> Result<String, FetchError> {
        let mut session = self.renderer.acquire().await?;
        let result = session.render(url, self.readiness_wait(kind)).await;
        if result.is_ok() {
            tokio::time::sleep(self.settle_delay(kind)).await;
        }
        session.release().await;
        result
    }

    fn classify_document(&self, url: &str, html: String) -> FetchResult {
        if html.contains(&self.config.error_marker) {
            tracing::error!("Error page encountered at {}", url);
            return FetchResult::ErrorPage;
        }

        if !self.config.no_results_marker.is_empty() && html.contains(&self.config.no_results_marker)
        {
            tracing::warn!("No results found on page: {}", url);
        }

        FetchResult::Document(html)
    }

    fn readiness_wait(&self, kind: FetchKind) -> Duration {
        match kind {
            FetchKind::Listing => Duration::from_secs(self.config.page_timeout_secs),
            FetchKind::Detail => Duration::from_secs(self.config.detail_timeout_secs),
        }
    }

    fn settle_delay(&self, kind: FetchKind) -> Duration {
        match kind {
            FetchKind::Listing => {
                jitter(self.config.page_settle_min_ms..=self.config.page_settle_max_ms)
            }
            FetchKind::Detail => {
                jitter(self.config.detail_settle_min_ms..=self.config.detail_settle_max_ms)
            }
        }
    }
}

/// Picks a random delay within the given millisecond bounds
fn jitter(range_ms: RangeInclusive<u64>) -> Duration {
    if range_ms.is_empty() {
        return Duration::from_millis(*range_ms.start());
    }
    Duration::from_millis(rng().random_range(range_ms))
}
