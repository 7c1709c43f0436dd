//! Scripted renderer for unit tests

use crate::crawler::fetcher::{FetchError, RenderSession, Renderer};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::time::Instant;

/// Scripted response for one render
#[derive(Debug, Clone)]
pub enum Reply {
    Html(String),
    Fail,
    /// Waits before answering, holding the session
    Slow(Duration, String),
}

#[derive(Debug, Default)]
struct Inner {
    replies: HashMap<String, VecDeque<Reply>>,
    renders: HashMap<String, Vec<Instant>>,
    acquired: usize,
    released: usize,
    in_flight: usize,
    max_in_flight: usize,
}

/// Renderer answering from a per-URL script
///
/// Each URL has a queue of replies; the last one repeats forever. URLs with
/// no script fail.
#[derive(Debug, Clone, Default)]
pub struct MockRenderer {
    inner: Arc<Mutex<Inner>>,
}

impl MockRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, url: &str, reply: Reply) {
        self.set_sequence(url, vec![reply]);
    }

    pub fn set_sequence(&self, url: &str, replies: Vec<Reply>) {
        self.inner
            .lock()
            .unwrap()
            .replies
            .insert(url.to_string(), replies.into());
    }

    pub fn render_count(&self, url: &str) -> usize {
        self.render_times(url).len()
    }

    pub fn render_times(&self, url: &str) -> Vec<Instant> {
        self.inner
            .lock()
            .unwrap()
            .renders
            .get(url)
            .cloned()
            .unwrap_or_default()
    }

    pub fn acquired(&self) -> usize {
        self.inner.lock().unwrap().acquired
    }

    pub fn released(&self) -> usize {
        self.inner.lock().unwrap().released
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.lock().unwrap().max_in_flight
    }

    fn next_reply(&self, url: &str) -> Reply {
        let mut inner = self.inner.lock().unwrap();
        inner
            .renders
            .entry(url.to_string())
            .or_default()
            .push(Instant::now());

        match inner.replies.get_mut(url) {
            Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or(Reply::Fail),
            Some(queue) => queue.front().cloned().unwrap_or(Reply::Fail),
            None => Reply::Fail,
        }
    }
}

#[async_trait]
impl Renderer for MockRenderer {
    type Session = MockSession;

    async fn acquire(&self) -> Result<MockSession, FetchError> {
        self.inner.lock().unwrap().acquired += 1;
        Ok(MockSession {
            renderer: self.clone(),
        })
    }
}

pub struct MockSession {
    renderer: MockRenderer,
}

#[async_trait]
impl RenderSession for MockSession {
    async fn render(&mut self, url: &str, _wait: Duration) -> Result<String, FetchError> {
        match self.renderer.next_reply(url) {
            Reply::Html(html) => Ok(html),
            Reply::Fail => Err(FetchError::Render {
                url: url.to_string(),
                message: "scripted failure".to_string(),
            }),
            Reply::Slow(delay, html) => {
                {
                    let mut inner = self.renderer.inner.lock().unwrap();
                    inner.in_flight += 1;
                    inner.max_in_flight = inner.max_in_flight.max(inner.in_flight);
                }
                tokio::time::sleep(delay).await;
                self.renderer.inner.lock().unwrap().in_flight -= 1;
                Ok(html)
            }
        }
    }

    async fn release(self) {
        self.renderer.inner.lock().unwrap().released += 1;
    }
}
