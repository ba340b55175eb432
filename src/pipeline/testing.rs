//! In-memory fetcher for crawl tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::sync::Notify;

use crate::utils::html;
use crate::utils::http::{FetchError, FetchedPage, PageFetcher};

/// Canned response for one URL.
#[derive(Debug, Clone)]
pub enum Stub {
    Page { content: String, links: Vec<String> },
    /// Links are extracted from the markup relative to the fetched URL
    Html(String),
    Status(u16),
    Timeout,
    Fatal,
}

impl Stub {
    pub fn page(content: impl Into<String>, links: &[&str]) -> Self {
        Stub::Page {
            content: content.into(),
            links: links.iter().map(|l| l.to_string()).collect(),
        }
    }
}

/// Serves [`Stub`]s by URL and counts fetches.
///
/// One URL can be gated: its first fetch signals entry and then blocks until
/// [`StubFetcher::release`] is called. Later fetches of it answer at once.
/// Unknown URLs answer 404.
#[derive(Default)]
pub struct StubFetcher {
    pages: HashMap<String, Stub>,
    gate: Option<String>,
    entered: Notify,
    released: Notify,
    fetches: Mutex<HashMap<String, usize>>,
}

impl StubFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, url: &str, stub: Stub) -> Self {
        self.pages.insert(url.to_string(), stub);
        self
    }

    pub fn gated(mut self, url: &str) -> Self {
        self.gate = Some(url.to_string());
        self
    }

    pub async fn wait_entered(&self) {
        self.entered.notified().await;
    }

    pub fn release(&self) {
        self.released.notify_one();
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().unwrap().get(url).copied().unwrap_or(0)
    }

    pub fn total_fetches(&self) -> usize {
        self.fetches.lock().unwrap().values().sum()
    }
}

#[async_trait]
impl PageFetcher for StubFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedPage, FetchError> {
        let attempt = {
            let mut fetches = self.fetches.lock().unwrap();
            let count = fetches.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count
        };

        if self.gate.as_deref() == Some(url) && attempt == 1 {
            self.entered.notify_one();
            self.released.notified().await;
        }

        match self.pages.get(url) {
            Some(Stub::Page { content, links }) => Ok(FetchedPage {
                code: 200,
                content: content.clone(),
                links: links.clone(),
            }),
            Some(Stub::Html(content)) => Ok(FetchedPage {
                code: 200,
                content: content.clone(),
                links: html::extract_links(content, url),
            }),
            Some(Stub::Status(code)) => Err(FetchError::Status {
                code: *code,
                message: reqwest::StatusCode::from_u16(*code)
                    .ok()
                    .and_then(|s| s.canonical_reason())
                    .unwrap_or("unknown")
                    .to_string(),
            }),
            Some(Stub::Timeout) => Err(FetchError::Timeout(format!("{url} timed out"))),
            Some(Stub::Fatal) => Err(FetchError::Other("connection reset by peer".into())),
            None => Err(FetchError::Status {
                code: 404,
                message: "Not Found".into(),
            }),
        }
    }
}
