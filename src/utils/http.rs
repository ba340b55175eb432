// src/utils/http.rs

//! HTTP fetching for crawl tasks.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, REFERER};
use thiserror::Error;

use crate::error::{AppError, Result};
use crate::models::CrawlerConfig;
use crate::utils::html;

/// Status code recorded for pages whose request timed out.
pub const TIMEOUT_STATUS: u16 = 408;

/// A successfully fetched page.
#[derive(Debug, Clone)]
pub struct FetchedPage {
    pub code: u16,
    pub content: String,
    /// Absolute link targets found in the document
    pub links: Vec<String>,
}

/// Typed fetch failure.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-2xx status
    #[error("HTTP status {code}: {message}")]
    Status { code: u16, message: String },

    /// The request did not complete in time
    #[error("request timed out: {0}")]
    Timeout(String),

    /// Any other transport failure
    #[error("{0}")]
    Other(String),
}

impl FetchError {
    /// Status code to record on the page, `None` for fatal failures.
    pub fn recorded_status(&self) -> Option<u16> {
        match self {
            FetchError::Status { code, .. } => Some(*code),
            FetchError::Timeout(_) => Some(TIMEOUT_STATUS),
            FetchError::Other(_) => None,
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            FetchError::Timeout(e.to_string())
        } else if let Some(status) = e.status() {
            FetchError::Status {
                code: status.as_u16(),
                message: e.to_string(),
            }
        } else {
            FetchError::Other(e.to_string())
        }
    }
}

/// Fetch collaborator used by crawl tasks.
#[async_trait]
pub trait PageFetcher: Send + Sync {
    /// Fetch `url`, returning the document and its links on a 2xx response.
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError>;
}

/// Create a configured asynchronous HTTP client.
pub fn create_async_client(config: &CrawlerConfig) -> Result<reqwest::Client> {
    let mut headers = HeaderMap::new();
    let referrer = HeaderValue::from_str(&config.referrer)
        .map_err(|e| AppError::config(format!("invalid crawler.referrer: {e}")))?;
    headers.insert(REFERER, referrer);

    let client = reqwest::Client::builder()
        .user_agent(&config.user_agent)
        .default_headers(headers)
        .timeout(Duration::from_secs(config.timeout_secs))
        .build()?;
    Ok(client)
}

/// `PageFetcher` backed by reqwest.
#[derive(Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
}

impl HttpFetcher {
    pub fn new(config: &CrawlerConfig) -> Result<Self> {
        Ok(Self {
            client: create_async_client(config)?,
        })
    }
}

#[async_trait]
impl PageFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> std::result::Result<FetchedPage, FetchError> {
        let response = self.client.get(url).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                code: status.as_u16(),
                message: status.canonical_reason().unwrap_or("unknown").to_string(),
            });
        }

        let content = response.text().await?;
        let links = html::extract_links(&content, url);
        Ok(FetchedPage {
            code: status.as_u16(),
            content,
            links,
        })
    }
}
