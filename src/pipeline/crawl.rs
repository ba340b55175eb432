// src/pipeline/crawl.rs

//! Recursive crawl of one site.
//!
//! Each fetched page becomes a task that stores and indexes the page, then
//! fans out one child task per new in-site link and waits for all of them.
//! Every task of a site shares one [`CrawlContext`]: the visited set, the
//! fetch permits and the run's cancellation state.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use dashmap::DashSet;
use futures::future::BoxFuture;
use rand::Rng;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use url::Url;

use crate::error::{AppError, Result};
use crate::models::{CrawlerConfig, NewPage, PageInsert, Site, SiteStatus};
use crate::pipeline::run::RunContext;
use crate::services::{IndexBuilder, Lemmatizer};
use crate::storage::SearchStorage;
use crate::utils::http::{FetchError, FetchedPage, PageFetcher};
use crate::utils::url::{is_crawlable_link, page_path};

/// Counters reported when a site crawl finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlOutcome {
    pub pages_indexed: usize,
    pub pages_skipped: usize,
    pub fetch_failures: usize,
}

impl fmt::Display for CrawlOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} pages indexed, {} already stored, {} failed fetches",
            self.pages_indexed, self.pages_skipped, self.fetch_failures
        )
    }
}

#[derive(Debug, Default)]
struct Counters {
    indexed: AtomicUsize,
    skipped: AtomicUsize,
    failed: AtomicUsize,
}

/// State shared by every crawl task of one site.
pub struct CrawlContext {
    site: Site,
    root: Url,
    storage: Arc<dyn SearchStorage>,
    fetcher: Arc<dyn PageFetcher>,
    lemmatizer: Lemmatizer,
    indexer: IndexBuilder,
    config: Arc<CrawlerConfig>,
    run: RunContext,
    visited: DashSet<String>,
    permits: Semaphore,
    counters: Counters,
}

impl CrawlContext {
    pub fn new(
        site: Site,
        storage: Arc<dyn SearchStorage>,
        fetcher: Arc<dyn PageFetcher>,
        lemmatizer: Lemmatizer,
        config: Arc<CrawlerConfig>,
        run: RunContext,
    ) -> Result<Self> {
        let root = Url::parse(&site.url)?;
        let permits = Semaphore::new(config.max_concurrent.max(1));
        Ok(Self {
            site,
            root,
            indexer: IndexBuilder::new(Arc::clone(&storage)),
            storage,
            fetcher,
            lemmatizer,
            config,
            run,
            visited: DashSet::new(),
            permits,
            counters: Counters::default(),
        })
    }

    fn outcome(&self) -> CrawlOutcome {
        CrawlOutcome {
            pages_indexed: self.counters.indexed.load(Ordering::Relaxed),
            pages_skipped: self.counters.skipped.load(Ordering::Relaxed),
            fetch_failures: self.counters.failed.load(Ordering::Relaxed),
        }
    }

    /// Fetch, store and index one page, returning the links to follow.
    async fn visit(&self, url: &str) -> Result<Vec<String>> {
        let fetched = {
            let _permit = self
                .permits
                .acquire()
                .await
                .map_err(|e| AppError::fetch(url, e))?;
            self.throttle().await;
            log::debug!("Fetching {url}");
            self.fetcher.fetch(url).await
        };

        match fetched {
            Ok(page) => self.store(url, page).await,
            Err(error) => match error.recorded_status() {
                Some(code) => {
                    self.record_failure(url, code, &error).await?;
                    Ok(Vec::new())
                }
                None => Err(AppError::fetch(url, error)),
            },
        }
    }

    async fn throttle(&self) {
        let (min, max) = (self.config.min_delay_ms, self.config.max_delay_ms);
        let delay = if max > min {
            rand::thread_rng().gen_range(min..=max)
        } else {
            min
        };
        if delay > 0 {
            tokio::time::sleep(Duration::from_millis(delay)).await;
        }
    }

    async fn store(&self, url: &str, fetched: FetchedPage) -> Result<Vec<String>> {
        let page = NewPage {
            site_id: self.site.id,
            path: page_path(&self.root, url),
            code: fetched.code,
            content: fetched.content,
        };

        match self.storage.insert_page(page).await? {
            PageInsert::Exists(page_id) => {
                log::debug!("Page {url} already stored as {page_id}, skipping");
                self.counters.skipped.fetch_add(1, Ordering::Relaxed);
            }
            PageInsert::SiteGone => {
                log::debug!("Site of {url} was deleted, dropping the page");
                return Ok(Vec::new());
            }
            PageInsert::Inserted(page) => {
                let counts = self.lemmatizer.page_lemmas(&page.content);
                let lemmas = self.indexer.index_page(&page, &counts).await?;
                self.indexer.save_entries(&lemmas).await?;
                self.counters.indexed.fetch_add(1, Ordering::Relaxed);
                log::info!("Indexed {url} ({} lemmas)", lemmas.lemmas.len());
            }
        }

        Ok(fetched
            .links
            .into_iter()
            .filter(|link| {
                is_crawlable_link(link, &self.root, url, &self.config.skip_extensions)
            })
            .collect())
    }

    /// Remote error or timeout: keep the page with its status and go on.
    async fn record_failure(&self, url: &str, code: u16, error: &FetchError) -> Result<()> {
        log::warn!("Fetching {url} failed with status {code}: {error}");
        self.counters.failed.fetch_add(1, Ordering::Relaxed);

        self.storage
            .insert_page(NewPage {
                site_id: self.site.id,
                path: page_path(&self.root, url),
                code,
                content: String::new(),
            })
            .await?;

        let (FetchError::Status { message: reason, .. }
        | FetchError::Timeout(reason)
        | FetchError::Other(reason)) = error;
        self.storage
            .record_site_error(
                self.site.id,
                format!("Connection error. Status code - {code}. Reason: {reason}"),
            )
            .await
    }

    /// Fatal failure: the site fails and the whole run stops.
    async fn abort(&self, url: &str, error: AppError) {
        log::error!("Aborting crawl of {} at {url}: {error}", self.site.url);
        if let Err(e) = self
            .storage
            .set_site_status(self.site.id, SiteStatus::Failed, Some(error.to_string()))
            .await
        {
            log::error!("Could not mark {} as failed: {e}", self.site.url);
        }
        self.run.abort();
    }
}

/// Crawl a site from its root URL until every reachable page is visited.
pub async fn crawl_site(ctx: Arc<CrawlContext>) -> CrawlOutcome {
    let root = ctx.site.url.clone();
    // Parsed links spell the root with a trailing slash and a canonical host
    ctx.visited.insert(format!("{}/", root.trim_end_matches('/')));
    ctx.visited.insert(ctx.root.to_string());
    ctx.visited.insert(root.clone());
    crawl_page(Arc::clone(&ctx), root).await;
    ctx.outcome()
}

fn crawl_page(ctx: Arc<CrawlContext>, url: String) -> BoxFuture<'static, ()> {
    Box::pin(async move {
        if ctx.run.is_cancelled() {
            log::debug!("Run cancelled, not fetching {url}");
            return;
        }

        let links = match ctx.visit(&url).await {
            Ok(links) => links,
            Err(error) if ctx.run.is_cancelled() => {
                log::debug!("Dropping {url} of a cancelled run: {error}");
                return;
            }
            Err(error) => {
                ctx.abort(&url, error).await;
                return;
            }
        };

        if ctx.run.is_cancelled() {
            return;
        }

        let mut children = JoinSet::new();
        for link in links {
            if ctx.visited.insert(link.clone()) {
                children.spawn(crawl_page(Arc::clone(&ctx), link));
            }
        }

        while let Some(joined) = children.join_next().await {
            if let Err(e) = joined {
                log::error!("Crawl task under {url} failed: {e}");
            }
        }
    })
}
