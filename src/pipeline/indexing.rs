// src/pipeline/indexing.rs

//! Indexing runs over the configured sites.
//!
//! - `start_all`: wipe storage and crawl every configured site in turn
//! - `start_one`: re-crawl a single configured site
//! - `stop`: cancel the active run and fail every site still indexing

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::error::{AppError, Result};
use crate::models::{Config, Site, SiteConfig, SiteStatus};
use crate::pipeline::crawl::{self, CrawlContext};
use crate::pipeline::run::{RunContext, RunFlag};
use crate::services::Lemmatizer;
use crate::storage::SearchStorage;
use crate::utils::http::PageFetcher;

const STOPPED_BY_USER: &str = "Indexing stopped by user";
const ABORTED: &str = "Indexing aborted";

/// Starts, tracks and stops indexing runs.
#[derive(Clone)]
pub struct IndexingService {
    config: Arc<Config>,
    storage: Arc<dyn SearchStorage>,
    fetcher: Arc<dyn PageFetcher>,
    lemmatizer: Lemmatizer,
    flag: Arc<RunFlag>,
}

impl IndexingService {
    pub fn new(
        config: Arc<Config>,
        storage: Arc<dyn SearchStorage>,
        fetcher: Arc<dyn PageFetcher>,
        lemmatizer: Lemmatizer,
    ) -> Self {
        Self {
            config,
            storage,
            fetcher,
            lemmatizer,
            flag: RunFlag::new(),
        }
    }

    /// Whether a run is in progress.
    pub fn is_indexing(&self) -> bool {
        self.flag.is_running()
    }

    /// Wipe all stored data and index every configured site.
    ///
    /// Returns once the run is set up; the crawl continues on the returned
    /// task.
    pub async fn start_all(&self) -> Result<JoinHandle<()>> {
        let run = self.flag.try_begin().inspect_err(|_| {
            log::warn!("Indexing requested while a run is in progress");
        })?;
        log::info!("Starting indexing run {} over {} sites", run.id(), self.config.sites.len());

        let sites = match self.prepare_all().await {
            Ok(sites) => sites,
            Err(e) => {
                run.finish();
                return Err(e);
            }
        };

        let this = self.clone();
        Ok(tokio::spawn(async move {
            this.index_sites(sites, run).await;
        }))
    }

    /// Delete and re-index one configured site, matched by URL or name.
    pub async fn start_one(&self, url: &str) -> Result<JoinHandle<()>> {
        let Some(configured) = self.config.find_site(url).cloned() else {
            log::warn!("Site {url} is not in the configuration");
            return Err(AppError::SiteNotConfigured {
                url: url.to_string(),
            });
        };

        let run = self.flag.try_begin().inspect_err(|_| {
            log::warn!("Indexing of {url} requested while a run is in progress");
        })?;
        log::info!("Starting indexing run {} for {}", run.id(), configured.url);

        let site = match self.prepare_one(&configured).await {
            Ok(site) => site,
            Err(e) => {
                run.finish();
                return Err(e);
            }
        };

        let this = self.clone();
        Ok(tokio::spawn(async move {
            this.index_sites(vec![site], run).await;
        }))
    }

    /// Cancel the active run.
    ///
    /// Sites still indexing are marked failed. Fetches already in flight
    /// complete but schedule nothing further.
    pub async fn stop(&self) -> Result<()> {
        let Some(run) = self.flag.current() else {
            log::warn!("Stop requested while no run is in progress");
            return Err(AppError::NotRunning);
        };

        run.cancel();
        let failed = self.fail_indexing_sites(STOPPED_BY_USER).await;
        run.finish();

        log::info!("Indexing run {} stopped", run.id());
        failed.map(|_| ())
    }

    async fn prepare_all(&self) -> Result<Vec<Site>> {
        self.storage.clear().await?;

        let mut sites = Vec::with_capacity(self.config.sites.len());
        for configured in &self.config.sites {
            let site = self
                .storage
                .create_site(&configured.url, &configured.name, SiteStatus::Indexing)
                .await?;
            sites.push(site);
        }
        Ok(sites)
    }

    async fn prepare_one(&self, configured: &SiteConfig) -> Result<Site> {
        if let Some(existing) = self.storage.find_site(&configured.url).await? {
            log::info!("Deleting stored data of {}", existing.url);
            self.storage.delete_site(existing.id).await?;
        }
        self.storage
            .create_site(&configured.url, &configured.name, SiteStatus::Indexing)
            .await
    }

    async fn index_sites(&self, sites: Vec<Site>, run: RunContext) {
        for site in sites {
            if run.is_cancelled() {
                self.mark_aborted(&site).await;
                continue;
            }
            self.index_site(site, &run).await;
        }

        match self.any_indexing().await {
            Ok(false) => {
                if run.finish() {
                    log::info!("Indexing run {} finished", run.id());
                }
            }
            Ok(true) => log::warn!("Run {} ended with sites still indexing", run.id()),
            Err(e) => log::error!("Could not check site states after run {}: {e}", run.id()),
        }
    }

    async fn index_site(&self, site: Site, run: &RunContext) {
        log::info!("Indexing {} ({})", site.url, site.name);

        let ctx = match CrawlContext::new(
            site.clone(),
            Arc::clone(&self.storage),
            Arc::clone(&self.fetcher),
            self.lemmatizer.clone(),
            Arc::new(self.config.crawler.clone()),
            run.clone(),
        ) {
            Ok(ctx) => Arc::new(ctx),
            Err(e) => {
                log::error!("Cannot crawl {}: {e}", site.url);
                let failed = self
                    .storage
                    .set_site_status(site.id, SiteStatus::Failed, Some(e.to_string()))
                    .await;
                if let Err(e) = failed {
                    log::error!("Could not mark {} as failed: {e}", site.url);
                }
                return;
            }
        };
        let outcome = crawl::crawl_site(ctx).await;

        match self
            .storage
            .transition_site(site.id, SiteStatus::Indexing, SiteStatus::Indexed, None)
            .await
        {
            Ok(true) => log::info!("Indexed {}: {outcome}", site.url),
            Ok(false) => log::warn!("{} did not finish indexing: {outcome}", site.url),
            Err(e) => log::error!("Could not mark {} as indexed: {e}", site.url),
        }
    }

    async fn mark_aborted(&self, site: &Site) {
        let result = self
            .storage
            .transition_site(
                site.id,
                SiteStatus::Indexing,
                SiteStatus::Failed,
                Some(ABORTED.to_string()),
            )
            .await;
        if let Err(e) = result {
            log::error!("Could not mark {} as aborted: {e}", site.url);
        }
    }

    async fn fail_indexing_sites(&self, reason: &str) -> Result<usize> {
        let mut failed = 0;
        for site in self.storage.sites().await? {
            let moved = self
                .storage
                .transition_site(
                    site.id,
                    SiteStatus::Indexing,
                    SiteStatus::Failed,
                    Some(reason.to_string()),
                )
                .await?;
            if moved {
                log::info!("{} marked as failed: {reason}", site.url);
                failed += 1;
            }
        }
        Ok(failed)
    }

    async fn any_indexing(&self) -> Result<bool> {
        Ok(self
            .storage
            .sites()
            .await?
            .iter()
            .any(|site| site.status == SiteStatus::Indexing))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CrawlerConfig, SearchConfig, SearchQuery};
    use crate::pipeline::testing::{Stub, StubFetcher};
    use crate::services::SearchEngine;
    use crate::storage::MemoryStorage;
    use crate::utils::http::TIMEOUT_STATUS;

    fn config(sites: &[&str]) -> Arc<Config> {
        Arc::new(Config {
            crawler: CrawlerConfig {
                min_delay_ms: 0,
                max_delay_ms: 0,
                max_concurrent: 4,
                ..CrawlerConfig::default()
            },
            search: SearchConfig::default(),
            sites: sites
                .iter()
                .map(|url| SiteConfig {
                    url: url.to_string(),
                    name: format!("Site {url}"),
                })
                .collect(),
        })
    }

    fn service(
        config: Arc<Config>,
        storage: Arc<MemoryStorage>,
        fetcher: Arc<StubFetcher>,
    ) -> IndexingService {
        IndexingService::new(config, storage, fetcher, Lemmatizer::russian())
    }

    fn page(body: &str, links: &[&str]) -> Stub {
        Stub::page(format!("<html><body>{body}</body></html>"), links)
    }

    async fn stored(storage: &MemoryStorage, url: &str) -> Site {
        storage.find_site(url).await.unwrap().unwrap()
    }

    #[tokio::test]
    async fn test_timeout_is_not_fatal() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with(
                    "https://a.ru",
                    page("главная страница", &["https://a.ru/b", "https://a.ru/c"]),
                )
                .with("https://a.ru/b", Stub::Timeout)
                .with("https://a.ru/c", page("страница товара", &[])),
        );
        let storage = Arc::new(MemoryStorage::new());
        let service = service(config(&["https://a.ru"]), storage.clone(), fetcher);

        service.start_all().await.unwrap().await.unwrap();

        let site = stored(&storage, "https://a.ru").await;
        assert_eq!(site.status, SiteStatus::Indexed);
        assert!(site.last_error.unwrap().contains("408"));

        let root = storage.find_page(site.id, "/").await.unwrap().unwrap();
        assert_eq!(root.code, 200);
        assert!(!root.content.is_empty());
        let c = storage.find_page(site.id, "/c").await.unwrap().unwrap();
        assert!(!c.content.is_empty());
        let b = storage.find_page(site.id, "/b").await.unwrap().unwrap();
        assert_eq!(b.code, TIMEOUT_STATUS);
        assert!(b.content.is_empty());

        assert!(!service.is_indexing());
    }

    #[tokio::test]
    async fn test_remote_status_recorded() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with("https://a.ru", page("главная", &["https://a.ru/missing"]))
                .with("https://a.ru/missing", Stub::Status(404)),
        );
        let storage = Arc::new(MemoryStorage::new());
        let service = service(config(&["https://a.ru"]), storage.clone(), fetcher);

        service.start_all().await.unwrap().await.unwrap();

        let site = stored(&storage, "https://a.ru").await;
        assert_eq!(site.status, SiteStatus::Indexed);
        assert_eq!(
            site.last_error.as_deref(),
            Some("Connection error. Status code - 404. Reason: Not Found")
        );
        let missing = storage.find_page(site.id, "/missing").await.unwrap().unwrap();
        assert_eq!(missing.code, 404);
    }

    #[tokio::test]
    async fn test_rediscovered_page_fetched_once() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with(
                    "https://a.ru",
                    page("главная", &["https://a.ru/x", "https://a.ru/y"]),
                )
                .with("https://a.ru/x", page("пример", &["https://a.ru/y", "https://a.ru"]))
                .with("https://a.ru/y", page("пример", &["https://a.ru/x"])),
        );
        let storage = Arc::new(MemoryStorage::new());
        let service = service(config(&["https://a.ru"]), storage.clone(), fetcher.clone());

        service.start_all().await.unwrap().await.unwrap();

        assert_eq!(fetcher.fetch_count("https://a.ru/y"), 1);
        assert_eq!(fetcher.fetch_count("https://a.ru"), 1);

        let site = stored(&storage, "https://a.ru").await;
        assert_eq!(storage.count_pages(site.id).await.unwrap(), 3);
        let lemma = storage.find_lemmas("пример", Some(site.id)).await.unwrap();
        assert_eq!(lemma[0].frequency, 2);
    }

    #[tokio::test]
    async fn test_skipped_links_not_followed() {
        let fetcher = Arc::new(StubFetcher::new().with(
            "https://a.ru",
            page(
                "главная",
                &[
                    "https://a.ru/file.pdf",
                    "https://a.ru/page#top",
                    "https://a.ru/page?x=1",
                    "https://b.ru/other",
                    "https://a.ru.evil.com/",
                ],
            ),
        ));
        let storage = Arc::new(MemoryStorage::new());
        let service = service(config(&["https://a.ru"]), storage.clone(), fetcher.clone());

        service.start_all().await.unwrap().await.unwrap();

        assert_eq!(fetcher.total_fetches(), 1);
    }

    #[tokio::test]
    async fn test_fatal_error_fails_site_and_aborts_run() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with("https://a.ru", page("главная", &["https://a.ru/broken"]))
                .with("https://a.ru/broken", Stub::Fatal)
                .with("https://b.ru", page("другой", &[])),
        );
        let storage = Arc::new(MemoryStorage::new());
        let service = service(
            config(&["https://a.ru", "https://b.ru"]),
            storage.clone(),
            fetcher.clone(),
        );

        service.start_all().await.unwrap().await.unwrap();

        let a = stored(&storage, "https://a.ru").await;
        assert_eq!(a.status, SiteStatus::Failed);
        assert!(a.last_error.unwrap().contains("https://a.ru/broken"));

        let b = stored(&storage, "https://b.ru").await;
        assert_eq!(b.status, SiteStatus::Failed);
        assert_eq!(b.last_error.as_deref(), Some(ABORTED));
        assert_eq!(fetcher.fetch_count("https://b.ru"), 0);

        assert!(!service.is_indexing());
    }

    #[tokio::test]
    async fn test_stop_mid_crawl() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with("https://a.ru", page("главная", &["https://a.ru/slow"]))
                .with("https://a.ru/slow", page("медленная", &["https://a.ru/next"]))
                .with("https://a.ru/next", page("следующая", &[]))
                .gated("https://a.ru/slow"),
        );
        let storage = Arc::new(MemoryStorage::new());
        let service = service(config(&["https://a.ru"]), storage.clone(), fetcher.clone());

        let handle = service.start_all().await.unwrap();
        fetcher.wait_entered().await;
        assert!(service.is_indexing());

        service.stop().await.unwrap();
        assert!(!service.is_indexing());
        fetcher.release();
        handle.await.unwrap();

        let site = stored(&storage, "https://a.ru").await;
        assert_eq!(site.status, SiteStatus::Failed);
        assert_eq!(site.last_error.as_deref(), Some(STOPPED_BY_USER));

        // The in-flight page is kept, its children are never scheduled
        assert!(storage.find_page(site.id, "/slow").await.unwrap().is_some());
        assert_eq!(fetcher.fetch_count("https://a.ru/next"), 0);
        assert!(!service.is_indexing());
    }

    #[tokio::test]
    async fn test_restart_after_stop_leaves_no_stale_rows() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with(
                    "https://a.ru",
                    page("главная", &["https://a.ru/slow", "https://a.ru/fast"]),
                )
                .with("https://a.ru/slow", page("медленная страница", &[]))
                .with("https://a.ru/fast", page("быстрая страница", &[]))
                .gated("https://a.ru/slow"),
        );
        let storage = Arc::new(MemoryStorage::new());
        let service = service(config(&["https://a.ru"]), storage.clone(), fetcher.clone());

        let stale = service.start_all().await.unwrap();
        fetcher.wait_entered().await;
        service.stop().await.unwrap();

        service.start_all().await.unwrap().await.unwrap();
        fetcher.release();
        stale.await.unwrap();

        let site = stored(&storage, "https://a.ru").await;
        assert_eq!(site.status, SiteStatus::Indexed);
        assert_eq!(fetcher.fetch_count("https://a.ru/slow"), 2);

        let counts = storage.counts().await.unwrap();
        assert_eq!(counts.sites, 1);
        assert_eq!(counts.pages, 3);
        assert_eq!(counts.pages, storage.count_pages(site.id).await.unwrap());
        assert_eq!(counts.lemmas, storage.count_lemmas(site.id).await.unwrap());

        let snapshot = storage.snapshot().await;
        assert!(snapshot.pages.iter().all(|p| p.site_id == site.id));
        assert!(snapshot.lemmas.iter().all(|l| l.site_id == site.id));
        let pages: Vec<_> = snapshot.pages.iter().map(|p| p.id).collect();
        assert!(snapshot.index.iter().all(|e| pages.contains(&e.page_id)));
        assert!(!service.is_indexing());
    }

    #[tokio::test]
    async fn test_idn_and_mixed_case_roots_follow_links() {
        let markup = r#"<html><body>главная
            <a href="/about">о компании</a>
            <a href="/">домой</a>
            </body></html>"#;
        let cases = [
            ("https://сайт.рф", "https://xn--80aswg.xn--p1ai/about"),
            ("https://www.PlayBack.ru", "https://www.playback.ru/about"),
        ];

        for (root, about) in cases {
            let fetcher = Arc::new(
                StubFetcher::new()
                    .with(root, Stub::Html(markup.to_string()))
                    .with(about, Stub::Html("<html><body>о компании</body></html>".into())),
            );
            let storage = Arc::new(MemoryStorage::new());
            let service = service(config(&[root]), storage.clone(), fetcher.clone());

            service.start_all().await.unwrap().await.unwrap();

            assert_eq!(fetcher.fetch_count(about), 1, "{root}");
            assert_eq!(fetcher.total_fetches(), 2, "{root}");
            let site = stored(&storage, root).await;
            assert_eq!(site.status, SiteStatus::Indexed);
            assert!(storage.find_page(site.id, "/about").await.unwrap().is_some());
            assert_eq!(storage.count_pages(site.id).await.unwrap(), 2);
        }
    }

    #[tokio::test]
    async fn test_concurrency_policy_errors() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with("https://a.ru", page("главная", &[]))
                .gated("https://a.ru"),
        );
        let storage = Arc::new(MemoryStorage::new());
        let service = service(config(&["https://a.ru"]), storage, fetcher.clone());

        assert!(matches!(service.stop().await, Err(AppError::NotRunning)));

        let handle = service.start_all().await.unwrap();
        fetcher.wait_entered().await;
        assert!(matches!(
            service.start_all().await,
            Err(AppError::AlreadyRunning)
        ));
        assert!(matches!(
            service.start_one("https://a.ru").await,
            Err(AppError::AlreadyRunning)
        ));

        fetcher.release();
        handle.await.unwrap();
        assert!(!service.is_indexing());
        assert!(matches!(service.stop().await, Err(AppError::NotRunning)));
    }

    #[tokio::test]
    async fn test_start_one_not_configured() {
        let storage = Arc::new(MemoryStorage::new());
        let service = service(
            config(&["https://a.ru"]),
            storage.clone(),
            Arc::new(StubFetcher::new()),
        );

        let err = service.start_one("https://unknown.ru").await.unwrap_err();
        assert!(matches!(err, AppError::SiteNotConfigured { .. }));
        assert!(!service.is_indexing());
        assert_eq!(storage.counts().await.unwrap().sites, 0);
    }

    #[tokio::test]
    async fn test_start_one_replaces_site_data() {
        let storage = Arc::new(MemoryStorage::new());
        let old = storage
            .create_site("https://a.ru", "Old", SiteStatus::Indexed)
            .await
            .unwrap();
        storage
            .insert_page(crate::models::NewPage {
                site_id: old.id,
                path: "/gone".into(),
                code: 200,
                content: "<html><body>старое</body></html>".into(),
            })
            .await
            .unwrap();

        let fetcher = Arc::new(StubFetcher::new().with("https://a.ru", page("новое", &[])));
        let service = service(config(&["https://a.ru"]), storage.clone(), fetcher);

        service.start_one("www.a.ru").await.unwrap().await.unwrap();

        let site = stored(&storage, "https://a.ru").await;
        assert_ne!(site.id, old.id);
        assert_eq!(site.status, SiteStatus::Indexed);
        assert!(storage.find_page(site.id, "/gone").await.unwrap().is_none());
        assert!(storage.find_page(site.id, "/").await.unwrap().is_some());
        assert!(!service.is_indexing());
    }

    #[tokio::test]
    async fn test_crawl_then_search() {
        let fetcher = Arc::new(
            StubFetcher::new()
                .with("https://a.ru", page("главная страница", &["https://a.ru/p"]))
                .with(
                    "https://a.ru/p",
                    page("Пример текста. Ещё один пример и примеры.", &[]),
                ),
        );
        let storage = Arc::new(MemoryStorage::new());
        let config = config(&["https://a.ru"]);
        let service = service(config.clone(), storage.clone(), fetcher);

        service.start_all().await.unwrap().await.unwrap();

        let engine = SearchEngine::new(storage, Lemmatizer::russian(), config.search.clone());
        let response = engine.search(&SearchQuery::new("примеры", 10)).await.unwrap();
        assert_eq!(response.count, 1);
        assert_eq!(response.results[0].uri, "/p");
        assert_eq!(response.results[0].relevance, 1.0);
        assert!(response.results[0].snippet.contains("<b>"));
    }
}
