//! Storage abstractions for sites, pages, lemmas and index entries.
//!
//! The engine talks to persistence only through [`SearchStorage`]. Writes that
//! crawl branches race on are single atomic operations of the trait:
//!
//! - `insert_page` is insert-if-absent on `(site, path)`
//! - `upsert_lemmas` is insert-or-increment on `(site, word)`
//! - `transition_site` is a compare-and-set on the site status
//!
//! Writes under a deleted site are refused.
//!
//! ```text
//! site 1──* page 1──* index_entry *──1 lemma *──1 site
//! ```

pub mod local;
pub mod memory;

use async_trait::async_trait;

use crate::error::Result;
use crate::models::{
    IndexEntry, Lemma, LemmaId, NewPage, Page, PageId, PageInsert, Site, SiteId, SiteStatus,
    TableCounts,
};

// Re-export for convenience
pub use local::LocalSnapshot;
pub use memory::MemoryStorage;

/// Trait for search index storage backends.
#[async_trait]
pub trait SearchStorage: Send + Sync {
    /// Delete every row of every table.
    async fn clear(&self) -> Result<()>;

    /// Insert a site with the given status and a fresh status time.
    async fn create_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site>;

    /// Point lookup of a site by its root URL.
    async fn find_site(&self, url: &str) -> Result<Option<Site>>;

    async fn site(&self, site_id: SiteId) -> Result<Option<Site>>;

    async fn sites(&self) -> Result<Vec<Site>>;

    /// Set status, refresh status time, and replace the error when given.
    async fn set_site_status(
        &self,
        site_id: SiteId,
        status: SiteStatus,
        last_error: Option<String>,
    ) -> Result<()>;

    /// Move a site from `from` to `to` only if it is currently in `from`.
    ///
    /// Returns whether the transition happened.
    async fn transition_site(
        &self,
        site_id: SiteId,
        from: SiteStatus,
        to: SiteStatus,
        last_error: Option<String>,
    ) -> Result<bool>;

    /// Record a non-fatal error on the site without changing its status.
    async fn record_site_error(&self, site_id: SiteId, error: String) -> Result<()>;

    /// Delete a site with all of its pages, lemmas and index entries.
    async fn delete_site(&self, site_id: SiteId) -> Result<()>;

    /// Insert a page unless its path is already stored for the site.
    ///
    /// Answers [`PageInsert::SiteGone`] when the site no longer exists.
    async fn insert_page(&self, page: NewPage) -> Result<PageInsert>;

    /// Point lookup of a page by `(site, path)`.
    async fn find_page(&self, site_id: SiteId, path: &str) -> Result<Option<Page>>;

    async fn page(&self, page_id: PageId) -> Result<Option<Page>>;

    /// For each word: create the lemma with frequency 1, or add 1 to it.
    ///
    /// Rows are returned in the order of `words`. Fails with
    /// [`AppError::Storage`](crate::error::AppError::Storage) when the site no longer exists.
    async fn upsert_lemmas(&self, site_id: SiteId, words: &[String]) -> Result<Vec<Lemma>>;

    /// Lemmas with the given text, on one site or on all of them.
    async fn find_lemmas(&self, lemma: &str, site_id: Option<SiteId>) -> Result<Vec<Lemma>>;

    /// Largest document frequency over all lemmas, 0 when there are none.
    async fn max_frequency(&self) -> Result<u32>;

    /// Insert entries, replacing any existing entry for the same page and lemma.
    ///
    /// All or nothing: fails when any entry names a missing page or lemma.
    async fn save_index_entries(&self, entries: &[IndexEntry]) -> Result<()>;

    /// Point lookup of an index entry by `(page, lemma)`.
    async fn index_entry(&self, page_id: PageId, lemma_id: LemmaId)
    -> Result<Option<IndexEntry>>;

    async fn page_ids_for_lemma(&self, lemma_id: LemmaId) -> Result<Vec<PageId>>;

    async fn count_pages(&self, site_id: SiteId) -> Result<usize>;

    async fn count_lemmas(&self, site_id: SiteId) -> Result<usize>;

    /// Row count of every table.
    async fn counts(&self) -> Result<TableCounts>;
}
