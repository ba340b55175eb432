//! In-process storage backend.
//!
//! All tables live behind a single `RwLock`, so every trait method is one
//! atomic step with respect to concurrent crawl branches.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use crate::error::{AppError, Result};
use crate::models::{
    IndexEntry, Lemma, LemmaId, NewPage, Page, PageId, PageInsert, Site, SiteId, SiteStatus,
    TableCounts,
};
use crate::storage::SearchStorage;

/// Serializable copy of every table.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Snapshot {
    pub sites: Vec<Site>,
    pub pages: Vec<Page>,
    pub lemmas: Vec<Lemma>,
    pub index: Vec<IndexEntry>,
}

#[derive(Debug, Default)]
struct Tables {
    next_id: u64,
    sites: BTreeMap<SiteId, Site>,
    pages: BTreeMap<PageId, Page>,
    page_paths: HashMap<(SiteId, String), PageId>,
    lemmas: BTreeMap<LemmaId, Lemma>,
    lemma_keys: HashMap<(SiteId, String), LemmaId>,
    index: BTreeMap<(PageId, LemmaId), f32>,
    lemma_pages: HashMap<LemmaId, BTreeSet<PageId>>,
}

impl Tables {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn remove_index_for_page(&mut self, page_id: PageId) {
        let lemma_ids: Vec<LemmaId> = self
            .index
            .range((page_id, LemmaId::MIN)..=(page_id, LemmaId::MAX))
            .map(|(&(_, lemma_id), _)| lemma_id)
            .collect();

        for lemma_id in lemma_ids {
            self.index.remove(&(page_id, lemma_id));
            if let Some(pages) = self.lemma_pages.get_mut(&lemma_id) {
                pages.remove(&page_id);
            }
        }
    }

    fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut tables = Tables::default();

        for site in snapshot.sites {
            tables.next_id = tables.next_id.max(site.id);
            tables.sites.insert(site.id, site);
        }
        for page in snapshot.pages {
            tables.next_id = tables.next_id.max(page.id);
            tables
                .page_paths
                .insert((page.site_id, page.path.clone()), page.id);
            tables.pages.insert(page.id, page);
        }
        for lemma in snapshot.lemmas {
            tables.next_id = tables.next_id.max(lemma.id);
            tables
                .lemma_keys
                .insert((lemma.site_id, lemma.lemma.clone()), lemma.id);
            tables.lemmas.insert(lemma.id, lemma);
        }
        for entry in snapshot.index {
            tables
                .index
                .insert((entry.page_id, entry.lemma_id), entry.weight);
            tables
                .lemma_pages
                .entry(entry.lemma_id)
                .or_default()
                .insert(entry.page_id);
        }

        tables
    }
}

/// Storage backend keeping every table in memory.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuild a store from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        Self {
            tables: RwLock::new(Tables::from_snapshot(snapshot)),
        }
    }

    /// Copy every table into a serializable snapshot.
    pub async fn snapshot(&self) -> Snapshot {
        let tables = self.tables.read().await;
        Snapshot {
            sites: tables.sites.values().cloned().collect(),
            pages: tables.pages.values().cloned().collect(),
            lemmas: tables.lemmas.values().cloned().collect(),
            index: tables
                .index
                .iter()
                .map(|(&(page_id, lemma_id), &weight)| IndexEntry {
                    page_id,
                    lemma_id,
                    weight,
                })
                .collect(),
        }
    }
}

#[async_trait]
impl SearchStorage for MemoryStorage {
    async fn clear(&self) -> Result<()> {
        let mut tables = self.tables.write().await;
        let next_id = tables.next_id;
        *tables = Tables {
            next_id,
            ..Tables::default()
        };
        Ok(())
    }

    async fn create_site(&self, url: &str, name: &str, status: SiteStatus) -> Result<Site> {
        let mut tables = self.tables.write().await;
        let site = Site {
            id: tables.next_id(),
            url: url.to_string(),
            name: name.to_string(),
            status,
            status_time: Utc::now(),
            last_error: None,
        };
        tables.sites.insert(site.id, site.clone());
        Ok(site)
    }

    async fn find_site(&self, url: &str) -> Result<Option<Site>> {
        let tables = self.tables.read().await;
        Ok(tables.sites.values().find(|s| s.url == url).cloned())
    }

    async fn site(&self, site_id: SiteId) -> Result<Option<Site>> {
        Ok(self.tables.read().await.sites.get(&site_id).cloned())
    }

    async fn sites(&self) -> Result<Vec<Site>> {
        Ok(self.tables.read().await.sites.values().cloned().collect())
    }

    async fn set_site_status(
        &self,
        site_id: SiteId,
        status: SiteStatus,
        last_error: Option<String>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(site) = tables.sites.get_mut(&site_id) {
            site.status = status;
            site.status_time = Utc::now();
            if last_error.is_some() {
                site.last_error = last_error;
            }
        }
        Ok(())
    }

    async fn transition_site(
        &self,
        site_id: SiteId,
        from: SiteStatus,
        to: SiteStatus,
        last_error: Option<String>,
    ) -> Result<bool> {
        let mut tables = self.tables.write().await;
        match tables.sites.get_mut(&site_id) {
            Some(site) if site.status == from => {
                site.status = to;
                site.status_time = Utc::now();
                if last_error.is_some() {
                    site.last_error = last_error;
                }
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn record_site_error(&self, site_id: SiteId, error: String) -> Result<()> {
        let mut tables = self.tables.write().await;
        if let Some(site) = tables.sites.get_mut(&site_id) {
            site.last_error = Some(error);
            site.status_time = Utc::now();
        }
        Ok(())
    }

    async fn delete_site(&self, site_id: SiteId) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.sites.remove(&site_id);

        let page_ids: Vec<PageId> = tables
            .pages
            .values()
            .filter(|p| p.site_id == site_id)
            .map(|p| p.id)
            .collect();
        for page_id in page_ids {
            tables.remove_index_for_page(page_id);
            if let Some(page) = tables.pages.remove(&page_id) {
                tables.page_paths.remove(&(site_id, page.path));
            }
        }

        let lemma_ids: Vec<LemmaId> = tables
            .lemmas
            .values()
            .filter(|l| l.site_id == site_id)
            .map(|l| l.id)
            .collect();
        for lemma_id in lemma_ids {
            if let Some(lemma) = tables.lemmas.remove(&lemma_id) {
                tables.lemma_keys.remove(&(site_id, lemma.lemma));
            }
            tables.lemma_pages.remove(&lemma_id);
        }
        Ok(())
    }

    async fn insert_page(&self, page: NewPage) -> Result<PageInsert> {
        let mut tables = self.tables.write().await;
        if !tables.sites.contains_key(&page.site_id) {
            return Ok(PageInsert::SiteGone);
        }
        let key = (page.site_id, page.path.clone());
        if let Some(&existing) = tables.page_paths.get(&key) {
            return Ok(PageInsert::Exists(existing));
        }

        let stored = Page {
            id: tables.next_id(),
            site_id: page.site_id,
            path: page.path,
            code: page.code,
            content: page.content,
        };
        tables.page_paths.insert(key, stored.id);
        tables.pages.insert(stored.id, stored.clone());
        Ok(PageInsert::Inserted(stored))
    }

    async fn find_page(&self, site_id: SiteId, path: &str) -> Result<Option<Page>> {
        let tables = self.tables.read().await;
        Ok(tables
            .page_paths
            .get(&(site_id, path.to_string()))
            .and_then(|id| tables.pages.get(id))
            .cloned())
    }

    async fn page(&self, page_id: PageId) -> Result<Option<Page>> {
        Ok(self.tables.read().await.pages.get(&page_id).cloned())
    }

    async fn upsert_lemmas(&self, site_id: SiteId, words: &[String]) -> Result<Vec<Lemma>> {
        let mut tables = self.tables.write().await;
        if !tables.sites.contains_key(&site_id) {
            return Err(AppError::storage(format!("site {site_id} no longer exists")));
        }
        let mut rows = Vec::with_capacity(words.len());

        for word in words {
            let key = (site_id, word.clone());
            let lemma = match tables.lemma_keys.get(&key).copied() {
                Some(id) => match tables.lemmas.get_mut(&id) {
                    Some(lemma) => {
                        lemma.frequency += 1;
                        lemma.clone()
                    }
                    None => continue,
                },
                None => {
                    let lemma = Lemma {
                        id: tables.next_id(),
                        site_id,
                        lemma: word.clone(),
                        frequency: 1,
                    };
                    tables.lemma_keys.insert(key, lemma.id);
                    tables.lemmas.insert(lemma.id, lemma.clone());
                    lemma
                }
            };
            rows.push(lemma);
        }
        Ok(rows)
    }

    async fn find_lemmas(&self, lemma: &str, site_id: Option<SiteId>) -> Result<Vec<Lemma>> {
        let tables = self.tables.read().await;
        let found = match site_id {
            Some(site_id) => tables
                .lemma_keys
                .get(&(site_id, lemma.to_string()))
                .and_then(|id| tables.lemmas.get(id))
                .cloned()
                .into_iter()
                .collect(),
            None => tables
                .lemmas
                .values()
                .filter(|l| l.lemma == lemma)
                .cloned()
                .collect(),
        };
        Ok(found)
    }

    async fn max_frequency(&self) -> Result<u32> {
        let tables = self.tables.read().await;
        Ok(tables
            .lemmas
            .values()
            .map(|l| l.frequency)
            .max()
            .unwrap_or(0))
    }

    async fn save_index_entries(&self, entries: &[IndexEntry]) -> Result<()> {
        let mut tables = self.tables.write().await;
        let dangling = entries.iter().find(|e| {
            !tables.pages.contains_key(&e.page_id) || !tables.lemmas.contains_key(&e.lemma_id)
        });
        if let Some(entry) = dangling {
            return Err(AppError::storage(format!(
                "index entry ({}, {}) refers to a deleted page or lemma",
                entry.page_id, entry.lemma_id
            )));
        }
        for entry in entries {
            tables
                .index
                .insert((entry.page_id, entry.lemma_id), entry.weight);
            tables
                .lemma_pages
                .entry(entry.lemma_id)
                .or_default()
                .insert(entry.page_id);
        }
        Ok(())
    }

    async fn index_entry(
        &self,
        page_id: PageId,
        lemma_id: LemmaId,
    ) -> Result<Option<IndexEntry>> {
        let tables = self.tables.read().await;
        Ok(tables
            .index
            .get(&(page_id, lemma_id))
            .map(|&weight| IndexEntry {
                page_id,
                lemma_id,
                weight,
            }))
    }

    async fn page_ids_for_lemma(&self, lemma_id: LemmaId) -> Result<Vec<PageId>> {
        let tables = self.tables.read().await;
        Ok(tables
            .lemma_pages
            .get(&lemma_id)
            .map(|pages| pages.iter().copied().collect())
            .unwrap_or_default())
    }

    async fn count_pages(&self, site_id: SiteId) -> Result<usize> {
        let tables = self.tables.read().await;
        Ok(tables
            .pages
            .values()
            .filter(|p| p.site_id == site_id)
            .count())
    }

    async fn count_lemmas(&self, site_id: SiteId) -> Result<usize> {
        let tables = self.tables.read().await;
        Ok(tables
            .lemmas
            .values()
            .filter(|l| l.site_id == site_id)
            .count())
    }

    async fn counts(&self) -> Result<TableCounts> {
        let tables = self.tables.read().await;
        Ok(TableCounts {
            sites: tables.sites.len(),
            pages: tables.pages.len(),
            lemmas: tables.lemmas.len(),
            index_entries: tables.index.len(),
        })
    }
}
