// src/models/site.rs

//! Stored entities: sites, pages, lemmas and index entries.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type SiteId = u64;
pub type PageId = u64;
pub type LemmaId = u64;

/// Indexing lifecycle of a site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SiteStatus {
    Unindexed,
    Indexing,
    Indexed,
    Failed,
}

impl SiteStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            SiteStatus::Unindexed => "UNINDEXED",
            SiteStatus::Indexing => "INDEXING",
            SiteStatus::Indexed => "INDEXED",
            SiteStatus::Failed => "FAILED",
        }
    }
}

impl fmt::Display for SiteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A crawled website.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Site {
    pub id: SiteId,
    /// Root URL as configured
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    pub status_time: DateTime<Utc>,
    pub last_error: Option<String>,
}

/// A fetched page, or a failed fetch recorded with its status code.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Page {
    pub id: PageId,
    pub site_id: SiteId,
    /// URL suffix relative to the site root, `/` for the root itself
    pub path: String,
    pub code: u16,
    /// Raw HTML, empty for failed fetches
    pub content: String,
}

/// Page data before the store assigns an id.
#[derive(Debug, Clone)]
pub struct NewPage {
    pub site_id: SiteId,
    pub path: String,
    pub code: u16,
    pub content: String,
}

/// Outcome of an insert-if-absent page write.
#[derive(Debug, Clone)]
pub enum PageInsert {
    Inserted(Page),
    /// A page with the same path already exists for the site
    Exists(PageId),
    /// The owning site was deleted
    SiteGone,
}

/// A normalized word form stored per site.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Lemma {
    pub id: LemmaId,
    pub site_id: SiteId,
    pub lemma: String,
    /// Number of indexed pages of the site containing the lemma
    pub frequency: u32,
}

/// Link between a page and a lemma, weighted by the page-local count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct IndexEntry {
    pub page_id: PageId,
    pub lemma_id: LemmaId,
    pub weight: f32,
}

/// A lemma together with its count on the page being indexed.
#[derive(Debug, Clone, PartialEq)]
pub struct WeightedLemma {
    pub lemma: Lemma,
    pub weight: u32,
}

/// The lemmas touched while indexing one page.
#[derive(Debug, Clone, Default)]
pub struct PageLemmas {
    pub page_id: PageId,
    pub lemmas: Vec<WeightedLemma>,
}

impl PageLemmas {
    /// Index entries to persist for this page.
    pub fn entries(&self) -> Vec<IndexEntry> {
        self.lemmas
            .iter()
            .map(|weighted| IndexEntry {
                page_id: self.page_id,
                lemma_id: weighted.lemma.id,
                weight: weighted.weight as f32,
            })
            .collect()
    }
}

/// Row counts per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TableCounts {
    pub sites: usize,
    pub pages: usize,
    pub lemmas: usize,
    pub index_entries: usize,
}
