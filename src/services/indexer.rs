// src/services/indexer.rs

//! Inverted index maintenance for freshly stored pages.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::Result;
use crate::models::{Page, PageLemmas, WeightedLemma};
use crate::storage::SearchStorage;

/// Writes lemma rows and index entries for one page at a time.
#[derive(Clone)]
pub struct IndexBuilder {
    storage: Arc<dyn SearchStorage>,
}

impl IndexBuilder {
    pub fn new(storage: Arc<dyn SearchStorage>) -> Self {
        Self { storage }
    }

    /// Upsert every lemma of the page and pair it with its page-local count.
    ///
    /// Each call counts the page once toward the document frequency of each
    /// of its lemmas, so callers must index a page at most once.
    pub async fn index_page(
        &self,
        page: &Page,
        counts: &HashMap<String, u32>,
    ) -> Result<PageLemmas> {
        let mut words: Vec<String> = counts.keys().cloned().collect();
        words.sort();

        let lemmas = if words.is_empty() {
            Vec::new()
        } else {
            self.storage.upsert_lemmas(page.site_id, &words).await?
        };

        let lemmas = lemmas
            .into_iter()
            .filter_map(|lemma| {
                let weight = counts.get(&lemma.lemma).copied()?;
                Some(WeightedLemma { lemma, weight })
            })
            .collect();

        Ok(PageLemmas {
            page_id: page.id,
            lemmas,
        })
    }

    /// Persist the page's index entries.
    pub async fn save_entries(&self, page_lemmas: &PageLemmas) -> Result<()> {
        let entries = page_lemmas.entries();
        if entries.is_empty() {
            return Ok(());
        }
        self.storage.save_index_entries(&entries).await?;
        log::debug!(
            "Saved {} index entries for page {}",
            entries.len(),
            page_lemmas.page_id
        );
        Ok(())
    }
}
