// src/services/search.rs

//! Ranked full-text search over the inverted index.
//!
//! A query is reduced to lemmas, the rarest lemmas are looked up first, and
//! every page containing at least one of them is scored by the sum of its
//! index weights. Scores are divided by the best score so the top page always
//! has relevance `1.0`. Pages whose text yields no snippet are dropped.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use crate::error::{AppError, Result};
use crate::models::{
    Lemma, PageId, SearchConfig, SearchQuery, SearchResponse, SearchResult, Site, SiteId,
};
use crate::services::lemmatizer::Lemmatizer;
use crate::services::snippet::SnippetBuilder;
use crate::storage::SearchStorage;
use crate::utils::{html, url::normalize_site_key};

pub struct SearchEngine {
    storage: Arc<dyn SearchStorage>,
    lemmatizer: Lemmatizer,
    snippets: SnippetBuilder,
    config: SearchConfig,
}

impl SearchEngine {
    pub fn new(
        storage: Arc<dyn SearchStorage>,
        lemmatizer: Lemmatizer,
        config: SearchConfig,
    ) -> Self {
        Self {
            storage,
            lemmatizer,
            snippets: SnippetBuilder::new(config.snippet_context_chars),
            config,
        }
    }

    pub async fn search(&self, request: &SearchQuery) -> Result<SearchResponse> {
        let query = request.query.trim();
        if query.is_empty() {
            return Err(AppError::EmptyQuery);
        }

        let counts = self.storage.counts().await?;
        if counts.sites == 0 || counts.lemmas == 0 {
            return Err(AppError::NothingIndexed);
        }

        let site_id = match &request.site {
            Some(url) => Some(self.resolve_site(url).await?.id),
            None => None,
        };

        let lemmas = self.query_lemmas(query, site_id).await?;
        if lemmas.is_empty() {
            log::debug!("No indexed lemmas for query '{query}'");
            return Ok(SearchResponse::default());
        }

        let scores = self.score_pages(&lemmas).await?;
        let mut results = self.build_results(query, scores).await?;
        results.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));

        let count = results.len();
        let limit = if request.limit == 0 {
            self.config.default_limit
        } else {
            request.limit
        };
        // An offset at or past `count` yields an empty page, never the first one
        let results = results.into_iter().skip(request.offset).take(limit).collect();

        log::info!("Query '{query}' matched {count} pages");
        Ok(SearchResponse { count, results })
    }

    async fn resolve_site(&self, url: &str) -> Result<Site> {
        if let Some(site) = self.storage.find_site(url).await? {
            return Ok(site);
        }
        let key = normalize_site_key(url);
        self.storage
            .sites()
            .await?
            .into_iter()
            .find(|site| normalize_site_key(&site.url) == key)
            .ok_or_else(|| AppError::UnknownSite {
                url: url.to_string(),
            })
    }

    /// Stored lemmas of the query below the frequency ceiling, rarest first.
    async fn query_lemmas(&self, query: &str, site_id: Option<SiteId>) -> Result<Vec<Lemma>> {
        let ceiling = frequency_ceiling(
            self.storage.max_frequency().await?,
            self.config.frequency_ceiling_ratio,
        );

        let mut lemmas = Vec::new();
        for word in self.lemmatizer.query_lemmas(query) {
            let found = self.storage.find_lemmas(&word, site_id).await?;
            lemmas.extend(found.into_iter().filter(|lemma| lemma.frequency <= ceiling));
        }
        lemmas.sort_by_key(|lemma| (lemma.frequency, lemma.id));
        Ok(lemmas)
    }

    /// Absolute relevance of every page containing any of the lemmas.
    async fn score_pages(&self, lemmas: &[Lemma]) -> Result<BTreeMap<PageId, f64>> {
        let mut pages = BTreeSet::new();
        for lemma in lemmas {
            pages.extend(self.storage.page_ids_for_lemma(lemma.id).await?);
        }

        let mut scores = BTreeMap::new();
        for page_id in pages {
            let mut score = 0.0;
            for lemma in lemmas {
                if let Some(entry) = self.storage.index_entry(page_id, lemma.id).await? {
                    score += f64::from(entry.weight);
                }
            }
            scores.insert(page_id, score);
        }
        Ok(scores)
    }

    async fn build_results(
        &self,
        query: &str,
        scores: BTreeMap<PageId, f64>,
    ) -> Result<Vec<SearchResult>> {
        let max = scores.values().copied().fold(0.0_f64, f64::max);
        if max <= 0.0 {
            return Ok(Vec::new());
        }

        let mut sites: HashMap<SiteId, Site> = HashMap::new();
        let mut results = Vec::with_capacity(scores.len());

        for (page_id, score) in scores {
            let Some(page) = self.storage.page(page_id).await? else {
                continue;
            };
            let Some(snippet) = self
                .snippets
                .build(&html::body_text(&page.content), query)
            else {
                log::debug!("No snippet for page {page_id}, dropping it");
                continue;
            };

            if !sites.contains_key(&page.site_id) {
                match self.storage.site(page.site_id).await? {
                    Some(site) => {
                        sites.insert(site.id, site);
                    }
                    None => continue,
                }
            }
            let Some(site) = sites.get(&page.site_id) else {
                continue;
            };

            results.push(SearchResult {
                site: site.url.clone(),
                site_name: site.name.clone(),
                uri: page.path.clone(),
                title: html::title(&page.content),
                snippet,
                relevance: round_relevance(score / max),
            });
        }
        Ok(results)
    }
}

/// Highest document frequency a query lemma may have to be used.
fn frequency_ceiling(max_frequency: u32, ratio: f64) -> u32 {
    (f64::from(max_frequency) * ratio).ceil() as u32
}

fn round_relevance(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
