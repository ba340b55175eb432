// src/services/statistics.rs

//! Per-site indexing summaries.

use std::sync::Arc;

use chrono::Utc;

use crate::error::Result;
use crate::models::{
    DetailedStatistics, SiteConfig, SiteStatus, Statistics, TotalStatistics,
};
use crate::storage::SearchStorage;

const NOT_INDEXED: &str = "site is not indexed";

pub struct StatisticsService {
    storage: Arc<dyn SearchStorage>,
    sites: Vec<SiteConfig>,
}

impl StatisticsService {
    pub fn new(storage: Arc<dyn SearchStorage>, sites: Vec<SiteConfig>) -> Self {
        Self { storage, sites }
    }

    /// Summary of every configured site plus stored totals.
    ///
    /// `indexing` reports whether a run is currently in progress.
    pub async fn statistics(&self, indexing: bool) -> Result<Statistics> {
        let counts = self.storage.counts().await?;
        let mut detailed = Vec::with_capacity(self.sites.len());

        for configured in &self.sites {
            let entry = match self.storage.find_site(&configured.url).await? {
                Some(site) => DetailedStatistics {
                    url: site.url.clone(),
                    name: site.name.clone(),
                    status: site.status,
                    status_time: site.status_time.timestamp_millis(),
                    error: site.last_error.clone().unwrap_or_default(),
                    pages: self.storage.count_pages(site.id).await?,
                    lemmas: self.storage.count_lemmas(site.id).await?,
                },
                None => DetailedStatistics {
                    url: configured.url.clone(),
                    name: configured.name.clone(),
                    status: SiteStatus::Unindexed,
                    status_time: Utc::now().timestamp_millis(),
                    error: NOT_INDEXED.to_string(),
                    pages: 0,
                    lemmas: 0,
                },
            };
            detailed.push(entry);
        }

        Ok(Statistics {
            total: TotalStatistics {
                sites: self.sites.len(),
                pages: counts.pages,
                lemmas: counts.lemmas,
                indexing,
            },
            detailed,
        })
    }
}
