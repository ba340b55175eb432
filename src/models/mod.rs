// src/models/mod.rs

//! Domain models for the search engine.
//!
//! This module contains all data structures used throughout the application,
//! organized by their primary purpose.

mod config;
mod search;
mod site;
mod statistics;

// Re-export all public types
pub use config::{Config, CrawlerConfig, SearchConfig, SiteConfig};
pub use search::{SearchQuery, SearchResponse, SearchResult};
pub use site::{
    IndexEntry, Lemma, LemmaId, NewPage, Page, PageId, PageInsert, PageLemmas, Site, SiteId,
    SiteStatus, TableCounts, WeightedLemma,
};
pub use statistics::{DetailedStatistics, Statistics, TotalStatistics};
