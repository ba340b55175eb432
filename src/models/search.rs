//! Search request and response structures.

use serde::{Deserialize, Serialize};

/// A full-text query with optional site scope and paging.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query: String,
    /// Root URL of the site to search, all sites when absent
    #[serde(default)]
    pub site: Option<String>,
    #[serde(default)]
    pub offset: usize,
    pub limit: usize,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>, limit: usize) -> Self {
        Self {
            query: query.into(),
            site: None,
            offset: 0,
            limit,
        }
    }

    pub fn with_site(mut self, site: impl Into<String>) -> Self {
        self.site = Some(site.into());
        self
    }

    pub fn with_offset(mut self, offset: usize) -> Self {
        self.offset = offset;
        self
    }
}

/// One ranked page.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SearchResult {
    pub site: String,
    #[serde(rename = "siteName")]
    pub site_name: String,
    pub uri: String,
    pub title: String,
    pub snippet: String,
    /// Relevance relative to the best match, in `[0.0, 1.0]`
    pub relevance: f64,
}

/// A page of results plus the total number of matches.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SearchResponse {
    pub count: usize,
    pub results: Vec<SearchResult>,
}
