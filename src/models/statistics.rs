//! Indexing statistics for display.

use serde::{Deserialize, Serialize};

use crate::models::SiteStatus;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Statistics {
    pub total: TotalStatistics,
    pub detailed: Vec<DetailedStatistics>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct TotalStatistics {
    pub sites: usize,
    pub pages: usize,
    pub lemmas: usize,
    pub indexing: bool,
}

/// Per-site summary.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DetailedStatistics {
    pub url: String,
    pub name: String,
    pub status: SiteStatus,
    /// Milliseconds since the Unix epoch
    #[serde(rename = "statusTime")]
    pub status_time: i64,
    pub error: String,
    pub pages: usize,
    pub lemmas: usize,
}
