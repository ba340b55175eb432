//! Application configuration structures.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};
use crate::utils::url::normalize_site_key;

/// Root application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// HTTP and crawling behavior settings
    #[serde(default)]
    pub crawler: CrawlerConfig,

    /// Ranking and snippet settings
    #[serde(default)]
    pub search: SearchConfig,

    /// Sites to index
    #[serde(default)]
    pub sites: Vec<SiteConfig>,
}

impl Config {
    /// Load configuration from a TOML file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Load configuration or return default if loading fails.
    pub fn load_or_default(path: impl AsRef<Path>) -> Self {
        Self::load(&path).unwrap_or_else(|e| {
            log::warn!(
                "Config load failed from {:?}: {}. Using defaults.",
                path.as_ref(),
                e
            );
            Self::default()
        })
    }

    /// Validate configuration values for basic sanity.
    pub fn validate(&self) -> Result<()> {
        if self.crawler.user_agent.trim().is_empty() {
            return Err(AppError::validation("crawler.user_agent is empty"));
        }
        if self.crawler.timeout_secs == 0 {
            return Err(AppError::validation("crawler.timeout_secs must be > 0"));
        }
        if self.crawler.max_concurrent == 0 {
            return Err(AppError::validation("crawler.max_concurrent must be > 0"));
        }
        if self.crawler.min_delay_ms > self.crawler.max_delay_ms {
            return Err(AppError::validation(
                "crawler.min_delay_ms must not exceed crawler.max_delay_ms",
            ));
        }
        let ratio = self.search.frequency_ceiling_ratio;
        if !(ratio > 0.0 && ratio <= 1.0) {
            return Err(AppError::validation(
                "search.frequency_ceiling_ratio must be in (0, 1]",
            ));
        }
        if self.search.default_limit == 0 {
            return Err(AppError::validation("search.default_limit must be > 0"));
        }
        if self.sites.is_empty() {
            return Err(AppError::validation("No sites defined"));
        }
        for site in &self.sites {
            let parsed = url::Url::parse(&site.url)?;
            if !matches!(parsed.scheme(), "http" | "https") {
                return Err(AppError::validation(format!(
                    "Site '{}' must use http or https",
                    site.url
                )));
            }
        }
        Ok(())
    }

    /// Find the configured site matching a URL or bare host name.
    ///
    /// Scheme and a leading `www.` are ignored on both sides.
    pub fn find_site(&self, url_or_name: &str) -> Option<&SiteConfig> {
        let key = normalize_site_key(url_or_name);
        self.sites
            .iter()
            .find(|site| normalize_site_key(&site.url) == key)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            crawler: CrawlerConfig::default(),
            search: SearchConfig::default(),
            sites: defaults::default_sites(),
        }
    }
}

/// HTTP client and crawling behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlerConfig {
    /// User-Agent header for HTTP requests
    #[serde(default = "defaults::user_agent")]
    pub user_agent: String,

    /// Referer header for HTTP requests
    #[serde(default = "defaults::referrer")]
    pub referrer: String,

    /// Request timeout in seconds
    #[serde(default = "defaults::timeout")]
    pub timeout_secs: u64,

    /// Lower bound of the random delay before each fetch
    #[serde(default = "defaults::min_delay")]
    pub min_delay_ms: u64,

    /// Upper bound of the random delay before each fetch
    #[serde(default = "defaults::max_delay")]
    pub max_delay_ms: u64,

    /// Maximum concurrent fetches within one site
    #[serde(default = "defaults::max_concurrent")]
    pub max_concurrent: usize,

    /// Link extensions that are never followed
    #[serde(default = "defaults::skip_extensions")]
    pub skip_extensions: Vec<String>,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            user_agent: defaults::user_agent(),
            referrer: defaults::referrer(),
            timeout_secs: defaults::timeout(),
            min_delay_ms: defaults::min_delay(),
            max_delay_ms: defaults::max_delay(),
            max_concurrent: defaults::max_concurrent(),
            skip_extensions: defaults::skip_extensions(),
        }
    }
}

/// Ranking and snippet settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Page size used when the caller gives none
    #[serde(default = "defaults::default_limit")]
    pub default_limit: usize,

    /// Characters of context kept on each side of a snippet match
    #[serde(default = "defaults::snippet_context")]
    pub snippet_context_chars: usize,

    /// Lemmas with a document frequency above `max_df * ratio` are ignored.
    ///
    /// `1.0` keeps every lemma.
    #[serde(default = "defaults::frequency_ceiling_ratio")]
    pub frequency_ceiling_ratio: f64,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            default_limit: defaults::default_limit(),
            snippet_context_chars: defaults::snippet_context(),
            frequency_ceiling_ratio: defaults::frequency_ceiling_ratio(),
        }
    }
}

/// A site to crawl.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SiteConfig {
    /// Root URL, every followed link must start with it
    pub url: String,

    /// Display name
    pub name: String,
}

mod defaults {
    use super::SiteConfig;

    // Crawler defaults
    pub fn user_agent() -> String {
        "Mozilla/5.0 (compatible; SiteSearchBot/1.0)".into()
    }
    pub fn referrer() -> String {
        "http://www.google.com".into()
    }
    pub fn timeout() -> u64 {
        10
    }
    pub fn min_delay() -> u64 {
        1
    }
    pub fn max_delay() -> u64 {
        5
    }
    pub fn max_concurrent() -> usize {
        16
    }
    pub fn skip_extensions() -> Vec<String> {
        ["doc", "docx", "pdf", "rtf", "mp3", "mp4", "avi", "wav"]
            .into_iter()
            .map(String::from)
            .collect()
    }

    // Search defaults
    pub fn default_limit() -> usize {
        20
    }
    pub fn snippet_context() -> usize {
        100
    }
    pub fn frequency_ceiling_ratio() -> f64 {
        1.0
    }

    pub fn default_sites() -> Vec<SiteConfig> {
        vec![
            SiteConfig {
                url: "https://www.playback.ru".to_string(),
                name: "PlayBack.Ru".to_string(),
            },
            SiteConfig {
                url: "https://volochek.life".to_string(),
                name: "Volochek.Life".to_string(),
            },
        ]
    }
}
