// src/error.rs

//! Unified error handling for the search engine.

use std::fmt;

use thiserror::Error;

/// Result type alias for search engine operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP client could not be built or used
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// URL parsing failed
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Configuration value out of range
    #[error("Validation error: {0}")]
    Validation(String),

    /// Storage backend failure
    #[error("Storage error: {0}")]
    Storage(String),

    /// An indexing run is already in progress
    #[error("Indexing is already running")]
    AlreadyRunning,

    /// Stop requested while no indexing run is in progress
    #[error("Indexing is not running")]
    NotRunning,

    /// Requested site is not in the configured site list
    #[error("Site '{url}' is not listed in the configuration")]
    SiteNotConfigured { url: String },

    /// Search scoped to a site that has no stored data
    #[error("Site '{url}' has not been indexed")]
    UnknownSite { url: String },

    /// Search query is empty
    #[error("Empty search query")]
    EmptyQuery,

    /// Nothing has been indexed yet, so no result is possible
    #[error("Index is empty, run indexing first")]
    NothingIndexed,

    /// Non-recoverable fetch failure
    #[error("Fetch error for {url}: {message}")]
    Fetch { url: String, message: String },
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error.
    pub fn storage(message: impl fmt::Display) -> Self {
        Self::Storage(message.to_string())
    }

    /// Create a fatal fetch error with context.
    pub fn fetch(url: impl Into<String>, message: impl fmt::Display) -> Self {
        Self::Fetch {
            url: url.into(),
            message: message.to_string(),
        }
    }

    /// Errors caused by the caller's request rather than a system fault.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::AlreadyRunning
                | Self::NotRunning
                | Self::SiteNotConfigured { .. }
                | Self::UnknownSite { .. }
                | Self::EmptyQuery
                | Self::NothingIndexed
        )
    }
}
