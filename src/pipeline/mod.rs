//! Indexing pipeline.
//!
//! - `indexing`: run orchestration over the configured sites
//! - `crawl`: recursive crawl of a single site
//! - `run`: the single active-run slot and its cancellation token

pub mod crawl;
pub mod indexing;
pub mod run;

#[cfg(test)]
pub(crate) mod testing;

pub use crawl::{CrawlContext, CrawlOutcome, crawl_site};
pub use indexing::IndexingService;
pub use run::{RunContext, RunFlag};
