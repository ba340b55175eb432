//! Domain services: text analysis, indexing, search and statistics.

pub mod indexer;
pub mod lemmatizer;
pub mod search;
pub mod snippet;
pub mod statistics;

pub use indexer::IndexBuilder;
pub use lemmatizer::{Lemmatizer, Morphology, PartOfSpeech, RussianMorphology};
pub use search::SearchEngine;
pub use snippet::SnippetBuilder;
pub use statistics::StatisticsService;
