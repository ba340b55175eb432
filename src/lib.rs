// src/lib.rs

//! Site search engine library
//!
//! Crawls configured websites, builds a lemma-based inverted index of their
//! pages and answers ranked full-text queries with highlighted snippets.

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
