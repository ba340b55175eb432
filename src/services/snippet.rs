// src/services/snippet.rs

//! Highlighted excerpts around the first query match in page text.

use std::sync::LazyLock;

use regex::{Regex, RegexBuilder};

use crate::services::lemmatizer::fold_yo;

static ENDINGS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(ий|ей|ой|ая|ие|ый|ые|ть|ти|их|о|а)$").expect("valid endings pattern")
});
static SUFFIXES: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(ова|ева|ец|иц)$").expect("valid suffixes pattern"));
static REFLEXIVE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(иться|аться|уться)$").expect("valid reflexive pattern"));

const MIN_ROOT_LEN: usize = 3;
const ELLIPSIS: &str = "...";

/// Crude Russian root: strips common endings and suffixes.
///
/// Words that would shrink below three letters are returned unchanged.
///
/// ```
/// use sitesearch::services::snippet::word_root;
///
/// assert_eq!(word_root("новый"), "нов");
/// assert_eq!(word_root("дом"), "дом");
/// assert_eq!(word_root("вести"), "ве");
/// ```
pub fn word_root(word: &str) -> String {
    if word.chars().count() <= MIN_ROOT_LEN {
        return word.to_string();
    }
    if let Some(stem) = word.strip_suffix("сти").filter(|_| word.ends_with("ести")) {
        return stem.to_string();
    }

    let root = ENDINGS.replace(word, "");
    let root = SUFFIXES.replace(&root, "");
    let root = REFLEXIVE.replace(&root, "");

    if root.chars().count() < MIN_ROOT_LEN {
        word.to_string()
    } else {
        root.into_owned()
    }
}

/// Builds `<b>`-highlighted snippets with a fixed amount of context.
#[derive(Debug, Clone)]
pub struct SnippetBuilder {
    context_chars: usize,
}

impl SnippetBuilder {
    pub fn new(context_chars: usize) -> Self {
        Self { context_chars }
    }

    /// Excerpt of `text` around the first match of `query`, if any.
    ///
    /// The query matches either literally or as a sequence of word roots
    /// followed by any Cyrillic letters, case-insensitively.
    pub fn build(&self, text: &str, query: &str) -> Option<String> {
        let pattern = query_pattern(query)?;
        let text = fold_yo(text);
        let found = pattern.find(&text)?;

        let (before, cut_before) = tail(&text[..found.start()], self.context_chars);
        let (after, cut_after) = head(&text[found.end()..], self.context_chars);

        let mut snippet = String::new();
        if cut_before {
            snippet.push_str(ELLIPSIS);
        }
        snippet.push_str(before);
        snippet.push_str("<b>");
        snippet.push_str(found.as_str());
        snippet.push_str("</b>");
        snippet.push_str(after);
        if cut_after {
            snippet.push_str(ELLIPSIS);
        }
        Some(snippet)
    }
}

fn query_pattern(query: &str) -> Option<Regex> {
    let words: Vec<String> = query
        .split_whitespace()
        .map(|word| fold_yo(&word.to_lowercase()))
        .collect();
    if words.is_empty() {
        return None;
    }

    let literal = words
        .iter()
        .map(|word| regex::escape(word))
        .collect::<Vec<_>>()
        .join(r"\s+");
    let stemmed = words
        .iter()
        .map(|word| format!("{}[а-яё]*", regex::escape(&word_root(word))))
        .collect::<Vec<_>>()
        .join(r"\s+");

    RegexBuilder::new(&format!("(?:{literal})|(?:{stemmed})"))
        .case_insensitive(true)
        .build()
        .map_err(|e| log::warn!("Could not build snippet pattern for '{query}': {e}"))
        .ok()
}

/// Last `n` chars of `s`, and whether anything was cut.
fn tail(s: &str, n: usize) -> (&str, bool) {
    let total = s.chars().count();
    if total <= n {
        return (s, false);
    }
    let start = s
        .char_indices()
        .nth(total - n)
        .map_or(s.len(), |(idx, _)| idx);
    (&s[start..], true)
}

/// First `n` chars of `s`, and whether anything was cut.
fn head(s: &str, n: usize) -> (&str, bool) {
    match s.char_indices().nth(n) {
        Some((idx, _)) => (&s[..idx], true),
        None => (s, false),
    }
}
