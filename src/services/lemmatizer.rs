// src/services/lemmatizer.rs

//! Turns Russian text into normalized word forms.
//!
//! The pipeline is: lower-case, replace non-Cyrillic runs with a space, split
//! on whitespace, drop function words, take the first normal form, fold `ё`
//! into `е`, drop forms of two letters or fewer.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, LazyLock};

use regex::Regex;
use rust_stemmers::{Algorithm, Stemmer};

use crate::utils::html;

static NON_CYRILLIC: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[^а-яё\s]+").expect("valid cyrillic pattern"));

/// Forms of this many characters or fewer are never indexed.
const MAX_DISCARDED_LEN: usize = 2;

/// Grammatical role of a word, as far as lemmatization cares.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartOfSpeech {
    Conjunction,
    Preposition,
    Interjection,
    Other,
}

impl PartOfSpeech {
    /// Function words carry no meaning for search.
    pub fn is_function_word(&self) -> bool {
        !matches!(self, PartOfSpeech::Other)
    }
}

/// Morphological analysis of single lower-case words.
pub trait Morphology: Send + Sync {
    fn part_of_speech(&self, word: &str) -> PartOfSpeech;

    /// Candidate base forms, most likely first.
    fn normal_forms(&self, word: &str) -> Vec<String>;
}

/// Russian morphology: closed-class word lists plus a Snowball stemmer.
pub struct RussianMorphology {
    stemmer: Stemmer,
}

const CONJUNCTIONS: &[&str] = &[
    "и", "а", "но", "да", "или", "либо", "что", "чтобы", "если", "когда", "как", "также", "тоже",
    "зато", "однако", "хотя", "ибо", "пока", "будто", "словно", "потому", "поэтому", "причем",
    "притом", "ни", "то",
];

const PREPOSITIONS: &[&str] = &[
    "в", "во", "на", "с", "со", "к", "ко", "по", "о", "об", "обо", "от", "ото", "до", "из", "изо",
    "за", "для", "без", "безо", "под", "подо", "над", "надо", "при", "про", "через", "между",
    "перед", "передо", "у", "около", "после", "вокруг", "возле", "среди", "вместо", "кроме",
    "сквозь", "ради", "вдоль", "мимо", "против", "вследствие", "благодаря", "согласно",
];

const INTERJECTIONS: &[&str] = &[
    "ах", "ох", "эх", "ой", "ай", "увы", "ура", "эй", "ага", "ого", "ну", "браво", "алло", "ух",
    "фу", "ба", "тсс", "батюшки",
];

impl RussianMorphology {
    pub fn new() -> Self {
        Self {
            stemmer: Stemmer::create(Algorithm::Russian),
        }
    }
}

impl Default for RussianMorphology {
    fn default() -> Self {
        Self::new()
    }
}

impl Morphology for RussianMorphology {
    fn part_of_speech(&self, word: &str) -> PartOfSpeech {
        if CONJUNCTIONS.contains(&word) {
            PartOfSpeech::Conjunction
        } else if PREPOSITIONS.contains(&word) {
            PartOfSpeech::Preposition
        } else if INTERJECTIONS.contains(&word) {
            PartOfSpeech::Interjection
        } else {
            PartOfSpeech::Other
        }
    }

    fn normal_forms(&self, word: &str) -> Vec<String> {
        vec![self.stemmer.stem(word).into_owned()]
    }
}

/// Replace the optional-diaeresis letter with its base letter.
pub fn fold_yo(text: &str) -> String {
    text.replace('ё', "е").replace('Ё', "Е")
}

/// Text to lemma counts, backed by a shared morphology handle.
#[derive(Clone)]
pub struct Lemmatizer {
    morphology: Arc<dyn Morphology>,
}

impl Lemmatizer {
    pub fn new(morphology: Arc<dyn Morphology>) -> Self {
        Self { morphology }
    }

    /// Lemmatizer using [`RussianMorphology`].
    pub fn russian() -> Self {
        Self::new(Arc::new(RussianMorphology::new()))
    }

    /// Count normalized forms of every content word in `text`.
    pub fn lemma_counts(&self, text: &str) -> HashMap<String, u32> {
        let mut counts = HashMap::new();
        for word in self.content_words(text) {
            let Some(form) = self.morphology.normal_forms(&word).into_iter().next() else {
                continue;
            };
            if let Some(form) = Self::accept(&form) {
                *counts.entry(form).or_insert(0) += 1;
            }
        }
        counts
    }

    /// Lemma counts for the visible body text of an HTML document.
    pub fn page_lemmas(&self, content: &str) -> HashMap<String, u32> {
        self.lemma_counts(&html::body_text(content))
    }

    /// Distinct normalized forms of a search query.
    ///
    /// Every candidate form of a word is kept, since the query gives no
    /// context to pick one.
    pub fn query_lemmas(&self, query: &str) -> HashSet<String> {
        self.content_words(query)
            .into_iter()
            .flat_map(|word| self.morphology.normal_forms(&word))
            .filter_map(|form| Self::accept(&form))
            .collect()
    }

    fn content_words(&self, text: &str) -> Vec<String> {
        let lowered = fold_yo(&text.to_lowercase());
        NON_CYRILLIC
            .replace_all(&lowered, " ")
            .split_whitespace()
            .filter(|word| !self.morphology.part_of_speech(word).is_function_word())
            .map(String::from)
            .collect()
    }

    fn accept(form: &str) -> Option<String> {
        let form = fold_yo(form);
        (form.chars().count() > MAX_DISCARDED_LEN && form.chars().all(char::is_alphabetic))
            .then_some(form)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Morphology that echoes words and tags a fixed list as prepositions.
    struct EchoMorphology;

    impl Morphology for EchoMorphology {
        fn part_of_speech(&self, word: &str) -> PartOfSpeech {
            if word == "для" {
                PartOfSpeech::Preposition
            } else {
                PartOfSpeech::Other
            }
        }

        fn normal_forms(&self, word: &str) -> Vec<String> {
            vec![word.to_string(), format!("{word}ы")]
        }
    }

    fn echo() -> Lemmatizer {
        Lemmatizer::new(Arc::new(EchoMorphology))
    }

    #[test]
    fn test_counts_use_first_normal_form() {
        let counts = echo().lemma_counts("Кот, кот и КОТ для дома!");
        assert_eq!(counts.get("кот"), Some(&3));
        assert_eq!(counts.get("дома"), Some(&1));
        assert!(!counts.contains_key("для"));
        assert!(!counts.contains_key("коты"));
    }

    #[test]
    fn test_short_and_latin_words_dropped() {
        let counts = echo().lemma_counts("он iPhone 15 ок лес");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("лес"), Some(&1));
    }

    #[test]
    fn test_query_lemmas_keep_all_forms() {
        let lemmas = echo().query_lemmas("кот для кот");
        assert_eq!(
            lemmas,
            HashSet::from(["кот".to_string(), "коты".to_string()])
        );
    }

    #[test]
    fn test_russian_function_words_removed() {
        let lemmatizer = Lemmatizer::russian();
        let counts = lemmatizer.lemma_counts("для через между около");
        assert!(counts.is_empty());
    }

    #[test]
    fn test_russian_inflections_share_a_form() {
        let lemmatizer = Lemmatizer::russian();
        let counts = lemmatizer.lemma_counts("Пример и примеры");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.get("пример"), Some(&2));
    }

    #[test]
    fn test_yo_folded() {
        let lemmatizer = Lemmatizer::russian();
        let counts = lemmatizer.lemma_counts("ёлка елка");
        assert_eq!(counts.len(), 1);
        assert_eq!(counts.values().next(), Some(&2));
        assert!(counts.keys().all(|k| !k.contains('ё')));
    }

    #[test]
    fn test_forms_are_long_alphabetic() {
        let lemmatizer = Lemmatizer::russian();
        let inputs = [
            "Купить смартфон недорого: 12 990 руб.!",
            "я ты мы он, оно — да; нет? ой",
            "<p>Интернет-магазин «ПлейБэк» – доставка по Москве</p>",
            "ёжик в тумане, ЁЛКИ-палки",
            "",
        ];
        for input in inputs {
            for form in lemmatizer.lemma_counts(input).keys() {
                assert!(form.chars().count() > 2, "{form} too short");
                assert!(form.chars().all(char::is_alphabetic), "{form} not alphabetic");
            }
        }
    }

    #[test]
    fn test_page_lemmas_read_body_only() {
        let lemmatizer = Lemmatizer::russian();
        let counts = lemmatizer
            .page_lemmas("<html><head><title>заголовок</title></head><body>пример</body></html>");
        assert_eq!(counts.len(), 1);
        assert!(counts.contains_key("пример"));
    }
}
