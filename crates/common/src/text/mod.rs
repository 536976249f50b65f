//! Lexical heuristics shared by the retrieval and analysis stages
//!
//! Provides:
//! - Token estimation (~4 characters per token)
//! - Word tokenization and overlap ratios
//! - Concept extraction, parameterized per call site
//! - Sentence splitting and char-safe truncation

use regex_lite::Regex;
use std::collections::{HashMap, HashSet};
use std::sync::OnceLock;

/// Approximate characters per token
pub const CHARS_PER_TOKEN: usize = 4;

/// Words ignored by concept extraction. Only words of five or more
/// characters can ever be concepts, so shorter stop words are omitted.
pub const CONCEPT_STOPWORDS: &[&str] = &[
    "about", "above", "after", "again", "against", "almost", "along", "already",
    "also", "although", "always", "among", "another", "around", "because",
    "become", "becomes", "before", "behind", "being", "below", "between",
    "beyond", "cannot", "could", "didn't", "doesn't", "during", "either",
    "enough", "especially", "every", "example", "first", "following", "further",
    "given", "however", "important", "including", "instead", "itself", "known",
    "learn", "learning", "later", "least", "might", "often", "other", "others",
    "otherwise", "perhaps", "rather", "really", "second", "several", "shall",
    "should", "simply", "since", "something", "sometimes", "still", "study",
    "studying", "their", "theirs", "themselves", "there", "therefore", "these",
    "thing", "things", "third", "those", "though", "through", "throughout",
    "together", "toward", "towards", "under", "understand", "understanding",
    "unless", "until", "usually", "various", "where", "whereas", "whether",
    "which", "while", "within", "without", "would", "yourself",
];

/// Parameters for [`extract_concepts`]
///
/// The analyzer, the conflict resolver and the aggregator all use the same
/// extraction with slightly different limits.
#[derive(Debug, Clone, Copy)]
pub struct ConceptParams {
    /// Minimum word length (characters)
    pub min_len: usize,

    /// Keep only the N most frequent concepts (`None` keeps all)
    pub top_n: Option<usize>,

    /// Words never treated as concepts
    pub stopwords: &'static [&'static str],
}

impl ConceptParams {
    /// Every concept of five or more characters
    pub const fn analyzer() -> Self {
        Self { min_len: 5, top_n: None, stopwords: CONCEPT_STOPWORDS }
    }

    /// Ten most frequent concepts per passage, used for claim comparison
    pub const fn claims() -> Self {
        Self { min_len: 5, top_n: Some(10), stopwords: CONCEPT_STOPWORDS }
    }

    /// Fifteen most frequent concepts per passage, used for clustering
    pub const fn clusters() -> Self {
        Self { min_len: 5, top_n: Some(15), stopwords: CONCEPT_STOPWORDS }
    }
}

fn word_regex() -> &'static Regex {
    static WORD: OnceLock<Regex> = OnceLock::new();
    WORD.get_or_init(|| {
        Regex::new(r"\b[a-z][a-z0-9]*(?:['-][a-z0-9]+)*\b").expect("valid word pattern")
    })
}

/// Estimate the token count of a text
pub fn estimate_tokens(text: &str) -> usize {
    text.chars().count().div_ceil(CHARS_PER_TOKEN)
}

/// Lower-cased words of a text, in order, punctuation stripped
pub fn tokenize(text: &str) -> Vec<String> {
    let lower = text.to_lowercase();
    word_regex()
        .find_iter(&lower)
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Distinct lower-cased words of a text
pub fn word_set(text: &str) -> HashSet<String> {
    tokenize(text).into_iter().collect()
}

/// Normalized word-overlap ratio: `|A ∩ B| / max(|A|, |B|)`
///
/// Returns 0.0 when either side has no words.
pub fn overlap_ratio(a: &str, b: &str) -> f64 {
    let words_a = word_set(a);
    let words_b = word_set(b);

    if words_a.is_empty() || words_b.is_empty() {
        return 0.0;
    }

    let intersection = words_a.intersection(&words_b).count();
    intersection as f64 / words_a.len().max(words_b.len()) as f64
}

/// Concept frequencies of a text, most frequent first
///
/// Ties are broken alphabetically so the output is deterministic.
pub fn concept_frequencies(text: &str, params: &ConceptParams) -> Vec<(String, usize)> {
    let mut counts: HashMap<String, usize> = HashMap::new();

    for word in tokenize(text) {
        if word.chars().count() < params.min_len || params.stopwords.contains(&word.as_str()) {
            continue;
        }
        if word.chars().all(|c| c.is_ascii_digit()) {
            continue;
        }
        *counts.entry(word).or_insert(0) += 1;
    }

    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));

    if let Some(n) = params.top_n {
        ranked.truncate(n);
    }
    ranked
}

/// Concept labels of a text, most frequent first
pub fn extract_concepts(text: &str, params: &ConceptParams) -> Vec<String> {
    concept_frequencies(text, params)
        .into_iter()
        .map(|(concept, _)| concept)
        .collect()
}

/// Check whether `text` mentions `concept` as a whole word (case-insensitive)
pub fn mentions(text: &str, concept: &str) -> bool {
    let concept = concept.to_lowercase();
    tokenize(text).iter().any(|w| *w == concept)
}

/// Split text into trimmed, non-empty sentences on `.`, `!` and `?`
pub fn sentences(text: &str) -> Vec<&str> {
    text.split(['.', '!', '?'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// First `max_chars` characters of a text
pub fn truncate_chars(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((byte_idx, _)) => &text[..byte_idx],
        None => text,
    }
}

/// Cut a text to at most `max_chars` characters, preferring a word boundary
pub fn truncate_at_word(text: &str, max_chars: usize) -> &str {
    let cut = truncate_chars(text, max_chars);
    if cut.len() == text.len() {
        return cut;
    }
    match cut.rfind(char::is_whitespace) {
        // Only back off to the space if it keeps most of the budget
        Some(pos) if pos * 2 >= cut.len() => cut[..pos].trim_end(),
        _ => cut,
    }
}
