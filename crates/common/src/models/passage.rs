//! Passage candidates produced by retrieval

use crate::text::{estimate_tokens, truncate_at_word, truncate_chars, CHARS_PER_TOKEN};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Suffix appended to a passage cut down to fit the token budget
pub const TRUNCATION_MARKER: &str = " [...]";

/// Characters of trimmed content used as the deduplication key
const DEDUP_PREFIX_CHARS: usize = 100;

/// Kind of store row a passage came from
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    #[default]
    Document,
    Chapter,
}

/// Provenance and scores of a passage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageMetadata {
    pub document_id: String,
    pub document_name: String,
    pub chapter: Option<String>,
    pub subject_id: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    /// Difficulty level 1-5
    pub difficulty: u8,
    pub source_kind: SourceKind,

    pub relevance_score: f64,
    pub recency_score: f64,
    pub authority_score: f64,
    pub hybrid_score: f64,

    pub token_count: usize,
    pub created_at: DateTime<Utc>,
}

/// A scored passage. Never mutated in place; rescoring and truncation
/// return new values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PassageCandidate {
    pub content: String,
    pub metadata: PassageMetadata,
}

impl PassageCandidate {
    pub fn token_count(&self) -> usize {
        self.metadata.token_count
    }

    pub fn relevance(&self) -> f64 {
        self.metadata.relevance_score
    }

    pub fn hybrid_score(&self) -> f64 {
        self.metadata.hybrid_score
    }

    pub fn document_id(&self) -> &str {
        &self.metadata.document_id
    }

    /// Copy with the given hybrid score
    pub fn with_hybrid_score(&self, hybrid_score: f64) -> Self {
        let mut next = self.clone();
        next.metadata.hybrid_score = hybrid_score;
        next
    }

    /// Copy cut down to at most `max_tokens` tokens, marker included
    ///
    /// Returns `None` when not even the marker fits.
    pub fn truncated_to(&self, max_tokens: usize) -> Option<Self> {
        let budget_chars = max_tokens * CHARS_PER_TOKEN;
        let marker_chars = TRUNCATION_MARKER.chars().count();
        if budget_chars <= marker_chars {
            return None;
        }

        let body = truncate_at_word(&self.content, budget_chars - marker_chars);
        let content = format!("{}{}", body.trim_end(), TRUNCATION_MARKER);
        let token_count = estimate_tokens(&content).min(max_tokens);

        let mut next = self.clone();
        next.content = content;
        next.metadata.token_count = token_count;
        Some(next)
    }

    /// Key used to detect the same passage returned twice
    pub fn dedup_key(&self) -> String {
        truncate_chars(self.content.trim(), DEDUP_PREFIX_CHARS).to_string()
    }
}
