//! Read-only corpus interface
//!
//! The document/chapter store is an external collaborator. Retrieval only
//! needs two operations from it: a filtered text search and the subject
//! grouping of knowledge bases. [`InMemoryCorpus`] backs tests and the
//! command line binaries.

mod memory;

pub use memory::InMemoryCorpus;

use crate::errors::Result;
use crate::models::{QueryFilters, QueryScope, SourceKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A stored document or chapter body with its metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextUnit {
    pub id: String,
    pub document_id: String,
    pub document_name: String,
    #[serde(default)]
    pub chapter: Option<String>,
    #[serde(default)]
    pub subject_id: Option<String>,
    #[serde(default)]
    pub topics: Vec<String>,
    #[serde(default = "default_difficulty")]
    pub difficulty: u8,
    #[serde(default)]
    pub source_kind: SourceKind,
    pub content: String,
    pub created_at: DateTime<Utc>,
    /// Filled in from the content when zero
    #[serde(default)]
    pub word_count: usize,
}

fn default_difficulty() -> u8 {
    3
}

/// How query text is matched against stored content
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMode {
    /// Whole-word match of any query word longer than two characters
    FullText,
    /// Case-insensitive substring match of any query term
    Substring,
}

/// A single corpus read
#[derive(Debug, Clone)]
pub struct CorpusQuery {
    pub text: String,
    pub mode: MatchMode,
    pub scope: QueryScope,
    pub filters: QueryFilters,
    pub limit: usize,
}

/// Read interface to the document/chapter store
#[async_trait]
pub trait Corpus: Send + Sync {
    /// Units matching the query, best matches first, at most `limit`
    async fn search(&self, query: &CorpusQuery) -> Result<Vec<TextUnit>>;

    /// Other subjects sharing a knowledge base with `subject_id`
    async fn related_subjects(&self, subject_id: &str) -> Result<Vec<String>>;
}
