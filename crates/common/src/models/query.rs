//! Search query with optional scope and filters

use serde::{Deserialize, Serialize};

/// Identifiers restricting which part of the corpus is searched
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryScope {
    /// Only these documents (empty = all)
    #[serde(default)]
    pub document_ids: Vec<String>,

    /// Only this subject
    pub subject_id: Option<String>,

    /// Only subjects grouped under this knowledge base
    pub knowledge_base_id: Option<String>,
}

/// Inclusive difficulty range (levels 1-5)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DifficultyRange {
    pub min: u8,
    pub max: u8,
}

impl DifficultyRange {
    pub fn contains(&self, level: u8) -> bool {
        (self.min..=self.max).contains(&level)
    }
}

/// Optional metadata filters
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryFilters {
    pub difficulty: Option<DifficultyRange>,

    /// Case-insensitive chapter label match
    pub chapter: Option<String>,

    /// Passage must carry at least one of these topics (empty = any)
    #[serde(default)]
    pub topics: Vec<String>,
}

/// Free-text query plus scope and filters
///
/// Built once per call and never mutated afterwards; the builder methods
/// consume and return the value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SearchQuery {
    pub text: String,

    #[serde(default)]
    pub scope: QueryScope,

    #[serde(default)]
    pub filters: QueryFilters,
}

impl SearchQuery {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    pub fn in_subject(mut self, subject_id: impl Into<String>) -> Self {
        self.scope.subject_id = Some(subject_id.into());
        self
    }

    pub fn in_documents(mut self, document_ids: Vec<String>) -> Self {
        self.scope.document_ids = document_ids;
        self
    }

    pub fn in_knowledge_base(mut self, knowledge_base_id: impl Into<String>) -> Self {
        self.scope.knowledge_base_id = Some(knowledge_base_id.into());
        self
    }

    pub fn with_difficulty(mut self, min: u8, max: u8) -> Self {
        self.filters.difficulty = Some(DifficultyRange { min, max });
        self
    }

    pub fn with_chapter(mut self, chapter: impl Into<String>) -> Self {
        self.filters.chapter = Some(chapter.into());
        self
    }

    pub fn with_topics(mut self, topics: Vec<String>) -> Self {
        self.filters.topics = topics;
        self
    }

    /// Same scope and filters, different text (used for expanded queries)
    pub fn with_text(&self, text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..self.clone()
        }
    }

    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}
