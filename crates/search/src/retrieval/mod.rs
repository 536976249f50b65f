//! Multi-signal retrieval system
//!
//! Provides two corpus strategies:
//! - Similarity (word overlap against a full-text match)
//! - Keyword (term occurrence counts against a substring match)
//!
//! and a hybrid retriever that runs both, merges, deduplicates and ranks.

mod hybrid;
mod keyword;
mod scoring;
mod similarity;

pub use hybrid::HybridRetriever;
pub use keyword::KeywordRetriever;
pub use scoring::{
    hybrid_score, recency_score, AuthorityScorer, ConstantAuthority, Scoring, AUTHORITY_WEIGHT,
    RECENCY_WEIGHT, RELEVANCE_WEIGHT,
};
pub use similarity::SimilarityRetriever;

use chrono::{DateTime, Utc};
use learnforge_common::config::RetrievalConfig;
use learnforge_common::errors::Result;
use learnforge_common::models::{PassageCandidate, SearchQuery};
use serde::{Deserialize, Serialize};

/// Retrieval strategy
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RetrievalStrategy {
    /// Word-overlap similarity
    Similarity,
    /// Keyword occurrence matching
    Keyword,
}

impl RetrievalStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            RetrievalStrategy::Similarity => "similarity",
            RetrievalStrategy::Keyword => "keyword",
        }
    }
}

/// Search parameters
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct SearchOptions {
    /// Maximum results to return
    pub top_k: usize,

    /// Minimum hybrid score kept
    pub similarity_threshold: f64,

    /// Run the keyword strategy as well as similarity
    pub use_hybrid_search: bool,
}

impl SearchOptions {
    pub fn from_config(config: &RetrievalConfig) -> Self {
        Self {
            top_k: config.top_k,
            similarity_threshold: config.similarity_threshold,
            use_hybrid_search: config.use_hybrid_search,
        }
    }
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self::from_config(&RetrievalConfig::default())
    }
}

/// Common trait for the corpus strategies
#[async_trait::async_trait]
pub trait Retriever: Send + Sync {
    /// Retrieve at most `limit` scored passages; hybrid scores are not set
    async fn retrieve(
        &self,
        query: &SearchQuery,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<PassageCandidate>>;

    /// Get the retrieval strategy
    fn strategy(&self) -> RetrievalStrategy;
}
