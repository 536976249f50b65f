//! LearnForge Search
//!
//! Passage retrieval over the read-only corpus:
//! - Similarity strategy (word overlap)
//! - Keyword strategy (term occurrences)
//! - Hybrid retriever with concurrent strategies, dedup and weighted ranking

pub mod retrieval;

pub use retrieval::{HybridRetriever, Retriever, RetrievalStrategy, SearchOptions};
