//! LearnForge Common Library
//!
//! Shared code for the retrieval and context crates including:
//! - Passage and query models
//! - Read-only corpus interface and an in-memory corpus
//! - Lexical heuristics (tokens, concepts, overlap)
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability

pub mod config;
pub mod corpus;
pub mod errors;
pub mod metrics;
pub mod models;
pub mod text;

// Re-export commonly used types
pub use config::{AppConfig, RetrievalConfig, RetrievalOverrides};
pub use corpus::{Corpus, CorpusQuery, InMemoryCorpus, MatchMode, TextUnit};
pub use errors::{AppError, Result};
pub use models::{PassageCandidate, PassageMetadata, SearchQuery, SourceKind};

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
