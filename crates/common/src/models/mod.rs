//! Passage and query models
//!
//! Value objects created fresh per retrieval call and discarded once the
//! caller has consumed them.

mod passage;
mod query;

pub use passage::{PassageCandidate, PassageMetadata, SourceKind, TRUNCATION_MARKER};
pub use query::{DifficultyRange, QueryFilters, QueryScope, SearchQuery};
