//! Concept Analyzer - Tallies concepts across packed passages
//!
//! A concept is a lower-cased word of five or more characters that is not a
//! stop word. Agreement is derived from how many distinct source documents
//! mention it; this is a mention count, not a semantic judgement.

use learnforge_common::models::PassageCandidate;
use learnforge_common::text::{concept_frequencies, ConceptParams};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Cross-source agreement on a concept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Agreement {
    /// Mentioned by more than two sources
    Consensus,
    /// Mentioned by exactly two sources
    Mixed,
    /// Mentioned by a single source
    Conflicting,
}

impl Agreement {
    pub fn from_source_count(sources: usize) -> Self {
        match sources {
            n if n > 2 => Agreement::Consensus,
            2 => Agreement::Mixed,
            _ => Agreement::Conflicting,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptSummary {
    /// Total occurrences across all passages
    pub frequency: usize,

    /// Document ids mentioning the concept
    pub sources: BTreeSet<String>,

    pub agreement: Agreement,
}

/// Concept name -> summary, ordered by name
pub type ConceptMap = BTreeMap<String, ConceptSummary>;

#[derive(Debug, Clone, Default)]
pub struct ConceptAnalyzer;

impl ConceptAnalyzer {
    pub fn new() -> Self {
        Self
    }

    pub fn analyze(&self, chunks: &[PassageCandidate]) -> ConceptMap {
        let params = ConceptParams::analyzer();
        let mut tallies: BTreeMap<String, (usize, BTreeSet<String>)> = BTreeMap::new();

        for chunk in chunks {
            for (concept, count) in concept_frequencies(&chunk.content, &params) {
                let entry = tallies.entry(concept).or_default();
                entry.0 += count;
                entry.1.insert(chunk.document_id().to_string());
            }
        }

        tallies
            .into_iter()
            .map(|(concept, (frequency, sources))| {
                let agreement = Agreement::from_source_count(sources.len());
                (
                    concept,
                    ConceptSummary {
                        frequency,
                        sources,
                        agreement,
                    },
                )
            })
            .collect()
    }
}
