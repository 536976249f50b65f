//! Passage scoring signals
//!
//! Each passage carries three signals in [0, 1]:
//! - relevance (strategy specific)
//! - recency (exponential decay with a configurable half-life)
//! - authority (pluggable, constant by default)
//!
//! and a weighted hybrid score computed at merge time.

use chrono::{DateTime, Utc};
use learnforge_common::corpus::TextUnit;
use learnforge_common::models::{PassageCandidate, PassageMetadata};
use learnforge_common::text::estimate_tokens;
use std::sync::Arc;

/// Hybrid score weights
pub const RELEVANCE_WEIGHT: f64 = 0.5;
pub const RECENCY_WEIGHT: f64 = 0.2;
pub const AUTHORITY_WEIGHT: f64 = 0.3;

const SECONDS_PER_DAY: f64 = 86_400.0;

/// Source authority signal
pub trait AuthorityScorer: Send + Sync {
    /// Authority of a stored unit in [0, 1]
    fn score(&self, unit: &TextUnit) -> f64;
}

/// Same authority for every source
#[derive(Debug, Clone, Copy)]
pub struct ConstantAuthority(pub f64);

impl Default for ConstantAuthority {
    fn default() -> Self {
        Self(1.0)
    }
}

impl AuthorityScorer for ConstantAuthority {
    fn score(&self, _unit: &TextUnit) -> f64 {
        self.0
    }
}

/// `0.5 ^ (age_days / half_life_days)`; timestamps in the future score 1.0
pub fn recency_score(created_at: DateTime<Utc>, now: DateTime<Utc>, half_life_days: f64) -> f64 {
    let age_days = (now - created_at).num_seconds() as f64 / SECONDS_PER_DAY;
    if age_days <= 0.0 {
        return 1.0;
    }
    0.5_f64.powf(age_days / half_life_days)
}

pub fn hybrid_score(relevance: f64, recency: f64, authority: f64) -> f64 {
    RELEVANCE_WEIGHT * relevance + RECENCY_WEIGHT * recency + AUTHORITY_WEIGHT * authority
}

/// Turns corpus rows into scored candidates
#[derive(Clone)]
pub struct Scoring {
    half_life_days: f64,
    authority: Arc<dyn AuthorityScorer>,
}

impl Scoring {
    pub fn new(half_life_days: f64, authority: Arc<dyn AuthorityScorer>) -> Self {
        Self {
            half_life_days,
            authority,
        }
    }

    /// Build a candidate from a corpus row. The hybrid score is left at zero
    /// until the merge step.
    pub fn candidate(
        &self,
        unit: TextUnit,
        relevance: f64,
        now: DateTime<Utc>,
    ) -> PassageCandidate {
        let recency = recency_score(unit.created_at, now, self.half_life_days);
        let authority = self.authority.score(&unit).clamp(0.0, 1.0);

        // Every passage must be attributable to a document
        let document_id = if unit.document_id.is_empty() {
            unit.id
        } else {
            unit.document_id
        };

        PassageCandidate {
            metadata: PassageMetadata {
                document_id,
                document_name: unit.document_name,
                chapter: unit.chapter,
                subject_id: unit.subject_id,
                topics: unit.topics,
                difficulty: unit.difficulty,
                source_kind: unit.source_kind,
                relevance_score: relevance.clamp(0.0, 1.0),
                recency_score: recency,
                authority_score: authority,
                hybrid_score: 0.0,
                token_count: estimate_tokens(&unit.content),
                created_at: unit.created_at,
            },
            content: unit.content,
        }
    }
}

impl std::fmt::Debug for Scoring {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scoring")
            .field("half_life_days", &self.half_life_days)
            .finish_non_exhaustive()
    }
}
