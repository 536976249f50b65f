//! Context Packer - Fits ranked passages into a token budget
//!
//! Provides:
//! - Greedy packing by relevance
//! - Source diversity (up to three documents represented)
//! - A single truncated passage to fill leftover budget
//! - Reading-order arrangement by chapter label

use learnforge_common::models::PassageCandidate;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::OnceLock;
use tracing::debug;

/// Sources the packer tries to represent
pub const DIVERSITY_TARGET: usize = 3;

/// Minimum share of a passage that must fit before it is truncated in
pub const MIN_TRUNCATION_SHARE: f64 = 0.3;

/// Packed context window
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PackedContext {
    /// Selected passages in reading order
    pub chunks: Vec<PassageCandidate>,

    /// Sum of chunk token counts, never above the budget
    pub total_tokens: usize,

    /// Whether the last selected passage was cut down to fit
    pub truncated: bool,
}

impl PackedContext {
    /// Distinct source documents in the packed chunks
    pub fn source_count(&self) -> usize {
        self.chunks
            .iter()
            .map(|c| c.document_id())
            .collect::<HashSet<_>>()
            .len()
    }
}

fn intro_pattern() -> &'static Regex {
    static INTRO: OnceLock<Regex> = OnceLock::new();
    INTRO.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)\b(intro|introduction|introductory|overview|preface",
            r"|getting started|basics|fundamentals|foundations)\b",
        ))
        .expect("valid intro pattern")
    })
}

fn conclusion_pattern() -> &'static Regex {
    static CONCLUSION: OnceLock<Regex> = OnceLock::new();
    CONCLUSION.get_or_init(|| {
        Regex::new(concat!(
            r"(?i)\b(conclusion|conclusions|concluding|summary|recap|review",
            r"|wrap[- ]up|final thoughts|next steps|epilogue)\b",
        ))
        .expect("valid conclusion pattern")
    })
}

/// Reading-order group of a chapter label
fn reading_group(chapter: Option<&str>) -> u8 {
    match chapter.map(str::trim) {
        None | Some("") => 3,
        Some(label) if intro_pattern().is_match(label) => 0,
        Some(label) if conclusion_pattern().is_match(label) => 2,
        Some(_) => 1,
    }
}

/// Token-budgeted packer
#[derive(Debug, Clone, Default)]
pub struct ContextPacker;

impl ContextPacker {
    pub fn new() -> Self {
        Self
    }

    /// Pack candidates into at most `max_tokens` tokens
    pub fn pack(&self, candidates: &[PassageCandidate], max_tokens: usize) -> PackedContext {
        // Stable: equal relevance keeps retrieval order
        let mut ranked: Vec<&PassageCandidate> = candidates.iter().collect();
        ranked.sort_by(|a, b| b.relevance().partial_cmp(&a.relevance()).unwrap_or(Ordering::Equal));

        let mut selected = vec![false; ranked.len()];
        let mut total = 0usize;
        let mut overflow: Option<usize> = None;

        // Greedy pass; the first passage that does not fit is the truncation candidate
        for (i, candidate) in ranked.iter().enumerate() {
            if total + candidate.token_count() <= max_tokens {
                selected[i] = true;
                total += candidate.token_count();
            } else if overflow.is_none() {
                overflow = Some(i);
            }
        }

        // Diversity pass
        let available: HashSet<&str> = ranked.iter().map(|c| c.document_id()).collect();
        let target = DIVERSITY_TARGET.min(available.len());
        let mut sources: HashSet<&str> = ranked
            .iter()
            .zip(&selected)
            .filter(|(_, chosen)| **chosen)
            .map(|(c, _)| c.document_id())
            .collect();

        if sources.len() < target {
            for (i, candidate) in ranked.iter().enumerate() {
                if sources.len() >= target {
                    break;
                }
                if selected[i] || sources.contains(candidate.document_id()) {
                    continue;
                }
                if total + candidate.token_count() <= max_tokens {
                    selected[i] = true;
                    total += candidate.token_count();
                    sources.insert(candidate.document_id());
                }
            }
        }

        let mut chosen: Vec<PassageCandidate> = ranked
            .iter()
            .zip(&selected)
            .filter(|(_, chosen)| **chosen)
            .map(|(c, _)| (*c).clone())
            .collect();

        // Truncation fill
        let mut truncated = false;
        if let Some(i) = overflow.filter(|&i| !selected[i]) {
            let candidate = ranked[i];
            let remaining = max_tokens - total;
            if remaining as f64 >= MIN_TRUNCATION_SHARE * candidate.token_count() as f64 {
                if let Some(cut) = candidate.truncated_to(remaining) {
                    total += cut.token_count();
                    truncated = true;
                    // Keep relevance order among the selected passages
                    let position = chosen
                        .iter()
                        .position(|c| c.relevance() < cut.relevance())
                        .unwrap_or(chosen.len());
                    chosen.insert(position, cut);
                }
            }
        }

        // Reading order
        chosen.sort_by_key(|c| reading_group(c.metadata.chapter.as_deref()));

        debug!(
            candidates = candidates.len(),
            chunks = chosen.len(),
            total_tokens = total,
            max_tokens,
            truncated,
            "Packed context"
        );

        PackedContext {
            chunks: chosen,
            total_tokens: total,
            truncated,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use learnforge_common::models::{PassageMetadata, SourceKind};
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn candidate(document_id: &str, tokens: usize, relevance: f64) -> PassageCandidate {
        PassageCandidate {
            content: format!("{} ", document_id).repeat(tokens * 2),
            metadata: PassageMetadata {
                document_id: document_id.into(),
                document_name: format!("Document {}", document_id),
                chapter: None,
                subject_id: None,
                topics: vec![],
                difficulty: 3,
                source_kind: SourceKind::Document,
                relevance_score: relevance,
                recency_score: 1.0,
                authority_score: 1.0,
                hybrid_score: 0.0,
                token_count: tokens,
                created_at: Utc::now(),
            },
        }
    }

    fn with_chapter(mut c: PassageCandidate, chapter: &str) -> PassageCandidate {
        c.metadata.chapter = Some(chapter.to_string());
        c
    }

    #[test]
    fn test_diversity_beats_same_source_truncation() {
        let candidates = vec![
            candidate("A", 5000, 0.9),
            candidate("A", 5000, 0.8),
            candidate("B", 4000, 0.5),
        ];

        let packed = ContextPacker::new().pack(&candidates, 9000);

        assert_eq!(packed.total_tokens, 9000);
        assert_eq!(packed.chunks.len(), 2);
        assert_eq!(packed.chunks[0].document_id(), "A");
        assert_eq!(packed.chunks[0].relevance(), 0.9);
        assert_eq!(packed.chunks[1].document_id(), "B");
        assert_eq!(packed.source_count(), 2);
        assert!(!packed.truncated);
    }

    #[test]
    fn test_truncated_passage_fills_budget() {
        let candidates = vec![candidate("A", 600, 0.9), candidate("B", 600, 0.8)];

        let packed = ContextPacker::new().pack(&candidates, 1000);

        assert!(packed.truncated);
        assert_eq!(packed.chunks.len(), 2);
        assert!(packed.total_tokens <= 1000);
        assert!(packed.chunks[1].content.ends_with(learnforge_common::models::TRUNCATION_MARKER));
        assert!(packed.chunks[1].token_count() <= 400);
    }

    #[test]
    fn test_small_remainder_is_not_truncated_in() {
        // 100 left, candidate needs 30% of 600 = 180
        let candidates = vec![candidate("A", 900, 0.9), candidate("B", 600, 0.8)];

        let packed = ContextPacker::new().pack(&candidates, 1000);

        assert!(!packed.truncated);
        assert_eq!(packed.chunks.len(), 1);
        assert_eq!(packed.total_tokens, 900);
    }

    #[test]
    fn test_greedy_skips_oversized_passage() {
        let candidates = vec![
            candidate("A", 900, 0.9),
            candidate("A", 600, 0.8),
            candidate("A", 50, 0.7),
        ];

        let packed = ContextPacker::new().pack(&candidates, 1000);

        assert_eq!(packed.total_tokens, 950);
        assert_eq!(packed.chunks.len(), 2);
        assert_eq!(packed.chunks[1].relevance(), 0.7);
        assert!(!packed.truncated);
    }

    #[test]
    fn test_three_sources_when_available() {
        let candidates = vec![
            candidate("A", 300, 0.95),
            candidate("A", 300, 0.9),
            candidate("A", 300, 0.85),
            candidate("A", 300, 0.8),
            candidate("B", 50, 0.4),
            candidate("C", 50, 0.3),
            candidate("D", 50, 0.2),
        ];

        let packed = ContextPacker::new().pack(&candidates, 1000);

        assert_eq!(packed.total_tokens, 1000);
        assert_eq!(packed.source_count(), 3);
        // D stays out once the target is met
        assert!(packed.chunks.iter().all(|c| c.document_id() != "D"));
    }

    #[test]
    fn test_reading_order() {
        let candidates = vec![
            candidate("A", 10, 0.9),
            with_chapter(candidate("B", 10, 0.8), "Summary and Review"),
            with_chapter(candidate("C", 10, 0.7), "Cell Structure"),
            with_chapter(candidate("D", 10, 0.6), "Introduction to Cells"),
            with_chapter(candidate("E", 10, 0.5), "Membranes"),
        ];

        let packed = ContextPacker::new().pack(&candidates, 1000);
        let order: Vec<&str> = packed.chunks.iter().map(|c| c.document_id()).collect();

        assert_eq!(order, vec!["D", "C", "E", "B", "A"]);
    }

    #[test]
    fn test_packing_is_deterministic() {
        let candidates = vec![
            candidate("A", 120, 0.5),
            candidate("B", 80, 0.5),
            candidate("C", 300, 0.7),
            candidate("D", 90, 0.5),
        ];

        let packer = ContextPacker::new();
        let first = packer.pack(&candidates, 400);
        let second = packer.pack(&candidates, 400);
        assert_eq!(first, second);
    }

    #[test]
    fn test_budget_never_exceeded() {
        let mut rng = StdRng::seed_from_u64(42);
        let packer = ContextPacker::new();

        for _ in 0..200 {
            let count = rng.gen_range(0..15);
            let candidates: Vec<PassageCandidate> = (0..count)
                .map(|_| {
                    let source = ["A", "B", "C", "D", "E"][rng.gen_range(0..5)];
                    candidate(source, rng.gen_range(1..800), rng.gen::<f64>())
                })
                .collect();
            let max_tokens = rng.gen_range(0..3000);

            let packed = packer.pack(&candidates, max_tokens);

            assert!(packed.total_tokens <= max_tokens);
            let sum: usize = packed.chunks.iter().map(|c| c.token_count()).sum();
            assert_eq!(sum, packed.total_tokens);

            let available: HashSet<&str> = candidates.iter().map(|c| c.document_id()).collect();
            if candidates.iter().map(|c| c.token_count()).sum::<usize>() <= max_tokens {
                assert!(packed.source_count() >= available.len().min(DIVERSITY_TARGET));
            }
        }
    }

    #[test]
    fn test_empty_input() {
        let packed = ContextPacker::new().pack(&[], 1000);
        assert!(packed.chunks.is_empty());
        assert_eq!(packed.total_tokens, 0);
    }
}
