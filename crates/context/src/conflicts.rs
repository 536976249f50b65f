//! Conflict Resolver and Consensus Finder
//!
//! Compares what different sources say about the same concept:
//! - One claim per concept and source (first sentence mentioning it,
//!   cut at the first ',' or ':')
//! - Claims are "different" when their word overlap ratio is below 0.5
//! - Conflicts list every claim in a differing pair
//! - Consensus areas are groups of mutually non-different claims
//!
//! Purely lexical: paraphrased agreement can show up as conflict and
//! contradictions sharing vocabulary can show up as consensus. A concept
//! may appear in both outputs.

use learnforge_common::models::PassageCandidate;
use learnforge_common::text::{extract_concepts, mentions, overlap_ratio, sentences, ConceptParams};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Overlap below which two claims are considered different
pub const DIFFERENCE_THRESHOLD: f64 = 0.5;

/// A statement a source makes about a concept
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claim {
    pub document_id: String,
    pub document_name: String,
    pub statement: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conflict {
    pub concept: String,

    /// Claims taking part in at least one differing pair
    pub claims: Vec<Claim>,

    /// Lowest pairwise overlap between the concept's claims
    pub min_overlap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Confidence {
    High,
    Medium,
    Low,
}

impl Confidence {
    /// `high` at 0.7 and above, `medium` at 0.5 and above
    pub fn from_ratio(ratio: f64) -> Self {
        if ratio >= 0.7 {
            Confidence::High
        } else if ratio >= 0.5 {
            Confidence::Medium
        } else {
            Confidence::Low
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConsensusArea {
    pub concept: String,

    /// Representative statement (first claim of the group)
    pub statement: String,

    /// Agreeing document ids
    pub sources: Vec<String>,

    pub confidence: Confidence,
}

/// Claims per concept plus the sources mentioning each concept
struct ClaimIndex {
    claims: BTreeMap<String, Vec<Claim>>,
    mentioned_by: BTreeMap<String, BTreeSet<String>>,
}

impl ClaimIndex {
    fn build(chunks: &[PassageCandidate]) -> Self {
        let params = ConceptParams::claims();
        let mut claims: BTreeMap<String, Vec<Claim>> = BTreeMap::new();

        for chunk in chunks {
            for concept in extract_concepts(&chunk.content, &params) {
                let existing = claims.entry(concept.clone()).or_default();
                if existing.iter().any(|c| c.document_id == chunk.document_id()) {
                    continue;
                }
                if let Some(statement) = claim_statement(&chunk.content, &concept) {
                    existing.push(Claim {
                        document_id: chunk.document_id().to_string(),
                        document_name: chunk.metadata.document_name.clone(),
                        statement,
                    });
                }
            }
        }

        let mut mentioned_by: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();
        for concept in claims.keys() {
            let sources = chunks
                .iter()
                .filter(|c| mentions(&c.content, concept))
                .map(|c| c.document_id().to_string())
                .collect();
            mentioned_by.insert(concept.clone(), sources);
        }

        Self { claims, mentioned_by }
    }

    /// Concepts claimed by at least two sources, with pairwise overlaps
    fn comparable(
        &self,
    ) -> impl Iterator<Item = (&String, &Vec<Claim>, Vec<(usize, usize, f64)>)> + '_ {
        self.claims.iter().filter(|(_, claims)| claims.len() >= 2).map(|(concept, claims)| {
            let mut pairs = Vec::new();
            for i in 0..claims.len() {
                for j in (i + 1)..claims.len() {
                    pairs.push((i, j, overlap_ratio(&claims[i].statement, &claims[j].statement)));
                }
            }
            (concept, claims, pairs)
        })
    }
}

/// First sentence mentioning the concept, cut at the first ',' or ':'
fn claim_statement(content: &str, concept: &str) -> Option<String> {
    let sentence = sentences(content).into_iter().find(|s| mentions(s, concept))?;
    let clause = sentence.split([',', ':']).next().unwrap_or(sentence).trim();
    (!clause.is_empty()).then(|| clause.to_string())
}

#[derive(Debug, Clone, Default)]
pub struct ConflictResolver;

impl ConflictResolver {
    pub fn new() -> Self {
        Self
    }

    pub fn detect_conflicts(&self, chunks: &[PassageCandidate]) -> Vec<Conflict> {
        let index = ClaimIndex::build(chunks);
        let mut conflicts = Vec::new();

        for (concept, claims, pairs) in index.comparable() {
            let mut involved = BTreeSet::new();
            for &(i, j, overlap) in &pairs {
                if overlap < DIFFERENCE_THRESHOLD {
                    involved.insert(i);
                    involved.insert(j);
                }
            }
            if involved.is_empty() {
                continue;
            }

            let min_overlap = pairs.iter().map(|p| p.2).fold(f64::INFINITY, f64::min);
            conflicts.push(Conflict {
                concept: concept.clone(),
                claims: involved.into_iter().map(|i| claims[i].clone()).collect(),
                min_overlap,
            });
        }

        conflicts
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConsensusFinder;

impl ConsensusFinder {
    pub fn new() -> Self {
        Self
    }

    pub fn find_consensus(&self, chunks: &[PassageCandidate]) -> Vec<ConsensusArea> {
        let index = ClaimIndex::build(chunks);
        let mut areas = Vec::new();

        for (concept, claims, pairs) in index.comparable() {
            let mut groups = UnionFind::new(claims.len());
            for &(i, j, overlap) in &pairs {
                if overlap >= DIFFERENCE_THRESHOLD {
                    groups.union(i, j);
                }
            }

            let mentioning = index.mentioned_by.get(concept).map_or(0, BTreeSet::len);

            for members in groups.groups() {
                if members.len() < 2 {
                    continue;
                }
                let ratio = members.len() as f64 / mentioning.max(members.len()) as f64;
                areas.push(ConsensusArea {
                    concept: concept.clone(),
                    statement: claims[members[0]].statement.clone(),
                    sources: members.iter().map(|&i| claims[i].document_id.clone()).collect(),
                    confidence: Confidence::from_ratio(ratio),
                });
            }
        }

        areas
    }
}

/// Minimal union-find over claim indices
struct UnionFind {
    parent: Vec<usize>,
}

impl UnionFind {
    fn new(n: usize) -> Self {
        Self { parent: (0..n).collect() }
    }

    fn find(&mut self, x: usize) -> usize {
        let mut root = x;
        while self.parent[root] != root {
            root = self.parent[root];
        }
        // Path compression
        let mut node = x;
        while self.parent[node] != root {
            let next = self.parent[node];
            self.parent[node] = root;
            node = next;
        }
        root
    }

    fn union(&mut self, a: usize, b: usize) {
        let (ra, rb) = (self.find(a), self.find(b));
        if ra != rb {
            // Lower index becomes the root so groups keep first-claim order
            let (low, high) = if ra < rb { (ra, rb) } else { (rb, ra) };
            self.parent[high] = low;
        }
    }

    /// Groups of members, ordered by their lowest member
    fn groups(&mut self) -> Vec<Vec<usize>> {
        let mut by_root: BTreeMap<usize, Vec<usize>> = BTreeMap::new();
        for i in 0..self.parent.len() {
            let root = self.find(i);
            by_root.entry(root).or_default().push(i);
        }
        by_root.into_values().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use learnforge_common::models::{PassageMetadata, SourceKind};

    fn chunk(document_id: &str, content: &str) -> PassageCandidate {
        PassageCandidate {
            content: content.into(),
            metadata: PassageMetadata {
                document_id: document_id.into(),
                document_name: format!("Textbook {}", document_id),
                chapter: None,
                subject_id: Some("biology".into()),
                topics: vec![],
                difficulty: 2,
                source_kind: SourceKind::Document,
                relevance_score: 0.5,
                recency_score: 1.0,
                authority_score: 1.0,
                hybrid_score: 0.0,
                token_count: 12,
                created_at: Utc::now(),
            },
        }
    }

    #[test]
    fn test_identical_statements_form_consensus() {
        let chunks = vec![
            chunk("a", "Photosynthesis converts light into chemical energy."),
            chunk("b", "Photosynthesis converts light into chemical energy."),
        ];

        let consensus = ConsensusFinder::new().find_consensus(&chunks);
        let area = consensus
            .iter()
            .find(|a| a.concept == "photosynthesis")
            .expect("photosynthesis consensus");

        assert_eq!(area.sources, vec!["a".to_string(), "b".to_string()]);
        assert_eq!(area.confidence, Confidence::High);
        assert_eq!(area.statement, "Photosynthesis converts light into chemical energy");

        assert!(ConflictResolver::new().detect_conflicts(&chunks).is_empty());
    }

    #[test]
    fn test_divergent_statements_conflict() {
        let chunks = vec![
            chunk("a", "Mitochondria produce most cellular energy through respiration."),
            chunk("b", "Mitochondria: small organelles that were once free living bacteria."),
        ];

        let conflicts = ConflictResolver::new().detect_conflicts(&chunks);
        let conflict = conflicts
            .iter()
            .find(|c| c.concept == "mitochondria")
            .expect("mitochondria conflict");

        assert_eq!(conflict.claims.len(), 2);
        // Cut at the colon
        assert_eq!(conflict.claims[1].statement, "Mitochondria");
        assert!(conflict.min_overlap < DIFFERENCE_THRESHOLD);
    }

    #[test]
    fn test_partial_agreement_has_lower_confidence() {
        let chunks = vec![
            chunk("a", "Osmosis moves water across a membrane."),
            chunk("b", "Osmosis moves water across a membrane."),
            chunk("c", "Osmosis is passive diffusion of solvent molecules."),
        ];

        let consensus = ConsensusFinder::new().find_consensus(&chunks);
        let area = consensus.iter().find(|a| a.concept == "osmosis").unwrap();
        assert_eq!(area.sources.len(), 2);
        // 2 of 3 mentioning sources
        assert_eq!(area.confidence, Confidence::Medium);
    }

    #[test]
    fn test_single_source_has_nothing_to_compare() {
        let chunks = vec![chunk("a", "Gravity pulls objects together. Gravity is weak.")];
        assert!(ConflictResolver::new().detect_conflicts(&chunks).is_empty());
        assert!(ConsensusFinder::new().find_consensus(&chunks).is_empty());
    }

    #[test]
    fn test_confidence_thresholds() {
        assert_eq!(Confidence::from_ratio(1.0), Confidence::High);
        assert_eq!(Confidence::from_ratio(0.7), Confidence::High);
        assert_eq!(Confidence::from_ratio(0.6), Confidence::Medium);
        assert_eq!(Confidence::from_ratio(0.4), Confidence::Low);
    }
}
