//! Context Aggregator - Cross-subject context for a knowledge base
//!
//! Provides:
//! - Full pipeline for the target subject
//! - Concurrent retrieval for related subjects
//! - Concept clusters with centrality and co-occurring concepts
//! - Subject coverage, prerequisite links and a difficulty histogram

use crate::engine::{ContextEngine, ContextResult};
use futures::future::join_all;
use learnforge_common::config::{RetrievalConfig, RetrievalOverrides};
use learnforge_common::metrics::{record_aggregation, record_retrieval_failure};
use learnforge_common::models::{PassageCandidate, SearchQuery};
use learnforge_common::text::{extract_concepts, sentences, ConceptParams};
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::sync::{Arc, OnceLock};
use tokio::time::timeout;
use tracing::{info, instrument, warn};

/// Clusters kept per aggregation
pub const MAX_CLUSTERS: usize = 20;

/// Related concepts kept per cluster
pub const MAX_RELATED_CONCEPTS: usize = 10;

/// Metrics label for the knowledge-base lookup
const RELATED_SUBJECTS_LOOKUP: &str = "related_subjects";

/// Subject label for passages without one
pub const UNKNOWN_SUBJECT: &str = "unknown";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConceptCluster {
    pub concept: String,

    /// Indices into [`AggregatedContext::passages`]
    pub passage_indices: Vec<usize>,

    /// Share of pool passages mentioning the concept
    pub centrality: f64,

    /// Concepts co-occurring in the same passages, most frequent first
    pub related_concepts: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrerequisiteLink {
    pub concept: String,
    pub prerequisites: Vec<String>,
    pub strength: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedContext {
    pub subject_id: String,
    pub related_subjects: Vec<String>,

    /// Full pipeline result for the target subject
    pub primary: ContextResult,

    /// Target chunks followed by related-subject passages, deduplicated
    pub passages: Vec<PassageCandidate>,

    pub concept_clusters: Vec<ConceptCluster>,

    /// Subject id -> percentage of pool passages
    pub subject_coverage: BTreeMap<String, f64>,

    pub prerequisites: Vec<PrerequisiteLink>,

    /// Passage counts for difficulty levels 1-5
    pub difficulty_distribution: [usize; 5],
}

pub struct ContextAggregator {
    engine: Arc<ContextEngine>,
}

impl ContextAggregator {
    pub fn new(engine: Arc<ContextEngine>) -> Self {
        Self { engine }
    }

    /// Aggregate context for a subject and the subjects related to it
    ///
    /// `overrides` apply to the target subject and every related subject.
    #[instrument(skip(self, query, overrides), fields(query = %query.text))]
    pub async fn aggregate_by_subject(
        &self,
        subject_id: &str,
        query: &SearchQuery,
        overrides: Option<&RetrievalOverrides>,
    ) -> AggregatedContext {
        let config = self.engine.effective_config(overrides);

        let target = query.clone().in_subject(subject_id);
        let primary = self.engine.retrieve_context(&target, overrides).await;

        let related_subjects = self.related_subjects(subject_id, &config).await;

        let config = &config;
        let runs = related_subjects.iter().map(|subject| {
            let scoped = query.clone().in_subject(subject.as_str());
            async move { self.engine.retrieve_passages(&scoped, config).await.1 }
        });
        let related_passages = join_all(runs).await;

        let passages = dedup_pool(
            primary
                .chunks
                .iter()
                .cloned()
                .chain(related_passages.into_iter().flatten()),
        );

        let concept_clusters = build_clusters(&passages);
        let subject_coverage = subject_coverage(&passages);
        let prerequisites = find_prerequisites(&passages);
        let difficulty_distribution = difficulty_histogram(&passages);

        record_aggregation(related_subjects.len());
        info!(
            subject_id,
            related = related_subjects.len(),
            passages = passages.len(),
            clusters = concept_clusters.len(),
            prerequisites = prerequisites.len(),
            "Aggregated context"
        );

        AggregatedContext {
            subject_id: subject_id.to_string(),
            related_subjects,
            primary,
            passages,
            concept_clusters,
            subject_coverage,
            prerequisites,
            difficulty_distribution,
        }
    }

    /// Subjects sharing a knowledge base; lookup failures and timeouts yield none
    async fn related_subjects(&self, subject_id: &str, config: &RetrievalConfig) -> Vec<String> {
        let lookup = self.engine.corpus().related_subjects(subject_id);
        match timeout(config.retrieval_timeout(), lookup).await {
            Ok(Ok(subjects)) => subjects,
            Ok(Err(e)) => {
                warn!(subject_id, error = %e, "Related subject lookup failed, continuing without");
                record_retrieval_failure(RELATED_SUBJECTS_LOOKUP, "error");
                vec![]
            }
            Err(_) => {
                warn!(
                    subject_id,
                    timeout_ms = config.retrieval_timeout_ms,
                    "Related subject lookup timed out, continuing without"
                );
                record_retrieval_failure(RELATED_SUBJECTS_LOOKUP, "timeout");
                vec![]
            }
        }
    }
}

fn dedup_pool(passages: impl Iterator<Item = PassageCandidate>) -> Vec<PassageCandidate> {
    let mut seen = HashSet::new();
    passages.filter(|p| seen.insert(p.dedup_key())).collect()
}

/// Concept clusters ranked by centrality, ties by label
pub fn build_clusters(passages: &[PassageCandidate]) -> Vec<ConceptCluster> {
    if passages.is_empty() {
        return vec![];
    }

    let params = ConceptParams::clusters();
    let per_passage: Vec<Vec<String>> = passages
        .iter()
        .map(|p| extract_concepts(&p.content, &params))
        .collect();

    let mut occurrences: BTreeMap<&str, Vec<usize>> = BTreeMap::new();
    for (i, concepts) in per_passage.iter().enumerate() {
        for concept in concepts {
            occurrences.entry(concept.as_str()).or_default().push(i);
        }
    }

    let total = passages.len() as f64;
    let mut ranked: Vec<(&str, Vec<usize>)> = occurrences.into_iter().collect();
    // BTreeMap order is alphabetical, so a stable sort keeps label ties in order
    ranked.sort_by(|a, b| b.1.len().cmp(&a.1.len()));
    ranked.truncate(MAX_CLUSTERS);

    ranked
        .into_iter()
        .map(|(concept, indices)| {
            let mut co_occurring: HashMap<&str, usize> = HashMap::new();
            for &i in &indices {
                for other in &per_passage[i] {
                    if other != concept {
                        *co_occurring.entry(other.as_str()).or_insert(0) += 1;
                    }
                }
            }
            let mut related: Vec<(&str, usize)> = co_occurring.into_iter().collect();
            related.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(b.0)));

            ConceptCluster {
                concept: concept.to_string(),
                centrality: indices.len() as f64 / total,
                passage_indices: indices,
                related_concepts: related
                    .into_iter()
                    .take(MAX_RELATED_CONCEPTS)
                    .map(|(c, _)| c.to_string())
                    .collect(),
            }
        })
        .collect()
}

/// Percentage of passages per subject
pub fn subject_coverage(passages: &[PassageCandidate]) -> BTreeMap<String, f64> {
    let mut counts: BTreeMap<String, usize> = BTreeMap::new();
    for passage in passages {
        let subject = passage.metadata.subject_id.as_deref().unwrap_or(UNKNOWN_SUBJECT);
        *counts.entry(subject.to_string()).or_insert(0) += 1;
    }

    let total = passages.len() as f64;
    counts
        .into_iter()
        .map(|(subject, count)| (subject, count as f64 / total * 100.0))
        .collect()
}

/// Passage counts per difficulty level; out-of-range levels are clamped
pub fn difficulty_histogram(passages: &[PassageCandidate]) -> [usize; 5] {
    let mut histogram = [0usize; 5];
    for passage in passages {
        let level = passage.metadata.difficulty.clamp(1, 5);
        histogram[usize::from(level) - 1] += 1;
    }
    histogram
}

fn prerequisite_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\bprerequisites? (?:for|to)\b").expect("valid prerequisite pattern")
    })
}

fn before_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\bbefore\b").expect("valid before pattern"))
}

fn need_to_know_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\bneeds? to (?:know|understand|learn)\b").expect("valid need-to-know pattern")
    })
}

/// Split one lower-cased sentence into (targets, prerequisites) text
fn prerequisite_parts(sentence: &str) -> Option<(String, String)> {
    // "A is a prerequisite for B"
    if let Some(m) = prerequisite_pattern().find(sentence) {
        return Some((sentence[m.end()..].to_string(), sentence[..m.start()].to_string()));
    }

    // "Learn A before B, ..."
    if let Some(m) = before_pattern().find(sentence) {
        let after = &sentence[m.end()..];
        let (target, rest) = match after.find(',') {
            Some(comma) => (&after[..comma], &after[comma + 1..]),
            None => (after, ""),
        };
        return Some((target.to_string(), format!("{} {}", &sentence[..m.start()], rest)));
    }

    // "To study B you need to know A"
    if let Some(m) = need_to_know_pattern().find(sentence) {
        return Some((sentence[..m.start()].to_string(), sentence[m.end()..].to_string()));
    }

    None
}

/// Prerequisite links from phrases like "prerequisite for", "before" and
/// "need to know"; links for the same concept are merged
pub fn find_prerequisites(passages: &[PassageCandidate]) -> Vec<PrerequisiteLink> {
    let params = ConceptParams::analyzer();
    let mut links: BTreeMap<String, BTreeSet<String>> = BTreeMap::new();

    for passage in passages {
        for sentence in sentences(&passage.content) {
            let lower = sentence.to_lowercase();
            let Some((target_text, prerequisite_text)) = prerequisite_parts(&lower) else {
                continue;
            };

            let targets = extract_concepts(&target_text, &params);
            let prerequisites = extract_concepts(&prerequisite_text, &params);

            for target in &targets {
                let entry: Vec<&String> = prerequisites.iter().filter(|p| *p != target).collect();
                if entry.is_empty() {
                    continue;
                }
                links
                    .entry(target.clone())
                    .or_default()
                    .extend(entry.into_iter().cloned());
            }
        }
    }

    links
        .into_iter()
        .map(|(concept, prerequisites)| PrerequisiteLink {
            concept,
            prerequisites: prerequisites.into_iter().collect(),
            strength: 1.0,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::Utc;
    use learnforge_common::corpus::{Corpus, CorpusQuery, InMemoryCorpus, TextUnit};
    use learnforge_common::errors::{AppError, Result};
    use learnforge_common::models::{PassageMetadata, SourceKind};
    use std::time::Duration;

    fn passage(
        document_id: &str,
        subject: Option<&str>,
        difficulty: u8,
        content: &str,
    ) -> PassageCandidate {
        PassageCandidate {
            content: content.into(),
            metadata: PassageMetadata {
                document_id: document_id.into(),
                document_name: document_id.into(),
                chapter: None,
                subject_id: subject.map(str::to_string),
                topics: vec![],
                difficulty,
                source_kind: SourceKind::Chapter,
                relevance_score: 0.5,
                recency_score: 1.0,
                authority_score: 1.0,
                hybrid_score: 0.0,
                token_count: 10,
                created_at: Utc::now(),
            },
        }
    }

    fn unit(id: &str, subject: &str, difficulty: u8, content: &str) -> TextUnit {
        TextUnit {
            id: id.into(),
            document_id: format!("doc-{}", id),
            document_name: format!("Doc {}", id),
            chapter: None,
            subject_id: Some(subject.into()),
            topics: vec![],
            difficulty,
            source_kind: SourceKind::Chapter,
            content: content.into(),
            created_at: Utc::now(),
            word_count: 0,
        }
    }

    #[test]
    fn test_clusters_rank_by_centrality() {
        let passages = vec![
            passage("a", None, 1, "Vectors and matrices describe linear maps."),
            passage("b", None, 2, "Matrices multiply vectors."),
            passage("c", None, 3, "Eigenvalues of matrices."),
        ];

        let clusters = build_clusters(&passages);

        assert_eq!(clusters[0].concept, "matrices");
        assert_eq!(clusters[0].passage_indices, vec![0, 1, 2]);
        assert!((clusters[0].centrality - 1.0).abs() < 1e-9);
        assert_eq!(clusters[0].related_concepts[0], "vectors");

        assert_eq!(clusters[1].concept, "vectors");
        assert!((clusters[1].centrality - 2.0 / 3.0).abs() < 1e-9);
        assert!(clusters.len() <= MAX_CLUSTERS);
    }

    #[test]
    fn test_coverage_and_histogram() {
        let passages = vec![
            passage("a", Some("math"), 1, "x"),
            passage("b", Some("math"), 3, "y"),
            passage("c", Some("physics"), 3, "z"),
            passage("d", None, 9, "w"),
        ];

        let coverage = subject_coverage(&passages);
        assert!((coverage["math"] - 50.0).abs() < 1e-9);
        assert!((coverage["physics"] - 25.0).abs() < 1e-9);
        assert!((coverage[UNKNOWN_SUBJECT] - 25.0).abs() < 1e-9);

        assert_eq!(difficulty_histogram(&passages), [1, 0, 2, 0, 1]);
    }

    #[test]
    fn test_prerequisite_phrases() {
        let passages = vec![
            passage("a", None, 2, "Algebra is a prerequisite for calculus."),
            passage("b", None, 2, "Master geometry before calculus."),
            passage("c", None, 3, "To study genetics you need to understand heredity."),
        ];

        let links = find_prerequisites(&passages);

        let calculus = links.iter().find(|l| l.concept == "calculus").unwrap();
        assert!(calculus.prerequisites.contains(&"algebra".to_string()));
        assert!(calculus.prerequisites.contains(&"geometry".to_string()));
        assert_eq!(calculus.strength, 1.0);

        let genetics = links.iter().find(|l| l.concept == "genetics").unwrap();
        assert_eq!(genetics.prerequisites, vec!["heredity".to_string()]);
    }

    /// Corpus whose subject lookup always fails
    struct NoKnowledgeBase(InMemoryCorpus);

    #[async_trait]
    impl Corpus for NoKnowledgeBase {
        async fn search(&self, query: &CorpusQuery) -> Result<Vec<TextUnit>> {
            self.0.search(query).await
        }

        async fn related_subjects(&self, subject_id: &str) -> Result<Vec<String>> {
            Err(AppError::SubjectNotFound { id: subject_id.into() })
        }
    }

    /// Corpus whose subject lookup never answers in time
    struct StalledKnowledgeBase(InMemoryCorpus);

    #[async_trait]
    impl Corpus for StalledKnowledgeBase {
        async fn search(&self, query: &CorpusQuery) -> Result<Vec<TextUnit>> {
            self.0.search(query).await
        }

        async fn related_subjects(&self, _subject_id: &str) -> Result<Vec<String>> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(vec!["chemistry".into()])
        }
    }

    fn permissive_config() -> RetrievalConfig {
        RetrievalConfig {
            similarity_threshold: 0.0,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_aggregate_across_related_subjects() {
        let corpus = InMemoryCorpus::new(vec![
            unit("1", "physics", 2, "Energy is conserved in every closed system."),
            unit("2", "chemistry", 3, "Chemical bonds store energy."),
            unit("3", "history", 1, "Energy policy shaped industrial history."),
        ])
        .with_knowledge_base("science", vec!["physics".into(), "chemistry".into()]);

        let engine = Arc::new(ContextEngine::new(Arc::new(corpus), permissive_config()));
        let aggregated = ContextAggregator::new(engine)
            .aggregate_by_subject("physics", &SearchQuery::new("energy"), None)
            .await;

        assert_eq!(aggregated.related_subjects, vec!["chemistry".to_string()]);
        assert_eq!(aggregated.primary.chunks.len(), 1);
        assert_eq!(aggregated.passages.len(), 2);
        assert_eq!(aggregated.passages[0].metadata.subject_id.as_deref(), Some("physics"));
        assert!((aggregated.subject_coverage["physics"] - 50.0).abs() < 1e-9);
        assert!(!aggregated.subject_coverage.contains_key("history"));
        assert_eq!(aggregated.difficulty_distribution, [0, 1, 1, 0, 0]);

        let energy = aggregated
            .concept_clusters
            .iter()
            .find(|c| c.concept == "energy")
            .unwrap();
        assert!((energy.centrality - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn test_failed_lookup_means_no_related_subjects() {
        let corpus = NoKnowledgeBase(InMemoryCorpus::new(vec![unit(
            "1",
            "physics",
            2,
            "Momentum is mass times velocity.",
        )]));

        let engine = Arc::new(ContextEngine::new(Arc::new(corpus), permissive_config()));
        let aggregated = ContextAggregator::new(engine)
            .aggregate_by_subject("physics", &SearchQuery::new("momentum"), None)
            .await;

        assert!(aggregated.related_subjects.is_empty());
        assert_eq!(aggregated.passages.len(), 1);
    }

    #[tokio::test]
    async fn test_stalled_lookup_times_out() {
        let corpus = StalledKnowledgeBase(InMemoryCorpus::new(vec![unit(
            "1",
            "physics",
            2,
            "Momentum is mass times velocity.",
        )]));
        let config = RetrievalConfig {
            retrieval_timeout_ms: 100,
            ..permissive_config()
        };

        let engine = Arc::new(ContextEngine::new(Arc::new(corpus), config));
        let aggregator = ContextAggregator::new(engine);
        let aggregated = tokio::time::timeout(
            Duration::from_secs(2),
            aggregator.aggregate_by_subject("physics", &SearchQuery::new("momentum"), None),
        )
        .await
        .expect("aggregation returns despite a stalled lookup");

        assert!(aggregated.related_subjects.is_empty());
        assert_eq!(aggregated.passages.len(), 1);
    }

    #[tokio::test]
    async fn test_overrides_reach_every_subject() {
        let corpus = InMemoryCorpus::new(vec![
            unit("1", "physics", 2, "Energy is conserved in every closed system."),
            unit("2", "chemistry", 3, "Chemical bonds store energy."),
            unit("3", "chemistry", 3, "Reactions release or absorb energy."),
        ])
        .with_knowledge_base("science", vec!["physics".into(), "chemistry".into()]);

        let engine = Arc::new(ContextEngine::new(Arc::new(corpus), permissive_config()));
        let overrides = RetrievalOverrides {
            expand_queries: Some(false),
            top_k: Some(1),
            ..Default::default()
        };
        let aggregated = ContextAggregator::new(engine)
            .aggregate_by_subject("physics", &SearchQuery::new("energy"), Some(&overrides))
            .await;

        assert_eq!(aggregated.primary.queries, vec!["energy".to_string()]);
        assert_eq!(aggregated.related_subjects, vec!["chemistry".to_string()]);
        // top_k 1 keeps one passage per subject
        assert_eq!(aggregated.passages.len(), 2);
    }
}
