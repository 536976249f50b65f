//! Context Engine - Single entry point for grounding retrieval
//!
//! Runs the full pipeline for one query:
//! expansion -> hybrid retrieval -> packing -> concept and conflict analysis.
//! Never fails: corpus problems degrade to an empty or smaller result,
//! which callers treat as insufficient grounding.

use crate::concepts::{ConceptAnalyzer, ConceptMap};
use crate::conflicts::{Conflict, ConflictResolver, ConsensusArea, ConsensusFinder};
use crate::expander::QueryExpander;
use crate::packer::ContextPacker;
use learnforge_common::config::{RetrievalConfig, RetrievalOverrides};
use learnforge_common::corpus::Corpus;
use learnforge_common::metrics::record_packing;
use learnforge_common::models::{PassageCandidate, SearchQuery};
use learnforge_search::retrieval::{HybridRetriever, SearchOptions};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// Token and chunk contribution of one source document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceContribution {
    pub document_id: String,
    pub document_name: String,
    pub chunk_count: usize,
    pub tokens: usize,
}

/// Packed grounding context plus analysis
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextResult {
    /// Packed passages in reading order
    pub chunks: Vec<PassageCandidate>,

    pub total_tokens: usize,

    /// Per-source contributions, in order of first appearance
    pub sources: Vec<SourceContribution>,

    pub concepts: ConceptMap,
    pub conflicts: Vec<Conflict>,
    pub consensus: Vec<ConsensusArea>,

    /// Query strings issued to the corpus
    pub queries: Vec<String>,

    /// Whether a truncated passage was used to fill the budget
    pub truncated: bool,
}

impl ContextResult {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

/// Context retrieval pipeline
pub struct ContextEngine {
    corpus: Arc<dyn Corpus>,
    expander: QueryExpander,
    retriever: HybridRetriever,
    packer: ContextPacker,
    analyzer: ConceptAnalyzer,
    resolver: ConflictResolver,
    consensus: ConsensusFinder,
    config: RetrievalConfig,
}

impl ContextEngine {
    /// Create an engine with default components
    pub fn new(corpus: Arc<dyn Corpus>, config: RetrievalConfig) -> Self {
        let retriever = HybridRetriever::new(corpus.clone(), &config);
        Self::with_retriever(corpus, config, retriever)
    }

    /// Create with a preconfigured retriever (e.g. custom authority scoring)
    pub fn with_retriever(
        corpus: Arc<dyn Corpus>,
        config: RetrievalConfig,
        retriever: HybridRetriever,
    ) -> Self {
        Self {
            corpus,
            expander: QueryExpander::new(),
            retriever,
            packer: ContextPacker::new(),
            analyzer: ConceptAnalyzer::new(),
            resolver: ConflictResolver::new(),
            consensus: ConsensusFinder::new(),
            config,
        }
    }

    pub fn corpus(&self) -> &Arc<dyn Corpus> {
        &self.corpus
    }

    pub fn config(&self) -> &RetrievalConfig {
        &self.config
    }

    /// Effective configuration for one call; invalid overrides are ignored
    pub fn effective_config(&self, overrides: Option<&RetrievalOverrides>) -> RetrievalConfig {
        let Some(overrides) = overrides else {
            return self.config.clone();
        };

        let merged = self.config.with_overrides(overrides);
        match merged.validate() {
            Ok(()) => merged,
            Err(e) => {
                warn!(error = %e, "Ignoring invalid retrieval overrides");
                self.config.clone()
            }
        }
    }

    /// Retrieve grounding context for a query
    #[instrument(skip(self, query, overrides), fields(query = %query.text))]
    pub async fn retrieve_context(
        &self,
        query: &SearchQuery,
        overrides: Option<&RetrievalOverrides>,
    ) -> ContextResult {
        if query.is_blank() {
            debug!("Blank query, returning empty context");
            return ContextResult::empty();
        }

        let config = self.effective_config(overrides);
        let (queries, candidates) = self.retrieve_passages(query, &config).await;

        let packed = self.packer.pack(&candidates, config.max_tokens);
        record_packing(packed.total_tokens, packed.chunks.len(), packed.truncated);

        let concepts = self.analyzer.analyze(&packed.chunks);
        let conflicts = self.resolver.detect_conflicts(&packed.chunks);
        let consensus = self.consensus.find_consensus(&packed.chunks);
        let sources = source_contributions(&packed.chunks);

        info!(
            candidates = candidates.len(),
            chunks = packed.chunks.len(),
            total_tokens = packed.total_tokens,
            sources = sources.len(),
            conflicts = conflicts.len(),
            consensus = consensus.len(),
            "Context retrieved"
        );

        ContextResult {
            chunks: packed.chunks,
            total_tokens: packed.total_tokens,
            sources,
            concepts,
            conflicts,
            consensus,
            queries,
            truncated: packed.truncated,
        }
    }

    /// Expansion and hybrid retrieval, without packing
    ///
    /// Returns the issued query strings and the ranked candidates.
    pub async fn retrieve_passages(
        &self,
        query: &SearchQuery,
        config: &RetrievalConfig,
    ) -> (Vec<String>, Vec<PassageCandidate>) {
        if query.is_blank() {
            return (vec![], vec![]);
        }

        let texts = if config.expand_queries {
            self.expander.search_queries(&query.text, config.max_expansions)
        } else {
            vec![query.text.trim().to_string()]
        };

        let variants: Vec<SearchQuery> =
            texts.iter().map(|t| query.with_text(t.as_str())).collect();
        let options = SearchOptions::from_config(config);
        let candidates = self.retriever.search_many(&variants, &options).await;

        debug!(queries = texts.len(), candidates = candidates.len(), "Passages retrieved");
        (texts, candidates)
    }
}

fn source_contributions(chunks: &[PassageCandidate]) -> Vec<SourceContribution> {
    let mut sources: Vec<SourceContribution> = Vec::new();
    for chunk in chunks {
        match sources.iter_mut().find(|s| s.document_id == chunk.document_id()) {
            Some(source) => {
                source.chunk_count += 1;
                source.tokens += chunk.token_count();
            }
            None => sources.push(SourceContribution {
                document_id: chunk.document_id().to_string(),
                document_name: chunk.metadata.document_name.clone(),
                chunk_count: 1,
                tokens: chunk.token_count(),
            }),
        }
    }
    sources
}
