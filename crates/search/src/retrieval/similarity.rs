//! Similarity retrieval
//!
//! Relevance is the share of distinct query words present in the passage.

use super::{Retriever, RetrievalStrategy, Scoring};
use chrono::{DateTime, Utc};
use learnforge_common::corpus::{Corpus, CorpusQuery, MatchMode};
use learnforge_common::errors::Result;
use learnforge_common::models::{PassageCandidate, SearchQuery};
use learnforge_common::text::word_set;
use std::sync::Arc;

pub struct SimilarityRetriever {
    corpus: Arc<dyn Corpus>,
    scoring: Scoring,
}

impl SimilarityRetriever {
    pub fn new(corpus: Arc<dyn Corpus>, scoring: Scoring) -> Self {
        Self { corpus, scoring }
    }
}

/// `|Q ∩ P| / |Q|` over distinct lower-cased words
pub fn similarity_relevance(query: &str, content: &str) -> f64 {
    let query_words = word_set(query);
    if query_words.is_empty() {
        return 0.0;
    }
    let passage_words = word_set(content);
    let shared = query_words.intersection(&passage_words).count();
    shared as f64 / query_words.len() as f64
}

#[async_trait::async_trait]
impl Retriever for SimilarityRetriever {
    async fn retrieve(
        &self,
        query: &SearchQuery,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<PassageCandidate>> {
        let units = self
            .corpus
            .search(&CorpusQuery {
                text: query.text.clone(),
                mode: MatchMode::FullText,
                scope: query.scope.clone(),
                filters: query.filters.clone(),
                limit,
            })
            .await?;

        Ok(units
            .into_iter()
            .map(|unit| {
                let relevance = similarity_relevance(&query.text, &unit.content);
                self.scoring.candidate(unit, relevance, now)
            })
            .collect())
    }

    fn strategy(&self) -> RetrievalStrategy {
        RetrievalStrategy::Similarity
    }
}
