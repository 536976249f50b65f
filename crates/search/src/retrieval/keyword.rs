//! Keyword retrieval
//!
//! Matches query terms as case-insensitive substrings. Relevance is the
//! total number of term occurrences divided by the number of terms, capped
//! at 1.0.

use super::{Retriever, RetrievalStrategy, Scoring};
use chrono::{DateTime, Utc};
use learnforge_common::corpus::{Corpus, CorpusQuery, MatchMode};
use learnforge_common::errors::{AppError, Result};
use learnforge_common::models::{PassageCandidate, SearchQuery};
use regex_lite::Regex;
use std::sync::Arc;

pub struct KeywordRetriever {
    corpus: Arc<dyn Corpus>,
    scoring: Scoring,
}

impl KeywordRetriever {
    pub fn new(corpus: Arc<dyn Corpus>, scoring: Scoring) -> Self {
        Self { corpus, scoring }
    }
}

/// Compiled term matchers for one query
pub struct KeywordMatcher {
    patterns: Vec<Regex>,
}

impl KeywordMatcher {
    /// Terms are whitespace-separated words longer than two characters
    pub fn new(query: &str) -> Result<Self> {
        let mut terms: Vec<String> = Vec::new();
        for term in query.split_whitespace().map(str::to_lowercase) {
            if term.chars().count() > 2 && !terms.contains(&term) {
                terms.push(term);
            }
        }

        let patterns = terms
            .iter()
            .map(|term| {
                let pattern = format!("(?i){}", regex_lite::escape(term));
                Regex::new(&pattern).map_err(|e| AppError::InvalidFormat {
                    message: format!("keyword pattern for '{}': {}", term, e),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self { patterns })
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// Occurrences per term, capped at 1.0
    pub fn relevance(&self, content: &str) -> f64 {
        if self.patterns.is_empty() {
            return 0.0;
        }
        let lower = content.to_lowercase();
        let occurrences: usize = self.patterns.iter().map(|p| p.find_iter(&lower).count()).sum();
        (occurrences as f64 / self.patterns.len() as f64).min(1.0)
    }
}

#[async_trait::async_trait]
impl Retriever for KeywordRetriever {
    async fn retrieve(
        &self,
        query: &SearchQuery,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Result<Vec<PassageCandidate>> {
        let matcher = KeywordMatcher::new(&query.text)?;
        if matcher.is_empty() {
            return Ok(vec![]);
        }

        let units = self
            .corpus
            .search(&CorpusQuery {
                text: query.text.clone(),
                mode: MatchMode::Substring,
                scope: query.scope.clone(),
                filters: query.filters.clone(),
                limit,
            })
            .await?;

        Ok(units
            .into_iter()
            .map(|unit| {
                let relevance = matcher.relevance(&unit.content);
                self.scoring.candidate(unit, relevance, now)
            })
            .collect())
    }

    fn strategy(&self) -> RetrievalStrategy {
        RetrievalStrategy::Keyword
    }
}
