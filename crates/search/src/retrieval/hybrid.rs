//! Hybrid retrieval combining similarity and keyword search
//!
//! Both strategies run concurrently, each behind a timeout. A failed or
//! timed-out strategy contributes nothing. Results are merged, deduplicated
//! by content prefix, weighted into a hybrid score and ranked.

use super::{
    hybrid_score, ConstantAuthority, KeywordRetriever, Retriever, Scoring, SearchOptions,
    SimilarityRetriever,
};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use learnforge_common::config::RetrievalConfig;
use learnforge_common::corpus::Corpus;
use learnforge_common::metrics::RetrievalTimer;
use learnforge_common::models::{PassageCandidate, SearchQuery};
use learnforge_common::text::truncate_chars;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Share of `top_k` requested from the similarity strategy, in tenths
const SIMILARITY_TENTHS: usize = 6;
/// Share of `top_k` requested from the keyword strategy, in tenths
const KEYWORD_TENTHS: usize = 4;

/// Hybrid retriever combining similarity and keyword strategies
pub struct HybridRetriever {
    similarity: SimilarityRetriever,
    keyword: KeywordRetriever,
    timeout: Duration,
    max_query_chars: usize,
}

impl HybridRetriever {
    /// Create a hybrid retriever with constant authority
    pub fn new(corpus: Arc<dyn Corpus>, config: &RetrievalConfig) -> Self {
        let scoring = Scoring::new(
            config.recency_half_life_days,
            Arc::new(ConstantAuthority::default()),
        );
        Self::with_scoring(corpus, config, scoring)
    }

    /// Create with a custom scoring setup (e.g. a real authority signal)
    pub fn with_scoring(
        corpus: Arc<dyn Corpus>,
        config: &RetrievalConfig,
        scoring: Scoring,
    ) -> Self {
        Self {
            similarity: SimilarityRetriever::new(corpus.clone(), scoring.clone()),
            keyword: KeywordRetriever::new(corpus, scoring),
            timeout: config.retrieval_timeout(),
            max_query_chars: config.max_query_chars,
        }
    }

    /// Search with the current time as the recency reference
    pub async fn search(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
    ) -> Vec<PassageCandidate> {
        self.search_at(query, options, Utc::now()).await
    }

    /// Search with a fixed recency reference
    #[instrument(skip(self, query), fields(query = %query.text, top_k = options.top_k))]
    pub async fn search_at(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
        now: DateTime<Utc>,
    ) -> Vec<PassageCandidate> {
        if query.is_blank() || options.top_k == 0 {
            return vec![];
        }

        let raw = self.gather(query, options, now).await;
        merge(raw, options)
    }

    /// Search several query variants and merge them into one ranking
    pub async fn search_many(
        &self,
        queries: &[SearchQuery],
        options: &SearchOptions,
    ) -> Vec<PassageCandidate> {
        self.search_many_at(queries, options, Utc::now()).await
    }

    #[instrument(skip(self, queries), fields(queries = queries.len(), top_k = options.top_k))]
    pub async fn search_many_at(
        &self,
        queries: &[SearchQuery],
        options: &SearchOptions,
        now: DateTime<Utc>,
    ) -> Vec<PassageCandidate> {
        if options.top_k == 0 {
            return vec![];
        }

        let runs = queries
            .iter()
            .filter(|q| !q.is_blank())
            .map(|q| self.gather(q, options, now));

        let raw: Vec<PassageCandidate> = join_all(runs).await.into_iter().flatten().collect();
        merge(raw, options)
    }

    /// Raw strategy output for one query, before merging
    async fn gather(
        &self,
        query: &SearchQuery,
        options: &SearchOptions,
        now: DateTime<Utc>,
    ) -> Vec<PassageCandidate> {
        let query = query.with_text(truncate_chars(query.text.trim(), self.max_query_chars));

        if !options.use_hybrid_search {
            return self.run_strategy(&self.similarity, &query, options.top_k, now).await;
        }

        let similarity_limit = share_of(options.top_k, SIMILARITY_TENTHS);
        let keyword_limit = share_of(options.top_k, KEYWORD_TENTHS);

        // Execute both strategies in parallel
        let (similarity_results, keyword_results) = tokio::join!(
            self.run_strategy(&self.similarity, &query, similarity_limit, now),
            self.run_strategy(&self.keyword, &query, keyword_limit, now)
        );

        debug!(
            similarity = similarity_results.len(),
            keyword = keyword_results.len(),
            "Strategy results"
        );

        let mut raw = similarity_results;
        raw.extend(keyword_results);
        raw
    }

    /// Run one strategy behind the timeout; failures degrade to empty
    async fn run_strategy(
        &self,
        retriever: &dyn Retriever,
        query: &SearchQuery,
        limit: usize,
        now: DateTime<Utc>,
    ) -> Vec<PassageCandidate> {
        let strategy = retriever.strategy();
        let timer = RetrievalTimer::start(strategy.as_str());

        match tokio::time::timeout(self.timeout, retriever.retrieve(query, limit, now)).await {
            Ok(Ok(results)) => {
                timer.finish(results.len());
                results
            }
            Ok(Err(e)) => {
                warn!(
                    strategy = strategy.as_str(),
                    error = %e,
                    "Retrieval failed, using empty result"
                );
                timer.fail(if e.is_transient() { "corpus" } else { "error" });
                vec![]
            }
            Err(_) => {
                warn!(
                    strategy = strategy.as_str(),
                    timeout_ms = self.timeout.as_millis() as u64,
                    "Retrieval timed out, using empty result"
                );
                timer.fail("timeout");
                vec![]
            }
        }
    }
}

/// `ceil(top_k * tenths / 10)`
fn share_of(top_k: usize, tenths: usize) -> usize {
    (top_k * tenths).div_ceil(10)
}

/// Deterministic ranking order: hybrid score desc, then document id, then content
fn rank_order(a: &PassageCandidate, b: &PassageCandidate) -> Ordering {
    b.hybrid_score()
        .partial_cmp(&a.hybrid_score())
        .unwrap_or(Ordering::Equal)
        .then_with(|| a.document_id().cmp(b.document_id()))
        .then_with(|| a.content.cmp(&b.content))
}

/// Score, deduplicate by content prefix, rank, threshold and truncate
fn merge(raw: Vec<PassageCandidate>, options: &SearchOptions) -> Vec<PassageCandidate> {
    let mut by_key: HashMap<String, PassageCandidate> = HashMap::new();

    for candidate in raw {
        let m = &candidate.metadata;
        let scored = candidate.with_hybrid_score(hybrid_score(
            m.relevance_score,
            m.recency_score,
            m.authority_score,
        ));

        match by_key.get(&scored.dedup_key()) {
            Some(existing) if existing.hybrid_score() >= scored.hybrid_score() => {}
            _ => {
                by_key.insert(scored.dedup_key(), scored);
            }
        }
    }

    let mut ranked: Vec<PassageCandidate> = by_key.into_values().collect();
    ranked.sort_by(rank_order);
    ranked.retain(|c| c.hybrid_score() >= options.similarity_threshold);
    ranked.truncate(options.top_k);

    debug!(results = ranked.len(), "Merged hybrid results");
    ranked
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use learnforge_common::corpus::{CorpusQuery, InMemoryCorpus, MatchMode, TextUnit};
    use learnforge_common::errors::{AppError, Result};
    use learnforge_common::models::SourceKind;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    fn unit(id: &str, document_id: &str, content: &str, now: DateTime<Utc>) -> TextUnit {
        TextUnit {
            id: id.into(),
            document_id: document_id.into(),
            document_name: format!("Document {}", document_id),
            chapter: None,
            subject_id: Some("biology".into()),
            topics: vec![],
            difficulty: 2,
            source_kind: SourceKind::Document,
            content: content.into(),
            created_at: now,
            word_count: 0,
        }
    }

    fn options(top_k: usize, threshold: f64) -> SearchOptions {
        SearchOptions {
            top_k,
            similarity_threshold: threshold,
            use_hybrid_search: true,
        }
    }

    fn retriever(corpus: impl Corpus + 'static) -> HybridRetriever {
        HybridRetriever::new(Arc::new(corpus), &RetrievalConfig::default())
    }

    /// Corpus that fails every search
    struct FailingCorpus;

    #[async_trait]
    impl Corpus for FailingCorpus {
        async fn search(&self, _query: &CorpusQuery) -> Result<Vec<TextUnit>> {
            Err(AppError::corpus("store offline"))
        }

        async fn related_subjects(&self, _subject_id: &str) -> Result<Vec<String>> {
            Err(AppError::corpus("store offline"))
        }
    }

    /// Corpus whose full-text search never finishes in time
    struct SlowFullText {
        inner: InMemoryCorpus,
    }

    #[async_trait]
    impl Corpus for SlowFullText {
        async fn search(&self, query: &CorpusQuery) -> Result<Vec<TextUnit>> {
            if query.mode == MatchMode::FullText {
                tokio::time::sleep(Duration::from_secs(5)).await;
            }
            self.inner.search(query).await
        }

        async fn related_subjects(&self, subject_id: &str) -> Result<Vec<String>> {
            self.inner.related_subjects(subject_id).await
        }
    }

    /// Corpus that records the limits it was asked for
    struct LimitRecorder {
        full_text: AtomicUsize,
        substring: AtomicUsize,
    }

    #[async_trait]
    impl Corpus for LimitRecorder {
        async fn search(&self, query: &CorpusQuery) -> Result<Vec<TextUnit>> {
            match query.mode {
                MatchMode::FullText => &self.full_text,
                MatchMode::Substring => &self.substring,
            }
            .store(query.limit, AtomicOrdering::SeqCst);
            Ok(vec![])
        }

        async fn related_subjects(&self, _subject_id: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    /// Corpus that records the query text it receives
    #[derive(Default)]
    struct TextRecorder {
        texts: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Corpus for TextRecorder {
        async fn search(&self, query: &CorpusQuery) -> Result<Vec<TextUnit>> {
            self.texts.lock().unwrap().push(query.text.clone());
            Ok(vec![])
        }

        async fn related_subjects(&self, _subject_id: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
    }

    #[tokio::test]
    async fn test_empty_corpus_and_blank_query() {
        let hybrid = retriever(InMemoryCorpus::default());
        let results = hybrid.search(&SearchQuery::new("machine learning"), &options(10, 0.0)).await;
        assert!(results.is_empty());

        let now = Utc::now();
        let corpus = InMemoryCorpus::new(vec![unit("u1", "d1", "machine learning", now)]);
        let hybrid = retriever(corpus);
        assert!(hybrid.search(&SearchQuery::new("   "), &options(10, 0.0)).await.is_empty());
    }

    #[tokio::test]
    async fn test_results_are_deduplicated_by_prefix() {
        let now = Utc::now();
        let shared = "Photosynthesis converts light into chemical energy \
                      inside the chloroplasts of plant cells, "
            .repeat(2);
        let hybrid = retriever(InMemoryCorpus::new(vec![
            unit("u1", "d1", &format!("{}first ending", shared), now),
            unit("u2", "d2", &format!("{}second ending", shared), now),
            unit("u3", "d3", "Light reactions produce chemical energy carriers.", now),
        ]));

        let results = hybrid
            .search_at(&SearchQuery::new("light chemical energy"), &options(10, 0.0), now)
            .await;

        let mut keys: Vec<String> = results.iter().map(|c| c.dedup_key()).collect();
        let total = keys.len();
        keys.sort();
        keys.dedup();
        assert_eq!(keys.len(), total);
        assert_eq!(total, 2);
    }

    #[tokio::test]
    async fn test_scores_non_increasing_and_thresholded() {
        let now = Utc::now();
        let old = now - chrono::Duration::days(3 * 365);
        let hybrid = retriever(InMemoryCorpus::new(vec![
            unit("u1", "d1", "Cell division and cell growth.", now),
            unit("u2", "d2", "Cell membranes.", now),
            unit("u3", "d3", "Division of cells in old texts.", old),
            unit("u4", "d4", "Growth curves.", old),
        ]));

        let results = hybrid
            .search_at(&SearchQuery::new("cell division growth"), &options(10, 0.0), now)
            .await;
        assert!(!results.is_empty());
        for pair in results.windows(2) {
            assert!(pair[0].hybrid_score() >= pair[1].hybrid_score());
        }
        for c in &results {
            let m = &c.metadata;
            let expected = hybrid_score(m.relevance_score, m.recency_score, m.authority_score);
            assert!((c.hybrid_score() - expected).abs() < 1e-9);
        }
        assert_eq!(results[0].document_id(), "d1");

        let strict = hybrid
            .search_at(&SearchQuery::new("cell division growth"), &options(10, 0.9), now)
            .await;
        assert!(strict.iter().all(|c| c.hybrid_score() >= 0.9));
        assert!(strict.len() < results.len());

        let capped = hybrid
            .search_at(&SearchQuery::new("cell division growth"), &options(1, 0.0), now)
            .await;
        assert_eq!(capped.len(), 1);
    }

    #[tokio::test]
    async fn test_failing_corpus_degrades_to_empty() {
        let hybrid = retriever(FailingCorpus);
        let results = hybrid.search(&SearchQuery::new("photosynthesis"), &options(10, 0.0)).await;
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_timed_out_strategy_is_skipped() {
        let now = Utc::now();
        let corpus = SlowFullText {
            inner: InMemoryCorpus::new(vec![unit("u1", "d1", "Enzymes speed up reactions.", now)]),
        };
        let config = RetrievalConfig {
            retrieval_timeout_ms: 50,
            ..Default::default()
        };
        let hybrid = HybridRetriever::new(Arc::new(corpus), &config);

        let results = hybrid
            .search_at(&SearchQuery::new("enzymes"), &options(10, 0.0), now)
            .await;

        // Only the keyword strategy answered
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].document_id(), "d1");
    }

    #[tokio::test]
    async fn test_strategy_limits_split_top_k() {
        let recorder = Arc::new(LimitRecorder {
            full_text: AtomicUsize::new(0),
            substring: AtomicUsize::new(0),
        });
        let hybrid = HybridRetriever::new(recorder.clone(), &RetrievalConfig::default());

        hybrid.search(&SearchQuery::new("osmosis"), &options(5, 0.0)).await;
        assert_eq!(recorder.full_text.load(AtomicOrdering::SeqCst), 3);
        assert_eq!(recorder.substring.load(AtomicOrdering::SeqCst), 2);

        let similarity_only = SearchOptions {
            use_hybrid_search: false,
            ..options(7, 0.0)
        };
        recorder.substring.store(0, AtomicOrdering::SeqCst);
        hybrid.search(&SearchQuery::new("osmosis"), &similarity_only).await;
        assert_eq!(recorder.full_text.load(AtomicOrdering::SeqCst), 7);
        assert_eq!(recorder.substring.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_long_queries_are_capped_in_characters() {
        let recorder = Arc::new(TextRecorder::default());
        let hybrid = HybridRetriever::new(recorder.clone(), &RetrievalConfig::default());

        let long = format!("  {} {}  ", "ä".repeat(300), "b".repeat(300));
        hybrid.search(&SearchQuery::new(long.as_str()), &options(10, 0.0)).await;

        let texts = recorder.texts.lock().unwrap().clone();
        assert_eq!(texts.len(), 2);
        let expected = format!("{} {}", "ä".repeat(300), "b".repeat(199));
        for text in texts {
            assert_eq!(text.chars().count(), 500);
            assert_eq!(text, expected);
        }
    }

    #[test]
    fn test_share_of_rounds_up() {
        assert_eq!(share_of(20, SIMILARITY_TENTHS), 12);
        assert_eq!(share_of(20, KEYWORD_TENTHS), 8);
        assert_eq!(share_of(15, KEYWORD_TENTHS), 6);
        assert_eq!(share_of(1, SIMILARITY_TENTHS), 1);
        assert_eq!(share_of(1, KEYWORD_TENTHS), 1);
    }

    #[tokio::test]
    async fn test_search_many_merges_variants() {
        let now = Utc::now();
        let hybrid = retriever(InMemoryCorpus::new(vec![
            unit("u1", "d1", "Mitosis produces two identical cells.", now),
            unit("u2", "d2", "Meiosis produces gametes.", now),
        ]));

        let base = SearchQuery::new("mitosis");
        let queries = vec![
            base.clone(),
            base.with_text("meiosis"),
            base.with_text("mitosis cells"),
        ];
        let results = hybrid.search_many_at(&queries, &options(10, 0.0), now).await;

        let mut docs: Vec<&str> = results.iter().map(|c| c.document_id()).collect();
        docs.sort();
        assert_eq!(docs, vec!["d1", "d2"]);
    }
}
