//! In-memory corpus
//!
//! Immutable after construction, so concurrent searches need no locking.

use super::{Corpus, CorpusQuery, MatchMode, TextUnit};
use crate::errors::{AppError, Result};
use crate::models::{QueryFilters, QueryScope};
use crate::text::{tokenize, word_set};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use tracing::{debug, info};

/// On-disk corpus layout
#[derive(Debug, Deserialize)]
struct CorpusFile {
    units: Vec<TextUnit>,
    #[serde(default)]
    knowledge_bases: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Clone, Default)]
pub struct InMemoryCorpus {
    units: Vec<TextUnit>,
    /// Knowledge base id -> subject ids
    knowledge_bases: BTreeMap<String, Vec<String>>,
}

impl InMemoryCorpus {
    pub fn new(units: Vec<TextUnit>) -> Self {
        let units = units
            .into_iter()
            .map(|mut unit| {
                if unit.word_count == 0 {
                    unit.word_count = unit.content.split_whitespace().count();
                }
                unit
            })
            .collect();

        Self {
            units,
            knowledge_bases: BTreeMap::new(),
        }
    }

    /// Group subjects under a knowledge base
    pub fn with_knowledge_base(mut self, id: impl Into<String>, subjects: Vec<String>) -> Self {
        self.knowledge_bases.insert(id.into(), subjects);
        self
    }

    /// Load a corpus from a JSON file (`{"units": [...], "knowledge_bases": {...}}`)
    pub async fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = tokio::fs::read_to_string(path).await?;
        let file: CorpusFile = serde_json::from_str(&raw).map_err(|e| AppError::InvalidFormat {
            message: format!("{}: {}", path.display(), e),
        })?;

        let mut corpus = Self::new(file.units);
        corpus.knowledge_bases = file.knowledge_bases;

        info!(
            path = %path.display(),
            units = corpus.units.len(),
            knowledge_bases = corpus.knowledge_bases.len(),
            "Corpus loaded"
        );
        Ok(corpus)
    }

    pub fn len(&self) -> usize {
        self.units.len()
    }

    pub fn is_empty(&self) -> bool {
        self.units.is_empty()
    }

    fn in_scope(&self, unit: &TextUnit, scope: &QueryScope) -> bool {
        if !scope.document_ids.is_empty() && !scope.document_ids.contains(&unit.document_id) {
            return false;
        }

        if let Some(subject) = &scope.subject_id {
            if unit.subject_id.as_ref() != Some(subject) {
                return false;
            }
        }

        if let Some(kb) = &scope.knowledge_base_id {
            let Some(subjects) = self.knowledge_bases.get(kb) else {
                return false;
            };
            match &unit.subject_id {
                Some(subject) if subjects.contains(subject) => {}
                _ => return false,
            }
        }

        true
    }

    fn passes_filters(unit: &TextUnit, filters: &QueryFilters) -> bool {
        if let Some(range) = &filters.difficulty {
            if !range.contains(unit.difficulty) {
                return false;
            }
        }

        if let Some(chapter) = &filters.chapter {
            match &unit.chapter {
                Some(label) if label.eq_ignore_ascii_case(chapter) => {}
                _ => return false,
            }
        }

        if !filters.topics.is_empty() {
            let wanted = filters
                .topics
                .iter()
                .any(|t| unit.topics.iter().any(|u| u.eq_ignore_ascii_case(t)));
            if !wanted {
                return false;
            }
        }

        true
    }
}

/// Query terms usable for matching (longer than two characters)
fn match_terms(text: &str, mode: MatchMode) -> Vec<String> {
    let raw: Vec<String> = match mode {
        MatchMode::FullText => tokenize(text),
        MatchMode::Substring => text.split_whitespace().map(str::to_lowercase).collect(),
    };

    let mut seen = HashSet::new();
    raw.into_iter()
        .filter(|t| t.chars().count() > 2)
        .filter(|t| seen.insert(t.clone()))
        .collect()
}

/// Number of distinct terms present in the content
fn matched_terms(content: &str, terms: &[String], mode: MatchMode) -> usize {
    match mode {
        MatchMode::FullText => {
            let words = word_set(content);
            terms.iter().filter(|t| words.contains(*t)).count()
        }
        MatchMode::Substring => {
            let lower = content.to_lowercase();
            terms.iter().filter(|t| lower.contains(t.as_str())).count()
        }
    }
}

#[async_trait]
impl Corpus for InMemoryCorpus {
    async fn search(&self, query: &CorpusQuery) -> Result<Vec<TextUnit>> {
        let terms = match_terms(&query.text, query.mode);
        if terms.is_empty() || query.limit == 0 {
            return Ok(Vec::new());
        }

        let mut hits: Vec<(usize, &TextUnit)> = self
            .units
            .iter()
            .filter(|u| self.in_scope(u, &query.scope))
            .filter(|u| Self::passes_filters(u, &query.filters))
            .filter_map(|u| {
                let matched = matched_terms(&u.content, &terms, query.mode);
                (matched > 0).then_some((matched, u))
            })
            .collect();

        hits.sort_by(|(ma, a), (mb, b)| {
            mb.cmp(ma)
                .then_with(|| b.created_at.cmp(&a.created_at))
                .then_with(|| a.id.cmp(&b.id))
        });
        hits.truncate(query.limit);

        debug!(
            mode = ?query.mode,
            terms = terms.len(),
            hits = hits.len(),
            "In-memory corpus search"
        );

        Ok(hits.into_iter().map(|(_, u)| u.clone()).collect())
    }

    async fn related_subjects(&self, subject_id: &str) -> Result<Vec<String>> {
        let mut related = Vec::new();
        for subjects in self.knowledge_bases.values() {
            if !subjects.iter().any(|s| s == subject_id) {
                continue;
            }
            for subject in subjects {
                if subject != subject_id && !related.contains(subject) {
                    related.push(subject.clone());
                }
            }
        }
        Ok(related)
    }
}
