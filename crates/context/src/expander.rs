//! Query Expander - Turns one query into several related search strings
//!
//! Provides:
//! - Primary terms (significant query words)
//! - Synonyms and related terms from static lookup tables
//! - Templated question reformulations
//!
//! Expansion is best effort: terms missing from the tables contribute
//! nothing and the expander never fails.

use learnforge_common::text::tokenize;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Expansion result, each list deduplicated in first-seen order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct QueryExpansion {
    /// Lower-cased query words longer than three characters
    pub primary: Vec<String>,

    /// Associated terms
    pub related: Vec<String>,

    /// Alternative names for recognized terms
    pub synonyms: Vec<String>,

    /// Question-style reformulations of the raw query
    pub questions: Vec<String>,
}

type Table = HashMap<&'static str, &'static [&'static str]>;

const QUESTION_TEMPLATES: &[&str] = &[
    "What is {}?",
    "How does {} work?",
    "Define {}",
    "Explain {}",
    "Why is {} important?",
    "What are the key concepts of {}?",
];

/// Static synonym and related-term expansion
#[derive(Debug, Clone)]
pub struct QueryExpander {
    synonyms: Table,
    related: Table,
}

impl Default for QueryExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExpander {
    /// Create an expander with the built-in tables
    pub fn new() -> Self {
        Self {
            synonyms: Self::load_default_synonyms(),
            related: Self::load_default_related(),
        }
    }

    /// Expand a query
    pub fn expand(&self, query: &str) -> QueryExpansion {
        let tokens = tokenize(query);

        let primary = dedup(tokens.iter().filter(|t| t.chars().count() > 3).cloned());

        let keys = lookup_keys(&tokens);
        let synonyms = dedup(
            keys.iter()
                .filter_map(|k| self.synonyms.get(k.as_str()))
                .flat_map(|terms| terms.iter().map(|t| t.to_string())),
        );
        let related = dedup(
            keys.iter()
                .filter_map(|k| self.related.get(k.as_str()))
                .flat_map(|terms| terms.iter().map(|t| t.to_string())),
        );

        let subject = query.trim();
        let questions = dedup(QUESTION_TEMPLATES.iter().map(|t| t.replacen("{}", subject, 1)));

        QueryExpansion {
            primary,
            related,
            synonyms,
            questions,
        }
    }

    /// Search strings for a query: the original followed by up to
    /// `max_expansions` synonym then related terms, compared case-insensitively
    pub fn search_queries(&self, query: &str, max_expansions: usize) -> Vec<String> {
        let original = query.trim().to_string();
        let expansion = self.expand(&original);

        let mut seen: HashSet<String> = HashSet::new();
        seen.insert(original.to_lowercase());

        let extra = expansion
            .synonyms
            .into_iter()
            .chain(expansion.related)
            .filter(|term| seen.insert(term.to_lowercase()))
            .take(max_expansions);

        std::iter::once(original).chain(extra).collect()
    }

    fn load_default_synonyms() -> Table {
        let mut synonyms: Table = HashMap::new();

        // Abbreviations and alternative names
        synonyms.insert("ml", &["machine learning"]);
        synonyms.insert("machine learning", &["ml", "statistical learning"]);
        synonyms.insert("ai", &["artificial intelligence"]);
        synonyms.insert("artificial intelligence", &["ai", "machine intelligence"]);
        synonyms.insert("dl", &["deep learning"]);
        synonyms.insert("deep learning", &["deep neural networks"]);
        synonyms.insert("nlp", &["natural language processing"]);
        synonyms.insert("dna", &["deoxyribonucleic acid"]);
        synonyms.insert("rna", &["ribonucleic acid"]);
        synonyms.insert("algebra", &["algebraic expressions"]);
        synonyms.insert("calculus", &["analysis", "infinitesimal calculus"]);
        synonyms.insert("derivative", &["differentiation", "rate of change"]);
        synonyms.insert("integral", &["integration", "antiderivative"]);
        synonyms.insert("photosynthesis", &["carbon fixation"]);
        synonyms.insert("evolution", &["natural selection"]);
        synonyms.insert("velocity", &["speed"]);
        synonyms.insert("force", &["push", "pull"]);
        synonyms.insert("atom", &["atomic structure"]);
        synonyms.insert("function", &["mapping"]);
        synonyms.insert("variable", &["unknown"]);
        synonyms.insert("economy", &["economic system"]);
        synonyms.insert("grammar", &["syntax"]);

        synonyms
    }

    fn load_default_related() -> Table {
        let mut related: Table = HashMap::new();

        // Domain relationships
        related.insert(
            "machine learning",
            &["neural networks", "supervised learning", "training data"],
        );
        related.insert("deep learning", &["neural networks", "backpropagation"]);
        related.insert("neural network", &["neurons", "activation functions", "backpropagation"]);
        related.insert("artificial intelligence", &["machine learning", "search algorithms"]);
        related.insert("photosynthesis", &["chlorophyll", "light reactions", "calvin cycle"]);
        related.insert("cell", &["organelles", "cell membrane", "nucleus"]);
        related.insert("cell division", &["mitosis", "meiosis"]);
        related.insert("mitosis", &["cell cycle", "chromosomes"]);
        related.insert("genetics", &["dna", "heredity", "genes"]);
        related.insert("evolution", &["adaptation", "speciation", "genetics"]);
        related.insert("calculus", &["limits", "derivatives", "integrals"]);
        related.insert("algebra", &["equations", "variables", "polynomials"]);
        related.insert("geometry", &["angles", "shapes", "proofs"]);
        related.insert("probability", &["statistics", "random variables", "distributions"]);
        related.insert("statistics", &["probability", "hypothesis testing", "regression"]);
        related.insert("gravity", &["mass", "acceleration", "orbits"]);
        related.insert("energy", &["work", "power", "conservation of energy"]);
        related.insert("thermodynamics", &["heat", "entropy", "temperature"]);
        related.insert("chemical reaction", &["reactants", "products", "catalysts"]);
        related.insert("atom", &["electrons", "protons", "neutrons"]);
        related.insert("programming", &["algorithms", "data structures", "debugging"]);
        related.insert("algorithm", &["complexity", "data structures"]);
        related.insert("economy", &["supply and demand", "inflation", "markets"]);
        related.insert("history", &["primary sources", "chronology"]);

        related
    }
}

/// Table keys for a tokenized query: whole query, bigrams, single tokens
fn lookup_keys(tokens: &[String]) -> Vec<String> {
    let mut keys = Vec::new();
    if tokens.len() > 1 {
        keys.push(tokens.join(" "));
    }
    for pair in tokens.windows(2) {
        keys.push(format!("{} {}", pair[0], pair[1]));
    }
    keys.extend(tokens.iter().cloned());
    dedup(keys.into_iter())
}

fn dedup(items: impl Iterator<Item = String>) -> Vec<String> {
    let mut seen = HashSet::new();
    items.filter(|item| seen.insert(item.clone())).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_primary_terms() {
        let expansion = QueryExpander::new().expand("What is the Cell Cycle?");
        assert_eq!(expansion.primary, vec!["what", "cell", "cycle"]);
    }

    #[test]
    fn test_bigram_and_token_lookups() {
        let expansion = QueryExpander::new().expand("machine learning");

        assert_eq!(expansion.synonyms, vec!["ml", "statistical learning"]);
        assert_eq!(
            expansion.related,
            vec!["neural networks", "supervised learning", "training data"]
        );
    }

    #[test]
    fn test_unknown_terms_expand_to_nothing() {
        let expansion = QueryExpander::new().expand("medieval tapestry weaving");
        assert!(expansion.synonyms.is_empty());
        assert!(expansion.related.is_empty());
        // Questions are always generated
        assert_eq!(expansion.questions.len(), 6);
        assert_eq!(expansion.questions[0], "What is medieval tapestry weaving?");
        assert_eq!(expansion.questions[2], "Define medieval tapestry weaving");
    }

    #[test]
    fn test_lists_are_deduplicated() {
        // "neural networks" is related to both terms
        let expansion = QueryExpander::new().expand("deep learning machine learning");
        let count = expansion.related.iter().filter(|r| *r == "neural networks").count();
        assert_eq!(count, 1);
        let count = expansion.primary.iter().filter(|p| *p == "learning").count();
        assert_eq!(count, 1);
    }

    #[test]
    fn test_search_queries_respect_limit() {
        let expander = QueryExpander::new();

        let queries = expander.search_queries("Photosynthesis", 2);
        assert_eq!(queries, vec!["Photosynthesis", "carbon fixation", "chlorophyll"]);

        let queries = expander.search_queries("photosynthesis", 0);
        assert_eq!(queries, vec!["photosynthesis"]);
    }

    #[test]
    fn test_abbreviation_expands_to_full_name() {
        let queries = QueryExpander::new().search_queries("ML", 5);
        assert_eq!(queries, vec!["ML", "machine learning"]);
    }
}
