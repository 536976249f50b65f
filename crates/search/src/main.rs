//! LearnForge Search CLI
//!
//! Runs a hybrid search over a JSON corpus and prints the ranked passages:
//!
//! ```text
//! search [--subject <id>] [--top-k <n>] [--threshold <x>] <query...>
//! ```

use clap::Parser;
use learnforge_common::{
    config::AppConfig, errors::AppError, metrics::register_metrics, InMemoryCorpus, SearchQuery,
    VERSION,
};
use learnforge_search::retrieval::{HybridRetriever, SearchOptions};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Hybrid passage search over a JSON corpus
#[derive(Debug, Parser)]
#[command(name = "search", version, about = "LearnForge hybrid passage search")]
struct Args {
    /// Restrict results to one subject
    #[arg(long)]
    subject: Option<String>,

    /// Maximum passages returned (defaults to `retrieval.top_k`)
    #[arg(long)]
    top_k: Option<usize>,

    /// Minimum hybrid score (defaults to `retrieval.similarity_threshold`)
    #[arg(long)]
    threshold: Option<f64>,

    /// Query words
    #[arg(required = true)]
    query: Vec<String>,
}

fn init_tracing(config: &AppConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.observability.log_level));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_writer(std::io::stderr);

    if config.observability.json_logging {
        builder.json().init();
    } else {
        builder.init();
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    // Load environment variables
    dotenvy::dotenv().ok();

    // Load configuration
    let config = AppConfig::load()?;
    init_tracing(&config);
    register_metrics();

    info!("Starting LearnForge Search v{}", VERSION);

    let path = config.corpus.path.clone().ok_or_else(|| AppError::Configuration {
        message: "corpus.path is not set (APP__CORPUS__PATH)".to_string(),
    })?;
    let corpus = Arc::new(InMemoryCorpus::from_json_file(&path).await?);

    let retriever = HybridRetriever::new(corpus, &config.retrieval);

    let mut options = SearchOptions::from_config(&config.retrieval);
    if let Some(top_k) = args.top_k {
        options.top_k = top_k;
    }
    if let Some(threshold) = args.threshold {
        options.similarity_threshold = threshold;
    }

    let mut query = SearchQuery::new(args.query.join(" "));
    if let Some(subject) = args.subject {
        query = query.in_subject(subject);
    }

    let results = retriever.search(&query, &options).await;
    info!(results = results.len(), "Search complete");

    println!("{}", serde_json::to_string_pretty(&results)?);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_flags_and_query() {
        let args = Args::try_parse_from([
            "search", "--top-k", "5", "--threshold", "0.4", "chemical", "energy",
        ])
        .unwrap();

        assert_eq!(args.top_k, Some(5));
        assert_eq!(args.threshold, Some(0.4));
        assert!(args.subject.is_none());
        assert_eq!(args.query.join(" "), "chemical energy");
    }

    #[test]
    fn test_rejects_missing_values() {
        assert!(Args::try_parse_from(["search", "energy", "--subject"]).is_err());
        assert!(Args::try_parse_from(["search", "--top-k", "energy"]).is_err());
        assert!(Args::try_parse_from(["search"]).is_err());
    }
}
