//! LearnForge Context CLI
//!
//! Retrieves grounding context for a query over a JSON corpus and prints it:
//!
//! ```text
//! context [--subject <id>] [--aggregate] [--max-tokens <n>] [--no-expand] [--generate] <query...>
//! ```
//!
//! `--aggregate` (with `--subject`) adds related-subject context.
//! `--generate` sends the packed context to the configured language model.

use clap::Parser;
use learnforge_common::{
    config::{AppConfig, RetrievalOverrides},
    errors::AppError,
    metrics::register_metrics,
    InMemoryCorpus, SearchQuery, VERSION,
};
use learnforge_context::{
    ContextAggregator, ContextEngine, OpenAiCompatibleClient, SynthesisOptions, Synthesizer,
};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Grounding context retrieval over a JSON corpus
#[derive(Debug, Parser)]
#[command(name = "context", version, about = "LearnForge grounding context retrieval")]
struct Args {
    /// Restrict retrieval to one subject
    #[arg(long)]
    subject: Option<String>,

    /// Add context from subjects sharing a knowledge base
    #[arg(long, requires = "subject", conflicts_with = "generate")]
    aggregate: bool,

    /// Token budget for the packed context
    #[arg(long)]
    max_tokens: Option<usize>,

    /// Search only the query as written
    #[arg(long)]
    no_expand: bool,

    /// Send the packed context to the configured language model
    #[arg(long)]
    generate: bool,

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

    info!("Starting LearnForge Context Engine v{}", VERSION);

    let path = config.corpus.path.clone().ok_or_else(|| AppError::Configuration {
        message: "corpus.path is not set (APP__CORPUS__PATH)".to_string(),
    })?;
    let corpus = Arc::new(InMemoryCorpus::from_json_file(&path).await?);

    let overrides = RetrievalOverrides {
        max_tokens: args.max_tokens,
        expand_queries: args.no_expand.then_some(false),
        ..Default::default()
    };

    let engine = Arc::new(ContextEngine::new(corpus, config.retrieval.clone()));
    let query = SearchQuery::new(args.query.join(" "));

    if let (true, Some(subject)) = (args.aggregate, args.subject.as_deref()) {
        let aggregated = ContextAggregator::new(engine)
            .aggregate_by_subject(subject, &query, Some(&overrides))
            .await;
        println!("{}", serde_json::to_string_pretty(&aggregated)?);
        return Ok(());
    }

    let query = match args.subject {
        Some(subject) => query.in_subject(subject),
        None => query,
    };
    let result = engine.retrieve_context(&query, Some(&overrides)).await;

    if args.generate {
        let client = OpenAiCompatibleClient::new(config.llm.clone(), config.llm_timeout())?;
        let synthesizer = Synthesizer::new(Arc::new(client));
        let output = synthesizer
            .generate(&query.text, &result, &SynthesisOptions::default())
            .await?;
        println!("{}", serde_json::to_string_pretty(&output)?);
    } else {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }

    Ok(())
}
