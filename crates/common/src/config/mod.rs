//! Configuration management for LearnForge services
//!
//! Supports loading configuration from:
//! - Environment variables (prefixed with APP__)
//! - Configuration files (config/default.toml, config/{APP_ENV}.toml)
//! - Default values
//!
//! The retrieval section is an immutable value handed to the pipeline at
//! construction; per-call [`RetrievalOverrides`] merge into a fresh copy.

use crate::errors::{AppError, Result};
use config::{Config, Environment, File};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main application configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AppConfig {
    /// Retrieval pipeline configuration
    #[serde(default)]
    pub retrieval: RetrievalConfig,

    /// Corpus source configuration
    #[serde(default)]
    pub corpus: CorpusConfig,

    /// Language model configuration
    #[serde(default)]
    pub llm: LlmConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RetrievalConfig {
    /// Token budget for the packed context
    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    /// Maximum passages returned by hybrid search
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Minimum hybrid score kept after merging
    #[serde(default = "default_similarity_threshold")]
    pub similarity_threshold: f64,

    /// Issue extra searches for synonym/related expansions
    #[serde(default = "default_true")]
    pub expand_queries: bool,

    /// Run the keyword strategy alongside the similarity strategy
    #[serde(default = "default_true")]
    pub use_hybrid_search: bool,

    /// Expanded queries issued in addition to the original one
    #[serde(default = "default_max_expansions")]
    pub max_expansions: usize,

    /// Per corpus call timeout in milliseconds
    #[serde(default = "default_retrieval_timeout")]
    pub retrieval_timeout_ms: u64,

    /// Store-side query length cap (characters)
    #[serde(default = "default_max_query_chars")]
    pub max_query_chars: usize,

    /// Recency half-life in days
    #[serde(default = "default_half_life")]
    pub recency_half_life_days: f64,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct CorpusConfig {
    /// Path to a JSON corpus file (used by the command line binaries)
    pub path: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct LlmConfig {
    /// Chat completions endpoint
    #[serde(default = "default_llm_endpoint")]
    pub endpoint: String,

    /// API key
    pub api_key: Option<String>,

    /// Model name
    #[serde(default = "default_llm_model")]
    pub model: String,

    /// Timeout in seconds
    #[serde(default = "default_llm_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ObservabilityConfig {
    /// Log level (debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default = "default_json_logging")]
    pub json_logging: bool,

    /// Service name for tracing
    #[serde(default = "default_service_name")]
    pub service_name: String,
}

/// Per-call overrides for [`RetrievalConfig`]
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct RetrievalOverrides {
    pub max_tokens: Option<usize>,
    pub top_k: Option<usize>,
    pub similarity_threshold: Option<f64>,
    pub expand_queries: Option<bool>,
    pub use_hybrid_search: Option<bool>,
}

// Default value functions
fn default_max_tokens() -> usize { 12_000 }
fn default_top_k() -> usize { 20 }
fn default_similarity_threshold() -> f64 { 0.7 }
fn default_true() -> bool { true }
fn default_max_expansions() -> usize { 3 }
fn default_retrieval_timeout() -> u64 { 5_000 }
fn default_max_query_chars() -> usize { 500 }
fn default_half_life() -> f64 { 365.0 }
fn default_llm_endpoint() -> String { "https://api.openai.com/v1/chat/completions".to_string() }
fn default_llm_model() -> String { "gpt-4o-mini".to_string() }
fn default_llm_timeout() -> u64 { 60 }
fn default_log_level() -> String { "info".to_string() }
fn default_json_logging() -> bool { false }
fn default_service_name() -> String { "learnforge".to_string() }

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            top_k: default_top_k(),
            similarity_threshold: default_similarity_threshold(),
            expand_queries: true,
            use_hybrid_search: true,
            max_expansions: default_max_expansions(),
            retrieval_timeout_ms: default_retrieval_timeout(),
            max_query_chars: default_max_query_chars(),
            recency_half_life_days: default_half_life(),
        }
    }
}

impl RetrievalConfig {
    /// Return a new configuration with the overrides applied
    pub fn with_overrides(&self, overrides: &RetrievalOverrides) -> Self {
        Self {
            max_tokens: overrides.max_tokens.unwrap_or(self.max_tokens),
            top_k: overrides.top_k.unwrap_or(self.top_k),
            similarity_threshold: overrides
                .similarity_threshold
                .unwrap_or(self.similarity_threshold),
            expand_queries: overrides.expand_queries.unwrap_or(self.expand_queries),
            use_hybrid_search: overrides.use_hybrid_search.unwrap_or(self.use_hybrid_search),
            ..self.clone()
        }
    }

    /// Reject values the pipeline cannot honour
    pub fn validate(&self) -> Result<()> {
        if self.top_k == 0 {
            return Err(AppError::validation("retrieval.top_k", "top_k must be >= 1"));
        }
        if !(0.0..=1.0).contains(&self.similarity_threshold) {
            return Err(AppError::validation(
                "retrieval.similarity_threshold",
                "similarity_threshold must be in [0.0, 1.0]",
            ));
        }
        if self.recency_half_life_days <= 0.0 {
            return Err(AppError::validation(
                "retrieval.recency_half_life_days",
                "recency_half_life_days must be > 0",
            ));
        }
        if self.max_query_chars == 0 {
            return Err(AppError::validation(
                "retrieval.max_query_chars",
                "max_query_chars must be > 0",
            ));
        }
        Ok(())
    }

    /// Get the per-call corpus timeout as Duration
    pub fn retrieval_timeout(&self) -> Duration {
        Duration::from_millis(self.retrieval_timeout_ms)
    }
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_llm_endpoint(),
            api_key: None,
            model: default_llm_model(),
            timeout_secs: default_llm_timeout(),
        }
    }
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logging: default_json_logging(),
            service_name: default_service_name(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment and files
    pub fn load() -> Result<Self> {
        let env = std::env::var("APP_ENV").unwrap_or_else(|_| "development".to_string());

        let config = Config::builder()
            // Load base config file
            .add_source(File::with_name("config/default").required(false))

            // Load environment-specific config
            .add_source(File::with_name(&format!("config/{}", env)).required(false))

            // Load local overrides
            .add_source(File::with_name("config/local").required(false))

            // Load from environment variables with APP__ prefix
            // e.g., APP__RETRIEVAL__TOP_K=30
            .add_source(
                Environment::with_prefix("APP")
                    .separator("__")
                    .try_parsing(true)
            )

            .build()?;

        Self::finish(config)
    }

    fn finish(config: Config) -> Result<Self> {
        let config: AppConfig = config.try_deserialize()?;
        config.retrieval.validate()?;
        Ok(config)
    }

    /// Get the language model timeout as Duration
    pub fn llm_timeout(&self) -> Duration {
        Duration::from_secs(self.llm.timeout_secs)
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            retrieval: RetrievalConfig::default(),
            corpus: CorpusConfig::default(),
            llm: LlmConfig::default(),
            observability: ObservabilityConfig::default(),
        }
    }
}
