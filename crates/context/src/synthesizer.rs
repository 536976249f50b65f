//! LLM Synthesizer - Generates grounded answers from packed context
//!
//! Provides:
//! - `LanguageModel` abstraction with an OpenAI-compatible client
//! - Grounded prompts listing numbered sources, consensus and conflicts
//! - Citation extraction mapped back to packed chunks
//!
//! An empty context degrades to an ungrounded prompt rather than an error.

use crate::engine::ContextResult;
use async_trait::async_trait;
use learnforge_common::config::LlmConfig;
use learnforge_common::errors::{AppError, Result};
use learnforge_common::metrics::record_completion;
use learnforge_common::text::estimate_tokens;
use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// Text returned by a language model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Completion {
    pub content: String,
}

#[async_trait]
pub trait LanguageModel: Send + Sync {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<Completion>;
}

/// Chat-completions client for OpenAI-compatible endpoints
pub struct OpenAiCompatibleClient {
    config: LlmConfig,
    client: reqwest::Client,
    system_prompt: String,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    max_tokens: usize,
    temperature: f32,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Deserialize)]
struct ChatMessageResponse {
    content: String,
}

impl OpenAiCompatibleClient {
    pub fn new(config: LlmConfig, timeout: Duration) -> Result<Self> {
        if config.api_key.as_deref().map_or(true, str::is_empty) {
            return Err(AppError::Configuration {
                message: "llm.api_key is required for the language model client".to_string(),
            });
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            config,
            client,
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
        })
    }

    pub fn with_system_prompt(mut self, prompt: impl Into<String>) -> Self {
        self.system_prompt = prompt.into();
        self
    }

    async fn request(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<Completion> {
        let api_key = self.config.api_key.as_deref().unwrap_or_default();
        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
            max_tokens,
            temperature,
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .bearer_auth(api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(AppError::LanguageModel {
                message: format!("API error {}: {}", status, body),
            });
        }

        let chat: ChatResponse = response.json().await?;

        chat.choices
            .into_iter()
            .next()
            .map(|c| Completion {
                content: c.message.content,
            })
            .ok_or_else(|| AppError::LanguageModel {
                message: "empty response".to_string(),
            })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompatibleClient {
    async fn complete(
        &self,
        prompt: &str,
        max_tokens: usize,
        temperature: f32,
    ) -> Result<Completion> {
        let start = Instant::now();
        let result = self.request(prompt, max_tokens, temperature).await;
        record_completion(start.elapsed().as_secs_f64(), &self.config.model, result.is_ok());
        result
    }
}

const DEFAULT_SYSTEM_PROMPT: &str =
    "You are a patient tutor helping students learn from their course material.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SynthesisStyle {
    Concise,
    Detailed,
    /// Step-by-step explanation for learners
    Tutorial,
}

#[derive(Debug, Clone)]
pub struct SynthesisOptions {
    pub max_tokens: usize,
    pub temperature: f32,
    pub include_citations: bool,
    pub style: SynthesisStyle,

    /// Prepended to the prompt when set
    pub system_prompt: Option<String>,
}

impl Default for SynthesisOptions {
    fn default() -> Self {
        Self {
            max_tokens: 1000,
            temperature: 0.7,
            include_citations: true,
            style: SynthesisStyle::Detailed,
            system_prompt: None,
        }
    }
}

/// Citation of a packed chunk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    /// 1-based source number used in the prompt
    pub index: usize,
    pub document_id: String,
    pub document_name: String,
    pub chapter: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SynthesizedOutput {
    pub content: String,
    pub citations: Vec<Citation>,

    /// Whether the prompt carried retrieved context
    pub grounded: bool,

    pub token_count: usize,
}

fn citation_pattern() -> &'static Regex {
    static CITATION: OnceLock<Regex> = OnceLock::new();
    CITATION.get_or_init(|| Regex::new(r"\[(\d+)\]").expect("valid citation pattern"))
}

pub struct Synthesizer {
    model: Arc<dyn LanguageModel>,
}

impl Synthesizer {
    pub fn new(model: Arc<dyn LanguageModel>) -> Self {
        Self { model }
    }

    /// Generate content for an instruction, grounded in retrieved context
    #[instrument(skip(self, context, options), fields(chunks = context.chunks.len()))]
    pub async fn generate(
        &self,
        instruction: &str,
        context: &ContextResult,
        options: &SynthesisOptions,
    ) -> Result<SynthesizedOutput> {
        let grounded = !context.is_empty();
        if !grounded {
            warn!("No grounding context, generating ungrounded output");
        }

        let prompt = if grounded {
            build_grounded_prompt(instruction, context, options)
        } else {
            build_ungrounded_prompt(instruction, options)
        };
        debug!(prompt_tokens = estimate_tokens(&prompt), "Prompt built");

        let completion = self
            .model
            .complete(&prompt, options.max_tokens, options.temperature)
            .await?;

        let citations = if grounded {
            extract_citations(&completion.content, context)
        } else {
            vec![]
        };

        Ok(SynthesizedOutput {
            token_count: estimate_tokens(&completion.content),
            content: completion.content,
            citations,
            grounded,
        })
    }
}

fn style_instruction(style: SynthesisStyle) -> &'static str {
    match style {
        SynthesisStyle::Concise => "Be brief and focused.",
        SynthesisStyle::Detailed => "Give a thorough explanation.",
        SynthesisStyle::Tutorial => "Explain step by step, introducing terms before using them.",
    }
}

fn prompt_header(options: &SynthesisOptions) -> String {
    let mut prompt = String::new();
    if let Some(system) = &options.system_prompt {
        let _ = writeln!(prompt, "{}\n", system);
    }
    prompt.push_str(style_instruction(options.style));
    prompt.push('\n');
    prompt
}

fn build_grounded_prompt(
    instruction: &str,
    context: &ContextResult,
    options: &SynthesisOptions,
) -> String {
    let mut prompt = prompt_header(options);
    prompt.push_str(
        "Use ONLY the numbered sources below. \
         If they do not cover something, say so rather than guessing.\n",
    );
    if options.include_citations {
        prompt.push_str("Cite sources inline as [1], [2], etc.\n");
    } else {
        prompt.push_str("Do not include citations.\n");
    }

    let _ = writeln!(prompt, "\nTask: {}\n\nSources:", instruction);
    for (i, chunk) in context.chunks.iter().enumerate() {
        let chapter = chunk
            .metadata
            .chapter
            .as_deref()
            .map(|c| format!(", {}", c))
            .unwrap_or_default();
        let _ = writeln!(
            prompt,
            "\n[{}] {}{}\n{}",
            i + 1,
            chunk.metadata.document_name,
            chapter,
            chunk.content
        );
    }

    if !context.consensus.is_empty() {
        prompt.push_str("\nPoints the sources agree on:\n");
        for area in &context.consensus {
            let _ = writeln!(prompt, "- {}: {}", area.concept, area.statement);
        }
    }

    if !context.conflicts.is_empty() {
        prompt.push_str("\nPoints where the sources differ (mention both views):\n");
        for conflict in &context.conflicts {
            let views: Vec<String> = conflict
                .claims
                .iter()
                .map(|c| format!("\"{}\" ({})", c.statement, c.document_name))
                .collect();
            let _ = writeln!(prompt, "- {}: {}", conflict.concept, views.join(" vs "));
        }
    }

    prompt.push_str("\nAnswer:");
    prompt
}

fn build_ungrounded_prompt(instruction: &str, options: &SynthesisOptions) -> String {
    let mut prompt = prompt_header(options);
    prompt.push_str(
        "No course material was found for this request. \
         Answer from general knowledge and say so.\n",
    );
    let _ = write!(prompt, "\nTask: {}\n\nAnswer:", instruction);
    prompt
}

/// Distinct `[n]` references that point at a packed chunk, in index order
fn extract_citations(content: &str, context: &ContextResult) -> Vec<Citation> {
    let mut citations: Vec<Citation> = Vec::new();

    for caps in citation_pattern().captures_iter(content) {
        let Some(index) = caps.get(1).and_then(|m| m.as_str().parse::<usize>().ok()) else {
            continue;
        };
        let in_range = (1..=context.chunks.len()).contains(&index);
        if !in_range || citations.iter().any(|c| c.index == index) {
            continue;
        }

        let chunk = &context.chunks[index - 1];
        citations.push(Citation {
            index,
            document_id: chunk.document_id().to_string(),
            document_name: chunk.metadata.document_name.clone(),
            chapter: chunk.metadata.chapter.clone(),
        });
    }

    citations.sort_by_key(|c| c.index);
    citations
}
