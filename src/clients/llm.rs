//! LLM access through `edgequake_llm`.
//!
//! The service only ever needs "prompt in, text out", so the provider is
//! wrapped behind [`TextGenerator`]. Prompt engineering lives in
//! [`crate::prompts`]; reply validation lives in
//! [`crate::pipeline::synthesize`]. This module only handles the call and
//! its retries.
//!
//! ## Retry Strategy
//!
//! 429 / 503 responses from hosted models are transient. Exponential backoff
//! (`retry_backoff_ms * 2^attempt`) with 500 ms base and 2 retries waits
//! 500 ms → 1 s before giving up.

use crate::clients::TextGenerator;
use crate::config::ServerConfig;
use crate::error::LlmError;
use async_trait::async_trait;
use edgequake_llm::{
    AnthropicProvider, ChatMessage, CompletionOptions, GeminiProvider, LLMProvider,
    OpenAIProvider, OpenRouterProvider, ProviderFactory,
};
use std::sync::Arc;
use std::time::Instant;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// [`TextGenerator`] backed by any `edgequake_llm` provider.
pub struct ProviderGenerator {
    provider: Arc<dyn LLMProvider>,
    options: CompletionOptions,
    max_retries: u32,
    retry_backoff_ms: u64,
}

impl ProviderGenerator {
    /// Create the provider named in `config`.
    ///
    /// An explicit [`ServerConfig::llm_api_key`] is handed straight to the
    /// provider client; without one the factory reads the provider's own
    /// variable (e.g. `GEMINI_API_KEY`).
    pub fn from_config(config: &ServerConfig) -> Result<Self, LlmError> {
        let provider = match config.explicit_llm_key() {
            Some(key) => provider_with_key(&config.llm_provider, &config.llm_model, key)?,
            None => ProviderFactory::create_llm_provider(&config.llm_provider, &config.llm_model)
                .map_err(|e| LlmError::ProviderNotConfigured {
                    provider: config.llm_provider.clone(),
                    hint: format!("{e}"),
                })?,
        };
        debug!("LLM provider {} / {}", provider.name(), provider.model());
        Ok(Self::new(provider, config))
    }

    /// Wrap a pre-built provider.
    pub fn new(provider: Arc<dyn LLMProvider>, config: &ServerConfig) -> Self {
        Self {
            provider,
            options: build_options(config),
            max_retries: config.max_retries,
            retry_backoff_ms: config.retry_backoff_ms,
        }
    }
}

#[async_trait]
impl TextGenerator for ProviderGenerator {
    async fn generate(&self, prompt: &str) -> Result<String, LlmError> {
        let start = Instant::now();
        let messages = vec![ChatMessage::user(prompt)];
        let mut last_err: Option<String> = None;

        for attempt in 0..=self.max_retries {
            if attempt > 0 {
                let backoff = backoff_ms(self.retry_backoff_ms, attempt);
                warn!(
                    "LLM retry {}/{} after {}ms",
                    attempt, self.max_retries, backoff
                );
                sleep(Duration::from_millis(backoff)).await;
            }

            match self.provider.chat(&messages, Some(&self.options)).await {
                Ok(response) => {
                    debug!(
                        "LLM reply: {} input tokens, {} output tokens, {:?}",
                        response.prompt_tokens,
                        response.completion_tokens,
                        start.elapsed()
                    );
                    return Ok(response.content);
                }
                Err(e) => {
                    let err_msg = format!("{}", e);
                    warn!("LLM attempt {} failed: {}", attempt + 1, err_msg);
                    last_err = Some(err_msg);
                }
            }
        }

        Err(LlmError::CallFailed {
            attempts: self.max_retries + 1,
            detail: last_err.unwrap_or_else(|| "Unknown error".to_string()),
        })
    }
}

/// Build a provider client from a key passed in code.
fn provider_with_key(
    provider: &str,
    model: &str,
    key: &str,
) -> Result<Arc<dyn LLMProvider>, LlmError> {
    let provider: Arc<dyn LLMProvider> = match provider.to_ascii_lowercase().as_str() {
        "gemini" | "google" => Arc::new(GeminiProvider::new(key).with_model(model)),
        "openai" => Arc::new(OpenAIProvider::new(key).with_model(model)),
        "anthropic" => Arc::new(AnthropicProvider::new(key).with_model(model)),
        "openrouter" => Arc::new(OpenRouterProvider::new(key).with_model(model)),
        other => {
            return Err(LlmError::ProviderNotConfigured {
                provider: other.to_string(),
                hint: "set the provider's API key in the environment".into(),
            })
        }
    };
    Ok(provider)
}

/// Delay before retry number `attempt` (1-based).
fn backoff_ms(base_ms: u64, attempt: u32) -> u64 {
    base_ms.saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1)))
}

/// Build `CompletionOptions` from the service config.
fn build_options(config: &ServerConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.temperature),
        max_tokens: Some(config.max_tokens),
        ..Default::default()
    }
}
