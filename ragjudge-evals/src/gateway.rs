// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! LLM gateway: provider dispatch, retry with backoff, prompt caching and
//! token counting.
//!
//! A gateway owns one prompt cache. [`LlmGateway::scoped`] hands out a copy
//! with an empty cache that shares the provider client and tokenizer, which is
//! how the scorer keeps cache effects local to one response. Prompts served
//! since [`LlmGateway::begin_attempt`] can be evicted with
//! [`LlmGateway::discard_attempt`] so a retry samples the evaluator again.

use crate::cache::{CacheStats, PromptCache};
use crate::config::GatewayConfig;
use crate::llm_client::{
    AnthropicProvider, ChatProvider, GeminiProvider, OpenAiProvider, ProviderError, SYSTEM_PROMPT,
};
use parking_lot::Mutex;
use rand::Rng;
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use thiserror::Error;
use tiktoken_rs::CoreBPE;
use tracing::{debug, error, warn};

/// Gateway failures. None of them are worth a parse retry.
#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("{provider} requires {} to be set in the environment", vars.join(", "))]
    MissingCredentials {
        provider: &'static str,
        vars: Vec<String>,
    },

    #[error("Prompt exceeds the evaluator context window: {0}")]
    ContextLength(String),

    #[error("LLM call failed for {model}, max retries hit after {attempts} attempts: {last_error}")]
    Exhausted {
        model: String,
        attempts: u32,
        last_error: String,
    },
}

/// Supported provider families
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Anthropic,
    Gemini,
}

impl ProviderKind {
    /// Pick the provider for a model name and return the name to send on the
    /// wire (an explicit `provider/` prefix is stripped).
    pub fn from_model(model: &str) -> Option<(Self, String)> {
        if let Some((prefix, rest)) = model.split_once('/') {
            let kind = match prefix.to_lowercase().as_str() {
                "openai" => Self::OpenAi,
                "anthropic" => Self::Anthropic,
                "gemini" | "google" => Self::Gemini,
                _ => return None,
            };
            if rest.is_empty() {
                return None;
            }
            return Some((kind, rest.to_string()));
        }

        let lower = model.to_lowercase();

        let kind = if ["gpt-", "o1", "o3", "o4", "chatgpt"]
            .iter()
            .any(|p| lower.starts_with(p))
        {
            Self::OpenAi
        } else if lower.contains("claude") {
            Self::Anthropic
        } else if lower.contains("gemini") {
            Self::Gemini
        } else {
            return None;
        };
        Some((kind, model.to_string()))
    }

    pub fn display_name(self) -> &'static str {
        match self {
            Self::OpenAi => "OpenAI",
            Self::Anthropic => "Anthropic",
            Self::Gemini => "Gemini",
        }
    }

    /// Environment variables that must be set to call this provider
    pub fn credential_vars(self) -> &'static [&'static str] {
        match self {
            Self::OpenAi => &["OPENAI_API_KEY"],
            Self::Anthropic => &["ANTHROPIC_API_KEY"],
            Self::Gemini => &["GEMINI_API_KEY"],
        }
    }
}

/// Exponential backoff with multiplicative jitter
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub initial_wait: Duration,
    pub max_wait: Duration,
    pub base: f64,
    pub jitter: f64,
}

impl RetryPolicy {
    fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        config
            .validate()
            .map_err(|e| GatewayError::Configuration(e.to_string()))?;

        let secs = |field: &str, value: f64| {
            Duration::try_from_secs_f64(value)
                .map_err(|e| GatewayError::Configuration(format!("gateway.{}: {}", field, e)))
        };
        Ok(Self {
            max_attempts: config.max_retries,
            initial_wait: secs("starting_wait_secs", config.starting_wait_secs)?,
            max_wait: secs("max_wait_secs", config.max_wait_secs)?,
            base: config.exp_delay_base,
            jitter: config.jitter,
        })
    }

    /// `wait * base * (1 + uniform(0, jitter))`, capped at `max_wait`
    pub fn next_wait(&self, wait: Duration) -> Duration {
        let factor = self.base * (1.0 + rand::thread_rng().gen_range(0.0..=self.jitter));
        let next = (wait.as_secs_f64() * factor).min(self.max_wait.as_secs_f64());
        Duration::try_from_secs_f64(next).unwrap_or(self.max_wait)
    }
}

/// BPE loaded on first use and shared by every scoped copy of a gateway
struct TokenCounter {
    model: String,
    bpe: OnceLock<Option<Arc<CoreBPE>>>,
}

impl TokenCounter {
    fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            bpe: OnceLock::new(),
        }
    }

    fn count(&self, text: &str) -> usize {
        let bpe = self.bpe.get_or_init(|| {
            match tiktoken_rs::get_bpe_from_model(&self.model).or_else(|_| tiktoken_rs::cl100k_base()) {
                Ok(bpe) => Some(Arc::new(bpe)),
                Err(e) => {
                    warn!("No tokenizer available for {}: {}", self.model, e);
                    None
                }
            }
        });

        match bpe {
            Some(bpe) => bpe.encode_ordinary(text).len(),
            None => text.split_whitespace().count(),
        }
    }
}

/// Uniform client over the configured evaluator model
pub struct LlmGateway {
    provider: Arc<dyn ChatProvider>,
    model: String,
    retry: RetryPolicy,
    cache_capacity: u64,
    cache: PromptCache,
    /// Prompts served since `begin_attempt`; `None` when no attempt is open
    served: Mutex<Option<Vec<String>>>,
    tokenizer: Arc<TokenCounter>,
}

impl LlmGateway {
    /// Build a gateway for `config.model`, reading credentials from the
    /// process environment.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, GatewayError> {
        Self::from_config_with_env(config, |key| std::env::var(key).ok())
    }

    /// Same as [`from_config`](Self::from_config) with an explicit variable lookup
    pub fn from_config_with_env<F>(config: &GatewayConfig, env: F) -> Result<Self, GatewayError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let (kind, wire_model) = ProviderKind::from_model(&config.model).ok_or_else(|| {
            GatewayError::Configuration(format!(
                "Unsupported evaluator model {:?}; expected an OpenAI, Anthropic or Gemini model name",
                config.model
            ))
        })?;

        let missing: Vec<String> = kind
            .credential_vars()
            .iter()
            .filter(|var| env(var).map_or(true, |v| v.trim().is_empty()))
            .map(|var| var.to_string())
            .collect();
        if !missing.is_empty() {
            error!("Missing credentials for {}: {:?}", kind.display_name(), missing);
            return Err(GatewayError::MissingCredentials {
                provider: kind.display_name(),
                vars: missing,
            });
        }

        let api_key = env(kind.credential_vars()[0]).unwrap_or_default();
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| GatewayError::Configuration(format!("HTTP client: {}", e)))?;

        let provider: Arc<dyn ChatProvider> = match kind {
            ProviderKind::OpenAi => {
                let mut p = OpenAiProvider::new(api_key, wire_model).with_client(client);
                if let Some(url) = &config.openai_base_url {
                    p = p.with_base_url(url.clone());
                }
                Arc::new(p)
            }
            ProviderKind::Anthropic => {
                let mut p = AnthropicProvider::new(api_key, wire_model).with_client(client);
                if let Some(url) = &config.anthropic_base_url {
                    p = p.with_base_url(url.clone());
                }
                Arc::new(p)
            }
            ProviderKind::Gemini => {
                let mut p = GeminiProvider::new(api_key, wire_model).with_client(client);
                if let Some(url) = &config.gemini_base_url {
                    p = p.with_base_url(url.clone());
                }
                Arc::new(p)
            }
        };

        Self::with_provider(provider, config)
    }

    /// Build a gateway around an existing provider. Fails when the retry
    /// settings are unusable.
    pub fn with_provider(
        provider: Arc<dyn ChatProvider>,
        config: &GatewayConfig,
    ) -> Result<Self, GatewayError> {
        Ok(Self {
            provider,
            model: config.model.clone(),
            retry: RetryPolicy::from_config(config)?,
            cache_capacity: config.cache_capacity,
            cache: PromptCache::new(config.cache_capacity),
            served: Mutex::new(None),
            tokenizer: Arc::new(TokenCounter::new(&config.model)),
        })
    }

    /// A copy that shares the provider and tokenizer but starts with an empty cache
    pub fn scoped(&self) -> Self {
        Self {
            provider: Arc::clone(&self.provider),
            model: self.model.clone(),
            retry: self.retry.clone(),
            cache_capacity: self.cache_capacity,
            cache: PromptCache::new(self.cache_capacity),
            served: Mutex::new(None),
            tokenizer: Arc::clone(&self.tokenizer),
        }
    }

    /// Start recording the prompts this gateway serves
    pub fn begin_attempt(&self) {
        *self.served.lock() = Some(Vec::new());
    }

    /// Evict every prompt served since [`begin_attempt`](Self::begin_attempt),
    /// so the next request for it reaches the evaluator again
    pub async fn discard_attempt(&self) {
        let prompts = self.served.lock().take().unwrap_or_default();
        for prompt in &prompts {
            self.cache.invalidate(prompt).await;
        }
        debug!("Discarded {} cached completions", prompts.len());
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    /// Completion for `prompt`, served from the cache when this gateway has
    /// already answered the exact same prompt.
    pub async fn get_response(&self, prompt: &str) -> Result<String, GatewayError> {
        if let Some(cached) = self.cache.get(prompt).await {
            debug!("Prompt cache hit ({} chars)", prompt.len());
            self.record_served(prompt);
            return Ok(cached);
        }

        let completion = self.call_with_retry(prompt).await?;
        self.cache.insert(prompt.to_string(), completion.clone()).await;
        self.record_served(prompt);
        Ok(completion)
    }

    fn record_served(&self, prompt: &str) {
        if let Some(served) = self.served.lock().as_mut() {
            served.push(prompt.to_string());
        }
    }

    /// Number of tokens `text` occupies for the evaluator model
    pub fn get_token_count(&self, text: &str) -> usize {
        self.tokenizer.count(text)
    }

    async fn call_with_retry(&self, prompt: &str) -> Result<String, GatewayError> {
        let mut wait = self.retry.initial_wait;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=self.retry.max_attempts {
            debug!("Calling {} (attempt {}/{})", self.model, attempt, self.retry.max_attempts);

            match self.provider.complete(SYSTEM_PROMPT, prompt).await {
                Ok(text) => return Ok(text),
                Err(e) if e.is_context_length() => {
                    warn!("Prompt too long for {}: {}", self.model, e);
                    return Err(GatewayError::ContextLength(e.to_string()));
                }
                Err(e) => {
                    last_error = e.to_string();
                    if attempt < self.retry.max_attempts {
                        warn!(
                            "Evaluator call failed (attempt {}): {}; retrying in {:?}",
                            attempt, e, wait
                        );
                        tokio::time::sleep(wait).await;
                        wait = self.retry.next_wait(wait);
                    }
                }
            }
        }

        error!(
            "Evaluator {} failed after {} attempts: {}",
            self.model, self.retry.max_attempts, last_error
        );
        Err(GatewayError::Exhausted {
            model: self.model.clone(),
            attempts: self.retry.max_attempts,
            last_error,
        })
    }
}
