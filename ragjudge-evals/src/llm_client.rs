// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Chat-completion providers used by the gateway

use async_trait::async_trait;
use serde_json::{json, Value};
use thiserror::Error;

/// System instruction sent with every evaluator call
pub const SYSTEM_PROMPT: &str = "You are a helpful assistant responding in markdown";

const CONTEXT_LENGTH_MARKERS: &[&str] = &[
    "context_length_exceeded",
    "maximum context length",
    "prompt is too long",
    "exceeds the maximum number of tokens",
    "too many tokens",
];

/// A backend that turns a system + user message pair into a completion
#[async_trait]
pub trait ChatProvider: Send + Sync {
    /// Request a completion at temperature 0
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError>;

    /// Model identifier sent on the wire
    fn model_name(&self) -> &str;
}

/// Classified provider failures
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Prompt exceeds the model context window: {0}")]
    ContextTooLong(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Provider returned no completion text")]
    EmptyResponse,

    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl ProviderError {
    /// Map a non-success HTTP status and body to a failure class
    pub fn from_status(status: u16, body: String) -> Self {
        let lower = body.to_lowercase();
        match status {
            429 => ProviderError::RateLimited(body),
            400 | 413 if CONTEXT_LENGTH_MARKERS.iter().any(|m| lower.contains(m)) => {
                ProviderError::ContextTooLong(body)
            }
            400..=499 => ProviderError::BadRequest(body),
            _ => ProviderError::Api {
                status,
                message: body,
            },
        }
    }

    pub fn is_context_length(&self) -> bool {
        matches!(self, ProviderError::ContextTooLong(_))
    }
}

async fn check_status(response: reqwest::Response) -> Result<Value, ProviderError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(ProviderError::from_status(status.as_u16(), body));
    }
    Ok(response.json().await?)
}

fn non_empty(text: Option<&str>) -> Result<String, ProviderError> {
    match text {
        Some(t) if !t.trim().is_empty() => Ok(t.to_string()),
        _ => Err(ProviderError::EmptyResponse),
    }
}

/// OpenAI chat completions client
pub struct OpenAiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.openai.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl ChatProvider for OpenAiProvider {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = json!({
            "model": self.model,
            "messages": [
                { "role": "system", "content": system },
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.0
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let data = check_status(response).await?;
        non_empty(data["choices"][0]["message"]["content"].as_str())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Anthropic messages client
pub struct AnthropicProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl AnthropicProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://api.anthropic.com/v1".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl ChatProvider for AnthropicProvider {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = json!({
            "model": self.model,
            "max_tokens": 4096,
            "system": system,
            "messages": [
                { "role": "user", "content": prompt }
            ],
            "temperature": 0.0
        });

        let response = self
            .client
            .post(format!("{}/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", "2023-06-01")
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let data = check_status(response).await?;
        non_empty(data["content"][0]["text"].as_str())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

/// Google Gemini generateContent client
pub struct GeminiProvider {
    api_key: String,
    model: String,
    base_url: String,
    client: reqwest::Client,
}

impl GeminiProvider {
    pub fn new(api_key: String, model: String) -> Self {
        Self {
            api_key,
            model,
            base_url: "https://generativelanguage.googleapis.com/v1beta".to_string(),
            client: reqwest::Client::new(),
        }
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }

    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }
}

#[async_trait]
impl ChatProvider for GeminiProvider {
    async fn complete(&self, system: &str, prompt: &str) -> Result<String, ProviderError> {
        let request = json!({
            "system_instruction": { "parts": [{ "text": system }] },
            "contents": [
                { "role": "user", "parts": [{ "text": prompt }] }
            ],
            "generationConfig": { "temperature": 0.0 }
        });

        let response = self
            .client
            .post(format!(
                "{}/models/{}:generateContent",
                self.base_url, self.model
            ))
            .header("x-goog-api-key", &self.api_key)
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        let data = check_status(response).await?;
        non_empty(data["candidates"][0]["content"]["parts"][0]["text"].as_str())
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(matches!(
            ProviderError::from_status(429, "slow down".into()),
            ProviderError::RateLimited(_)
        ));
        assert!(ProviderError::from_status(
            400,
            r#"{"error":{"code":"context_length_exceeded"}}"#.into()
        )
        .is_context_length());
        assert!(ProviderError::from_status(400, "prompt is too long: 250000 tokens".into())
            .is_context_length());
        assert!(matches!(
            ProviderError::from_status(401, "bad key".into()),
            ProviderError::BadRequest(_)
        ));
        assert!(matches!(
            ProviderError::from_status(503, "overloaded".into()),
            ProviderError::Api { status: 503, .. }
        ));
    }

    #[tokio::test]
    async fn test_openai_wire_format() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/chat/completions")
            .match_header("authorization", "Bearer sk-test")
            .match_body(mockito::Matcher::PartialJson(json!({
                "model": "gpt-4o-mini",
                "temperature": 0.0,
                "messages": [
                    { "role": "system", "content": SYSTEM_PROMPT },
                    { "role": "user", "content": "Is Paris in France?" }
                ]
            })))
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":"true"}}]}"#)
            .create_async()
            .await;

        let provider = OpenAiProvider::new("sk-test".into(), "gpt-4o-mini".into())
            .with_base_url(server.url());
        let text = provider
            .complete(SYSTEM_PROMPT, "Is Paris in France?")
            .await
            .unwrap();

        assert_eq!(text, "true");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_openai_empty_content() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/chat/completions")
            .with_status(200)
            .with_body(r#"{"choices":[{"message":{"content":null}}]}"#)
            .create_async()
            .await;

        let provider =
            OpenAiProvider::new("sk-test".into(), "gpt-4o".into()).with_base_url(server.url());
        let err = provider.complete(SYSTEM_PROMPT, "hi").await.unwrap_err();
        assert!(matches!(err, ProviderError::EmptyResponse));
    }

    #[tokio::test]
    async fn test_anthropic_context_length() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/messages")
            .match_header("x-api-key", "ant-test")
            .match_header("anthropic-version", "2023-06-01")
            .with_status(400)
            .with_body(r#"{"type":"error","error":{"message":"prompt is too long"}}"#)
            .create_async()
            .await;

        let provider = AnthropicProvider::new("ant-test".into(), "claude-3-5-haiku".into())
            .with_base_url(server.url());
        let err = provider.complete(SYSTEM_PROMPT, "long").await.unwrap_err();
        assert!(err.is_context_length());
    }

    #[tokio::test]
    async fn test_gemini_response_text() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/models/gemini-1.5-pro:generateContent")
            .match_header("x-goog-api-key", "g-test")
            .with_status(200)
            .with_body(r#"{"candidates":[{"content":{"parts":[{"text":"4"}]}}]}"#)
            .create_async()
            .await;

        let provider = GeminiProvider::new("g-test".into(), "gemini-1.5-pro".into())
            .with_base_url(server.url());
        assert_eq!(provider.complete(SYSTEM_PROMPT, "rate").await.unwrap(), "4");
    }
}
