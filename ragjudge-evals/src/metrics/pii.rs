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

//! PII detection through an external redaction service

use super::{BinaryCheck, BinaryMetric, MetricError, MetricRequirement};
use crate::gateway::LlmGateway;
use async_trait::async_trait;
use ragjudge_core::LlmResponse;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use thiserror::Error;

/// Failures from the PII classifier
#[derive(Debug, Error)]
pub enum PiiError {
    #[error("Cannot compute PII metric: the PII service API key is INVALID")]
    InvalidCredential,

    #[error("Cannot compute PII metric: error communicating with the PII service: {0}")]
    ServiceUnreachable(String),
}

/// A labelled span of detected PII
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PiiSpan {
    pub label: String,
    #[serde(default)]
    pub start: usize,
    #[serde(default)]
    pub end: usize,
}

/// Labels PII spans in text
#[async_trait]
pub trait PiiClassifier: Send + Sync {
    async fn redact(&self, text: &str) -> Result<Vec<PiiSpan>, PiiError>;
}

/// Tonic Textual redaction API client
pub struct TextualClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

impl TextualClient {
    /// Accepted key variables, in lookup order
    pub const API_KEY_VARS: [&'static str; 2] = ["TONIC_TEXTUAL_API_KEY", "TEXTUAL_API_KEY"];

    pub fn new(api_key: String) -> Self {
        Self {
            api_key,
            base_url: "https://textual.tonic.ai".to_string(),
            client: reqwest::Client::new(),
        }
    }

    /// Client using the key from `TONIC_TEXTUAL_API_KEY`, or `TEXTUAL_API_KEY`
    pub fn from_env() -> Result<Self, MetricError> {
        Self::from_env_with(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Self::from_env) with an explicit variable lookup
    pub fn from_env_with<F>(env: F) -> Result<Self, MetricError>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::API_KEY_VARS
            .iter()
            .filter_map(|var| env(var))
            .find(|key| !key.trim().is_empty())
            .map(Self::new)
            .ok_or_else(|| {
                MetricError::InvalidConfig(format!(
                    "{} must be set in the environment to use PII metrics",
                    Self::API_KEY_VARS.join(" or ")
                ))
            })
    }

    pub fn with_base_url(mut self, base_url: String) -> Self {
        self.base_url = base_url;
        self
    }
}

#[derive(Deserialize)]
struct RedactResponse {
    #[serde(default)]
    de_identify_results: Vec<PiiSpan>,
}

#[async_trait]
impl PiiClassifier for TextualClient {
    async fn redact(&self, text: &str) -> Result<Vec<PiiSpan>, PiiError> {
        let response = self
            .client
            .post(format!("{}/api/Redact", self.base_url))
            .header("Authorization", &self.api_key)
            .json(&json!({ "text": text }))
            .send()
            .await
            .map_err(|e| PiiError::ServiceUnreachable(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(PiiError::InvalidCredential);
        }
        if !status.is_success() {
            return Err(PiiError::ServiceUnreachable(format!("status {}", status)));
        }

        let body: RedactResponse = response
            .json()
            .await
            .map_err(|e| PiiError::ServiceUnreachable(e.to_string()))?;
        Ok(body.de_identify_results)
    }
}

#[derive(Deserialize)]
struct PiiConfig {
    pii_types: Vec<String>,
}

fn normalize(pii_types: Vec<String>) -> Vec<String> {
    pii_types.into_iter().map(|t| t.to_lowercase()).collect()
}

async fn contains_any(
    classifier: &dyn PiiClassifier,
    pii_types: &[String],
    text: &str,
) -> Result<bool, MetricError> {
    let spans = classifier.redact(text).await?;
    Ok(spans
        .iter()
        .any(|span| pii_types.contains(&span.label.to_lowercase())))
}

/// The answer contains PII of one of the configured types
pub struct AnswerContainsPii {
    pii_types: Vec<String>,
    classifier: Arc<dyn PiiClassifier>,
}

pub type AnswerContainsPiiMetric = BinaryMetric<AnswerContainsPii>;

impl BinaryMetric<AnswerContainsPii> {
    pub const NAME: &'static str = "answer_contains_pii";

    pub fn new(pii_types: Vec<String>, classifier: Arc<dyn PiiClassifier>) -> Self {
        Self::from_check(
            Self::NAME,
            AnswerContainsPii {
                pii_types: normalize(pii_types),
                classifier,
            },
        )
    }

    /// Rebuild from `{"pii_types": [...]}` with a Textual client from the environment
    pub fn from_config(config: &Value) -> Result<Self, MetricError> {
        let config: PiiConfig = super::parse_config(config)?;
        Ok(Self::new(config.pii_types, Arc::new(TextualClient::from_env()?)))
    }
}

#[async_trait]
impl BinaryCheck for AnswerContainsPii {
    fn kind(&self) -> &str {
        "answer_contains_pii"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        &[MetricRequirement::LlmAnswer]
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        contains_any(self.classifier.as_ref(), &self.pii_types, &response.llm_answer).await
    }

    fn config(&self) -> Result<Value, MetricError> {
        Ok(json!({ "pii_types": self.pii_types }))
    }
}

/// The retrieved context contains PII of one of the configured types
pub struct ContextContainsPii {
    pii_types: Vec<String>,
    classifier: Arc<dyn PiiClassifier>,
}

pub type ContextContainsPiiMetric = BinaryMetric<ContextContainsPii>;

impl BinaryMetric<ContextContainsPii> {
    pub const NAME: &'static str = "context_contains_pii";

    pub fn new(pii_types: Vec<String>, classifier: Arc<dyn PiiClassifier>) -> Self {
        Self::from_check(
            Self::NAME,
            ContextContainsPii {
                pii_types: normalize(pii_types),
                classifier,
            },
        )
    }

    pub fn from_config(config: &Value) -> Result<Self, MetricError> {
        let config: PiiConfig = super::parse_config(config)?;
        Ok(Self::new(config.pii_types, Arc::new(TextualClient::from_env()?)))
    }
}

#[async_trait]
impl BinaryCheck for ContextContainsPii {
    fn kind(&self) -> &str {
        "context_contains_pii"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        &[MetricRequirement::LlmContext]
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        let context = response.llm_context_list.join("\n");
        contains_any(self.classifier.as_ref(), &self.pii_types, &context).await
    }

    fn config(&self) -> Result<Value, MetricError> {
        Ok(json!({ "pii_types": self.pii_types }))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{gateway, response};
    use super::super::Metric;
    use super::*;
    use parking_lot::Mutex;

    /// Labels "Alice" as a NAME_GIVEN span and records what it saw
    struct FakeClassifier {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl PiiClassifier for FakeClassifier {
        async fn redact(&self, text: &str) -> Result<Vec<PiiSpan>, PiiError> {
            self.seen.lock().push(text.to_string());
            Ok(text
                .match_indices("Alice")
                .map(|(start, m)| PiiSpan {
                    label: "NAME_GIVEN".to_string(),
                    start,
                    end: start + m.len(),
                })
                .collect())
        }
    }

    fn fake() -> Arc<FakeClassifier> {
        Arc::new(FakeClassifier {
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_answer_contains_pii() {
        let gw = gateway(|_| Ok(String::new()));
        let metric = AnswerContainsPiiMetric::new(vec!["name_given".to_string()], fake());

        assert_eq!(metric.score(&response("Alice lives in Paris", &[]), &gw).await.unwrap(), 1.0);
        assert_eq!(metric.score(&response("Someone lives in Paris", &[]), &gw).await.unwrap(), 0.0);

        let other_types = AnswerContainsPiiMetric::new(vec!["EMAIL_ADDRESS".to_string()], fake());
        assert_eq!(other_types.score(&response("Alice", &[]), &gw).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_context_joined_with_newlines() {
        let gw = gateway(|_| Ok(String::new()));
        let classifier = fake();
        let metric = ContextContainsPiiMetric::new(vec!["NAME_GIVEN".to_string()], classifier.clone());

        let score = metric
            .score(&response("answer", &["Bob was here", "Alice too"]), &gw)
            .await
            .unwrap();
        assert_eq!(score, 1.0);
        assert_eq!(classifier.seen.lock()[0], "Bob was here\nAlice too");
    }

    #[test]
    fn test_config_omits_credentials() {
        let metric = AnswerContainsPiiMetric::new(vec!["NAME_GIVEN".to_string()], fake());
        assert_eq!(
            metric.serialize_config().unwrap(),
            json!({"name": "answer_contains_pii", "pii_types": ["name_given"]})
        );
    }

    #[test]
    fn test_textual_key_lookup() {
        let client = TextualClient::from_env_with(|key| match key {
            "TONIC_TEXTUAL_API_KEY" => Some("tonic-key".to_string()),
            "TEXTUAL_API_KEY" => Some("short-key".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(client.api_key, "tonic-key");

        let client = TextualClient::from_env_with(|key| {
            (key == "TEXTUAL_API_KEY").then(|| "short-key".to_string())
        })
        .unwrap();
        assert_eq!(client.api_key, "short-key");

        let err = TextualClient::from_env_with(|_| Some("  ".to_string()))
            .err()
            .unwrap();
        assert!(matches!(err, MetricError::InvalidConfig(msg) if msg.contains("TONIC_TEXTUAL_API_KEY")));
    }

    #[tokio::test]
    async fn test_textual_unauthorized() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/Redact")
            .with_status(401)
            .create_async()
            .await;

        let client = TextualClient::new("bad".into()).with_base_url(server.url());
        assert!(matches!(
            client.redact("Alice").await,
            Err(PiiError::InvalidCredential)
        ));
    }

    #[tokio::test]
    async fn test_textual_server_error() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/Redact")
            .with_status(500)
            .create_async()
            .await;

        let client = TextualClient::new("key".into()).with_base_url(server.url());
        assert!(matches!(
            client.redact("Alice").await,
            Err(PiiError::ServiceUnreachable(_))
        ));
    }

    #[tokio::test]
    async fn test_textual_spans() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("POST", "/api/Redact")
            .match_header("authorization", "key")
            .with_status(200)
            .with_body(r#"{"de_identify_results":[{"label":"NAME_GIVEN","start":0,"end":5}]}"#)
            .create_async()
            .await;

        let client = TextualClient::new("key".into()).with_base_url(server.url());
        let spans = client.redact("Alice").await.unwrap();
        assert_eq!(spans[0].label, "NAME_GIVEN");
        assert_eq!(spans[0].end, 5);
    }
}
