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

//! Metrics: the [`Metric`] trait, the [`BinaryMetric`] adapter and the
//! built-in metric implementations.

use crate::gateway::{GatewayError, LlmGateway};
use async_trait::async_trait;
use ragjudge_core::LlmResponse;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

pub mod context;
pub mod deterministic;
pub mod judged;
pub mod latency;
pub mod pii;

pub use context::{AugmentationAccuracyMetric, AugmentationPrecisionMetric, RetrievalPrecisionMetric};
pub use deterministic::{
    AnswerMatch, AnswerMatchMetric, ContainsNumbers, ContainsNumbersMetric, ContainsText,
    ContainsTextMetric, ContextLength, ContextLengthMetric, RegexCheck, RegexMetric,
    ResponseLength, ResponseLengthMetric,
};
pub use judged::{
    AnswerConsistencyBinary, AnswerConsistencyBinaryMetric, AnswerConsistencyMetric,
    AnswerSimilarityMetric, Duplication, DuplicationMetric, HateSpeechContent,
    HateSpeechContentMetric, OffensiveContent, OffensiveContentMetric,
};
pub use latency::LatencyMetric;
pub use pii::{
    AnswerContainsPii, AnswerContainsPiiMetric, ContextContainsPii, ContextContainsPiiMetric,
    PiiClassifier, PiiError, PiiSpan, TextualClient,
};

/// Response fields a metric reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricRequirement {
    Question,
    ReferenceAnswer,
    LlmAnswer,
    LlmContext,
    RunTime,
}

impl MetricRequirement {
    pub fn is_met(self, response: &LlmResponse) -> bool {
        match self {
            Self::Question => !response.benchmark_item.question().is_empty(),
            Self::ReferenceAnswer => response.benchmark_item.answer().is_some(),
            Self::LlmAnswer => true,
            Self::LlmContext => !response.llm_context_list.is_empty(),
            Self::RunTime => response.run_time.is_some(),
        }
    }
}

impl fmt::Display for MetricRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Question => "question",
            Self::ReferenceAnswer => "reference answer",
            Self::LlmAnswer => "LLM answer",
            Self::LlmContext => "LLM context",
            Self::RunTime => "run time",
        };
        f.write_str(s)
    }
}

/// Errors raised while scoring a metric
#[derive(Debug, Error)]
pub enum MetricError {
    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error("Could not parse evaluator response: {0}")]
    Parse(String),

    #[error("Missing required data: {0}")]
    MissingData(String),

    #[error(transparent)]
    Pii(#[from] PiiError),

    #[error("Invalid metric config: {0}")]
    InvalidConfig(String),

    #[error("Cannot serialize metric {0}: it wraps a custom check")]
    NotSerializable(String),

    #[error("Check failed: {0}")]
    Check(String),
}

impl MetricError {
    /// Whether scoring again may succeed. Only evaluator output problems
    /// qualify; gateway, data and credential failures are terminal.
    pub fn is_retryable(&self) -> bool {
        matches!(self, MetricError::Parse(_) | MetricError::Check(_))
    }
}

/// A single evaluation criterion
#[async_trait]
pub trait Metric: Send + Sync {
    /// Key under which scores are reported
    fn name(&self) -> &str;

    /// Registry identifier used to rebuild the metric from its config
    fn kind(&self) -> &str;

    fn requirements(&self) -> &[MetricRequirement];

    async fn score(&self, response: &LlmResponse, gateway: &LlmGateway) -> Result<f64, MetricError>;

    /// Config that the registry factory for [`kind`](Metric::kind) accepts
    fn serialize_config(&self) -> Result<Value, MetricError>;
}

/// Fail with [`MetricError::MissingData`] naming the first unmet requirement
pub fn check_requirements(metric: &dyn Metric, response: &LlmResponse) -> Result<(), MetricError> {
    match metric
        .requirements()
        .iter()
        .find(|req| !req.is_met(response))
    {
        Some(req) => Err(MetricError::MissingData(format!(
            "{} requires a {}",
            metric.name(),
            req
        ))),
        None => Ok(()),
    }
}

/// Deserialize a metric config, treating `null` as an empty object
pub(crate) fn parse_config<T: DeserializeOwned>(config: &Value) -> Result<T, MetricError> {
    let config = if config.is_null() {
        Value::Object(Default::default())
    } else {
        config.clone()
    };
    serde_json::from_value(config).map_err(|e| MetricError::InvalidConfig(e.to_string()))
}

/// A yes/no criterion. Wrapped by [`BinaryMetric`] to score 1.0 or 0.0.
#[async_trait]
pub trait BinaryCheck: Send + Sync {
    fn kind(&self) -> &str;

    fn requirements(&self) -> &[MetricRequirement];

    async fn check(&self, response: &LlmResponse, gateway: &LlmGateway) -> Result<bool, MetricError>;

    /// Check-specific config fields, without the metric name
    fn config(&self) -> Result<Value, MetricError>;
}

/// Metric scoring `1.0` when its check holds and `0.0` otherwise
pub struct BinaryMetric<C> {
    name: String,
    check: C,
}

impl<C: BinaryCheck> BinaryMetric<C> {
    pub fn from_check(name: impl Into<String>, check: C) -> Self {
        Self {
            name: name.into(),
            check,
        }
    }

    pub fn check(&self) -> &C {
        &self.check
    }
}

#[async_trait]
impl<C: BinaryCheck> Metric for BinaryMetric<C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &str {
        self.check.kind()
    }

    fn requirements(&self) -> &[MetricRequirement] {
        self.check.requirements()
    }

    async fn score(&self, response: &LlmResponse, gateway: &LlmGateway) -> Result<f64, MetricError> {
        let passed = self.check.check(response, gateway).await?;
        Ok(if passed { 1.0 } else { 0.0 })
    }

    fn serialize_config(&self) -> Result<Value, MetricError> {
        let mut config = self.check.config()?;
        match config.as_object_mut() {
            Some(fields) => {
                fields.insert("name".to_string(), Value::String(self.name.clone()));
            }
            None => {
                config = serde_json::json!({ "name": self.name });
            }
        }
        Ok(config)
    }
}

/// Rebuild a named check from `{"name": ..., <check fields>}`
pub(crate) fn binary_from_config<C>(
    config: &Value,
    default_name: Option<&str>,
) -> Result<BinaryMetric<C>, MetricError>
where
    C: BinaryCheck + DeserializeOwned,
{
    let check: C = parse_config(config)?;
    let name = match config.get("name").and_then(Value::as_str) {
        Some(name) => name.to_string(),
        None => default_name
            .map(str::to_string)
            .ok_or_else(|| MetricError::InvalidConfig("missing field `name`".to_string()))?,
    };
    Ok(BinaryMetric::from_check(name, check))
}

type CheckFn = dyn Fn(&LlmResponse) -> bool + Send + Sync;

/// A check backed by a caller-supplied closure. Cannot be serialized.
pub struct FnCheck {
    requirements: Vec<MetricRequirement>,
    f: Arc<CheckFn>,
}

#[async_trait]
impl BinaryCheck for FnCheck {
    fn kind(&self) -> &str {
        "binary"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        &self.requirements
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        Ok((self.f)(response))
    }

    fn config(&self) -> Result<Value, MetricError> {
        Err(MetricError::NotSerializable("custom binary metric".to_string()))
    }
}

impl BinaryMetric<FnCheck> {
    /// Custom binary metric from a closure over the response
    pub fn from_fn<F>(name: impl Into<String>, requirements: Vec<MetricRequirement>, f: F) -> Self
    where
        F: Fn(&LlmResponse) -> bool + Send + Sync + 'static,
    {
        Self::from_check(
            name,
            FnCheck {
                requirements,
                f: Arc::new(f),
            },
        )
    }
}
