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

//! Retrieval and augmentation metrics
//!
//! Each judges the retrieved context chunk by chunk:
//! - Retrieval precision: share of chunks relevant to the question
//! - Augmentation accuracy: share of chunks whose content made it into the answer
//! - Augmentation precision: share of relevant chunks that made it into the answer
//!
//! Augmentation precision reuses the per-chunk labels of the other two; within
//! one gateway scope the evaluator calls are served from the prompt cache.

use super::{Metric, MetricError, MetricRequirement};
use crate::gateway::LlmGateway;
use crate::parsing::parse_boolean_response;
use crate::prompts;
use async_trait::async_trait;
use ragjudge_core::LlmResponse;
use serde_json::{json, Value};

fn require_context(metric: &str, response: &LlmResponse) -> Result<(), MetricError> {
    if response.llm_context_list.is_empty() {
        return Err(MetricError::MissingData(format!(
            "{} requires at least one context chunk",
            metric
        )));
    }
    Ok(())
}

fn fraction_true(labels: &[bool]) -> f64 {
    labels.iter().filter(|l| **l).count() as f64 / labels.len() as f64
}

/// Share of retrieved chunks the evaluator judges relevant to the question
#[derive(Debug, Clone, Default)]
pub struct RetrievalPrecisionMetric;

impl RetrievalPrecisionMetric {
    pub const NAME: &'static str = "retrieval_precision";

    pub fn new() -> Self {
        Self
    }

    pub fn from_config(_config: &Value) -> Result<Self, MetricError> {
        Ok(Self)
    }

    /// Score plus the relevance label of every chunk, in context order
    pub async fn calculate_metric(
        &self,
        response: &LlmResponse,
        gateway: &LlmGateway,
    ) -> Result<(f64, Vec<bool>), MetricError> {
        require_context(Self::NAME, response)?;

        let question = response.benchmark_item.question();
        let mut labels = Vec::with_capacity(response.llm_context_list.len());
        for chunk in &response.llm_context_list {
            let reply = gateway
                .get_response(&prompts::context_relevancy(question, chunk))
                .await?;
            labels.push(parse_boolean_response(&reply)?);
        }

        Ok((fraction_true(&labels), labels))
    }
}

#[async_trait]
impl Metric for RetrievalPrecisionMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> &str {
        Self::NAME
    }

    fn requirements(&self) -> &[MetricRequirement] {
        &[MetricRequirement::Question, MetricRequirement::LlmContext]
    }

    async fn score(&self, response: &LlmResponse, gateway: &LlmGateway) -> Result<f64, MetricError> {
        Ok(self.calculate_metric(response, gateway).await?.0)
    }

    fn serialize_config(&self) -> Result<Value, MetricError> {
        Ok(json!({}))
    }
}

/// Share of retrieved chunks whose information appears in the answer
#[derive(Debug, Clone, Default)]
pub struct AugmentationAccuracyMetric;

impl AugmentationAccuracyMetric {
    pub const NAME: &'static str = "augmentation_accuracy";

    pub fn new() -> Self {
        Self
    }

    pub fn from_config(_config: &Value) -> Result<Self, MetricError> {
        Ok(Self)
    }

    /// Score plus the containment label of every chunk, in context order
    pub async fn calculate_metric(
        &self,
        response: &LlmResponse,
        gateway: &LlmGateway,
    ) -> Result<(f64, Vec<bool>), MetricError> {
        require_context(Self::NAME, response)?;

        let mut labels = Vec::with_capacity(response.llm_context_list.len());
        for chunk in &response.llm_context_list {
            let reply = gateway
                .get_response(&prompts::answer_contains_context(&response.llm_answer, chunk))
                .await?;
            labels.push(parse_boolean_response(&reply)?);
        }

        Ok((fraction_true(&labels), labels))
    }
}

#[async_trait]
impl Metric for AugmentationAccuracyMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> &str {
        Self::NAME
    }

    fn requirements(&self) -> &[MetricRequirement] {
        &[MetricRequirement::LlmAnswer, MetricRequirement::LlmContext]
    }

    async fn score(&self, response: &LlmResponse, gateway: &LlmGateway) -> Result<f64, MetricError> {
        Ok(self.calculate_metric(response, gateway).await?.0)
    }

    fn serialize_config(&self) -> Result<Value, MetricError> {
        Ok(json!({}))
    }
}

/// Share of relevant chunks whose information appears in the answer
#[derive(Debug, Clone, Default)]
pub struct AugmentationPrecisionMetric {
    retrieval_precision: RetrievalPrecisionMetric,
    augmentation_accuracy: AugmentationAccuracyMetric,
}

impl AugmentationPrecisionMetric {
    pub const NAME: &'static str = "augmentation_precision";

    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(_config: &Value) -> Result<Self, MetricError> {
        Ok(Self::default())
    }

    /// `(relevant and contained) / relevant`, or 0.0 when nothing is relevant
    pub fn score_from_context_labels(relevance: &[bool], containment: &[bool]) -> f64 {
        let mut relevant = 0usize;
        let mut relevant_and_contained = 0usize;
        for (is_relevant, is_contained) in relevance.iter().zip(containment) {
            if *is_relevant {
                relevant += 1;
                if *is_contained {
                    relevant_and_contained += 1;
                }
            }
        }

        if relevant == 0 {
            return 0.0;
        }
        relevant_and_contained as f64 / relevant as f64
    }
}

#[async_trait]
impl Metric for AugmentationPrecisionMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> &str {
        Self::NAME
    }

    fn requirements(&self) -> &[MetricRequirement] {
        &[
            MetricRequirement::Question,
            MetricRequirement::LlmAnswer,
            MetricRequirement::LlmContext,
        ]
    }

    async fn score(&self, response: &LlmResponse, gateway: &LlmGateway) -> Result<f64, MetricError> {
        let (_, relevance) = self
            .retrieval_precision
            .calculate_metric(response, gateway)
            .await?;
        let (_, containment) = self
            .augmentation_accuracy
            .calculate_metric(response, gateway)
            .await?;
        Ok(Self::score_from_context_labels(&relevance, &containment))
    }

    fn serialize_config(&self) -> Result<Value, MetricError> {
        Ok(json!({}))
    }
}
