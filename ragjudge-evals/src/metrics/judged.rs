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

//! LLM-as-judge metrics over the answer

use super::{
    binary_from_config, BinaryCheck, BinaryMetric, Metric, MetricError, MetricRequirement,
};
use crate::gateway::LlmGateway;
use crate::parsing::{parse_boolean_response, parse_bounded_float, parse_bullet_list_response};
use crate::prompts;
use async_trait::async_trait;
use ragjudge_core::LlmResponse;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

const ANSWER_AND_CONTEXT: &[MetricRequirement] =
    &[MetricRequirement::LlmAnswer, MetricRequirement::LlmContext];
const ANSWER_ONLY: &[MetricRequirement] = &[MetricRequirement::LlmAnswer];

/// Binary judge that asks a single yes/no question about the answer
macro_rules! answer_judge {
    ($(#[$doc:meta])* $check:ident, $alias:ident, $kind:literal, $prompt:path, $requirements:expr, |$verdict:ident| $map:expr) => {
        $(#[$doc])*
        #[derive(Debug, Clone, Default, Serialize, Deserialize)]
        pub struct $check {}

        pub type $alias = BinaryMetric<$check>;

        impl BinaryMetric<$check> {
            pub const NAME: &'static str = $kind;

            pub fn new() -> Self {
                Self::from_check(Self::NAME, $check {})
            }

            pub fn from_config(config: &Value) -> Result<Self, MetricError> {
                binary_from_config(config, Some(Self::NAME))
            }
        }

        impl Default for BinaryMetric<$check> {
            fn default() -> Self {
                Self::new()
            }
        }

        #[async_trait]
        impl BinaryCheck for $check {
            fn kind(&self) -> &str {
                $kind
            }

            fn requirements(&self) -> &[MetricRequirement] {
                $requirements
            }

            async fn check(
                &self,
                response: &LlmResponse,
                gateway: &LlmGateway,
            ) -> Result<bool, MetricError> {
                let reply = gateway.get_response(&$prompt(response)).await?;
                let $verdict = parse_boolean_response(&reply)?;
                Ok($map)
            }

            fn config(&self) -> Result<Value, MetricError> {
                Ok(json!({}))
            }
        }
    };
}

fn unsupported_prompt(response: &LlmResponse) -> String {
    prompts::answer_contains_unsupported_information(&response.llm_answer, &response.llm_context_list)
}

fn duplication_prompt(response: &LlmResponse) -> String {
    prompts::contains_duplicate_information(&response.llm_answer)
}

fn hate_speech_prompt(response: &LlmResponse) -> String {
    prompts::contains_hate_speech(&response.llm_answer)
}

fn offensive_prompt(response: &LlmResponse) -> String {
    prompts::is_offensive(&response.llm_answer)
}

answer_judge!(
    /// The answer contains nothing that the context does not support
    AnswerConsistencyBinary,
    AnswerConsistencyBinaryMetric,
    "answer_consistency_binary",
    unsupported_prompt,
    ANSWER_AND_CONTEXT,
    |contains_unsupported| !contains_unsupported
);

answer_judge!(
    /// The answer repeats information
    Duplication,
    DuplicationMetric,
    "duplication_metric",
    duplication_prompt,
    ANSWER_ONLY,
    |duplicated| duplicated
);

answer_judge!(
    /// The answer contains hate speech
    HateSpeechContent,
    HateSpeechContentMetric,
    "hate_speech_content",
    hate_speech_prompt,
    ANSWER_ONLY,
    |hateful| hateful
);

answer_judge!(
    /// The answer is offensive
    OffensiveContent,
    OffensiveContentMetric,
    "offensive_content",
    offensive_prompt,
    ANSWER_ONLY,
    |offensive| offensive
);

/// Fraction of the answer's main points that can be derived from the context
#[derive(Debug, Clone, Default)]
pub struct AnswerConsistencyMetric;

impl AnswerConsistencyMetric {
    pub const NAME: &'static str = "answer_consistency";

    pub fn new() -> Self {
        Self
    }

    pub fn from_config(_config: &Value) -> Result<Self, MetricError> {
        Ok(Self)
    }
}

#[async_trait]
impl Metric for AnswerConsistencyMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> &str {
        Self::NAME
    }

    fn requirements(&self) -> &[MetricRequirement] {
        ANSWER_AND_CONTEXT
    }

    async fn score(&self, response: &LlmResponse, gateway: &LlmGateway) -> Result<f64, MetricError> {
        let reply = gateway
            .get_response(&prompts::main_points(&response.llm_answer))
            .await?;
        let main_points = parse_bullet_list_response(&reply)?;

        let mut derived = 0usize;
        for point in &main_points {
            let verdict = gateway
                .get_response(&prompts::statement_derived_from_context(
                    point,
                    &response.llm_context_list,
                ))
                .await?;
            if parse_boolean_response(&verdict)? {
                derived += 1;
            }
        }

        debug!("{}/{} main points derivable from context", derived, main_points.len());
        Ok(derived as f64 / main_points.len() as f64)
    }

    fn serialize_config(&self) -> Result<Value, MetricError> {
        Ok(json!({}))
    }
}

/// Evaluator rating (0 to 5) of how well the answer matches the reference
#[derive(Debug, Clone, Default)]
pub struct AnswerSimilarityMetric;

impl AnswerSimilarityMetric {
    pub const NAME: &'static str = "answer_similarity";
    pub const MAX_SCORE: f64 = 5.0;

    pub fn new() -> Self {
        Self
    }

    pub fn from_config(_config: &Value) -> Result<Self, MetricError> {
        Ok(Self)
    }
}

#[async_trait]
impl Metric for AnswerSimilarityMetric {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn kind(&self) -> &str {
        Self::NAME
    }

    fn requirements(&self) -> &[MetricRequirement] {
        &[
            MetricRequirement::Question,
            MetricRequirement::ReferenceAnswer,
            MetricRequirement::LlmAnswer,
        ]
    }

    async fn score(&self, response: &LlmResponse, gateway: &LlmGateway) -> Result<f64, MetricError> {
        let reference = response.benchmark_item.answer().ok_or_else(|| {
            MetricError::MissingData("answer_similarity requires a reference answer".into())
        })?;

        let reply = gateway
            .get_response(&prompts::similarity_score(
                response.benchmark_item.question(),
                reference,
                &response.llm_answer,
            ))
            .await?;
        parse_bounded_float(&reply, 0.0, Self::MAX_SCORE)
    }

    fn serialize_config(&self) -> Result<Value, MetricError> {
        Ok(json!({}))
    }
}

#[cfg(test)]
mod tests {
    use super::super::test_support::{gateway, gateway_for, response, StubProvider};
    use super::*;
    use ragjudge_core::BenchmarkItem;
    use std::sync::Arc;

    #[tokio::test]
    async fn test_consistency_binary_inverts_verdict() {
        let metric = AnswerConsistencyBinaryMetric::new();
        let resp = response("Paris", &["Paris is the capital of France."]);

        let unsupported = gateway(|_| Ok("true".into()));
        assert_eq!(metric.score(&resp, &unsupported).await.unwrap(), 0.0);

        let supported = gateway(|_| Ok("False".into()));
        assert_eq!(metric.score(&resp, &supported).await.unwrap(), 1.0);
        assert_eq!(metric.name(), "answer_consistency_binary");
    }

    #[tokio::test]
    async fn test_single_question_judges() {
        let gw = gateway(|prompt| {
            Ok(if prompt.contains("repeats the same information") {
                "true".into()
            } else {
                "false".into()
            })
        });
        let resp = response("Paris. Paris.", &[]);

        assert_eq!(DuplicationMetric::new().score(&resp, &gw).await.unwrap(), 1.0);
        assert_eq!(HateSpeechContentMetric::new().score(&resp, &gw).await.unwrap(), 0.0);
        assert_eq!(OffensiveContentMetric::new().score(&resp, &gw).await.unwrap(), 0.0);
    }

    #[tokio::test]
    async fn test_unparseable_verdict_is_parse_error() {
        let gw = gateway(|_| Ok("I cannot say".into()));
        let err = DuplicationMetric::new()
            .score(&response("Paris", &[]), &gw)
            .await
            .unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_answer_consistency_fraction() {
        let provider = StubProvider::new(|prompt| {
            if prompt.contains("main points") {
                Ok("* Paris is the capital\n* Paris has 2 million people\n* It rains".into())
            } else if prompt.contains("STATEMENT:\nIt rains") {
                Ok("false".into())
            } else {
                Ok("true".into())
            }
        });
        let gw = gateway_for(provider.clone());

        let score = AnswerConsistencyMetric::new()
            .score(&response("answer", &["context"]), &gw)
            .await
            .unwrap();
        assert!((score - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(provider.calls(), 4);
    }

    #[tokio::test]
    async fn test_answer_consistency_zero_points() {
        let gw = gateway(|_| Ok("There are no main points.".into()));
        let err = AnswerConsistencyMetric::new()
            .score(&response("answer", &["context"]), &gw)
            .await
            .unwrap_err();
        assert!(matches!(err, MetricError::Parse(_)));
    }

    #[tokio::test]
    async fn test_answer_similarity_range() {
        let metric = AnswerSimilarityMetric::new();
        let resp = response("Paris", &[]);

        assert_eq!(metric.score(&resp, &gateway(|_| Ok("4".into()))).await.unwrap(), 4.0);
        assert!(matches!(
            metric.score(&resp, &gateway(|_| Ok("6".into()))).await,
            Err(MetricError::Parse(_))
        ));
        assert!(matches!(
            metric.score(&resp, &gateway(|_| Ok("very similar".into()))).await,
            Err(MetricError::Parse(_))
        ));
    }

    #[tokio::test]
    async fn test_answer_similarity_needs_reference() {
        let resp = LlmResponse::new("Paris", vec![], Arc::new(BenchmarkItem::new("capital?")));
        let err = AnswerSimilarityMetric::new()
            .score(&resp, &gateway(|_| Ok("5".into())))
            .await
            .unwrap_err();
        assert!(matches!(err, MetricError::MissingData(_)));
    }
}
