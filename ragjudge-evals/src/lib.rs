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

//! # Ragjudge Evals
//!
//! Scoring engine for retrieval-augmented generation pipelines. Answers and
//! their retrieved context are judged by deterministic checks and by an
//! evaluator LLM, then aggregated into a [`Run`].
//!
//! ## Features
//!
//! - **LLM Gateway**: OpenAI, Anthropic and Gemini evaluators behind one
//!   call, with per-scope prompt caching and jittered exponential backoff
//! - **Metrics**: answer similarity and consistency, retrieval and
//!   augmentation precision, PII, toxicity and simple text checks
//! - **Registry**: rebuild any built-in metric from its serialized config
//! - **Scorer**: bounded concurrency, parse retries and per-metric failure
//!   isolation
//!
//! ## Example
//!
//! ```rust,ignore
//! use ragjudge_evals::{
//!     AnswerSimilarityMetric, AugmentationPrecisionMetric, Metric, RagScorer, ScorerConfig,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let metrics: Vec<Arc<dyn Metric>> = vec![
//!         Arc::new(AnswerSimilarityMetric::new()),
//!         Arc::new(AugmentationPrecisionMetric::new()),
//!     ];
//!     let scorer = RagScorer::new(metrics, ScorerConfig::load(None)?)?;
//!
//!     let run = scorer.score_responses(&responses).await?;
//!     for (metric, score) in run.overall_scores().iter() {
//!         println!("{}: {:.3}", metric, score);
//!     }
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod gateway;
pub mod llm_client;
pub mod metrics;
pub mod parsing;
pub mod prompts;
pub mod registry;
pub mod scorer;

pub use cache::{CacheStats, PromptCache};
pub use config::{GatewayConfig, ScorerConfig};
pub use gateway::{GatewayError, LlmGateway, ProviderKind, RetryPolicy};
pub use llm_client::{
    AnthropicProvider, ChatProvider, GeminiProvider, OpenAiProvider, ProviderError, SYSTEM_PROMPT,
};
pub use metrics::{
    check_requirements, AnswerConsistencyBinaryMetric, AnswerConsistencyMetric,
    AnswerContainsPiiMetric, AnswerMatchMetric, AnswerSimilarityMetric,
    AugmentationAccuracyMetric, AugmentationPrecisionMetric, BinaryCheck, BinaryMetric,
    ContainsNumbersMetric, ContainsTextMetric, ContextContainsPiiMetric, ContextLengthMetric,
    DuplicationMetric, HateSpeechContentMetric, LatencyMetric, Metric, MetricError,
    MetricRequirement, OffensiveContentMetric, PiiClassifier, PiiError, PiiSpan, RegexMetric,
    ResponseLengthMetric, RetrievalPrecisionMetric, TextualClient,
};
pub use registry::{MetricFactory, MetricRegistry, MetricSpec, RegistryError};
pub use scorer::{
    AbsentReason, AnswerGenerator, AsyncFnGenerator, BlockingFnGenerator, GeneratedAnswer,
    RagScorer, ScoreError, ScoreOutcome,
};

pub use ragjudge_core::{
    Benchmark, BenchmarkItem, LlmResponse, Run, RunData, Score, ScoreMap, ValidationError,
};
