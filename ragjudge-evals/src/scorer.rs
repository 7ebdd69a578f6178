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

//! Scoring engine
//!
//! [`RagScorer`] scores a batch of responses against a set of metrics and
//! aggregates the results into a [`Run`].
//!
//! - Responses are scored concurrently, bounded by `scoring_parallelism`;
//!   metrics for one response run in order on one gateway scope, so a prompt
//!   shared by two metrics is sent once.
//! - Evaluator replies that cannot be parsed are re-scored up to
//!   `max_parsing_retries` times, and the prompts a failed attempt read are
//!   evicted so the evaluator is sampled again. Gateway, data and credential
//!   failures are terminal.
//! - A failed score is recorded as absent unless `fail_on_error` is set. The
//!   same holds for an item whose answer could not be generated.
//! - `run_data` keeps input order regardless of completion order.

use crate::config::ScorerConfig;
use crate::gateway::{GatewayError, LlmGateway};
use crate::metrics::{check_requirements, Metric, MetricError};
use crate::registry::{MetricRegistry, RegistryError};
use async_trait::async_trait;
use futures::future::join_all;
use ragjudge_core::{Benchmark, BenchmarkItem, LlmResponse, Run, RunData, Score, ScoreMap};
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{debug, info, warn};

/// Errors surfaced by the scoring engine
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error("Metric {metric} failed on item {index}: {source}")]
    Metric {
        metric: String,
        index: usize,
        #[source]
        source: MetricError,
    },

    #[error("Metric {metric} failed on item {index} after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        metric: String,
        index: usize,
        attempts: u32,
        last_error: String,
    },

    #[error("Answer generator returned an invalid shape for item {index}: {reason}")]
    Schema { index: usize, reason: String },

    #[error("Answer generator failed for item {index}: {source}")]
    Generator {
        index: usize,
        #[source]
        source: anyhow::Error,
    },

    #[error("Invalid scorer configuration: {0}")]
    Config(String),

    #[error("Metric name {0:?} is used by more than one metric")]
    DuplicateMetric(String),

    #[error(transparent)]
    Gateway(#[from] GatewayError),

    #[error(transparent)]
    Registry(#[from] RegistryError),
}

/// Why a score was recorded as absent
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbsentReason {
    /// The response lacks a field the metric requires
    MissingData,
    /// The evaluator call failed after the gateway's own retries
    GatewayFailure,
    /// Every parse attempt failed
    RetriesExhausted,
    /// The answer generator failed or returned the wrong shape
    GenerationFailed,
    /// Any other non-retryable metric failure
    Terminal,
}

/// Final state of one metric on one response
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ScoreOutcome {
    Scored(f64),
    Absent(AbsentReason),
}

impl ScoreOutcome {
    pub fn score(self) -> Option<f64> {
        match self {
            ScoreOutcome::Scored(score) => Some(score),
            ScoreOutcome::Absent(_) => None,
        }
    }
}

/// Shape the answer generator must return
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct GeneratedAnswer {
    pub llm_answer: String,
    pub llm_context_list: Vec<String>,
}

/// The system under test: produces an answer and its retrieved context for a question
#[async_trait]
pub trait AnswerGenerator: Send + Sync {
    /// Must return `{"llm_answer": string, "llm_context_list": [string]}`
    async fn generate(&self, question: &str) -> anyhow::Result<Value>;
}

/// Generator backed by an async closure
pub struct AsyncFnGenerator<F> {
    f: F,
}

impl<F, Fut> AsyncFnGenerator<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }
}

#[async_trait]
impl<F, Fut> AnswerGenerator for AsyncFnGenerator<F>
where
    F: Fn(String) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<Value>> + Send,
{
    async fn generate(&self, question: &str) -> anyhow::Result<Value> {
        (self.f)(question.to_string()).await
    }
}

/// Generator backed by a synchronous closure, run on the blocking pool
pub struct BlockingFnGenerator<F> {
    f: Arc<F>,
}

impl<F> BlockingFnGenerator<F>
where
    F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f: Arc::new(f) }
    }
}

#[async_trait]
impl<F> AnswerGenerator for BlockingFnGenerator<F>
where
    F: Fn(&str) -> anyhow::Result<Value> + Send + Sync + 'static,
{
    async fn generate(&self, question: &str) -> anyhow::Result<Value> {
        let f = Arc::clone(&self.f);
        let question = question.to_string();
        tokio::task::spawn_blocking(move || f(&question))
            .await
            .map_err(|e| anyhow::anyhow!("Answer generator task failed: {}", e))?
    }
}

/// Scores LLM responses against a fixed set of metrics
pub struct RagScorer {
    metrics: Vec<Arc<dyn Metric>>,
    config: ScorerConfig,
    gateway: LlmGateway,
}

impl RagScorer {
    /// Scorer using the evaluator named in `config.gateway`. Fails when the
    /// model is unsupported or its credentials are missing.
    pub fn new(metrics: Vec<Arc<dyn Metric>>, config: ScorerConfig) -> Result<Self, ScoreError> {
        Self::validate(&metrics, &config)?;
        let gateway = LlmGateway::from_config(&config.gateway)?;
        Self::with_gateway(metrics, config, gateway)
    }

    /// Scorer using an existing gateway
    pub fn with_gateway(
        metrics: Vec<Arc<dyn Metric>>,
        config: ScorerConfig,
        gateway: LlmGateway,
    ) -> Result<Self, ScoreError> {
        Self::validate(&metrics, &config)?;
        Ok(Self {
            metrics,
            config,
            gateway,
        })
    }

    /// Reject unusable settings and metrics that would share a score key
    fn validate(metrics: &[Arc<dyn Metric>], config: &ScorerConfig) -> Result<(), ScoreError> {
        config
            .validate()
            .map_err(|e| ScoreError::Config(e.to_string()))?;

        let mut seen = HashSet::new();
        for metric in metrics {
            if !seen.insert(metric.name()) {
                return Err(ScoreError::DuplicateMetric(metric.name().to_string()));
            }
        }
        Ok(())
    }

    /// Scorer whose metrics are built from `config.metrics` by the built-in registry
    pub fn from_config(config: ScorerConfig) -> Result<Self, ScoreError> {
        let metrics = MetricRegistry::with_builtins().build_all(&config.metrics)?;
        Self::new(metrics, config)
    }

    pub fn metrics(&self) -> &[Arc<dyn Metric>] {
        &self.metrics
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    /// Generate an answer for every benchmark item, then score them.
    ///
    /// An item whose generator call fails is kept in the run with every
    /// metric absent, unless `fail_on_error` is set.
    pub async fn score(
        &self,
        benchmark: &Benchmark,
        generator: &dyn AnswerGenerator,
    ) -> Result<Run, ScoreError> {
        let semaphore = Semaphore::new(self.config.callback_parallelism.max(1));

        let calls = benchmark.iter().enumerate().map(|(index, item)| {
            let semaphore = &semaphore;
            async move {
                let _permit = semaphore.acquire().await.ok();
                self.generate(index, item, generator).await
            }
        });

        let mut responses = Vec::with_capacity(benchmark.len());
        let mut failed = HashSet::new();
        for (index, (item, generated)) in benchmark.iter().zip(join_all(calls).await).enumerate() {
            match generated {
                Ok(response) => responses.push(response),
                Err(e) if self.config.fail_on_error => return Err(e),
                Err(e) => {
                    if self.config.quiet {
                        debug!("Item {} left unscored: {}", index, e);
                    } else {
                        warn!("Item {} left unscored: {}", index, e);
                    }
                    failed.insert(index);
                    responses.push(LlmResponse::new("", Vec::new(), Arc::clone(item)));
                }
            }
        }

        self.score_batch(&responses, &failed).await
    }

    async fn generate(
        &self,
        index: usize,
        item: &Arc<BenchmarkItem>,
        generator: &dyn AnswerGenerator,
    ) -> Result<LlmResponse, ScoreError> {
        let started = Instant::now();
        let raw = generator
            .generate(item.question())
            .await
            .map_err(|source| ScoreError::Generator { index, source })?;
        let run_time = started.elapsed().as_secs_f64();

        let answer: GeneratedAnswer = serde_json::from_value(raw).map_err(|e| ScoreError::Schema {
            index,
            reason: e.to_string(),
        })?;

        Ok(
            LlmResponse::new(answer.llm_answer, answer.llm_context_list, Arc::clone(item))
                .with_run_time(run_time),
        )
    }

    /// Score pre-built responses
    pub async fn score_responses(&self, responses: &[LlmResponse]) -> Result<Run, ScoreError> {
        self.score_batch(responses, &HashSet::new()).await
    }

    /// Score `responses`; indices in `unscored` get an absent score for every metric
    async fn score_batch(
        &self,
        responses: &[LlmResponse],
        unscored: &HashSet<usize>,
    ) -> Result<Run, ScoreError> {
        let started = Instant::now();
        let semaphore = Semaphore::new(self.config.scoring_parallelism.max(1));

        let tasks = responses.iter().enumerate().map(|(index, response)| {
            let semaphore = &semaphore;
            async move {
                if unscored.contains(&index) {
                    return Ok(self.unscored(response));
                }
                let _permit = semaphore.acquire().await.ok();
                self.score_response(index, response).await
            }
        });

        let run_data = join_all(tasks)
            .await
            .into_iter()
            .collect::<Result<Vec<_>, _>>()?;

        let overall_scores = self.aggregate(&run_data);
        info!(
            "Scored {} responses with {} metrics in {:?}",
            responses.len(),
            self.metrics.len(),
            started.elapsed()
        );

        Ok(Run::new(
            overall_scores,
            run_data,
            Some(self.gateway.model().to_string()),
        ))
    }

    fn unscored(&self, response: &LlmResponse) -> RunData {
        let shared = Arc::new(response.clone());
        let outcome = ScoreOutcome::Absent(AbsentReason::GenerationFailed);
        let scores = self
            .metrics
            .iter()
            .map(|metric| Score::new(metric.name(), outcome.score(), Arc::clone(&shared)));
        RunData::from_scores(response, scores)
    }

    async fn score_response(&self, index: usize, response: &LlmResponse) -> Result<RunData, ScoreError> {
        // Fresh cache per response; shared across that response's metrics
        let gateway = self.gateway.scoped();
        let shared = Arc::new(response.clone());

        let mut scores = Vec::with_capacity(self.metrics.len());
        for metric in &self.metrics {
            let outcome = self
                .score_metric(index, metric.as_ref(), response, &gateway)
                .await?;
            scores.push(Score::new(metric.name(), outcome.score(), Arc::clone(&shared)));
        }

        Ok(RunData::from_scores(response, scores))
    }

    async fn score_metric(
        &self,
        index: usize,
        metric: &dyn Metric,
        response: &LlmResponse,
        gateway: &LlmGateway,
    ) -> Result<ScoreOutcome, ScoreError> {
        if let Err(source) = check_requirements(metric, response) {
            return self.absent(
                AbsentReason::MissingData,
                ScoreError::Metric {
                    metric: metric.name().to_string(),
                    index,
                    source,
                },
            );
        }

        let max_attempts = self.config.max_parsing_retries;
        let mut last_error = String::from("no attempt made");

        for attempt in 1..=max_attempts {
            gateway.begin_attempt();
            match metric.score(response, gateway).await {
                Ok(score) => return Ok(ScoreOutcome::Scored(score)),
                Err(e) if e.is_retryable() => {
                    // Resample the evaluator instead of re-reading the bad reply
                    gateway.discard_attempt().await;
                    debug!(
                        "Metric {} on item {} attempt {}/{} failed: {}",
                        metric.name(),
                        index,
                        attempt,
                        max_attempts,
                        e
                    );
                    last_error = e.to_string();
                }
                Err(source) => {
                    let reason = match source {
                        MetricError::Gateway(_) => AbsentReason::GatewayFailure,
                        MetricError::MissingData(_) => AbsentReason::MissingData,
                        _ => AbsentReason::Terminal,
                    };
                    return self.absent(
                        reason,
                        ScoreError::Metric {
                            metric: metric.name().to_string(),
                            index,
                            source,
                        },
                    );
                }
            }
        }

        self.absent(
            AbsentReason::RetriesExhausted,
            ScoreError::RetriesExhausted {
                metric: metric.name().to_string(),
                index,
                attempts: max_attempts,
                last_error,
            },
        )
    }

    /// Record an absent score, or raise `error` when `fail_on_error` is set
    fn absent(&self, reason: AbsentReason, error: ScoreError) -> Result<ScoreOutcome, ScoreError> {
        if self.config.fail_on_error {
            return Err(error);
        }
        if self.config.quiet {
            debug!("Recording absent score ({:?}): {}", reason, error);
        } else {
            warn!("Recording absent score ({:?}): {}", reason, error);
        }
        Ok(ScoreOutcome::Absent(reason))
    }

    /// Mean of the present scores per metric. Metrics without a single
    /// present score are left out.
    fn aggregate(&self, run_data: &[RunData]) -> ScoreMap<f64> {
        let mut overall = ScoreMap::default();
        for metric in &self.metrics {
            let name = metric.name();
            let present: Vec<f64> = run_data
                .iter()
                .filter_map(|data| data.scores.get(name).copied().flatten())
                .collect();

            if present.is_empty() {
                debug!("No scores for metric {}; omitting from overall scores", name);
                continue;
            }
            overall.insert(name, present.iter().sum::<f64>() / present.len() as f64);
        }
        overall
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GatewayConfig;
    use crate::llm_client::{ChatProvider, ProviderError};
    use crate::metrics::{AnswerMatchMetric, BinaryMetric, LatencyMetric, MetricRequirement};
    use ragjudge_core::BenchmarkItem;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FixedProvider(&'static str);

    #[async_trait]
    impl ChatProvider for FixedProvider {
        async fn complete(&self, _system: &str, _prompt: &str) -> Result<String, ProviderError> {
            Ok(self.0.to_string())
        }

        fn model_name(&self) -> &str {
            "fixed"
        }
    }

    /// Fails to parse `failures` times, then scores 1.0
    struct FlakyMetric {
        failures: usize,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl Metric for FlakyMetric {
        fn name(&self) -> &str {
            "flaky"
        }

        fn kind(&self) -> &str {
            "flaky"
        }

        fn requirements(&self) -> &[MetricRequirement] {
            &[]
        }

        async fn score(&self, _response: &LlmResponse, _gateway: &LlmGateway) -> Result<f64, MetricError> {
            if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
                Err(MetricError::Parse("malformed".into()))
            } else {
                Ok(1.0)
            }
        }

        fn serialize_config(&self) -> Result<Value, MetricError> {
            Ok(json!({}))
        }
    }

    fn gateway() -> LlmGateway {
        LlmGateway::with_provider(
            Arc::new(FixedProvider("true")),
            &GatewayConfig {
                starting_wait_secs: 0.0,
                max_retries: 1,
                ..GatewayConfig::default()
            },
        )
        .unwrap()
    }

    fn scorer(metrics: Vec<Arc<dyn Metric>>, config: ScorerConfig) -> RagScorer {
        RagScorer::with_gateway(metrics, config, gateway()).unwrap()
    }

    fn item_response(answer: &str) -> LlmResponse {
        LlmResponse::new(answer, vec![], Arc::new(BenchmarkItem::with_answer("capital?", "Paris")))
    }

    #[tokio::test]
    async fn test_parse_retry_recovers() {
        let flaky = Arc::new(FlakyMetric {
            failures: 2,
            calls: AtomicUsize::new(0),
        });
        let scorer = scorer(vec![flaky.clone() as Arc<dyn Metric>], ScorerConfig::default());

        let run = scorer.score_responses(&[item_response("Paris")]).await.unwrap();
        assert_eq!(run.run_data()[0].scores.get("flaky"), Some(&Some(1.0)));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retries_exhausted_records_absent() {
        let flaky = Arc::new(FlakyMetric {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
        });
        let scorer = scorer(vec![flaky.clone() as Arc<dyn Metric>], ScorerConfig::default());

        let run = scorer.score_responses(&[item_response("Paris")]).await.unwrap();
        assert_eq!(run.run_data()[0].scores.get("flaky"), Some(&None));
        assert_eq!(flaky.calls.load(Ordering::SeqCst), 3);
        assert!(run.overall_scores().get("flaky").is_none());
    }

    #[tokio::test]
    async fn test_fail_on_error_raises() {
        let config = ScorerConfig {
            fail_on_error: true,
            ..ScorerConfig::default()
        };
        let scorer = scorer(vec![Arc::new(LatencyMetric::new()) as Arc<dyn Metric>], config);

        let err = scorer.score_responses(&[item_response("Paris")]).await.unwrap_err();
        assert!(matches!(
            err,
            ScoreError::Metric {
                source: MetricError::MissingData(_),
                index: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_aggregate_mean_of_present_scores() {
        let metrics: Vec<Arc<dyn Metric>> = vec![
            Arc::new(AnswerMatchMetric::new("match", "Paris", false)),
            Arc::new(LatencyMetric::new()),
        ];
        let scorer = scorer(metrics, ScorerConfig::default());
        let responses = vec![
            item_response("Paris"),
            item_response("Lyon").with_run_time(1.0),
            item_response("paris").with_run_time(9.0),
        ];

        let run = scorer.score_responses(&responses).await.unwrap();
        let overall = run.overall_scores();
        assert!((overall.get("match").unwrap() - 2.0 / 3.0).abs() < 1e-9);
        assert_eq!(overall.get("latency_metric"), Some(&0.5));
        assert_eq!(run.run_data()[0].scores.get("latency_metric"), Some(&None));
        assert_eq!(run.llm_evaluator(), Some("gpt-4o-mini"));
    }

    #[tokio::test]
    async fn test_score_with_blocking_generator() {
        let benchmark = Benchmark::new(
            vec!["q1".into(), "q2".into()],
            Some(vec!["a1".into(), "a2".into()]),
            None,
        )
        .unwrap();
        let generator = BlockingFnGenerator::new(|question: &str| {
            Ok(json!({"llm_answer": format!("answer to {}", question), "llm_context_list": []}))
        });
        let metric = BinaryMetric::from_fn("echo", vec![MetricRequirement::LlmAnswer], |r| {
            r.llm_answer.ends_with(r.benchmark_item.question())
        });
        let scorer = scorer(vec![Arc::new(metric)], ScorerConfig::default());

        let run = scorer.score(&benchmark, &generator).await.unwrap();
        assert_eq!(run.run_data()[1].llm_answer, "answer to q2");
        assert_eq!(run.overall_scores().get("echo"), Some(&1.0));
    }

    #[tokio::test]
    async fn test_generator_schema_error() {
        let benchmark = Benchmark::from_items(vec![BenchmarkItem::new("q")], None);
        let generator = AsyncFnGenerator::new(|_question: String| async {
            Ok::<_, anyhow::Error>(json!({"llm_answer": "a", "llm_context_list": [], "extra": 1}))
        });
        let config = ScorerConfig {
            fail_on_error: true,
            ..ScorerConfig::default()
        };
        let scorer = scorer(vec![], config);

        let err = scorer.score(&benchmark, &generator).await.unwrap_err();
        assert!(matches!(err, ScoreError::Schema { index: 0, .. }));
    }

    #[tokio::test]
    async fn test_generator_error_leaves_item_unscored() {
        let benchmark = Benchmark::from_items(
            vec![BenchmarkItem::new("good"), BenchmarkItem::new("broken")],
            None,
        );
        let generator = AsyncFnGenerator::new(|question: String| async move {
            if question == "broken" {
                anyhow::bail!("pipeline crashed");
            }
            Ok(json!({"llm_answer": "fine", "llm_context_list": []}))
        });
        let metric = BinaryMetric::from_fn("answered", vec![MetricRequirement::LlmAnswer], |r| {
            !r.llm_answer.is_empty()
        });
        let scorer = scorer(vec![Arc::new(metric)], ScorerConfig::default());

        let run = scorer.score(&benchmark, &generator).await.unwrap();
        assert_eq!(run.run_data().len(), 2);
        assert_eq!(run.run_data()[0].scores.get("answered"), Some(&Some(1.0)));
        assert_eq!(run.run_data()[1].reference_question, "broken");
        assert_eq!(run.run_data()[1].scores.get("answered"), Some(&None));
        assert_eq!(run.overall_scores().get("answered"), Some(&1.0));
    }

    #[test]
    fn test_duplicate_metric_names_rejected() {
        let metrics: Vec<Arc<dyn Metric>> = vec![
            Arc::new(AnswerMatchMetric::new("m", "Paris", false)),
            Arc::new(AnswerMatchMetric::new("m", "Lyon", false)),
        ];
        let err = RagScorer::with_gateway(metrics, ScorerConfig::default(), gateway())
            .err()
            .unwrap();
        assert!(matches!(err, ScoreError::DuplicateMetric(name) if name == "m"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ScorerConfig {
            max_parsing_retries: 0,
            ..ScorerConfig::default()
        };
        let err = RagScorer::with_gateway(vec![], config, gateway()).err().unwrap();
        assert!(matches!(err, ScoreError::Config(_)));
    }
}
