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

//! Metric Registry
//!
//! Maps a metric kind to a factory that rebuilds the metric from its
//! serialized config. A metric `m` round-trips as
//! `registry.build(&registry.describe(m)?)`.

use crate::metrics::{
    AnswerConsistencyBinaryMetric, AnswerConsistencyMetric, AnswerContainsPiiMetric,
    AnswerMatchMetric, AnswerSimilarityMetric, AugmentationAccuracyMetric,
    AugmentationPrecisionMetric, ContainsNumbersMetric, ContainsTextMetric,
    ContextContainsPiiMetric, ContextLengthMetric, DuplicationMetric, HateSpeechContentMetric,
    LatencyMetric, Metric, MetricError, MetricRequirement, OffensiveContentMetric, RegexMetric,
    ResponseLengthMetric, RetrievalPrecisionMetric,
};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Serialized form of a metric: its kind plus the config its factory accepts
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSpec {
    pub kind: String,
    #[serde(default)]
    pub config: Value,
}

impl MetricSpec {
    pub fn new(kind: impl Into<String>, config: Value) -> Self {
        Self {
            kind: kind.into(),
            config,
        }
    }
}

/// Registry errors
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("Metric kind already registered: {0}")]
    DuplicateKind(String),

    #[error("Unknown metric kind: {0}")]
    UnknownKind(String),

    #[error(transparent)]
    Metric(#[from] MetricError),

    #[error("Metric {0} requires a reference answer and cannot run on live traffic")]
    RequiresReference(String),
}

/// Builds a metric from its config
pub type MetricFactory = Arc<dyn Fn(&Value) -> Result<Arc<dyn Metric>, MetricError> + Send + Sync>;

fn factory<M, F>(build: F) -> MetricFactory
where
    M: Metric + 'static,
    F: Fn(&Value) -> Result<M, MetricError> + Send + Sync + 'static,
{
    Arc::new(move |config| Ok(Arc::new(build(config)?) as Arc<dyn Metric>))
}

/// Kind -> factory map. Cheap to clone; clones share registrations.
#[derive(Clone)]
pub struct MetricRegistry {
    factories: Arc<RwLock<HashMap<String, MetricFactory>>>,
}

impl Default for MetricRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl MetricRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self {
            factories: Arc::new(RwLock::new(HashMap::new())),
        }
    }

    /// Registry with every built-in metric kind
    pub fn with_builtins() -> Self {
        let builtins: Vec<(&str, MetricFactory)> = vec![
            ("answer_match", factory(AnswerMatchMetric::from_config)),
            ("contains_text", factory(ContainsTextMetric::from_config)),
            ("regex", factory(RegexMetric::from_config)),
            ("response_length", factory(ResponseLengthMetric::from_config)),
            ("context_length", factory(ContextLengthMetric::from_config)),
            ("contains_numbers", factory(ContainsNumbersMetric::from_config)),
            (LatencyMetric::NAME, factory(LatencyMetric::from_config)),
            (
                AnswerConsistencyBinaryMetric::NAME,
                factory(AnswerConsistencyBinaryMetric::from_config),
            ),
            (DuplicationMetric::NAME, factory(DuplicationMetric::from_config)),
            (
                HateSpeechContentMetric::NAME,
                factory(HateSpeechContentMetric::from_config),
            ),
            (
                OffensiveContentMetric::NAME,
                factory(OffensiveContentMetric::from_config),
            ),
            (
                AnswerConsistencyMetric::NAME,
                factory(AnswerConsistencyMetric::from_config),
            ),
            (
                AnswerSimilarityMetric::NAME,
                factory(AnswerSimilarityMetric::from_config),
            ),
            (
                RetrievalPrecisionMetric::NAME,
                factory(RetrievalPrecisionMetric::from_config),
            ),
            (
                AugmentationAccuracyMetric::NAME,
                factory(AugmentationAccuracyMetric::from_config),
            ),
            (
                AugmentationPrecisionMetric::NAME,
                factory(AugmentationPrecisionMetric::from_config),
            ),
            (
                AnswerContainsPiiMetric::NAME,
                factory(AnswerContainsPiiMetric::from_config),
            ),
            (
                ContextContainsPiiMetric::NAME,
                factory(ContextContainsPiiMetric::from_config),
            ),
        ];

        let factories = builtins
            .into_iter()
            .map(|(kind, f)| (kind.to_string(), f))
            .collect();
        Self {
            factories: Arc::new(RwLock::new(factories)),
        }
    }

    /// Register a factory for a new kind
    pub fn register<F>(&self, kind: impl Into<String>, build: F) -> Result<(), RegistryError>
    where
        F: Fn(&Value) -> Result<Arc<dyn Metric>, MetricError> + Send + Sync + 'static,
    {
        let kind = kind.into();
        let mut factories = self.factories.write();
        if factories.contains_key(&kind) {
            return Err(RegistryError::DuplicateKind(kind));
        }
        factories.insert(kind, Arc::new(build));
        Ok(())
    }

    /// Registered kinds, sorted
    pub fn kinds(&self) -> Vec<String> {
        let mut kinds: Vec<String> = self.factories.read().keys().cloned().collect();
        kinds.sort();
        kinds
    }

    pub fn build(&self, spec: &MetricSpec) -> Result<Arc<dyn Metric>, RegistryError> {
        // Clone the factory out so the lock is not held while it runs
        let build = self
            .factories
            .read()
            .get(&spec.kind)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownKind(spec.kind.clone()))?;
        Ok(build(&spec.config)?)
    }

    pub fn build_all(&self, specs: &[MetricSpec]) -> Result<Vec<Arc<dyn Metric>>, RegistryError> {
        specs.iter().map(|spec| self.build(spec)).collect()
    }

    /// Serialized form of `metric`; fails for metrics wrapping custom closures
    pub fn describe(&self, metric: &dyn Metric) -> Result<MetricSpec, RegistryError> {
        Ok(MetricSpec::new(metric.kind(), metric.serialize_config()?))
    }

    /// Reject metrics that need a reference answer, which live traffic never has
    pub fn check_monitorable(metrics: &[Arc<dyn Metric>]) -> Result<(), RegistryError> {
        for metric in metrics {
            if metric
                .requirements()
                .contains(&MetricRequirement::ReferenceAnswer)
            {
                return Err(RegistryError::RequiresReference(metric.name().to_string()));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metrics::BinaryMetric;
    use serde_json::json;

    #[test]
    fn test_round_trip_configured_metric() {
        let registry = MetricRegistry::with_builtins();
        let metric = AnswerMatchMetric::new("Answer Match", "Paris", false);

        let spec = registry.describe(&metric).unwrap();
        assert_eq!(spec.kind, "answer_match");

        let rebuilt = registry.build(&spec).unwrap();
        assert_eq!(rebuilt.name(), "Answer Match");
        assert_eq!(rebuilt.kind(), "answer_match");
        assert_eq!(rebuilt.serialize_config().unwrap(), spec.config);
    }

    #[test]
    fn test_round_trip_every_parameterless_builtin() {
        let registry = MetricRegistry::with_builtins();
        let metrics: Vec<Arc<dyn Metric>> = vec![
            Arc::new(LatencyMetric::with_target_time(2.5)),
            Arc::new(DuplicationMetric::new()),
            Arc::new(AnswerConsistencyMetric::new()),
            Arc::new(AnswerSimilarityMetric::new()),
            Arc::new(AugmentationPrecisionMetric::new()),
        ];

        for metric in metrics {
            let spec = registry.describe(metric.as_ref()).unwrap();
            let rebuilt = registry.build(&spec).unwrap();
            assert_eq!(rebuilt.name(), metric.name());
            assert_eq!(rebuilt.serialize_config().unwrap(), spec.config);
        }
    }

    #[test]
    fn test_unknown_kind() {
        let registry = MetricRegistry::with_builtins();
        let err = registry
            .build(&MetricSpec::new("bleu", Value::Null))
            .err()
            .unwrap();
        assert!(matches!(err, RegistryError::UnknownKind(kind) if kind == "bleu"));
    }

    #[test]
    fn test_invalid_config() {
        let registry = MetricRegistry::with_builtins();
        let err = registry
            .build(&MetricSpec::new("answer_match", json!({"name": "m"})))
            .err()
            .unwrap();
        assert!(matches!(
            err,
            RegistryError::Metric(MetricError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_custom_closure_not_serializable() {
        let registry = MetricRegistry::new();
        let metric = BinaryMetric::from_fn("custom", vec![], |_| true);
        assert!(matches!(
            registry.describe(&metric),
            Err(RegistryError::Metric(MetricError::NotSerializable(_)))
        ));
    }

    #[test]
    fn test_register_custom_kind() {
        let registry = MetricRegistry::new();
        registry
            .register("always_true", |config| {
                let name = config
                    .get("name")
                    .and_then(Value::as_str)
                    .unwrap_or("always_true")
                    .to_string();
                Ok(Arc::new(BinaryMetric::from_fn(name, vec![], |_| true)) as Arc<dyn Metric>)
            })
            .unwrap();

        let duplicate = registry.register("always_true", |_| {
            Ok(Arc::new(DuplicationMetric::new()) as Arc<dyn Metric>)
        });
        assert!(matches!(duplicate, Err(RegistryError::DuplicateKind(_))));

        let metric = registry
            .build(&MetricSpec::new("always_true", json!({"name": "yes"})))
            .unwrap();
        assert_eq!(metric.name(), "yes");
        assert_eq!(registry.kinds(), vec!["always_true".to_string()]);
    }

    #[test]
    fn test_build_all_preserves_order() {
        let registry = MetricRegistry::with_builtins();
        let specs = vec![
            MetricSpec::new("latency_metric", Value::Null),
            MetricSpec::new("contains_text", json!({"name": "mentions", "text": "Paris"})),
        ];

        let metrics = registry.build_all(&specs).unwrap();
        let names: Vec<&str> = metrics.iter().map(|m| m.name()).collect();
        assert_eq!(names, vec!["latency_metric", "mentions"]);
    }

    #[test]
    fn test_check_monitorable() {
        let live: Vec<Arc<dyn Metric>> = vec![
            Arc::new(DuplicationMetric::new()),
            Arc::new(LatencyMetric::new()),
        ];
        assert!(MetricRegistry::check_monitorable(&live).is_ok());

        let offline: Vec<Arc<dyn Metric>> = vec![
            Arc::new(DuplicationMetric::new()),
            Arc::new(AnswerSimilarityMetric::new()),
        ];
        assert!(matches!(
            MetricRegistry::check_monitorable(&offline),
            Err(RegistryError::RequiresReference(name)) if name == "answer_similarity"
        ));
    }
}
