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

//! Scorer and gateway configuration
//!
//! Values are resolved with priority file > environment > defaults.
//! Provider credentials are never part of the config; the gateway reads them
//! from the process environment.

use crate::registry::MetricSpec;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Evaluator model and retry settings
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GatewayConfig {
    /// Evaluator model name (e.g., "gpt-4o-mini", "claude-3-5-sonnet-latest")
    #[serde(default = "default_model")]
    pub model: String,

    /// Wait before the first retry, in seconds
    #[serde(default = "default_starting_wait_secs")]
    pub starting_wait_secs: f64,

    /// Upper bound for a single backoff wait, in seconds
    #[serde(default = "default_max_wait_secs")]
    pub max_wait_secs: f64,

    /// Attempts per prompt before giving up
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Multiplier applied to the wait after each failed attempt
    #[serde(default = "default_exp_delay_base")]
    pub exp_delay_base: f64,

    /// Upper bound of the random extra factor added to each multiplier
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Per-request HTTP timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Maximum cached prompts per gateway scope
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: u64,

    #[serde(default)]
    pub openai_base_url: Option<String>,

    #[serde(default)]
    pub anthropic_base_url: Option<String>,

    #[serde(default)]
    pub gemini_base_url: Option<String>,
}

fn default_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_starting_wait_secs() -> f64 {
    1.5
}

fn default_max_wait_secs() -> f64 {
    120.0
}

fn default_max_retries() -> u32 {
    12
}

fn default_exp_delay_base() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    0.2
}

fn default_request_timeout_secs() -> u64 {
    120
}

fn default_cache_capacity() -> u64 {
    10_000
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            model: default_model(),
            starting_wait_secs: default_starting_wait_secs(),
            max_wait_secs: default_max_wait_secs(),
            max_retries: default_max_retries(),
            exp_delay_base: default_exp_delay_base(),
            jitter: default_jitter(),
            request_timeout_secs: default_request_timeout_secs(),
            cache_capacity: default_cache_capacity(),
            openai_base_url: None,
            anthropic_base_url: None,
            gemini_base_url: None,
        }
    }
}

impl GatewayConfig {
    /// Config for the given evaluator model with default retry settings
    pub fn for_model(model: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            ..Self::default()
        }
    }

    /// Reject settings the retry loop cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.model.trim().is_empty() {
            anyhow::bail!("Evaluator model must not be empty");
        }
        if self.max_retries == 0 {
            anyhow::bail!("gateway.max_retries must be at least 1");
        }
        for (field, value) in [
            ("starting_wait_secs", self.starting_wait_secs),
            ("max_wait_secs", self.max_wait_secs),
            ("jitter", self.jitter),
        ] {
            if !value.is_finite() || value < 0.0 {
                anyhow::bail!("gateway.{} must be finite and non-negative, got {}", field, value);
            }
        }
        if !self.exp_delay_base.is_finite() || self.exp_delay_base < 1.0 {
            anyhow::bail!(
                "gateway.exp_delay_base must be finite and at least 1.0, got {}",
                self.exp_delay_base
            );
        }
        Ok(())
    }
}

/// Scoring engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScorerConfig {
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Raise the first scoring failure instead of recording an absent score
    #[serde(default)]
    pub fail_on_error: bool,

    /// Attempts per metric when the evaluator reply cannot be parsed
    #[serde(default = "default_max_parsing_retries")]
    pub max_parsing_retries: u32,

    /// Responses scored concurrently
    #[serde(default = "default_scoring_parallelism")]
    pub scoring_parallelism: usize,

    /// Answer generator calls in flight
    #[serde(default = "default_callback_parallelism")]
    pub callback_parallelism: usize,

    /// Log absent scores at debug instead of warn
    #[serde(default)]
    pub quiet: bool,

    /// Metrics built through the registry by `RagScorer::from_config`
    #[serde(default)]
    pub metrics: Vec<MetricSpec>,
}

fn default_max_parsing_retries() -> u32 {
    3
}

fn default_scoring_parallelism() -> usize {
    50
}

fn default_callback_parallelism() -> usize {
    1
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            gateway: GatewayConfig::default(),
            fail_on_error: false,
            max_parsing_retries: default_max_parsing_retries(),
            scoring_parallelism: default_scoring_parallelism(),
            callback_parallelism: default_callback_parallelism(),
            quiet: false,
            metrics: Vec::new(),
        }
    }
}

impl ScorerConfig {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load configuration from environment variables
    ///
    /// Supported environment variables:
    /// - RAGJUDGE_MODEL: Evaluator model (default: gpt-4o-mini)
    /// - RAGJUDGE_MAX_PARSING_RETRIES: Parse attempts per metric (default: 3)
    /// - RAGJUDGE_SCORING_PARALLELISM: Responses scored at once (default: 50)
    /// - RAGJUDGE_CALLBACK_PARALLELISM: Generator calls in flight (default: 1)
    /// - RAGJUDGE_FAIL_ON_ERROR: Raise instead of recording absent scores (default: false)
    /// - RAGJUDGE_QUIET: Demote absent-score warnings (default: false)
    pub fn from_env() -> Self {
        let mut config = Self::default();
        config.apply_env();
        config
    }

    /// Load with priority file > env > defaults
    pub fn load(config_file: Option<PathBuf>) -> Result<Self> {
        let mut config = if let Some(path) = config_file {
            if path.exists() {
                tracing::info!("Loading configuration from file: {:?}", path);
                Self::from_file(&path)?
            } else {
                tracing::warn!("Config file not found: {:?}, using defaults", path);
                Self::default()
            }
        } else {
            Self::default()
        };

        config.apply_env();
        Ok(config)
    }

    /// Override fields whose environment variable is set and parses
    fn apply_env(&mut self) {
        if let Ok(model) = std::env::var("RAGJUDGE_MODEL") {
            self.gateway.model = model;
        }
        if let Some(val) = env_parse("RAGJUDGE_MAX_PARSING_RETRIES") {
            self.max_parsing_retries = val;
        }
        if let Some(val) = env_parse("RAGJUDGE_SCORING_PARALLELISM") {
            self.scoring_parallelism = val;
        }
        if let Some(val) = env_parse("RAGJUDGE_CALLBACK_PARALLELISM") {
            self.callback_parallelism = val;
        }
        if let Some(val) = env_parse("RAGJUDGE_FAIL_ON_ERROR") {
            self.fail_on_error = val;
        }
        if let Some(val) = env_parse("RAGJUDGE_QUIET") {
            self.quiet = val;
        }
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        self.gateway.validate()?;
        if self.max_parsing_retries == 0 {
            anyhow::bail!("max_parsing_retries must be at least 1");
        }
        if self.scoring_parallelism == 0 || self.callback_parallelism == 0 {
            anyhow::bail!("Parallelism bounds must be at least 1");
        }
        Ok(())
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    match std::env::var(key) {
        Ok(raw) => match raw.trim().parse() {
            Ok(val) => Some(val),
            Err(_) => {
                tracing::warn!("Ignoring unparseable {}={:?}", key, raw);
                None
            }
        },
        Err(_) => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = ScorerConfig::default();
        assert_eq!(config.gateway.model, "gpt-4o-mini");
        assert_eq!(config.gateway.max_retries, 12);
        assert_eq!(config.gateway.starting_wait_secs, 1.5);
        assert_eq!(config.gateway.exp_delay_base, 2.0);
        assert_eq!(config.max_parsing_retries, 3);
        assert_eq!(config.scoring_parallelism, 50);
        assert_eq!(config.callback_parallelism, 1);
        assert!(!config.fail_on_error);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_file_partial() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
fail_on_error = true
scoring_parallelism = 8

[gateway]
model = "claude-3-5-sonnet-latest"
max_retries = 4

[[metrics]]
kind = "answer_match"
config = {{ name = "Answer Match", answer = "Paris" }}

[[metrics]]
kind = "latency_metric"
"#
        )
        .unwrap();

        let config = ScorerConfig::from_file(file.path()).unwrap();
        assert!(config.fail_on_error);
        assert_eq!(config.scoring_parallelism, 8);
        assert_eq!(config.callback_parallelism, 1);
        assert_eq!(config.gateway.model, "claude-3-5-sonnet-latest");
        assert_eq!(config.gateway.max_retries, 4);
        assert_eq!(config.gateway.starting_wait_secs, 1.5);
        assert_eq!(config.metrics.len(), 2);
        assert_eq!(config.metrics[0].kind, "answer_match");
        assert_eq!(config.metrics[0].config["answer"], "Paris");
        assert!(config.metrics[1].config.is_null());
    }

    #[test]
    fn test_load_env_override() {
        std::env::set_var("RAGJUDGE_CALLBACK_PARALLELISM", "4");
        std::env::set_var("RAGJUDGE_QUIET", "not-a-bool");

        let config = ScorerConfig::load(Some(PathBuf::from("/nonexistent/ragjudge.toml"))).unwrap();
        assert_eq!(config.callback_parallelism, 4);
        assert!(!config.quiet);

        std::env::remove_var("RAGJUDGE_CALLBACK_PARALLELISM");
        std::env::remove_var("RAGJUDGE_QUIET");
    }

    #[test]
    fn test_validate_rejects_zero_bounds() {
        let mut config = ScorerConfig::default();
        config.scoring_parallelism = 0;
        assert!(config.validate().is_err());

        let mut config = ScorerConfig::default();
        config.gateway.max_retries = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_non_finite_backoff() {
        let config: ScorerConfig = toml::from_str("[gateway]\nmax_wait_secs = inf").unwrap();
        assert!(config.gateway.max_wait_secs.is_infinite());
        assert!(config.validate().is_err());

        let mut config = ScorerConfig::default();
        config.gateway.jitter = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ScorerConfig::default();
        config.gateway.exp_delay_base = f64::NAN;
        assert!(config.validate().is_err());

        let mut config = ScorerConfig::default();
        config.max_parsing_retries = 0;
        assert!(config.validate().is_err());
    }
}
