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

//! Binary metrics computed from the response text alone

use super::{binary_from_config, BinaryCheck, BinaryMetric, MetricError, MetricRequirement};
use crate::gateway::LlmGateway;
use async_trait::async_trait;
use ragjudge_core::LlmResponse;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

const ANSWER_ONLY: &[MetricRequirement] = &[MetricRequirement::LlmAnswer];

fn to_config<T: Serialize>(check: &T) -> Result<Value, MetricError> {
    serde_json::to_value(check).map_err(|e| MetricError::InvalidConfig(e.to_string()))
}

fn within_bounds(len: usize, min: Option<usize>, max: Option<usize>) -> bool {
    min.map_or(true, |min| len >= min) && max.map_or(true, |max| len <= max)
}

/// The answer equals a fixed string
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnswerMatch {
    pub answer: String,
    #[serde(default)]
    pub case_sensitive: bool,
}

pub type AnswerMatchMetric = BinaryMetric<AnswerMatch>;

impl BinaryMetric<AnswerMatch> {
    pub fn new(name: impl Into<String>, answer: impl Into<String>, case_sensitive: bool) -> Self {
        Self::from_check(
            name,
            AnswerMatch {
                answer: answer.into(),
                case_sensitive,
            },
        )
    }

    pub fn from_config(config: &Value) -> Result<Self, MetricError> {
        binary_from_config(config, None)
    }
}

#[async_trait]
impl BinaryCheck for AnswerMatch {
    fn kind(&self) -> &str {
        "answer_match"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        ANSWER_ONLY
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        Ok(if self.case_sensitive {
            response.llm_answer == self.answer
        } else {
            response.llm_answer.to_lowercase() == self.answer.to_lowercase()
        })
    }

    fn config(&self) -> Result<Value, MetricError> {
        to_config(self)
    }
}

fn one_or_many<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<String>, D::Error> {
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        One(String),
        Many(Vec<String>),
    }

    Ok(match OneOrMany::deserialize(deserializer)? {
        OneOrMany::One(s) => vec![s],
        OneOrMany::Many(v) => v,
    })
}

/// The answer contains every one of the given substrings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainsText {
    #[serde(deserialize_with = "one_or_many")]
    pub text: Vec<String>,
    #[serde(default)]
    pub case_sensitive: bool,
}

pub type ContainsTextMetric = BinaryMetric<ContainsText>;

impl BinaryMetric<ContainsText> {
    pub fn new(name: impl Into<String>, text: Vec<String>, case_sensitive: bool) -> Self {
        Self::from_check(
            name,
            ContainsText {
                text,
                case_sensitive,
            },
        )
    }

    pub fn from_config(config: &Value) -> Result<Self, MetricError> {
        binary_from_config(config, None)
    }
}

#[async_trait]
impl BinaryCheck for ContainsText {
    fn kind(&self) -> &str {
        "contains_text"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        ANSWER_ONLY
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        if self.case_sensitive {
            return Ok(self.text.iter().all(|t| response.llm_answer.contains(t.as_str())));
        }
        let answer = response.llm_answer.to_lowercase();
        Ok(self
            .text
            .iter()
            .all(|t| answer.contains(t.to_lowercase().as_str())))
    }

    fn config(&self) -> Result<Value, MetricError> {
        to_config(self)
    }
}

#[derive(Serialize, Deserialize)]
struct RegexConfig {
    pattern: String,
    #[serde(default = "default_match_count")]
    match_count: usize,
}

fn default_match_count() -> usize {
    1
}

/// The answer contains exactly `match_count` non-overlapping matches
#[derive(Debug, Clone, Deserialize)]
#[serde(try_from = "RegexConfig")]
pub struct RegexCheck {
    regex: Regex,
    match_count: usize,
}

impl TryFrom<RegexConfig> for RegexCheck {
    type Error = regex::Error;

    fn try_from(config: RegexConfig) -> Result<Self, Self::Error> {
        Ok(Self {
            regex: Regex::new(&config.pattern)?,
            match_count: config.match_count,
        })
    }
}

pub type RegexMetric = BinaryMetric<RegexCheck>;

impl BinaryMetric<RegexCheck> {
    pub fn new(
        name: impl Into<String>,
        pattern: &str,
        match_count: usize,
    ) -> Result<Self, MetricError> {
        let check = RegexCheck::try_from(RegexConfig {
            pattern: pattern.to_string(),
            match_count,
        })
        .map_err(|e| MetricError::InvalidConfig(e.to_string()))?;
        Ok(Self::from_check(name, check))
    }

    pub fn from_config(config: &Value) -> Result<Self, MetricError> {
        binary_from_config(config, None)
    }
}

#[async_trait]
impl BinaryCheck for RegexCheck {
    fn kind(&self) -> &str {
        "regex"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        ANSWER_ONLY
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        Ok(self.regex.find_iter(&response.llm_answer).count() == self.match_count)
    }

    fn config(&self) -> Result<Value, MetricError> {
        to_config(&RegexConfig {
            pattern: self.regex.as_str().to_string(),
            match_count: self.match_count,
        })
    }
}

/// Answer length in characters lies within the bounds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseLength {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

pub type ResponseLengthMetric = BinaryMetric<ResponseLength>;

impl BinaryMetric<ResponseLength> {
    pub fn new(
        name: impl Into<String>,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Self {
        Self::from_check(
            name,
            ResponseLength {
                min_length,
                max_length,
            },
        )
    }

    pub fn from_config(config: &Value) -> Result<Self, MetricError> {
        binary_from_config(config, None)
    }
}

#[async_trait]
impl BinaryCheck for ResponseLength {
    fn kind(&self) -> &str {
        "response_length"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        ANSWER_ONLY
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        Ok(within_bounds(
            response.llm_answer.chars().count(),
            self.min_length,
            self.max_length,
        ))
    }

    fn config(&self) -> Result<Value, MetricError> {
        to_config(self)
    }
}

/// Every context chunk's length in characters lies within the bounds.
/// Holds trivially when there is no context.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextLength {
    #[serde(default)]
    pub min_length: Option<usize>,
    #[serde(default)]
    pub max_length: Option<usize>,
}

pub type ContextLengthMetric = BinaryMetric<ContextLength>;

impl BinaryMetric<ContextLength> {
    pub fn new(
        name: impl Into<String>,
        min_length: Option<usize>,
        max_length: Option<usize>,
    ) -> Self {
        Self::from_check(
            name,
            ContextLength {
                min_length,
                max_length,
            },
        )
    }

    pub fn from_config(config: &Value) -> Result<Self, MetricError> {
        binary_from_config(config, None)
    }
}

#[async_trait]
impl BinaryCheck for ContextLength {
    fn kind(&self) -> &str {
        "context_length"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        &[]
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        Ok(response
            .llm_context_list
            .iter()
            .all(|c| within_bounds(c.chars().count(), self.min_length, self.max_length)))
    }

    fn config(&self) -> Result<Value, MetricError> {
        to_config(self)
    }
}

/// Every listed number appears as a whitespace-separated token of the answer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainsNumbers {
    pub numbers: Vec<f64>,
}

pub type ContainsNumbersMetric = BinaryMetric<ContainsNumbers>;

impl BinaryMetric<ContainsNumbers> {
    pub fn new(name: impl Into<String>, numbers: Vec<f64>) -> Self {
        Self::from_check(name, ContainsNumbers { numbers })
    }

    pub fn from_config(config: &Value) -> Result<Self, MetricError> {
        binary_from_config(config, None)
    }
}

#[async_trait]
impl BinaryCheck for ContainsNumbers {
    fn kind(&self) -> &str {
        "contains_numbers"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        ANSWER_ONLY
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        let found: Vec<f64> = response
            .llm_answer
            .split_whitespace()
            .filter_map(|word| word.parse::<f64>().ok())
            .collect();
        Ok(self.numbers.iter().all(|n| found.contains(n)))
    }

    fn config(&self) -> Result<Value, MetricError> {
        to_config(self)
    }
}
