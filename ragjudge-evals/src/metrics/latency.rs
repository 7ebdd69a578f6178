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

//! Answer generation latency

use super::{binary_from_config, BinaryCheck, BinaryMetric, MetricError, MetricRequirement};
use crate::gateway::LlmGateway;
use async_trait::async_trait;
use ragjudge_core::LlmResponse;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Generation finished within `target_time` seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Latency {
    #[serde(default = "default_target_time")]
    pub target_time: f64,
}

fn default_target_time() -> f64 {
    5.0
}

impl Default for Latency {
    fn default() -> Self {
        Self {
            target_time: default_target_time(),
        }
    }
}

pub type LatencyMetric = BinaryMetric<Latency>;

impl BinaryMetric<Latency> {
    pub const NAME: &'static str = "latency_metric";

    pub fn new() -> Self {
        Self::from_check(Self::NAME, Latency::default())
    }

    pub fn with_target_time(target_time: f64) -> Self {
        Self::from_check(Self::NAME, Latency { target_time })
    }

    pub fn from_config(config: &Value) -> Result<Self, MetricError> {
        binary_from_config(config, Some(Self::NAME))
    }
}

impl Default for BinaryMetric<Latency> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl BinaryCheck for Latency {
    fn kind(&self) -> &str {
        "latency_metric"
    }

    fn requirements(&self) -> &[MetricRequirement] {
        &[MetricRequirement::RunTime]
    }

    async fn check(&self, response: &LlmResponse, _gateway: &LlmGateway) -> Result<bool, MetricError> {
        let run_time = response
            .run_time
            .ok_or_else(|| MetricError::MissingData("No run time provided in LLM response".into()))?;
        Ok(run_time <= self.target_time)
    }

    fn config(&self) -> Result<Value, MetricError> {
        serde_json::to_value(self).map_err(|e| MetricError::InvalidConfig(e.to_string()))
    }
}
