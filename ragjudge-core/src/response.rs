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

use crate::benchmark::BenchmarkItem;
use std::sync::Arc;

/// An answer produced by the system under test, submitted for scoring
#[derive(Debug, Clone)]
pub struct LlmResponse {
    /// Generated answer text
    pub llm_answer: String,

    /// Retrieved context chunks, in retrieval order
    pub llm_context_list: Vec<String>,

    /// The item this answer responds to (shared, may back several responses)
    pub benchmark_item: Arc<BenchmarkItem>,

    /// Wall-clock seconds spent generating the answer
    pub run_time: Option<f64>,
}

impl LlmResponse {
    pub fn new(
        llm_answer: impl Into<String>,
        llm_context_list: Vec<String>,
        benchmark_item: Arc<BenchmarkItem>,
    ) -> Self {
        Self {
            llm_answer: llm_answer.into(),
            llm_context_list,
            benchmark_item,
            run_time: None,
        }
    }

    pub fn with_run_time(mut self, run_time: f64) -> Self {
        self.run_time = Some(run_time);
        self
    }
}
