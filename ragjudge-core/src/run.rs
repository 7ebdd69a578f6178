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

//! Scoring results: per-metric scores, per-item run data and whole runs

use crate::response::LlmResponse;
use crate::score_map::ScoreMap;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use uuid::Uuid;

/// The outcome of one metric on one response. `None` marks a score that
/// could not be computed.
#[derive(Debug, Clone)]
pub struct Score {
    pub metric_name: String,
    pub score: Option<f64>,
    pub llm_response: Arc<LlmResponse>,
}

impl Score {
    pub fn new(metric_name: impl Into<String>, score: Option<f64>, llm_response: Arc<LlmResponse>) -> Self {
        Self {
            metric_name: metric_name.into(),
            score,
            llm_response,
        }
    }
}

/// Per-item scoring result with the item fields copied alongside for export
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunData {
    pub scores: ScoreMap<Option<f64>>,
    pub reference_question: String,
    pub reference_answer: Option<String>,
    pub llm_answer: String,
    pub llm_context: Vec<String>,
}

impl RunData {
    /// Collect the scores of one response. Scores keep the order given.
    pub fn from_scores(response: &LlmResponse, scores: impl IntoIterator<Item = Score>) -> Self {
        Self {
            scores: scores
                .into_iter()
                .map(|s| (s.metric_name, s.score))
                .collect(),
            reference_question: response.benchmark_item.question().to_string(),
            reference_answer: response.benchmark_item.answer().map(str::to_string),
            llm_answer: response.llm_answer.clone(),
            llm_context: response.llm_context_list.clone(),
        }
    }

    /// Flat mapping suitable for upload to an external store
    pub fn to_dict(&self) -> Value {
        let scores: Map<String, Value> = self
            .scores
            .iter()
            .map(|(name, score)| (name.to_string(), json!(score)))
            .collect();

        json!({
            "scores": Value::Object(scores),
            "reference_question": self.reference_question,
            "reference_answer": self.reference_answer,
            "llm_answer": self.llm_answer,
            "llm_context": self.llm_context,
        })
    }
}

/// One complete scoring pass. Built once by the scorer and read-only afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Run {
    overall_scores: ScoreMap<f64>,
    run_data: Vec<RunData>,
    llm_evaluator: Option<String>,
    id: Option<Uuid>,
    created_at: DateTime<Utc>,
}

impl Run {
    pub fn new(
        overall_scores: ScoreMap<f64>,
        run_data: Vec<RunData>,
        llm_evaluator: Option<String>,
    ) -> Self {
        Self {
            overall_scores,
            run_data,
            llm_evaluator,
            id: None,
            created_at: Utc::now(),
        }
    }

    /// Attach the identifier assigned by an external store
    pub fn with_id(mut self, id: Uuid) -> Self {
        self.id = Some(id);
        self
    }

    pub fn overall_scores(&self) -> &ScoreMap<f64> {
        &self.overall_scores
    }

    pub fn run_data(&self) -> &[RunData] {
        &self.run_data
    }

    pub fn llm_evaluator(&self) -> Option<&str> {
        self.llm_evaluator.as_deref()
    }

    pub fn id(&self) -> Option<Uuid> {
        self.id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::benchmark::BenchmarkItem;

    fn response() -> Arc<LlmResponse> {
        let item = Arc::new(BenchmarkItem::with_answer("capital of France?", "Paris"));
        Arc::new(LlmResponse::new(
            "Paris",
            vec!["Paris is the capital of France.".to_string()],
            item,
        ))
    }

    #[test]
    fn test_run_data_from_scores() {
        let response = response();
        let data = RunData::from_scores(
            &response,
            vec![
                Score::new("answer_match", Some(1.0), response.clone()),
                Score::new("answer_similarity", None, response.clone()),
            ],
        );

        assert_eq!(data.reference_question, "capital of France?");
        assert_eq!(data.reference_answer.as_deref(), Some("Paris"));
        assert_eq!(
            data.scores.keys().collect::<Vec<_>>(),
            vec!["answer_match", "answer_similarity"]
        );
    }

    #[test]
    fn test_to_dict_shape() {
        let response = response();
        let data = RunData::from_scores(
            &response,
            vec![Score::new("latency_metric", None, response.clone())],
        );

        let dict = data.to_dict();
        assert_eq!(dict["scores"]["latency_metric"], Value::Null);
        assert_eq!(dict["reference_answer"], "Paris");
        assert_eq!(dict["llm_answer"], "Paris");
        assert_eq!(dict["llm_context"][0], "Paris is the capital of France.");
        assert_eq!(dict.as_object().unwrap().len(), 5);
    }

    #[test]
    fn test_run_id_is_external() {
        let run = Run::new(ScoreMap::new(), vec![], Some("gpt-4o-mini".to_string()));
        assert!(run.id().is_none());

        let id = Uuid::new_v4();
        let run = run.with_id(id);
        assert_eq!(run.id(), Some(id));
        assert_eq!(run.llm_evaluator(), Some("gpt-4o-mini"));
    }
}
