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

//! Benchmark items and benchmarks

use crate::error::ValidationError;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// One evaluation unit: a question and an optional reference answer.
///
/// Items are immutable once built; builders consume `self` and are meant to be
/// used before the item is shared.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BenchmarkItem {
    question: String,
    #[serde(default)]
    answer: Option<String>,
    #[serde(default)]
    benchmark_id: Option<Uuid>,
}

impl BenchmarkItem {
    /// Create an item without a reference answer
    pub fn new(question: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: None,
            benchmark_id: None,
        }
    }

    /// Create an item with a reference answer
    pub fn with_answer(question: impl Into<String>, answer: impl Into<String>) -> Self {
        Self {
            question: question.into(),
            answer: Some(answer.into()),
            benchmark_id: None,
        }
    }

    pub fn with_benchmark_id(mut self, benchmark_id: Uuid) -> Self {
        self.benchmark_id = Some(benchmark_id);
        self
    }

    pub fn question(&self) -> &str {
        &self.question
    }

    pub fn answer(&self) -> Option<&str> {
        self.answer.as_deref()
    }

    pub fn benchmark_id(&self) -> Option<Uuid> {
        self.benchmark_id
    }
}

/// An ordered collection of benchmark items
#[derive(Debug, Clone, Default)]
pub struct Benchmark {
    name: Option<String>,
    items: Vec<Arc<BenchmarkItem>>,
}

impl Benchmark {
    /// Build a benchmark from parallel question/answer lists.
    ///
    /// When answers are supplied there must be exactly one per question.
    pub fn new(
        questions: Vec<String>,
        answers: Option<Vec<String>>,
        name: Option<String>,
    ) -> Result<Self, ValidationError> {
        let items = match answers {
            Some(answers) => {
                if answers.len() != questions.len() {
                    return Err(ValidationError::LengthMismatch {
                        questions: questions.len(),
                        answers: answers.len(),
                    });
                }
                questions
                    .into_iter()
                    .zip(answers)
                    .map(|(q, a)| Arc::new(BenchmarkItem::with_answer(q, a)))
                    .collect()
            }
            None => questions
                .into_iter()
                .map(|q| Arc::new(BenchmarkItem::new(q)))
                .collect(),
        };

        Ok(Self { name, items })
    }

    /// Build a benchmark from already constructed items
    pub fn from_items(items: Vec<BenchmarkItem>, name: Option<String>) -> Self {
        Self {
            name,
            items: items.into_iter().map(Arc::new).collect(),
        }
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn items(&self) -> &[Arc<BenchmarkItem>] {
        &self.items
    }

    /// Iterate over the items. Each call starts from the first item.
    pub fn iter(&self) -> std::slice::Iter<'_, Arc<BenchmarkItem>> {
        self.items.iter()
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }
}

impl<'a> IntoIterator for &'a Benchmark {
    type Item = &'a Arc<BenchmarkItem>;
    type IntoIter = std::slice::Iter<'a, Arc<BenchmarkItem>>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
