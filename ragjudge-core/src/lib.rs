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

//! # Ragjudge Core
//!
//! Data model shared by the ragjudge scoring engine:
//!
//! - [`BenchmarkItem`] / [`Benchmark`]: questions with optional reference answers
//! - [`LlmResponse`]: an answer plus retrieved context submitted for scoring
//! - [`Score`], [`RunData`], [`Run`]: per-item and aggregate scoring results
//!
//! ```rust
//! use ragjudge_core::{Benchmark, LlmResponse};
//!
//! let benchmark = Benchmark::new(
//!     vec!["What is the capital of France?".to_string()],
//!     Some(vec!["Paris".to_string()]),
//!     Some("capitals".to_string()),
//! )
//! .unwrap();
//!
//! let item = benchmark.items()[0].clone();
//! let response = LlmResponse::new("Paris", vec!["Paris is the capital of France.".into()], item);
//! assert_eq!(response.benchmark_item.answer(), Some("Paris"));
//! ```

pub mod benchmark;
pub mod error;
pub mod response;
pub mod run;
pub mod score_map;

pub use benchmark::{Benchmark, BenchmarkItem};
pub use error::ValidationError;
pub use response::LlmResponse;
pub use run::{Run, RunData, Score};
pub use score_map::ScoreMap;
