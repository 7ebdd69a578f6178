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

//! Parsers for free-text evaluator responses
//!
//! Every failure here is a [`MetricError::Parse`], which the scorer treats as
//! retryable.

use crate::metrics::MetricError;
use tracing::debug;

/// Interpret an evaluator reply as a boolean.
///
/// An exact `true`/`false` (case-insensitive) wins; otherwise the reply is
/// accepted when exactly one of the two words appears in it.
pub fn parse_boolean_response(response: &str) -> Result<bool, MetricError> {
    let lower = response.trim().to_lowercase();
    match lower.as_str() {
        "true" => return Ok(true),
        "false" => return Ok(false),
        _ => {}
    }

    debug!("Evaluator response {:?} is not exactly true or false", lower);
    match (lower.contains("true"), lower.contains("false")) {
        (true, false) => Ok(true),
        (false, true) => Ok(false),
        _ => Err(MetricError::Parse(format!(
            "Could not determine true or false from response {:?}",
            lower
        ))),
    }
}

/// Split a markdown bullet list into its points.
///
/// `*` bullets are tried first, then `-`. Text before the first bullet is
/// dropped, as are points that are empty after trimming.
pub fn parse_bullet_list_response(response: &str) -> Result<Vec<String>, MetricError> {
    bullet_list(response, '*').or_else(|_| bullet_list(response, '-'))
}

fn bullet_list(response: &str, bullet: char) -> Result<Vec<String>, MetricError> {
    if !response.trim_start().starts_with(bullet) {
        debug!(
            "Response does not start with {:?}; content before the first bullet is dropped",
            bullet
        );
    }

    let points: Vec<String> = response
        .split(bullet)
        .skip(1)
        .map(str::trim)
        .filter(|point| !point.is_empty())
        .map(str::to_string)
        .collect();

    if points.is_empty() {
        return Err(MetricError::Parse(format!(
            "Could not parse bullet list from response {:?}",
            response
        )));
    }
    Ok(points)
}

/// Parse a numeric rating and check that it lies in `[min, max]`
pub fn parse_bounded_float(response: &str, min: f64, max: f64) -> Result<f64, MetricError> {
    let trimmed = response.trim().trim_end_matches('.');
    let value: f64 = trimmed.parse().map_err(|_| {
        MetricError::Parse(format!("Failed to parse {:?} as a number", response))
    })?;

    if !(min..=max).contains(&value) {
        return Err(MetricError::Parse(format!(
            "Score {} is outside the range [{}, {}]",
            value, min, max
        )));
    }
    Ok(value)
}
