// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Arithmetic on whatever the user types.

use async_trait::async_trait;
use quarry_core::{HOST_METHOD_PREFIX, HostMethod, Query, QuarryError, RpcAction, SearchPlugin, SearchResult};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tracing::trace;

const RESULT_SCORE: i32 = 300;

/// Evaluates the query as an expression and offers the value for copying.
#[derive(Debug, Default)]
pub struct Calculator;

impl Calculator {
    pub fn new() -> Self {
        Self
    }
}

/// Rejects input that cannot be arithmetic, so bare words never reach the parser.
fn looks_like_math(input: &str) -> bool {
    input.chars().any(|c| c.is_ascii_digit())
        && input.chars().any(|c| "+-*/^%()".contains(c) || c.is_ascii_alphabetic())
}

/// Integers print without a fractional part; everything else drops trailing zeros.
pub(crate) fn format_value(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        let text = format!("{value:.10}");
        text.trim_end_matches('0').trim_end_matches('.').to_string()
    }
}

pub(crate) fn evaluate(input: &str) -> Option<String> {
    let input = input.trim();
    if !looks_like_math(input) {
        return None;
    }
    match meval::eval_str(input) {
        Ok(value) if value.is_finite() => Some(format_value(value)),
        Ok(_) => None,
        Err(e) => {
            trace!(input, error = %e, "not an expression");
            None
        }
    }
}

#[async_trait]
impl SearchPlugin for Calculator {
    async fn query(
        &self,
        query: &Query,
        _cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, QuarryError> {
        let Some(value) = evaluate(query.search()) else {
            return Ok(Vec::new());
        };

        let mut result = SearchResult::new(
            value.clone(),
            "Copy this number to the clipboard",
            RESULT_SCORE,
        );
        result.rpc_action = Some(RpcAction {
            method: format!("{HOST_METHOD_PREFIX}{}", HostMethod::CopyToClipboard),
            parameters: vec![json!(value)],
            dont_hide_after_action: false,
        });
        Ok(vec![result])
    }
}
