// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Final score computation and ordering.

use std::cmp::Ordering;

use quarry_core::types::SearchResult;

/// Score of a result pinned to the top for its query.
pub const TOPMOST_SCORE: i32 = i32::MAX;

/// Weights applied on top of the score a plugin reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RankingPolicy {
    pub priority_weight: i32,
    pub selection_bonus: i32,
}

impl Default for RankingPolicy {
    fn default() -> Self {
        Self {
            priority_weight: 50,
            selection_bonus: 5,
        }
    }
}

impl RankingPolicy {
    /// `raw + selections * selection_bonus + priority * priority_weight`,
    /// or [`TOPMOST_SCORE`] for a pinned result.
    pub fn score(&self, raw: i32, priority: i32, selections: u32, topmost: bool) -> i32 {
        if topmost {
            return TOPMOST_SCORE;
        }
        let selections = i32::try_from(selections).unwrap_or(i32::MAX);
        raw.saturating_add(selections.saturating_mul(self.selection_bonus))
            .saturating_add(priority.saturating_mul(self.priority_weight))
            // Only pinned results may reach the top score.
            .min(TOPMOST_SCORE - 1)
    }
}

/// Sorts by descending score. Ties keep plugin order, then title order.
pub fn sort_ranked(results: &mut [SearchResult]) {
    results.sort_by(|a, b| match b.score.cmp(&a.score) {
        Ordering::Equal => a
            .plugin_id
            .cmp(&b.plugin_id)
            .then_with(|| a.title.cmp(&b.title)),
        other => other,
    });
}
