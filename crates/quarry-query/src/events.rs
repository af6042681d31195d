// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Events the orchestrator emits to whoever presents results.

use std::sync::Arc;
use std::time::Duration;

use quarry_core::types::{Query, SearchResult};

#[derive(Debug, Clone)]
pub enum QueryEvent {
    /// The generation is still running after the progress delay.
    Progress { generation: u64 },

    /// A new merged, ranked snapshot.
    Results {
        generation: u64,
        query: Arc<Query>,
        results: Arc<Vec<SearchResult>>,
    },

    /// Every candidate plugin has answered. Late pushes may still follow as
    /// further `Results` events.
    Completed {
        generation: u64,
        query: Arc<Query>,
        results: Arc<Vec<SearchResult>>,
        elapsed: Duration,
    },
}

impl QueryEvent {
    pub fn generation(&self) -> u64 {
        match self {
            QueryEvent::Progress { generation }
            | QueryEvent::Results { generation, .. }
            | QueryEvent::Completed { generation, .. } => *generation,
        }
    }
}
