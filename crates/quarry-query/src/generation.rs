// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! One dispatch epoch.

use std::sync::Arc;
use std::time::Instant;

use quarry_core::types::Query;
use tokio_util::sync::CancellationToken;

/// A dispatched query. Cancelling it stops its outstanding plugin calls and
/// drops their answers.
#[derive(Debug, Clone)]
pub struct Generation {
    pub id: u64,
    pub query: Arc<Query>,
    pub started: Instant,
    cancel: CancellationToken,
}

impl Generation {
    pub(crate) fn new(id: u64, query: Arc<Query>, cancel: CancellationToken) -> Self {
        Self {
            id,
            query,
            started: Instant::now(),
            cancel,
        }
    }

    pub fn token(&self) -> &CancellationToken {
        &self.cancel
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
