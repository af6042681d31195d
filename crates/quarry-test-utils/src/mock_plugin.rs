// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock plugin for deterministic testing.
//!
//! `MockPlugin` implements `SearchPlugin` with pre-configured results and
//! records every query it receives for assertion in tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;

use quarry_core::types::{PluginMetadata, Query, RpcAction, Runtime, SearchResult};
use quarry_core::{Capabilities, PluginHandle, PluginInitContext, QuarryError, SearchPlugin};

/// A scripted in-process plugin.
///
/// Returns the configured results after an optional delay. The delay honors
/// the cancellation token, so a superseded query resolves to `Cancelled`.
#[derive(Default)]
pub struct MockPlugin {
    results: Vec<SearchResult>,
    echo: bool,
    delay: Duration,
    failure: Option<String>,
    init_failure: Option<String>,
    queries: Mutex<Vec<String>>,
    executed: Mutex<Vec<RpcAction>>,
    calls: AtomicUsize,
    initialized: AtomicUsize,
    disposed: AtomicUsize,
}

impl MockPlugin {
    /// Create a mock plugin that answers every query with no results.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer with one result per `(title, score)` pair.
    pub fn with_results<'a>(mut self, results: impl IntoIterator<Item = (&'a str, i32)>) -> Self {
        self.results = results
            .into_iter()
            .map(|(title, score)| SearchResult::new(title, "", score))
            .collect();
        self
    }

    /// Append a fully built result.
    pub fn with_result(mut self, result: SearchResult) -> Self {
        self.results.push(result);
        self
    }

    /// Also answer with a result titled after the search text, scored 1.
    pub fn echoing(mut self) -> Self {
        self.echo = true;
        self
    }

    /// Wait this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    /// Fail every query with a plugin runtime error.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.failure = Some(message.into());
        self
    }

    /// Fail `init` with a plugin runtime error.
    pub fn failing_init(mut self, message: impl Into<String>) -> Self {
        self.init_failure = Some(message.into());
        self
    }

    /// Number of `query` calls so far, including cancelled ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn init_count(&self) -> usize {
        self.initialized.load(Ordering::SeqCst)
    }

    pub fn dispose_count(&self) -> usize {
        self.disposed.load(Ordering::SeqCst)
    }

    /// Search texts received, in call order.
    pub async fn seen_queries(&self) -> Vec<String> {
        self.queries.lock().await.clone()
    }

    /// RPC actions received through `execute`.
    pub async fn executed(&self) -> Vec<RpcAction> {
        self.executed.lock().await.clone()
    }

    fn runtime_error(&self, message: &str) -> QuarryError {
        QuarryError::PluginRuntime {
            plugin: "mock".into(),
            code: -32000,
            message: message.to_string(),
            data: None,
        }
    }
}

#[async_trait]
impl SearchPlugin for MockPlugin {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            context_menu: true,
            dispose: true,
            ..Capabilities::default()
        }
    }

    async fn init(&self, _context: PluginInitContext) -> Result<(), QuarryError> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        match &self.init_failure {
            Some(message) => Err(self.runtime_error(message)),
            None => Ok(()),
        }
    }

    async fn query(
        &self,
        query: &Query,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, QuarryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.queries.lock().await.push(query.search().to_string());

        if !self.delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return Err(QuarryError::Cancelled),
                _ = tokio::time::sleep(self.delay) => {}
            }
        }
        if let Some(message) = &self.failure {
            return Err(self.runtime_error(message));
        }

        let mut results = self.results.clone();
        if self.echo {
            results.push(SearchResult::new(query.search(), "echo", 1));
        }
        Ok(results)
    }

    async fn context_menu(&self, result: &SearchResult) -> Result<Vec<SearchResult>, QuarryError> {
        Ok(vec![SearchResult::new(format!("Copy {}", result.title), "", 0)])
    }

    async fn execute(&self, action: &RpcAction) -> Result<bool, QuarryError> {
        self.executed.lock().await.push(action.clone());
        Ok(!action.dont_hide_after_action)
    }

    async fn dispose(&self) -> Result<(), QuarryError> {
        self.disposed.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Wraps a mock in a native plugin handle with the given keywords and priority.
///
/// The returned `Arc` shares the plugin with the handle for later assertions.
pub fn mock_handle(
    id: &str,
    keywords: &[&str],
    priority: i32,
    plugin: MockPlugin,
) -> (PluginHandle, Arc<MockPlugin>) {
    let metadata = PluginMetadata::new(id, id, semver::Version::new(1, 0, 0), Runtime::Native)
        .with_keywords(keywords.iter().copied())
        .with_priority(priority);
    let plugin = Arc::new(plugin);
    let handle = PluginHandle::new(Arc::new(metadata), plugin.clone());
    (handle, plugin)
}
