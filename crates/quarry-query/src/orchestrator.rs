// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Fan-out dispatch of one query to its candidate plugins.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use arc_swap::ArcSwapOption;
use quarry_core::types::{PluginId, Query, SearchResult};
use quarry_core::PluginHandle;
use quarry_router::{KeywordRouter, Route};
use tokio::sync::{Mutex, mpsc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::events::QueryEvent;
use crate::generation::Generation;
use crate::merge::{MergeMessage, MergeSettings, MergeTask, PluginUpdate};
use crate::ranking::RankingPolicy;
use crate::records::ResultRecords;

#[derive(Debug, Clone, Copy)]
pub struct OrchestratorOptions {
    /// Window in which plugin answers coalesce into one merge pass.
    pub debounce: Duration,
    /// Delay before a still-running generation reports progress.
    pub progress_delay: Duration,
    pub ranking: RankingPolicy,
    /// Zero keeps every result.
    pub max_results: usize,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self {
            debounce: Duration::from_millis(20),
            progress_delay: Duration::from_millis(200),
            ranking: RankingPolicy::default(),
            max_results: 0,
        }
    }
}

/// Dispatches queries and owns the merge pipeline.
///
/// Must be created inside a tokio runtime; the merge task is spawned on
/// construction and stops when the orchestrator is dropped.
pub struct QueryOrchestrator {
    router: Arc<KeywordRouter>,
    options: OrchestratorOptions,
    records: Arc<ResultRecords>,
    merge: mpsc::UnboundedSender<MergeMessage>,
    events: Mutex<mpsc::UnboundedReceiver<QueryEvent>>,
    current: ArcSwapOption<Generation>,
    /// Held while a generation is numbered, made current, and announced, so
    /// the merge task sees `Begin` messages in generation order.
    switching: std::sync::Mutex<()>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

impl QueryOrchestrator {
    pub fn new(
        router: Arc<KeywordRouter>,
        records: Arc<ResultRecords>,
        options: OrchestratorOptions,
    ) -> Self {
        let (merge_tx, merge_rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let settings = MergeSettings {
            debounce: options.debounce,
            ranking: options.ranking,
            max_results: options.max_results,
        };
        tokio::spawn(MergeTask::new(settings, Arc::clone(&records), events_tx).run(merge_rx));

        Self {
            router,
            options,
            records,
            merge: merge_tx,
            events: Mutex::new(events_rx),
            current: ArcSwapOption::empty(),
            switching: std::sync::Mutex::new(()),
            next_generation: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        }
    }

    pub fn router(&self) -> &Arc<KeywordRouter> {
        &self.router
    }

    pub fn records(&self) -> &Arc<ResultRecords> {
        &self.records
    }

    /// The generation whose answers are currently merged.
    pub fn current(&self) -> Option<Arc<Generation>> {
        self.current.load_full()
    }

    /// Next event from the merge task. `None` once the orchestrator is gone.
    pub async fn next_event(&self) -> Option<QueryEvent> {
        self.events.lock().await.recv().await
    }

    /// Routes `raw` and dispatches it as a new generation, superseding the
    /// current one. Input without any term only cancels the current one.
    pub fn dispatch(&self, raw: &str) -> Option<Arc<Generation>> {
        match self.router.route(raw) {
            Some(route) => Some(self.dispatch_route(route)),
            None => {
                self.cancel_current();
                None
            }
        }
    }

    /// Dispatches an already routed query.
    pub fn dispatch_route(&self, route: Route) -> Arc<Generation> {
        let cancel = self.shutdown.child_token();
        let generation = {
            let _switching = self
                .switching
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            let id = self.next_generation.fetch_add(1, Ordering::Relaxed) + 1;
            let generation = Arc::new(Generation::new(id, Arc::clone(&route.query), cancel.clone()));
            if let Some(previous) = self.current.swap(Some(Arc::clone(&generation))) {
                previous.cancel();
                debug!(superseded = previous.id, generation = id, "generation superseded");
            }
            self.send(MergeMessage::Begin(Generation::clone(&generation)));
            generation
        };
        let id = generation.id;

        debug!(
            generation = id,
            keyword = route.query.action_keyword(),
            candidates = route.candidates.len(),
            "dispatching query"
        );

        let mut calls = Vec::with_capacity(route.candidates.len());
        for handle in route.candidates {
            let sole_keyword = self.router.sole_keyword(handle.id());
            calls.push(tokio::spawn(query_plugin(
                handle,
                Arc::clone(&route.query),
                id,
                cancel.clone(),
                sole_keyword,
                self.merge.clone(),
            )));
        }

        let merge = self.merge.clone();
        let progress_delay = self.options.progress_delay;
        let progress_cancel = cancel.clone();
        tokio::spawn(async move {
            tokio::select! {
                _ = progress_cancel.cancelled() => {}
                _ = tokio::time::sleep(progress_delay) => {
                    let _ = merge.send(MergeMessage::Progress { generation: id });
                }
            }
        });

        let merge = self.merge.clone();
        tokio::spawn(async move {
            for call in futures::future::join_all(calls).await {
                if let Err(e) = call {
                    warn!(generation = id, error = %e, "plugin query task failed");
                }
            }
            let _ = merge.send(MergeMessage::Finished { generation: id });
        });

        generation
    }

    /// Results a plugin pushes on its own for a query that may still be
    /// current. Accepted only when `raw_query` matches the current
    /// generation's raw text.
    pub fn push_late(&self, plugin: &PluginHandle, raw_query: &str, mut results: Vec<SearchResult>) -> bool {
        let Some(generation) = self.current.load_full() else {
            return false;
        };
        if generation.is_cancelled() || generation.query.raw() != raw_query {
            debug!(plugin = %plugin.id(), raw_query, "ignoring late results for a stale query");
            return false;
        }
        let sole_keyword = self.router.sole_keyword(plugin.id());
        for result in &mut results {
            result.stamp(&plugin.metadata, &generation.query, sole_keyword.as_deref());
        }
        self.send(MergeMessage::Update(PluginUpdate {
            generation: generation.id,
            plugin: plugin.id().clone(),
            priority: plugin.metadata.priority(),
            results,
        }));
        true
    }

    /// Cancels the current generation without starting another.
    pub fn cancel_current(&self) {
        if let Some(generation) = self.current.load_full() {
            generation.cancel();
        }
    }

    /// Cancels every generation, present and future.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }

    fn send(&self, message: MergeMessage) {
        if self.merge.send(message).is_err() {
            warn!("merge task is gone");
        }
    }
}

impl Drop for QueryOrchestrator {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

impl std::fmt::Debug for QueryOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryOrchestrator")
            .field("options", &self.options)
            .field("current", &self.current.load().as_ref().map(|g| g.id))
            .finish()
    }
}

/// One candidate's call. Failures and cancellation contribute nothing.
async fn query_plugin(
    handle: PluginHandle,
    query: Arc<Query>,
    generation: u64,
    cancel: CancellationToken,
    sole_keyword: Option<String>,
    merge: mpsc::UnboundedSender<MergeMessage>,
) {
    let plugin: &PluginId = handle.id();
    let started = Instant::now();
    let outcome = handle.plugin.query(&query, cancel.clone()).await;

    let mut results = match outcome {
        Ok(results) => results,
        Err(e) if e.is_cancellation() => {
            debug!(plugin = %plugin, generation, "plugin query cancelled");
            return;
        }
        Err(e) => {
            handle.metadata.stats().record_query(started.elapsed());
            warn!(plugin = %plugin, generation, error = %e, "plugin query failed");
            return;
        }
    };
    handle.metadata.stats().record_query(started.elapsed());

    if cancel.is_cancelled() {
        debug!(plugin = %plugin, generation, "dropping answer for a superseded query");
        return;
    }

    for result in &mut results {
        result.stamp(&handle.metadata, &query, sole_keyword.as_deref());
    }
    let _ = merge.send(MergeMessage::Update(PluginUpdate {
        generation,
        plugin: plugin.clone(),
        priority: handle.metadata.priority(),
        results,
    }));
}
