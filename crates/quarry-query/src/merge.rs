// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The single consumer that owns the merged result list.
//!
//! Plugin tasks only enqueue [`MergeMessage`]s. The merge task applies them
//! in order: updates for anything but the current, uncancelled generation
//! are dropped, bursts are coalesced within the debounce window, and each
//! plugin's newest contribution replaces its previous one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use quarry_core::types::{PluginId, SearchResult};
use tokio::sync::mpsc;
use tokio::time::Instant;
use tracing::{debug, trace};

use crate::events::QueryEvent;
use crate::generation::Generation;
use crate::ranking::{RankingPolicy, sort_ranked};
use crate::records::ResultRecords;

/// One plugin's answer for one generation.
#[derive(Debug)]
pub struct PluginUpdate {
    pub generation: u64,
    pub plugin: PluginId,
    /// Priority read when the answer arrived.
    pub priority: i32,
    pub results: Vec<SearchResult>,
}

#[derive(Debug)]
pub enum MergeMessage {
    /// A newer generation replaces whatever was current. An older one
    /// arriving late is ignored.
    Begin(Generation),
    Update(PluginUpdate),
    /// The progress delay elapsed for this generation.
    Progress { generation: u64 },
    /// Every candidate plugin call for this generation has returned.
    Finished { generation: u64 },
}

#[derive(Debug, Clone, Copy)]
pub struct MergeSettings {
    pub debounce: Duration,
    pub ranking: RankingPolicy,
    pub max_results: usize,
}

struct CurrentGeneration {
    generation: Generation,
    contributions: HashMap<PluginId, Vec<SearchResult>>,
    completed: bool,
}

pub struct MergeTask {
    settings: MergeSettings,
    records: Arc<ResultRecords>,
    events: mpsc::UnboundedSender<QueryEvent>,
    current: Option<CurrentGeneration>,
}

impl MergeTask {
    pub fn new(
        settings: MergeSettings,
        records: Arc<ResultRecords>,
        events: mpsc::UnboundedSender<QueryEvent>,
    ) -> Self {
        Self {
            settings,
            records,
            events,
            current: None,
        }
    }

    /// Runs until every sender is dropped.
    pub async fn run(mut self, mut inbox: mpsc::UnboundedReceiver<MergeMessage>) {
        while let Some(message) = inbox.recv().await {
            let MergeMessage::Update(first) = message else {
                self.handle(message);
                continue;
            };

            let mut batch = vec![first];
            let mut deferred = None;
            let deadline = Instant::now() + self.settings.debounce;
            loop {
                match tokio::time::timeout_at(deadline, inbox.recv()).await {
                    Ok(Some(MergeMessage::Update(update))) => batch.push(update),
                    Ok(Some(other)) => {
                        deferred = Some(other);
                        break;
                    }
                    Ok(None) | Err(_) => break,
                }
            }

            self.apply(batch);
            if let Some(message) = deferred {
                self.handle(message);
            }
        }
        debug!("merge task stopped");
    }

    fn handle(&mut self, message: MergeMessage) {
        match message {
            MergeMessage::Begin(generation) => {
                if let Some(current) = &self.current
                    && current.generation.id > generation.id
                {
                    trace!(generation = generation.id, current = current.generation.id, "ignoring superseded generation");
                    return;
                }
                trace!(generation = generation.id, "merge switched generation");
                self.current = Some(CurrentGeneration {
                    generation,
                    contributions: HashMap::new(),
                    completed: false,
                });
            }
            MergeMessage::Update(update) => self.apply(vec![update]),
            MergeMessage::Progress { generation } => {
                if let Some(current) = self.live(generation)
                    && !current.completed
                {
                    self.emit(QueryEvent::Progress { generation });
                }
            }
            MergeMessage::Finished { generation } => {
                let Some(current) = self.live_mut(generation) else {
                    return;
                };
                current.completed = true;
                let query = Arc::clone(&current.generation.query);
                let elapsed = current.generation.started.elapsed();
                let results = Arc::new(self.ranked());
                debug!(
                    generation,
                    results = results.len(),
                    elapsed_ms = elapsed.as_millis() as u64,
                    "generation completed"
                );
                self.emit(QueryEvent::Completed {
                    generation,
                    query,
                    results,
                    elapsed,
                });
            }
        }
    }

    fn apply(&mut self, batch: Vec<PluginUpdate>) {
        let ranking = self.settings.ranking;
        let records = Arc::clone(&self.records);
        let Some(current) = self.current.as_mut() else {
            return;
        };
        let mut changed = false;
        for update in batch {
            if update.generation != current.generation.id || current.generation.is_cancelled() {
                trace!(generation = update.generation, plugin = %update.plugin, "dropping stale update");
                continue;
            }
            let results = update
                .results
                .into_iter()
                .map(|mut result| {
                    result.score = ranking.score(
                        result.score,
                        update.priority,
                        records.selection_count(&result),
                        records.is_topmost(&result),
                    );
                    result
                })
                .collect();
            current.contributions.insert(update.plugin, results);
            changed = true;
        }
        if !changed {
            return;
        }

        let generation = current.generation.id;
        let query = Arc::clone(&current.generation.query);
        let results = Arc::new(self.ranked());
        self.emit(QueryEvent::Results {
            generation,
            query,
            results,
        });
    }

    fn live(&self, generation: u64) -> Option<&CurrentGeneration> {
        self.current
            .as_ref()
            .filter(|c| c.generation.id == generation && !c.generation.is_cancelled())
    }

    fn live_mut(&mut self, generation: u64) -> Option<&mut CurrentGeneration> {
        self.current
            .as_mut()
            .filter(|c| c.generation.id == generation && !c.generation.is_cancelled())
    }

    fn ranked(&self) -> Vec<SearchResult> {
        let Some(current) = self.current.as_ref() else {
            return Vec::new();
        };
        let mut merged: Vec<SearchResult> = current
            .contributions
            .values()
            .flat_map(|results| results.iter().cloned())
            .collect();
        sort_ranked(&mut merged);
        if self.settings.max_results > 0 {
            merged.truncate(self.settings.max_results);
        }
        merged
    }

    fn emit(&self, event: QueryEvent) {
        if self.events.send(event).is_err() {
            trace!("no event receiver");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::types::Query;
    use tokio_util::sync::CancellationToken;

    fn generation(id: u64) -> Generation {
        let query = Arc::new(Query::new("foo", vec!["foo".into()], "", "foo"));
        Generation::new(id, query, CancellationToken::new())
    }

    fn update(generation: u64, plugin: &str, priority: i32, titles: &[(&str, i32)]) -> MergeMessage {
        let results = titles
            .iter()
            .map(|(title, score)| {
                let mut r = SearchResult::new(*title, "", *score);
                r.plugin_id = Some(PluginId::new(plugin));
                r
            })
            .collect();
        MergeMessage::Update(PluginUpdate {
            generation,
            plugin: PluginId::new(plugin),
            priority,
            results,
        })
    }

    fn spawn_task(
        debounce: Duration,
    ) -> (
        mpsc::UnboundedSender<MergeMessage>,
        mpsc::UnboundedReceiver<QueryEvent>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let settings = MergeSettings {
            debounce,
            ranking: RankingPolicy::default(),
            max_results: 0,
        };
        let task = MergeTask::new(settings, Arc::new(ResultRecords::new()), events_tx);
        tokio::spawn(task.run(rx));
        (tx, events_rx)
    }

    fn titles(event: &QueryEvent) -> Vec<(String, i32)> {
        match event {
            QueryEvent::Results { results, .. } | QueryEvent::Completed { results, .. } => results
                .iter()
                .map(|r| (format!("{}:{}", r.plugin_id.as_ref().map(|p| p.as_str()).unwrap_or(""), r.title), r.score))
                .collect(),
            QueryEvent::Progress { .. } => Vec::new(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn burst_within_window_merges_once() {
        let (tx, mut events) = spawn_task(Duration::from_millis(20));
        tx.send(MergeMessage::Begin(generation(1))).unwrap();
        tx.send(update(1, "a", 0, &[("x", 1)])).unwrap();
        tx.send(update(1, "b", 0, &[("y", 2)])).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(titles(&event), vec![("b:y".to_string(), 2), ("a:x".to_string(), 1)]);
        assert!(events.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn last_write_wins_per_plugin() {
        let (tx, mut events) = spawn_task(Duration::from_millis(20));
        tx.send(MergeMessage::Begin(generation(1))).unwrap();
        tx.send(update(1, "a", 0, &[("old", 1)])).unwrap();
        tx.send(update(1, "b", 0, &[("keep", 1)])).unwrap();
        let _ = events.recv().await.unwrap();

        tx.send(update(1, "a", 0, &[("new", 3)])).unwrap();
        let event = events.recv().await.unwrap();
        assert_eq!(
            titles(&event),
            vec![("a:new".to_string(), 3), ("b:keep".to_string(), 1)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn older_generation_beginning_late_is_ignored() {
        let (tx, mut events) = spawn_task(Duration::from_millis(20));
        let older = generation(1);
        older.cancel();
        tx.send(MergeMessage::Begin(generation(2))).unwrap();
        tx.send(MergeMessage::Begin(older)).unwrap();
        tx.send(update(2, "a", 0, &[("fresh", 1)])).unwrap();
        tx.send(MergeMessage::Finished { generation: 2 }).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(titles(&event), vec![("a:fresh".to_string(), 1)]);
        let done = events.recv().await.unwrap();
        assert!(matches!(done, QueryEvent::Completed { generation: 2, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn stale_generation_updates_are_dropped() {
        let (tx, mut events) = spawn_task(Duration::from_millis(20));
        tx.send(MergeMessage::Begin(generation(1))).unwrap();
        tx.send(MergeMessage::Begin(generation(2))).unwrap();
        tx.send(update(1, "a", 0, &[("stale", 100)])).unwrap();
        tx.send(update(2, "a", 0, &[("fresh", 1)])).unwrap();
        tx.send(MergeMessage::Finished { generation: 1 }).unwrap();
        tx.send(MergeMessage::Finished { generation: 2 }).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(titles(&event), vec![("a:fresh".to_string(), 1)]);
        let done = events.recv().await.unwrap();
        assert!(matches!(done, QueryEvent::Completed { generation: 2, .. }));
        assert_eq!(titles(&done), vec![("a:fresh".to_string(), 1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn priority_weight_breaks_equal_scores() {
        let (tx, mut events) = spawn_task(Duration::from_millis(20));
        tx.send(MergeMessage::Begin(generation(1))).unwrap();
        tx.send(update(1, "A", 1, &[("Foo", 10)])).unwrap();
        tx.send(update(1, "B", 2, &[("Foo", 10)])).unwrap();

        let event = events.recv().await.unwrap();
        assert_eq!(
            titles(&event),
            vec![("B:Foo".to_string(), 110), ("A:Foo".to_string(), 60)]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn progress_only_for_unfinished_generation() {
        let (tx, mut events) = spawn_task(Duration::from_millis(20));
        tx.send(MergeMessage::Begin(generation(1))).unwrap();
        tx.send(MergeMessage::Progress { generation: 1 }).unwrap();
        assert!(matches!(
            events.recv().await.unwrap(),
            QueryEvent::Progress { generation: 1 }
        ));

        tx.send(MergeMessage::Finished { generation: 1 }).unwrap();
        assert!(matches!(events.recv().await.unwrap(), QueryEvent::Completed { .. }));
        tx.send(MergeMessage::Progress { generation: 1 }).unwrap();
        tx.send(MergeMessage::Progress { generation: 7 }).unwrap();
        drop(tx);
        assert!(events.recv().await.is_none());
    }
}
