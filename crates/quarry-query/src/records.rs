// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! User selection counts and pinned (topmost) results.
//!
//! Both are keyed by the query a result answered plus the result's identity
//! (owning plugin, title, subtitle). They persist as one JSON file.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use quarry_core::types::{PluginId, SearchResult};
use quarry_core::QuarryError;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Identity of a result across queries.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RecordKey {
    #[serde(default)]
    pub plugin: Option<PluginId>,
    pub title: String,
    #[serde(default)]
    pub subtitle: String,
}

impl RecordKey {
    pub fn of(result: &SearchResult) -> Self {
        let (plugin, title, subtitle) = result.record_identity();
        Self {
            plugin: plugin.cloned(),
            title: title.to_string(),
            subtitle: subtitle.to_string(),
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct SelectionEntry {
    query: String,
    #[serde(flatten)]
    key: RecordKey,
    count: u32,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct RecordsFile {
    #[serde(default)]
    selections: Vec<SelectionEntry>,
    #[serde(default)]
    topmost: BTreeMap<String, RecordKey>,
}

/// Selection and topmost records shared by the merge task and the host.
#[derive(Debug, Default)]
pub struct ResultRecords {
    selections: DashMap<(String, RecordKey), u32>,
    topmost: DashMap<String, RecordKey>,
    dirty: AtomicBool,
}

/// Selection counts are per keyword plus search text, ignoring spacing.
fn selection_scope(result: &SearchResult) -> Option<String> {
    result
        .origin_query
        .as_ref()
        .map(|q| format!("{}{}", q.action_keyword(), q.search()))
}

impl ResultRecords {
    pub fn new() -> Self {
        Self::default()
    }

    /// Counts one user selection of `result`. Results without an origin
    /// query (context-menu entries) are not counted.
    pub fn record_selection(&self, result: &SearchResult) {
        let Some(scope) = selection_scope(result) else {
            return;
        };
        *self
            .selections
            .entry((scope, RecordKey::of(result)))
            .or_insert(0) += 1;
        self.dirty.store(true, Ordering::Release);
    }

    pub fn selection_count(&self, result: &SearchResult) -> u32 {
        let Some(scope) = selection_scope(result) else {
            return 0;
        };
        self.selections
            .get(&(scope, RecordKey::of(result)))
            .map(|count| *count)
            .unwrap_or(0)
    }

    /// Pins `result` to the top for the raw query it answered, replacing any
    /// earlier pin for that query. Returns false without an origin query.
    pub fn set_topmost(&self, result: &SearchResult) -> bool {
        let Some(query) = result.origin_query.as_ref() else {
            return false;
        };
        self.topmost
            .insert(query.raw().to_string(), RecordKey::of(result));
        self.dirty.store(true, Ordering::Release);
        true
    }

    /// Removes the pin if `result` holds it.
    pub fn remove_topmost(&self, result: &SearchResult) -> bool {
        let Some(query) = result.origin_query.as_ref() else {
            return false;
        };
        let key = RecordKey::of(result);
        let removed = self
            .topmost
            .remove_if(query.raw(), |_, pinned| *pinned == key)
            .is_some();
        if removed {
            self.dirty.store(true, Ordering::Release);
        }
        removed
    }

    pub fn is_topmost(&self, result: &SearchResult) -> bool {
        let Some(query) = result.origin_query.as_ref() else {
            return false;
        };
        self.topmost
            .get(query.raw())
            .is_some_and(|pinned| *pinned == RecordKey::of(result))
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Reads records from `path`. A missing file yields empty records.
    pub async fn load(path: &Path) -> Result<Self, QuarryError> {
        let content = match tokio::fs::read_to_string(path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %path.display(), "no result records yet");
                return Ok(Self::default());
            }
            Err(e) => {
                return Err(QuarryError::Internal(format!(
                    "failed to read result records {}: {e}",
                    path.display()
                )));
            }
        };
        let file: RecordsFile = serde_json::from_str(&content).map_err(|e| {
            QuarryError::Internal(format!("invalid result records {}: {e}", path.display()))
        })?;

        let records = Self::default();
        for entry in file.selections {
            records
                .selections
                .insert((entry.query, entry.key), entry.count);
        }
        for (query, key) in file.topmost {
            records.topmost.insert(query, key);
        }
        Ok(records)
    }

    /// Writes records to `path`, creating parent directories.
    pub async fn save(&self, path: &Path) -> Result<(), QuarryError> {
        let mut selections: Vec<SelectionEntry> = self
            .selections
            .iter()
            .map(|entry| {
                let ((query, key), count) = (entry.key().clone(), *entry.value());
                SelectionEntry { query, key, count }
            })
            .collect();
        selections.sort_by(|a, b| (&a.query, &a.key.title).cmp(&(&b.query, &b.key.title)));
        let file = RecordsFile {
            selections,
            topmost: self
                .topmost
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        };

        let json = serde_json::to_string_pretty(&file)
            .map_err(|e| QuarryError::Internal(format!("failed to encode result records: {e}")))?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                QuarryError::Internal(format!("failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(path, json).await.map_err(|e| {
            QuarryError::Internal(format!("failed to write result records {}: {e}", path.display()))
        })?;
        self.dirty.store(false, Ordering::Release);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::types::Query;
    use std::sync::Arc;

    fn result(plugin: &str, title: &str, raw: &str) -> SearchResult {
        let mut r = SearchResult::new(title, "sub", 0);
        r.plugin_id = Some(PluginId::new(plugin));
        r.origin_query = Some(Arc::new(Query::new(raw, vec![raw.to_string()], "", raw)));
        r
    }

    #[test]
    fn selections_count_per_query_and_identity() {
        let records = ResultRecords::new();
        let foo = result("a", "Foo", "fo");
        records.record_selection(&foo);
        records.record_selection(&foo);
        assert_eq!(records.selection_count(&foo), 2);
        assert_eq!(records.selection_count(&result("b", "Foo", "fo")), 0);
        assert_eq!(records.selection_count(&result("a", "Foo", "other")), 0);
        assert!(records.is_dirty());
    }

    #[test]
    fn results_without_origin_are_ignored() {
        let records = ResultRecords::new();
        let orphan = SearchResult::new("Copy", "", 0);
        records.record_selection(&orphan);
        assert_eq!(records.selection_count(&orphan), 0);
        assert!(!records.set_topmost(&orphan));
        assert!(!records.is_topmost(&orphan));
    }

    #[test]
    fn topmost_replaces_and_removes() {
        let records = ResultRecords::new();
        let foo = result("a", "Foo", "f");
        let bar = result("a", "Bar", "f");
        assert!(records.set_topmost(&foo));
        assert!(records.is_topmost(&foo));
        assert!(records.set_topmost(&bar));
        assert!(!records.is_topmost(&foo));
        assert!(!records.remove_topmost(&foo));
        assert!(records.remove_topmost(&bar));
        assert!(!records.is_topmost(&bar));
    }

    #[tokio::test]
    async fn records_survive_save_and_load() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("state").join("records.json");
        let records = ResultRecords::new();
        let foo = result("a", "Foo", "f");
        records.record_selection(&foo);
        records.set_topmost(&foo);
        records.save(&path).await.unwrap();
        assert!(!records.is_dirty());

        let loaded = ResultRecords::load(&path).await.unwrap();
        assert_eq!(loaded.selection_count(&foo), 1);
        assert!(loaded.is_topmost(&foo));
    }

    #[tokio::test]
    async fn missing_file_loads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let loaded = ResultRecords::load(&tmp.path().join("none.json")).await.unwrap();
        assert_eq!(loaded.selection_count(&result("a", "Foo", "f")), 0);
    }
}
