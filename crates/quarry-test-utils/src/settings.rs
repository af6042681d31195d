// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory settings store for tests.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use quarry_core::settings::SettingsMap;
use quarry_core::types::PluginId;
use quarry_core::{QuarryError, SettingsStore};

/// A settings store backed by a map, with a save counter.
#[derive(Default)]
pub struct MemorySettingsStore {
    entries: Mutex<HashMap<PluginId, SettingsMap>>,
    saves: AtomicUsize,
}

impl MemorySettingsStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-load stored settings for one plugin.
    pub fn with(mut self, plugin: impl Into<PluginId>, settings: serde_json::Value) -> Self {
        if let serde_json::Value::Object(map) = settings {
            self.entries.get_mut().insert(plugin.into(), map);
        }
        self
    }

    /// What was last saved (or pre-loaded) for `plugin`.
    pub async fn stored(&self, plugin: &PluginId) -> Option<SettingsMap> {
        self.entries.lock().await.get(plugin).cloned()
    }

    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl SettingsStore for MemorySettingsStore {
    async fn load(&self, plugin: &PluginId) -> Result<SettingsMap, QuarryError> {
        Ok(self
            .entries
            .lock()
            .await
            .get(plugin)
            .cloned()
            .unwrap_or_default())
    }

    async fn save(&self, plugin: &PluginId, settings: &SettingsMap) -> Result<(), QuarryError> {
        self.saves.fetch_add(1, Ordering::SeqCst);
        self.entries
            .lock()
            .await
            .insert(plugin.clone(), settings.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn unknown_plugin_loads_empty() {
        let store = MemorySettingsStore::new();
        assert!(store.load(&"nope".into()).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_then_load() {
        let store = MemorySettingsStore::new().with("calc", json!({"precision": 2}));
        let id = PluginId::new("calc");
        let mut settings = store.load(&id).await.unwrap();
        assert_eq!(settings["precision"], 2);
        settings.insert("mode".into(), json!("sci"));
        store.save(&id, &settings).await.unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.stored(&id).await.unwrap()["mode"], "sci");
    }
}
