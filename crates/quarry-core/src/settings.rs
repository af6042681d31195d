// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Live per-plugin settings shared between the host and a plugin transport.

use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use serde_json::Value;

use crate::types::{PluginId, SettingsDelta};

/// Opaque key/value settings as loaded from and saved to a [`SettingsStore`](crate::SettingsStore).
pub type SettingsMap = serde_json::Map<String, Value>;

/// In-memory settings for one plugin.
///
/// Snapshots are merged into outgoing requests; deltas returned by the plugin
/// are merged back in. Any change marks the settings dirty until saved.
#[derive(Debug)]
pub struct PluginSettings {
    plugin: PluginId,
    values: DashMap<String, Value>,
    dirty: AtomicBool,
}

impl PluginSettings {
    pub fn new(plugin: PluginId, initial: SettingsMap) -> Self {
        Self {
            plugin,
            values: initial.into_iter().collect(),
            dirty: AtomicBool::new(false),
        }
    }

    pub fn empty(plugin: PluginId) -> Self {
        Self::new(plugin, SettingsMap::new())
    }

    pub fn plugin(&self) -> &PluginId {
        &self.plugin
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        self.values.get(key).map(|v| v.value().clone())
    }

    pub fn set(&self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
        self.dirty.store(true, Ordering::Release);
    }

    /// Inserts defaults for keys that are not present yet. Returns how many were added.
    pub fn fill_defaults(&self, defaults: SettingsMap) -> usize {
        let mut added = 0;
        for (key, value) in defaults {
            if !self.values.contains_key(&key) {
                self.values.insert(key, value);
                added += 1;
            }
        }
        if added > 0 {
            self.dirty.store(true, Ordering::Release);
        }
        added
    }

    /// Merges a plugin-supplied delta, overwriting existing keys.
    pub fn merge(&self, delta: &SettingsDelta) {
        if delta.is_empty() {
            return;
        }
        for (key, value) in delta {
            self.values.insert(key.clone(), value.clone());
        }
        self.dirty.store(true, Ordering::Release);
    }

    /// Point-in-time copy, sorted by key for stable serialization.
    pub fn snapshot(&self) -> SettingsMap {
        let mut entries: Vec<(String, Value)> = self
            .values
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(&b.0));
        entries.into_iter().collect()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    pub fn mark_clean(&self) {
        self.dirty.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn map(v: Value) -> SettingsMap {
        v.as_object().cloned().unwrap()
    }

    #[test]
    fn merge_overwrites_and_marks_dirty() {
        let settings = PluginSettings::new("p".into(), map(json!({"a": 1, "b": "x"})));
        assert!(!settings.is_dirty());

        settings.merge(&map(json!({"b": "y", "c": true})));
        assert!(settings.is_dirty());
        assert_eq!(settings.snapshot(), map(json!({"a": 1, "b": "y", "c": true})));
    }

    #[test]
    fn empty_delta_is_not_a_change() {
        let settings = PluginSettings::empty("p".into());
        settings.merge(&SettingsMap::new());
        assert!(!settings.is_dirty());
    }

    #[test]
    fn defaults_never_override_stored_values() {
        let settings = PluginSettings::new("p".into(), map(json!({"a": 1})));
        let added = settings.fill_defaults(map(json!({"a": 2, "b": false})));
        assert_eq!(added, 1);
        assert_eq!(settings.get("a"), Some(json!(1)));
        assert_eq!(settings.get("b"), Some(json!(false)));
    }

    #[test]
    fn mark_clean_resets_dirty_flag() {
        let settings = PluginSettings::empty("p".into());
        settings.set("k", json!("v"));
        assert!(settings.is_dirty());
        settings.mark_clean();
        assert!(!settings.is_dirty());
    }
}
