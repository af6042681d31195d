// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Settings adapter glue: a JSON file store, template defaults, and the
//! per-plugin settings hub the host shares with plugin transports.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use quarry_core::settings::{PluginSettings, SettingsMap};
use quarry_core::types::{PluginId, PluginMetadata};
use quarry_core::{QuarryError, SettingsStore};
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, warn};

/// File name of the optional settings template inside a plugin folder.
pub const SETTINGS_TEMPLATE_FILE_NAME: &str = "SettingsTemplate.toml";

/// Stores one pretty-printed JSON file per plugin under a directory.
#[derive(Debug, Clone)]
pub struct JsonSettingsStore {
    directory: PathBuf,
}

impl JsonSettingsStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn path_for(&self, plugin: &PluginId) -> PathBuf {
        self.directory.join(format!("{}.json", plugin.as_str()))
    }
}

fn settings_error(
    plugin: &PluginId,
    source: impl std::error::Error + Send + Sync + 'static,
) -> QuarryError {
    QuarryError::Settings {
        plugin: plugin.clone(),
        source: Box::new(source),
    }
}

#[async_trait]
impl SettingsStore for JsonSettingsStore {
    async fn load(&self, plugin: &PluginId) -> Result<SettingsMap, QuarryError> {
        let path = self.path_for(plugin);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(SettingsMap::new()),
            Err(e) => return Err(settings_error(plugin, e)),
        };
        serde_json::from_str(&content).map_err(|e| settings_error(plugin, e))
    }

    async fn save(&self, plugin: &PluginId, settings: &SettingsMap) -> Result<(), QuarryError> {
        tokio::fs::create_dir_all(&self.directory)
            .await
            .map_err(|e| settings_error(plugin, e))?;
        let body = serde_json::to_string_pretty(settings).map_err(|e| settings_error(plugin, e))?;

        let path = self.path_for(plugin);
        let tmp = path.with_extension("json.tmp");
        tokio::fs::write(&tmp, body)
            .await
            .map_err(|e| settings_error(plugin, e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| settings_error(plugin, e))
    }
}

/// Parsed `SettingsTemplate.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsTemplate {
    #[serde(default)]
    pub body: Vec<TemplateEntry>,
}

/// One control in a settings template.
#[derive(Debug, Clone, Deserialize)]
pub struct TemplateEntry {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Option<TemplateAttributes>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplateAttributes {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub default_value: Option<String>,
}

/// Control types whose value is persisted. Display-only types are not stored.
const STORED_KINDS: [&str; 7] = [
    "input",
    "inputWithFileBtn",
    "inputWithFolderBtn",
    "textarea",
    "passwordBox",
    "dropdown",
    "checkbox",
];

impl SettingsTemplate {
    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Reads the template from a plugin folder, if present.
    pub fn read_from(directory: &Path) -> Option<Self> {
        let path = directory.join(SETTINGS_TEMPLATE_FILE_NAME);
        let content = std::fs::read_to_string(&path).ok()?;
        match Self::parse(&content) {
            Ok(template) => Some(template),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring invalid settings template");
                None
            }
        }
    }

    /// Default values for every stored control.
    pub fn defaults(&self) -> SettingsMap {
        let mut defaults = SettingsMap::new();
        for entry in &self.body {
            if !STORED_KINDS.contains(&entry.kind.as_str()) {
                continue;
            }
            let Some(attributes) = &entry.attributes else {
                continue;
            };
            let Some(name) = &attributes.name else {
                continue;
            };
            let raw = attributes.default_value.clone().unwrap_or_default();
            let value = if entry.kind == "checkbox" {
                Value::Bool(raw.trim().eq_ignore_ascii_case("true"))
            } else {
                Value::String(raw)
            };
            defaults.insert(name.clone(), value);
        }
        defaults
    }
}

/// Live settings for every plugin, backed by a [`SettingsStore`].
pub struct SettingsHub {
    store: Arc<dyn SettingsStore>,
    entries: DashMap<PluginId, Arc<PluginSettings>>,
}

impl SettingsHub {
    pub fn new(store: Arc<dyn SettingsStore>) -> Self {
        Self {
            store,
            entries: DashMap::new(),
        }
    }

    /// Loads (once) the settings of a plugin and fills template defaults.
    ///
    /// A store failure is logged and the plugin starts from defaults.
    pub async fn load(&self, metadata: &PluginMetadata) -> Arc<PluginSettings> {
        if let Some(existing) = self.entries.get(&metadata.id) {
            return Arc::clone(existing.value());
        }

        let stored = match self.store.load(&metadata.id).await {
            Ok(map) => map,
            Err(e) => {
                warn!(plugin = %metadata.id, error = %e, "failed to load plugin settings, using defaults");
                SettingsMap::new()
            }
        };
        let settings = PluginSettings::new(metadata.id.clone(), stored);
        if let Some(template) = SettingsTemplate::read_from(&metadata.directory) {
            let added = settings.fill_defaults(template.defaults());
            debug!(plugin = %metadata.id, added, "applied settings template defaults");
        }

        let settings = Arc::new(settings);
        self.entries
            .entry(metadata.id.clone())
            .or_insert_with(|| Arc::clone(&settings))
            .value()
            .clone()
    }

    pub fn get(&self, plugin: &PluginId) -> Option<Arc<PluginSettings>> {
        self.entries.get(plugin).map(|e| Arc::clone(e.value()))
    }

    /// Persists one plugin's settings if they changed.
    pub async fn save(&self, plugin: &PluginId) -> Result<(), QuarryError> {
        let Some(settings) = self.get(plugin) else {
            return Err(QuarryError::PluginNotFound(plugin.clone()));
        };
        if !settings.is_dirty() {
            return Ok(());
        }
        self.store.save(plugin, &settings.snapshot()).await?;
        settings.mark_clean();
        Ok(())
    }

    /// Persists every dirty entry. Returns the failures; other plugins still save.
    pub async fn save_all(&self) -> Vec<QuarryError> {
        let plugins: Vec<PluginId> = self.entries.iter().map(|e| e.key().clone()).collect();
        let mut errors = Vec::new();
        for plugin in plugins {
            if let Err(e) = self.save(&plugin).await {
                warn!(plugin = %plugin, error = %e, "failed to save plugin settings");
                errors.push(e);
            }
        }
        errors
    }
}

impl std::fmt::Debug for SettingsHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsHub")
            .field("plugins", &self.entries.len())
            .finish()
    }
}
