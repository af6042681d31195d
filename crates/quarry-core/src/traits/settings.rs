// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence boundary for per-plugin settings.

use async_trait::async_trait;

use crate::error::QuarryError;
use crate::settings::SettingsMap;
use crate::types::PluginId;

/// Key/value store for plugin settings, keyed by plugin identity.
///
/// A plugin with nothing stored loads as an empty map.
#[async_trait]
pub trait SettingsStore: Send + Sync + 'static {
    async fn load(&self, plugin: &PluginId) -> Result<SettingsMap, QuarryError>;

    async fn save(&self, plugin: &PluginId, settings: &SettingsMap) -> Result<(), QuarryError>;
}
