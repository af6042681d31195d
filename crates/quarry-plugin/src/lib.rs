// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin manifests, registry, per-runtime constructors, and settings persistence.
//!
//! Plugins live in folders carrying a `plugin.json` manifest. The registry
//! discovers them, keeps the newest version of each identity, builds live
//! instances through a [`ConstructorTable`], and initializes them with their
//! persisted settings.

pub mod constructor;
pub mod manifest;
pub mod registry;
pub mod settings;

pub use constructor::{ConstructorTable, FailedPlugin, FnFactory, NativeCatalog, PluginConstructor, PluginFactory};
pub use manifest::{parse_plugin_manifest, read_manifest, PluginManifest, MANIFEST_FILE_NAME};
pub use registry::{
    dedup_latest, discover, Dedup, Discovery, LoadErrors, PluginOverrides, PluginRegistry, PluginStatus,
};
pub use settings::{JsonSettingsStore, SettingsHub, SettingsTemplate};
