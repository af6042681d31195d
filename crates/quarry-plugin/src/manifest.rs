// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin manifest parsing from `plugin.json` files.
//!
//! Every plugin folder carries one manifest naming the plugin's identity,
//! runtime, action keywords, and executable target. Keys are PascalCase;
//! unknown keys are ignored so manifests written for newer hosts still load.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use quarry_core::types::{PluginMetadata, Runtime, WILDCARD_KEYWORD};
use quarry_core::QuarryError;
use serde::Deserialize;

/// File name of a plugin manifest inside its folder.
pub const MANIFEST_FILE_NAME: &str = "plugin.json";

/// Marker file for a plugin folder pending removal; such folders are skipped.
pub const PENDING_DELETE_MARKER: &str = "NeedDelete.txt";

/// Parsed and validated plugin manifest.
#[derive(Debug, Clone, PartialEq)]
pub struct PluginManifest {
    pub id: String,
    pub name: String,
    pub version: semver::Version,
    pub author: String,
    pub website: String,
    pub description: String,
    pub runtime: Runtime,
    /// Always at least one entry; legacy single keywords are normalized into a list.
    pub action_keywords: Vec<String>,
    /// Executable target relative to the plugin folder, or a native component name.
    pub execute_file_name: String,
    pub icon_path: Option<String>,
    pub priority: i32,
    pub disabled: bool,
    /// Folder the manifest was read from.
    pub directory: PathBuf,
}

impl PluginManifest {
    /// Absolute path of the executable target.
    pub fn executable_path(&self) -> PathBuf {
        self.directory.join(&self.execute_file_name)
    }

    /// Converts into runtime metadata.
    pub fn into_metadata(self) -> PluginMetadata {
        let icon_path = self.icon_path.as_ref().map(|p| self.directory.join(p));
        let mut metadata = PluginMetadata::new(self.id, self.name, self.version, self.runtime)
            .with_keywords(self.action_keywords)
            .with_directory(self.directory)
            .with_execute_file_name(self.execute_file_name)
            .with_priority(self.priority)
            .with_disabled(self.disabled);
        metadata.author = self.author;
        metadata.website = self.website;
        metadata.description = self.description;
        metadata.icon_path = icon_path;
        metadata
    }
}

/// Raw `plugin.json` shape.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ManifestFile {
    #[serde(rename = "ID")]
    id: String,
    name: String,
    version: String,
    #[serde(default)]
    author: String,
    #[serde(default)]
    website: String,
    #[serde(default)]
    description: String,
    language: String,
    #[serde(default)]
    execute_file_name: String,
    #[serde(default)]
    action_keywords: Option<Vec<String>>,
    /// Older manifests carry a single keyword instead of a list.
    #[serde(default)]
    action_keyword: Option<String>,
    #[serde(default)]
    ico_path: Option<String>,
    #[serde(default)]
    priority: i32,
    #[serde(default)]
    disabled: bool,
}

/// Parse a manifest from JSON content read out of `directory`.
///
/// Validates identity, semver version, runtime tag, and the presence of an
/// execute target. Does not touch the filesystem.
pub fn parse_plugin_manifest(json: &str, directory: &Path) -> Result<PluginManifest, QuarryError> {
    let manifest_path = directory.join(MANIFEST_FILE_NAME);
    let invalid = |reason: String| QuarryError::Manifest {
        path: manifest_path.clone(),
        reason,
    };

    let file: ManifestFile =
        serde_json::from_str(json).map_err(|e| invalid(format!("malformed JSON: {e}")))?;

    if file.id.trim().is_empty() {
        return Err(invalid("ID must not be empty".to_string()));
    }
    if file.name.trim().is_empty() {
        return Err(invalid("Name must not be empty".to_string()));
    }

    let version = semver::Version::parse(file.version.trim())
        .map_err(|e| invalid(format!("invalid Version '{}': {e}", file.version)))?;

    let runtime = Runtime::from_str(file.language.trim())
        .map_err(|_| invalid(format!("unsupported Language '{}'", file.language)))?;

    if file.execute_file_name.trim().is_empty() {
        return Err(invalid("ExecuteFileName must not be empty".to_string()));
    }

    Ok(PluginManifest {
        id: file.id,
        name: file.name,
        version,
        author: file.author,
        website: file.website,
        description: file.description,
        runtime,
        action_keywords: normalize_keywords(file.action_keywords, file.action_keyword),
        execute_file_name: file.execute_file_name,
        icon_path: file.ico_path,
        priority: file.priority,
        disabled: file.disabled,
        directory: directory.to_path_buf(),
    })
}

/// Read and validate the manifest of one plugin folder.
///
/// Process runtimes must have their executable target on disk. Native
/// components are resolved against the factory table at construction time.
pub fn read_manifest(directory: &Path) -> Result<PluginManifest, QuarryError> {
    let path = directory.join(MANIFEST_FILE_NAME);
    let content = std::fs::read_to_string(&path).map_err(|e| QuarryError::Manifest {
        path: path.clone(),
        reason: format!("unreadable: {e}"),
    })?;

    let manifest = parse_plugin_manifest(&content, directory)?;

    if !manifest.runtime.is_native() && !manifest.executable_path().is_file() {
        return Err(QuarryError::Manifest {
            path,
            reason: format!(
                "execute target {} does not exist",
                manifest.executable_path().display()
            ),
        });
    }

    Ok(manifest)
}

fn normalize_keywords(list: Option<Vec<String>>, legacy: Option<String>) -> Vec<String> {
    let keywords: Vec<String> = match (list, legacy) {
        (Some(list), _) if !list.is_empty() => list,
        (_, Some(single)) => vec![single],
        _ => Vec::new(),
    }
    .into_iter()
    .map(|k| k.trim().to_string())
    .filter(|k| !k.is_empty())
    .collect();

    if keywords.is_empty() {
        vec![WILDCARD_KEYWORD.to_string()]
    } else {
        keywords
    }
}
