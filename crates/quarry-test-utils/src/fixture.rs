// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! On-disk plugin roots for loader and end-to-end tests.
//!
//! `PluginFixture` owns a temporary directory and writes one folder per
//! plugin, each holding a `plugin.json` and optionally a script.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tempfile::TempDir;

/// A temporary plugin root. Removed when dropped.
pub struct PluginFixture {
    root: TempDir,
}

impl PluginFixture {
    pub fn new() -> std::io::Result<Self> {
        Ok(Self {
            root: TempDir::new()?,
        })
    }

    pub fn root(&self) -> &Path {
        self.root.path()
    }

    /// Manifest roots to hand to the registry.
    pub fn roots(&self) -> Vec<PathBuf> {
        vec![self.root.path().to_path_buf()]
    }

    /// Writes `folder/plugin.json` with the given manifest body.
    pub fn add_manifest(&self, folder: &str, manifest: &Value) -> std::io::Result<PathBuf> {
        let dir = self.root.path().join(folder);
        std::fs::create_dir_all(&dir)?;
        let body = serde_json::to_string_pretty(manifest).map_err(std::io::Error::other)?;
        std::fs::write(dir.join("plugin.json"), body)?;
        Ok(dir)
    }

    /// Writes a manifest for a native component.
    pub fn add_native(
        &self,
        id: &str,
        version: &str,
        component: &str,
        keywords: &[&str],
    ) -> std::io::Result<PathBuf> {
        self.add_manifest(
            &format!("{id}-{version}"),
            &json!({
                "ID": id,
                "Name": id,
                "Version": version,
                "Language": "native",
                "ExecuteFileName": component,
                "ActionKeywords": keywords,
            }),
        )
    }

    /// Writes an executable shell script plugin for the given runtime tag.
    ///
    /// The script is `run.sh` inside the plugin folder and is marked
    /// executable on unix.
    pub fn add_script(
        &self,
        id: &str,
        language: &str,
        keywords: &[&str],
        script: &str,
    ) -> std::io::Result<PathBuf> {
        let dir = self.add_manifest(
            id,
            &json!({
                "ID": id,
                "Name": id,
                "Version": "1.0.0",
                "Language": language,
                "ExecuteFileName": "run.sh",
                "ActionKeywords": keywords,
            }),
        )?;
        let path = dir.join("run.sh");
        std::fs::write(&path, format!("#!/bin/sh\n{script}"))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755))?;
        }
        Ok(dir)
    }

    /// Marks a plugin folder as pending deletion.
    pub fn mark_for_deletion(&self, folder: &str) -> std::io::Result<()> {
        std::fs::write(self.root.path().join(folder).join("NeedDelete.txt"), "")
    }

    /// Writes `SettingsTemplate.toml` into a plugin folder.
    pub fn add_settings_template(&self, folder: &str, template: &str) -> std::io::Result<()> {
        std::fs::write(
            self.root.path().join(folder).join("SettingsTemplate.toml"),
            template,
        )
    }
}
