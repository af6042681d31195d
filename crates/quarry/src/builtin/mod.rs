// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Native plugins compiled into the binary.
//!
//! Each one is a component in the [`NativeCatalog`] plus a manifest the
//! registry loads alongside the ones found on disk, so user overrides and
//! newer on-disk versions apply to them as well.

mod calculator;
mod command;

use std::path::Path;
use std::sync::Arc;

use quarry_core::{PluginMetadata, Runtime, SearchPlugin, WILDCARD_KEYWORD};
use quarry_plugin::{FnFactory, NativeCatalog, PluginManifest};

use calculator::Calculator;
use command::ShellCommand;

const CALCULATOR: &str = "Calculator";
const SHELL: &str = "Shell";

/// Components for the built-in plugins.
pub fn catalog() -> NativeCatalog {
    NativeCatalog::new()
        .with(Box::new(FnFactory::new(CALCULATOR, |_: &PluginMetadata| {
            Ok(Arc::new(Calculator::new()) as Arc<dyn SearchPlugin>)
        })))
        .with(Box::new(FnFactory::new(SHELL, |_: &PluginMetadata| {
            Ok(Arc::new(ShellCommand::new()) as Arc<dyn SearchPlugin>)
        })))
}

fn manifest(id: &str, component: &str, description: &str, keyword: &str, program_directory: &Path) -> PluginManifest {
    PluginManifest {
        id: id.to_string(),
        name: component.to_string(),
        version: semver::Version::new(1, 0, 0),
        author: "Quarry".to_string(),
        website: String::new(),
        description: description.to_string(),
        runtime: Runtime::Native,
        action_keywords: vec![keyword.to_string()],
        execute_file_name: component.to_string(),
        icon_path: None,
        priority: 0,
        disabled: false,
        directory: program_directory.join("builtin").join(id),
    }
}

/// Manifests for the built-in plugins, rooted under `program_directory`.
pub fn manifests(program_directory: &Path) -> Vec<PluginManifest> {
    vec![
        manifest(
            "quarry.calculator",
            CALCULATOR,
            "Evaluates arithmetic expressions",
            WILDCARD_KEYWORD,
            program_directory,
        ),
        manifest(
            "quarry.shell",
            SHELL,
            "Runs shell commands",
            ">",
            program_directory,
        ),
    ]
}
