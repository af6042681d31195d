// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine assembly for the CLI.

use std::sync::Arc;

use quarry_config::QuarryConfig;
use quarry_core::QuarryError;
use quarry_host::{Engine, EngineOptions};
use quarry_plugin::JsonSettingsStore;
use tracing::info;

use crate::builtin;
use crate::terminal::TerminalShell;

/// Starts an engine over the configured plugin folders plus the built-in plugins.
pub async fn start_engine(config: &QuarryConfig, terminal: Arc<TerminalShell>) -> Result<Engine, QuarryError> {
    let settings_directory = config.settings_directory();
    info!(
        roots = ?config.plugin_directories(),
        settings = %settings_directory.display(),
        "starting engine"
    );

    Engine::builder(EngineOptions::from_config(config))
        .natives(builtin::catalog())
        .builtins(builtin::manifests(&config.host.program_directory))
        .settings_store(Arc::new(JsonSettingsStore::new(settings_directory)))
        .shell(terminal)
        .start()
        .await
}
