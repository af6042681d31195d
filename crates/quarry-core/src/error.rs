// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Quarry plugin engine.

use std::path::PathBuf;

use thiserror::Error;

use crate::types::PluginId;

/// The primary error type used across plugin traits, transports, and the orchestrator.
///
/// The first five variants mirror where a failure originates: manifest loading,
/// plugin construction, the process transport, the plugin itself, and generation
/// cancellation. Callers recover from all of them at the plugin boundary.
#[derive(Debug, Error)]
pub enum QuarryError {
    /// Unreadable or invalid manifest, unsupported runtime, or missing executable.
    #[error("invalid manifest {}: {reason}", path.display())]
    Manifest { path: PathBuf, reason: String },

    /// A plugin could not be built or initialized.
    #[error("failed to construct plugin {plugin}: {reason}")]
    Construction { plugin: PluginId, reason: String },

    /// The process transport failed (spawn, closed stream, malformed payload).
    #[error("transport error for plugin {plugin}: {message}")]
    Transport {
        plugin: PluginId,
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The plugin reported an error or crashed mid-call.
    #[error("plugin {plugin} failed (code {code}): {message}")]
    PluginRuntime {
        plugin: PluginId,
        code: i64,
        message: String,
        data: Option<serde_json::Value>,
    },

    /// The query generation was superseded. Expected control flow, never logged as an error.
    #[error("operation cancelled")]
    Cancelled,

    /// Configuration errors.
    #[error("configuration error: {0}")]
    Config(String),

    /// Settings store failures (read, write, serialization).
    #[error("settings error for plugin {plugin}: {source}")]
    Settings {
        plugin: PluginId,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Requested plugin is not registered.
    #[error("plugin not found: {0}")]
    PluginNotFound(PluginId),

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl QuarryError {
    /// Shorthand for a transport error without an underlying source.
    pub fn transport(plugin: &PluginId, message: impl Into<String>) -> Self {
        QuarryError::Transport {
            plugin: plugin.clone(),
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a transport error wrapping an underlying cause.
    pub fn transport_with(
        plugin: &PluginId,
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        QuarryError::Transport {
            plugin: plugin.clone(),
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    /// Returns true if this error only signals a superseded generation.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, QuarryError::Cancelled)
    }
}
