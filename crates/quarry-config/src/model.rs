// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Quarry plugin engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Top-level Quarry configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QuarryConfig {
    /// Host identity, directories, and interpreters.
    #[serde(default)]
    pub host: HostConfig,

    /// Plugin discovery and per-plugin overrides.
    #[serde(default)]
    pub plugins: PluginsConfig,

    /// Query dispatch, merge, and ranking settings.
    #[serde(default)]
    pub query: QueryConfig,

    /// Process transport settings.
    #[serde(default)]
    pub transport: TransportConfig,
}

impl QuarryConfig {
    /// Manifest roots to scan, falling back to `<application_directory>/plugins`.
    pub fn plugin_directories(&self) -> Vec<PathBuf> {
        if self.plugins.directories.is_empty() {
            vec![self.host.application_directory.join("plugins")]
        } else {
            self.plugins.directories.clone()
        }
    }

    /// Directory holding one settings file per plugin.
    pub fn settings_directory(&self) -> PathBuf {
        self.plugins
            .settings_directory
            .clone()
            .unwrap_or_else(|| self.host.application_directory.join("settings").join("plugins"))
    }
}

/// Host identity and process-launch configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct HostConfig {
    /// Version string exported to plugins as `QUARRY_VERSION`.
    #[serde(default = "default_version")]
    pub version: String,

    /// Directory of the host program, exported as `QUARRY_PROGRAM_DIRECTORY`.
    #[serde(default = "default_program_directory")]
    pub program_directory: PathBuf,

    /// Per-user data directory, exported as `QUARRY_APPLICATION_DIRECTORY`.
    #[serde(default = "default_application_directory")]
    pub application_directory: PathBuf,

    /// Python interpreter used for `python` and `python_v2` plugins.
    #[serde(default = "default_python_path")]
    pub python_path: String,

    /// Node interpreter used for JavaScript and TypeScript plugins.
    #[serde(default = "default_node_path")]
    pub node_path: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            version: default_version(),
            program_directory: default_program_directory(),
            application_directory: default_application_directory(),
            python_path: default_python_path(),
            node_path: default_node_path(),
            log_level: default_log_level(),
        }
    }
}

fn default_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

fn default_program_directory() -> PathBuf {
    std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.to_path_buf()))
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_application_directory() -> PathBuf {
    dirs::data_dir()
        .map(|p| p.join("quarry"))
        .unwrap_or_else(|| PathBuf::from(".quarry"))
}

fn default_python_path() -> String {
    "python3".to_string()
}

fn default_node_path() -> String {
    "node".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Plugin discovery and per-plugin overrides.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PluginsConfig {
    /// Manifest roots. Empty means `<application_directory>/plugins`.
    #[serde(default)]
    pub directories: Vec<PathBuf>,

    /// Where plugin settings files live. Unset means
    /// `<application_directory>/settings/plugins`.
    #[serde(default)]
    pub settings_directory: Option<PathBuf>,

    /// Plugin ids that start disabled.
    #[serde(default)]
    pub disabled: Vec<String>,

    /// Priority overrides keyed by plugin id.
    #[serde(default)]
    pub priorities: BTreeMap<String, i32>,

    /// Action keyword overrides keyed by plugin id.
    #[serde(default)]
    pub action_keywords: BTreeMap<String, Vec<String>>,
}

/// Query dispatch, merge, and ranking configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct QueryConfig {
    /// Window in which near-simultaneous plugin completions coalesce into one merge pass.
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Delay after dispatch before a progress event is emitted for an unfinished generation.
    #[serde(default = "default_progress_delay_ms")]
    pub progress_delay_ms: u64,

    /// Score added per point of plugin priority.
    #[serde(default = "default_priority_weight")]
    pub priority_weight: i32,

    /// Score added per previous selection of the same result.
    #[serde(default = "default_selection_bonus")]
    pub selection_bonus: i32,

    /// Maximum results per merged snapshot. Zero keeps everything.
    #[serde(default)]
    pub max_results: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            debounce_ms: default_debounce_ms(),
            progress_delay_ms: default_progress_delay_ms(),
            priority_weight: default_priority_weight(),
            selection_bonus: default_selection_bonus(),
            max_results: 0,
        }
    }
}

fn default_debounce_ms() -> u64 {
    20
}

fn default_progress_delay_ms() -> u64 {
    200
}

fn default_priority_weight() -> i32 {
    50
}

fn default_selection_bonus() -> i32 {
    5
}

/// Process transport configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TransportConfig {
    /// Per-request timeout for process plugins. Zero disables the timeout.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,

    /// Time allowed for a persistent plugin to answer `initialize`.
    #[serde(default = "default_startup_timeout_ms")]
    pub startup_timeout_ms: u64,

    /// Frame delimiter for `executable_stream` plugins.
    #[serde(default = "default_delimiter")]
    pub delimiter: String,

    /// Read size used by the delimiter framer.
    #[serde(default = "default_read_chunk_size")]
    pub read_chunk_size: usize,

    /// Escape backslashes and double quotes in the V1 request argument.
    /// Only for plugins that re-parse their argument as a quoted command-line
    /// string; a plain argv element already carries the JSON intact.
    #[serde(default)]
    pub escape_v1_arguments: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
            startup_timeout_ms: default_startup_timeout_ms(),
            delimiter: default_delimiter(),
            read_chunk_size: default_read_chunk_size(),
            escape_v1_arguments: false,
        }
    }
}

fn default_request_timeout_ms() -> u64 {
    10_000
}

fn default_startup_timeout_ms() -> u64 {
    10_000
}

fn default_delimiter() -> String {
    "..**".to_string()
}

fn default_read_chunk_size() -> usize {
    512
}
