// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./quarry.toml` > `~/.config/quarry/quarry.toml` > `/etc/quarry/quarry.toml`
//! with environment variable overrides via `QUARRY_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};

use crate::model::QuarryConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/quarry/quarry.toml` (system-wide)
/// 3. `~/.config/quarry/quarry.toml` (user XDG config)
/// 4. `./quarry.toml` (local directory)
/// 5. `QUARRY_*` environment variables
pub fn load_config() -> Result<QuarryConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
pub fn load_config_from_str(toml_content: &str) -> Result<QuarryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuarryConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<QuarryConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(QuarryConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(QuarryConfig::default()))
        .merge(Toml::file("/etc/quarry/quarry.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("quarry/quarry.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("quarry.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")`: `QUARRY_QUERY_DEBOUNCE_MS`
/// must map to `query.debounce_ms`, not `query.debounce.ms`.
fn env_provider() -> Env {
    Env::prefixed("QUARRY_").map(|key| map_env_key(key.as_str()).into())
}

/// Map a prefix-stripped env var name onto a dotted config path.
///
/// Figment hands the key over in its original case.
pub(crate) fn map_env_key(key: &str) -> String {
    let key = key.to_ascii_lowercase();
    for section in ["host", "plugins", "query", "transport"] {
        if let Some(rest) = key.strip_prefix(section).and_then(|r| r.strip_prefix('_')) {
            return format!("{section}.{rest}");
        }
    }
    key
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_keys_map_to_first_section_only() {
        assert_eq!(map_env_key("query_debounce_ms"), "query.debounce_ms");
        assert_eq!(map_env_key("host_log_level"), "host.log_level");
        assert_eq!(map_env_key("transport_read_chunk_size"), "transport.read_chunk_size");
        assert_eq!(map_env_key("plugins_settings_directory"), "plugins.settings_directory");
        assert_eq!(map_env_key("unrelated"), "unrelated");
    }

    #[test]
    fn env_keys_arrive_upper_case() {
        assert_eq!(map_env_key("QUERY_DEBOUNCE_MS"), "query.debounce_ms");
        assert_eq!(
            map_env_key("TRANSPORT_ESCAPE_V1_ARGUMENTS"),
            "transport.escape_v1_arguments"
        );
    }
}
