// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as non-empty interpreter paths, a usable frame delimiter, and timing
//! relationships between the debounce window and the progress delay.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::QuarryConfig;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &QuarryConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if !LOG_LEVELS.contains(&config.host.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "host.log_level `{}` must be one of: {}",
                config.host.log_level,
                LOG_LEVELS.join(", ")
            ),
        });
    }

    if config.host.python_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "host.python_path must not be empty".to_string(),
        });
    }

    if config.host.node_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "host.node_path must not be empty".to_string(),
        });
    }

    for (i, dir) in config.plugins.directories.iter().enumerate() {
        if dir.as_os_str().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("plugins.directories[{i}] must not be empty"),
            });
        }
    }

    let mut seen_disabled = HashSet::new();
    for id in &config.plugins.disabled {
        if !seen_disabled.insert(id) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate plugin id `{id}` in plugins.disabled"),
            });
        }
    }

    for (id, keywords) in &config.plugins.action_keywords {
        if keywords.is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("plugins.action_keywords.{id} must list at least one keyword"),
            });
        }
        if keywords.iter().any(|k| k.trim().is_empty() || k.contains(char::is_whitespace)) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "plugins.action_keywords.{id} contains an empty keyword or one with whitespace"
                ),
            });
        }
    }

    if config.query.debounce_ms > config.query.progress_delay_ms {
        errors.push(ConfigError::Validation {
            message: format!(
                "query.debounce_ms ({}) must not exceed query.progress_delay_ms ({})",
                config.query.debounce_ms, config.query.progress_delay_ms
            ),
        });
    }

    if config.query.priority_weight < 0 {
        errors.push(ConfigError::Validation {
            message: format!(
                "query.priority_weight must be non-negative, got {}",
                config.query.priority_weight
            ),
        });
    }

    if config.transport.delimiter.is_empty() {
        errors.push(ConfigError::Validation {
            message: "transport.delimiter must not be empty".to_string(),
        });
    }

    if config.transport.read_chunk_size == 0 {
        errors.push(ConfigError::Validation {
            message: "transport.read_chunk_size must be at least 1".to_string(),
        });
    }

    if config.transport.startup_timeout_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "transport.startup_timeout_ms must be at least 1".to_string(),
        });
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}
