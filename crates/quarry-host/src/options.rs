// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Engine inputs derived from the loaded configuration.

use std::path::PathBuf;
use std::time::Duration;

use quarry_config::QuarryConfig;
use quarry_core::types::HostEnvironment;
use quarry_plugin::PluginOverrides;
use quarry_query::{OrchestratorOptions, RankingPolicy};
use quarry_rpc::{LaunchSettings, TransportSettings};

/// File holding selection counts and topmost pins, inside the application directory.
pub const RECORDS_FILE_NAME: &str = "records.json";

/// Everything the engine needs to start, independent of how it was configured.
#[derive(Debug, Clone)]
pub struct EngineOptions {
    pub plugin_roots: Vec<PathBuf>,
    pub overrides: PluginOverrides,
    pub environment: HostEnvironment,
    pub launch: LaunchSettings,
    pub transport: TransportSettings,
    pub orchestrator: OrchestratorOptions,
    /// Where selection and topmost records persist. `None` keeps them in memory.
    pub records_path: Option<PathBuf>,
}

impl Default for EngineOptions {
    fn default() -> Self {
        Self {
            plugin_roots: Vec::new(),
            overrides: PluginOverrides::default(),
            environment: HostEnvironment::default(),
            launch: LaunchSettings::default(),
            transport: TransportSettings::default(),
            orchestrator: OrchestratorOptions::default(),
            records_path: None,
        }
    }
}

impl EngineOptions {
    pub fn from_config(config: &QuarryConfig) -> Self {
        let environment = HostEnvironment {
            version: config.host.version.clone(),
            program_directory: config.host.program_directory.clone(),
            application_directory: config.host.application_directory.clone(),
        };

        let overrides = PluginOverrides {
            disabled: config.plugins.disabled.iter().cloned().collect(),
            priorities: config
                .plugins
                .priorities
                .iter()
                .map(|(id, priority)| (id.clone(), *priority))
                .collect(),
            action_keywords: config
                .plugins
                .action_keywords
                .iter()
                .map(|(id, keywords)| (id.clone(), keywords.clone()))
                .collect(),
        };

        let transport = &config.transport;
        let query = &config.query;

        Self {
            plugin_roots: config.plugin_directories(),
            overrides,
            launch: LaunchSettings {
                python_path: config.host.python_path.clone(),
                node_path: config.host.node_path.clone(),
                environment: environment.clone(),
            },
            environment,
            transport: TransportSettings {
                request_timeout: request_timeout(transport.request_timeout_ms),
                startup_timeout: Duration::from_millis(transport.startup_timeout_ms),
                delimiter: transport.delimiter.as_bytes().to_vec(),
                read_chunk_size: transport.read_chunk_size,
                escape_v1_arguments: transport.escape_v1_arguments,
            },
            orchestrator: OrchestratorOptions {
                debounce: Duration::from_millis(query.debounce_ms),
                progress_delay: Duration::from_millis(query.progress_delay_ms),
                ranking: RankingPolicy {
                    priority_weight: query.priority_weight,
                    selection_bonus: query.selection_bonus,
                },
                max_results: query.max_results,
            },
            records_path: Some(config.host.application_directory.join(RECORDS_FILE_NAME)),
        }
    }
}

/// Zero disables the timeout.
fn request_timeout(ms: u64) -> Duration {
    if ms == 0 {
        Duration::MAX
    } else {
        Duration::from_millis(ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_maps_onto_engine_options() {
        let config = quarry_config::load_and_validate_str(
            r#"
            [host]
            application_directory = "/tmp/quarry-app"
            node_path = "/usr/local/bin/node"

            [plugins]
            disabled = ["files"]
            priorities = { calc = 3 }
            action_keywords = { web = ["g", "*"] }

            [query]
            debounce_ms = 5
            priority_weight = 10

            [transport]
            request_timeout_ms = 0
            delimiter = "||"
            "#,
        )
        .unwrap();
        let options = EngineOptions::from_config(&config);

        assert_eq!(options.plugin_roots, vec![PathBuf::from("/tmp/quarry-app/plugins")]);
        assert!(options.overrides.disabled.contains("files"));
        assert_eq!(options.overrides.priorities.get("calc"), Some(&3));
        assert_eq!(
            options.overrides.action_keywords.get("web"),
            Some(&vec!["g".to_string(), "*".to_string()])
        );
        assert_eq!(options.launch.node_path, "/usr/local/bin/node");
        assert_eq!(
            options.launch.environment.application_directory,
            PathBuf::from("/tmp/quarry-app")
        );
        assert_eq!(options.transport.request_timeout, Duration::MAX);
        assert_eq!(options.transport.delimiter, b"||".to_vec());
        assert_eq!(options.orchestrator.debounce, Duration::from_millis(5));
        assert_eq!(options.orchestrator.ranking.priority_weight, 10);
        assert_eq!(
            options.records_path,
            Some(PathBuf::from("/tmp/quarry-app/records.json"))
        );
    }

    #[test]
    fn non_zero_timeout_is_kept() {
        assert_eq!(request_timeout(250), Duration::from_millis(250));
    }
}
