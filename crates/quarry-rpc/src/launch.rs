// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! How a process plugin is started: program, arguments, directory, environment.

use std::path::PathBuf;

use quarry_core::types::{HostEnvironment, Interpreter, PluginMetadata};
use tokio::process::Command;

pub const ENV_VERSION: &str = "QUARRY_VERSION";
pub const ENV_PROGRAM_DIRECTORY: &str = "QUARRY_PROGRAM_DIRECTORY";
pub const ENV_APPLICATION_DIRECTORY: &str = "QUARRY_APPLICATION_DIRECTORY";

/// Host-wide inputs for building launch specs.
#[derive(Debug, Clone)]
pub struct LaunchSettings {
    pub python_path: String,
    pub node_path: String,
    pub environment: HostEnvironment,
}

impl Default for LaunchSettings {
    fn default() -> Self {
        Self {
            python_path: "python3".to_string(),
            node_path: "node".to_string(),
            environment: HostEnvironment::default(),
        }
    }
}

/// Fully resolved command line for one plugin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub working_dir: PathBuf,
    pub env: Vec<(String, String)>,
}

impl LaunchSpec {
    pub fn for_plugin(metadata: &PluginMetadata, settings: &LaunchSettings) -> Self {
        let script = metadata.executable_path();
        let (program, args) = match metadata.runtime.interpreter() {
            Interpreter::Python => (
                PathBuf::from(&settings.python_path),
                vec!["-B".to_string(), script.to_string_lossy().into_owned()],
            ),
            Interpreter::Node => (
                PathBuf::from(&settings.node_path),
                vec![script.to_string_lossy().into_owned()],
            ),
            Interpreter::None => (script, Vec::new()),
        };

        let environment = &settings.environment;
        Self {
            program,
            args,
            working_dir: metadata.directory.clone(),
            env: vec![
                (ENV_VERSION.to_string(), environment.version.clone()),
                (
                    ENV_PROGRAM_DIRECTORY.to_string(),
                    environment.program_directory.to_string_lossy().into_owned(),
                ),
                (
                    ENV_APPLICATION_DIRECTORY.to_string(),
                    environment.application_directory.to_string_lossy().into_owned(),
                ),
            ],
        }
    }

    /// Builds the command, appending `request` as the final argument when given.
    /// Stdio is left to the caller.
    pub fn command(&self, request: Option<&str>) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(request) = request {
            command.arg(request);
        }
        command.current_dir(&self.working_dir);
        command.envs(self.env.iter().map(|(k, v)| (k.as_str(), v.as_str())));
        command
    }
}
