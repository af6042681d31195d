// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Constructor for every process runtime.

use std::sync::Arc;
use std::time::Duration;

use quarry_core::types::{PluginMetadata, ProtocolGeneration, Runtime};
use quarry_core::{QuarryError, SearchPlugin};
use quarry_plugin::{ConstructorTable, PluginConstructor};

use crate::connection::ConnectionOptions;
use crate::framing::Framing;
use crate::launch::{LaunchSettings, LaunchSpec};
use crate::supervisor::ProcessSupervisor;
use crate::v1::{V1Options, V1Plugin};
use crate::v2::{V2Options, V2Plugin};

/// Runtimes served by worker processes.
pub const PROCESS_RUNTIMES: [Runtime; 9] = [
    Runtime::Python,
    Runtime::JavaScript,
    Runtime::TypeScript,
    Runtime::Executable,
    Runtime::PythonV2,
    Runtime::JavaScriptV2,
    Runtime::TypeScriptV2,
    Runtime::ExecutableV2,
    Runtime::ExecutableStream,
];

/// Transport tuning shared by all process plugins.
#[derive(Debug, Clone)]
pub struct TransportSettings {
    pub request_timeout: Duration,
    pub startup_timeout: Duration,
    pub delimiter: Vec<u8>,
    pub read_chunk_size: usize,
    pub escape_v1_arguments: bool,
}

impl Default for TransportSettings {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            startup_timeout: Duration::from_secs(10),
            delimiter: crate::framing::DEFAULT_DELIMITER.to_vec(),
            read_chunk_size: 512,
            escape_v1_arguments: false,
        }
    }
}

/// Builds V1 or V2 transports depending on the manifest runtime.
#[derive(Debug)]
pub struct ProcessConstructor {
    launch: LaunchSettings,
    transport: TransportSettings,
    supervisor: Arc<ProcessSupervisor>,
}

impl ProcessConstructor {
    pub fn new(
        launch: LaunchSettings,
        transport: TransportSettings,
        supervisor: Arc<ProcessSupervisor>,
    ) -> Self {
        Self {
            launch,
            transport,
            supervisor,
        }
    }

    /// Registers this constructor for every process runtime.
    pub fn register(self, table: &mut ConstructorTable) {
        table.register_all(&PROCESS_RUNTIMES, Arc::new(self));
    }
}

impl PluginConstructor for ProcessConstructor {
    fn construct(&self, metadata: &Arc<PluginMetadata>) -> Result<Arc<dyn SearchPlugin>, QuarryError> {
        let launch = LaunchSpec::for_plugin(metadata, &self.launch);
        let supervisor = Arc::clone(&self.supervisor);
        let metadata = Arc::clone(metadata);

        match metadata.runtime.generation() {
            ProtocolGeneration::V1 => {
                let options = V1Options {
                    request_timeout: self.transport.request_timeout,
                    escape_arguments: self.transport.escape_v1_arguments,
                };
                Ok(Arc::new(V1Plugin::new(metadata, launch, supervisor, options)))
            }
            ProtocolGeneration::V2 => {
                let framing = Framing::for_runtime(metadata.runtime).ok_or_else(|| {
                    QuarryError::Construction {
                        plugin: metadata.id.clone(),
                        reason: format!("no framing defined for runtime '{}'", metadata.runtime),
                    }
                })?;
                let options = V2Options {
                    connection: ConnectionOptions {
                        framing,
                        delimiter: self.transport.delimiter.clone(),
                        read_chunk_size: self.transport.read_chunk_size,
                    },
                    request_timeout: self.transport.request_timeout,
                    startup_timeout: self.transport.startup_timeout,
                };
                Ok(Arc::new(V2Plugin::new(metadata, launch, supervisor, options)))
            }
            ProtocolGeneration::InProcess => Err(QuarryError::Construction {
                plugin: metadata.id.clone(),
                reason: "in-process plugins are not served by worker processes".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn constructor() -> ProcessConstructor {
        ProcessConstructor::new(
            LaunchSettings::default(),
            TransportSettings::default(),
            Arc::new(ProcessSupervisor::new()),
        )
    }

    fn metadata(runtime: Runtime) -> Arc<PluginMetadata> {
        Arc::new(
            PluginMetadata::new("p", "P", semver::Version::new(1, 0, 0), runtime)
                .with_directory("/plugins/p")
                .with_execute_file_name("main"),
        )
    }

    #[test]
    fn every_process_runtime_is_registered() {
        let mut table = ConstructorTable::new();
        constructor().register(&mut table);
        for runtime in PROCESS_RUNTIMES {
            assert!(table.supports(runtime), "{runtime}");
        }
        assert!(!table.supports(Runtime::Native));
    }

    #[test]
    fn generations_pick_their_transport() {
        let constructor = constructor();
        let v1 = constructor.construct(&metadata(Runtime::Python)).unwrap();
        assert!(!v1.capabilities().reload);
        let v2 = constructor.construct(&metadata(Runtime::ExecutableStream)).unwrap();
        assert!(v2.capabilities().reload);
    }

    #[test]
    fn native_runtime_is_refused() {
        let err = match constructor().construct(&metadata(Runtime::Native)) {
            Err(e) => e,
            Ok(_) => panic!("expected construction error"),
        };
        assert!(matches!(err, QuarryError::Construction { .. }));
    }
}
