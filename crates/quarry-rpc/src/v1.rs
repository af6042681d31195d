// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Call-per-query transport.
//!
//! Every query, context-menu request, and action spawns the plugin with the
//! serialized request as its last argument and reads stdout to completion.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use quarry_core::host::HOST_METHOD_PREFIX;
use quarry_core::types::{PluginMetadata, Query, RpcAction, SearchResult};
use quarry_core::{Capabilities, PluginInitContext, QuarryError, SearchPlugin};
use serde_json::{Value, json};
use tokio::io::AsyncReadExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::bridge::{ContextSlot, accept_response};
use crate::escape::escape_argument;
use crate::launch::LaunchSpec;
use crate::protocol::{QueryResponse, V1Request};
use crate::supervisor::ProcessSupervisor;

#[derive(Debug, Clone)]
pub struct V1Options {
    pub request_timeout: Duration,
    /// Escape `\` and `"` in the request argument. Off by default: the
    /// argument is a single argv element, so the plugin reads raw JSON.
    pub escape_arguments: bool,
}

impl Default for V1Options {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
            escape_arguments: false,
        }
    }
}

pub struct V1Plugin {
    metadata: Arc<PluginMetadata>,
    launch: LaunchSpec,
    supervisor: Arc<ProcessSupervisor>,
    options: V1Options,
    context: ContextSlot,
}

impl V1Plugin {
    pub fn new(
        metadata: Arc<PluginMetadata>,
        launch: LaunchSpec,
        supervisor: Arc<ProcessSupervisor>,
        options: V1Options,
    ) -> Self {
        Self {
            metadata,
            launch,
            supervisor,
            options,
            context: ContextSlot::default(),
        }
    }

    /// Serializes a request into the single command-line argument.
    pub fn encode_argument(&self, request: &V1Request) -> Result<String, QuarryError> {
        let json = serde_json::to_string(request)
            .map_err(|e| QuarryError::transport_with(&self.metadata.id, "failed to encode request", e))?;
        Ok(if self.options.escape_arguments {
            escape_argument(&json)
        } else {
            json
        })
    }

    /// Runs the plugin once. `None` means the call produced nothing to parse.
    async fn run(
        &self,
        request: &V1Request,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<u8>>, QuarryError> {
        let plugin = &self.metadata.id;
        let argument = self.encode_argument(request)?;
        let mut command = self.launch.command(Some(&argument));
        command
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = self.supervisor.spawn(plugin, &mut command)?;
        let pid = child.id();
        let (Some(mut stdout), Some(mut stderr)) = (child.stdout.take(), child.stderr.take()) else {
            self.supervisor.terminate(&mut child).await;
            return Err(QuarryError::transport(plugin, "plugin process has no output pipes"));
        };

        let collect = async {
            let mut out = Vec::new();
            let mut err = Vec::new();
            let (read_out, read_err) =
                tokio::join!(stdout.read_to_end(&mut out), stderr.read_to_end(&mut err));
            read_out?;
            read_err?;
            let status = child.wait().await?;
            Ok::<_, std::io::Error>((out, err, status))
        };

        let outcome = tokio::select! {
            _ = cancel.cancelled() => None,
            finished = tokio::time::timeout(self.options.request_timeout, collect) => Some(finished),
        };

        let (stdout, stderr, status) = match outcome {
            None => {
                self.supervisor.terminate(&mut child).await;
                debug!(plugin = %plugin, method = %request.method, "call cancelled, plugin process killed");
                return Ok(None);
            }
            Some(Err(_)) => {
                self.supervisor.terminate(&mut child).await;
                return Err(QuarryError::Timeout {
                    duration: self.options.request_timeout,
                });
            }
            Some(Ok(Err(e))) => {
                self.supervisor.terminate(&mut child).await;
                return Err(QuarryError::transport_with(plugin, "failed to read plugin output", e));
            }
            Some(Ok(Ok(output))) => output,
        };
        if let Some(pid) = pid {
            self.supervisor.release(pid);
        }

        let stderr = String::from_utf8_lossy(&stderr);
        let stderr = stderr.trim();
        if stdout.iter().all(u8::is_ascii_whitespace) {
            if stderr.is_empty() {
                warn!(plugin = %plugin, method = %request.method, "empty response from plugin");
            } else {
                warn!(plugin = %plugin, method = %request.method, stderr = %stderr, "plugin wrote no response");
            }
            return Ok(None);
        }
        if !stderr.is_empty() {
            warn!(plugin = %plugin, stderr = %stderr, "plugin wrote to stderr");
        }
        if !status.success() {
            debug!(plugin = %plugin, %status, "plugin exited unsuccessfully, parsing its output anyway");
        }
        Ok(Some(stdout))
    }

    async fn request_results(
        &self,
        request: V1Request,
        cancel: &CancellationToken,
    ) -> Result<Vec<SearchResult>, QuarryError> {
        let Some(output) = self.run(&request, cancel).await? else {
            return Ok(Vec::new());
        };
        let response = QueryResponse::parse(&output).map_err(|e| {
            QuarryError::transport_with(&self.metadata.id, "malformed response from plugin", e)
        })?;
        let context = self.context.get();
        Ok(accept_response(&self.metadata, context.as_deref(), response).await)
    }
}

#[async_trait]
impl SearchPlugin for V1Plugin {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            context_menu: true,
            settings: true,
            ..Capabilities::default()
        }
    }

    async fn init(&self, context: PluginInitContext) -> Result<(), QuarryError> {
        self.context.set(context);
        Ok(())
    }

    async fn query(
        &self,
        query: &Query,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, QuarryError> {
        let request = V1Request::new("query", vec![json!(query.search())])
            .with_settings(self.context.settings());
        self.request_results(request, &cancel).await
    }

    async fn context_menu(&self, result: &SearchResult) -> Result<Vec<SearchResult>, QuarryError> {
        let data = result.context_data.clone().unwrap_or(Value::Null);
        let request = V1Request::new("context_menu", vec![data]).with_settings(self.context.settings());
        self.request_results(request, &CancellationToken::new()).await
    }

    async fn execute(&self, action: &RpcAction) -> Result<bool, QuarryError> {
        let hide = !action.dont_hide_after_action;
        if action.method.is_empty() {
            return Ok(hide);
        }

        let request = V1Request::new(action.method.clone(), action.parameters.clone())
            .with_settings(self.context.settings());
        let Some(output) = self.run(&request, &CancellationToken::new()).await? else {
            return Ok(hide);
        };

        // An action may answer with a host call of its own.
        match serde_json::from_slice::<V1Request>(&output) {
            Ok(follow_up) if follow_up.method.starts_with(HOST_METHOD_PREFIX) => {
                let context = self.context.require(&self.metadata)?;
                context
                    .host
                    .dispatch(&self.metadata.id, &follow_up.method, follow_up.parameters)
                    .await?;
            }
            Ok(_) => {}
            Err(e) => debug!(plugin = %self.metadata.id, error = %e, "ignoring non-request action output"),
        }
        Ok(hide)
    }
}

impl std::fmt::Debug for V1Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V1Plugin")
            .field("plugin", &self.metadata.id)
            .field("program", &self.launch.program)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::launch::LaunchSettings;
    use quarry_core::types::Runtime;

    fn plugin(escape: bool) -> V1Plugin {
        let metadata = Arc::new(
            PluginMetadata::new("v1", "V1", semver::Version::new(1, 0, 0), Runtime::Executable)
                .with_directory("/plugins/v1")
                .with_execute_file_name("run.sh"),
        );
        let launch = LaunchSpec::for_plugin(&metadata, &LaunchSettings::default());
        V1Plugin::new(
            metadata,
            launch,
            Arc::new(ProcessSupervisor::new()),
            V1Options {
                escape_arguments: escape,
                ..V1Options::default()
            },
        )
    }

    #[test]
    fn argument_is_plain_json_by_default() {
        let v1 = plugin(V1Options::default().escape_arguments);
        let request = V1Request::new("query", vec![json!(r#"a"b\c"#)]);
        let argument = v1.encode_argument(&request).unwrap();
        let decoded: Value = serde_json::from_str(&argument).unwrap();
        assert_eq!(decoded["method"], "query");
        assert_eq!(decoded["parameters"], json!([r#"a"b\c"#]));
    }

    #[test]
    fn argument_is_escaped_json_when_enabled() {
        let request = V1Request::new("query", vec![json!(r#"a"b"#)]);
        assert_eq!(
            plugin(true).encode_argument(&request).unwrap(),
            r#"{\"method\":\"query\",\"parameters\":[\"a\\\"b\"]}"#
        );
        assert_eq!(
            plugin(false).encode_argument(&request).unwrap(),
            r#"{"method":"query","parameters":["a\"b"]}"#
        );
    }

    #[cfg(unix)]
    fn script_plugin(dir: &std::path::Path, body: &str) -> V1Plugin {
        let script = dir.join("run.sh");
        std::fs::write(&script, body).unwrap();
        let metadata = Arc::new(
            PluginMetadata::new("v1", "V1", semver::Version::new(1, 0, 0), Runtime::Executable)
                .with_directory(dir),
        );
        let launch = LaunchSpec {
            program: "/bin/sh".into(),
            args: vec![script.to_string_lossy().into_owned()],
            working_dir: dir.to_path_buf(),
            env: Vec::new(),
        };
        V1Plugin::new(metadata, launch, Arc::new(ProcessSupervisor::new()), V1Options::default())
    }

    #[cfg(unix)]
    #[tokio::test]
    #[tracing_test::traced_test]
    async fn silent_plugin_yields_nothing_and_warns() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin = script_plugin(tmp.path(), "exit 0\n");
        let query = Query::new("x", vec!["x".into()], "", "x");
        let results = plugin.query(&query, CancellationToken::new()).await.unwrap();
        assert!(results.is_empty());
        assert!(logs_contain("empty response from plugin"));
    }

    #[cfg(unix)]
    #[tokio::test]
    #[tracing_test::traced_test]
    async fn stderr_only_plugin_yields_nothing_and_logs_stderr() {
        let tmp = tempfile::tempdir().unwrap();
        let plugin = script_plugin(tmp.path(), "echo 'module not found' >&2\nexit 1\n");
        let query = Query::new("x", vec!["x".into()], "", "x");
        let results = plugin.query(&query, CancellationToken::new()).await.unwrap();
        assert!(results.is_empty());
        assert!(logs_contain("module not found"));
    }

    #[test]
    fn capabilities_advertise_context_menu() {
        let caps = plugin(true).capabilities();
        assert!(caps.context_menu);
        assert!(!caps.reload);
    }
}
