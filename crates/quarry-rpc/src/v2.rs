// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistent duplex transport.
//!
//! One worker process per plugin is started at `init` and kept for every
//! later call. Reload starts a replacement, makes it current, and only then
//! kills the previous process.

use std::process::Stdio;
use std::sync::Arc;
use std::time::Duration;

use arc_swap::ArcSwapOption;
use async_trait::async_trait;
use quarry_core::types::{PluginMetadata, Query, RpcAction, SearchResult};
use quarry_core::{Capabilities, PluginInitContext, QuarryError, SearchPlugin};
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::process::{Child, ChildStderr};
use tokio::sync::{Mutex, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::{ContextSlot, accept_response};
use crate::connection::{ConnectionOptions, RpcConnection};
use crate::launch::LaunchSpec;
use crate::protocol::{QueryResponse, initialize_params, query_params};
use crate::supervisor::ProcessSupervisor;

#[derive(Debug, Clone)]
pub struct V2Options {
    pub connection: ConnectionOptions,
    pub request_timeout: Duration,
    pub startup_timeout: Duration,
}

/// One running worker process and its connection.
struct ProcessUnit {
    pid: Option<u32>,
    child: Mutex<Child>,
    connection: RpcConnection,
}

impl ProcessUnit {
    async fn shutdown(&self, supervisor: &ProcessSupervisor) {
        if let Err(e) = self.connection.notify("close", json!([])) {
            debug!(error = %e, "could not send close to plugin");
        }
        self.connection.close();
        let mut child = self.child.lock().await;
        supervisor.terminate(&mut child).await;
    }
}

pub struct V2Plugin {
    metadata: Arc<PluginMetadata>,
    launch: LaunchSpec,
    supervisor: Arc<ProcessSupervisor>,
    options: V2Options,
    context: ContextSlot,
    current: ArcSwapOption<ProcessUnit>,
    /// Serializes start, reload, and dispose.
    lifecycle: Mutex<()>,
}

impl V2Plugin {
    pub fn new(
        metadata: Arc<PluginMetadata>,
        launch: LaunchSpec,
        supervisor: Arc<ProcessSupervisor>,
        options: V2Options,
    ) -> Self {
        Self {
            metadata,
            launch,
            supervisor,
            options,
            context: ContextSlot::default(),
            current: ArcSwapOption::empty(),
            lifecycle: Mutex::new(()),
        }
    }

    /// Process id of the worker currently answering calls.
    pub fn current_pid(&self) -> Option<u32> {
        self.current.load().as_ref().and_then(|unit| unit.pid)
    }

    fn unit(&self) -> Result<Arc<ProcessUnit>, QuarryError> {
        self.current
            .load_full()
            .ok_or_else(|| QuarryError::transport(&self.metadata.id, "plugin process is not running"))
    }

    /// Spawns a worker, wires its streams, and runs `initialize` against it.
    ///
    /// Any stderr output before `initialize` answers fails the start.
    async fn start_unit(&self, context: &PluginInitContext) -> Result<Arc<ProcessUnit>, QuarryError> {
        let plugin = &self.metadata.id;
        let mut command = self.launch.command(None);
        command
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        let mut child = self.supervisor.spawn(plugin, &mut command)?;

        let (Some(stdin), Some(stdout), Some(stderr)) =
            (child.stdin.take(), child.stdout.take(), child.stderr.take())
        else {
            self.supervisor.terminate(&mut child).await;
            return Err(QuarryError::transport(plugin, "plugin process has no stdio pipes"));
        };

        let connection = match RpcConnection::spawn(
            plugin.clone(),
            stdout,
            stdin,
            &self.options.connection,
            Arc::clone(&context.host),
        ) {
            Ok(connection) => connection,
            Err(e) => {
                self.supervisor.terminate(&mut child).await;
                return Err(QuarryError::transport_with(plugin, "invalid framing", e));
            }
        };

        let (first_line_tx, first_line_rx) = oneshot::channel();
        tokio::spawn(watch_stderr(plugin.to_string(), stderr, first_line_tx));

        let unit = Arc::new(ProcessUnit {
            pid: child.id(),
            child: Mutex::new(child),
            connection,
        });

        let params = initialize_params(&self.metadata, &context.settings.snapshot());
        let outcome = {
            let never = CancellationToken::new();
            let initialize = unit
                .connection
                .call("initialize", params, &never, self.options.startup_timeout);
            tokio::pin!(initialize);

            tokio::select! {
                reply = &mut initialize => reply.map(|_| ()),
                line = first_line_rx => match line {
                    Ok(text) => Err(QuarryError::transport(
                        plugin,
                        format!("plugin wrote to stderr during initialization: {text}"),
                    )),
                    Err(_) => initialize.await.map(|_| ()),
                },
            }
        };

        match outcome {
            Ok(()) => {
                debug!(plugin = %plugin, pid = ?unit.pid, "plugin process initialized");
                Ok(unit)
            }
            Err(e) => {
                unit.shutdown(&self.supervisor).await;
                Err(e)
            }
        }
    }

    async fn call(
        &self,
        method: &str,
        params: Value,
        cancel: &CancellationToken,
    ) -> Result<Value, QuarryError> {
        let unit = self.unit()?;
        let reply = unit
            .connection
            .call(method, params, cancel, self.options.request_timeout)
            .await;
        match reply {
            // The worker was replaced mid-call.
            Err(QuarryError::Transport { .. }) if !self.is_current(&unit) => {
                debug!(plugin = %self.metadata.id, method, "call dropped by reload");
                Err(QuarryError::Cancelled)
            }
            other => other,
        }
    }

    fn is_current(&self, unit: &Arc<ProcessUnit>) -> bool {
        self.current
            .load()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, unit))
    }

    /// Turns a call outcome into results. Errors raised by the plugin itself
    /// are swallowed; transport failures propagate.
    async fn results_from(&self, reply: Result<Value, QuarryError>) -> Result<Vec<SearchResult>, QuarryError> {
        let value = match reply {
            Ok(value) => value,
            Err(e @ QuarryError::PluginRuntime { .. }) => {
                warn!(plugin = %self.metadata.id, error = %e, "plugin call failed");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        let response = QueryResponse::from_value(value).map_err(|e| {
            QuarryError::transport_with(&self.metadata.id, "malformed response from plugin", e)
        })?;
        let context = self.context.get();
        Ok(accept_response(&self.metadata, context.as_deref(), response).await)
    }
}

async fn watch_stderr(plugin: String, stderr: ChildStderr, first_line: oneshot::Sender<String>) {
    let mut first_line = Some(first_line);
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                warn!(plugin = %plugin, line = %line, "plugin stderr");
                if let Some(tx) = first_line.take() {
                    let _ = tx.send(line.to_string());
                }
            }
            Ok(None) => break,
            Err(e) => {
                debug!(plugin = %plugin, error = %e, "stopped reading plugin stderr");
                break;
            }
        }
    }
}

#[async_trait]
impl SearchPlugin for V2Plugin {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            context_menu: true,
            settings: true,
            reload: true,
            dispose: true,
        }
    }

    async fn init(&self, context: PluginInitContext) -> Result<(), QuarryError> {
        let _lifecycle = self.lifecycle.lock().await;
        let unit = self.start_unit(&context).await?;
        self.context.set(context);
        if let Some(stale) = self.current.swap(Some(unit)) {
            stale.shutdown(&self.supervisor).await;
        }
        Ok(())
    }

    async fn query(
        &self,
        query: &Query,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, QuarryError> {
        let params = query_params(query, &self.context.settings());
        let reply = self.call("query", params, &cancel).await;
        self.results_from(reply).await
    }

    async fn context_menu(&self, result: &SearchResult) -> Result<Vec<SearchResult>, QuarryError> {
        let data = result.context_data.clone().unwrap_or(Value::Null);
        let reply = self
            .call("context_menu", json!([data]), &CancellationToken::new())
            .await;
        self.results_from(reply).await
    }

    async fn execute(&self, action: &RpcAction) -> Result<bool, QuarryError> {
        let hide = !action.dont_hide_after_action;
        if action.method.is_empty() {
            return Ok(hide);
        }
        match self
            .call(&action.method, Value::Array(action.parameters.clone()), &CancellationToken::new())
            .await
        {
            Ok(_) => {}
            Err(e @ QuarryError::PluginRuntime { .. }) => {
                warn!(plugin = %self.metadata.id, method = %action.method, error = %e, "plugin action failed");
            }
            Err(e) => return Err(e),
        }
        Ok(hide)
    }

    async fn reload(&self) -> Result<(), QuarryError> {
        let _lifecycle = self.lifecycle.lock().await;
        let context = self.context.require(&self.metadata)?;
        let fresh = self.start_unit(&context).await?;
        let fresh_pid = fresh.pid;
        if let Some(previous) = self.current.swap(Some(fresh)) {
            previous.shutdown(&self.supervisor).await;
        }
        info!(plugin = %self.metadata.id, pid = ?fresh_pid, "plugin process reloaded");
        Ok(())
    }

    async fn dispose(&self) -> Result<(), QuarryError> {
        let _lifecycle = self.lifecycle.lock().await;
        if let Some(unit) = self.current.swap(None) {
            unit.shutdown(&self.supervisor).await;
            debug!(plugin = %self.metadata.id, "plugin process stopped");
        }
        Ok(())
    }
}

impl std::fmt::Debug for V2Plugin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("V2Plugin")
            .field("plugin", &self.metadata.id)
            .field("framing", &self.options.connection.framing)
            .field("pid", &self.current_pid())
            .finish()
    }
}
