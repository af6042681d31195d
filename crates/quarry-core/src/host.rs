// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host API dispatch table for plugin-initiated calls.
//!
//! Process plugins address host methods by name with a positional parameter
//! array. Names resolve against the fixed [`HostMethod`] set; the table maps
//! each method to a handler closure registered at startup.

use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;

use futures::future::BoxFuture;
use serde_json::Value;
use strum::{Display, EnumString};
use tracing::debug;

use crate::error::QuarryError;
use crate::types::PluginId;

/// Prefix marking a method name as targeting the host rather than the plugin.
pub const HOST_METHOD_PREFIX: &str = "Quarry.";

/// Every host method a plugin may call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
pub enum HostMethod {
    ChangeQuery,
    ShowMsg,
    ShowMsgError,
    CopyToClipboard,
    OpenUrl,
    ReQuery,
    SavePluginSettings,
    AddActionKeyword,
    RemoveActionKeyword,
    ActionKeywordAssigned,
    LogDebug,
    LogInfo,
    LogWarn,
    UpdateResults,
}

impl HostMethod {
    /// Resolves a method name, with or without the host prefix.
    pub fn resolve(name: &str) -> Option<Self> {
        let bare = name.strip_prefix(HOST_METHOD_PREFIX).unwrap_or(name);
        HostMethod::from_str(bare).ok()
    }
}

/// One inbound call from a plugin.
#[derive(Debug, Clone)]
pub struct HostCall {
    pub caller: PluginId,
    pub params: Vec<Value>,
}

impl HostCall {
    /// Positional string parameter, or an error naming the missing index.
    pub fn str_param(&self, index: usize) -> Result<&str, QuarryError> {
        self.params
            .get(index)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                QuarryError::Internal(format!("host call expects a string at position {index}"))
            })
    }

    /// Optional string parameter, empty when absent.
    pub fn str_param_or_empty(&self, index: usize) -> &str {
        self.params.get(index).and_then(Value::as_str).unwrap_or("")
    }

    pub fn bool_param(&self, index: usize) -> bool {
        self.params
            .get(index)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }
}

type HandlerFn = dyn Fn(HostCall) -> BoxFuture<'static, Result<Value, QuarryError>> + Send + Sync;

/// Handler closure for one host method.
#[derive(Clone)]
pub struct HostHandler(Arc<HandlerFn>);

impl HostHandler {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn(HostCall) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, QuarryError>> + Send + 'static,
    {
        Self(Arc::new(move |call| Box::pin(f(call))))
    }
}

/// Method name to handler table, built once and shared read-only.
#[derive(Clone, Default)]
pub struct HostApiTable {
    handlers: HashMap<HostMethod, HostHandler>,
}

impl HostApiTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, method: HostMethod, handler: HostHandler) {
        self.handlers.insert(method, handler);
    }

    pub fn with(mut self, method: HostMethod, handler: HostHandler) -> Self {
        self.register(method, handler);
        self
    }

    pub fn contains(&self, method: HostMethod) -> bool {
        self.handlers.contains_key(&method)
    }

    /// Invokes the handler registered for `name`.
    ///
    /// Unknown names and methods without a handler are ignored and reply `null`.
    pub async fn dispatch(
        &self,
        caller: &PluginId,
        name: &str,
        params: Vec<Value>,
    ) -> Result<Value, QuarryError> {
        let Some(method) = HostMethod::resolve(name) else {
            debug!(plugin = %caller, method = name, "ignoring unknown host method");
            return Ok(Value::Null);
        };
        let Some(handler) = self.handlers.get(&method) else {
            debug!(plugin = %caller, %method, "no handler registered for host method");
            return Ok(Value::Null);
        };
        (handler.0)(HostCall {
            caller: caller.clone(),
            params,
        })
        .await
    }
}

impl fmt::Debug for HostApiTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<String> = self.handlers.keys().map(|m| m.to_string()).collect();
        methods.sort();
        f.debug_struct("HostApiTable")
            .field("methods", &methods)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn resolve_accepts_prefixed_and_bare_names() {
        assert_eq!(HostMethod::resolve("Quarry.ChangeQuery"), Some(HostMethod::ChangeQuery));
        assert_eq!(HostMethod::resolve("UpdateResults"), Some(HostMethod::UpdateResults));
        assert_eq!(HostMethod::resolve("Quarry.Nope"), None);
    }

    #[tokio::test]
    async fn dispatch_invokes_registered_handler() {
        let table = HostApiTable::new().with(
            HostMethod::ActionKeywordAssigned,
            HostHandler::new(|call: HostCall| async move {
                Ok::<_, QuarryError>(json!(call.str_param(0)? == "g"))
            }),
        );

        let reply = table
            .dispatch(&"p".into(), "Quarry.ActionKeywordAssigned", vec![json!("g")])
            .await
            .unwrap();
        assert_eq!(reply, json!(true));
    }

    #[tokio::test]
    async fn unknown_method_is_ignored() {
        let table = HostApiTable::new();
        let reply = table
            .dispatch(&"p".into(), "Quarry.FormatDisk", vec![])
            .await
            .unwrap();
        assert_eq!(reply, Value::Null);

        let reply = table.dispatch(&"p".into(), "ShowMsg", vec![]).await.unwrap();
        assert_eq!(reply, Value::Null);
    }

    #[test]
    fn missing_string_param_is_an_error() {
        let call = HostCall {
            caller: "p".into(),
            params: vec![json!(1)],
        };
        assert!(call.str_param(0).is_err());
        assert_eq!(call.str_param_or_empty(3), "");
        assert!(!call.bool_param(0));
    }
}
