// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire types shared by both protocol generations.
//!
//! Call-per-query plugins receive a bare `{method, parameters, settings}`
//! request. Persistent plugins speak JSON-RPC 2.0. Both answer queries with
//! the same result objects; PascalCase and camelCase keys are accepted.

use std::path::Path;

use quarry_core::settings::SettingsMap;
use quarry_core::types::{PluginMetadata, Query, RpcAction, SearchResult, SettingsDelta};
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

pub const JSONRPC_VERSION: &str = "2.0";

/// JSON-RPC internal error code, used when a host handler fails.
pub const INTERNAL_ERROR: i64 = -32603;

/// Request passed to a call-per-query plugin.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct V1Request {
    #[serde(alias = "Method")]
    pub method: String,
    #[serde(default, alias = "Parameters")]
    pub parameters: Vec<Value>,
    #[serde(default, alias = "Settings", skip_serializing_if = "Option::is_none")]
    pub settings: Option<SettingsMap>,
}

impl V1Request {
    pub fn new(method: impl Into<String>, parameters: Vec<Value>) -> Self {
        Self {
            method: method.into(),
            parameters,
            settings: None,
        }
    }

    pub fn with_settings(mut self, settings: SettingsMap) -> Self {
        self.settings = Some(settings);
        self
    }
}

/// One result object as a plugin writes it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WireResult {
    #[serde(alias = "Title")]
    pub title: String,
    #[serde(alias = "SubTitle", alias = "subtitle")]
    pub sub_title: String,
    #[serde(alias = "IcoPath", skip_serializing_if = "Option::is_none")]
    pub ico_path: Option<String>,
    #[serde(alias = "Score")]
    pub score: i32,
    #[serde(
        rename = "jsonRPCAction",
        alias = "JsonRPCAction",
        alias = "jsonRpcAction",
        skip_serializing_if = "Option::is_none"
    )]
    pub json_rpc_action: Option<RpcAction>,
    #[serde(alias = "ContextData", skip_serializing_if = "Option::is_none")]
    pub context_data: Option<Value>,
    #[serde(alias = "SettingsChange", skip_serializing_if = "Option::is_none")]
    pub settings_change: Option<SettingsDelta>,
}

impl WireResult {
    /// Converts into a host result. Relative icon paths resolve against the plugin folder.
    pub fn into_result(self, plugin_directory: &Path) -> SearchResult {
        let icon_path = self.ico_path.map(|icon| {
            if icon.contains("://") || Path::new(&icon).is_absolute() {
                icon
            } else {
                plugin_directory.join(&icon).to_string_lossy().into_owned()
            }
        });
        SearchResult {
            title: self.title,
            subtitle: self.sub_title,
            icon_path,
            score: self.score,
            rpc_action: self.json_rpc_action,
            context_data: self.context_data,
            settings_change: self.settings_change,
            ..SearchResult::default()
        }
    }
}

/// Body of a query or context-menu answer.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResponse {
    #[serde(default, alias = "Result")]
    pub result: Option<Vec<WireResult>>,
    #[serde(default, alias = "DebugMessage")]
    pub debug_message: Option<String>,
    #[serde(default, alias = "SettingsChange")]
    pub settings_change: Option<SettingsDelta>,
}

impl QueryResponse {
    pub fn parse(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        Self::from_value(serde_json::from_slice(bytes)?)
    }

    /// Accepts either a response object or a bare result array.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        match value {
            Value::Null => Ok(Self::default()),
            Value::Array(_) => Ok(Self {
                result: Some(serde_json::from_value(value)?),
                ..Self::default()
            }),
            other => serde_json::from_value(other),
        }
    }

    pub fn into_results(self, plugin_directory: &Path) -> Vec<SearchResult> {
        self.result
            .unwrap_or_default()
            .into_iter()
            .map(|r| r.into_result(plugin_directory))
            .collect()
    }
}

/// Error object of a JSON-RPC response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RpcErrorObject {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Outgoing JSON-RPC request or notification.
#[derive(Debug, Serialize)]
pub struct RpcRequest<'a> {
    pub jsonrpc: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
    pub method: &'a str,
    pub params: &'a Value,
}

/// Outgoing JSON-RPC response to a plugin-initiated request.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    pub jsonrpc: &'static str,
    pub id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcErrorObject>,
}

impl RpcResponse {
    pub fn success(id: Value, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: Some(result),
            error: None,
        }
    }

    pub fn failure(id: Value, code: i64, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION,
            id,
            result: None,
            error: Some(RpcErrorObject {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawMessage {
    #[serde(default)]
    id: Option<Value>,
    #[serde(default)]
    method: Option<String>,
    #[serde(default)]
    params: Option<Value>,
    #[serde(default)]
    result: Option<Value>,
    #[serde(default)]
    error: Option<RpcErrorObject>,
}

/// A decoded message read from a persistent plugin.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    /// The plugin calls the host and waits for an answer.
    Request {
        id: Value,
        method: String,
        params: Vec<Value>,
    },
    /// The plugin calls the host without waiting.
    Notification { method: String, params: Vec<Value> },
    /// Answer to a host request.
    Response {
        id: u64,
        outcome: Result<Value, RpcErrorObject>,
    },
}

impl Inbound {
    pub fn parse(bytes: &[u8]) -> Result<Self, String> {
        let raw: RawMessage = serde_json::from_slice(bytes).map_err(|e| e.to_string())?;
        match (raw.method, raw.id) {
            (Some(method), Some(id)) if !id.is_null() => Ok(Inbound::Request {
                id,
                method,
                params: positional(raw.params),
            }),
            (Some(method), _) => Ok(Inbound::Notification {
                method,
                params: positional(raw.params),
            }),
            (None, Some(id)) => {
                let id = id
                    .as_u64()
                    .ok_or_else(|| format!("response id {id} is not a request id"))?;
                let outcome = match raw.error {
                    Some(error) => Err(error),
                    None => Ok(raw.result.unwrap_or(Value::Null)),
                };
                Ok(Inbound::Response { id, outcome })
            }
            (None, None) => Err("message has neither method nor id".to_string()),
        }
    }
}

fn positional(params: Option<Value>) -> Vec<Value> {
    match params {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(values)) => values,
        Some(other) => vec![other],
    }
}

/// Parameters of a persistent `query` call.
pub fn query_params(query: &Query, settings: &SettingsMap) -> Value {
    json!([
        {
            "rawQuery": query.raw(),
            "search": query.search(),
            "actionKeyword": query.action_keyword(),
            "terms": query.terms(),
        },
        settings,
    ])
}

/// Parameters of the persistent `initialize` call.
pub fn initialize_params(metadata: &PluginMetadata, settings: &SettingsMap) -> Value {
    json!([
        {
            "currentPluginMetadata": {
                "id": metadata.id.as_str(),
                "name": metadata.name,
                "version": metadata.version.to_string(),
                "language": metadata.runtime.to_string(),
                "actionKeywords": metadata.action_keywords,
                "pluginDirectory": metadata.directory,
                "executeFilePath": metadata.executable_path(),
            },
            "settings": settings,
        }
    ])
}
