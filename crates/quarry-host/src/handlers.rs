// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Handlers behind every [`HostMethod`] a plugin may call.

use std::future::Future;
use std::sync::Arc;

use quarry_core::host::{HostApiTable, HostCall, HostHandler, HostMethod};
use quarry_core::types::PluginId;
use quarry_core::{HostShell, QuarryError};
use quarry_plugin::{PluginRegistry, SettingsHub};
use quarry_query::QueryOrchestrator;
use quarry_router::KeywordRouter;
use quarry_rpc::QueryResponse;
use serde_json::Value;
use tracing::{debug, info, warn};

/// What host methods act on.
pub(crate) struct HostServices {
    pub registry: Arc<PluginRegistry>,
    pub router: Arc<KeywordRouter>,
    pub orchestrator: Arc<QueryOrchestrator>,
    pub settings: Arc<SettingsHub>,
    pub shell: Arc<dyn HostShell>,
}

fn handler<F, Fut>(services: &Arc<HostServices>, f: F) -> HostHandler
where
    F: Fn(Arc<HostServices>, HostCall) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, QuarryError>> + Send + 'static,
{
    let services = Arc::clone(services);
    HostHandler::new(move |call| f(Arc::clone(&services), call))
}

/// Builds the table with a handler for every host method.
pub(crate) fn host_api(services: &Arc<HostServices>) -> HostApiTable {
    HostApiTable::new()
        .with(HostMethod::ChangeQuery, handler(services, change_query))
        .with(HostMethod::ShowMsg, handler(services, show_msg))
        .with(HostMethod::ShowMsgError, handler(services, show_msg_error))
        .with(HostMethod::CopyToClipboard, handler(services, copy_to_clipboard))
        .with(HostMethod::OpenUrl, handler(services, open_url))
        .with(HostMethod::ReQuery, handler(services, re_query))
        .with(HostMethod::SavePluginSettings, handler(services, save_plugin_settings))
        .with(HostMethod::AddActionKeyword, handler(services, add_action_keyword))
        .with(HostMethod::RemoveActionKeyword, handler(services, remove_action_keyword))
        .with(HostMethod::ActionKeywordAssigned, handler(services, action_keyword_assigned))
        .with(HostMethod::LogDebug, handler(services, log_debug))
        .with(HostMethod::LogInfo, handler(services, log_info))
        .with(HostMethod::LogWarn, handler(services, log_warn))
        .with(HostMethod::UpdateResults, handler(services, update_results))
}

async fn change_query(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    let query = call.str_param(0)?;
    let requery = call.bool_param(1);
    services.shell.change_query(query, requery);
    if requery {
        services.orchestrator.dispatch(query);
    }
    Ok(Value::Null)
}

async fn show_msg(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    services
        .shell
        .show_msg(call.str_param_or_empty(0), call.str_param_or_empty(1));
    Ok(Value::Null)
}

async fn show_msg_error(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    services
        .shell
        .show_error(call.str_param_or_empty(0), call.str_param_or_empty(1));
    Ok(Value::Null)
}

async fn copy_to_clipboard(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    services.shell.copy_to_clipboard(call.str_param(0)?);
    Ok(Value::Null)
}

async fn open_url(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    services.shell.open_url(call.str_param(0)?);
    Ok(Value::Null)
}

async fn re_query(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    match services.orchestrator.current() {
        Some(generation) => {
            debug!(plugin = %call.caller, raw = generation.query.raw(), "plugin requested requery");
            services.orchestrator.dispatch(generation.query.raw());
        }
        None => debug!(plugin = %call.caller, "requery with no current query"),
    }
    Ok(Value::Null)
}

async fn save_plugin_settings(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    services.settings.save(&call.caller).await?;
    Ok(Value::Null)
}

async fn add_action_keyword(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    let plugin = PluginId::new(call.str_param(0)?);
    services.router.add_keyword(&plugin, call.str_param(1)?)?;
    Ok(Value::Null)
}

async fn remove_action_keyword(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    let plugin = PluginId::new(call.str_param(0)?);
    let removed = services.router.remove_keyword(&plugin, call.str_param(1)?)?;
    Ok(Value::Bool(removed))
}

async fn action_keyword_assigned(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    Ok(Value::Bool(services.router.is_assigned(call.str_param(0)?)))
}

/// `[message]` or `[source, message]`.
fn log_parts(call: &HostCall) -> (&str, &str) {
    if call.params.len() > 1 {
        (call.str_param_or_empty(0), call.str_param_or_empty(1))
    } else {
        ("", call.str_param_or_empty(0))
    }
}

async fn log_debug(_services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    let (source, message) = log_parts(&call);
    debug!(plugin = %call.caller, source, "{message}");
    Ok(Value::Null)
}

async fn log_info(_services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    let (source, message) = log_parts(&call);
    info!(plugin = %call.caller, source, "{message}");
    Ok(Value::Null)
}

async fn log_warn(_services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    let (source, message) = log_parts(&call);
    warn!(plugin = %call.caller, source, "{message}");
    Ok(Value::Null)
}

/// `[rawQuery, results]`. Replies whether the batch was merged.
async fn update_results(services: Arc<HostServices>, call: HostCall) -> Result<Value, QuarryError> {
    let raw_query = call.str_param(0)?;
    let handle = services
        .registry
        .get(&call.caller)
        .ok_or_else(|| QuarryError::PluginNotFound(call.caller.clone()))?;
    let payload = call.params.get(1).cloned().unwrap_or(Value::Null);
    let results = QueryResponse::from_value(payload)
        .map_err(|e| QuarryError::transport_with(&call.caller, "malformed UpdateResults payload", e))?
        .into_results(&handle.metadata.directory);

    let accepted = services.orchestrator.push_late(handle, raw_query, results);
    Ok(Value::Bool(accepted))
}
