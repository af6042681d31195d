// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! State both process transports keep after `init`, and the conversion of a
//! plugin's answer into host results.

use std::sync::Arc;

use arc_swap::ArcSwapOption;
use quarry_core::host::HostMethod;
use quarry_core::settings::SettingsMap;
use quarry_core::types::PluginMetadata;
use quarry_core::{PluginInitContext, QuarryError, SearchResult};
use serde_json::json;
use tracing::{debug, warn};

use crate::protocol::QueryResponse;

/// Holds the init context once the host has initialized the plugin.
#[derive(Debug, Default)]
pub struct ContextSlot {
    inner: ArcSwapOption<PluginInitContext>,
}

impl ContextSlot {
    pub fn set(&self, context: PluginInitContext) {
        self.inner.store(Some(Arc::new(context)));
    }

    pub fn get(&self) -> Option<Arc<PluginInitContext>> {
        self.inner.load_full()
    }

    pub fn require(&self, metadata: &PluginMetadata) -> Result<Arc<PluginInitContext>, QuarryError> {
        self.get()
            .ok_or_else(|| QuarryError::transport(&metadata.id, "plugin used before initialization"))
    }

    /// Current settings values, empty before initialization.
    pub fn settings(&self) -> SettingsMap {
        self.get()
            .map(|ctx| ctx.settings.snapshot())
            .unwrap_or_default()
    }
}

/// Applies the side effects of a response and returns its results.
///
/// A debug message is shown through the host; a settings delta is merged.
pub async fn accept_response(
    metadata: &PluginMetadata,
    context: Option<&PluginInitContext>,
    response: QueryResponse,
) -> Vec<SearchResult> {
    if let Some(context) = context {
        if let Some(message) = response.debug_message.as_deref().filter(|m| !m.is_empty()) {
            let shown = context
                .host
                .dispatch(
                    &metadata.id,
                    &HostMethod::ShowMsg.to_string(),
                    vec![json!(metadata.name), json!(message)],
                )
                .await;
            if let Err(e) = shown {
                debug!(plugin = %metadata.id, error = %e, "failed to show debug message");
            }
        }
        if let Some(delta) = response.settings_change.as_ref() {
            context.settings.merge(delta);
        }
    } else if response.settings_change.is_some() {
        warn!(plugin = %metadata.id, "dropping settings change sent before initialization");
    }
    response.into_results(&metadata.directory)
}
