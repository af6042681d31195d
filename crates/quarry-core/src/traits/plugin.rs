// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The capability trait every plugin runtime implements.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::QuarryError;
use crate::host::HostApiTable;
use crate::settings::PluginSettings;
use crate::types::{HostEnvironment, PluginMetadata, Query, RpcAction, SearchResult};

/// Optional capabilities a plugin advertises beyond `query`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    pub context_menu: bool,
    pub settings: bool,
    pub reload: bool,
    pub dispose: bool,
}

/// Everything a plugin receives when the host initializes it.
#[derive(Clone)]
pub struct PluginInitContext {
    pub metadata: Arc<PluginMetadata>,
    pub host: Arc<HostApiTable>,
    pub settings: Arc<PluginSettings>,
    pub environment: HostEnvironment,
}

impl std::fmt::Debug for PluginInitContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginInitContext")
            .field("plugin", &self.metadata.id)
            .field("environment", &self.environment)
            .finish()
    }
}

/// A live plugin instance, in-process or backed by a worker process.
///
/// Only `query` is mandatory. Optional capabilities have no-op defaults and
/// are advertised through [`SearchPlugin::capabilities`].
#[async_trait]
pub trait SearchPlugin: Send + Sync + 'static {
    fn capabilities(&self) -> Capabilities {
        Capabilities::default()
    }

    /// Called once after construction, before the first query.
    async fn init(&self, context: PluginInitContext) -> Result<(), QuarryError> {
        let _ = context;
        Ok(())
    }

    /// Answers one query. Implementations should stop early once `cancel` fires.
    async fn query(
        &self,
        query: &Query,
        cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, QuarryError>;

    /// Extra actions for a result this plugin produced.
    async fn context_menu(&self, result: &SearchResult) -> Result<Vec<SearchResult>, QuarryError> {
        let _ = result;
        Ok(Vec::new())
    }

    /// Sends a result's RPC action back to the plugin. Returns whether the host should hide.
    async fn execute(&self, action: &RpcAction) -> Result<bool, QuarryError> {
        Err(QuarryError::Internal(format!(
            "plugin does not accept RPC action `{}`",
            action.method
        )))
    }

    /// Rebuilds whatever state or worker the plugin keeps.
    async fn reload(&self) -> Result<(), QuarryError> {
        Ok(())
    }

    /// Releases resources on host shutdown.
    async fn dispose(&self) -> Result<(), QuarryError> {
        Ok(())
    }
}
