// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Quarry plugin engine.
//!
//! This crate provides the error taxonomy, the shared data model, and the
//! trait definitions used throughout the Quarry workspace. Every plugin
//! runtime, in-process or out-of-process, implements [`SearchPlugin`].

pub mod error;
pub mod host;
pub mod settings;
pub mod traits;
pub mod types;

pub use error::QuarryError;
pub use host::{HOST_METHOD_PREFIX, HostApiTable, HostCall, HostHandler, HostMethod};
pub use settings::{PluginSettings, SettingsMap};
pub use traits::{Capabilities, HostShell, PluginInitContext, SearchPlugin, SettingsStore};
pub use types::{
    HostEnvironment, Interpreter, PluginId, PluginMetadata, PluginStats, ProtocolGeneration,
    Query, ResultAction, RpcAction, Runtime, SearchResult, SettingsDelta, WILDCARD_KEYWORD,
};

/// A plugin paired with its metadata. Cheap to clone; the registry holds the
/// canonical copy and everyone else shares it.
#[derive(Clone)]
pub struct PluginHandle {
    pub metadata: std::sync::Arc<PluginMetadata>,
    pub plugin: std::sync::Arc<dyn SearchPlugin>,
}

impl PluginHandle {
    pub fn new(metadata: std::sync::Arc<PluginMetadata>, plugin: std::sync::Arc<dyn SearchPlugin>) -> Self {
        Self { metadata, plugin }
    }

    pub fn id(&self) -> &PluginId {
        &self.metadata.id
    }
}

impl std::fmt::Debug for PluginHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginHandle")
            .field("metadata", &self.metadata)
            .field("capabilities", &self.plugin.capabilities())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn quarry_error_has_all_variants() {
        let plugin = PluginId::new("test");
        let _manifest = QuarryError::Manifest {
            path: "plugin.json".into(),
            reason: "test".into(),
        };
        let _construction = QuarryError::Construction {
            plugin: plugin.clone(),
            reason: "test".into(),
        };
        let _transport = QuarryError::transport(&plugin, "test");
        let _transport_src =
            QuarryError::transport_with(&plugin, "test", std::io::Error::other("io"));
        let _runtime = QuarryError::PluginRuntime {
            plugin: plugin.clone(),
            code: -32000,
            message: "test".into(),
            data: None,
        };
        let _settings = QuarryError::Settings {
            plugin: plugin.clone(),
            source: Box::new(std::io::Error::other("test")),
        };
        let _not_found = QuarryError::PluginNotFound(plugin);
        let _config = QuarryError::Config("test".into());
        let _timeout = QuarryError::Timeout {
            duration: std::time::Duration::from_secs(10),
        };
        let _internal = QuarryError::Internal("test".into());
        assert!(QuarryError::Cancelled.is_cancellation());
        assert!(!_internal.is_cancellation());
    }

    #[test]
    fn error_messages_name_the_plugin() {
        let err = QuarryError::transport(&PluginId::new("calc"), "stream closed");
        assert_eq!(err.to_string(), "transport error for plugin calc: stream closed");
    }

    #[test]
    fn all_trait_modules_are_exported() {
        fn _assert_search_plugin<T: SearchPlugin>() {}
        fn _assert_settings_store<T: SettingsStore>() {}
        fn _assert_host_shell<T: HostShell>() {}
    }
}
