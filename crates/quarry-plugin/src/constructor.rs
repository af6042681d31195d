// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-runtime constructors that turn metadata into live plugin instances.
//!
//! The registry never inspects runtimes itself. It looks up the constructor
//! registered for a manifest's runtime in a [`ConstructorTable`]. In-process
//! plugins are resolved by name through a [`NativeCatalog`] of typed factories.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use quarry_core::types::{PluginMetadata, Query, Runtime, SearchResult};
use quarry_core::{QuarryError, SearchPlugin};
use tokio_util::sync::CancellationToken;

/// Builds the live capability object for one runtime class.
pub trait PluginConstructor: Send + Sync {
    fn construct(&self, metadata: &Arc<PluginMetadata>) -> Result<Arc<dyn SearchPlugin>, QuarryError>;
}

/// Factory for one in-process plugin component.
pub trait PluginFactory: Send + Sync {
    /// Component name a manifest's `ExecuteFileName` refers to.
    fn component(&self) -> &str;

    /// Create a new plugin instance.
    fn create(&self, metadata: &PluginMetadata) -> Result<Arc<dyn SearchPlugin>, QuarryError>;
}

/// Closure-backed [`PluginFactory`].
pub struct FnFactory<F> {
    component: String,
    create: F,
}

impl<F> FnFactory<F>
where
    F: Fn(&PluginMetadata) -> Result<Arc<dyn SearchPlugin>, QuarryError> + Send + Sync,
{
    pub fn new(component: impl Into<String>, create: F) -> Self {
        Self {
            component: component.into(),
            create,
        }
    }
}

impl<F> PluginFactory for FnFactory<F>
where
    F: Fn(&PluginMetadata) -> Result<Arc<dyn SearchPlugin>, QuarryError> + Send + Sync,
{
    fn component(&self) -> &str {
        &self.component
    }

    fn create(&self, metadata: &PluginMetadata) -> Result<Arc<dyn SearchPlugin>, QuarryError> {
        (self.create)(metadata)
    }
}

/// Typed table of in-process components, keyed by component name.
#[derive(Default)]
pub struct NativeCatalog {
    factories: HashMap<String, Box<dyn PluginFactory>>,
}

impl NativeCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, factory: Box<dyn PluginFactory>) {
        self.factories.insert(factory.component().to_string(), factory);
    }

    pub fn with(mut self, factory: Box<dyn PluginFactory>) -> Self {
        self.register(factory);
        self
    }

    /// Component names, sorted.
    pub fn components(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

impl PluginConstructor for NativeCatalog {
    fn construct(&self, metadata: &Arc<PluginMetadata>) -> Result<Arc<dyn SearchPlugin>, QuarryError> {
        let factory = self
            .factories
            .get(&metadata.execute_file_name)
            .ok_or_else(|| QuarryError::Construction {
                plugin: metadata.id.clone(),
                reason: format!(
                    "no native component named '{}'",
                    metadata.execute_file_name
                ),
            })?;
        factory.create(metadata)
    }
}

impl std::fmt::Debug for NativeCatalog {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NativeCatalog")
            .field("components", &self.components())
            .finish()
    }
}

/// Runtime to constructor mapping, resolved once at load time.
#[derive(Default, Clone)]
pub struct ConstructorTable {
    constructors: HashMap<Runtime, Arc<dyn PluginConstructor>>,
}

impl ConstructorTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, runtime: Runtime, constructor: Arc<dyn PluginConstructor>) {
        self.constructors.insert(runtime, constructor);
    }

    /// Registers the same constructor for several runtimes.
    pub fn register_all(&mut self, runtimes: &[Runtime], constructor: Arc<dyn PluginConstructor>) {
        for runtime in runtimes {
            self.register(*runtime, Arc::clone(&constructor));
        }
    }

    pub fn supports(&self, runtime: Runtime) -> bool {
        self.constructors.contains_key(&runtime)
    }

    pub fn construct(&self, metadata: &Arc<PluginMetadata>) -> Result<Arc<dyn SearchPlugin>, QuarryError> {
        let constructor = self
            .constructors
            .get(&metadata.runtime)
            .ok_or_else(|| QuarryError::Construction {
                plugin: metadata.id.clone(),
                reason: format!("no constructor registered for runtime '{}'", metadata.runtime),
            })?;
        constructor.construct(metadata)
    }
}

/// Stand-in for a plugin whose construction failed. Kept disabled so the
/// plugin still shows up in listings with its failure reason.
#[derive(Debug)]
pub struct FailedPlugin {
    reason: String,
}

impl FailedPlugin {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }

    pub fn reason(&self) -> &str {
        &self.reason
    }
}

#[async_trait]
impl SearchPlugin for FailedPlugin {
    async fn query(
        &self,
        _query: &Query,
        _cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, QuarryError> {
        Err(QuarryError::Internal(self.reason.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Echo;

    #[async_trait]
    impl SearchPlugin for Echo {
        async fn query(
            &self,
            query: &Query,
            _cancel: CancellationToken,
        ) -> Result<Vec<SearchResult>, QuarryError> {
            Ok(vec![SearchResult::new(query.search(), "", 0)])
        }
    }

    fn metadata(runtime: Runtime, component: &str) -> Arc<PluginMetadata> {
        Arc::new(
            PluginMetadata::new("echo", "Echo", semver::Version::new(1, 0, 0), runtime)
                .with_execute_file_name(component),
        )
    }

    fn table() -> ConstructorTable {
        let catalog = NativeCatalog::new().with(Box::new(FnFactory::new("Echo", |_: &PluginMetadata| {
            Ok(Arc::new(Echo) as Arc<dyn SearchPlugin>)
        })));
        let mut table = ConstructorTable::new();
        table.register(Runtime::Native, Arc::new(catalog));
        table
    }

    #[test]
    fn native_component_is_resolved_by_name() {
        assert!(table().construct(&metadata(Runtime::Native, "Echo")).is_ok());
    }

    #[test]
    fn unknown_native_component_is_a_construction_error() {
        let err = match table().construct(&metadata(Runtime::Native, "Missing")) {
            Err(e) => e,
            Ok(_) => panic!("expected construction error"),
        };
        assert!(matches!(err, QuarryError::Construction { .. }));
        assert!(err.to_string().contains("no native component named 'Missing'"));
    }

    #[test]
    fn runtime_without_constructor_is_a_construction_error() {
        let table = table();
        assert!(!table.supports(Runtime::Python));
        let err = match table.construct(&metadata(Runtime::Python, "main.py")) {
            Err(e) => e,
            Ok(_) => panic!("expected construction error"),
        };
        assert!(err.to_string().contains("runtime 'python'"));
    }

    #[tokio::test]
    async fn failed_plugin_reports_reason() {
        let failed = FailedPlugin::new("boom");
        let query = Query::new("x", vec!["x".into()], "", "x");
        let err = failed.query(&query, CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("boom"));
    }
}
