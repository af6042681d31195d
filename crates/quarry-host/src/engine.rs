// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The assembled plugin engine.
//!
//! Startup order: construct every plugin, build the keyword router and the
//! orchestrator over them, build the host API table, then initialize the
//! plugins with it. Load failures are reported to the shell once, after the
//! whole pass.

use std::path::PathBuf;
use std::sync::Arc;

use quarry_core::host::HOST_METHOD_PREFIX;
use quarry_core::types::{PluginId, Runtime, SearchResult};
use quarry_core::{HostApiTable, HostShell, PluginHandle, QuarryError, SettingsStore};
use quarry_plugin::{
    ConstructorTable, LoadErrors, NativeCatalog, PluginManifest, PluginRegistry, SettingsHub,
};
use quarry_query::{Generation, QueryEvent, QueryOrchestrator, ResultRecords};
use quarry_router::KeywordRouter;
use quarry_rpc::{ProcessConstructor, ProcessSupervisor};
use tracing::{debug, info, warn};

use crate::handlers::{HostServices, host_api};
use crate::options::EngineOptions;
use crate::shell::LogShell;

/// Collects what [`Engine::start`] needs besides options.
pub struct EngineBuilder {
    options: EngineOptions,
    natives: NativeCatalog,
    builtins: Vec<PluginManifest>,
    store: Option<Arc<dyn SettingsStore>>,
    shell: Option<Arc<dyn HostShell>>,
}

impl EngineBuilder {
    pub fn new(options: EngineOptions) -> Self {
        Self {
            options,
            natives: NativeCatalog::new(),
            builtins: Vec::new(),
            store: None,
            shell: None,
        }
    }

    /// In-process components manifests may name.
    pub fn natives(mut self, natives: NativeCatalog) -> Self {
        self.natives = natives;
        self
    }

    /// Manifests loaded without a plugin folder on disk, usually naming native components.
    pub fn builtins(mut self, builtins: Vec<PluginManifest>) -> Self {
        self.builtins = builtins;
        self
    }

    pub fn settings_store(mut self, store: Arc<dyn SettingsStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn shell(mut self, shell: Arc<dyn HostShell>) -> Self {
        self.shell = Some(shell);
        self
    }

    pub async fn start(self) -> Result<Engine, QuarryError> {
        let store = self
            .store
            .ok_or_else(|| QuarryError::Config("engine needs a settings store".to_string()))?;
        let shell = self.shell.unwrap_or_else(|| Arc::new(LogShell));
        Engine::start(self.options, self.natives, self.builtins, store, shell).await
    }
}

/// Registry, router, orchestrator, and host API wired together.
pub struct Engine {
    registry: Arc<PluginRegistry>,
    router: Arc<KeywordRouter>,
    orchestrator: Arc<QueryOrchestrator>,
    settings: Arc<SettingsHub>,
    host: Arc<HostApiTable>,
    shell: Arc<dyn HostShell>,
    supervisor: Arc<ProcessSupervisor>,
    records_path: Option<PathBuf>,
    load_errors: LoadErrors,
}

impl Engine {
    pub fn builder(options: EngineOptions) -> EngineBuilder {
        EngineBuilder::new(options)
    }

    async fn start(
        options: EngineOptions,
        natives: NativeCatalog,
        builtins: Vec<PluginManifest>,
        store: Arc<dyn SettingsStore>,
        shell: Arc<dyn HostShell>,
    ) -> Result<Self, QuarryError> {
        let supervisor = Arc::new(ProcessSupervisor::new());
        let mut constructors = ConstructorTable::new();
        constructors.register(Runtime::Native, Arc::new(natives));
        ProcessConstructor::new(
            options.launch.clone(),
            options.transport.clone(),
            Arc::clone(&supervisor),
        )
        .register(&mut constructors);

        let (registry, mut load_errors) = PluginRegistry::load_all(
            &options.plugin_roots,
            builtins,
            &options.overrides,
            &constructors,
        );
        let registry = Arc::new(registry);
        let router = Arc::new(KeywordRouter::new(registry.all()));

        let records = match &options.records_path {
            Some(path) => ResultRecords::load(path).await.unwrap_or_else(|e| {
                warn!(error = %e, "ignoring unreadable result records");
                ResultRecords::new()
            }),
            None => ResultRecords::new(),
        };
        let orchestrator = Arc::new(QueryOrchestrator::new(
            Arc::clone(&router),
            Arc::new(records),
            options.orchestrator,
        ));
        let settings = Arc::new(SettingsHub::new(store));

        let services = Arc::new(HostServices {
            registry: Arc::clone(&registry),
            router: Arc::clone(&router),
            orchestrator: Arc::clone(&orchestrator),
            settings: Arc::clone(&settings),
            shell: Arc::clone(&shell),
        });
        let host = Arc::new(host_api(&services));

        let init_errors = registry
            .initialize_all(&host, &settings, &options.environment)
            .await;
        load_errors.merge(init_errors);

        if let Some(message) = load_errors.user_message() {
            warn!(failed = load_errors.failed.len(), "{message}");
            shell.show_error("Plugins failed to load", &message);
        }
        info!(
            plugins = registry.len(),
            enabled = registry.enabled().len(),
            "engine started"
        );

        Ok(Self {
            registry,
            router,
            orchestrator,
            settings,
            host,
            shell,
            supervisor,
            records_path: options.records_path,
            load_errors,
        })
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn router(&self) -> &KeywordRouter {
        &self.router
    }

    pub fn orchestrator(&self) -> &QueryOrchestrator {
        &self.orchestrator
    }

    pub fn host(&self) -> &HostApiTable {
        &self.host
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn records(&self) -> &ResultRecords {
        self.orchestrator.records()
    }

    /// Failures collected while loading and initializing plugins.
    pub fn load_errors(&self) -> &LoadErrors {
        &self.load_errors
    }

    /// Starts a new generation for `raw`, superseding the current one.
    pub fn query(&self, raw: &str) -> Option<Arc<Generation>> {
        self.orchestrator.dispatch(raw)
    }

    pub async fn next_event(&self) -> Option<QueryEvent> {
        self.orchestrator.next_event().await
    }

    /// Dispatches `raw` and waits until the generation completes. Events of
    /// other generations are discarded.
    pub async fn query_once(&self, raw: &str) -> Arc<Vec<SearchResult>> {
        let Some(generation) = self.query(raw) else {
            return Arc::new(Vec::new());
        };
        while let Some(event) = self.next_event().await {
            if let QueryEvent::Completed { generation: id, results, .. } = event
                && id == generation.id
            {
                return results;
            }
        }
        Arc::new(Vec::new())
    }

    fn owner(&self, result: &SearchResult) -> Result<&PluginHandle, QuarryError> {
        let id = result
            .plugin_id
            .as_ref()
            .ok_or_else(|| QuarryError::Internal(format!("result '{}' has no owning plugin", result.title)))?;
        self.registry
            .get(id)
            .ok_or_else(|| QuarryError::PluginNotFound(id.clone()))
    }

    /// Runs the action of a selected result. Returns whether the host should hide.
    pub async fn execute(&self, result: &SearchResult) -> Result<bool, QuarryError> {
        self.records().record_selection(result);

        if let Some(delta) = &result.settings_change
            && let Some(plugin) = &result.plugin_id
            && let Some(settings) = self.settings.get(plugin)
        {
            settings.merge(delta);
        }

        if let Some(action) = &result.action {
            return action.run().await;
        }
        let Some(rpc) = &result.rpc_action else {
            return Ok(true);
        };

        if rpc.method.starts_with(HOST_METHOD_PREFIX) {
            let caller = result
                .plugin_id
                .clone()
                .unwrap_or_else(|| PluginId::new("quarry"));
            self.host
                .dispatch(&caller, &rpc.method, rpc.parameters.clone())
                .await?;
            return Ok(!rpc.dont_hide_after_action);
        }

        let owner = self.owner(result)?;
        debug!(plugin = %owner.id(), method = %rpc.method, "sending result action to plugin");
        owner.plugin.execute(rpc).await
    }

    /// Extra actions for `result`, owned by the same plugin.
    pub async fn context_menu(&self, result: &SearchResult) -> Result<Vec<SearchResult>, QuarryError> {
        let owner = self.owner(result)?;
        if !owner.plugin.capabilities().context_menu {
            return Ok(Vec::new());
        }
        let mut entries = owner.plugin.context_menu(result).await?;
        let sole_keyword = self.router.sole_keyword(owner.id());
        for entry in &mut entries {
            entry.plugin_id = Some(owner.id().clone());
            entry.plugin_directory = Some(owner.metadata.directory.clone());
            entry.action_keyword_assigned = sole_keyword.clone();
        }
        Ok(entries)
    }

    /// Pins `result` above everything else for the query it answered.
    pub fn set_topmost(&self, result: &SearchResult) -> bool {
        self.records().set_topmost(result)
    }

    pub fn remove_topmost(&self, result: &SearchResult) -> bool {
        self.records().remove_topmost(result)
    }

    pub fn is_topmost(&self, result: &SearchResult) -> bool {
        self.records().is_topmost(result)
    }

    /// Rebuilds one plugin's worker or state.
    pub async fn reload_plugin(&self, id: &PluginId) -> Result<(), QuarryError> {
        let handle = self
            .registry
            .get(id)
            .ok_or_else(|| QuarryError::PluginNotFound(id.clone()))?;
        handle.plugin.reload().await?;
        info!(plugin = %id, "plugin reloaded");
        Ok(())
    }

    /// Persists changed plugin settings and result records.
    pub async fn save_settings(&self) -> Result<(), QuarryError> {
        let failures = self.settings.save_all().await;

        if let Some(path) = &self.records_path
            && self.records().is_dirty()
        {
            self.records().save(path).await?;
            debug!(path = %path.display(), "result records saved");
        }

        match failures.len() {
            0 => Ok(()),
            n => Err(QuarryError::Internal(format!(
                "{n} plugin settings failed to save"
            ))),
        }
    }

    /// Cancels queries, saves state, disposes plugins, and kills every worker process.
    pub async fn shutdown(&self) {
        info!("shutting down engine");
        self.orchestrator.shutdown();
        if let Err(e) = self.save_settings().await {
            warn!(error = %e, "failed to save state on shutdown");
        }
        self.registry.dispose_all().await;
        self.supervisor.kill_all();
        debug!("engine shut down");
    }

    pub fn shell(&self) -> &Arc<dyn HostShell> {
        &self.shell
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("plugins", &self.registry.len())
            .field("live_processes", &self.supervisor.live())
            .field("host", &self.host)
            .finish()
    }
}
