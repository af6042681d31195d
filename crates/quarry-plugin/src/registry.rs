// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Plugin registry: discovery, deduplication, construction, and initialization.
//!
//! The `PluginRegistry` owns every [`PluginHandle`]. Loading never aborts on a
//! single bad plugin: manifest problems are reported and skipped, construction
//! and initialization failures leave the plugin registered but disabled, and
//! the failures are batched into one [`LoadErrors`] report.

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use quarry_core::types::{HostEnvironment, PluginId, PluginMetadata};
use quarry_core::{HostApiTable, PluginHandle, PluginInitContext, QuarryError, SearchPlugin};
use tracing::{debug, info, warn};

use crate::constructor::{ConstructorTable, FailedPlugin};
use crate::manifest::{PENDING_DELETE_MARKER, PluginManifest, read_manifest};
use crate::settings::SettingsHub;

/// Status of a plugin in the registry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginStatus {
    /// Plugin answers queries.
    Enabled,
    /// Plugin is disabled by the user or by a failed load.
    Disabled,
}

impl std::fmt::Display for PluginStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PluginStatus::Enabled => write!(f, "enabled"),
            PluginStatus::Disabled => write!(f, "disabled"),
        }
    }
}

/// User overrides applied to manifests after deduplication.
#[derive(Debug, Clone, Default)]
pub struct PluginOverrides {
    pub disabled: HashSet<String>,
    pub priorities: HashMap<String, i32>,
    pub action_keywords: HashMap<String, Vec<String>>,
}

impl PluginOverrides {
    fn apply(&self, manifest: &mut PluginManifest) {
        if self.disabled.contains(&manifest.id) {
            manifest.disabled = true;
        }
        if let Some(priority) = self.priorities.get(&manifest.id) {
            manifest.priority = *priority;
        }
        if let Some(keywords) = self.action_keywords.get(&manifest.id)
            && !keywords.is_empty()
        {
            manifest.action_keywords = keywords.clone();
        }
    }
}

/// Result of scanning manifest roots.
#[derive(Debug, Default)]
pub struct Discovery {
    pub manifests: Vec<PluginManifest>,
    pub errors: Vec<QuarryError>,
    /// Folders skipped because they are pending removal.
    pub skipped: Vec<PathBuf>,
}

/// Result of deduplicating manifests by identity.
#[derive(Debug, Default)]
pub struct Dedup {
    pub unique: Vec<PluginManifest>,
    pub duplicates: Vec<PluginManifest>,
}

/// Everything that went wrong while loading, batched for a single report.
#[derive(Debug, Default)]
pub struct LoadErrors {
    /// Rejected manifests. Logged, never surfaced to the user.
    pub manifests: Vec<QuarryError>,
    /// Non-winning duplicates, as (id, version).
    pub duplicates: Vec<(String, semver::Version)>,
    /// Plugins that failed to construct or initialize and are now disabled.
    pub failed: Vec<(PluginId, String, QuarryError)>,
}

impl LoadErrors {
    pub fn is_empty(&self) -> bool {
        self.manifests.is_empty() && self.duplicates.is_empty() && self.failed.is_empty()
    }

    /// Names of plugins that failed construction or initialization.
    pub fn failed_plugins(&self) -> Vec<&str> {
        self.failed.iter().map(|(_, name, _)| name.as_str()).collect()
    }

    /// The one user-facing message for this load pass, if any plugin failed.
    pub fn user_message(&self) -> Option<String> {
        if self.failed.is_empty() {
            return None;
        }
        let names = self.failed_plugins().join(", ");
        Some(if self.failed.len() == 1 {
            format!("1 plugin failed to load and was disabled: {names}")
        } else {
            format!(
                "{} plugins failed to load and were disabled: {names}",
                self.failed.len()
            )
        })
    }

    pub fn merge(&mut self, other: LoadErrors) {
        self.manifests.extend(other.manifests);
        self.duplicates.extend(other.duplicates);
        self.failed.extend(other.failed);
    }
}

/// Walk each root and read every plugin folder's manifest.
pub fn discover(roots: &[PathBuf]) -> Discovery {
    let mut discovery = Discovery::default();

    for root in roots {
        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!(root = %root.display(), error = %e, "skipping unreadable plugin root");
                continue;
            }
        };

        let mut folders: Vec<PathBuf> = entries
            .filter_map(Result::ok)
            .map(|e| e.path())
            .filter(|p| p.is_dir())
            .collect();
        folders.sort();

        for folder in folders {
            if folder.join(PENDING_DELETE_MARKER).exists() {
                info!(folder = %folder.display(), "skipping plugin pending removal");
                discovery.skipped.push(folder);
                continue;
            }
            match read_manifest(&folder) {
                Ok(manifest) => discovery.manifests.push(manifest),
                Err(e) => {
                    warn!(error = %e, "rejected plugin manifest");
                    discovery.errors.push(e);
                }
            }
        }
    }

    discovery
}

/// Keep, per identity, only the manifest whose version strictly exceeds every
/// other candidate. Identities without a strict maximum keep nothing.
pub fn dedup_latest(manifests: Vec<PluginManifest>) -> Dedup {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<PluginManifest>> = HashMap::new();
    for manifest in manifests {
        if !groups.contains_key(&manifest.id) {
            order.push(manifest.id.clone());
        }
        groups.entry(manifest.id.clone()).or_default().push(manifest);
    }

    let mut dedup = Dedup::default();
    for id in order {
        let Some(mut group) = groups.remove(&id) else {
            continue;
        };
        if group.len() == 1 {
            dedup.unique.append(&mut group);
            continue;
        }

        let winner = group.iter().enumerate().find_map(|(i, candidate)| {
            group
                .iter()
                .enumerate()
                .all(|(j, other)| i == j || candidate.version > other.version)
                .then_some(i)
        });

        match winner {
            Some(i) => {
                let kept = group.remove(i);
                dedup.unique.push(kept);
                dedup.duplicates.extend(group);
            }
            None => dedup.duplicates.extend(group),
        }
    }

    dedup
}

/// Registry of loaded plugins.
///
/// Keeps plugins in load order and indexes them by id.
#[derive(Debug, Default)]
pub struct PluginRegistry {
    plugins: Vec<PluginHandle>,
    index: HashMap<PluginId, usize>,
}

impl PluginRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Discover, deduplicate, apply overrides, and construct every plugin under `roots`.
    ///
    /// `builtins` are manifests compiled into the host. They take part in
    /// deduplication and overrides like discovered ones.
    pub fn load_all(
        roots: &[PathBuf],
        builtins: Vec<PluginManifest>,
        overrides: &PluginOverrides,
        constructors: &ConstructorTable,
    ) -> (Self, LoadErrors) {
        let mut discovery = discover(roots);
        let mut errors = LoadErrors {
            manifests: discovery.errors,
            ..LoadErrors::default()
        };

        discovery.manifests.extend(builtins);
        let dedup = dedup_latest(discovery.manifests);
        for duplicate in &dedup.duplicates {
            warn!(
                plugin = %duplicate.id,
                version = %duplicate.version,
                directory = %duplicate.directory.display(),
                "dropping duplicate plugin"
            );
        }
        errors.duplicates = dedup
            .duplicates
            .iter()
            .map(|m| (m.id.clone(), m.version.clone()))
            .collect();

        let mut registry = Self::new();
        for mut manifest in dedup.unique {
            overrides.apply(&mut manifest);
            let metadata = Arc::new(manifest.into_metadata());
            if let Err((id, name, e)) = registry.construct(metadata, constructors) {
                errors.failed.push((id, name, e));
            }
        }

        info!(
            loaded = registry.len(),
            rejected = errors.manifests.len(),
            duplicates = errors.duplicates.len(),
            failed = errors.failed.len(),
            "plugin load pass complete"
        );
        (registry, errors)
    }

    /// Construct one plugin and register it. A failure still registers the
    /// plugin, disabled, behind a [`FailedPlugin`].
    fn construct(
        &mut self,
        metadata: Arc<PluginMetadata>,
        constructors: &ConstructorTable,
    ) -> Result<(), (PluginId, String, QuarryError)> {
        match constructors.construct(&metadata) {
            Ok(plugin) => {
                debug!(plugin = %metadata.id, runtime = %metadata.runtime, "constructed plugin");
                self.register(PluginHandle::new(metadata, plugin));
                Ok(())
            }
            Err(e) => {
                warn!(plugin = %metadata.id, error = %e, "plugin construction failed, disabling");
                metadata.set_disabled(true);
                let failure = (metadata.id.clone(), metadata.name.clone(), e);
                let placeholder: Arc<dyn SearchPlugin> =
                    Arc::new(FailedPlugin::new(failure.2.to_string()));
                self.register(PluginHandle::new(metadata, placeholder));
                Err(failure)
            }
        }
    }

    /// Register an already-built plugin. A plugin with the same id is replaced.
    pub fn register(&mut self, handle: PluginHandle) {
        match self.index.get(handle.id()) {
            Some(&i) => self.plugins[i] = handle,
            None => {
                self.index.insert(handle.id().clone(), self.plugins.len());
                self.plugins.push(handle);
            }
        }
    }

    /// Initialize every enabled plugin concurrently.
    ///
    /// Each plugin's settings are loaded through `settings` and handed to it.
    /// Failures disable the plugin and are returned as one batch.
    pub async fn initialize_all(
        &self,
        host: &Arc<HostApiTable>,
        settings: &SettingsHub,
        environment: &HostEnvironment,
    ) -> LoadErrors {
        let pending = self
            .plugins
            .iter()
            .filter(|h| !h.metadata.is_disabled())
            .map(|handle| async move {
                let context = PluginInitContext {
                    metadata: Arc::clone(&handle.metadata),
                    host: Arc::clone(host),
                    settings: settings.load(&handle.metadata).await,
                    environment: environment.clone(),
                };
                let started = Instant::now();
                let outcome = handle.plugin.init(context).await;
                let elapsed = started.elapsed();
                handle.metadata.stats().record_init(elapsed);
                (handle, outcome, elapsed)
            });

        let mut errors = LoadErrors::default();
        for (handle, outcome, elapsed) in futures::future::join_all(pending).await {
            match outcome {
                Ok(()) => {
                    info!(
                        plugin = %handle.metadata.id,
                        name = %handle.metadata.name,
                        init_ms = elapsed.as_millis() as u64,
                        "plugin initialized"
                    );
                }
                Err(e) => {
                    warn!(plugin = %handle.metadata.id, error = %e, "plugin initialization failed, disabling");
                    handle.metadata.set_disabled(true);
                    errors
                        .failed
                        .push((handle.metadata.id.clone(), handle.metadata.name.clone(), e));
                }
            }
        }
        errors
    }

    /// Dispose every plugin, logging failures.
    pub async fn dispose_all(&self) {
        let pending = self.plugins.iter().map(|handle| async move {
            if let Err(e) = handle.plugin.dispose().await {
                warn!(plugin = %handle.metadata.id, error = %e, "plugin dispose failed");
            }
        });
        futures::future::join_all(pending).await;
    }

    /// Get a plugin by id.
    pub fn get(&self, id: &PluginId) -> Option<&PluginHandle> {
        self.index.get(id).map(|&i| &self.plugins[i])
    }

    /// All plugins in load order.
    pub fn all(&self) -> &[PluginHandle] {
        &self.plugins
    }

    /// Plugins that are not disabled right now.
    pub fn enabled(&self) -> Vec<&PluginHandle> {
        self.plugins
            .iter()
            .filter(|h| !h.metadata.is_disabled())
            .collect()
    }

    /// All plugins sorted by display name.
    pub fn list_all(&self) -> Vec<&PluginHandle> {
        let mut entries: Vec<&PluginHandle> = self.plugins.iter().collect();
        entries.sort_by(|a, b| a.metadata.name.cmp(&b.metadata.name));
        entries
    }

    pub fn status(&self, id: &PluginId) -> Option<PluginStatus> {
        self.get(id).map(|h| {
            if h.metadata.is_disabled() {
                PluginStatus::Disabled
            } else {
                PluginStatus::Enabled
            }
        })
    }

    pub fn set_disabled(&self, id: &PluginId, disabled: bool) -> Result<(), QuarryError> {
        let handle = self
            .get(id)
            .ok_or_else(|| QuarryError::PluginNotFound(id.clone()))?;
        handle.metadata.set_disabled(disabled);
        Ok(())
    }

    pub fn set_priority(&self, id: &PluginId, priority: i32) -> Result<(), QuarryError> {
        let handle = self
            .get(id)
            .ok_or_else(|| QuarryError::PluginNotFound(id.clone()))?;
        handle.metadata.set_priority(priority);
        Ok(())
    }

    /// Returns the number of registered plugins.
    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    /// Returns true if no plugins are registered.
    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::types::Runtime;

    fn manifest(id: &str, version: &str) -> PluginManifest {
        PluginManifest {
            id: id.to_string(),
            name: format!("Plugin {id}"),
            version: semver::Version::parse(version).unwrap(),
            author: String::new(),
            website: String::new(),
            description: String::new(),
            runtime: Runtime::Native,
            action_keywords: vec!["*".into()],
            execute_file_name: "Echo".into(),
            icon_path: None,
            priority: 0,
            disabled: false,
            directory: PathBuf::from(format!("/plugins/{id}-{version}")),
        }
    }

    #[test]
    fn dedup_keeps_strict_maximum_only() {
        let manifests = vec![
            manifest("X", "1.0.0"),
            manifest("X", "1.0.0"),
            manifest("X", "1.0.0"),
            manifest("X", "1.0.1"),
            manifest("X", "1.0.2"),
            manifest("Y", "1.0.0"),
            manifest("Y", "1.0.0"),
        ];
        let dedup = dedup_latest(manifests);
        assert_eq!(dedup.unique.len(), 1);
        assert_eq!(dedup.unique[0].id, "X");
        assert_eq!(dedup.unique[0].version, semver::Version::new(1, 0, 2));
        assert_eq!(dedup.duplicates.len(), 6);
    }

    #[test]
    fn dedup_tie_excludes_every_candidate() {
        let dedup = dedup_latest(vec![manifest("X", "1.0.0"), manifest("X", "1.0.0")]);
        assert!(dedup.unique.is_empty());
        assert_eq!(dedup.duplicates.len(), 2);
    }

    #[test]
    fn dedup_tie_at_top_excludes_even_when_lower_versions_exist() {
        let dedup = dedup_latest(vec![
            manifest("X", "2.0.0"),
            manifest("X", "1.0.0"),
            manifest("X", "2.0.0"),
        ]);
        assert!(dedup.unique.is_empty());
        assert_eq!(dedup.duplicates.len(), 3);
    }

    #[test]
    fn dedup_keeps_distinct_ids_in_first_seen_order() {
        let dedup = dedup_latest(vec![manifest("B", "1.0.0"), manifest("A", "1.0.0")]);
        let ids: Vec<&str> = dedup.unique.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["B", "A"]);
        assert!(dedup.duplicates.is_empty());
    }

    #[test]
    fn overrides_apply_disabled_priority_and_keywords() {
        let mut m = manifest("web", "1.0.0");
        let overrides = PluginOverrides {
            disabled: HashSet::from(["web".to_string()]),
            priorities: HashMap::from([("web".to_string(), 7)]),
            action_keywords: HashMap::from([("web".to_string(), vec!["g".to_string()])]),
        };
        overrides.apply(&mut m);
        assert!(m.disabled);
        assert_eq!(m.priority, 7);
        assert_eq!(m.action_keywords, vec!["g"]);
    }

    #[test]
    fn user_message_is_batched() {
        let mut errors = LoadErrors::default();
        assert!(errors.user_message().is_none());
        errors.failed.push((
            "a".into(),
            "Alpha".into(),
            QuarryError::Internal("x".into()),
        ));
        errors.failed.push((
            "b".into(),
            "Beta".into(),
            QuarryError::Internal("y".into()),
        ));
        assert_eq!(
            errors.user_message().unwrap(),
            "2 plugins failed to load and were disabled: Alpha, Beta"
        );
    }

    struct Echo {
        fail_init: bool,
    }

    #[async_trait::async_trait]
    impl SearchPlugin for Echo {
        async fn init(&self, _ctx: PluginInitContext) -> Result<(), QuarryError> {
            if self.fail_init {
                return Err(QuarryError::Internal("init exploded".into()));
            }
            Ok(())
        }

        async fn query(
            &self,
            query: &quarry_core::Query,
            _cancel: tokio_util::sync::CancellationToken,
        ) -> Result<Vec<quarry_core::SearchResult>, QuarryError> {
            Ok(vec![quarry_core::SearchResult::new(query.search(), "", 0)])
        }
    }

    fn write_plugin(root: &std::path::Path, folder: &str, id: &str, version: &str, component: &str) {
        let dir = root.join(folder);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join(crate::manifest::MANIFEST_FILE_NAME),
            format!(
                r#"{{"ID":"{id}","Name":"{id}","Version":"{version}","Language":"native","ExecuteFileName":"{component}"}}"#
            ),
        )
        .unwrap();
    }

    fn constructors() -> ConstructorTable {
        use crate::constructor::{FnFactory, NativeCatalog};
        let catalog = NativeCatalog::new()
            .with(Box::new(FnFactory::new("Echo", |_: &PluginMetadata| {
                Ok(Arc::new(Echo { fail_init: false }) as Arc<dyn SearchPlugin>)
            })))
            .with(Box::new(FnFactory::new("Grumpy", |_: &PluginMetadata| {
                Ok(Arc::new(Echo { fail_init: true }) as Arc<dyn SearchPlugin>)
            })));
        let mut table = ConstructorTable::new();
        table.register(Runtime::Native, Arc::new(catalog));
        table
    }

    #[test]
    fn load_all_batches_failures_and_skips_pending_removal() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "echo-1", "echo", "1.0.0", "Echo");
        write_plugin(root.path(), "echo-2", "echo", "1.1.0", "Echo");
        write_plugin(root.path(), "ghost", "ghost", "1.0.0", "Missing");
        write_plugin(root.path(), "gone", "gone", "1.0.0", "Echo");
        std::fs::write(root.path().join("gone").join(PENDING_DELETE_MARKER), "").unwrap();
        std::fs::create_dir_all(root.path().join("broken")).unwrap();
        std::fs::write(root.path().join("broken").join("plugin.json"), "{").unwrap();

        let (registry, errors) = PluginRegistry::load_all(
            &[root.path().to_path_buf()],
            Vec::new(),
            &PluginOverrides::default(),
            &constructors(),
        );

        assert_eq!(registry.len(), 2);
        let echo = registry.get(&PluginId::new("echo")).unwrap();
        assert_eq!(echo.metadata.version, semver::Version::new(1, 1, 0));
        assert_eq!(registry.status(&PluginId::new("ghost")), Some(PluginStatus::Disabled));
        assert!(registry.get(&PluginId::new("gone")).is_none());

        assert_eq!(errors.manifests.len(), 1);
        assert_eq!(errors.duplicates.len(), 1);
        assert_eq!(errors.failed_plugins(), vec!["ghost"]);
        assert_eq!(registry.enabled().len(), 1);
    }

    #[test]
    fn builtins_compete_with_discovered_plugins() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "echo", "echo", "2.0.0", "Echo");

        let mut overrides = PluginOverrides::default();
        overrides.disabled.insert("calc".to_string());
        let (registry, errors) = PluginRegistry::load_all(
            &[root.path().to_path_buf()],
            vec![manifest("echo", "1.0.0"), manifest("calc", "1.0.0")],
            &overrides,
            &constructors(),
        );

        assert_eq!(errors.duplicates.len(), 1);
        let echo = registry.get(&PluginId::new("echo")).unwrap();
        assert_eq!(echo.metadata.version, semver::Version::new(2, 0, 0));
        assert_eq!(registry.status(&PluginId::new("calc")), Some(PluginStatus::Disabled));
    }

    #[tokio::test]
    async fn initialize_all_disables_failed_plugins() {
        let root = tempfile::tempdir().unwrap();
        write_plugin(root.path(), "echo", "echo", "1.0.0", "Echo");
        write_plugin(root.path(), "grumpy", "grumpy", "1.0.0", "Grumpy");
        let (registry, errors) = PluginRegistry::load_all(
            &[root.path().to_path_buf()],
            Vec::new(),
            &PluginOverrides::default(),
            &constructors(),
        );
        assert!(errors.failed.is_empty());

        let settings_dir = tempfile::tempdir().unwrap();
        let hub = SettingsHub::new(Arc::new(crate::settings::JsonSettingsStore::new(
            settings_dir.path(),
        )));
        let environment = HostEnvironment::default();
        let errors = registry
            .initialize_all(&Arc::new(HostApiTable::new()), &hub, &environment)
            .await;

        assert_eq!(errors.failed_plugins(), vec!["grumpy"]);
        assert_eq!(
            registry.status(&PluginId::new("grumpy")),
            Some(PluginStatus::Disabled)
        );
        assert_eq!(
            registry.status(&PluginId::new("echo")),
            Some(PluginStatus::Enabled)
        );
        assert!(hub.get(&PluginId::new("echo")).is_some());
    }

    #[test]
    fn set_priority_and_disabled_require_known_plugin() {
        let registry = PluginRegistry::new();
        let err = registry.set_priority(&PluginId::new("nope"), 1).unwrap_err();
        assert!(matches!(err, QuarryError::PluginNotFound(_)));
        assert!(registry.set_disabled(&PluginId::new("nope"), true).is_err());
    }
}
