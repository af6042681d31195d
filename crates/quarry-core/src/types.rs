// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the registry, router, transports, and orchestrator.

use std::fmt;
use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU64, Ordering};
use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::QuarryError;

/// Keyword that registers a plugin for every query without an explicit action keyword.
pub const WILDCARD_KEYWORD: &str = "*";

/// Stable identity of a plugin, taken from its manifest.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginId(pub String);

impl PluginId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PluginId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PluginId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

impl From<String> for PluginId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Runtime a plugin declares in its manifest `Language` field.
///
/// Parsing is case-insensitive; the in-process runtime also accepts the
/// legacy `csharp` and `fsharp` tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum Runtime {
    #[strum(to_string = "native", serialize = "csharp", serialize = "fsharp")]
    Native,
    #[strum(to_string = "python")]
    Python,
    #[strum(to_string = "python_v2")]
    PythonV2,
    #[strum(to_string = "javascript")]
    JavaScript,
    #[strum(to_string = "javascript_v2")]
    JavaScriptV2,
    #[strum(to_string = "typescript")]
    TypeScript,
    #[strum(to_string = "typescript_v2")]
    TypeScriptV2,
    #[strum(to_string = "executable")]
    Executable,
    #[strum(to_string = "executable_v2")]
    ExecutableV2,
    #[strum(to_string = "executable_stream")]
    ExecutableStream,
}

/// Protocol generation used to talk to a plugin.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProtocolGeneration {
    /// Compiled into the host.
    InProcess,
    /// One process per call, request passed as an argument.
    V1,
    /// One persistent process with a duplex byte stream.
    V2,
}

/// Program used to launch a process plugin's executable target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpreter {
    /// The target is executed directly.
    None,
    Python,
    Node,
}

impl Runtime {
    pub fn generation(self) -> ProtocolGeneration {
        match self {
            Runtime::Native => ProtocolGeneration::InProcess,
            Runtime::Python | Runtime::JavaScript | Runtime::TypeScript | Runtime::Executable => {
                ProtocolGeneration::V1
            }
            Runtime::PythonV2
            | Runtime::JavaScriptV2
            | Runtime::TypeScriptV2
            | Runtime::ExecutableV2
            | Runtime::ExecutableStream => ProtocolGeneration::V2,
        }
    }

    pub fn interpreter(self) -> Interpreter {
        match self {
            Runtime::Python | Runtime::PythonV2 => Interpreter::Python,
            Runtime::JavaScript
            | Runtime::JavaScriptV2
            | Runtime::TypeScript
            | Runtime::TypeScriptV2 => Interpreter::Node,
            _ => Interpreter::None,
        }
    }

    pub fn is_native(self) -> bool {
        self == Runtime::Native
    }
}

/// Host facts injected into every process plugin's environment.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    pub version: String,
    pub program_directory: PathBuf,
    pub application_directory: PathBuf,
}

/// Rolling timing statistics for one plugin.
#[derive(Debug, Default)]
pub struct PluginStats {
    init_time_ms: AtomicU64,
    query_count: AtomicU64,
    avg_query_ms: AtomicU64,
}

impl PluginStats {
    pub fn record_init(&self, elapsed: Duration) {
        self.init_time_ms
            .store(elapsed.as_millis() as u64, Ordering::Relaxed);
    }

    /// Records one query call. The first call sets the average, later calls
    /// halve the distance to the newest sample.
    pub fn record_query(&self, elapsed: Duration) {
        let ms = elapsed.as_millis() as u64;
        let previous = self.query_count.fetch_add(1, Ordering::Relaxed);
        if previous == 0 {
            self.avg_query_ms.store(ms, Ordering::Relaxed);
        } else {
            let avg = self.avg_query_ms.load(Ordering::Relaxed);
            self.avg_query_ms.store((avg + ms) / 2, Ordering::Relaxed);
        }
    }

    pub fn init_time_ms(&self) -> u64 {
        self.init_time_ms.load(Ordering::Relaxed)
    }

    pub fn query_count(&self) -> u64 {
        self.query_count.load(Ordering::Relaxed)
    }

    pub fn avg_query_ms(&self) -> u64 {
        self.avg_query_ms.load(Ordering::Relaxed)
    }
}

/// Everything the host knows about one plugin.
///
/// Descriptive fields are fixed at discovery time. The disabled flag, priority,
/// and statistics are atomics so in-flight queries can read them while the
/// host mutates them.
#[derive(Debug)]
pub struct PluginMetadata {
    pub id: PluginId,
    pub name: String,
    pub version: semver::Version,
    pub author: String,
    pub website: String,
    pub description: String,
    pub runtime: Runtime,
    /// Keywords declared by the manifest (or config override) at load time.
    /// The router owns the live keyword registrations.
    pub action_keywords: Vec<String>,
    pub directory: PathBuf,
    pub execute_file_name: String,
    pub icon_path: Option<PathBuf>,
    disabled: AtomicBool,
    priority: AtomicI32,
    stats: PluginStats,
}

impl PluginMetadata {
    pub fn new(id: impl Into<PluginId>, name: impl Into<String>, version: semver::Version, runtime: Runtime) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            version,
            author: String::new(),
            website: String::new(),
            description: String::new(),
            runtime,
            action_keywords: vec![WILDCARD_KEYWORD.to_string()],
            directory: PathBuf::new(),
            execute_file_name: String::new(),
            icon_path: None,
            disabled: AtomicBool::new(false),
            priority: AtomicI32::new(0),
            stats: PluginStats::default(),
        }
    }

    pub fn with_keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.action_keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = directory.into();
        self
    }

    pub fn with_execute_file_name(mut self, name: impl Into<String>) -> Self {
        self.execute_file_name = name.into();
        self
    }

    pub fn with_priority(self, priority: i32) -> Self {
        self.priority.store(priority, Ordering::Relaxed);
        self
    }

    pub fn with_disabled(self, disabled: bool) -> Self {
        self.disabled.store(disabled, Ordering::Relaxed);
        self
    }

    /// Absolute path of the executable target inside the plugin directory.
    pub fn executable_path(&self) -> PathBuf {
        self.directory.join(&self.execute_file_name)
    }

    pub fn is_disabled(&self) -> bool {
        self.disabled.load(Ordering::Acquire)
    }

    pub fn set_disabled(&self, disabled: bool) {
        self.disabled.store(disabled, Ordering::Release);
    }

    pub fn priority(&self) -> i32 {
        self.priority.load(Ordering::Acquire)
    }

    pub fn set_priority(&self, priority: i32) {
        self.priority.store(priority, Ordering::Release);
    }

    pub fn stats(&self) -> &PluginStats {
        &self.stats
    }
}

/// One user keystroke, tokenized and resolved against the keyword index.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Query {
    raw: String,
    terms: Vec<String>,
    action_keyword: String,
    search: String,
}

impl Query {
    /// Builds a query from already-resolved parts. The router is the usual caller.
    pub fn new(
        raw: impl Into<String>,
        terms: Vec<String>,
        action_keyword: impl Into<String>,
        search: impl Into<String>,
    ) -> Self {
        Self {
            raw: raw.into(),
            terms,
            action_keyword: action_keyword.into(),
            search: search.into(),
        }
    }

    /// The text exactly as typed.
    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// All whitespace-separated tokens, including the action keyword.
    pub fn terms(&self) -> &[String] {
        &self.terms
    }

    /// Resolved action keyword, empty for global queries.
    pub fn action_keyword(&self) -> &str {
        &self.action_keyword
    }

    /// Text after the action keyword (or the whole input for global queries).
    pub fn search(&self) -> &str {
        &self.search
    }

    pub fn is_global(&self) -> bool {
        self.action_keyword.is_empty()
    }

    /// Tokens of the search text.
    pub fn search_terms(&self) -> &[String] {
        if self.is_global() {
            &self.terms
        } else {
            self.terms.get(1..).unwrap_or(&[])
        }
    }

    pub fn first_search_term(&self) -> &str {
        self.search_terms().first().map(String::as_str).unwrap_or("")
    }

    pub fn second_search_term(&self) -> &str {
        self.search_terms().get(1).map(String::as_str).unwrap_or("")
    }

    /// Search terms from the second one on, joined by single spaces.
    pub fn second_to_end_search(&self) -> String {
        self.search_terms()
            .iter()
            .skip(1)
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// Key/value delta a plugin asks the host to merge into its settings.
pub type SettingsDelta = serde_json::Map<String, serde_json::Value>;

/// Method call a process plugin attaches to a result, sent back when the result is selected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RpcAction {
    #[serde(alias = "Method")]
    pub method: String,
    #[serde(default, alias = "Parameters")]
    pub parameters: Vec<serde_json::Value>,
    #[serde(default, alias = "DontHideAfterAction")]
    pub dont_hide_after_action: bool,
}

type ActionFn = dyn Fn() -> BoxFuture<'static, Result<bool, QuarryError>> + Send + Sync;

/// Opaque callback an in-process plugin attaches to a result.
///
/// Resolves to `true` when the host should hide after running it.
#[derive(Clone)]
pub struct ResultAction(Arc<ActionFn>);

impl ResultAction {
    pub fn new<F, Fut>(f: F) -> Self
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<bool, QuarryError>> + Send + 'static,
    {
        Self(Arc::new(move || Box::pin(f())))
    }

    pub async fn run(&self) -> Result<bool, QuarryError> {
        (self.0)().await
    }
}

impl fmt::Debug for ResultAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ResultAction(..)")
    }
}

/// A single search result produced by a plugin.
#[derive(Debug, Clone, Default)]
pub struct SearchResult {
    pub title: String,
    pub subtitle: String,
    pub icon_path: Option<String>,
    pub score: i32,
    pub plugin_id: Option<PluginId>,
    pub plugin_directory: Option<PathBuf>,
    pub origin_query: Option<Arc<Query>>,
    /// Set when the owning plugin holds exactly one action keyword.
    pub action_keyword_assigned: Option<String>,
    pub action: Option<ResultAction>,
    pub rpc_action: Option<RpcAction>,
    pub context_data: Option<serde_json::Value>,
    pub settings_change: Option<SettingsDelta>,
    pub record_key: Option<String>,
}

impl SearchResult {
    pub fn new(title: impl Into<String>, subtitle: impl Into<String>, score: i32) -> Self {
        Self {
            title: title.into(),
            subtitle: subtitle.into(),
            score,
            ..Self::default()
        }
    }

    /// Attaches the owning plugin and originating query.
    pub fn stamp(&mut self, metadata: &PluginMetadata, query: &Arc<Query>, sole_keyword: Option<&str>) {
        self.plugin_id = Some(metadata.id.clone());
        self.plugin_directory = Some(metadata.directory.clone());
        self.origin_query = Some(Arc::clone(query));
        self.action_keyword_assigned = sole_keyword.map(str::to_string);
    }

    /// Identity used by selection and topmost records.
    pub fn record_identity(&self) -> (Option<&PluginId>, &str, &str) {
        (self.plugin_id.as_ref(), &self.title, &self.subtitle)
    }
}
