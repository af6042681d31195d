// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shared keyword router with snapshot reads and serialized writes.
//!
//! Readers load the current [`KeywordIndex`] without locking. Writers take
//! a mutex, copy the index, apply their change, and swap the copy in.

use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use quarry_core::types::{PluginId, Query};
use quarry_core::{PluginHandle, QuarryError};
use tracing::{debug, info};

use crate::index::KeywordIndex;

/// A built query and the plugins it goes to, taken from one snapshot.
#[derive(Debug, Clone)]
pub struct Route {
    pub query: Arc<Query>,
    pub candidates: Vec<PluginHandle>,
}

/// Owns the live keyword registrations.
pub struct KeywordRouter {
    current: ArcSwap<KeywordIndex>,
    writer: Mutex<()>,
}

impl KeywordRouter {
    pub fn new<'a>(plugins: impl IntoIterator<Item = &'a PluginHandle>) -> Self {
        Self {
            current: ArcSwap::from_pointee(KeywordIndex::from_plugins(plugins)),
            writer: Mutex::new(()),
        }
    }

    /// The index as of now. Later changes do not affect it.
    pub fn snapshot(&self) -> Arc<KeywordIndex> {
        self.current.load_full()
    }

    /// Builds the query for `raw` and selects its candidates.
    pub fn route(&self, raw: &str) -> Option<Route> {
        let index = self.current.load();
        let query = index.build_query(raw)?;
        let candidates = index.candidates(&query);
        debug!(
            keyword = query.action_keyword(),
            candidates = candidates.len(),
            "query routed"
        );
        Some(Route {
            query: Arc::new(query),
            candidates,
        })
    }

    pub fn build_query(&self, raw: &str) -> Option<Query> {
        self.current.load().build_query(raw)
    }

    /// Registers `keyword` for `plugin`.
    pub fn add_keyword(&self, plugin: &PluginId, keyword: &str) -> Result<(), QuarryError> {
        validate_keyword(keyword)?;
        let changed = self.update(plugin, |index| index.insert(plugin, keyword))?;
        if changed {
            info!(plugin = %plugin, keyword, "action keyword added");
        }
        Ok(())
    }

    /// Drops one registration of `keyword` for `plugin`. Returns whether the
    /// plugin held it.
    pub fn remove_keyword(&self, plugin: &PluginId, keyword: &str) -> Result<bool, QuarryError> {
        let removed = self.update(plugin, |index| index.remove(plugin, keyword))?;
        if removed {
            info!(plugin = %plugin, keyword, "action keyword removed");
        }
        Ok(removed)
    }

    /// Whether some plugin holds `keyword` explicitly.
    pub fn is_assigned(&self, keyword: &str) -> bool {
        self.current.load().is_assigned(keyword)
    }

    pub fn keywords_of(&self, plugin: &PluginId) -> Vec<String> {
        self.current.load().keywords_of(plugin).to_vec()
    }

    /// The plugin's keyword when it holds exactly one.
    pub fn sole_keyword(&self, plugin: &PluginId) -> Option<String> {
        match self.current.load().keywords_of(plugin) {
            [only] => Some(only.clone()),
            _ => None,
        }
    }

    fn update(
        &self,
        plugin: &PluginId,
        change: impl FnOnce(&mut KeywordIndex) -> bool,
    ) -> Result<bool, QuarryError> {
        let _guard = self
            .writer
            .lock()
            .map_err(|e| QuarryError::Internal(format!("keyword router lock poisoned: {e}")))?;
        let current = self.current.load_full();
        if !current.contains_plugin(plugin) {
            return Err(QuarryError::PluginNotFound(plugin.clone()));
        }
        let mut next = KeywordIndex::clone(&current);
        let changed = change(&mut next);
        if changed {
            self.current.store(Arc::new(next));
        }
        Ok(changed)
    }
}

fn validate_keyword(keyword: &str) -> Result<(), QuarryError> {
    if keyword.is_empty() || keyword.chars().any(char::is_whitespace) {
        return Err(QuarryError::Internal(format!(
            "invalid action keyword '{keyword}'"
        )));
    }
    Ok(())
}

impl std::fmt::Debug for KeywordRouter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeywordRouter")
            .field("index", &self.current.load())
            .finish()
    }
}
