// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Keyword registrations and the query builder.
//!
//! A [`KeywordIndex`] is never mutated while shared. The router clones it,
//! applies a change, and publishes the copy.

use std::collections::HashMap;

use quarry_core::types::{PluginId, Query, WILDCARD_KEYWORD};
use quarry_core::PluginHandle;

/// Forward and reverse keyword registrations for every known plugin.
#[derive(Debug, Clone, Default)]
pub struct KeywordIndex {
    plugins: HashMap<PluginId, PluginHandle>,
    /// Keyword to owning plugins, in registration order. Holds the wildcard too.
    forward: HashMap<String, Vec<PluginHandle>>,
    /// Plugin to held keywords. The wildcard may appear more than once.
    reverse: HashMap<PluginId, Vec<String>>,
}

impl KeywordIndex {
    /// Registers every plugin under the keywords its metadata declares.
    pub fn from_plugins<'a>(plugins: impl IntoIterator<Item = &'a PluginHandle>) -> Self {
        let mut index = Self::default();
        for handle in plugins {
            index.plugins.insert(handle.id().clone(), handle.clone());
            for keyword in &handle.metadata.action_keywords {
                index.insert(handle.id(), keyword);
            }
        }
        index
    }

    /// Adds one registration. Returns false if the plugin is unknown or
    /// already holds this (non-wildcard) keyword.
    pub(crate) fn insert(&mut self, plugin: &PluginId, keyword: &str) -> bool {
        let Some(handle) = self.plugins.get(plugin) else {
            return false;
        };
        let held = self.reverse.entry(plugin.clone()).or_default();
        if keyword != WILDCARD_KEYWORD && held.iter().any(|k| k == keyword) {
            return false;
        }
        held.push(keyword.to_string());

        let owners = self.forward.entry(keyword.to_string()).or_default();
        if !owners.iter().any(|h| h.id() == plugin) {
            owners.push(handle.clone());
        }
        true
    }

    /// Drops one registration. The plugin leaves the forward entry only when
    /// it no longer holds the keyword at all.
    pub(crate) fn remove(&mut self, plugin: &PluginId, keyword: &str) -> bool {
        let Some(held) = self.reverse.get_mut(plugin) else {
            return false;
        };
        let Some(pos) = held.iter().position(|k| k == keyword) else {
            return false;
        };
        held.remove(pos);
        let still_held = held.iter().any(|k| k == keyword);

        if !still_held {
            if let Some(owners) = self.forward.get_mut(keyword) {
                owners.retain(|h| h.id() != plugin);
                if owners.is_empty() {
                    self.forward.remove(keyword);
                }
            }
        }
        true
    }

    pub fn contains_plugin(&self, plugin: &PluginId) -> bool {
        self.plugins.contains_key(plugin)
    }

    /// Plugins registered under `keyword`, disabled ones included.
    pub fn owners(&self, keyword: &str) -> &[PluginHandle] {
        self.forward.get(keyword).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Plugins registered under the wildcard.
    pub fn wildcard(&self) -> &[PluginHandle] {
        self.owners(WILDCARD_KEYWORD)
    }

    /// Keywords `plugin` currently holds, in registration order.
    pub fn keywords_of(&self, plugin: &PluginId) -> &[String] {
        self.reverse.get(plugin).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Whether any plugin holds `keyword` as an explicit keyword.
    pub fn is_assigned(&self, keyword: &str) -> bool {
        keyword != WILDCARD_KEYWORD && self.forward.contains_key(keyword)
    }

    /// Whether `token` selects an explicit keyword: some non-disabled plugin
    /// must hold it.
    pub fn resolves(&self, token: &str) -> bool {
        token != WILDCARD_KEYWORD && self.owners(token).iter().any(|h| !h.metadata.is_disabled())
    }

    /// Tokenizes `raw` and resolves its action keyword.
    ///
    /// Returns `None` when the input holds nothing but whitespace.
    pub fn build_query(&self, raw: &str) -> Option<Query> {
        let terms: Vec<String> = raw.split_whitespace().map(str::to_string).collect();
        let first = terms.first()?;
        let trimmed = raw.trim_start();

        if self.resolves(first) {
            let search = trimmed
                .get(first.len()..)
                .map(str::trim_start)
                .unwrap_or_default()
                .to_string();
            let keyword = first.clone();
            Some(Query::new(raw, terms, keyword, search))
        } else {
            Some(Query::new(raw, terms, "", trimmed))
        }
    }

    /// Plugins that should answer `query`, skipping disabled ones.
    ///
    /// An explicit keyword selects exactly its owners; everything else goes to
    /// the wildcard plugins.
    pub fn candidates(&self, query: &Query) -> Vec<PluginHandle> {
        let owners = if !query.is_global() && self.is_assigned(query.action_keyword()) {
            self.owners(query.action_keyword())
        } else {
            self.wildcard()
        };
        owners
            .iter()
            .filter(|h| !h.metadata.is_disabled())
            .cloned()
            .collect()
    }
}
