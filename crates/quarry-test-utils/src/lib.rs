// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Quarry integration tests.
//!
//! Provides scripted plugins and on-disk fixtures for fast, deterministic
//! tests that need no real plugin processes.
//!
//! # Components
//!
//! - [`MockPlugin`] - In-process plugin with scripted results, delays, and failures
//! - [`MemorySettingsStore`] - Settings store kept entirely in memory
//! - [`PluginFixture`] - Temporary plugin root with `plugin.json` folders

pub mod fixture;
pub mod mock_plugin;
pub mod settings;

pub use fixture::PluginFixture;
pub use mock_plugin::{MockPlugin, mock_handle};
pub use settings::MemorySettingsStore;
