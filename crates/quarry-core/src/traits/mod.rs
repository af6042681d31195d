// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Trait definitions at the engine's seams.
//!
//! Plugins implement [`SearchPlugin`] with `#[async_trait]` for dynamic
//! dispatch. [`SettingsStore`] and [`HostShell`] are implemented by the
//! embedding application.

pub mod plugin;
pub mod settings;
pub mod shell;

pub use plugin::{Capabilities, PluginInitContext, SearchPlugin};
pub use settings::SettingsStore;
pub use shell::HostShell;
