// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The Quarry engine as one object.
//!
//! [`Engine`] loads plugins, routes and dispatches queries, serves the host
//! API plugins call back into, runs selected results, and shuts everything
//! down in order. Front ends supply a [`HostShell`](quarry_core::HostShell)
//! for user-facing side effects and a settings store.

mod handlers;

pub mod engine;
pub mod options;
pub mod shell;
pub mod shutdown;

pub use engine::{Engine, EngineBuilder};
pub use options::{EngineOptions, RECORDS_FILE_NAME};
pub use shell::LogShell;
pub use shutdown::install_signal_handler;
