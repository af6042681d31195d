// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Host shell for the terminal front end.

use std::sync::Mutex;

use colored::Colorize;
use quarry_core::HostShell;
use tracing::debug;

/// Prints plugin requests to the terminal.
///
/// There is no system clipboard in a terminal session, so copied text is
/// echoed instead. A query change requested by a plugin is kept until the
/// REPL picks it up as the next line's initial text.
#[derive(Debug, Default)]
pub struct TerminalShell {
    pending_query: Mutex<Option<String>>,
}

impl TerminalShell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Takes the query text a plugin asked for, if any.
    pub fn take_pending_query(&self) -> Option<String> {
        self.pending_query.lock().ok().and_then(|mut q| q.take())
    }
}

impl HostShell for TerminalShell {
    fn change_query(&self, query: &str, requery: bool) {
        debug!(query, requery, "plugin changed the query");
        if let Ok(mut pending) = self.pending_query.lock() {
            *pending = Some(query.to_string());
        }
    }

    fn show_msg(&self, title: &str, subtitle: &str) {
        println!("{} {}", title.bold().cyan(), subtitle);
    }

    fn show_error(&self, title: &str, subtitle: &str) {
        eprintln!("{}: {}", title.red().bold(), subtitle);
    }

    fn copy_to_clipboard(&self, text: &str) {
        println!("{} {}", "copied:".dimmed(), text);
    }

    fn open_url(&self, url: &str) {
        println!("{} {}", "open:".dimmed(), url.underline());
    }
}
