// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Shell used when the embedder provides none.

use quarry_core::HostShell;
use tracing::{info, warn};

/// Routes every user-facing request to the log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogShell;

impl HostShell for LogShell {
    fn change_query(&self, query: &str, requery: bool) {
        info!(query, requery, "plugin changed the query");
    }

    fn show_msg(&self, title: &str, subtitle: &str) {
        info!(title, subtitle, "plugin message");
    }

    fn show_error(&self, title: &str, subtitle: &str) {
        warn!(title, subtitle, "plugin error message");
    }

    fn copy_to_clipboard(&self, text: &str) {
        info!(text, "plugin asked to copy text");
    }

    fn open_url(&self, url: &str) {
        info!(url, "plugin asked to open a url");
    }
}
