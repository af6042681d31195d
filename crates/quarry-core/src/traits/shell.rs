// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The presentation layer as seen from the engine.

/// User-facing side effects plugins may request through the host API.
///
/// Implemented by whatever embeds the engine (the CLI prints to the terminal).
pub trait HostShell: Send + Sync + 'static {
    /// Replaces the query text. The engine re-dispatches when `requery` is set.
    fn change_query(&self, query: &str, requery: bool);

    fn show_msg(&self, title: &str, subtitle: &str);

    fn show_error(&self, title: &str, subtitle: &str);

    fn copy_to_clipboard(&self, text: &str);

    fn open_url(&self, url: &str);
}
