// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Runs the typed text as a shell command.

use async_trait::async_trait;
use quarry_core::{
    Capabilities, HOST_METHOD_PREFIX, HostMethod, Query, QuarryError, ResultAction, RpcAction,
    SearchPlugin, SearchResult,
};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

const RESULT_SCORE: i32 = 100;

/// Offers the search text as a command for `sh -c`.
#[derive(Debug, Default)]
pub struct ShellCommand;

impl ShellCommand {
    pub fn new() -> Self {
        Self
    }
}

async fn run(command: String) -> Result<bool, QuarryError> {
    info!(command = %command, "running shell command");
    let status = tokio::process::Command::new("sh")
        .arg("-c")
        .arg(&command)
        .status()
        .await
        .map_err(|e| QuarryError::Internal(format!("failed to run `{command}`: {e}")))?;
    if !status.success() {
        warn!(command = %command, code = ?status.code(), "shell command failed");
    }
    Ok(true)
}

#[async_trait]
impl SearchPlugin for ShellCommand {
    fn capabilities(&self) -> Capabilities {
        Capabilities {
            context_menu: true,
            ..Capabilities::default()
        }
    }

    async fn query(
        &self,
        query: &Query,
        _cancel: CancellationToken,
    ) -> Result<Vec<SearchResult>, QuarryError> {
        let command = query.search().trim().to_string();
        if command.is_empty() {
            return Ok(Vec::new());
        }

        let mut result = SearchResult::new(command.clone(), "Run this command with sh", RESULT_SCORE);
        result.context_data = Some(Value::String(command.clone()));
        result.action = Some(ResultAction::new(move || run(command.clone())));
        Ok(vec![result])
    }

    async fn context_menu(&self, result: &SearchResult) -> Result<Vec<SearchResult>, QuarryError> {
        let Some(Value::String(command)) = &result.context_data else {
            return Ok(Vec::new());
        };

        let mut copy = SearchResult::new("Copy command", command.clone(), 0);
        copy.rpc_action = Some(RpcAction {
            method: format!("{HOST_METHOD_PREFIX}{}", HostMethod::CopyToClipboard),
            parameters: vec![json!(command)],
            dont_hide_after_action: false,
        });
        Ok(vec![copy])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(search: &str) -> Query {
        let raw = format!("> {search}");
        let terms = raw.split_whitespace().map(str::to_string).collect();
        Query::new(raw, terms, ">", search)
    }

    #[tokio::test]
    async fn offers_the_typed_command() {
        let results = ShellCommand::new()
            .query(&query("echo hi"), CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].title, "echo hi");
        assert!(results[0].action.is_some());
        assert_eq!(results[0].context_data, Some(json!("echo hi")));
    }

    #[tokio::test]
    async fn blank_command_yields_nothing() {
        let results = ShellCommand::new()
            .query(&query("  "), CancellationToken::new())
            .await
            .unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn context_menu_copies_the_command() {
        let plugin = ShellCommand::new();
        let results = plugin
            .query(&query("ls -la"), CancellationToken::new())
            .await
            .unwrap();
        let menu = plugin.context_menu(&results[0]).await.unwrap();

        assert_eq!(menu.len(), 1);
        let action = menu[0].rpc_action.as_ref().unwrap();
        assert_eq!(action.method, "Quarry.CopyToClipboard");
        assert_eq!(action.parameters, vec![json!("ls -la")]);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn action_runs_through_sh() {
        let dir = tempfile::tempdir().unwrap();
        let marker = dir.path().join("ran");
        let command = format!("touch '{}'", marker.display());
        let results = ShellCommand::new()
            .query(&query(&command), CancellationToken::new())
            .await
            .unwrap();

        let hide = results[0].action.as_ref().unwrap().run().await.unwrap();
        assert!(hide);
        assert!(marker.exists());
    }
}
