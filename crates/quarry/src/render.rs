// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Terminal output for results and plugin listings.

use colored::Colorize;
use quarry_core::SearchResult;
use quarry_host::Engine;
use quarry_plugin::PluginStatus;
use serde::Serialize;

/// One line of `quarry plugins`.
#[derive(Debug, Serialize)]
pub struct PluginRow {
    pub id: String,
    pub name: String,
    pub version: String,
    pub runtime: String,
    pub keywords: Vec<String>,
    pub status: String,
    pub priority: i32,
    pub avg_query_ms: u64,
}

pub fn plugin_rows(engine: &Engine) -> Vec<PluginRow> {
    engine
        .registry()
        .list_all()
        .into_iter()
        .map(|handle| {
            let metadata = &handle.metadata;
            let status = if metadata.is_disabled() {
                PluginStatus::Disabled
            } else {
                PluginStatus::Enabled
            };
            PluginRow {
                id: metadata.id.to_string(),
                name: metadata.name.clone(),
                version: metadata.version.to_string(),
                runtime: metadata.runtime.to_string(),
                keywords: engine.router().keywords_of(&metadata.id),
                status: status.to_string(),
                priority: metadata.priority(),
                avg_query_ms: metadata.stats().avg_query_ms(),
            }
        })
        .collect()
}

pub fn print_plugins(rows: &[PluginRow]) {
    println!();
    println!("  {}", "quarry plugins".bold());
    println!("  {}", "-".repeat(60));
    for row in rows {
        let status = format!("{:<8}", row.status);
        let status = if row.status == PluginStatus::Enabled.to_string() {
            status.green()
        } else {
            status.red()
        };
        println!(
            "    {} {:<10} {:<16} {} {}",
            format!("{:<24}", row.name).bold(),
            row.version,
            row.runtime,
            status,
            row.keywords.join(" ").cyan()
        );
        println!(
            "    {}",
            format!(
                "id {}  priority {}  avg query {}ms",
                row.id, row.priority, row.avg_query_ms
            )
            .dimmed()
        );
    }
    println!();
}

/// One numbered result line. Pinned results carry a marker.
pub fn format_result(position: usize, result: &SearchResult, pinned: bool) -> String {
    let marker = if pinned { "*" } else { " " };
    let owner = result
        .plugin_id
        .as_ref()
        .map(|id| id.to_string())
        .unwrap_or_default();
    let mut line = format!("{marker}{position:>3}. {}", result.title.bold());
    if !result.subtitle.is_empty() {
        line.push_str(&format!("  {}", result.subtitle.dimmed()));
    }
    line.push_str(&format!("  {}", format!("[{owner} {}]", result.score).dimmed()));
    line
}

pub fn print_results(engine: &Engine, results: &[SearchResult]) {
    if results.is_empty() {
        println!("{}", "no results".dimmed());
        return;
    }
    for (i, result) in results.iter().enumerate() {
        println!("{}", format_result(i + 1, result, engine.is_topmost(result)));
    }
}
