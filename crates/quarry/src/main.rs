// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Quarry - a launcher-style plugin engine.
//!
//! This is the binary entry point: it loads configuration, starts the engine
//! with the built-in plugins, and runs one of the subcommands.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod app;
mod builtin;
mod render;
mod shell;
mod terminal;

use std::io::IsTerminal;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use quarry_config::QuarryConfig;
use quarry_core::QuarryError;
use quarry_host::install_signal_handler;

use crate::terminal::TerminalShell;

/// Quarry - a launcher-style plugin engine.
#[derive(Parser, Debug)]
#[command(name = "quarry", version, about, long_about = None)]
struct Cli {
    /// Read configuration from this file instead of the usual locations.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one query and print the ranked results.
    Query {
        /// Query text; words are joined with single spaces.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        text: Vec<String>,
    },
    /// Launch an interactive query session.
    Shell,
    /// List loaded plugins.
    Plugins {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },
    /// Print the effective configuration as TOML.
    Config,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let loaded = match &cli.config {
        Some(path) => quarry_config::load_and_validate_path(path),
        None => quarry_config::load_and_validate(),
    };
    let config = match loaded {
        Ok(config) => config,
        Err(errors) => {
            quarry_config::render_errors(&errors);
            std::process::exit(1);
        }
    };

    init_tracing(&config.host.log_level);
    if !std::io::stdout().is_terminal() {
        colored::control::set_override(false);
    }

    if let Err(e) = run(cli.command, config).await {
        eprintln!("{}: {e}", "error".red());
        std::process::exit(1);
    }
}

async fn run(command: Option<Commands>, config: QuarryConfig) -> Result<(), QuarryError> {
    let Some(command) = command else {
        println!("quarry: use --help for available commands");
        return Ok(());
    };

    if let Commands::Config = command {
        let rendered = toml::to_string_pretty(&config)
            .map_err(|e| QuarryError::Config(format!("failed to render configuration: {e}")))?;
        print!("{rendered}");
        return Ok(());
    }

    let terminal = Arc::new(TerminalShell::new());
    let engine = app::start_engine(&config, Arc::clone(&terminal)).await?;
    let cancel = install_signal_handler();

    let outcome = match command {
        Commands::Query { text } => {
            let text = text.join(" ");
            tokio::select! {
                results = engine.query_once(&text) => {
                    render::print_results(&engine, &results);
                    Ok(())
                }
                _ = cancel.cancelled() => Err(QuarryError::Cancelled),
            }
        }
        Commands::Shell => shell::run_shell(&engine, &terminal, cancel.clone()).await,
        Commands::Plugins { json } => {
            let rows = render::plugin_rows(&engine);
            if json {
                let rendered = serde_json::to_string_pretty(&rows)
                    .map_err(|e| QuarryError::Internal(format!("failed to render plugins: {e}")))?;
                println!("{rendered}");
            } else {
                render::print_plugins(&rows);
            }
            Ok(())
        }
        Commands::Config => Ok(()),
    };

    engine.shutdown().await;
    outcome
}

/// Initializes the tracing subscriber with the given log level.
///
/// Logs go to stderr; stdout carries command output only.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("quarry={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .init();
}
