// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `quarry shell` command implementation.
//!
//! Each input line starts a new query generation and prints its ranked
//! results. Commands prefixed with `:` act on the last printed list.

use std::sync::Arc;

use colored::Colorize;
use quarry_core::{QuarryError, SearchResult};
use quarry_host::Engine;
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::render::print_results;
use crate::terminal::TerminalShell;

/// One parsed REPL line.
#[derive(Debug, PartialEq, Eq)]
enum Input {
    Quit,
    Help,
    Open(usize),
    Menu(usize),
    Top(usize),
    Query(String),
    Invalid(String),
}

fn parse_index(arg: Option<&str>) -> Option<usize> {
    arg?.parse::<usize>().ok().filter(|n| *n > 0)
}

fn parse_input(line: &str) -> Input {
    let Some(command) = line.strip_prefix(':') else {
        return Input::Query(line.to_string());
    };
    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let index = parse_index(parts.next());
    match (name, index) {
        ("q" | "quit" | "exit", _) => Input::Quit,
        ("h" | "help", _) => Input::Help,
        ("open", Some(n)) => Input::Open(n),
        ("menu", Some(n)) => Input::Menu(n),
        ("top", Some(n)) => Input::Top(n),
        ("open" | "menu" | "top", None) => {
            Input::Invalid(format!(":{name} needs a result number"))
        }
        _ => Input::Invalid(format!("unknown command :{name}")),
    }
}

fn print_help() {
    println!("  {}  run a query", "<text>".yellow());
    println!("  {}  execute result N", ":open N".yellow());
    println!("  {}  show the context menu of result N", ":menu N".yellow());
    println!("  {}  pin or unpin result N for this query", ":top N".yellow());
    println!("  {}  exit", ":quit".yellow());
}

/// The REPL's view of the last printed list.
struct Session {
    listed: Arc<Vec<SearchResult>>,
}

impl Session {
    fn pick(&self, n: usize) -> Result<&SearchResult, QuarryError> {
        self.listed
            .get(n - 1)
            .ok_or_else(|| QuarryError::Internal(format!("no result {n}; {} listed", self.listed.len())))
    }
}

async fn handle(engine: &Engine, session: &mut Session, input: Input) -> Result<(), QuarryError> {
    match input {
        Input::Quit | Input::Help => {}
        Input::Invalid(message) => eprintln!("{}", message.yellow()),
        Input::Query(text) => {
            session.listed = engine.query_once(&text).await;
            print_results(engine, &session.listed);
        }
        Input::Open(n) => {
            let result = session.pick(n)?.clone();
            let hide = engine.execute(&result).await?;
            debug!(title = %result.title, hide, "result executed");
        }
        Input::Menu(n) => {
            let entries = engine.context_menu(session.pick(n)?).await?;
            session.listed = Arc::new(entries);
            print_results(engine, &session.listed);
        }
        Input::Top(n) => {
            let result = session.pick(n)?;
            if engine.is_topmost(result) {
                engine.remove_topmost(result);
                println!("{} {}", "unpinned".dimmed(), result.title);
            } else if engine.set_topmost(result) {
                println!("{} {}", "pinned".dimmed(), result.title);
            } else {
                eprintln!("{}", "only query results can be pinned".yellow());
            }
        }
    }
    Ok(())
}

/// Runs the `quarry shell` interactive REPL until EOF, `:quit`, or `cancel`.
pub async fn run_shell(
    engine: &Engine,
    terminal: &TerminalShell,
    cancel: CancellationToken,
) -> Result<(), QuarryError> {
    let mut rl = DefaultEditor::new()
        .map_err(|e| QuarryError::Internal(format!("failed to initialize readline: {e}")))?;

    println!("{}", "quarry shell".bold().green());
    println!(
        "{} plugins loaded. Type {} for commands, {} to exit.\n",
        engine.registry().enabled().len(),
        ":help".yellow(),
        ":quit".yellow()
    );

    let prompt = format!("{}> ", "quarry".green());
    let mut session = Session {
        listed: Arc::new(Vec::new()),
    };

    while !cancel.is_cancelled() {
        let initial = terminal.take_pending_query().unwrap_or_default();
        let line = match rl.readline_with_initial(&prompt, (&initial, "")) {
            Ok(line) => line,
            Err(ReadlineError::Interrupted) | Err(ReadlineError::Eof) => break,
            Err(e) => {
                eprintln!("{}: {e}", "error".red());
                break;
            }
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let _ = rl.add_history_entry(trimmed);

        let input = parse_input(trimmed);
        match input {
            Input::Quit => break,
            Input::Help => print_help(),
            input => {
                if let Err(e) = handle(engine, &mut session, input).await {
                    eprintln!("{}: {e}", "error".red());
                }
            }
        }
    }

    Ok(())
}
