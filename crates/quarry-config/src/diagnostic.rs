// SPDX-FileCopyrightText: 2026 Quarry Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration diagnostics for `quarry.toml`.
//!
//! Every Figment error is turned into a [`ConfigError`] pointing at the
//! offending line of the TOML file it came from, when that file is known.
//! Unknown keys get a "did you mean?" suggestion ranked by Jaro-Winkler
//! similarity.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

/// Minimum Jaro-Winkler similarity for a suggestion.
/// `debounse_ms` still reaches `debounce_ms`; unrelated words do not.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// One problem found while loading or validating configuration.
#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("unknown key `{key}` in {section}")]
    #[diagnostic(
        code(quarry::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        /// `[query]`-style header, or `the top level`.
        section: String,
        suggestion: Option<String>,
        /// Comma-separated keys accepted in the section.
        valid_keys: String,
        #[label("not a {section} key")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has the wrong type: {detail}")]
    #[diagnostic(code(quarry::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
        #[label("this value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("`{key}` has an invalid value: {detail}")]
    #[diagnostic(code(quarry::config::invalid_value), help("expected {expected}"))]
    InvalidValue {
        key: String,
        detail: String,
        expected: String,
        #[label("this value")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("missing required key `{key}`")]
    #[diagnostic(
        code(quarry::config::missing_key),
        help("add `{key} = <value>` to your quarry.toml")
    )]
    MissingKey { key: String },

    /// A value that parsed but breaks a semantic rule.
    #[error("validation error: {message}")]
    #[diagnostic(code(quarry::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(quarry::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

fn section_label(section: &[String]) -> String {
    if section.is_empty() {
        "the top level".to_string()
    } else {
        format!("[{}]", section.join("."))
    }
}

/// TOML text a Figment error may point into.
struct Source<'a> {
    name: &'a str,
    content: &'a str,
}

impl<'a> Source<'a> {
    /// The file the error was read from. With a single candidate, that one.
    fn for_error(error: &figment::Error, sources: &'a [(String, String)]) -> Option<Self> {
        let origin = error
            .metadata
            .as_ref()
            .and_then(|m| m.source.as_ref())
            .and_then(|s| match s {
                figment::Source::File(path) => Some(path.display().to_string()),
                _ => None,
            });

        let found = match origin {
            Some(path) => sources.iter().find(|(name, _)| *name == path),
            None if sources.len() == 1 => sources.first(),
            None => None,
        };
        found.map(|(name, content)| Source { name, content })
    }

    /// Span of `key` inside `section`, labelled against this source.
    fn span(&self, section: &[String], key: &str) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
        match find_key_offset(self.content, section, key) {
            Some(offset) => (
                Some(SourceSpan::new(offset.into(), key.len())),
                Some(NamedSource::new(self.name, self.content.to_string())),
            ),
            None => (None, None),
        }
    }
}

/// Splits a dotted error path into its section and final key.
fn split_path(error: &figment::Error) -> (Vec<String>, String) {
    let mut path: Vec<String> = error.path.clone();
    let key = path.pop().unwrap_or_default();
    (path, key)
}

/// Convert a `figment::Error` (which may hold several) into diagnostics.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let source = Source::for_error(&error, toml_sources);
            let locate = |section: &[String], key: &str| match &source {
                Some(source) => source.span(section, key),
                None => (None, None),
            };

            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    // The path names the enclosing section, sometimes with the field appended.
                    let mut section: Vec<String> = error.path.clone();
                    if section.last() == Some(field) {
                        section.pop();
                    }
                    let (span, src) = locate(&section, field);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section: section_label(&section),
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.to_string(),
                },
                Kind::InvalidType(actual, expected) => {
                    let (section, key) = split_path(&error);
                    let (span, src) = locate(&section, &key);
                    ConfigError::InvalidType {
                        key: error.path.join("."),
                        detail: format!("found {actual}"),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                Kind::InvalidValue(actual, expected) => {
                    let (section, key) = split_path(&error);
                    let (span, src) = locate(&section, &key);
                    ConfigError::InvalidValue {
                        key: error.path.join("."),
                        detail: format!("found {actual}"),
                        expected: expected.to_string(),
                        span,
                        src,
                    }
                }
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Byte offset of `key` under the table header named by `section`.
///
/// Tracks the current `[table]` (or `[[array]]`) header while scanning, so a
/// key with the same name in a different section is never matched. An empty
/// `section` means keys before the first header.
pub fn find_key_offset(content: &str, section: &[String], key: &str) -> Option<usize> {
    let wanted = section.join(".");
    let mut current = String::new();
    let mut offset = 0;

    for line in content.split_inclusive('\n') {
        let trimmed = line.trim_start();
        let indent = line.len() - trimmed.len();

        if let Some(header) = trimmed.strip_prefix('[') {
            current = header
                .trim_start_matches('[')
                .split(']')
                .next()
                .unwrap_or_default()
                .trim()
                .to_string();
        } else if current == wanted
            && let Some(after) = trimmed.strip_prefix(key)
            && after.trim_start().starts_with('=')
        {
            return Some(offset + indent);
        }
        offset += line.len();
    }

    None
}

/// The valid key closest to `unknown`, if any clears the similarity threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Render every error to stderr with miette's graphical handler.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = miette::GraphicalReportHandler::new();
    let mut out = String::new();
    for error in errors {
        if handler.render_report(&mut out, error as &dyn Diagnostic).is_err() {
            out.push_str(&format!("error: {error}\n"));
        }
    }
    if errors.len() > 1 {
        out.push_str(&format!("{} configuration errors\n", errors.len()));
    }
    eprint!("{out}");
}
