// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Turns figment failures on `courier.toml` into miette diagnostics.
//!
//! Every diagnostic names the table it came from (`[worker]`, `[callback]`,
//! the n-th `[[providers]]` entry, ...). Unknown keys get a span into the
//! file and a Jaro-Winkler "did you mean" against that table's fields.

#![allow(unused_assignments)] // miette's Diagnostic derive generates code triggering this lint

use miette::{Diagnostic, GraphicalReportHandler, NamedSource, SourceSpan};
use thiserror::Error;

/// Typos scoring below this are not worth a suggestion.
const SUGGESTION_THRESHOLD: f64 = 0.75;

/// The one table in `courier.toml` that is an array of tables.
const PROVIDERS: &str = "providers";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    /// A key that no courier table declares, or an unknown table.
    #[error("unknown key `{key}` in {section}")]
    #[diagnostic(
        code(courier::config::unknown_key),
        help("{}", unknown_key_help(suggestion.as_deref(), valid_keys))
    )]
    UnknownKey {
        key: String,
        section: String,
        suggestion: Option<String>,
        valid_keys: String,
        #[label("not declared in this table")]
        span: Option<SourceSpan>,
        #[source_code]
        src: Option<NamedSource<String>>,
    },

    #[error("invalid type for `{key}`: {detail}")]
    #[diagnostic(code(courier::config::invalid_type), help("expected {expected}"))]
    InvalidType {
        key: String,
        detail: String,
        expected: String,
    },

    /// A value outside a closed set, such as a channel or adapter kind.
    #[error("invalid value for `{key}`: {detail}")]
    #[diagnostic(code(courier::config::invalid_value))]
    InvalidValue { key: String, detail: String },

    #[error("missing required key `{key}` in {section}")]
    #[diagnostic(
        code(courier::config::missing_key),
        help("add `{key} = <value>` under {section} in courier.toml")
    )]
    MissingKey { key: String, section: String },

    /// Cross-field checks: lease vs attempt timeout, duplicate provider ids, ...
    #[error("validation error: {message}")]
    #[diagnostic(code(courier::config::validation))]
    Validation { message: String },

    #[error("configuration error: {0}")]
    #[diagnostic(code(courier::config::other))]
    Other(String),
}

fn unknown_key_help(suggestion: Option<&str>, valid_keys: &str) -> String {
    match suggestion {
        Some(s) => format!("did you mean `{s}`? Valid keys: {valid_keys}"),
        None => format!("valid keys: {valid_keys}"),
    }
}

/// Human label for the table a figment path points into.
///
/// `[]` is the document root, `["worker"]` is `[worker]`, and
/// `["providers", "1"]` is the second `[[providers]]` entry.
pub fn section_label(path: &[String]) -> String {
    match path {
        [] => "the top level".to_string(),
        [table, index, ..] if table == PROVIDERS => match index.parse::<usize>() {
            Ok(i) => format!("[[{PROVIDERS}]] entry {}", i + 1),
            Err(_) => format!("[[{PROVIDERS}]]"),
        },
        [table, ..] if table == PROVIDERS => format!("[[{PROVIDERS}]]"),
        [table, ..] => format!("[{table}]"),
    }
}

fn dotted(path: &[String]) -> String {
    path.join(".")
}

/// Convert a `figment::Error` (one or many) into courier diagnostics.
pub fn figment_to_config_errors(
    err: figment::Error,
    toml_sources: &[(String, String)],
) -> Vec<ConfigError> {
    use figment::error::Kind;

    err.into_iter()
        .map(|error| {
            let path: Vec<String> = error.path.iter().map(|s| s.to_string()).collect();
            match &error.kind {
                Kind::UnknownField(field, expected) => {
                    let (span, src) = locate(&error, &path, field, toml_sources);
                    ConfigError::UnknownKey {
                        key: field.clone(),
                        section: section_label(&path),
                        suggestion: suggest_key(field, expected),
                        valid_keys: expected.join(", "),
                        span,
                        src,
                    }
                }
                Kind::MissingField(field) => ConfigError::MissingKey {
                    key: field.to_string(),
                    section: section_label(&path),
                },
                Kind::InvalidType(actual, expected) => ConfigError::InvalidType {
                    key: dotted(&path),
                    detail: format!("found {actual}, expected {expected}"),
                    expected: expected.to_string(),
                },
                Kind::UnknownVariant(variant, expected) => ConfigError::InvalidValue {
                    key: dotted(&path),
                    detail: match suggest_key(variant, expected) {
                        Some(s) => format!(
                            "`{variant}` is not one of [{}]; did you mean `{s}`?",
                            expected.join(", ")
                        ),
                        None => format!("`{variant}` is not one of [{}]", expected.join(", ")),
                    },
                },
                _ => ConfigError::Other(error.to_string()),
            }
        })
        .collect()
}

/// Span of `field` in whichever loaded file the error came from.
fn locate(
    error: &figment::error::Error,
    path: &[String],
    field: &str,
    toml_sources: &[(String, String)],
) -> (Option<SourceSpan>, Option<NamedSource<String>>) {
    let origin = error
        .metadata
        .as_ref()
        .and_then(|m| m.source.as_ref())
        .and_then(|s| match s {
            figment::Source::File(file) => Some(file.display().to_string()),
            _ => None,
        });

    // Inline strings have no file origin; a lone source must be the one.
    let source = match (origin, toml_sources) {
        (Some(file), _) => toml_sources.iter().find(|(name, _)| *name == file),
        (None, [only]) => Some(only),
        (None, _) => None,
    };

    source
        .and_then(|(name, content)| {
            let offset = find_key_offset(content, path, field)?;
            Some((
                Some(SourceSpan::new(offset.into(), field.len())),
                Some(NamedSource::new(name.clone(), content.clone())),
            ))
        })
        .unwrap_or((None, None))
}

/// Byte offset of `field` inside the table `path` names.
///
/// The search runs from the table header to the next header, so a key of
/// the same name in a later table is never picked. For `[[providers]]` the
/// entry index in `path` selects which header to start from.
pub fn find_key_offset(content: &str, path: &[String], field: &str) -> Option<usize> {
    let start = match path {
        [] => 0,
        [table, rest @ ..] if table == PROVIDERS => {
            let nth = rest.first().and_then(|i| i.parse::<usize>().ok()).unwrap_or(0);
            let header = format!("[[{PROVIDERS}]]");
            let (pos, _) = content.match_indices(&header).nth(nth)?;
            pos + header.len()
        }
        [table, ..] => {
            let header = format!("[{table}]");
            content.find(&header)? + header.len()
        }
    };

    let mut offset = start;
    for line in content[start..].split_inclusive('\n') {
        let trimmed = line.trim_start();
        if trimmed.starts_with('[') && offset != start {
            return None;
        }
        let is_key = trimmed
            .strip_prefix(field)
            .is_some_and(|after| after.starts_with([' ', '\t', '=']));
        if is_key {
            return Some(offset + (line.len() - trimmed.len()));
        }
        offset += line.len();
    }
    None
}

/// Closest declared key to `unknown`, if it scores above the threshold.
pub fn suggest_key(unknown: &str, valid_keys: &[&str]) -> Option<String> {
    valid_keys
        .iter()
        .map(|key| (strsim::jaro_winkler(unknown, key), *key))
        .filter(|(score, _)| *score > SUGGESTION_THRESHOLD)
        .max_by(|a, b| a.0.total_cmp(&b.0))
        .map(|(_, key)| key.to_string())
}

/// Print each diagnostic to stderr with miette's graphical renderer.
pub fn render_errors(errors: &[ConfigError]) {
    let handler = GraphicalReportHandler::new();
    for error in errors {
        let mut out = String::new();
        match handler.render_report(&mut out, error as &dyn Diagnostic) {
            Ok(()) => eprint!("{out}"),
            Err(_) => eprintln!("config error: {error}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn suggests_batch_size_for_typo() {
        let valid = &["workers", "batch_size", "lease_seconds"];
        assert_eq!(suggest_key("bach_size", valid), Some("batch_size".to_string()));
    }

    #[test]
    fn no_suggestion_for_distant_typo() {
        let valid = &["workers", "batch_size", "lease_seconds"];
        assert_eq!(suggest_key("zzzzzz", valid), None);
    }

    #[test]
    fn labels_name_the_courier_table() {
        assert_eq!(section_label(&[]), "the top level");
        assert_eq!(section_label(&path(&["callback"])), "[callback]");
        assert_eq!(section_label(&path(&["providers"])), "[[providers]]");
        assert_eq!(section_label(&path(&["providers", "1"])), "[[providers]] entry 2");
    }

    #[test]
    fn key_offset_is_found_inside_its_table() {
        let content = "[worker]\nwrokers = 4\n";
        let o = find_key_offset(content, &path(&["worker"]), "wrokers").unwrap();
        assert_eq!(&content[o..o + 7], "wrokers");
    }

    #[test]
    fn key_offset_does_not_leak_into_the_next_table() {
        let content = "[worker]\nworkers = 2\n\n[callback]\nmax_skew = 30\n";
        assert_eq!(find_key_offset(content, &path(&["worker"]), "max_skew"), None);
    }

    #[test]
    fn key_offset_picks_the_indexed_provider_entry() {
        let content = "[[providers]]\nid = \"p1\"\nknd = \"log\"\n\n\
                       [[providers]]\nid = \"p2\"\nknd = \"http\"\n";
        let first = find_key_offset(content, &path(&["providers"]), "knd").unwrap();
        let second = find_key_offset(content, &path(&["providers", "1"]), "knd").unwrap();
        assert!(second > first);
        assert_eq!(&content[second..second + 12], "knd = \"http\"");
    }
}
