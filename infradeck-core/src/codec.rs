//! Variable codec for `terraform.tfvars`-style files
//!
//! Reading is tolerant: lines that are not `key = value` (or `key value`)
//! declarations are skipped. Writing never re-serializes the file; it patches
//! existing declaration lines in place so comments, blank lines and anything
//! the parser doesn't understand survive untouched. Keys that are not already
//! declared are not appended.

use std::collections::BTreeMap;
use std::path::Path;

use indexmap::IndexMap;
use thiserror::Error;

use crate::model::{DynamicValue, ValueKind};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("failed to access variables file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Decoded variables file: `key -> raw value text`, in declaration order
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VariableSet {
    entries: IndexMap<String, String>,
}

impl VariableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(|s| s.as_str())
    }

    pub fn insert(&mut self, key: impl Into<String>, raw: impl Into<String>) {
        self.entries.insert(key.into(), raw.into());
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(|k| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Value of a string variable with its quotes removed
    pub fn get_string(&self, key: &str) -> Option<String> {
        self.get(key).map(decode_string)
    }
}

fn is_key_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '-'
}

fn split_declaration(line: &str) -> Option<(&str, &str)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with("//") {
        return None;
    }

    let key_end = trimmed
        .char_indices()
        .find(|(_, c)| !is_key_char(*c))
        .map(|(i, _)| i)
        .unwrap_or(trimmed.len());
    if key_end == 0 {
        return None;
    }

    let (key, rest) = trimmed.split_at(key_end);
    let rest = rest.trim_start();
    let value = if let Some(after_eq) = rest.strip_prefix('=') {
        after_eq
    } else if key_end < trimmed.len() && trimmed[key_end..].starts_with(char::is_whitespace) {
        rest
    } else {
        return None;
    };

    Some((key, value.trim()))
}

/// Decode variables text. Never fails; malformed lines are ignored and the
/// last occurrence of a duplicate key wins.
pub fn parse(text: &str) -> VariableSet {
    let mut set = VariableSet::new();
    for line in text.lines() {
        if let Some((key, value)) = split_declaration(line) {
            set.insert(key, value);
        }
    }
    set
}

fn matches_key(line: &str, key: &str) -> bool {
    let trimmed = line.trim_start();
    match trimmed.strip_prefix(key) {
        Some(rest) => rest.starts_with('=') || rest.starts_with(' ') || rest.starts_with('\t'),
        None => false,
    }
}

/// Replace each existing declaration of a key in `updates` with
/// `key = value`. Everything else passes through verbatim; unknown keys are
/// dropped.
pub fn patch(text: &str, updates: &BTreeMap<String, String>) -> String {
    text.split('\n')
        .map(|line| {
            match updates.iter().find(|(key, _)| matches_key(line, key)) {
                Some((key, value)) => format!("{} = {}", key, value),
                None => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

pub fn encode_string(value: &str) -> String {
    let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
    format!("\"{}\"", escaped)
}

/// Split on commas that sit outside double quotes. Backslash escapes inside
/// quotes are kept for the caller to decode.
fn split_unquoted_commas(text: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut start = 0;
    let mut quoted = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
        match c {
            _ if escaped => escaped = false,
            '\\' if quoted => escaped = true,
            '"' => quoted = !quoted,
            ',' if !quoted => {
                parts.push(&text[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    parts.push(&text[start..]);
    parts
}

/// Encode comma-separated form text as a quoted list. An item holding a
/// comma is written in double quotes. Empty input yields `[]`.
pub fn encode_list(text: &str) -> String {
    let items: Vec<String> = split_unquoted_commas(text)
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(|part| {
            if part.len() >= 2 && part.starts_with('"') && part.ends_with('"') {
                encode_string(&decode_string(part))
            } else {
                encode_string(part)
            }
        })
        .collect();
    format!("[{}]", items.join(", "))
}

/// Type-directed encoding of form text into a raw variable value
pub fn encode_value(kind: ValueKind, text: &str) -> String {
    match kind {
        ValueKind::String => encode_string(text),
        ValueKind::StringList => encode_list(text),
        ValueKind::Integer => text.trim().to_string(),
    }
}

pub fn encode_dynamic(value: &DynamicValue) -> String {
    match value {
        DynamicValue::String(s) => encode_string(s),
        DynamicValue::Integer(n) => n.to_string(),
        DynamicValue::List(items) => {
            let items: Vec<String> = items.iter().map(|s| encode_string(s)).collect();
            format!("[{}]", items.join(", "))
        }
    }
}

pub fn decode_string(raw: &str) -> String {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .unwrap_or(raw);

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.next() {
                Some(next) => out.push(next),
                None => out.push('\\'),
            }
        } else {
            out.push(c);
        }
    }
    out
}

pub fn decode_list(raw: &str) -> Vec<String> {
    let raw = raw.trim();
    let inner = raw
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(raw);

    split_unquoted_commas(inner)
        .into_iter()
        .map(str::trim)
        .filter(|part| !part.is_empty())
        .map(decode_string)
        .collect()
}

pub fn decode_value(kind: ValueKind, raw: &str) -> DynamicValue {
    match kind {
        ValueKind::String => DynamicValue::String(decode_string(raw)),
        ValueKind::StringList => DynamicValue::List(decode_list(raw)),
        ValueKind::Integer => match raw.trim().parse::<i64>() {
            Ok(n) => DynamicValue::Integer(n),
            Err(_) => DynamicValue::String(raw.trim().to_string()),
        },
    }
}

/// Editable text for a persisted value
pub fn to_form_text(kind: ValueKind, raw: &str) -> String {
    decode_value(kind, raw).to_form_text()
}

pub fn read_variables(path: &Path) -> Result<VariableSet, CodecError> {
    let text = std::fs::read_to_string(path).map_err(|source| CodecError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(parse(&text))
}

/// Patch the file at `path` in place
pub fn write_patched(path: &Path, updates: &BTreeMap<String, String>) -> Result<(), CodecError> {
    let io_err = |source| CodecError::Io {
        path: path.display().to_string(),
        source,
    };
    let text = std::fs::read_to_string(path).map_err(io_err)?;
    std::fs::write(path, patch(&text, updates)).map_err(io_err)
}
