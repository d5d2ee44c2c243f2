//! Field catalog
//!
//! Static description of every variable a deployment form can show: label,
//! help text, whether it may be edited after creation, its value kind and
//! how the user interacts with it. Loaded once at startup and shared
//! read-only afterwards.

use std::path::Path;

use indexmap::IndexMap;
use serde::Deserialize;
use thiserror::Error;

use crate::model::{FieldDescriptor, FieldKey, InputMode, ValueKind};

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("failed to read field catalog {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse field catalog: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("field '{key}' has unknown type '{kind}'")]
    UnknownKind { key: String, kind: String },
}

#[derive(Debug, Deserialize)]
struct CatalogDocument {
    #[serde(default)]
    fields: IndexMap<String, FieldEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FieldEntry {
    #[serde(default)]
    label: String,
    #[serde(default)]
    help: String,
    #[serde(default)]
    read_only: bool,
    #[serde(default, rename = "type")]
    kind: Option<String>,
    #[serde(default)]
    options: Vec<String>,
    #[serde(default)]
    dynamic: bool,
}

fn parse_kind(key: &str, raw: Option<&str>) -> Result<ValueKind, CatalogError> {
    let Some(raw) = raw else {
        return Ok(ValueKind::String);
    };
    match raw.trim().to_lowercase().as_str() {
        "" | "string" => Ok(ValueKind::String),
        "integer" | "int" | "number" => Ok(ValueKind::Integer),
        "list" | "string_list" | "list(string)" => Ok(ValueKind::StringList),
        other => Err(CatalogError::UnknownKind {
            key: key.to_string(),
            kind: other.to_string(),
        }),
    }
}

/// Immutable mapping from field key to its descriptor, in document order
#[derive(Clone, Debug, Default)]
pub struct FieldCatalog {
    fields: IndexMap<FieldKey, FieldDescriptor>,
}

impl FieldCatalog {
    pub fn load(path: &Path) -> Result<Self, CatalogError> {
        let content = std::fs::read_to_string(path).map_err(|source| CatalogError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_str(&content)
    }

    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str) -> Result<Self, CatalogError> {
        let doc: CatalogDocument = serde_yaml::from_str(content)?;
        let mut fields = IndexMap::new();

        for (key, entry) in doc.fields {
            let kind = parse_kind(&key, entry.kind.as_deref())?;
            let input = if entry.dynamic || !entry.options.is_empty() {
                InputMode::CyclicChoice {
                    options: entry.options,
                    dynamic: entry.dynamic,
                }
            } else {
                InputMode::FreeText
            };
            let label = if entry.label.trim().is_empty() {
                key.clone()
            } else {
                entry.label
            };

            fields.insert(
                key.clone(),
                FieldDescriptor {
                    key,
                    label,
                    help: entry.help,
                    read_only: entry.read_only,
                    kind,
                    input,
                },
            );
        }

        Ok(Self { fields })
    }

    pub fn from_descriptors(descriptors: impl IntoIterator<Item = FieldDescriptor>) -> Self {
        Self {
            fields: descriptors
                .into_iter()
                .map(|d| (d.key.clone(), d))
                .collect(),
        }
    }

    pub fn get(&self, key: &str) -> Option<&FieldDescriptor> {
        self.fields.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Display label for a key, falling back to the key itself
    pub fn label<'a>(&'a self, key: &'a str) -> &'a str {
        self.fields.get(key).map(|d| d.label.as_str()).unwrap_or(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.values()
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Descriptors for `keys` in the given order. Unknown keys are skipped.
    pub fn select(&self, keys: &[String]) -> Vec<FieldDescriptor> {
        keys.iter()
            .filter_map(|k| self.fields.get(k).cloned())
            .collect()
    }
}
