//! Preset store
//!
//! Named default value-sets for new deployments, one YAML document per
//! preset. The store is read-only once loaded; the active index lives with
//! the create form.

use std::collections::BTreeMap;
use std::path::Path;

use serde_yaml::Value;
use thiserror::Error;

use crate::model::{DynamicValue, FieldKey};

#[derive(Debug, Error)]
pub enum PresetError {
    #[error("failed to read presets from {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse preset {path}: {source}")]
    Yaml {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("preset {path} is not a mapping of field names to values")]
    NotAMapping { path: String },
    #[error("no presets found in {path}")]
    Empty { path: String },
}

#[derive(Clone, Debug, PartialEq)]
pub struct Preset {
    pub name: String,
    pub values: BTreeMap<FieldKey, DynamicValue>,
}

impl Preset {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: BTreeMap::new(),
        }
    }

    pub fn with(mut self, key: &str, value: DynamicValue) -> Self {
        self.values.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&DynamicValue> {
        self.values.get(key)
    }

    /// Parse one preset document. `origin` is only used in error messages.
    pub fn from_yaml(name: &str, content: &str, origin: &str) -> Result<Self, PresetError> {
        let doc: Value = serde_yaml::from_str(content).map_err(|source| PresetError::Yaml {
            path: origin.to_string(),
            source,
        })?;

        let mapping = match doc {
            Value::Mapping(m) => m,
            Value::Null => Default::default(),
            _ => {
                return Err(PresetError::NotAMapping {
                    path: origin.to_string(),
                });
            }
        };

        let mut values = BTreeMap::new();
        for (k, v) in mapping {
            let Some(key) = scalar_text(&k) else {
                tracing::warn!(preset = name, "skipping non-scalar preset key");
                continue;
            };
            match to_dynamic(&v) {
                Some(value) => {
                    values.insert(key, value);
                }
                None => {
                    if !v.is_null() {
                        tracing::warn!(preset = name, key = %key, "skipping nested preset value");
                    }
                }
            }
        }

        Ok(Self {
            name: name.to_string(),
            values,
        })
    }
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn to_dynamic(value: &Value) -> Option<DynamicValue> {
    match value {
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(DynamicValue::Integer(i)),
            None => Some(DynamicValue::String(n.to_string())),
        },
        Value::Sequence(items) => Some(DynamicValue::List(
            items.iter().filter_map(scalar_text).collect(),
        )),
        Value::Tagged(tagged) => to_dynamic(&tagged.value),
        Value::Null | Value::Mapping(_) => None,
        other => scalar_text(other).map(DynamicValue::String),
    }
}

/// Ordered, non-empty collection of presets
#[derive(Clone, Debug)]
pub struct PresetStore {
    presets: Vec<Preset>,
}

impl PresetStore {
    /// Load every `*.yaml` / `*.yml` file in `dir`, sorted by file name.
    pub fn load_dir(dir: &Path) -> Result<Self, PresetError> {
        let io_err = |source| PresetError::Io {
            path: dir.display().to_string(),
            source,
        };

        let mut paths = Vec::new();
        for entry in std::fs::read_dir(dir).map_err(io_err)? {
            let path = entry.map_err(io_err)?.path();
            let is_yaml = matches!(
                path.extension().and_then(|e| e.to_str()),
                Some("yaml") | Some("yml")
            );
            if path.is_file() && is_yaml {
                paths.push(path);
            }
        }
        paths.sort();

        let mut presets = Vec::with_capacity(paths.len());
        for path in paths {
            let origin = path.display().to_string();
            let content = std::fs::read_to_string(&path).map_err(|source| PresetError::Io {
                path: origin.clone(),
                source,
            })?;
            let name = path
                .file_stem()
                .map(|s| s.to_string_lossy().to_string())
                .unwrap_or_default();
            presets.push(Preset::from_yaml(&name, &content, &origin)?);
        }

        tracing::info!(count = presets.len(), dir = %dir.display(), "loaded presets");
        Self::new(presets).ok_or_else(|| PresetError::Empty {
            path: dir.display().to_string(),
        })
    }

    /// `None` when `presets` is empty.
    pub fn new(presets: Vec<Preset>) -> Option<Self> {
        if presets.is_empty() {
            None
        } else {
            Some(Self { presets })
        }
    }

    pub fn get(&self, index: usize) -> Option<&Preset> {
        self.presets.get(index)
    }

    /// Preset at `index` wrapped into range
    pub fn at(&self, index: usize) -> &Preset {
        &self.presets[index % self.presets.len()]
    }

    pub fn len(&self) -> usize {
        self.presets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.presets.is_empty()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.presets.iter().map(|p| p.name.as_str())
    }

    /// Cyclic step from `index` by `delta`
    pub fn next_index(&self, index: usize, delta: i32) -> usize {
        let len = self.presets.len() as i64;
        ((index as i64 + delta as i64).rem_euclid(len)) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_preset_values() {
        let yaml = r#"
vm_app: web
vm_memory: 8192
vm_disk_size: ["100G", "50G"]
backup: true
ratio: 1.5
note: ~
"#;
        let preset = Preset::from_yaml("small", yaml, "small.yaml").unwrap();
        assert_eq!(preset.name, "small");
        assert_eq!(preset.get("vm_app"), Some(&DynamicValue::String("web".into())));
        assert_eq!(preset.get("vm_memory"), Some(&DynamicValue::Integer(8192)));
        assert_eq!(
            preset.get("vm_disk_size"),
            Some(&DynamicValue::List(vec!["100G".into(), "50G".into()]))
        );
        assert_eq!(preset.get("backup"), Some(&DynamicValue::String("true".into())));
        assert_eq!(preset.get("ratio"), Some(&DynamicValue::String("1.5".into())));
        assert!(preset.get("note").is_none());
    }

    #[test]
    fn test_non_mapping_rejected() {
        let err = Preset::from_yaml("x", "- a\n- b\n", "x.yaml").unwrap_err();
        assert!(matches!(err, PresetError::NotAMapping { .. }));
    }

    #[test]
    fn test_load_dir_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("medium.yaml"), "vm_memory: 4096\n").unwrap();
        std::fs::write(dir.path().join("large.yml"), "vm_memory: 16384\n").unwrap();
        std::fs::write(dir.path().join("README.md"), "not a preset").unwrap();

        let store = PresetStore::load_dir(dir.path()).unwrap();
        let names: Vec<_> = store.names().collect();
        assert_eq!(names, ["large", "medium"]);
    }

    #[test]
    fn test_load_dir_empty_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = PresetStore::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, PresetError::Empty { .. }));
    }

    #[test]
    fn test_load_dir_malformed_is_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.yaml"), "vm_app: [unclosed\n").unwrap();
        let err = PresetStore::load_dir(dir.path()).unwrap_err();
        assert!(matches!(err, PresetError::Yaml { .. }));
    }

    #[test]
    fn test_next_index_wraps() {
        let store = PresetStore::new(vec![Preset::new("a"), Preset::new("b"), Preset::new("c")])
            .unwrap();
        assert_eq!(store.next_index(2, 1), 0);
        assert_eq!(store.next_index(0, -1), 2);
        assert_eq!(store.next_index(1, 1), 2);
    }
}
