use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::catalog::FieldCatalog;
use crate::form::Dependency;
use crate::lookup::{DEFAULT_EXCLUDE_SUFFIX, DEFAULT_INCLUDE_PATTERN, TemplateFilter};
use crate::pipeline::BackendSettings;

pub const CONFIG_ENV: &str = "INFRADECK_CONFIG";
const CONFIG_NAMES: [&str; 3] = ["infradeck.yaml", "infradeck.yml", "config.yaml"];

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("YAML parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("no config file found, searched: {}", format_paths(.searched))]
    NotFound { searched: Vec<PathBuf> },
    #[error("config is missing required field '{0}'")]
    MissingField(&'static str),
    #[error("form field '{0}' is not defined in the field catalog")]
    UnknownFormField(String),
    #[error("invalid lookup settings: {0}")]
    InvalidLookup(String),
    #[error("invalid template pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

fn format_paths(paths: &[PathBuf]) -> String {
    paths
        .iter()
        .map(|p| p.display().to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Inventory lookup wiring: which choice field refreshes which
#[derive(Clone, Debug, Deserialize, Serialize, PartialEq, Eq)]
pub struct LookupConfig {
    #[serde(default = "default_trigger")]
    pub trigger: String,

    #[serde(default = "default_dependent")]
    pub dependent: String,

    /// Falls back to `VAULT_ADDR`, then the local dev server
    #[serde(default)]
    pub vault_addr: Option<String>,

    #[serde(default = "default_secret_mount")]
    pub secret_mount: String,

    #[serde(default = "default_include_pattern")]
    pub include_pattern: String,

    #[serde(default = "default_exclude_suffix")]
    pub exclude_suffix: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_trigger() -> String {
    "cluster".into()
}
fn default_dependent() -> String {
    "vm_template".into()
}
fn default_secret_mount() -> String {
    "proxmox_api_keys".into()
}
fn default_include_pattern() -> String {
    DEFAULT_INCLUDE_PATTERN.into()
}
fn default_exclude_suffix() -> String {
    DEFAULT_EXCLUDE_SUFFIX.into()
}
fn default_timeout_secs() -> u64 {
    5
}

impl Default for LookupConfig {
    fn default() -> Self {
        Self {
            trigger: default_trigger(),
            dependent: default_dependent(),
            vault_addr: None,
            secret_mount: default_secret_mount(),
            include_pattern: default_include_pattern(),
            exclude_suffix: default_exclude_suffix(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl LookupConfig {
    pub fn dependency(&self) -> Dependency {
        Dependency {
            trigger: self.trigger.clone(),
            dependent: self.dependent.clone(),
        }
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }

    pub fn filter(&self) -> Result<TemplateFilter, ConfigError> {
        TemplateFilter::new(&self.include_pattern, &self.exclude_suffix).map_err(|e| {
            ConfigError::InvalidPattern {
                pattern: self.include_pattern.clone(),
                reason: e.to_string(),
            }
        })
    }

    pub fn vault_addr(&self) -> String {
        self.vault_addr
            .clone()
            .or_else(|| std::env::var("VAULT_ADDR").ok().filter(|v| !v.is_empty()))
            .unwrap_or_else(|| "http://127.0.0.1:8200".into())
    }
}

/// Root configuration file structure
#[derive(Clone, Debug, Deserialize, Serialize)]
pub struct Config {
    /// Infrastructure repository root
    #[serde(default)]
    pub repo: Option<PathBuf>,

    /// One subdirectory per deployment
    #[serde(default)]
    pub apps_path: Option<PathBuf>,

    /// Scaffold copied for new deployments
    #[serde(default)]
    pub template_path: Option<PathBuf>,

    #[serde(default)]
    pub presets_path: Option<PathBuf>,

    #[serde(default = "default_fields_path")]
    pub fields_path: PathBuf,

    /// Directory whose git status is shown in the header
    #[serde(default)]
    pub terraform_path: Option<PathBuf>,

    #[serde(default)]
    pub aws_profile: Option<String>,

    #[serde(default)]
    pub aws_region: Option<String>,

    #[serde(default)]
    pub s3_bucket: String,

    /// Leading component of every deployment name
    #[serde(default = "default_provider")]
    pub provider: String,

    /// Provisioning tool binary
    #[serde(default = "default_provisioner")]
    pub provisioner: String,

    #[serde(default = "default_form_fields")]
    pub form_fields: Vec<String>,

    /// Fields kept as-is when switching presets in the create form
    #[serde(default = "default_preserve")]
    pub preserve_on_preset_switch: Vec<String>,

    #[serde(default = "default_description_field")]
    pub description_field: String,

    #[serde(default)]
    pub lookup: LookupConfig,

    /// Directory containing the config file; relative paths resolve here
    #[serde(skip)]
    pub base_dir: PathBuf,
}

fn default_fields_path() -> PathBuf {
    PathBuf::from("fields.yaml")
}
fn default_provider() -> String {
    "proxmox".into()
}
fn default_provisioner() -> String {
    "terraform".into()
}
fn default_description_field() -> String {
    "platform_description".into()
}
fn default_preserve() -> Vec<String> {
    vec!["zone".into(), "cluster".into()]
}

pub fn default_form_fields() -> Vec<String> {
    [
        "vm_app",
        "platform_description",
        "zone",
        "platform_id",
        "vm_network_suffix",
        "vm_id_prefix",
        "vm_memory",
        "vm_cpu_cores",
        "vm_disk_count",
        "vm_disk_size",
        "vm_count",
        "vm_template",
        "cluster",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let base = path.parent().map(Path::to_path_buf).unwrap_or_default();
        Self::from_str(&content, &base)
    }

    /// Parse a config document; relative paths resolve against `base_dir`.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(content: &str, base_dir: &Path) -> Result<Self, ConfigError> {
        let mut config: Config = serde_yaml::from_str(content)?;
        config.base_dir = base_dir.to_path_buf();
        config.check_required()?;
        Ok(config)
    }

    /// Find the config file: explicit path, `INFRADECK_CONFIG`, then the
    /// well-known names in `start_dir`.
    pub fn discover(explicit: Option<&Path>, start_dir: &Path) -> Result<(PathBuf, Self), ConfigError> {
        let mut searched = Vec::new();

        if let Some(path) = explicit {
            if path.exists() {
                return Ok((path.to_path_buf(), Self::load(path)?));
            }
            return Err(ConfigError::NotFound {
                searched: vec![path.to_path_buf()],
            });
        }

        if let Ok(env_path) = std::env::var(CONFIG_ENV) {
            let path = PathBuf::from(&env_path);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        for name in CONFIG_NAMES {
            let path = start_dir.join(name);
            if path.exists() {
                return Ok((path.clone(), Self::load(&path)?));
            }
            searched.push(path);
        }

        Err(ConfigError::NotFound { searched })
    }

    fn check_required(&self) -> Result<(), ConfigError> {
        if self.apps_path.is_none() {
            return Err(ConfigError::MissingField("apps_path"));
        }
        if self.template_path.is_none() {
            return Err(ConfigError::MissingField("template_path"));
        }
        if self.presets_path.is_none() {
            return Err(ConfigError::MissingField("presets_path"));
        }
        if self.form_fields.is_empty() {
            return Err(ConfigError::MissingField("form_fields"));
        }
        Ok(())
    }

    /// Cross-check against the field catalog. Any failure is fatal at startup.
    pub fn validate(&self, catalog: &FieldCatalog) -> Result<(), ConfigError> {
        for key in &self.form_fields {
            if !catalog.contains(key) {
                return Err(ConfigError::UnknownFormField(key.clone()));
            }
        }

        for key in [&self.lookup.trigger, &self.lookup.dependent] {
            match catalog.get(key) {
                Some(d) if d.input.is_choice() => {}
                Some(_) => {
                    return Err(ConfigError::InvalidLookup(format!(
                        "'{}' must be a choice field (options or dynamic)",
                        key
                    )));
                }
                None => {
                    return Err(ConfigError::InvalidLookup(format!(
                        "'{}' is not defined in the field catalog",
                        key
                    )));
                }
            }
        }
        if self.lookup.trigger == self.lookup.dependent {
            return Err(ConfigError::InvalidLookup(
                "trigger and dependent must differ".into(),
            ));
        }

        self.lookup.filter()?;
        Ok(())
    }

    fn resolve(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base_dir.join(path)
        }
    }

    fn resolve_opt(&self, path: &Option<PathBuf>) -> PathBuf {
        path.as_deref().map(|p| self.resolve(p)).unwrap_or_default()
    }

    pub fn apps_dir(&self) -> PathBuf {
        self.resolve_opt(&self.apps_path)
    }

    pub fn template_dir(&self) -> PathBuf {
        self.resolve_opt(&self.template_path)
    }

    pub fn presets_dir(&self) -> PathBuf {
        self.resolve_opt(&self.presets_path)
    }

    pub fn fields_file(&self) -> PathBuf {
        self.resolve(&self.fields_path)
    }

    /// Git status target: `terraform_path`, then `repo`, then the config dir
    pub fn git_dir(&self) -> PathBuf {
        match (&self.terraform_path, &self.repo) {
            (Some(p), _) | (None, Some(p)) => self.resolve(p),
            (None, None) => self.base_dir.clone(),
        }
    }

    pub fn backend(&self) -> BackendSettings {
        BackendSettings {
            bucket: self.s3_bucket.clone(),
            region: self.aws_region.clone(),
            profile: self.aws_profile.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
apps_path: apps
template_path: template
presets_path: presets
s3_bucket: tf-state
"#;

    fn catalog() -> FieldCatalog {
        let mut yaml = String::from("fields:\n");
        for key in default_form_fields() {
            match key.as_str() {
                "zone" => yaml.push_str("  zone:\n    options: [standard, admin, dmz]\n"),
                "cluster" => yaml.push_str("  cluster:\n    options: [cl10400, cl12600k]\n"),
                "vm_template" => yaml.push_str("  vm_template:\n    dynamic: true\n"),
                other => yaml.push_str(&format!("  {}:\n    label: {}\n", other, other)),
            }
        }
        FieldCatalog::from_str(&yaml).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_str(MINIMAL, Path::new("/srv/infra")).unwrap();
        assert_eq!(config.provider, "proxmox");
        assert_eq!(config.provisioner, "terraform");
        assert_eq!(config.form_fields.len(), 13);
        assert_eq!(config.preserve_on_preset_switch, ["zone", "cluster"]);
        assert_eq!(config.lookup.trigger, "cluster");
        assert_eq!(config.lookup.dependent, "vm_template");
        assert_eq!(config.lookup.timeout(), Duration::from_secs(5));
        assert_eq!(config.apps_dir(), PathBuf::from("/srv/infra/apps"));
        assert_eq!(config.fields_file(), PathBuf::from("/srv/infra/fields.yaml"));
        assert_eq!(config.git_dir(), PathBuf::from("/srv/infra"));
    }

    #[test]
    fn test_absolute_paths_kept() {
        let yaml = "apps_path: /data/apps\ntemplate_path: t\npresets_path: p\nrepo: /data/repo\n";
        let config = Config::from_str(yaml, Path::new("/etc/infradeck")).unwrap();
        assert_eq!(config.apps_dir(), PathBuf::from("/data/apps"));
        assert_eq!(config.git_dir(), PathBuf::from("/data/repo"));
    }

    #[test]
    fn test_missing_required_field() {
        let err = Config::from_str("template_path: t\npresets_path: p\n", Path::new(".")).unwrap_err();
        assert!(matches!(err, ConfigError::MissingField("apps_path")));
    }

    #[test]
    fn test_validate_against_catalog() {
        let config = Config::from_str(MINIMAL, Path::new(".")).unwrap();
        config.validate(&catalog()).unwrap();
    }

    #[test]
    fn test_unknown_form_field_rejected() {
        let yaml = format!("{}form_fields: [vm_app, vm_gpu]\n", MINIMAL);
        let config = Config::from_str(&yaml, Path::new(".")).unwrap();
        let err = config.validate(&catalog()).unwrap_err();
        assert!(matches!(err, ConfigError::UnknownFormField(k) if k == "vm_gpu"));
    }

    #[test]
    fn test_lookup_trigger_must_be_choice() {
        let yaml = format!("{}lookup:\n  trigger: vm_app\n", MINIMAL);
        let config = Config::from_str(&yaml, Path::new(".")).unwrap();
        assert!(matches!(
            config.validate(&catalog()),
            Err(ConfigError::InvalidLookup(_))
        ));
    }

    #[test]
    fn test_bad_include_pattern() {
        let yaml = format!("{}lookup:\n  include_pattern: \"(unclosed\"\n", MINIMAL);
        let config = Config::from_str(&yaml, Path::new(".")).unwrap();
        assert!(matches!(
            config.validate(&catalog()),
            Err(ConfigError::InvalidPattern { .. })
        ));
    }

    #[test]
    fn test_discover_prefers_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let custom = dir.path().join("custom.yaml");
        std::fs::write(&custom, MINIMAL).unwrap();
        std::fs::write(dir.path().join("config.yaml"), "not: [valid").unwrap();

        let (path, config) = Config::discover(Some(&custom), dir.path()).unwrap();
        assert_eq!(path, custom);
        assert_eq!(config.base_dir, dir.path());
    }

    #[test]
    fn test_discover_well_known_names() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("config.yaml"), MINIMAL).unwrap();
        // INFRADECK_CONFIG is not set under test
        let (path, _) = Config::discover(None, dir.path()).unwrap();
        assert_eq!(path.file_name().unwrap(), "config.yaml");
    }

    #[test]
    fn test_discover_explicit_missing() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::discover(Some(&dir.path().join("nope.yaml")), dir.path()).unwrap_err();
        assert!(matches!(err, ConfigError::NotFound { .. }));
    }
}
