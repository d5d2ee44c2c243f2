//! Startup loading shared by every command: config, field catalog, presets.

use std::path::{Path, PathBuf};

use anyhow::Context;

use infradeck_core::catalog::FieldCatalog;
use infradeck_core::config::Config;
use infradeck_core::preset::PresetStore;

pub struct Loaded {
    pub config_path: PathBuf,
    pub config: Config,
    pub catalog: FieldCatalog,
    pub presets: PresetStore,
}

/// Locate and load the config file only
pub fn load_config(explicit: Option<&Path>) -> anyhow::Result<(PathBuf, Config)> {
    let cwd = std::env::current_dir().context("cannot determine the working directory")?;
    let (path, config) = Config::discover(explicit, &cwd).context("failed to load configuration")?;
    tracing::info!(path = %path.display(), "configuration loaded");
    Ok((path, config))
}

/// Everything the dashboard needs before drawing its first frame. Any
/// failure here is fatal.
pub fn load(explicit: Option<&Path>) -> anyhow::Result<Loaded> {
    let (config_path, config) = load_config(explicit)?;

    let fields_file = config.fields_file();
    let catalog = FieldCatalog::load(&fields_file)
        .with_context(|| format!("failed to load field catalog {}", fields_file.display()))?;
    config
        .validate(&catalog)
        .with_context(|| format!("invalid configuration {}", config_path.display()))?;

    let presets_dir = config.presets_dir();
    let presets = PresetStore::load_dir(&presets_dir)
        .with_context(|| format!("failed to load presets from {}", presets_dir.display()))?;
    tracing::info!(presets = presets.len(), fields = catalog.len(), "catalog and presets loaded");

    Ok(Loaded {
        config_path,
        config,
        catalog,
        presets,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn write_layout(root: &Path, config: &str) -> PathBuf {
        fs::create_dir_all(root.join("presets")).unwrap();
        fs::write(
            root.join("fields.yaml"),
            "fields:\n  vm_memory: { label: Memory, type: integer }\n  cluster: { label: Cluster, options: [a, b] }\n  vm_template: { label: Template, dynamic: true }\n",
        )
        .unwrap();
        fs::write(root.join("presets/small.yaml"), "vm_memory: 2048\ncluster: a\n").unwrap();
        let path = root.join("infradeck.yaml");
        fs::write(&path, config).unwrap();
        path
    }

    const CONFIG: &str = "apps_path: apps\ntemplate_path: template\npresets_path: presets\nform_fields: [vm_memory, cluster, vm_template]\n";

    #[test]
    fn test_load_resolves_relative_paths() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_layout(dir.path(), CONFIG);

        let loaded = load(Some(&path)).unwrap();
        assert_eq!(loaded.config_path, path);
        assert_eq!(loaded.presets.len(), 1);
        assert_eq!(loaded.catalog.len(), 3);
        assert_eq!(loaded.config.apps_dir(), dir.path().join("apps"));
    }

    #[test]
    fn test_unknown_form_field_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_layout(
            dir.path(),
            "apps_path: apps\ntemplate_path: template\npresets_path: presets\nform_fields: [vm_cpu]\n",
        );
        let err = load(Some(&path)).err().unwrap();
        assert!(format!("{:#}", err).contains("vm_cpu"));
    }

    #[test]
    fn test_missing_config_names_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.yaml");
        let err = load(Some(&missing)).err().unwrap();
        assert!(format!("{:#}", err).contains("nope.yaml"));
    }
}
