//! Deployment registry
//!
//! Read-only view over the apps directory: one row per immediate
//! subdirectory. Per-deployment problems degrade that row and are collected
//! as issues; only an unreadable apps root fails the listing.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Local};
use thiserror::Error;
use walkdir::WalkDir;

use crate::codec::{self, VariableSet};
use crate::model::{DeploymentSummary, LifecycleState};
use crate::state::{StateError, StateRecord};

pub const VARIABLES_FILE: &str = "terraform.tfvars";

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("failed to read apps directory {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// A non-fatal problem with one deployment
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListingIssue {
    pub deployment: String,
    pub message: String,
}

#[derive(Clone, Debug, Default)]
pub struct Listing {
    pub rows: Vec<DeploymentSummary>,
    pub issues: Vec<ListingIssue>,
}

impl Listing {
    pub fn find(&self, name: &str) -> Option<&DeploymentSummary> {
        self.rows.iter().find(|r| r.name == name)
    }
}

fn format_mtime(time: SystemTime) -> String {
    let local: DateTime<Local> = time.into();
    local.format("%Y-%m-%d %H:%M").to_string()
}

/// Summarise every deployment under `apps_root`, sorted by name.
/// `description_field` names the variable shown as the row description.
pub fn list(apps_root: &Path, description_field: &str) -> Result<Listing, RegistryError> {
    let io_err = |source: std::io::Error| RegistryError::Io {
        path: apps_root.display().to_string(),
        source,
    };

    let mut dirs: Vec<PathBuf> = Vec::new();
    let walker = WalkDir::new(apps_root)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name();
    for entry in walker {
        let entry = entry.map_err(|e| io_err(e.into()))?;
        if entry.file_type().is_dir() {
            dirs.push(entry.into_path());
        }
    }

    let mut listing = Listing::default();
    for dir in dirs {
        let (row, issues) = summarize(&dir, description_field);
        listing.issues.extend(issues);
        listing.rows.push(row);
    }

    for issue in &listing.issues {
        tracing::warn!(deployment = %issue.deployment, "{}", issue.message);
    }
    tracing::debug!(rows = listing.rows.len(), root = %apps_root.display(), "listed deployments");
    Ok(listing)
}

/// Build one row; never fails.
pub fn summarize(dir: &Path, description_field: &str) -> (DeploymentSummary, Vec<ListingIssue>) {
    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_default();
    let mut issues = Vec::new();

    let variables = codec::read_variables(&dir.join(VARIABLES_FILE)).unwrap_or_else(|_| VariableSet::new());
    let description = variables.get_string(description_field).unwrap_or_default();

    let (state, last_action) = match StateRecord::load(dir) {
        Ok(record) => (record.state, record.short_timestamp()),
        Err(e) => {
            let message = match &e {
                StateError::Missing { .. } => "no state record".to_string(),
                other => other.to_string(),
            };
            issues.push(ListingIssue {
                deployment: name.clone(),
                message,
            });
            (LifecycleState::Unknown, String::new())
        }
    };

    let last_modified = std::fs::metadata(dir)
        .and_then(|m| m.modified())
        .map(format_mtime)
        .unwrap_or_default();

    let row = DeploymentSummary {
        name,
        description,
        state,
        last_action,
        last_modified,
        path: dir.to_path_buf(),
        variables,
    };
    (row, issues)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::{LastAction, STATE_FILE};

    #[test]
    fn test_bare_directory_is_unknown() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("proxmox_web_dmz_01")).unwrap();

        let listing = list(root.path(), "platform_description").unwrap();
        assert_eq!(listing.rows.len(), 1);
        let row = &listing.rows[0];
        assert_eq!(row.name, "proxmox_web_dmz_01");
        assert_eq!(row.state, LifecycleState::Unknown);
        assert_eq!(row.description, "");
        assert_eq!(row.last_action, "");
        assert!(!row.last_modified.is_empty());
        assert_eq!(listing.issues.len(), 1);
    }

    #[test]
    fn test_row_reads_description_and_state() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("proxmox_api_admin_02");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(
            dir.join(VARIABLES_FILE),
            "vm_app = \"api\"\nplatform_description = \"Internal API\"\n",
        )
        .unwrap();
        StateRecord::new(LifecycleState::Deployed, LastAction::Apply)
            .write(&dir)
            .unwrap();

        let listing = list(root.path(), "platform_description").unwrap();
        let row = listing.find("proxmox_api_admin_02").unwrap();
        assert_eq!(row.description, "Internal API");
        assert_eq!(row.state, LifecycleState::Deployed);
        assert_eq!(row.last_action.len(), 16);
        assert_eq!(row.variables.get("vm_app"), Some("\"api\""));
        assert!(listing.issues.is_empty());
    }

    #[test]
    fn test_malformed_state_degrades_row() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("broken");
        std::fs::create_dir(&dir).unwrap();
        std::fs::write(dir.join(STATE_FILE), "state: SIDEWAYS\n").unwrap();

        let listing = list(root.path(), "platform_description").unwrap();
        assert_eq!(listing.rows[0].state, LifecycleState::Unknown);
        assert_eq!(listing.issues[0].deployment, "broken");
    }

    #[test]
    fn test_rows_sorted_and_files_ignored() {
        let root = tempfile::tempdir().unwrap();
        for name in ["zeta", "alpha", "mid"] {
            std::fs::create_dir(root.path().join(name)).unwrap();
        }
        std::fs::write(root.path().join("notes.txt"), "x").unwrap();

        let listing = list(root.path(), "platform_description").unwrap();
        let names: Vec<_> = listing.rows.iter().map(|r| r.name.as_str()).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_missing_root_is_error() {
        let root = tempfile::tempdir().unwrap();
        assert!(list(&root.path().join("absent"), "platform_description").is_err());
    }

    #[test]
    fn test_listing_is_read_only() {
        let root = tempfile::tempdir().unwrap();
        std::fs::create_dir(root.path().join("a")).unwrap();
        list(root.path(), "platform_description").unwrap();
        list(root.path(), "platform_description").unwrap();
        let entries: Vec<_> = std::fs::read_dir(root.path().join("a")).unwrap().collect();
        assert!(entries.is_empty());
    }
}
