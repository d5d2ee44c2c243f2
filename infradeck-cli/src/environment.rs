//! Header indicators: AWS and Vault credentials in the environment, and the
//! git state of the infrastructure checkout.

use std::path::Path;
use std::process::Command;

use infradeck_core::config::Config;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GitStatus {
    pub branch: String,
    pub dirty: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct EnvStatus {
    /// Profile and region, each from the environment or the config file
    pub aws: Option<(String, String)>,
    /// `TF_VAR_role_id` and `TF_VAR_secret_id` are both set
    pub vault: bool,
    /// `None` when the directory is not a git checkout or git is missing
    pub git: Option<GitStatus>,
}

impl EnvStatus {
    pub fn probe(config: &Config) -> Self {
        Self {
            aws: aws_settings(config, |name| std::env::var(name).ok()),
            vault: vault_credentials_present(|name| std::env::var(name).ok()),
            git: git_status(&config.git_dir()),
        }
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}

/// Environment first, config second; both profile and region are required
pub fn aws_settings(
    config: &Config,
    env: impl Fn(&str) -> Option<String>,
) -> Option<(String, String)> {
    let profile = non_empty(env("AWS_PROFILE")).or_else(|| non_empty(config.aws_profile.clone()))?;
    let region = non_empty(env("AWS_REGION")).or_else(|| non_empty(config.aws_region.clone()))?;
    Some((profile, region))
}

pub fn vault_credentials_present(env: impl Fn(&str) -> Option<String>) -> bool {
    non_empty(env("TF_VAR_role_id")).is_some() && non_empty(env("TF_VAR_secret_id")).is_some()
}

pub fn git_status(dir: &Path) -> Option<GitStatus> {
    let output = Command::new("git")
        .arg("-C")
        .arg(dir)
        .args(["status", "--porcelain", "--branch"])
        .output()
        .ok()?;
    if !output.status.success() {
        tracing::debug!(dir = %dir.display(), "git status failed");
        return None;
    }
    Some(parse_porcelain(&String::from_utf8_lossy(&output.stdout)))
}

/// Parse `git status --porcelain --branch` output
pub fn parse_porcelain(text: &str) -> GitStatus {
    let mut lines = text.lines();
    let branch = lines
        .next()
        .and_then(|first| first.strip_prefix("## "))
        .map(|rest| {
            let end = rest.find("...").or_else(|| rest.find(' ')).unwrap_or(rest.len());
            rest[..end].to_string()
        })
        .unwrap_or_else(|| "main".to_string());
    let dirty = lines.any(|l| !l.trim().is_empty());
    GitStatus { branch, dirty }
}
