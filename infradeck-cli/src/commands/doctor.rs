use std::path::Path;
use std::process::Command;

use infradeck_core::catalog::FieldCatalog;
use infradeck_core::config::Config;
use infradeck_core::preset::PresetStore;

use crate::bootstrap;
use crate::environment;

#[derive(Debug)]
pub struct Check {
    pub name: String,
    pub passed: bool,
    pub message: String,
    pub hint: Option<String>,
}

impl Check {
    fn ok(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: true,
            message: message.into(),
            hint: None,
        }
    }

    fn fail(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            passed: false,
            message: message.into(),
            hint: None,
        }
    }

    fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Check configuration, catalog, presets, tooling and credentials. Errors
/// when any check fails so scripts can gate on the exit code.
pub fn run_doctor(config_path: Option<&Path>) -> anyhow::Result<()> {
    println!("Infradeck Doctor\n");

    let mut checks: Vec<Check> = Vec::new();

    println!("Configuration:");
    let section_start = checks.len();
    match bootstrap::load_config(config_path) {
        Ok((path, config)) => {
            checks.push(Check::ok("config", path.display().to_string()));
            checks.extend(check_layout(&config));
            print_section(&checks[section_start..]);

            println!("Tooling:");
            let tooling_start = checks.len();
            checks.push(check_provisioner(&config.provisioner));
            checks.push(check_git(&config.git_dir()));
            print_section(&checks[tooling_start..]);

            println!("Credentials:");
            let creds_start = checks.len();
            checks.extend(check_credentials(&config));
            print_section(&checks[creds_start..]);
        }
        Err(e) => {
            checks.push(
                Check::fail("config", format!("{:#}", e))
                    .with_hint("Pass --config or set INFRADECK_CONFIG"),
            );
            print_section(&checks[section_start..]);
        }
    }

    let failed: Vec<_> = checks.iter().filter(|c| !c.passed).collect();
    if failed.is_empty() {
        println!("All checks passed!");
        return Ok(());
    }

    println!("Issues found:");
    for check in &failed {
        println!("  - {}: {}", check.name, check.message);
        if let Some(hint) = &check.hint {
            println!("    Hint: {}", hint);
        }
    }
    anyhow::bail!("{} check(s) failed", failed.len())
}

fn print_section(checks: &[Check]) {
    for check in checks {
        print_check(check);
    }
    println!();
}

fn print_check(check: &Check) {
    let icon = if check.passed { "✓" } else { "✗" };
    let color = if check.passed { "\x1b[32m" } else { "\x1b[31m" };
    let reset = "\x1b[0m";

    println!("  {}{}{} {}: {}", color, icon, reset, check.name, check.message);

    if let Some(hint) = &check.hint {
        println!("    └─ {}", hint);
    }
}

/// Catalog, presets and the directories the pipeline reads and writes
fn check_layout(config: &Config) -> Vec<Check> {
    let mut checks = Vec::new();

    let fields_file = config.fields_file();
    match FieldCatalog::load(&fields_file) {
        Ok(catalog) => match config.validate(&catalog) {
            Ok(()) => checks.push(Check::ok(
                "fields",
                format!("{} fields, {} on the form", catalog.len(), config.form_fields.len()),
            )),
            Err(e) => checks.push(Check::fail("fields", e.to_string())),
        },
        Err(e) => checks.push(
            Check::fail("fields", e.to_string()).with_hint(format!("Expected at {}", fields_file.display())),
        ),
    }

    match PresetStore::load_dir(&config.presets_dir()) {
        Ok(presets) => checks.push(Check::ok(
            "presets",
            presets.names().collect::<Vec<_>>().join(", "),
        )),
        Err(e) => checks.push(Check::fail("presets", e.to_string())),
    }

    checks.push(check_dir("apps", &config.apps_dir()));
    checks.push(check_dir("template", &config.template_dir()));
    checks
}

fn check_dir(name: &str, dir: &Path) -> Check {
    if dir.is_dir() {
        Check::ok(name, dir.display().to_string())
    } else if dir.exists() {
        Check::fail(name, format!("{} is not a directory", dir.display()))
    } else {
        Check::fail(name, format!("{} not found", dir.display()))
            .with_hint(format!("mkdir -p {}", dir.display()))
    }
}

fn check_provisioner(binary: &str) -> Check {
    match Command::new(binary).arg("version").output() {
        Ok(output) if output.status.success() => {
            let text = String::from_utf8_lossy(&output.stdout);
            let version = text.lines().next().unwrap_or_default().trim().to_string();
            Check::ok(binary, version)
        }
        Ok(_) => Check::fail(binary, format!("error running {} version", binary)),
        Err(_) => Check::fail(binary, "not installed")
            .with_hint("Install terraform, or run with --simulate"),
    }
}

fn check_git(dir: &Path) -> Check {
    match environment::git_status(dir) {
        Some(git) if git.dirty => Check::ok("git", format!("{} (uncommitted changes)", git.branch)),
        Some(git) => Check::ok("git", format!("{} (clean)", git.branch)),
        None => Check::fail("git", format!("{} is not a git checkout", dir.display())),
    }
}

fn check_credentials(config: &Config) -> Vec<Check> {
    let env = |name: &str| std::env::var(name).ok();
    let mut checks = Vec::new();

    match environment::aws_settings(config, env) {
        Some((profile, region)) => checks.push(Check::ok("aws", format!("profile {} in {}", profile, region))),
        None => checks.push(
            Check::fail("aws", "profile or region not set")
                .with_hint("Set AWS_PROFILE and AWS_REGION, or aws_profile/aws_region in the config"),
        ),
    }

    if environment::vault_credentials_present(env) {
        checks.push(Check::ok("vault", format!("AppRole credentials set, {}", config.lookup.vault_addr())));
    } else {
        checks.push(
            Check::fail("vault", "AppRole credentials not set")
                .with_hint("Export TF_VAR_role_id and TF_VAR_secret_id"),
        );
    }

    if config.s3_bucket.trim().is_empty() {
        checks.push(Check::fail("backend", "s3_bucket is empty").with_hint("Set s3_bucket in the config"));
    } else {
        checks.push(Check::ok("backend", format!("s3://{}", config.s3_bucket)));
    }
    checks
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_check_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert!(check_dir("apps", dir.path()).passed);

        let file = dir.path().join("file");
        fs::write(&file, "").unwrap();
        assert!(!check_dir("apps", &file).passed);

        let missing = check_dir("apps", &dir.path().join("missing"));
        assert!(!missing.passed);
        assert!(missing.hint.unwrap().starts_with("mkdir -p"));
    }

    #[test]
    fn test_check_layout_reports_each_part() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        fs::create_dir_all(root.join("apps")).unwrap();
        fs::create_dir_all(root.join("presets")).unwrap();
        fs::write(
            root.join("fields.yaml"),
            "fields:\n  cluster: { options: [a] }\n  vm_template: { dynamic: true }\n",
        )
        .unwrap();
        fs::write(root.join("presets/base.yaml"), "cluster: a\n").unwrap();
        let config = Config::from_str(
            "apps_path: apps\ntemplate_path: template\npresets_path: presets\nform_fields: [cluster, vm_template]\n",
            root,
        )
        .unwrap();

        let checks = check_layout(&config);
        let by_name = |n: &str| checks.iter().find(|c| c.name == n).unwrap();
        assert!(by_name("fields").passed);
        assert_eq!(by_name("presets").message, "base");
        assert!(by_name("apps").passed);
        assert!(!by_name("template").passed);
    }

    #[test]
    fn test_missing_provisioner_hints_simulate() {
        let check = check_provisioner("infradeck-no-such-terraform");
        assert!(!check.passed);
        assert!(check.hint.unwrap().contains("--simulate"));
    }
}
