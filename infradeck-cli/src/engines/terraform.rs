use std::path::Path;
use std::process::Command;

use infradeck_core::pipeline::{ProvisionError, Provisioner};

/// Drives the terraform CLI (or a compatible binary such as `tofu`) in the
/// deployment directory
pub struct TerraformProvisioner {
    binary: String,
}

impl TerraformProvisioner {
    pub fn new(binary: impl Into<String>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    fn run(&self, dir: &Path, args: &[&str]) -> Result<String, ProvisionError> {
        let command = format!("{} {}", self.binary, args.join(" "));
        tracing::info!(dir = %dir.display(), %command, "running provisioner");

        let output = Command::new(&self.binary)
            .args(args)
            .current_dir(dir)
            .env("TF_IN_AUTOMATION", "1")
            .output()
            .map_err(|source| ProvisionError::Spawn {
                tool: self.binary.clone(),
                source,
            })?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));

        if output.status.success() {
            Ok(combined)
        } else {
            tracing::warn!(%command, code = ?output.status.code(), "provisioner failed");
            Err(ProvisionError::Failed {
                command,
                output: combined.trim_end().to_string(),
            })
        }
    }
}

impl Provisioner for TerraformProvisioner {
    fn name(&self) -> &str {
        &self.binary
    }

    fn init(&self, dir: &Path) -> Result<String, ProvisionError> {
        self.run(dir, &["init", "-input=false"])
    }

    fn apply(&self, dir: &Path) -> Result<String, ProvisionError> {
        self.run(dir, &["apply", "-auto-approve", "-input=false"])
    }
}
