//! Deployment pipeline
//!
//! A create or apply request is turned into an explicit list of steps
//! ([`PipelinePlan`]) and executed in order by [`execute`]. Execution stops
//! at the first failing step and never rolls back: whatever reached disk
//! stays there, and the outcome reports the last lifecycle state that was
//! successfully recorded.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use thiserror::Error;
use walkdir::WalkDir;

use crate::codec::{self, CodecError};
use crate::model::LifecycleState;
use crate::registry::VARIABLES_FILE;
use crate::state::{self, LastAction, StateError, StateRecord};

pub const BACKEND_FILE: &str = "s3.tf";
pub const DEFAULT_REGION: &str = "ap-southeast-2";

#[derive(Debug, Error)]
pub enum ProvisionError {
    #[error("failed to run {tool}: {source}")]
    Spawn {
        tool: String,
        #[source]
        source: std::io::Error,
    },
    #[error("{command} failed:\n{output}")]
    Failed { command: String, output: String },
}

/// External infrastructure tool driven by the pipeline. Calls block until
/// the tool exits; callers run them off the UI loop.
pub trait Provisioner: Send + Sync {
    fn name(&self) -> &str;

    /// Returns the combined tool output on success
    fn init(&self, dir: &Path) -> Result<String, ProvisionError>;

    fn apply(&self, dir: &Path) -> Result<String, ProvisionError>;
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("deployment '{0}' already exists")]
    AlreadyExists(String),
    #[error("invalid deployment name: {0}")]
    InvalidIdentity(String),
    #[error("failed to copy template {path}: {reason}")]
    Scaffold { path: String, reason: String },
    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error(transparent)]
    Variables(#[from] CodecError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error(transparent)]
    Provision(#[from] ProvisionError),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PlanKind {
    Create,
    Apply,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Step {
    EnsureAbsent,
    Scaffold { template: PathBuf },
    WriteVariables { updates: BTreeMap<String, String> },
    WriteBackend { contents: String },
    Mark { state: LifecycleState, action: LastAction },
    Init,
    Apply,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Step::EnsureAbsent => f.write_str("check target"),
            Step::Scaffold { .. } => f.write_str("copy template"),
            Step::WriteVariables { .. } => write!(f, "write {}", VARIABLES_FILE),
            Step::WriteBackend { .. } => write!(f, "write {}", BACKEND_FILE),
            Step::Mark { state, .. } => write!(f, "record {}", state),
            Step::Init => f.write_str("init"),
            Step::Apply => f.write_str("apply"),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelinePlan {
    pub kind: PlanKind,
    pub deployment: String,
    pub dir: PathBuf,
    pub steps: Vec<Step>,
}

fn provision_steps() -> Vec<Step> {
    vec![
        Step::Init,
        Step::Mark {
            state: LifecycleState::Initialized,
            action: LastAction::Init,
        },
        Step::Apply,
        Step::Mark {
            state: LifecycleState::Deployed,
            action: LastAction::Apply,
        },
    ]
}

impl PipelinePlan {
    /// Scaffold a new deployment at `dir`, then init and apply it.
    pub fn create(
        deployment: String,
        dir: PathBuf,
        template: PathBuf,
        updates: BTreeMap<String, String>,
        backend: String,
    ) -> Self {
        let mut steps = vec![
            Step::EnsureAbsent,
            Step::Scaffold { template },
            Step::WriteVariables { updates },
            Step::WriteBackend { contents: backend },
            Step::Mark {
                state: LifecycleState::Ready,
                action: LastAction::Save,
            },
        ];
        steps.extend(provision_steps());
        Self {
            kind: PlanKind::Create,
            deployment,
            dir,
            steps,
        }
    }

    /// Init and apply an existing deployment.
    pub fn apply(deployment: String, dir: PathBuf) -> Self {
        Self {
            kind: PlanKind::Apply,
            deployment,
            dir,
            steps: provision_steps(),
        }
    }
}

/// Emitted before each step runs
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PipelineProgress {
    pub deployment: String,
    pub index: usize,
    pub total: usize,
    pub step: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PipelineOutcome {
    Completed {
        reached: LifecycleState,
    },
    Failed {
        step: String,
        reason: String,
        reached: LifecycleState,
    },
}

impl PipelineOutcome {
    pub fn reached(&self) -> LifecycleState {
        match self {
            PipelineOutcome::Completed { reached } | PipelineOutcome::Failed { reached, .. } => {
                *reached
            }
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, PipelineOutcome::Completed { .. })
    }
}

/// Run every step of `plan` in order, stopping at the first failure.
pub fn execute(
    plan: &PipelinePlan,
    provisioner: &dyn Provisioner,
    progress: &mut dyn FnMut(PipelineProgress),
) -> PipelineOutcome {
    let mut reached = match plan.kind {
        PlanKind::Create => LifecycleState::Unknown,
        PlanKind::Apply => StateRecord::load(&plan.dir)
            .map(|r| r.state)
            .unwrap_or_default(),
    };
    let total = plan.steps.len();

    tracing::info!(deployment = %plan.deployment, kind = ?plan.kind, tool = provisioner.name(), "pipeline started");

    for (index, step) in plan.steps.iter().enumerate() {
        progress(PipelineProgress {
            deployment: plan.deployment.clone(),
            index,
            total,
            step: step.to_string(),
        });

        match run_step(step, &plan.dir, provisioner) {
            Ok(Some(recorded)) => reached = recorded,
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(deployment = %plan.deployment, step = %step, error = %e, "pipeline stopped");
                return PipelineOutcome::Failed {
                    step: step.to_string(),
                    reason: e.to_string(),
                    reached,
                };
            }
        }
    }

    tracing::info!(deployment = %plan.deployment, state = %reached, "pipeline completed");
    PipelineOutcome::Completed { reached }
}

fn run_step(
    step: &Step,
    dir: &Path,
    provisioner: &dyn Provisioner,
) -> Result<Option<LifecycleState>, PipelineError> {
    match step {
        Step::EnsureAbsent => {
            if dir.exists() {
                let name = dir
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_else(|| dir.display().to_string());
                return Err(PipelineError::AlreadyExists(name));
            }
        }
        Step::Scaffold { template } => copy_tree(template, dir)?,
        Step::WriteVariables { updates } => {
            codec::write_patched(&dir.join(VARIABLES_FILE), updates)?;
        }
        Step::WriteBackend { contents } => {
            let path = dir.join(BACKEND_FILE);
            std::fs::write(&path, contents).map_err(|source| PipelineError::Write {
                path: path.display().to_string(),
                source,
            })?;
        }
        Step::Mark { state, action } => {
            let record = state::mark(dir, *state, *action)?;
            return Ok(Some(record.state));
        }
        Step::Init => {
            let output = provisioner.init(dir)?;
            tracing::debug!(dir = %dir.display(), bytes = output.len(), "init finished");
        }
        Step::Apply => {
            let output = provisioner.apply(dir)?;
            tracing::debug!(dir = %dir.display(), bytes = output.len(), "apply finished");
        }
    }
    Ok(None)
}

/// Recursively copy `src` into `dst`, creating `dst`.
pub fn copy_tree(src: &Path, dst: &Path) -> Result<(), PipelineError> {
    let scaffold_err = |reason: String| PipelineError::Scaffold {
        path: src.display().to_string(),
        reason,
    };

    if !src.is_dir() {
        return Err(scaffold_err("not a directory".to_string()));
    }

    for entry in WalkDir::new(src).follow_links(true) {
        let entry = entry.map_err(|e| scaffold_err(e.to_string()))?;
        let relative = entry
            .path()
            .strip_prefix(src)
            .map_err(|e| scaffold_err(e.to_string()))?;
        let target = dst.join(relative);

        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&target).map_err(|e| scaffold_err(e.to_string()))?;
        } else {
            // fs::copy carries permission bits over
            std::fs::copy(entry.path(), &target).map_err(|e| scaffold_err(e.to_string()))?;
        }
    }
    Ok(())
}

/// Remote state backend settings for new deployments
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BackendSettings {
    pub bucket: String,
    pub region: Option<String>,
    pub profile: Option<String>,
}

/// Render the `s3.tf` backend block for `deployment`
pub fn backend_config(settings: &BackendSettings, deployment: &str) -> String {
    let region = settings
        .region
        .as_deref()
        .filter(|r| !r.is_empty())
        .unwrap_or(DEFAULT_REGION);
    let profile = settings
        .profile
        .as_deref()
        .filter(|p| !p.is_empty())
        .map(|p| format!("\n    profile         = \"{}\"", p))
        .unwrap_or_default();

    format!(
        r#"terraform {{
  backend "s3" {{
    bucket          = "{bucket}"
    key             = "{deployment}/s3/terraform.tfstate"
    use_lockfile    = true
    region          = "{region}"
    encrypt         = true{profile}
  }}
}}
"#,
        bucket = settings.bucket,
        deployment = deployment,
        region = region,
        profile = profile,
    )
}

/// Directory name for a deployment: `{provider}_{app}_{zone}_{platform_id}`
pub fn deployment_identity(
    provider: &str,
    app: &str,
    zone: &str,
    platform_id: &str,
) -> Result<String, PipelineError> {
    let parts = [
        ("provider", provider),
        ("vm_app", app),
        ("zone", zone),
        ("platform_id", platform_id),
    ];
    for (name, value) in parts {
        let value = value.trim();
        if value.is_empty() {
            return Err(PipelineError::InvalidIdentity(format!("{} is empty", name)));
        }
        if value.contains(['/', '\\']) || value == "." || value == ".." {
            return Err(PipelineError::InvalidIdentity(format!(
                "{} '{}' is not a valid path component",
                name, value
            )));
        }
    }
    Ok(format!(
        "{}_{}_{}_{}",
        provider.trim(),
        app.trim(),
        zone.trim(),
        platform_id.trim()
    ))
}
