//! Scene controller state
//!
//! Everything the UI shows lives in [`App`]. It is only mutated by
//! [`crate::reducer::reduce`]; rendering reads it.

use std::path::PathBuf;

use crate::catalog::FieldCatalog;
use crate::config::Config;
use crate::form::{Dependency, Form};
use crate::model::DeploymentSummary;
use crate::pipeline::{BackendSettings, PlanKind};
use crate::preset::PresetStore;
use crate::registry::Listing;

/// Static inputs the controller needs, resolved once at startup
#[derive(Clone, Debug)]
pub struct Settings {
    pub catalog: FieldCatalog,
    pub presets: PresetStore,
    pub form_fields: Vec<String>,
    pub preserve_on_preset_switch: Vec<String>,
    pub dependency: Option<Dependency>,
    pub provider: String,
    pub apps_dir: PathBuf,
    pub template_dir: PathBuf,
    pub backend: BackendSettings,
}

impl Settings {
    pub fn from_config(config: &Config, catalog: FieldCatalog, presets: PresetStore) -> Self {
        Self {
            catalog,
            presets,
            form_fields: config.form_fields.clone(),
            preserve_on_preset_switch: config.preserve_on_preset_switch.clone(),
            dependency: Some(config.lookup.dependency()),
            provider: config.provider.clone(),
            apps_dir: config.apps_dir(),
            template_dir: config.template_dir(),
            backend: config.backend(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Severity {
    Info,
    Success,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StatusLine {
    pub text: String,
    pub severity: Severity,
}

impl StatusLine {
    pub fn info(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Info,
        }
    }

    pub fn success(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Success,
        }
    }

    pub fn error(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            severity: Severity::Error,
        }
    }
}

#[derive(Clone, Debug)]
pub struct CreateScene {
    pub form: Form,
}

#[derive(Clone, Debug)]
pub struct EditScene {
    pub form: Form,
    pub deployment: String,
    pub dir: PathBuf,
}

#[derive(Clone, Debug)]
pub enum Scene {
    Launcher,
    CreateForm(CreateScene),
    /// Read-only variables table of the selected deployment
    EditTable { offset: usize },
    EditForm(EditScene),
}

impl Scene {
    pub fn name(&self) -> &'static str {
        match self {
            Scene::Launcher => "launcher",
            Scene::CreateForm(_) => "create",
            Scene::EditTable { .. } => "variables",
            Scene::EditForm(_) => "edit",
        }
    }

    pub fn form(&self) -> Option<&Form> {
        match self {
            Scene::CreateForm(s) => Some(&s.form),
            Scene::EditForm(s) => Some(&s.form),
            _ => None,
        }
    }

    pub fn form_mut(&mut self) -> Option<&mut Form> {
        match self {
            Scene::CreateForm(s) => Some(&mut s.form),
            Scene::EditForm(s) => Some(&mut s.form),
            _ => None,
        }
    }
}

/// Overlay shown while a pipeline runs; all input except quit is dropped
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Busy {
    pub kind: PlanKind,
    pub deployment: String,
    pub step: Option<String>,
    pub index: usize,
    pub total: usize,
}

#[derive(Debug)]
pub struct App {
    pub settings: Settings,
    pub scene: Scene,
    pub listing: Listing,
    pub listing_error: Option<String>,
    pub selected: usize,
    pub preset_index: usize,
    pub busy: Option<Busy>,
    pub status: Option<StatusLine>,
    pub should_quit: bool,
    last_token: u64,
}

impl App {
    pub fn new(settings: Settings) -> Self {
        Self {
            settings,
            scene: Scene::Launcher,
            listing: Listing::default(),
            listing_error: None,
            selected: 0,
            preset_index: 0,
            busy: None,
            status: None,
            should_quit: false,
            last_token: 0,
        }
    }

    pub fn selected_deployment(&self) -> Option<&DeploymentSummary> {
        self.listing.rows.get(self.selected)
    }

    pub fn is_busy(&self) -> bool {
        self.busy.is_some()
    }

    pub fn active_preset_name(&self) -> &str {
        &self.settings.presets.at(self.preset_index).name
    }

    pub fn set_status(&mut self, status: StatusLine) {
        self.status = Some(status);
    }

    /// Fresh, strictly increasing lookup token
    pub(crate) fn next_token(&mut self) -> u64 {
        self.last_token += 1;
        self.last_token
    }

    pub(crate) fn clamp_selection(&mut self) {
        let len = self.listing.rows.len();
        if len == 0 {
            self.selected = 0;
        } else if self.selected >= len {
            self.selected = len - 1;
        }
    }
}
