//! Scene controller transitions
//!
//! `reduce` is the only place [`App`] changes. It never touches the
//! filesystem, network or external tools: anything with a side effect is
//! returned as an [`Effect`] for the runner to execute, and its result comes
//! back later as another [`AppEvent`].

use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::app::{App, Busy, CreateScene, EditScene, Scene, StatusLine};
use crate::codec::{self, VariableSet};
use crate::form::{Form, LookupApplied, RefreshNeeded};
use crate::input::Key;
use crate::lookup::LookupRequest;
use crate::model::LifecycleState;
use crate::pipeline::{
    PipelineOutcome, PipelinePlan, PipelineProgress, PlanKind, backend_config, deployment_identity,
};
use crate::registry::{Listing, VARIABLES_FILE};

#[derive(Clone, Debug)]
pub enum AppEvent {
    Key(Key),
    ListingLoaded(Result<Listing, String>),
    EditSourceLoaded {
        deployment: String,
        dir: PathBuf,
        result: Result<VariableSet, String>,
    },
    LookupFinished {
        dependent: String,
        token: u64,
        result: Result<Vec<String>, String>,
    },
    PipelineProgress(PipelineProgress),
    PipelineFinished {
        kind: PlanKind,
        deployment: String,
        outcome: PipelineOutcome,
    },
    /// `updates` are the raw values that were written
    Saved {
        deployment: String,
        updates: BTreeMap<String, String>,
        result: Result<(), String>,
    },
}

/// Side effects requested by a transition
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Effect {
    RefreshListing,
    LoadForEdit { deployment: String, dir: PathBuf },
    FetchOptions(LookupRequest),
    SaveVariables {
        deployment: String,
        path: PathBuf,
        updates: BTreeMap<String, String>,
    },
    RunPipeline(PipelinePlan),
    Quit,
}

pub fn reduce(app: &mut App, event: AppEvent) -> Vec<Effect> {
    match event {
        AppEvent::Key(key) => {
            if app.is_busy() {
                if key.is_quit() {
                    app.should_quit = true;
                    return vec![Effect::Quit];
                }
                tracing::debug!(?key, "input dropped while busy");
                return Vec::new();
            }
            match app.scene {
                Scene::Launcher => launcher_key(app, key),
                Scene::CreateForm(_) => create_key(app, key),
                Scene::EditTable { .. } => table_key(app, key),
                Scene::EditForm(_) => edit_key(app, key),
            }
        }
        AppEvent::ListingLoaded(Ok(listing)) => {
            app.listing = listing;
            app.listing_error = None;
            app.clamp_selection();
            Vec::new()
        }
        AppEvent::ListingLoaded(Err(reason)) => {
            app.set_status(StatusLine::error(format!("Could not list deployments: {}", reason)));
            app.listing_error = Some(reason);
            Vec::new()
        }
        AppEvent::EditSourceLoaded {
            deployment,
            dir,
            result,
        } => open_edit_form(app, deployment, dir, result),
        AppEvent::LookupFinished {
            dependent,
            token,
            result,
        } => {
            lookup_finished(app, &dependent, token, result);
            Vec::new()
        }
        AppEvent::PipelineProgress(progress) => {
            if let Some(busy) = app.busy.as_mut() {
                busy.step = Some(progress.step.clone());
                busy.index = progress.index;
                busy.total = progress.total;
            }
            app.set_status(StatusLine::info(format!(
                "[{}/{}] {}: {}",
                progress.index + 1,
                progress.total,
                progress.deployment,
                progress.step
            )));
            Vec::new()
        }
        AppEvent::PipelineFinished {
            kind,
            deployment,
            outcome,
        } => pipeline_finished(app, kind, &deployment, outcome),
        AppEvent::Saved {
            deployment,
            updates,
            result,
        } => {
            match result {
                Ok(()) => {
                    match &mut app.scene {
                        Scene::EditForm(scene) if scene.deployment == deployment => {
                            scene.form.commit_keys(&updates);
                        }
                        _ => tracing::debug!(%deployment, "save finished after its form closed"),
                    }
                    app.set_status(StatusLine::success(format!(
                        "Saved '{}'. Press Ctrl+A to apply.",
                        deployment
                    )));
                }
                Err(reason) => app.set_status(StatusLine::error(format!("Save failed: {}", reason))),
            }
            vec![Effect::RefreshListing]
        }
    }
}

fn launcher_key(app: &mut App, key: Key) -> Vec<Effect> {
    match key {
        Key::Up | Key::Char('k') => {
            app.selected = app.selected.saturating_sub(1);
            Vec::new()
        }
        Key::Down | Key::Char('j') => {
            if app.selected + 1 < app.listing.rows.len() {
                app.selected += 1;
            }
            Vec::new()
        }
        Key::Char('n') => open_create_form(app),
        Key::Enter | Key::Char('e') => request_edit(app),
        Key::Char('v') => {
            if app.selected_deployment().is_some() {
                app.scene = Scene::EditTable { offset: 0 };
            }
            Vec::new()
        }
        Key::Char('a') => match app.selected_deployment() {
            Some(row) => {
                let plan = PipelinePlan::apply(row.name.clone(), row.path.clone());
                start_pipeline(app, plan)
            }
            None => Vec::new(),
        },
        Key::Char('r') | Key::Char('R') => {
            app.set_status(StatusLine::info("Refreshing deployments..."));
            vec![Effect::RefreshListing]
        }
        Key::Char('q') | Key::Esc | Key::Ctrl('c') => {
            app.should_quit = true;
            vec![Effect::Quit]
        }
        _ => Vec::new(),
    }
}

fn table_key(app: &mut App, key: Key) -> Vec<Effect> {
    let rows = app.selected_deployment().map_or(0, |d| d.variables.len());
    let Scene::EditTable { offset } = &mut app.scene else {
        return Vec::new();
    };
    match key {
        Key::Up | Key::Char('k') => {
            *offset = offset.saturating_sub(1);
            Vec::new()
        }
        Key::Down | Key::Char('j') => {
            if *offset + 1 < rows {
                *offset += 1;
            }
            Vec::new()
        }
        Key::Enter | Key::Char('e') => request_edit(app),
        Key::Esc | Key::Char('q') | Key::Char('v') => {
            app.scene = Scene::Launcher;
            Vec::new()
        }
        _ => Vec::new(),
    }
}

fn request_edit(app: &mut App) -> Vec<Effect> {
    match app.selected_deployment() {
        Some(row) => {
            let effect = Effect::LoadForEdit {
                deployment: row.name.clone(),
                dir: row.path.clone(),
            };
            vec![effect]
        }
        None => {
            app.set_status(StatusLine::info("No deployment selected"));
            Vec::new()
        }
    }
}

/// Opening a form also fetches the dependent field's options for the
/// trigger value it starts with.
fn open_create_form(app: &mut App) -> Vec<Effect> {
    let settings = &app.settings;
    let descriptors = settings.catalog.select(&settings.form_fields);
    let preset = settings.presets.at(app.preset_index);

    let name = preset.name.clone();

    match Form::from_preset(descriptors, preset) {
        Ok(form) => {
            let form = form.with_dependency(settings.dependency.clone());
            tracing::info!(preset = %name, "create form opened");
            app.scene = Scene::CreateForm(CreateScene { form });
            app.set_status(StatusLine::info(format!("Preset: {}", name)));
            initial_lookup(app)
        }
        Err(e) => {
            app.set_status(StatusLine::error(e.to_string()));
            Vec::new()
        }
    }
}

fn initial_lookup(app: &mut App) -> Vec<Effect> {
    match app.scene.form_mut().and_then(Form::refresh_dependent) {
        Some(refresh) => request_options(app, refresh),
        None => Vec::new(),
    }
}

fn open_edit_form(
    app: &mut App,
    deployment: String,
    dir: PathBuf,
    result: Result<VariableSet, String>,
) -> Vec<Effect> {
    if app.is_busy() || !matches!(app.scene, Scene::Launcher | Scene::EditTable { .. }) {
        tracing::debug!(%deployment, "edit source arrived after leaving launcher");
        return Vec::new();
    }
    let variables = match result {
        Ok(variables) => variables,
        Err(reason) => {
            app.set_status(StatusLine::error(format!("Could not load variables: {}", reason)));
            return Vec::new();
        }
    };

    let settings = &app.settings;
    let fields = settings
        .catalog
        .select(&settings.form_fields)
        .into_iter()
        .filter(|d| !d.read_only)
        .map(|d| {
            let text = variables
                .get(&d.key)
                .map(|raw| codec::to_form_text(d.kind, raw))
                .unwrap_or_default();
            (d, text)
        });

    match Form::new(fields) {
        Ok(form) => {
            let form = form.with_dependency(settings.dependency.clone());
            app.scene = Scene::EditForm(EditScene {
                form,
                deployment: deployment.clone(),
                dir,
            });
            app.set_status(StatusLine::info(format!("Editing '{}'", deployment)));
            initial_lookup(app)
        }
        Err(e) => {
            app.set_status(StatusLine::error(e.to_string()));
            Vec::new()
        }
    }
}

/// Shared editing keys for both forms. Returns `None` when the key is not
/// an editing key.
fn form_key(form: &mut Form, key: Key) -> Option<Option<RefreshNeeded>> {
    let choice = form.focused().is_choice();
    let refresh = match key {
        Key::Tab | Key::Down => {
            form.focus_next();
            None
        }
        Key::BackTab | Key::Up => {
            form.focus_prev();
            None
        }
        Key::Left if choice => form.cycle(-1),
        Key::Right | Key::Char(' ') if choice => form.cycle(1),
        Key::Left => {
            form.cursor_left();
            None
        }
        Key::Right => {
            form.cursor_right();
            None
        }
        Key::Home => {
            form.cursor_home();
            None
        }
        Key::End => {
            form.cursor_end();
            None
        }
        Key::Backspace => {
            form.backspace();
            None
        }
        Key::Delete => {
            form.delete();
            None
        }
        Key::Char(c) => {
            form.insert_char(c);
            None
        }
        _ => return None,
    };
    Some(refresh)
}

/// Turn a refresh request from the form into a tokened fetch effect
fn request_options(app: &mut App, refresh: RefreshNeeded) -> Vec<Effect> {
    let token = app.next_token();
    if let Some(form) = app.scene.form_mut() {
        form.expect_lookup(token);
    }
    app.set_status(StatusLine::info(format!(
        "Fetching {} options for {}...",
        app.settings.catalog.label(&refresh.dependent),
        refresh.trigger_value
    )));
    vec![Effect::FetchOptions(LookupRequest {
        dependent: refresh.dependent,
        trigger_value: refresh.trigger_value,
        token,
    })]
}

fn create_key(app: &mut App, key: Key) -> Vec<Effect> {
    match key {
        Key::Esc | Key::Ctrl('c') => {
            app.scene = Scene::Launcher;
            app.set_status(StatusLine::info("Create cancelled"));
            return Vec::new();
        }
        Key::F(2) | Key::F(3) => {
            let delta = if key == Key::F(2) { -1 } else { 1 };
            return switch_preset(app, delta);
        }
        Key::Enter => return submit_create(app),
        _ => {}
    }

    let Scene::CreateForm(scene) = &mut app.scene else {
        return Vec::new();
    };
    match form_key(&mut scene.form, key) {
        Some(Some(refresh)) => request_options(app, refresh),
        _ => Vec::new(),
    }
}

fn switch_preset(app: &mut App, delta: i32) -> Vec<Effect> {
    app.preset_index = app.settings.presets.next_index(app.preset_index, delta);
    let preset = app.settings.presets.at(app.preset_index);
    let name = preset.name.clone();
    let mut refresh = None;
    if let Scene::CreateForm(scene) = &mut app.scene {
        let form = &mut scene.form;
        let trigger_value = |form: &Form| {
            form.dependency()
                .and_then(|d| form.value(&d.trigger))
                .map(str::to_string)
        };
        let before = trigger_value(form);
        form.apply_preset(preset, &app.settings.preserve_on_preset_switch);
        if trigger_value(form) != before {
            refresh = form.refresh_dependent();
        }
    }
    app.set_status(StatusLine::info(format!("Preset: {}", name)));
    match refresh {
        Some(refresh) => request_options(app, refresh),
        None => Vec::new(),
    }
}

fn submit_create(app: &mut App) -> Vec<Effect> {
    let Scene::CreateForm(scene) = &app.scene else {
        return Vec::new();
    };
    let form = &scene.form;

    let updates = match form.submit() {
        Ok(updates) => updates,
        Err(e) => {
            app.set_status(StatusLine::error(e.to_string()));
            return Vec::new();
        }
    };

    let settings = &app.settings;
    let identity = deployment_identity(
        &settings.provider,
        form.value("vm_app").unwrap_or_default(),
        form.value("zone").unwrap_or_default(),
        form.value("platform_id").unwrap_or_default(),
    );
    let deployment = match identity {
        Ok(name) => name,
        Err(e) => {
            app.set_status(StatusLine::error(e.to_string()));
            return Vec::new();
        }
    };

    let plan = PipelinePlan::create(
        deployment.clone(),
        settings.apps_dir.join(&deployment),
        settings.template_dir.clone(),
        updates,
        backend_config(&settings.backend, &deployment),
    );
    start_pipeline(app, plan)
}

fn edit_key(app: &mut App, key: Key) -> Vec<Effect> {
    match key {
        Key::Esc | Key::Ctrl('c') => {
            app.scene = Scene::Launcher;
            app.set_status(StatusLine::info("Edit cancelled"));
            return Vec::new();
        }
        Key::Enter => return save_edit(app),
        Key::Ctrl('a') => return apply_edit(app),
        _ => {}
    }

    let Scene::EditForm(scene) = &mut app.scene else {
        return Vec::new();
    };
    match form_key(&mut scene.form, key) {
        Some(Some(refresh)) => request_options(app, refresh),
        _ => Vec::new(),
    }
}

fn save_edit(app: &mut App) -> Vec<Effect> {
    let Scene::EditForm(scene) = &app.scene else {
        return Vec::new();
    };
    match scene.form.changed() {
        Ok(updates) if updates.is_empty() => {
            app.set_status(StatusLine::info("No changes to save"));
            Vec::new()
        }
        Ok(updates) => {
            let effect = Effect::SaveVariables {
                deployment: scene.deployment.clone(),
                path: scene.dir.join(VARIABLES_FILE),
                updates,
            };
            app.set_status(StatusLine::info("Saving..."));
            vec![effect]
        }
        Err(e) => {
            app.set_status(StatusLine::error(e.to_string()));
            Vec::new()
        }
    }
}

fn apply_edit(app: &mut App) -> Vec<Effect> {
    let Scene::EditForm(scene) = &app.scene else {
        return Vec::new();
    };
    let plan = PipelinePlan::apply(scene.deployment.clone(), scene.dir.clone());
    let unsaved = scene.form.is_dirty();
    let effects = start_pipeline(app, plan);
    if unsaved {
        app.set_status(StatusLine::info(
            "Applying saved variables; unsaved edits are not included",
        ));
    }
    effects
}

fn start_pipeline(app: &mut App, plan: PipelinePlan) -> Vec<Effect> {
    tracing::info!(deployment = %plan.deployment, kind = ?plan.kind, "pipeline requested");
    app.busy = Some(Busy {
        kind: plan.kind,
        deployment: plan.deployment.clone(),
        step: None,
        index: 0,
        total: plan.steps.len(),
    });
    app.set_status(StatusLine::info(format!("Working on '{}'...", plan.deployment)));
    vec![Effect::RunPipeline(plan)]
}

fn pipeline_finished(
    app: &mut App,
    kind: PlanKind,
    deployment: &str,
    outcome: PipelineOutcome,
) -> Vec<Effect> {
    app.busy = None;
    match outcome {
        PipelineOutcome::Completed { .. } => {
            let message = match kind {
                PlanKind::Create => {
                    app.scene = Scene::Launcher;
                    format!("Deployment '{}' deployed and ready!", deployment)
                }
                PlanKind::Apply => format!("Deployment '{}' applied and ready!", deployment),
            };
            app.set_status(StatusLine::success(message));
        }
        PipelineOutcome::Failed {
            step,
            reason,
            reached,
        } => {
            let mut message = format!("{} failed for '{}': {}", step, deployment, reason);
            if kind == PlanKind::Create && reached != LifecycleState::Unknown {
                message.push_str(&format!(" (partial deployment left on disk at {})", reached));
            } else {
                message.push_str(&format!(" (state: {})", reached));
            }
            app.set_status(StatusLine::error(message));
        }
    }
    vec![Effect::RefreshListing]
}

fn lookup_finished(app: &mut App, dependent: &str, token: u64, result: Result<Vec<String>, String>) {
    let label = app.settings.catalog.label(dependent).to_string();
    let Some(form) = app.scene.form_mut() else {
        tracing::debug!(token, "lookup result arrived with no open form");
        return;
    };

    match form.apply_lookup(dependent, token, result) {
        LookupApplied::Updated(0) => {
            app.set_status(StatusLine::error(format!("No {} options found", label)));
        }
        LookupApplied::Updated(count) => {
            app.set_status(StatusLine::info(format!("Loaded {} {} options", count, label)));
        }
        LookupApplied::Cleared(reason) => {
            app.set_status(StatusLine::error(format!(
                "Could not fetch {} options: {}",
                label, reason
            )));
        }
        LookupApplied::Stale => {
            tracing::debug!(token, "stale lookup result discarded");
        }
    }
}
