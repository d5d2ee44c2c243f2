//! Executes reducer effects off the UI loop. Every effect finishes by
//! sending its result back as an [`AppEvent`].

use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::mpsc::UnboundedSender;
use tokio::task::JoinHandle;

use infradeck_core::codec;
use infradeck_core::lookup::FetchBridge;
use infradeck_core::pipeline::{self, PipelinePlan, Provisioner};
use infradeck_core::reducer::{AppEvent, Effect};
use infradeck_core::registry::{self, VARIABLES_FILE};

pub struct EffectRunner {
    provisioner: Arc<dyn Provisioner>,
    bridge: FetchBridge,
    events: UnboundedSender<AppEvent>,
    apps_dir: PathBuf,
    description_field: String,
}

impl EffectRunner {
    pub fn new(
        provisioner: Arc<dyn Provisioner>,
        bridge: FetchBridge,
        events: UnboundedSender<AppEvent>,
        apps_dir: PathBuf,
        description_field: String,
    ) -> Self {
        Self {
            provisioner,
            bridge,
            events,
            apps_dir,
            description_field,
        }
    }

    /// Start `effect` and return without waiting. `Quit` is the caller's
    /// business and yields `None`.
    pub fn run(&self, effect: Effect) -> Option<JoinHandle<()>> {
        tracing::debug!(?effect, "running effect");
        let handle = match effect {
            Effect::RefreshListing => self.refresh_listing(),
            Effect::LoadForEdit { deployment, dir } => {
                let events = self.events.clone();
                tokio::task::spawn_blocking(move || {
                    let result = codec::read_variables(&dir.join(VARIABLES_FILE)).map_err(|e| e.to_string());
                    let _ = events.send(AppEvent::EditSourceLoaded {
                        deployment,
                        dir,
                        result,
                    });
                })
            }
            Effect::FetchOptions(request) => self.bridge.request(request),
            Effect::SaveVariables {
                deployment,
                path,
                updates,
            } => {
                let events = self.events.clone();
                tokio::task::spawn_blocking(move || {
                    let result = codec::write_patched(&path, &updates).map_err(|e| e.to_string());
                    match &result {
                        Ok(()) => tracing::info!(%deployment, fields = updates.len(), "variables saved"),
                        Err(e) => tracing::warn!(%deployment, error = %e, "saving variables failed"),
                    }
                    let _ = events.send(AppEvent::Saved {
                        deployment,
                        updates,
                        result,
                    });
                })
            }
            Effect::RunPipeline(plan) => self.run_pipeline(plan),
            Effect::Quit => return None,
        };
        Some(handle)
    }

    fn refresh_listing(&self) -> JoinHandle<()> {
        let events = self.events.clone();
        let apps_dir = self.apps_dir.clone();
        let description_field = self.description_field.clone();
        tokio::task::spawn_blocking(move || {
            let listing = registry::list(&apps_dir, &description_field).map_err(|e| e.to_string());
            let _ = events.send(AppEvent::ListingLoaded(listing));
        })
    }

    fn run_pipeline(&self, plan: PipelinePlan) -> JoinHandle<()> {
        let events = self.events.clone();
        let provisioner = Arc::clone(&self.provisioner);
        tokio::task::spawn_blocking(move || {
            let progress_events = events.clone();
            let outcome = pipeline::execute(&plan, provisioner.as_ref(), &mut |progress| {
                let _ = progress_events.send(AppEvent::PipelineProgress(progress));
            });
            let _ = events.send(AppEvent::PipelineFinished {
                kind: plan.kind,
                deployment: plan.deployment,
                outcome,
            });
        })
    }
}
