use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use infradeck_core::lookup::{InventoryLookup, LookupError, TemplateFilter};
use infradeck_core::pipeline::{ProvisionError, Provisioner};

/// Offline stand-in for terraform used by `--simulate`. Each call sleeps
/// for a moment so the progress overlay is visible.
pub struct FakeProvisioner {
    step_delay: Duration,
}

impl FakeProvisioner {
    pub fn new() -> Self {
        Self {
            step_delay: Duration::from_millis(700),
        }
    }

    #[allow(dead_code)]
    pub fn with_step_delay(mut self, delay: Duration) -> Self {
        self.step_delay = delay;
        self
    }

    fn simulate(&self, dir: &Path, verb: &str) -> Result<String, ProvisionError> {
        std::thread::sleep(self.step_delay);
        // a deployment can opt into failure to exercise the error path
        if dir.join(format!("simulate-{}-failure", verb)).exists() {
            return Err(ProvisionError::Failed {
                command: format!("simulated {}", verb),
                output: format!("Error: simulated {} failure requested by marker file", verb),
            });
        }
        tracing::info!(dir = %dir.display(), verb, "simulated provisioner step");
        Ok(format!("simulated {} complete", verb))
    }
}

impl Default for FakeProvisioner {
    fn default() -> Self {
        Self::new()
    }
}

impl Provisioner for FakeProvisioner {
    fn name(&self) -> &str {
        "simulated"
    }

    fn init(&self, dir: &Path) -> Result<String, ProvisionError> {
        self.simulate(dir, "init")
    }

    fn apply(&self, dir: &Path) -> Result<String, ProvisionError> {
        self.simulate(dir, "apply")
    }
}

/// Canned template inventory. Clusters whose name contains `offline`
/// fail like an unreachable hypervisor.
pub struct FakeInventory {
    filter: TemplateFilter,
    latency: Duration,
}

impl FakeInventory {
    pub fn new(filter: TemplateFilter) -> Self {
        Self {
            filter,
            latency: Duration::from_millis(400),
        }
    }

    #[allow(dead_code)]
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    fn catalog(cluster: &str) -> Vec<String> {
        vec![
            format!("ubuntu-server-24.04.1-{}", cluster),
            format!("ubuntu-server-24.04.2-{}", cluster),
            format!("ubuntu-server-24.04.3-{}-test", cluster),
            format!("ubuntu-server-22.04.5-{}", cluster),
            format!("debian-12-{}", cluster),
        ]
    }
}

#[async_trait]
impl InventoryLookup for FakeInventory {
    async fn templates_for(&self, cluster: &str) -> Result<Vec<String>, LookupError> {
        tokio::time::sleep(self.latency).await;
        if cluster.contains("offline") {
            return Err(LookupError::Request(format!("cluster {} is unreachable", cluster)));
        }
        Ok(self.filter.apply(Self::catalog(cluster)))
    }
}
