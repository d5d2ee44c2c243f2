mod fake;
mod terraform;

pub use fake::{FakeInventory, FakeProvisioner};
pub use terraform::TerraformProvisioner;
