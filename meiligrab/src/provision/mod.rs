//! End-to-end provisioning: resolve the release, download every target,
//! stamp the manifests.

mod error;
mod orchestrator;

pub use error::{ProvisionError, ProvisionResult};
pub use orchestrator::{ProvisionReport, Provisioner};
