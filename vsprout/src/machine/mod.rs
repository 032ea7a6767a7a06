//! Machine lifecycle management.
//!
//! ## Architecture
//!
//! - `status`: the lifecycle state machine and transition rules
//! - `record`: the persisted machine record and its storage trait
//! - `controller`: guarded operations (`create`/`start`/`stop`/`destroy`/
//!   `check`) layered over the provisioning orchestrator
//!
//! The traits below are the remaining external collaborators: reachability
//! probing, base-image production, and interactive confirmation. All are out
//! of scope to implement here; the controller only drives them.

mod controller;
mod record;
mod status;

pub use controller::LifecycleController;
pub use record::{KeyPair, MachineRecord, RecordStore};
pub use status::MachineStatus;

use crate::errors::ProvisionResult;
use async_trait::async_trait;
use std::path::PathBuf;

/// Verifies that a freshly started machine accepts remote administrative
/// logins.
#[async_trait]
pub trait ReachabilityProbe: Send + Sync {
    /// Block until remote administrative access to `address` succeeds,
    /// verifying the expected host identity when one is supplied.
    async fn wait_reachable(
        &self,
        address: &str,
        host_public_key: Option<&str>,
    ) -> ProvisionResult<()>;

    /// Non-blocking variant used by `check()` to validate a machine that the
    /// platform reports as powered on.
    async fn is_reachable(&self, address: &str) -> bool;
}

/// Produces a local base disk image of the requested capacity.
#[async_trait]
pub trait ImageBuilder: Send + Sync {
    async fn base_image(&self, capacity_mb: u64) -> ProvisionResult<PathBuf>;
}

/// Interactive operator confirmation for destructive operations.
pub trait ConfirmPrompt: Send + Sync {
    fn confirm(&self, prompt: &str) -> bool;
}
