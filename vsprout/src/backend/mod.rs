//! Backend factory using the inventory pattern for compile-time registration.
//!
//! Backend implementations register themselves at compile time using
//! `inventory::submit!`. No manual registration, HashMap, or singleton
//! pattern needed - just pure inventory.

mod vsphere;

use crate::errors::{ProvisionError, ProvisionResult};
use crate::machine::{ConfirmPrompt, ImageBuilder, ReachabilityProbe, RecordStore};
use crate::options::{ConnectionInfo, MachineOptions};
use crate::platform::Platform;
use async_trait::async_trait;
use std::sync::Arc;

pub use vsphere::VSPHERE_BACKEND;

/// Lifecycle operations every backend exposes, independent of which
/// virtualization platform it drives.
#[async_trait]
pub trait MachineBackend: Send + Sync {
    /// Create the machine if it does not exist and bring it up.
    async fn create(&self) -> ProvisionResult<bool>;

    /// Power on a stopped machine and wait for reachability.
    async fn start(&self) -> ProvisionResult<bool>;

    /// Gracefully stop a running machine.
    async fn stop(&self) -> ProvisionResult<bool>;

    /// Destroy the remote machine object after operator confirmation.
    async fn destroy(&self, wipe: bool) -> ProvisionResult<bool>;

    /// Reconcile the recorded status with platform truth.
    async fn check(&self) -> ProvisionResult<crate::machine::MachineStatus>;
}

impl std::fmt::Debug for dyn MachineBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("MachineBackend")
    }
}

/// External collaborators handed to a backend factory.
#[derive(Clone)]
pub struct BackendContext {
    pub platform: Arc<dyn Platform>,
    pub connection: ConnectionInfo,
    pub store: Arc<dyn RecordStore>,
    pub probe: Arc<dyn ReachabilityProbe>,
    pub images: Arc<dyn ImageBuilder>,
    pub confirm: Arc<dyn ConfirmPrompt>,
}

/// Validates raw machine configuration into typed options.
pub type ValidateFn = fn(&serde_json::Value) -> ProvisionResult<MachineOptions>;

/// Constructs a backend from validated options and collaborators.
pub type BackendFactoryFn = fn(MachineOptions, BackendContext) -> ProvisionResult<Box<dyn MachineBackend>>;

/// Registration entry submitted by backend implementations via inventory.
pub struct BackendRegistration {
    pub kind: &'static str,
    pub validate: ValidateFn,
    pub factory: BackendFactoryFn,
}

// Collect all backend registrations at compile time
inventory::collect!(BackendRegistration);

/// Create a backend instance by looking up the registered factory.
///
/// Validates `config` with the backend's own validator before invoking the
/// factory, so a successfully constructed backend always holds well-formed
/// options.
pub fn create_backend(
    kind: &str,
    config: &serde_json::Value,
    ctx: BackendContext,
) -> ProvisionResult<Box<dyn MachineBackend>> {
    for registration in inventory::iter::<BackendRegistration> {
        if registration.kind == kind {
            tracing::debug!(backend = kind, "Creating backend instance");
            let options = (registration.validate)(config)?;
            return (registration.factory)(options, ctx);
        }
    }

    let available = available_backends();
    Err(ProvisionError::Config(format!(
        "Backend '{kind}' is not registered. Available backends: {available:?}"
    )))
}

/// Check if a backend kind is registered.
pub fn is_registered(kind: &str) -> bool {
    inventory::iter::<BackendRegistration>().any(|r| r.kind == kind)
}

/// Get a list of all registered backend kinds.
pub fn available_backends() -> Vec<&'static str> {
    inventory::iter::<BackendRegistration>()
        .map(|r| r.kind)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vsphere_registered() {
        assert!(is_registered("vsphere"));

        let available = available_backends();
        assert!(!available.is_empty());
        assert!(available.contains(&"vsphere"));
    }

    #[test]
    fn test_unregistered_backend() {
        assert!(!is_registered("cloudstack"));
    }
}
