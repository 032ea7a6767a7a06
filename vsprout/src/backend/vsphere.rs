//! The vSphere backend: a thin adapter binding the lifecycle controller to
//! the registry.

use super::{BackendContext, BackendRegistration, MachineBackend};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::machine::{LifecycleController, MachineStatus};
use crate::options::MachineOptions;
use async_trait::async_trait;

pub const VSPHERE_BACKEND: &str = "vsphere";

struct VsphereBackend {
    controller: LifecycleController,
}

#[async_trait]
impl MachineBackend for VsphereBackend {
    async fn create(&self) -> ProvisionResult<bool> {
        self.controller.create().await
    }

    async fn start(&self) -> ProvisionResult<bool> {
        self.controller.start().await
    }

    async fn stop(&self) -> ProvisionResult<bool> {
        self.controller.stop().await
    }

    async fn destroy(&self, wipe: bool) -> ProvisionResult<bool> {
        self.controller.destroy(wipe).await
    }

    async fn check(&self) -> ProvisionResult<MachineStatus> {
        self.controller.check().await
    }
}

/// Parse and sanity-check raw machine configuration.
fn validate(config: &serde_json::Value) -> ProvisionResult<MachineOptions> {
    let options: MachineOptions = serde_json::from_value(config.clone())
        .map_err(|e| ProvisionError::Config(format!("invalid machine options: {e}")))?;

    if options.name.is_empty() {
        return Err(ProvisionError::Config(
            "machine name must not be empty".into(),
        ));
    }
    if options.vcpus == 0 {
        return Err(ProvisionError::Config(
            "vcpus must be at least 1".into(),
        ));
    }
    if options.memory_mb == 0 {
        return Err(ProvisionError::Config(
            "memory_mb must be at least 1".into(),
        ));
    }
    if options.disk_mb == 0 {
        return Err(ProvisionError::Config(
            "disk_mb must be at least 1".into(),
        ));
    }
    Ok(options)
}

fn factory(
    options: MachineOptions,
    ctx: BackendContext,
) -> ProvisionResult<Box<dyn MachineBackend>> {
    let controller = LifecycleController::new(
        options,
        ctx.connection,
        ctx.platform,
        ctx.store,
        ctx.probe,
        ctx.images,
        ctx.confirm,
    )?;
    Ok(Box::new(VsphereBackend { controller }))
}

inventory::submit! {
    BackendRegistration {
        kind: VSPHERE_BACKEND,
        validate,
        factory,
    }
}
