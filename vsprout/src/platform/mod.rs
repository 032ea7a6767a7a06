//! Platform collaborator boundary.
//!
//! [`Platform`] is the seam to the virtualization platform's client: the
//! orchestrator and controller only ever speak to this trait, and a full
//! client implementation is explicitly out of scope for this crate. The
//! session behind an implementation is acquired when the implementation is
//! constructed and released when it is dropped, scoping connection lifetime
//! to the controller that owns it.
//!
//! Inventory handles are opaque typed newtypes over platform object
//! identifiers so a datastore cannot be passed where a cluster is expected.

pub mod types;

use crate::errors::ProvisionResult;
use async_trait::async_trait;
use types::{ExtraConfigEntry, LeaseInfo, LeaseState, PowerState, TaskState};

macro_rules! object_ref {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash)]
        pub struct $name(pub String);

        impl $name {
            pub fn id(&self) -> &str {
                &self.0
            }
        }
    };
}

object_ref!(
    /// A datacenter in the platform inventory.
    DatacenterRef
);
object_ref!(
    /// A datastore within a datacenter.
    DatastoreRef
);
object_ref!(
    /// A compute cluster within a datacenter.
    ClusterRef
);
object_ref!(
    /// The resource pool derived from a cluster.
    ResourcePoolRef
);
object_ref!(
    /// The folder new machines are imported into.
    FolderRef
);
object_ref!(
    /// A virtual machine object.
    MachineRef
);
object_ref!(
    /// An in-progress import transfer session.
    LeaseRef
);
object_ref!(
    /// An asynchronous platform task.
    TaskRef
);

/// Opaque import specification produced from a descriptor.
#[derive(Clone, Debug)]
pub struct ImportSpec(pub String);

/// Remote operations the workflow needs from the platform.
///
/// All lookups taking `Option<&str>` resolve by name when one is configured,
/// or to the first available object otherwise, returning `None` when nothing
/// matches.
#[async_trait]
pub trait Platform: Send + Sync {
    /// Endpoint hostname, used to substitute the device-URL wildcard.
    fn host(&self) -> &str;

    // ------------------------------------------------------------------
    // Inventory resolution
    // ------------------------------------------------------------------

    async fn find_datacenter(&self, name: Option<&str>)
        -> ProvisionResult<Option<DatacenterRef>>;

    async fn find_datastore(
        &self,
        datacenter: &DatacenterRef,
        name: Option<&str>,
    ) -> ProvisionResult<Option<DatastoreRef>>;

    async fn find_cluster(
        &self,
        datacenter: &DatacenterRef,
        name: Option<&str>,
    ) -> ProvisionResult<Option<ClusterRef>>;

    async fn resource_pool(&self, cluster: &ClusterRef) -> ProvisionResult<ResourcePoolRef>;

    async fn vm_folder(&self, datacenter: &DatacenterRef) -> ProvisionResult<FolderRef>;

    // ------------------------------------------------------------------
    // Import and lease transfer
    // ------------------------------------------------------------------

    async fn create_import_spec(
        &self,
        descriptor: &str,
        pool: &ResourcePoolRef,
        datastore: &DatastoreRef,
        name: &str,
    ) -> ProvisionResult<ImportSpec>;

    async fn begin_import(
        &self,
        pool: &ResourcePoolRef,
        spec: &ImportSpec,
        folder: &FolderRef,
    ) -> ProvisionResult<LeaseRef>;

    async fn lease_state(&self, lease: &LeaseRef) -> ProvisionResult<LeaseState>;

    async fn lease_info(&self, lease: &LeaseRef) -> ProvisionResult<LeaseInfo>;

    /// Report upload progress as an integer percentage in 0..=100; callers
    /// guarantee successive reports are strictly increasing.
    async fn lease_progress(&self, lease: &LeaseRef, percent: u8) -> ProvisionResult<()>;

    async fn lease_complete(&self, lease: &LeaseRef) -> ProvisionResult<()>;

    async fn lease_abort(&self, lease: &LeaseRef, reason: &str) -> ProvisionResult<()>;

    // ------------------------------------------------------------------
    // Machine operations
    // ------------------------------------------------------------------

    async fn find_machine(&self, name: &str) -> ProvisionResult<Option<MachineRef>>;

    async fn reconfigure_extra_config(
        &self,
        machine: &MachineRef,
        entries: &[ExtraConfigEntry],
    ) -> ProvisionResult<TaskRef>;

    async fn task_state(&self, task: &TaskRef) -> ProvisionResult<TaskState>;

    async fn power_on(&self, machine: &MachineRef) -> ProvisionResult<()>;

    /// In-guest shutdown request; asynchronous on the platform side.
    async fn shutdown_guest(&self, machine: &MachineRef) -> ProvisionResult<()>;

    async fn power_state(&self, machine: &MachineRef) -> ProvisionResult<PowerState>;

    /// IP address reported by the guest tools, when one exists yet.
    async fn guest_ip(&self, machine: &MachineRef) -> ProvisionResult<Option<String>>;

    async fn destroy_machine(&self, machine: &MachineRef) -> ProvisionResult<()>;
}
