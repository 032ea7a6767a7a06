//! Provisioning orchestration.
//!
//! ## Architecture
//!
//! Creation is a linear seven-phase workflow executed by [`Provisioner`]:
//!
//! ```text
//! 1. Resolve ──→ 2. Import ──→ 3. LeaseReady ──→ 4. Transfer
//!                                                      │
//!       7. Reachability ←── 6. PowerOn+Address ←── 5. Bootstrap
//! ```
//!
//! Phases 1–5 run inside `create()`'s MISSING branch; phases 6–7 are the
//! body of `start()`, which the lifecycle controller invokes once the
//! machine exists. Each phase either completes or the whole creation fails;
//! cleanup on failure is per phase (transfer failure aborts the lease,
//! bootstrap failure destroys the machine, everything else leaves remote
//! state untouched).

mod upload;

use crate::descriptor;
use crate::errors::{ProvisionError, ProvisionResult};
use crate::options::MachineOptions;
use crate::platform::types::{ExtraConfigEntry, LeaseState, TaskState};
use crate::platform::{
    ClusterRef, DatacenterRef, DatastoreRef, FolderRef, MachineRef, Platform, ResourcePoolRef,
};
use crate::util::poll::poll_until;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

const LEASE_POLL_INTERVAL: Duration = Duration::from_millis(100);
const TASK_POLL_INTERVAL: Duration = Duration::from_millis(500);
const ADDRESS_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Guest extra-config keys applied during bootstrap.
const KEY_HOST_PRIVATE: &str = "guestinfo.hostPrivateKey";
const KEY_HOST_PUBLIC: &str = "guestinfo.hostPublicKey";
const KEY_CLIENT_PUBLIC: &str = "guestinfo.clientPublicKey";

/// Inventory handles resolved in phase 1.
#[derive(Clone, Debug)]
pub struct Placement {
    pub datacenter: DatacenterRef,
    pub datastore: DatastoreRef,
    pub cluster: ClusterRef,
    pub resource_pool: ResourcePoolRef,
    pub vm_folder: FolderRef,
}

/// Key material injected into the guest in phase 5. Generated and stored by
/// an external collaborator; this crate only forwards it.
#[derive(Clone, Debug)]
pub struct BootstrapKeys {
    pub host_private_key: String,
    pub host_public_key: String,
    pub client_public_key: String,
}

/// Executes the remote creation workflow for a single machine.
///
/// One invocation of `create` owns one `Provisioner`; nothing here is shared
/// across machines.
pub struct Provisioner {
    platform: Arc<dyn Platform>,
    http: reqwest::Client,
    options: MachineOptions,
}

impl Provisioner {
    pub fn new(
        platform: Arc<dyn Platform>,
        options: MachineOptions,
        allow_insecure_tls: bool,
    ) -> ProvisionResult<Self> {
        let http = reqwest::Client::builder()
            .danger_accept_invalid_certs(allow_insecure_tls)
            .build()
            .map_err(|e| ProvisionError::Internal(format!("http client: {e}")))?;
        Ok(Self {
            platform,
            http,
            options,
        })
    }

    /// Phase 1: resolve datacenter, datastore, cluster, resource pool, and
    /// VM folder. Fails before any remote state has been mutated.
    pub async fn resolve_placement(&self) -> ProvisionResult<Placement> {
        let opts = &self.options;

        let datacenter = self
            .platform
            .find_datacenter(opts.datacenter.as_deref())
            .await?
            .ok_or_else(|| unresolved("datacenter", opts.datacenter.as_deref()))?;
        let datastore = self
            .platform
            .find_datastore(&datacenter, opts.datastore.as_deref())
            .await?
            .ok_or_else(|| unresolved("datastore", opts.datastore.as_deref()))?;
        let cluster = self
            .platform
            .find_cluster(&datacenter, opts.cluster.as_deref())
            .await?
            .ok_or_else(|| unresolved("cluster", opts.cluster.as_deref()))?;
        let resource_pool = self.platform.resource_pool(&cluster).await?;
        let vm_folder = self.platform.vm_folder(&datacenter).await?;

        tracing::info!(
            datacenter = datacenter.id(),
            datastore = datastore.id(),
            cluster = cluster.id(),
            "resolved placement"
        );
        Ok(Placement {
            datacenter,
            datastore,
            cluster,
            resource_pool,
            vm_folder,
        })
    }

    /// Phases 2–5: import the descriptor, transfer the disk over the lease,
    /// and apply the guest bootstrap configuration. Returns the materialized
    /// machine, powered off.
    pub async fn import_and_configure(
        &self,
        placement: &Placement,
        image: &Path,
        keys: &BootstrapKeys,
    ) -> ProvisionResult<MachineRef> {
        let opts = &self.options;

        // Phase 2: build and submit the import spec, then request a lease.
        let document = descriptor::import_descriptor(opts);
        let spec = self
            .platform
            .create_import_spec(&document, &placement.resource_pool, &placement.datastore, &opts.name)
            .await?;
        let lease = self
            .platform
            .begin_import(&placement.resource_pool, &spec, &placement.vm_folder)
            .await?;
        tracing::info!(lease = lease.id(), "import started");

        // Phase 3: wait for the lease to leave its initializing state. The
        // lease is not aborted when this fails; the platform expires unready
        // leases on its own.
        let state = poll_until(
            "lease readiness",
            LEASE_POLL_INTERVAL,
            opts.timeouts.lease_ready(),
            || async {
                match self.platform.lease_state(&lease).await? {
                    LeaseState::Initializing => Ok(None),
                    terminal => Ok(Some(terminal)),
                }
            },
        )
        .await?;
        match state {
            LeaseState::Ready => {}
            other => {
                return Err(ProvisionError::Lease(format!(
                    "lease reached {other:?} before becoming ready"
                )));
            }
        }

        // Phase 4: stream the disk, mark the lease complete, and wait for
        // the platform to acknowledge.
        upload::upload_disk(self.platform.as_ref(), &self.http, &lease, image).await?;
        self.platform.lease_complete(&lease).await?;
        let state = poll_until(
            "lease completion",
            LEASE_POLL_INTERVAL,
            opts.timeouts.lease_done(),
            || async {
                match self.platform.lease_state(&lease).await? {
                    LeaseState::Done => Ok(Some(LeaseState::Done)),
                    LeaseState::Error(message) => Ok(Some(LeaseState::Error(message))),
                    _ => Ok(None),
                }
            },
        )
        .await?;
        if let LeaseState::Error(message) = state {
            return Err(ProvisionError::Lease(format!(
                "lease failed after transfer: {message}"
            )));
        }

        // Phase 5: guest bootstrap configuration.
        let machine = self
            .platform
            .find_machine(&opts.name)
            .await?
            .ok_or_else(|| {
                ProvisionError::Internal(format!(
                    "machine '{}' not found in inventory after import",
                    opts.name
                ))
            })?;
        let entries = [
            ExtraConfigEntry::new(KEY_HOST_PRIVATE, &keys.host_private_key),
            ExtraConfigEntry::new(KEY_HOST_PUBLIC, &keys.host_public_key),
            ExtraConfigEntry::new(KEY_CLIENT_PUBLIC, &keys.client_public_key),
        ];
        let task = self
            .platform
            .reconfigure_extra_config(&machine, &entries)
            .await?;
        let state = poll_until(
            "bootstrap reconfiguration",
            TASK_POLL_INTERVAL,
            opts.timeouts.reconfigure(),
            || async {
                let state = self.platform.task_state(&task).await?;
                Ok(if state.is_pending() { None } else { Some(state) })
            },
        )
        .await?;
        if let TaskState::Error(message) = state {
            tracing::warn!(machine = machine.id(), "bootstrap failed, destroying machine");
            if let Err(destroy_err) = self.platform.destroy_machine(&machine).await {
                tracing::warn!(error = %destroy_err, "cleanup destroy failed");
            }
            return Err(ProvisionError::Reconfigure(message));
        }

        tracing::info!(machine = machine.id(), "machine imported and configured");
        Ok(machine)
    }

    /// Phase 6: power the machine on and wait for the guest to report an IP
    /// address. Unbounded unless `timeouts.address_secs` is set.
    pub async fn power_on_and_await_address(
        &self,
        machine: &MachineRef,
    ) -> ProvisionResult<String> {
        self.platform.power_on(machine).await?;
        tracing::info!(machine = machine.id(), "powered on, waiting for address");
        let address = poll_until(
            "guest ip address",
            ADDRESS_POLL_INTERVAL,
            self.options.timeouts.address(),
            || async { self.platform.guest_ip(machine).await },
        )
        .await?;
        tracing::info!(machine = machine.id(), address = %address, "guest reported address");
        Ok(address)
    }
}

fn unresolved(kind: &str, name: Option<&str>) -> ProvisionError {
    match name {
        Some(name) => ProvisionError::Resolution(format!("{kind} '{name}' not found")),
        None => ProvisionError::Resolution(format!("no {kind} available")),
    }
}
