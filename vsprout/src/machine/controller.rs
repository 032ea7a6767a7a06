//! Guarded lifecycle operations for one machine.
//!
//! The controller layers the state machine over the provisioning
//! orchestrator: operations invoked from an invalid source state log a
//! warning and return `Ok(false)` without touching the platform; only the
//! MISSING state delegates to the full creation workflow.

use super::record::{MachineRecord, RecordStore};
use super::status::MachineStatus;
use super::{ConfirmPrompt, ImageBuilder, ReachabilityProbe};
use crate::errors::{ProvisionError, ProvisionResult};
use crate::options::{ConnectionInfo, MachineOptions};
use crate::platform::types::PowerState;
use crate::platform::Platform;
use crate::provision::{BootstrapKeys, Provisioner};
use crate::util::poll::poll_until;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;

const POWER_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Drives one machine through its lifecycle.
///
/// Holds the durable record behind a lock and persists it on every state
/// change. At most one operation may be in flight per machine; callers
/// serialize concurrent invocations.
pub struct LifecycleController {
    options: MachineOptions,
    platform: Arc<dyn Platform>,
    store: Arc<dyn RecordStore>,
    probe: Arc<dyn ReachabilityProbe>,
    images: Arc<dyn ImageBuilder>,
    confirm: Arc<dyn ConfirmPrompt>,
    record: RwLock<MachineRecord>,
}

impl LifecycleController {
    /// Load the machine's record from the store, or initialize a fresh one
    /// with the given connection parameters.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        options: MachineOptions,
        connection: ConnectionInfo,
        platform: Arc<dyn Platform>,
        store: Arc<dyn RecordStore>,
        probe: Arc<dyn ReachabilityProbe>,
        images: Arc<dyn ImageBuilder>,
        confirm: Arc<dyn ConfirmPrompt>,
    ) -> ProvisionResult<Self> {
        let record = store
            .load(&options.name)?
            .unwrap_or_else(|| MachineRecord::new(&options.name, connection));
        Ok(Self {
            options,
            platform,
            store,
            probe,
            images,
            confirm,
            record: RwLock::new(record),
        })
    }

    pub fn name(&self) -> &str {
        &self.options.name
    }

    /// Currently recorded lifecycle status.
    pub fn status(&self) -> MachineStatus {
        self.record.read().status
    }

    /// Snapshot of the durable record.
    pub fn record(&self) -> MachineRecord {
        self.record.read().clone()
    }

    fn persist(&self) -> ProvisionResult<()> {
        let record = self.record.read().clone();
        self.store.save(&record)
    }

    /// Validated state transition, persisted.
    fn transition(&self, target: MachineStatus) -> ProvisionResult<()> {
        {
            let mut record = self.record.write();
            if !record.status.can_transition_to(target) {
                return Err(ProvisionError::InvalidState(format!(
                    "cannot transition from {} to {}",
                    record.status, target
                )));
            }
            record.force_status(target);
        }
        self.persist()
    }

    /// Unvalidated status override (platform truth), persisted.
    fn force(&self, target: MachineStatus) -> ProvisionResult<()> {
        self.record.write().force_status(target);
        self.persist()
    }

    fn update<F: FnOnce(&mut MachineRecord)>(&self, apply: F) -> ProvisionResult<()> {
        apply(&mut self.record.write());
        self.persist()
    }

    fn bootstrap_keys(&self) -> ProvisionResult<BootstrapKeys> {
        let record = self.record.read();
        let host = record.host_key.as_ref().ok_or_else(|| {
            ProvisionError::Config(format!("machine '{}' has no host key pair", record.name))
        })?;
        let client = record.client_key.as_ref().ok_or_else(|| {
            ProvisionError::Config(format!("machine '{}' has no client key pair", record.name))
        })?;
        Ok(BootstrapKeys {
            host_private_key: host.private.clone(),
            host_public_key: host.public.clone(),
            client_public_key: client.public.clone(),
        })
    }

    fn provisioner(&self) -> ProvisionResult<Provisioner> {
        let allow_insecure_tls = self.record.read().connection.allow_insecure_tls;
        Provisioner::new(
            Arc::clone(&self.platform),
            self.options.clone(),
            allow_insecure_tls,
        )
    }

    /// Create the machine if missing and bring it up.
    ///
    /// Idempotent from Up, delegates to `start()` from Stopped, runs the
    /// full provisioning workflow from Missing. Any other source state is a
    /// warned no-op returning `Ok(false)`.
    pub async fn create(&self) -> ProvisionResult<bool> {
        match self.status() {
            MachineStatus::Up => {
                tracing::debug!(machine = self.name(), "create: machine already up");
                Ok(true)
            }
            MachineStatus::Stopped => self.start().await,
            MachineStatus::Missing => {
                tracing::info!(machine = self.name(), "creating machine");
                let keys = self.bootstrap_keys()?;
                let image = self.images.base_image(self.options.disk_mb).await?;
                let provisioner = self.provisioner()?;
                let placement = provisioner.resolve_placement().await?;
                provisioner
                    .import_and_configure(&placement, &image, &keys)
                    .await?;
                self.transition(MachineStatus::Stopped)?;
                self.start().await
            }
            status => {
                tracing::warn!(
                    machine = self.name(),
                    status = %status,
                    "create: not valid from this state"
                );
                Ok(false)
            }
        }
    }

    /// Power on and wait until the machine is reachable.
    ///
    /// Valid only from Stopped; anything else is a warned no-op.
    pub async fn start(&self) -> ProvisionResult<bool> {
        let status = self.status();
        if !status.can_start() {
            tracing::warn!(
                machine = self.name(),
                status = %status,
                "start: not valid from this state"
            );
            return Ok(false);
        }

        let machine = self
            .platform
            .find_machine(self.name())
            .await?
            .ok_or_else(|| {
                ProvisionError::Internal(format!(
                    "machine '{}' recorded as stopped but absent on platform",
                    self.name()
                ))
            })?;

        self.transition(MachineStatus::Starting)?;
        let provisioner = self.provisioner()?;
        let address = match provisioner.power_on_and_await_address(&machine).await {
            Ok(address) => address,
            Err(err) => {
                let _ = self.force(MachineStatus::Stopped);
                return Err(err);
            }
        };
        self.update(|record| record.set_ip_address(Some(address.clone())))?;

        let host_public = self
            .record
            .read()
            .host_key
            .as_ref()
            .map(|key| key.public.clone());
        if let Err(err) = self
            .probe
            .wait_reachable(&address, host_public.as_deref())
            .await
        {
            let _ = self.force(MachineStatus::Stopped);
            return Err(err);
        }

        self.transition(MachineStatus::Up)?;
        tracing::info!(machine = self.name(), address = %address, "machine is up");
        Ok(true)
    }

    /// Gracefully stop the machine.
    ///
    /// Valid only from Up; anything else is a warned no-op.
    pub async fn stop(&self) -> ProvisionResult<bool> {
        let status = self.status();
        if !status.can_stop() {
            tracing::warn!(
                machine = self.name(),
                status = %status,
                "stop: not valid from this state"
            );
            return Ok(false);
        }
        self.stop_machine().await?;
        Ok(true)
    }

    /// Shutdown sequence shared by `stop()` and `destroy()`. Skips the
    /// lifecycle guard; `destroy()` may run it from any recorded state.
    async fn stop_machine(&self) -> ProvisionResult<()> {
        self.force(MachineStatus::Stopping)?;
        if let Some(machine) = self.platform.find_machine(self.name()).await? {
            // Best effort: the guest may not have tools running.
            if let Err(err) = self.platform.shutdown_guest(&machine).await {
                tracing::warn!(
                    machine = self.name(),
                    error = %err,
                    "guest shutdown request failed, waiting for power drain anyway"
                );
            }
            poll_until(
                "power off",
                POWER_POLL_INTERVAL,
                self.options.timeouts.power_off(),
                || async {
                    match self.platform.power_state(&machine).await? {
                        PowerState::PoweredOn => Ok(None),
                        _ => Ok(Some(())),
                    }
                },
            )
            .await?;
        }
        self.force(MachineStatus::Stopped)?;
        tracing::info!(machine = self.name(), "machine stopped");
        Ok(())
    }

    /// Destroy the remote machine object.
    ///
    /// Absent object: success without prompting. Otherwise the operator must
    /// confirm; a powered-on machine is stopped first. Returns whether the
    /// object is gone afterwards.
    pub async fn destroy(&self, wipe: bool) -> ProvisionResult<bool> {
        let Some(machine) = self.platform.find_machine(self.name()).await? else {
            tracing::info!(machine = self.name(), "destroy: no machine object");
            return Ok(true);
        };

        if wipe {
            tracing::warn!(
                machine = self.name(),
                "wipe requested but not supported on this platform, ignoring"
            );
        }
        if !self
            .confirm
            .confirm(&format!("destroy machine '{}'?", self.name()))
        {
            return Ok(false);
        }

        if self.platform.power_state(&machine).await? == PowerState::PoweredOn {
            self.stop_machine().await?;
        }
        self.platform.destroy_machine(&machine).await?;

        let gone = self.platform.find_machine(self.name()).await?.is_none();
        if gone {
            self.update(|record| {
                record.set_ip_address(None);
                record.force_status(MachineStatus::Missing);
            })?;
            tracing::info!(machine = self.name(), "machine destroyed");
        }
        Ok(gone)
    }

    /// Reconcile the recorded status with platform truth.
    ///
    /// Absent: Missing, and the cached address is cleared since it can no
    /// longer be valid. Present but powered off: Stopped, regardless of what
    /// was recorded. Present and powered on: remaining validation is
    /// delegated to the reachability probe.
    pub async fn check(&self) -> ProvisionResult<MachineStatus> {
        match self.platform.find_machine(self.name()).await? {
            None => {
                self.update(|record| {
                    record.set_ip_address(None);
                    record.force_status(MachineStatus::Missing);
                })?;
            }
            Some(machine) => match self.platform.power_state(&machine).await? {
                PowerState::PoweredOn => {
                    let address = self.record.read().ip_address.clone();
                    if let Some(address) = address {
                        if self.probe.is_reachable(&address).await {
                            self.force(MachineStatus::Up)?;
                        }
                    }
                }
                _ => self.force(MachineStatus::Stopped)?,
            },
        }
        Ok(self.status())
    }
}
