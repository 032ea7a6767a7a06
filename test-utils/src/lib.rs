//! Shared test doubles for vsprout integration tests.
//!
//! [`FakePlatform`] is a scriptable in-memory platform: it records every
//! call, materializes a powered-off machine on import, and can be tuned to
//! delay lease readiness or address reporting. [`UploadSink`] is a one-shot
//! HTTP receiver for exercising the real disk transfer path.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use vsprout::errors::ProvisionResult;
use vsprout::machine::{
    ConfirmPrompt, ImageBuilder, MachineRecord, ReachabilityProbe, RecordStore,
};
use vsprout::platform::types::{ExtraConfigEntry, LeaseInfo, LeaseState, PowerState, TaskState};
use vsprout::platform::{
    ClusterRef, DatacenterRef, DatastoreRef, FolderRef, ImportSpec, LeaseRef, MachineRef,
    Platform, ResourcePoolRef, TaskRef,
};

#[derive(Default)]
struct FakeState {
    calls: Vec<String>,
    descriptor: Option<String>,
    pending_import: Option<String>,
    machines: HashMap<String, PowerState>,
    lease_initializing_polls: usize,
    lease_error: Option<String>,
    lease_completed: bool,
    lease_aborted: Option<String>,
    progress_reports: Vec<u8>,
    extra_config: Vec<(String, String)>,
    task_error: Option<String>,
    address_polls: usize,
    address_polls_left: usize,
    address: String,
}

/// In-memory [`Platform`] with a scriptable inventory and a call log.
///
/// Every trait method appends to the log, so tests can assert both on
/// outcomes and on which remote calls were (or were not) made.
pub struct FakePlatform {
    host: String,
    device_url: String,
    state: Mutex<FakeState>,
}

impl FakePlatform {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            device_url: "http://*/disk-1.vmdk".to_string(),
            state: Mutex::new(FakeState {
                address: "192.0.2.10".to_string(),
                ..Default::default()
            }),
        }
    }

    /// Device URL handed out for the transfer lease. A `*` is substituted
    /// with the platform host by the uploader.
    pub fn with_device_url(mut self, url: impl Into<String>) -> Self {
        self.device_url = url.into();
        self
    }

    /// Number of lease-state polls answered `Initializing` before `Ready`.
    pub fn with_initializing_polls(self, polls: usize) -> Self {
        self.state.lock().lease_initializing_polls = polls;
        self
    }

    /// Put the lease in a terminal error state instead of ever becoming
    /// ready (after any configured initializing polls).
    pub fn with_lease_error(self, message: impl Into<String>) -> Self {
        self.state.lock().lease_error = Some(message.into());
        self
    }

    /// Number of guest-ip polls answered `None` after power-on.
    pub fn with_address_polls(self, polls: usize) -> Self {
        self.state.lock().address_polls = polls;
        self
    }

    /// Address the guest reports once available.
    pub fn with_address(self, address: impl Into<String>) -> Self {
        self.state.lock().address = address.into();
        self
    }

    /// Pre-seed a machine object, bypassing the import workflow.
    pub fn with_existing_machine(self, name: impl Into<String>, power: PowerState) -> Self {
        self.state.lock().machines.insert(name.into(), power);
        self
    }

    /// Make the bootstrap reconfigure task fail with the given message.
    pub fn with_task_error(self, message: impl Into<String>) -> Self {
        self.state.lock().task_error = Some(message.into());
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Descriptor captured by `create_import_spec`, if any import ran.
    pub fn descriptor(&self) -> Option<String> {
        self.state.lock().descriptor.clone()
    }

    pub fn progress_reports(&self) -> Vec<u8> {
        self.state.lock().progress_reports.clone()
    }

    pub fn extra_config(&self) -> Vec<(String, String)> {
        self.state.lock().extra_config.clone()
    }

    pub fn aborted_reason(&self) -> Option<String> {
        self.state.lock().lease_aborted.clone()
    }

    pub fn machine_power(&self, name: &str) -> Option<PowerState> {
        self.state.lock().machines.get(name).copied()
    }

    fn log(&self, call: impl Into<String>) {
        self.state.lock().calls.push(call.into());
    }
}

#[async_trait]
impl Platform for FakePlatform {
    fn host(&self) -> &str {
        &self.host
    }

    async fn find_datacenter(
        &self,
        name: Option<&str>,
    ) -> ProvisionResult<Option<DatacenterRef>> {
        self.log("find_datacenter");
        Ok(Some(DatacenterRef(name.unwrap_or("dc-1").to_string())))
    }

    async fn find_datastore(
        &self,
        _datacenter: &DatacenterRef,
        name: Option<&str>,
    ) -> ProvisionResult<Option<DatastoreRef>> {
        self.log("find_datastore");
        Ok(Some(DatastoreRef(name.unwrap_or("ds-1").to_string())))
    }

    async fn find_cluster(
        &self,
        _datacenter: &DatacenterRef,
        name: Option<&str>,
    ) -> ProvisionResult<Option<ClusterRef>> {
        self.log("find_cluster");
        Ok(Some(ClusterRef(name.unwrap_or("cl-1").to_string())))
    }

    async fn resource_pool(&self, cluster: &ClusterRef) -> ProvisionResult<ResourcePoolRef> {
        self.log("resource_pool");
        Ok(ResourcePoolRef(format!("{}-pool", cluster.id())))
    }

    async fn vm_folder(&self, datacenter: &DatacenterRef) -> ProvisionResult<FolderRef> {
        self.log("vm_folder");
        Ok(FolderRef(format!("{}-vm-folder", datacenter.id())))
    }

    async fn create_import_spec(
        &self,
        descriptor: &str,
        _pool: &ResourcePoolRef,
        _datastore: &DatastoreRef,
        name: &str,
    ) -> ProvisionResult<ImportSpec> {
        self.log("create_import_spec");
        let mut state = self.state.lock();
        state.descriptor = Some(descriptor.to_string());
        state.pending_import = Some(name.to_string());
        Ok(ImportSpec(format!("spec-{name}")))
    }

    async fn begin_import(
        &self,
        _pool: &ResourcePoolRef,
        _spec: &ImportSpec,
        _folder: &FolderRef,
    ) -> ProvisionResult<LeaseRef> {
        self.log("begin_import");
        let mut state = self.state.lock();
        if let Some(name) = state.pending_import.take() {
            state.machines.insert(name, PowerState::PoweredOff);
        }
        Ok(LeaseRef("lease-1".to_string()))
    }

    async fn lease_state(&self, _lease: &LeaseRef) -> ProvisionResult<LeaseState> {
        self.log("lease_state");
        let mut state = self.state.lock();
        if let Some(reason) = &state.lease_aborted {
            return Ok(LeaseState::Error(reason.clone()));
        }
        if state.lease_completed {
            return Ok(LeaseState::Done);
        }
        if state.lease_initializing_polls > 0 {
            state.lease_initializing_polls -= 1;
            return Ok(LeaseState::Initializing);
        }
        if let Some(message) = &state.lease_error {
            return Ok(LeaseState::Error(message.clone()));
        }
        Ok(LeaseState::Ready)
    }

    async fn lease_info(&self, _lease: &LeaseRef) -> ProvisionResult<LeaseInfo> {
        self.log("lease_info");
        Ok(LeaseInfo {
            device_url: self.device_url.clone(),
        })
    }

    async fn lease_progress(&self, _lease: &LeaseRef, percent: u8) -> ProvisionResult<()> {
        self.state.lock().progress_reports.push(percent);
        Ok(())
    }

    async fn lease_complete(&self, _lease: &LeaseRef) -> ProvisionResult<()> {
        self.log("lease_complete");
        self.state.lock().lease_completed = true;
        Ok(())
    }

    async fn lease_abort(&self, _lease: &LeaseRef, reason: &str) -> ProvisionResult<()> {
        self.log("lease_abort");
        self.state.lock().lease_aborted = Some(reason.to_string());
        Ok(())
    }

    async fn find_machine(&self, name: &str) -> ProvisionResult<Option<MachineRef>> {
        self.log(format!("find_machine({name})"));
        let state = self.state.lock();
        Ok(state
            .machines
            .contains_key(name)
            .then(|| MachineRef(name.to_string())))
    }

    async fn reconfigure_extra_config(
        &self,
        machine: &MachineRef,
        entries: &[ExtraConfigEntry],
    ) -> ProvisionResult<TaskRef> {
        self.log("reconfigure_extra_config");
        let mut state = self.state.lock();
        state.extra_config = entries
            .iter()
            .map(|e| (e.key.clone(), e.value.clone()))
            .collect();
        Ok(TaskRef(format!("task-{}", machine.id())))
    }

    async fn task_state(&self, _task: &TaskRef) -> ProvisionResult<TaskState> {
        self.log("task_state");
        let state = self.state.lock();
        Ok(match &state.task_error {
            Some(message) => TaskState::Error(message.clone()),
            None => TaskState::Success,
        })
    }

    async fn power_on(&self, machine: &MachineRef) -> ProvisionResult<()> {
        self.log(format!("power_on({})", machine.id()));
        let mut state = self.state.lock();
        state.address_polls_left = state.address_polls;
        state
            .machines
            .insert(machine.id().to_string(), PowerState::PoweredOn);
        Ok(())
    }

    async fn shutdown_guest(&self, machine: &MachineRef) -> ProvisionResult<()> {
        self.log(format!("shutdown_guest({})", machine.id()));
        self.state
            .lock()
            .machines
            .insert(machine.id().to_string(), PowerState::PoweredOff);
        Ok(())
    }

    async fn power_state(&self, machine: &MachineRef) -> ProvisionResult<PowerState> {
        self.log("power_state");
        let state = self.state.lock();
        Ok(state
            .machines
            .get(machine.id())
            .copied()
            .unwrap_or(PowerState::PoweredOff))
    }

    async fn guest_ip(&self, machine: &MachineRef) -> ProvisionResult<Option<String>> {
        self.log("guest_ip");
        let mut state = self.state.lock();
        if state.machines.get(machine.id()) != Some(&PowerState::PoweredOn) {
            return Ok(None);
        }
        if state.address_polls_left > 0 {
            state.address_polls_left -= 1;
            return Ok(None);
        }
        Ok(Some(state.address.clone()))
    }

    async fn destroy_machine(&self, machine: &MachineRef) -> ProvisionResult<()> {
        self.log(format!("destroy_machine({})", machine.id()));
        self.state.lock().machines.remove(machine.id());
        Ok(())
    }
}

/// [`RecordStore`] backed by a shared in-memory map.
#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, MachineRecord>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<MachineRecord> {
        self.records.lock().get(name).cloned()
    }

    pub fn put(&self, record: MachineRecord) {
        self.records.lock().insert(record.name.clone(), record);
    }
}

impl RecordStore for MemoryRecordStore {
    fn load(&self, name: &str) -> ProvisionResult<Option<MachineRecord>> {
        Ok(self.records.lock().get(name).cloned())
    }

    fn save(&self, record: &MachineRecord) -> ProvisionResult<()> {
        self.records
            .lock()
            .insert(record.name.clone(), record.clone());
        Ok(())
    }
}

/// Probe that answers immediately with a fixed verdict.
pub struct InstantProbe {
    pub reachable: bool,
}

impl InstantProbe {
    pub fn reachable() -> Self {
        Self { reachable: true }
    }

    pub fn unreachable() -> Self {
        Self { reachable: false }
    }
}

#[async_trait]
impl ReachabilityProbe for InstantProbe {
    async fn wait_reachable(
        &self,
        _address: &str,
        _host_public_key: Option<&str>,
    ) -> ProvisionResult<()> {
        Ok(())
    }

    async fn is_reachable(&self, _address: &str) -> bool {
        self.reachable
    }
}

/// Image builder that always hands out the same path.
pub struct FixedImageBuilder {
    path: PathBuf,
}

impl FixedImageBuilder {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait]
impl ImageBuilder for FixedImageBuilder {
    async fn base_image(&self, _capacity_mb: u64) -> ProvisionResult<PathBuf> {
        Ok(self.path.clone())
    }
}

/// Confirmation prompt with a fixed answer and a transcript of prompts.
pub struct AutoConfirm {
    answer: bool,
    prompts: Mutex<Vec<String>>,
}

impl AutoConfirm {
    pub fn new(answer: bool) -> Self {
        Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().clone()
    }
}

impl ConfirmPrompt for AutoConfirm {
    fn confirm(&self, prompt: &str) -> bool {
        self.prompts.lock().push(prompt.to_string());
        self.answer
    }
}

/// One-shot HTTP/1.1 receiver for disk uploads.
///
/// Accepts a single connection, decodes a chunked (or content-length) body,
/// responds `200 OK`, and returns the number of body bytes received.
pub struct UploadSink {
    listener: TcpListener,
}

impl UploadSink {
    pub async fn bind() -> std::io::Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0").await?;
        Ok(Self { listener })
    }

    pub fn addr(&self) -> std::io::Result<SocketAddr> {
        self.listener.local_addr()
    }

    pub async fn accept_one(self) -> std::io::Result<usize> {
        let (stream, _) = self.listener.accept().await?;
        let mut reader = BufReader::new(stream);

        let mut line = String::new();
        reader.read_line(&mut line).await?;

        let mut chunked = false;
        let mut content_length = 0usize;
        loop {
            line.clear();
            reader.read_line(&mut line).await?;
            let header = line.trim();
            if header.is_empty() {
                break;
            }
            let lower = header.to_ascii_lowercase();
            if lower.starts_with("transfer-encoding:") && lower.contains("chunked") {
                chunked = true;
            } else if let Some(value) = lower.strip_prefix("content-length:") {
                content_length = value.trim().parse().unwrap_or(0);
            }
        }

        let mut total = 0usize;
        if chunked {
            loop {
                line.clear();
                reader.read_line(&mut line).await?;
                let size_field = line.trim().split(';').next().unwrap_or("");
                let size = usize::from_str_radix(size_field, 16).map_err(|_| {
                    std::io::Error::new(std::io::ErrorKind::InvalidData, "bad chunk size")
                })?;
                if size == 0 {
                    line.clear();
                    reader.read_line(&mut line).await?;
                    break;
                }
                // Chunk payload plus the trailing CRLF.
                let mut chunk = vec![0u8; size + 2];
                reader.read_exact(&mut chunk).await?;
                total += size;
            }
        } else {
            let mut body = vec![0u8; content_length];
            reader.read_exact(&mut body).await?;
            total = content_length;
        }

        let mut stream = reader.into_inner();
        stream
            .write_all(b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\nconnection: close\r\n\r\n")
            .await?;
        stream.flush().await?;
        Ok(total)
    }
}
