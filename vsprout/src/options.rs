//! Configuration for a provisioned machine.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Declarative specification of one virtual machine.
///
/// Parsed from external configuration (typically JSON) by the backend's
/// `validate` entry point. Placement names are optional: an unset name means
/// "first available" at resolution time.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MachineOptions {
    /// Machine name, used as the virtual-system identifier and for inventory
    /// lookup after import.
    pub name: String,

    /// Number of virtual CPUs.
    #[serde(default = "default_vcpus")]
    pub vcpus: u32,

    /// Memory size in MiB.
    #[serde(default = "default_memory_mb")]
    pub memory_mb: u64,

    /// Root disk capacity in MiB.
    #[serde(default = "default_disk_mb")]
    pub disk_mb: u64,

    /// Networks to attach, one Ethernet adapter per entry.
    #[serde(default)]
    pub networks: Vec<String>,

    /// Datacenter to place the machine in. None: first available.
    #[serde(default)]
    pub datacenter: Option<String>,

    /// Datastore within the datacenter. None: first available.
    #[serde(default)]
    pub datastore: Option<String>,

    /// Compute cluster within the datacenter. None: first available.
    #[serde(default)]
    pub cluster: Option<String>,

    /// Guest OS identifier tag consumed by the platform.
    #[serde(default = "default_guest_os_type")]
    pub guest_os_type: String,

    /// Virtual hardware family version.
    #[serde(default = "default_hardware_version")]
    pub hardware_version: String,

    /// Optional deadlines for the polling waits.
    #[serde(default)]
    pub timeouts: PollTimeouts,
}

impl MachineOptions {
    /// Options with defaults for everything but the name.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            vcpus: default_vcpus(),
            memory_mb: default_memory_mb(),
            disk_mb: default_disk_mb(),
            networks: Vec::new(),
            datacenter: None,
            datastore: None,
            cluster: None,
            guest_os_type: default_guest_os_type(),
            hardware_version: default_hardware_version(),
            timeouts: PollTimeouts::default(),
        }
    }
}

/// Optional deadlines for the workflow's wait loops, in seconds.
///
/// All default to `None`: a stalled remote side blocks the caller
/// indefinitely, matching the platform contract. Set a field to bound the
/// corresponding wait; expiry surfaces as `ProvisionError::Timeout`.
#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize)]
pub struct PollTimeouts {
    /// Bound on waiting for the transfer lease to become ready.
    #[serde(default)]
    pub lease_ready_secs: Option<u64>,

    /// Bound on waiting for the lease to reach its done state after upload.
    #[serde(default)]
    pub lease_done_secs: Option<u64>,

    /// Bound on waiting for the reconfigure task to finish.
    #[serde(default)]
    pub reconfigure_secs: Option<u64>,

    /// Bound on waiting for the guest to report an IP address.
    #[serde(default)]
    pub address_secs: Option<u64>,

    /// Bound on waiting for the power state to drain during stop.
    #[serde(default)]
    pub power_off_secs: Option<u64>,
}

impl PollTimeouts {
    pub(crate) fn lease_ready(&self) -> Option<Duration> {
        self.lease_ready_secs.map(Duration::from_secs)
    }

    pub(crate) fn lease_done(&self) -> Option<Duration> {
        self.lease_done_secs.map(Duration::from_secs)
    }

    pub(crate) fn reconfigure(&self) -> Option<Duration> {
        self.reconfigure_secs.map(Duration::from_secs)
    }

    pub(crate) fn address(&self) -> Option<Duration> {
        self.address_secs.map(Duration::from_secs)
    }

    pub(crate) fn power_off(&self) -> Option<Duration> {
        self.power_off_secs.map(Duration::from_secs)
    }
}

/// Connection parameters for the platform endpoint.
///
/// Persisted alongside the machine record so later lifecycle operations can
/// reconnect to the same endpoint.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConnectionInfo {
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    pub user: String,
    pub password: String,

    /// Accept self-signed TLS certificates on the upload endpoint.
    #[serde(default)]
    pub allow_insecure_tls: bool,
}

fn default_vcpus() -> u32 {
    1
}

fn default_memory_mb() -> u64 {
    1024
}

fn default_disk_mb() -> u64 {
    10240
}

fn default_guest_os_type() -> String {
    "other3xLinux64Guest".to_string()
}

fn default_hardware_version() -> String {
    "vmx-11".to_string()
}

fn default_port() -> u16 {
    443
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_json() {
        let opts: MachineOptions = serde_json::from_value(serde_json::json!({
            "name": "web-0",
            "networks": ["lan"],
        }))
        .unwrap();

        assert_eq!(opts.name, "web-0");
        assert_eq!(opts.vcpus, 1);
        assert_eq!(opts.memory_mb, 1024);
        assert_eq!(opts.disk_mb, 10240);
        assert_eq!(opts.networks, vec!["lan".to_string()]);
        assert_eq!(opts.guest_os_type, "other3xLinux64Guest");
        assert_eq!(opts.hardware_version, "vmx-11");
        assert!(opts.timeouts.address().is_none());
    }

    #[test]
    fn test_timeouts_convert_to_durations() {
        let timeouts = PollTimeouts {
            lease_ready_secs: Some(30),
            power_off_secs: Some(120),
            ..Default::default()
        };
        assert_eq!(timeouts.lease_ready(), Some(Duration::from_secs(30)));
        assert_eq!(timeouts.power_off(), Some(Duration::from_secs(120)));
        assert_eq!(timeouts.lease_done(), None);
    }
}
