//! Persisted machine record.
//!
//! The record is the durable view of one machine: connection parameters, key
//! material, the last known address, and the lifecycle status tag. Storage
//! itself is an external collaborator behind [`RecordStore`].

use super::status::MachineStatus;
use crate::errors::ProvisionResult;
use crate::options::ConnectionInfo;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// An asymmetric key pair carried in the record.
///
/// Generation and custody of key material is out of scope; records arrive
/// with these fields already populated.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct KeyPair {
    pub public: String,
    pub private: String,
}

/// Durable state of one machine, mutated by every lifecycle operation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MachineRecord {
    /// Machine name; also the inventory lookup key.
    pub name: String,

    /// Platform endpoint this machine lives on.
    pub connection: ConnectionInfo,

    /// Host identity key injected into the guest at bootstrap.
    pub host_key: Option<KeyPair>,

    /// Operator key authorized for remote administrative login.
    pub client_key: Option<KeyPair>,

    /// Address reported by the guest, cleared when the machine disappears.
    pub ip_address: Option<String>,

    /// Last observed lifecycle status.
    pub status: MachineStatus,

    /// Last state change timestamp (UTC).
    pub last_updated: DateTime<Utc>,
}

impl MachineRecord {
    /// Fresh record for a machine that has never been checked.
    pub fn new(name: impl Into<String>, connection: ConnectionInfo) -> Self {
        Self {
            name: name.into(),
            connection,
            host_key: None,
            client_key: None,
            ip_address: None,
            status: MachineStatus::Unknown,
            last_updated: Utc::now(),
        }
    }

    /// Set the status without transition validation (platform truth
    /// overrides the recorded expectation).
    pub fn force_status(&mut self, status: MachineStatus) {
        self.status = status;
        self.last_updated = Utc::now();
    }

    pub fn set_ip_address(&mut self, address: Option<String>) {
        self.ip_address = address;
        self.last_updated = Utc::now();
    }
}

/// External persistence for machine records.
pub trait RecordStore: Send + Sync {
    fn load(&self, name: &str) -> ProvisionResult<Option<MachineRecord>>;
    fn save(&self, record: &MachineRecord) -> ProvisionResult<()>;
}
