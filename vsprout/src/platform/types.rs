//! Wire-level value types exchanged with the platform.

use serde::{Deserialize, Serialize};

/// State of an import transfer lease.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LeaseState {
    /// The platform is still preparing the transfer.
    Initializing,
    /// Device URLs are available and uploads may begin.
    Ready,
    /// The transfer has been marked complete.
    Done,
    /// Terminal failure, with the platform's message.
    Error(String),
}

/// Transfer endpoints exposed by a ready lease.
#[derive(Clone, Debug)]
pub struct LeaseInfo {
    /// Upload URL for the machine's disk device. May carry a `*` wildcard in
    /// place of the platform host.
    pub device_url: String,
}

/// State of an asynchronous platform task.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TaskState {
    Queued,
    Running,
    Success,
    Error(String),
}

impl TaskState {
    /// Queued and running tasks are still in flight.
    pub fn is_pending(&self) -> bool {
        matches!(self, TaskState::Queued | TaskState::Running)
    }
}

/// Power state reported by the platform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PowerState {
    PoweredOn,
    PoweredOff,
    Suspended,
}

/// One guest extra-config key/value pair applied during bootstrap.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ExtraConfigEntry {
    pub key: String,
    pub value: String,
}

impl ExtraConfigEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }
}
