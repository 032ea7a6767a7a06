//! vsprout - Declarative VM provisioning for vSphere-style platforms
//!
//! This crate turns a declarative machine specification into a running
//! virtual machine: it renders a deterministic OVF hardware descriptor,
//! drives the import/transfer/bootstrap workflow over a platform session,
//! and tracks the machine through a guarded lifecycle state machine.
//!
//! ## Architecture
//!
//! - `descriptor`: deterministic OVF envelope and virtual-hardware builder
//! - `platform`: the session trait abstracting the remote inventory API
//! - `provision`: the seven-phase creation workflow
//! - `machine`: lifecycle state machine, durable record, and controller
//! - `backend`: compile-time backend registry and the vSphere adapter

pub mod backend;
pub mod descriptor;
pub mod errors;
pub mod machine;
pub mod options;
pub mod platform;
pub mod provision;
pub mod util;

pub use backend::{BackendContext, MachineBackend, available_backends, create_backend};
pub use errors::{ProvisionError, ProvisionResult};
pub use machine::{KeyPair, LifecycleController, MachineRecord, MachineStatus, RecordStore};
pub use options::{ConnectionInfo, MachineOptions, PollTimeouts};
pub use platform::Platform;
pub use provision::{BootstrapKeys, Placement, Provisioner};
