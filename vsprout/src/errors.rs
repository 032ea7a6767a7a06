//! Error types shared across the provisioning workflow.
//!
//! One variant per failure category so callers can match on the phase that
//! failed:
//! - [`ProvisionError::Resolution`]: inventory lookup failed before any
//!   remote mutation (phase 1)
//! - [`ProvisionError::Lease`]: the transfer lease reached a terminal state
//!   other than ready/done (phases 3 and 4)
//! - [`ProvisionError::Transfer`]: I/O or transport failure while streaming
//!   the disk image (phase 4)
//! - [`ProvisionError::Reconfigure`]: guest bootstrap task ended in error
//!   (phase 5)
//!
//! Guard violations (an operation invoked from an invalid lifecycle state)
//! are *not* errors: they are logged as warnings and reported as `Ok(false)`.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ProvisionResult<T> = Result<T, ProvisionError>;

/// Errors raised by the descriptor builder, orchestrator, and controller.
#[derive(Debug, Error)]
pub enum ProvisionError {
    /// A required inventory object (datacenter/datastore/cluster) is absent.
    #[error("resolution: {0}")]
    Resolution(String),

    /// The transfer lease entered an unexpected terminal state.
    #[error("lease: {0}")]
    Lease(String),

    /// Disk transfer failed mid-stream.
    #[error("transfer: {0}")]
    Transfer(String),

    /// The guest bootstrap reconfiguration task failed.
    #[error("reconfigure: {0}")]
    Reconfigure(String),

    /// A remote platform call failed.
    #[error("platform: {0}")]
    Platform(String),

    /// Invalid machine configuration.
    #[error("config: {0}")]
    Config(String),

    /// A lifecycle transition that the state machine forbids.
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The deployment-record store failed to load or persist a record.
    #[error("storage: {0}")]
    Storage(String),

    /// A bounded wait ran past its deadline.
    #[error("timed out waiting for {0}")]
    Timeout(String),

    /// Catch-all for internal invariant violations.
    #[error("internal: {0}")]
    Internal(String),
}
