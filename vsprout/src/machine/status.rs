//! Machine lifecycle status and state machine.
//!
//! Defines the externally observable states of a machine and the valid
//! transitions between them.

use serde::{Deserialize, Serialize};

/// Lifecycle status of a provisioned machine.
///
/// State machine:
/// ```text
/// create() : Missing → Stopped (provisioned, powered off)
/// start()  : Stopped → Starting → Up
/// stop()   : Up → Stopping → Stopped
/// destroy(): * → Missing
/// ```
/// `Unknown` is the initial state before the first `check()`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MachineStatus {
    /// State not yet determined (before the first check).
    Unknown,

    /// No machine object exists on the platform.
    Missing,

    /// Machine exists and is powered off.
    Stopped,

    /// Power-on issued, waiting for address and reachability (transient).
    Starting,

    /// Machine is running and accepts remote administrative logins.
    Up,

    /// Shutdown issued, draining power state (transient).
    Stopping,
}

impl MachineStatus {
    /// Check if create() can proceed from this state.
    /// Up is idempotent success, Stopped delegates to start().
    pub fn can_create(&self) -> bool {
        matches!(
            self,
            MachineStatus::Missing | MachineStatus::Stopped | MachineStatus::Up
        )
    }

    /// Check if start() can be called from this state.
    pub fn can_start(&self) -> bool {
        matches!(self, MachineStatus::Stopped)
    }

    /// Check if stop() can be called from this state.
    pub fn can_stop(&self) -> bool {
        matches!(self, MachineStatus::Up)
    }

    /// Check if this status represents a transient state.
    pub fn is_transient(&self) -> bool {
        matches!(self, MachineStatus::Starting | MachineStatus::Stopping)
    }

    /// Check if transition to the target state is valid.
    pub fn can_transition_to(&self, target: MachineStatus) -> bool {
        use MachineStatus::*;
        matches!(
            (self, target),
            // Unknown can transition to any state (first check).
            (Unknown, _) |
            // Missing → Stopped (create success)
            (Missing, Stopped) |
            // Stopped → Starting (start issued)
            (Stopped, Starting) |
            // Starting → Up (reachable) or Stopped (start failed)
            (Starting, Up) |
            (Starting, Stopped) |
            // Up → Stopping (graceful stop)
            (Up, Stopping) |
            // Stopping → Stopped (drain complete)
            (Stopping, Stopped)
        )
    }

    /// Convert to string for record storage.
    pub fn as_str(&self) -> &'static str {
        match self {
            MachineStatus::Unknown => "unknown",
            MachineStatus::Missing => "missing",
            MachineStatus::Stopped => "stopped",
            MachineStatus::Starting => "starting",
            MachineStatus::Up => "up",
            MachineStatus::Stopping => "stopping",
        }
    }
}

impl std::str::FromStr for MachineStatus {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(MachineStatus::Unknown),
            "missing" => Ok(MachineStatus::Missing),
            "stopped" => Ok(MachineStatus::Stopped),
            "starting" => Ok(MachineStatus::Starting),
            "up" => Ok(MachineStatus::Up),
            "stopping" => Ok(MachineStatus::Stopping),
            _ => Err(()),
        }
    }
}

impl std::fmt::Display for MachineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
