//! Transfer Process State Definitions
//!
//! State codes are stable and persisted as SMALLINT.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Transfer process lifecycle states
///
/// Terminal states: ENDED (1100), CANCELLED (1200), ERROR (-1)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[repr(i16)]
pub enum TransferProcessState {
    /// Created, nothing provisioned yet
    Initial = 100,

    /// Provisioning of destination resources started
    Provisioning = 200,

    /// Resources provisioned
    Provisioned = 300,

    /// Consumer is sending the transfer request to the provider
    Requesting = 400,

    /// Request sent, waiting for the provider to start
    Requested = 500,

    /// Data is flowing
    InProgress = 600,

    /// Non-finite transfer is streaming
    Streaming = 700,

    /// Data transfer finished
    Completed = 800,

    /// Provisioned resources are being released
    Deprovisioning = 900,

    /// Provisioned resources released
    Deprovisioned = 1000,

    /// Terminal: lifecycle finished normally
    Ended = 1100,

    /// Terminal: cancelled by a user or another flow
    Cancelled = 1200,

    /// Terminal: failed or retired by the watchdog
    Error = -1,
}

impl TransferProcessState {
    pub const ALL: [TransferProcessState; 13] = [
        TransferProcessState::Initial,
        TransferProcessState::Provisioning,
        TransferProcessState::Provisioned,
        TransferProcessState::Requesting,
        TransferProcessState::Requested,
        TransferProcessState::InProgress,
        TransferProcessState::Streaming,
        TransferProcessState::Completed,
        TransferProcessState::Deprovisioning,
        TransferProcessState::Deprovisioned,
        TransferProcessState::Ended,
        TransferProcessState::Cancelled,
        TransferProcessState::Error,
    ];

    /// Check if this is a terminal state (no more transitions possible)
    #[inline]
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TransferProcessState::Ended
                | TransferProcessState::Cancelled
                | TransferProcessState::Error
        )
    }

    /// Whether the lifecycle allows moving from `self` to `next`.
    ///
    /// Re-entering the current state is allowed for non-terminal states.
    /// ERROR and CANCELLED are reachable from every non-terminal state.
    pub fn can_transition_to(&self, next: TransferProcessState) -> bool {
        use TransferProcessState::*;

        if self.is_terminal() {
            return false;
        }
        if *self == next || matches!(next, Error | Cancelled) {
            return true;
        }

        matches!(
            (self, next),
            (Initial, Provisioning)
                | (Provisioning, Provisioned)
                | (Provisioned, Requesting)
                | (Provisioned, InProgress)
                | (Requesting, Requested)
                | (Requested, InProgress)
                | (InProgress, Streaming)
                | (InProgress, Completed)
                | (Streaming, Completed)
                | (Completed, Deprovisioning)
                | (Deprovisioning, Deprovisioned)
                | (Deprovisioned, Ended)
        )
    }

    /// Numeric state code for storage
    #[inline]
    pub fn code(&self) -> i16 {
        *self as i16
    }

    /// Convert from a stored state code
    pub fn from_code(code: i16) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.code() == code)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TransferProcessState::Initial => "INITIAL",
            TransferProcessState::Provisioning => "PROVISIONING",
            TransferProcessState::Provisioned => "PROVISIONED",
            TransferProcessState::Requesting => "REQUESTING",
            TransferProcessState::Requested => "REQUESTED",
            TransferProcessState::InProgress => "IN_PROGRESS",
            TransferProcessState::Streaming => "STREAMING",
            TransferProcessState::Completed => "COMPLETED",
            TransferProcessState::Deprovisioning => "DEPROVISIONING",
            TransferProcessState::Deprovisioned => "DEPROVISIONED",
            TransferProcessState::Ended => "ENDED",
            TransferProcessState::Cancelled => "CANCELLED",
            TransferProcessState::Error => "ERROR",
        }
    }
}

impl fmt::Display for TransferProcessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TransferProcessState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|state| state.as_str().eq_ignore_ascii_case(s))
            .ok_or_else(|| format!("unknown transfer process state: {}", s))
    }
}

impl TryFrom<i16> for TransferProcessState {
    type Error = ();

    fn try_from(value: i16) -> Result<Self, ()> {
        TransferProcessState::from_code(value).ok_or(())
    }
}
