//! Transfer Process Types
//!
//! The persisted record of one transfer's lifecycle.

use std::fmt;
use std::str::FromStr;

use super::error::ProcessError;
use super::state::TransferProcessState;

/// Transfer process ID - ULID-based unique identifier
///
/// ULIDs sort by creation time, which gives stores a stable tie-break when
/// two processes share a state timestamp.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TransferProcessId(ulid::Ulid);

impl TransferProcessId {
    /// Generate a new unique TransferProcessId
    pub fn new() -> Self {
        Self(ulid::Ulid::new())
    }

    pub fn inner(&self) -> ulid::Ulid {
        self.0
    }
}

impl Default for TransferProcessId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TransferProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for TransferProcessId {
    type Err = ulid::DecodeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(ulid::Ulid::from_string(s)?))
    }
}

/// Which side of the transfer this connector plays
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(i16)]
pub enum ProcessType {
    Consumer = 1,
    Provider = 2,
}

impl ProcessType {
    #[inline]
    pub fn id(&self) -> i16 {
        *self as i16
    }

    pub fn from_id(id: i16) -> Option<Self> {
        match id {
            1 => Some(ProcessType::Consumer),
            2 => Some(ProcessType::Provider),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProcessType::Consumer => "CONSUMER",
            ProcessType::Provider => "PROVIDER",
        }
    }
}

impl fmt::Display for ProcessType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Transfer process entity
///
/// `state`, `state_count` and `state_timestamp` only change together through
/// the transition methods, so a saved record never carries a timestamp that
/// belongs to a previous state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferProcess {
    id: TransferProcessId,
    process_type: ProcessType,
    asset_id: String,
    state: TransferProcessState,
    state_count: u32,
    /// Epoch millis of the last transition
    state_timestamp: i64,
    error_detail: Option<String>,
    /// Optimistic concurrency version (0 = never persisted)
    version: u64,
    /// Epoch millis
    created_at: i64,
}

impl TransferProcess {
    /// Create a new process in INITIAL state
    pub fn new(process_type: ProcessType, asset_id: impl Into<String>, now_ms: i64) -> Self {
        Self::with_id(TransferProcessId::new(), process_type, asset_id, now_ms)
    }

    pub fn with_id(
        id: TransferProcessId,
        process_type: ProcessType,
        asset_id: impl Into<String>,
        now_ms: i64,
    ) -> Self {
        Self {
            id,
            process_type,
            asset_id: asset_id.into(),
            state: TransferProcessState::Initial,
            state_count: 1,
            state_timestamp: now_ms,
            error_detail: None,
            version: 0,
            created_at: now_ms,
        }
    }

    /// Rebuild a process from persisted columns.
    ///
    /// Only store implementations should call this.
    #[allow(clippy::too_many_arguments)]
    pub fn restore(
        id: TransferProcessId,
        process_type: ProcessType,
        asset_id: String,
        state: TransferProcessState,
        state_count: u32,
        state_timestamp: i64,
        error_detail: Option<String>,
        version: u64,
        created_at: i64,
    ) -> Self {
        Self {
            id,
            process_type,
            asset_id,
            state,
            state_count,
            state_timestamp,
            error_detail,
            version,
            created_at,
        }
    }

    pub fn id(&self) -> TransferProcessId {
        self.id
    }

    pub fn process_type(&self) -> ProcessType {
        self.process_type
    }

    pub fn asset_id(&self) -> &str {
        &self.asset_id
    }

    pub fn state(&self) -> TransferProcessState {
        self.state
    }

    pub fn state_count(&self) -> u32 {
        self.state_count
    }

    pub fn state_timestamp(&self) -> i64 {
        self.state_timestamp
    }

    pub fn error_detail(&self) -> Option<&str> {
        self.error_detail.as_deref()
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Move to `next`, stamping the transition time.
    pub fn transition_to(
        &mut self,
        next: TransferProcessState,
        now_ms: i64,
    ) -> Result<(), ProcessError> {
        if !self.state.can_transition_to(next) {
            return Err(ProcessError::InvalidTransition {
                id: self.id,
                from: self.state,
                to: next,
            });
        }

        self.state_count = if next == self.state {
            self.state_count.saturating_add(1)
        } else {
            1
        };
        self.state = next;
        self.state_timestamp = now_ms;
        Ok(())
    }

    /// Move to ERROR and record why.
    pub fn transition_error(
        &mut self,
        detail: impl Into<String>,
        now_ms: i64,
    ) -> Result<(), ProcessError> {
        self.transition_to(TransferProcessState::Error, now_ms)?;
        self.error_detail = Some(detail.into());
        Ok(())
    }

    /// Move to CANCELLED and record why.
    pub fn transition_cancelled(
        &mut self,
        reason: impl Into<String>,
        now_ms: i64,
    ) -> Result<(), ProcessError> {
        self.transition_to(TransferProcessState::Cancelled, now_ms)?;
        self.error_detail = Some(reason.into());
        Ok(())
    }

    /// Record a successful save. Store implementations call this after the
    /// write has been committed.
    pub fn mark_saved(&mut self, version: u64) {
        self.version = version;
    }
}
