//! Store Error Types

use thiserror::Error;

use crate::process::TransferProcessId;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    /// Persistence layer unreachable or failing
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// Optimistic concurrency loss: the record changed since it was read
    #[error("Transfer process {id} changed concurrently (expected version {expected}, found {actual})")]
    Conflict {
        id: TransferProcessId,
        expected: u64,
        actual: u64,
    },

    /// Record vanished between read and save
    #[error("Transfer process not found: {0}")]
    NotFound(TransferProcessId),

    /// Persisted data could not be decoded
    #[error("Corrupt transfer process record: {0}")]
    Corrupt(String),
}

impl StoreError {
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::Unavailable(_) => "STORE_UNAVAILABLE",
            StoreError::Conflict { .. } => "CONFLICT",
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Corrupt(_) => "CORRUPT_RECORD",
        }
    }

    /// Fatal errors abort the current batch; the rest only affect one record.
    pub fn is_fatal(&self) -> bool {
        matches!(self, StoreError::Unavailable(_) | StoreError::Corrupt(_))
    }
}

impl From<sqlx::Error> for StoreError {
    fn from(e: sqlx::Error) -> Self {
        StoreError::Unavailable(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatal_classification() {
        let id = TransferProcessId::new();
        assert!(StoreError::Unavailable("down".into()).is_fatal());
        assert!(StoreError::Corrupt("bad state".into()).is_fatal());
        assert!(!StoreError::NotFound(id).is_fatal());
        assert!(
            !StoreError::Conflict {
                id,
                expected: 1,
                actual: 2
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_error_codes() {
        assert_eq!(
            StoreError::Unavailable("x".into()).code(),
            "STORE_UNAVAILABLE"
        );
        assert_eq!(
            StoreError::NotFound(TransferProcessId::new()).code(),
            "NOT_FOUND"
        );
    }

    #[test]
    fn test_sqlx_errors_map_to_unavailable() {
        let err: StoreError = sqlx::Error::PoolTimedOut.into();
        assert!(matches!(err, StoreError::Unavailable(_)));
    }
}
