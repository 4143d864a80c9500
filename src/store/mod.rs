//! Transfer Process Store
//!
//! Durable, queryable repository of transfer processes. Query and save are the
//! only mutation surface; the store never performs state transitions itself.

pub mod error;
pub mod memory;
pub mod postgres;

pub use error::StoreError;
pub use memory::InMemoryTransferProcessStore;
pub use postgres::PgTransferProcessStore;

use async_trait::async_trait;

use crate::process::{TransferProcess, TransferProcessId, TransferProcessState};

#[async_trait]
pub trait TransferProcessStore: Send + Sync {
    /// Get a process by id
    async fn find_by_id(
        &self,
        id: TransferProcessId,
    ) -> Result<Option<TransferProcess>, StoreError>;

    /// Up to `batch_size` processes currently in `state`.
    ///
    /// # Ordering
    /// Oldest `state_timestamp` first, ties broken by ascending id. Repeated
    /// polling therefore reaches long-stuck processes before newer ones and
    /// no process is starved when the batch truncates the candidate set.
    async fn next_for_state(
        &self,
        state: TransferProcessState,
        batch_size: usize,
    ) -> Result<Vec<TransferProcess>, StoreError>;

    /// Upsert one process with optimistic concurrency.
    ///
    /// - version 0: insert; `Conflict` if the id already exists
    /// - version n: overwrite only if the stored version is still n,
    ///   `Conflict` otherwise, `NotFound` if the record is gone
    ///
    /// On success the process carries the new version.
    async fn save(&self, process: &mut TransferProcess) -> Result<(), StoreError>;
}
