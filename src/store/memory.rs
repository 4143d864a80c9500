//! In-memory transfer process store.
//!
//! Backed by a DashMap; the entry lock on an id makes the version check and
//! the write a single atomic step.

use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

use super::{StoreError, TransferProcessStore};
use crate::process::{TransferProcess, TransferProcessId, TransferProcessState};

#[derive(Debug, Default)]
pub struct InMemoryTransferProcessStore {
    processes: DashMap<TransferProcessId, TransferProcess>,
}

impl InMemoryTransferProcessStore {
    pub fn new() -> Self {
        Self {
            processes: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.processes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.processes.is_empty()
    }

    /// Number of processes currently in `state`
    pub fn count_in_state(&self, state: TransferProcessState) -> usize {
        self.processes
            .iter()
            .filter(|entry| entry.value().state() == state)
            .count()
    }
}

#[async_trait]
impl TransferProcessStore for InMemoryTransferProcessStore {
    async fn find_by_id(
        &self,
        id: TransferProcessId,
    ) -> Result<Option<TransferProcess>, StoreError> {
        Ok(self.processes.get(&id).map(|entry| entry.value().clone()))
    }

    async fn next_for_state(
        &self,
        state: TransferProcessState,
        batch_size: usize,
    ) -> Result<Vec<TransferProcess>, StoreError> {
        let mut matching: Vec<TransferProcess> = self
            .processes
            .iter()
            .filter(|entry| entry.value().state() == state)
            .map(|entry| entry.value().clone())
            .collect();

        matching.sort_by_key(|tp| (tp.state_timestamp(), tp.id()));
        matching.truncate(batch_size);
        Ok(matching)
    }

    async fn save(&self, process: &mut TransferProcess) -> Result<(), StoreError> {
        let id = process.id();
        let expected = process.version();

        match self.processes.entry(id) {
            Entry::Occupied(mut occupied) => {
                let actual = occupied.get().version();
                if actual != expected {
                    return Err(StoreError::Conflict {
                        id,
                        expected,
                        actual,
                    });
                }
                process.mark_saved(expected + 1);
                occupied.insert(process.clone());
            }
            Entry::Vacant(vacant) => {
                if expected != 0 {
                    return Err(StoreError::NotFound(id));
                }
                process.mark_saved(1);
                vacant.insert(process.clone());
            }
        }

        Ok(())
    }
}
