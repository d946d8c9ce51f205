//! In-Memory Storage Implementation
//!
//! Queue store backed by plain maps for testing and development. Data is
//! lost when the service restarts.

use async_trait::async_trait;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::RwLock;

use alloy_primitives::Address;

use super::traits::{QueueSnapshot, QueueStore, StorageError, StorageResult};
use crate::queue::QueueGlobals;
use crate::types::{Checkpoint, CheckpointIndex, RequestId, WithdrawalRequest};

#[derive(Default)]
struct Inner {
    requests: BTreeMap<RequestId, WithdrawalRequest>,
    checkpoints: BTreeMap<CheckpointIndex, Checkpoint>,
    globals: Option<QueueGlobals>,
    token_approvals: HashMap<RequestId, Address>,
    operator_approvals: HashSet<(Address, Address)>,
}

/// In-memory queue store
#[derive(Clone, Default)]
pub struct MemoryQueueStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryQueueStore {
    /// Create a new empty store
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl QueueStore for MemoryQueueStore {
    async fn insert_request(&self, id: RequestId, entry: &WithdrawalRequest) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        if inner.requests.contains_key(&id) {
            return Err(StorageError::Duplicate(format!("request {id}")));
        }
        inner.requests.insert(id, entry.clone());
        Ok(())
    }

    async fn mark_claimed(&self, id: RequestId) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        match inner.requests.get_mut(&id) {
            Some(entry) => {
                entry.claimed = true;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("request {id}"))),
        }
    }

    async fn set_request_owner(&self, id: RequestId, owner: Address) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        match inner.requests.get_mut(&id) {
            Some(entry) => {
                entry.owner = owner;
                Ok(())
            }
            None => Err(StorageError::NotFound(format!("request {id}"))),
        }
    }

    async fn insert_checkpoint(
        &self,
        index: CheckpointIndex,
        checkpoint: &Checkpoint,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        if inner.checkpoints.contains_key(&index) {
            return Err(StorageError::Duplicate(format!("checkpoint {index}")));
        }
        inner.checkpoints.insert(index, *checkpoint);
        Ok(())
    }

    async fn save_globals(&self, globals: &QueueGlobals) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.globals = Some(*globals);
        Ok(())
    }

    async fn set_token_approval(&self, id: RequestId, to: Address) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.token_approvals.insert(id, to);
        Ok(())
    }

    async fn clear_token_approval(&self, id: RequestId) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        inner.token_approvals.remove(&id);
        Ok(())
    }

    async fn set_operator_approval(
        &self,
        owner: Address,
        operator: Address,
        approved: bool,
    ) -> StorageResult<()> {
        let mut inner = self.inner.write().await;
        if approved {
            inner.operator_approvals.insert((owner, operator));
        } else {
            inner.operator_approvals.remove(&(owner, operator));
        }
        Ok(())
    }

    async fn load(&self) -> StorageResult<QueueSnapshot> {
        let inner = self.inner.read().await;

        // ids and indices must form contiguous 1.. runs
        for (i, id) in inner.requests.keys().enumerate() {
            if *id != (i + 1) as RequestId {
                return Err(StorageError::InvalidData(format!(
                    "request id gap: expected {}, found {id}",
                    i + 1
                )));
            }
        }
        for (i, idx) in inner.checkpoints.keys().enumerate() {
            if *idx != (i + 1) as CheckpointIndex {
                return Err(StorageError::InvalidData(format!(
                    "checkpoint index gap: expected {}, found {idx}",
                    i + 1
                )));
            }
        }

        Ok(QueueSnapshot {
            requests: inner.requests.values().cloned().collect(),
            checkpoints: inner.checkpoints.values().copied().collect(),
            globals: inner.globals.unwrap_or_default(),
            token_approvals: inner
                .token_approvals
                .iter()
                .map(|(&id, &to)| (id, to))
                .collect(),
            operator_approvals: inner.operator_approvals.iter().copied().collect(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn request(owner: Address) -> WithdrawalRequest {
        WithdrawalRequest {
            cumulative_value: 100,
            cumulative_shares: 100,
            owner,
            created_at: 1_700_000_000,
            claimed: false,
            report_timestamp: 0,
        }
    }

    #[tokio::test]
    async fn test_round_trip() {
        let store = MemoryQueueStore::new();
        store.insert_request(1, &request(addr(1))).await.unwrap();
        store
            .insert_checkpoint(1, &Checkpoint { from_request_id: 1, max_share_rate: 1 })
            .await
            .unwrap();
        store.mark_claimed(1).await.unwrap();

        let snapshot = store.load().await.unwrap();
        assert_eq!(snapshot.requests.len(), 1);
        assert!(snapshot.requests[0].claimed);
        assert_eq!(snapshot.checkpoints.len(), 1);
    }

    #[tokio::test]
    async fn test_duplicate_and_missing() {
        let store = MemoryQueueStore::new();
        store.insert_request(1, &request(addr(1))).await.unwrap();

        assert!(matches!(
            store.insert_request(1, &request(addr(1))).await,
            Err(StorageError::Duplicate(_))
        ));
        assert!(matches!(
            store.mark_claimed(2).await,
            Err(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_gap_detection() {
        let store = MemoryQueueStore::new();
        store.insert_request(3, &request(addr(1))).await.unwrap();
        assert!(matches!(store.load().await, Err(StorageError::InvalidData(_))));
    }
}
