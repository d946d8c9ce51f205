//! Storage Trait Definitions
//!
//! Abstract persistence interface for the withdrawal queue. Implementations
//! use SQLite (production) or in-memory (testing).
//!
//! The queue is append-heavy: requests and checkpoints are immutable once
//! written except for the `claimed` flag and the owner column, so the store
//! exposes narrow mutations instead of whole-row updates. `load` returns a
//! full snapshot; the in-memory queue is the source of truth at runtime.

use async_trait::async_trait;
use thiserror::Error;

use alloy_primitives::Address;

use crate::queue::QueueGlobals;
use crate::types::{Checkpoint, CheckpointIndex, RequestId, WithdrawalRequest};

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Duplicate record: {0}")]
    Duplicate(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Invalid data: {0}")]
    InvalidData(String),

    #[error("Connection error: {0}")]
    Connection(String),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Everything needed to rebuild the queue after a restart.
///
/// `requests` and `checkpoints` are in id/index order, sentinels excluded.
#[derive(Debug, Default)]
pub struct QueueSnapshot {
    pub requests: Vec<WithdrawalRequest>,
    pub checkpoints: Vec<Checkpoint>,
    pub globals: QueueGlobals,
    pub token_approvals: Vec<(RequestId, Address)>,
    pub operator_approvals: Vec<(Address, Address)>,
}

/// Queue storage interface
///
/// Implementations:
/// - `SqliteQueueStore` - Production storage with SQLite
/// - `MemoryQueueStore` - In-memory storage for testing
#[async_trait]
pub trait QueueStore: Send + Sync {
    /// Persist a freshly minted request row
    async fn insert_request(&self, id: RequestId, entry: &WithdrawalRequest) -> StorageResult<()>;

    /// Flip the claimed flag on an existing request
    async fn mark_claimed(&self, id: RequestId) -> StorageResult<()>;

    /// Rewrite the owner column after a transfer
    async fn set_request_owner(&self, id: RequestId, owner: Address) -> StorageResult<()>;

    /// Persist a finalization checkpoint
    async fn insert_checkpoint(
        &self,
        index: CheckpointIndex,
        checkpoint: &Checkpoint,
    ) -> StorageResult<()>;

    /// Upsert the single scalar-state row
    async fn save_globals(&self, globals: &QueueGlobals) -> StorageResult<()>;

    /// Upsert a per-token approval
    async fn set_token_approval(&self, id: RequestId, to: Address) -> StorageResult<()>;

    /// Remove a per-token approval; absent rows are fine
    async fn clear_token_approval(&self, id: RequestId) -> StorageResult<()>;

    /// Grant or revoke a blanket operator approval
    async fn set_operator_approval(
        &self,
        owner: Address,
        operator: Address,
        approved: bool,
    ) -> StorageResult<()>;

    /// Read the whole persisted state back
    async fn load(&self) -> StorageResult<QueueSnapshot>;
}
