//! exitq - Liquid-Staking Withdrawal Queue Backend
//!
//! An append-only withdrawal request ledger with prefix-sum accounting,
//! rate-aware batch finalization and checkpoint-indexed O(1) claims.
//!
//! ## Components
//!
//! 1. **Queue Core** (`queue`) - The pure state machine: request ledger,
//!    batch calculator, checkpoint index, ownership registry and lifecycle
//!    controller
//! 2. **Service** (`service`) - Role-gated async wrapper, oracle intake,
//!    finalization daemon, persistence
//! 3. **REST API** (`api`) - HTTP surface over the service
//! 4. **Storage** (`storage`) - SQLite (production) and in-memory (tests)
//!
//! ## Flow
//!
//! Holders queue redemption requests; an oracle reports the share rate and
//! spendable budget; the finalization daemon sizes rate-homogeneous batches
//! under that budget and locks value for them; owners claim at
//! `min(requested value, shares x finalization rate)` with an O(1)
//! checkpoint hint.

pub mod api;
pub mod config;
pub mod logging;
pub mod queue;
pub mod service;
pub mod storage;
pub mod types;
pub mod vault;

// Re-exports: Queue core
pub use queue::{
    BatchAccumulator, QueueError, QueueGlobals, QueueLimits, WithdrawalQueue,
    MAX_BATCHES_LENGTH, MAX_WITHDRAWAL_AMOUNT, MIN_WITHDRAWAL_AMOUNT, PAUSE_INFINITELY,
};

// Re-exports: Service
pub use service::{
    parse_address, AccessPolicy, OracleSnapshot, Role, ServiceError, TickResult,
    WithdrawalService,
};

// Re-exports: Storage
pub use storage::{MemoryQueueStore, QueueSnapshot, QueueStore, SqliteQueueStore, StorageError};

// Re-exports: Types
pub use types::{
    Checkpoint, CheckpointIndex, ClaimReceipt, FinalizeSummary, PrefinalizeResult, QueueInfo,
    RequestId, ShareRate, SharesAmount, Timestamp, Wei, WithdrawalRequest,
    WithdrawalRequestStatus,
};

// Re-exports: Vault seams
pub use vault::{PooledToken, SimulatedPooledToken, SimulatedVault, ValueSink};
