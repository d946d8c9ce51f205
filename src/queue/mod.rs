//! Withdrawal Queue Core
//!
//! The redemption state machine: an append-only ledger of withdrawal
//! requests with prefix-sum accounting, rate-aware batched finalization and
//! checkpoint-indexed claim resolution.
//!
//! # Flow
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     WITHDRAWAL FLOW                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │                                                                 │
//! │  1. Holder queues a redemption                                  │
//! │     └── create(owner, value, shares) -> id (mint)               │
//! │                                                                 │
//! │  2. Finalizer sizes the fundable prefix                         │
//! │     └── calculate_finalization_batches(rate, cutoff, budget)    │
//! │     └── resumable accumulator, rate-homogeneous boundaries      │
//! │                                                                 │
//! │  3. Finalizer previews, then locks value                        │
//! │     └── prefinalize(boundaries, rate) -> {value, shares}        │
//! │     └── finalize(boundaries, rate, value)                       │
//! │     └── one checkpoint per boundary                             │
//! │                                                                 │
//! │  4. Owner resolves a hint off the hot path                      │
//! │     └── find_checkpoint_hint(id, 1, last_checkpoint)            │
//! │                                                                 │
//! │  5. Owner (or approved party) claims                            │
//! │     └── claim(id, hint) -> min(value, shares x rate)            │
//! │     └── burns the claim, releases locked value                  │
//! │                                                                 │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```rust,ignore
//! use exitq::queue::{BatchAccumulator, QueueLimits, WithdrawalQueue};
//! use exitq::types::{ether, SHARE_RATE_PRECISION};
//!
//! let mut queue = WithdrawalQueue::new(QueueLimits::default());
//! let id = queue.create_request(user, user, ether(1), ether(1), now)?;
//!
//! let acc = queue.calculate_finalization_batches(
//!     SHARE_RATE_PRECISION,
//!     now,
//!     1000,
//!     BatchAccumulator::new(ether(1)),
//! )?;
//! let preview = queue.prefinalize(acc.boundaries(), SHARE_RATE_PRECISION)?;
//! queue.finalize(acc.boundaries(), SHARE_RATE_PRECISION, preview.value_to_lock, now)?;
//!
//! let hint = queue.find_checkpoint_hint(id, 1, queue.last_checkpoint_index())?;
//! queue.claim(user, id, hint.unwrap(), &mut vault)?;
//! ```

pub mod batching;
pub mod checkpoints;
pub mod ledger;
pub mod ownership;
pub mod pausable;
pub mod queue;

use alloy_primitives::Address;

use crate::types::{CheckpointIndex, RequestId, Wei};

// Re-exports
pub use batching::{BatchAccumulator, MAX_BATCHES_LENGTH};
pub use checkpoints::CheckpointHistory;
pub use ledger::{BatchValue, RequestLedger};
pub use ownership::OwnershipRegistry;
pub use pausable::{
    BunkerStatus, BunkerTransition, PauseError, PauseGate, BUNKER_MODE_DISABLED_TIMESTAMP,
    PAUSE_INFINITELY,
};
pub use queue::{
    QueueGlobals, QueueLimits, WithdrawalQueue, MAX_WITHDRAWAL_AMOUNT, MIN_WITHDRAWAL_AMOUNT,
};

/// Errors produced by the queue state machine.
///
/// Every failed call leaves the queue untouched; the variant carries the
/// offending id/value so callers can recompute and retry.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum QueueError {
    #[error("withdrawal amount too small: min {min} wei, got {got}")]
    AmountTooSmall { min: Wei, got: Wei },

    #[error("withdrawal amount too large: max {max} wei, got {got}")]
    AmountTooLarge { max: Wei, got: Wei },

    #[error("invalid request id: {0}")]
    InvalidRequestId(RequestId),

    #[error("invalid request id range: [{start}, {end}]")]
    InvalidRequestIdRange { start: u64, end: u64 },

    #[error("request ids are not sorted in ascending order")]
    RequestIdsNotSorted,

    #[error("empty batch list")]
    EmptyBatches,

    #[error("batch boundaries are not sorted in strictly ascending order")]
    BatchesAreNotSorted,

    #[error("zero share rate")]
    ZeroShareRate,

    #[error("zero recipient address")]
    ZeroRecipient,

    #[error("array length mismatch: expected {expected}, got {got}")]
    ArraysLengthMismatch { expected: usize, got: usize },

    #[error("batch calculation accumulator is spent or inconsistent")]
    InvalidState,

    #[error("request {0} not found or not finalized")]
    RequestNotFoundOrNotFinalized(RequestId),

    #[error("request {0} already claimed")]
    RequestAlreadyClaimed(RequestId),

    #[error("invalid checkpoint hint: {0}")]
    InvalidHint(CheckpointIndex),

    #[error("too much value to finalize: sent {sent} wei, needed {needed} wei")]
    TooMuchEtherToFinalize { sent: Wei, needed: Wei },

    #[error("not enough value to finalize: sent {sent} wei, needed {needed} wei")]
    NotEnoughEtherToFinalize { sent: Wei, needed: Wei },

    #[error("caller {caller} is not the owner of request {id} and not approved")]
    NotOwnerOrApproved { caller: Address, id: RequestId },

    #[error("caller {0} is not the owner and not approved for all")]
    NotOwnerOrApprovedForAll(Address),

    #[error("transfer from {from} does not match actual owner {owner}")]
    TransferFromIncorrectOwner { from: Address, owner: Address },

    #[error("transfer to the zero address")]
    TransferToZeroAddress,

    #[error("transfer to self")]
    TransferToThemselves,

    #[error("approval to the current owner")]
    ApprovalToOwner,

    #[error("setting operator approval for the caller itself")]
    ApproveToCaller,

    #[error("not enough reserved value to pay the claim")]
    NotEnoughEther,

    #[error("can't send value to {0}, recipient may have rejected it")]
    CantSendValue(Address),

    #[error("invalid report timestamp")]
    InvalidReportTimestamp,

    #[error("cumulative totals overflow")]
    ValueOverflow,

    #[error("{0}")]
    Pause(#[from] PauseError),
}
