//! Shared Types Module
//!
//! Data types shared across the exitq service.

pub mod request;
pub mod units;

/// Request ids are 1-based and strictly monotonic; 0 is never a valid id.
pub type RequestId = u64;

/// Checkpoint indices are 1-based; 0 is the NOT_FOUND sentinel.
pub type CheckpointIndex = u64;

/// Unix timestamp in seconds.
pub type Timestamp = u64;

/// Native-asset amount in wei.
pub type Wei = u128;

/// Pooled-token internal accounting units.
pub type SharesAmount = u128;

/// Share rate as unsigned fixed-point with 27 decimal places (wei per share).
pub type ShareRate = u128;

// Re-exports for convenience
pub use request::{
    Checkpoint, ClaimReceipt, FinalizeSummary, PrefinalizeResult, QueueInfo, WithdrawalRequest,
    WithdrawalRequestStatus,
};
pub use units::{
    ether, format_share_rate, format_with_commas, parse_eth, wei_to_eth_string,
    SHARE_RATE_PRECISION, WEI_PER_ETH,
};
