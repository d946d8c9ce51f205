//! Withdrawal Queue Types
//!
//! Stored queue entries, checkpoints and the read-side views derived from
//! them.

use alloy_primitives::Address;
use serde::{Deserialize, Serialize};

use super::units::wei_to_eth_string;
use super::{CheckpointIndex, RequestId, ShareRate, SharesAmount, Timestamp, Wei};

/// A stored withdrawal request.
///
/// The queue keeps running totals instead of per-request amounts: entry `i`
/// holds the sum of all requested value/shares through id `i`, and the
/// request's own amounts are recovered by subtracting entry `i - 1`. Entry 0
/// is an all-zero sentinel that anchors the subtraction for id 1.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequest {
    /// Sum of requested value (wei) through this request
    pub cumulative_value: Wei,
    /// Sum of pooled-token shares through this request
    pub cumulative_shares: SharesAmount,
    /// Current owner of the claim
    pub owner: Address,
    /// Timestamp when the request was created
    pub created_at: Timestamp,
    /// One-way claimed flag
    pub claimed: bool,
    /// The protocol's last oracle-report timestamp at creation time.
    /// Requests sharing this value were created under one share rate.
    pub report_timestamp: Timestamp,
}

impl WithdrawalRequest {
    /// The zero entry stored at index 0
    pub fn sentinel() -> Self {
        Self {
            cumulative_value: 0,
            cumulative_shares: 0,
            owner: Address::ZERO,
            created_at: 0,
            claimed: true,
            report_timestamp: 0,
        }
    }
}

/// A finalization checkpoint: one rate for one contiguous id range.
///
/// Checkpoint `i` covers `[from_request_id, next checkpoint's from - 1]`
/// (or through the last finalized id for the newest checkpoint). Index 0 is
/// a zero sentinel; real checkpoints start at index 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// First request id this checkpoint governs
    pub from_request_id: RequestId,
    /// Finalization rate applied to the whole range
    pub max_share_rate: ShareRate,
}

impl Checkpoint {
    /// The zero entry stored at index 0
    pub fn sentinel() -> Self {
        Self {
            from_request_id: 0,
            max_share_rate: 0,
        }
    }
}

/// Point-in-time view of a single request
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRequestStatus {
    pub id: RequestId,
    pub owner: Address,
    /// Requested redemption value in wei
    pub amount_of_value: Wei,
    /// Pooled-token shares fixed at creation
    pub amount_of_shares: SharesAmount,
    pub created_at: Timestamp,
    pub is_finalized: bool,
    pub is_claimed: bool,
}

impl WithdrawalRequestStatus {
    pub fn phase(&self) -> &'static str {
        if self.is_claimed {
            "claimed"
        } else if self.is_finalized {
            "finalized"
        } else {
            "pending"
        }
    }
}

impl std::fmt::Display for WithdrawalRequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "request #{}: {} ETH for {} [{}]",
            self.id,
            wei_to_eth_string(self.amount_of_value),
            self.owner,
            self.phase()
        )
    }
}

/// Preview of a finalization: what it would lock and burn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrefinalizeResult {
    /// Wei that must accompany the finalization
    pub value_to_lock: Wei,
    /// Pooled-token shares the protocol retires
    pub shares_to_burn: SharesAmount,
}

/// Outcome of an executed finalization, for logging and share-burn
/// accounting by the token collaborator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FinalizeSummary {
    /// First id made claimable by this call
    pub from_request_id: RequestId,
    /// Last id made claimable by this call
    pub to_request_id: RequestId,
    pub value_locked: Wei,
    pub shares_burned: SharesAmount,
    /// Checkpoints appended (one per batch boundary)
    pub checkpoints_added: u64,
}

/// Outcome of a paid claim
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClaimReceipt {
    pub request_id: RequestId,
    pub owner: Address,
    pub recipient: Address,
    /// Wei paid out
    pub amount: Wei,
}

/// One-shot queue summary
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueInfo {
    pub last_request_id: RequestId,
    pub last_finalized_request_id: RequestId,
    pub last_checkpoint_index: CheckpointIndex,
    /// Wei reserved for finalized-but-unclaimed requests
    pub locked_value: Wei,
    pub unfinalized_requests: u64,
    pub unfinalized_value: Wei,
    pub is_paused: bool,
    pub is_bunker_mode: bool,
}

impl std::fmt::Display for QueueInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "requests: {} total | {} finalized | {} pending ({} ETH) | {} ETH locked | {} checkpoints{}{}",
            self.last_request_id,
            self.last_finalized_request_id,
            self.unfinalized_requests,
            wei_to_eth_string(self.unfinalized_value),
            wei_to_eth_string(self.locked_value),
            self.last_checkpoint_index,
            if self.is_paused { " | PAUSED" } else { "" },
            if self.is_bunker_mode { " | BUNKER" } else { "" },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_phase() {
        let mut status = WithdrawalRequestStatus {
            id: 1,
            owner: Address::repeat_byte(0x11),
            amount_of_value: 100,
            amount_of_shares: 100,
            created_at: 0,
            is_finalized: false,
            is_claimed: false,
        };
        assert_eq!(status.phase(), "pending");
        status.is_finalized = true;
        assert_eq!(status.phase(), "finalized");
        status.is_claimed = true;
        assert_eq!(status.phase(), "claimed");
    }

    #[test]
    fn test_queue_info_display() {
        let info = QueueInfo {
            last_request_id: 5,
            last_finalized_request_id: 3,
            unfinalized_requests: 2,
            is_paused: true,
            ..Default::default()
        };
        let rendered = info.to_string();
        assert!(rendered.contains("5 total"));
        assert!(rendered.contains("PAUSED"));
        assert!(!rendered.contains("BUNKER"));
    }
}
