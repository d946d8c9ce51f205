//! Finalization Batch Calculator
//!
//! Sizes the maximal prefix of unfinalized requests fundable within a wei
//! budget at a given finalization rate, split into batches that resolve
//! uniformly (all discounted or all nominal) under that rate. The scan is
//! resumable: callers pass the accumulator back in until `finished`.

use alloy_primitives::U256;

use crate::types::units::share_value;
use crate::types::{RequestId, ShareRate, Timestamp, Wei};

use super::ledger::RequestLedger;
use super::QueueError;

/// Hard cap on batches sized in one finalization round.
pub const MAX_BATCHES_LENGTH: usize = 36;

/// Resumable scan state for [`calculate_finalization_batches`].
///
/// `boundaries` holds the last request id of each sized batch, ascending.
/// A spent accumulator (`finished` or zero budget) is rejected if resubmitted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchAccumulator {
    /// Wei still available for further batches
    pub remaining_budget: Wei,
    /// Set once the scan stopped for any reason other than the per-call
    /// request allowance
    pub finished: bool,
    /// Last id of each batch, ascending
    pub boundaries: Vec<RequestId>,
}

impl BatchAccumulator {
    pub fn new(budget: Wei) -> Self {
        Self {
            remaining_budget: budget,
            finished: false,
            boundaries: Vec::new(),
        }
    }

    /// Highest id consumed by the scan so far
    pub fn processed_up_to(&self) -> Option<RequestId> {
        self.boundaries.last().copied()
    }

    pub fn boundaries(&self) -> &[RequestId] {
        &self.boundaries
    }

    pub fn is_empty(&self) -> bool {
        self.boundaries.is_empty()
    }
}

/// Scan the unfinalized tail in id order, extending or cutting batches.
///
/// A request joins the running batch when it shares the previous request's
/// report timestamp (created under one rate) or falls in the same rate
/// regime relative to `max_share_rate`; otherwise it opens a new boundary.
/// The scan stops on: a request created after `max_timestamp`, a payout that
/// would exceed the remaining budget (budget left untouched), the batch cap,
/// the per-call allowance, or the end of the tail. All but the per-call
/// allowance mark the accumulator `finished`.
pub fn calculate_finalization_batches(
    ledger: &RequestLedger,
    max_share_rate: ShareRate,
    max_timestamp: Timestamp,
    max_requests_per_call: u64,
    mut state: BatchAccumulator,
) -> Result<BatchAccumulator, QueueError> {
    if state.finished || state.remaining_budget == 0 {
        return Err(QueueError::InvalidState);
    }
    if max_share_rate == 0 {
        return Err(QueueError::ZeroShareRate);
    }

    let last_request_id = ledger.last_request_id();
    let rate_wide = U256::from(max_share_rate);

    // resume after the last boundary, seeding the previous request's own rate
    let (mut current_id, mut prev_share_rate) = match state.boundaries.last() {
        None => (ledger.last_finalized_request_id() + 1, U256::ZERO),
        Some(&boundary) => (boundary + 1, ledger.batch_value(boundary - 1, boundary).share_rate),
    };

    let next_call_request_id = current_id.saturating_add(max_requests_per_call);

    while current_id <= last_request_id && current_id < next_call_request_id {
        let request = ledger.entry(current_id)?;
        if request.created_at > max_timestamp {
            break;
        }

        let batch = ledger.batch_value(current_id - 1, current_id);
        let payout = if batch.share_rate > rate_wide {
            share_value(batch.shares, max_share_rate)
        } else {
            batch.value
        };
        if payout > state.remaining_budget {
            break;
        }
        state.remaining_budget -= payout;

        let extend_batch = match state.boundaries.last() {
            None => false,
            Some(_) => {
                // current_id >= 2 whenever a boundary exists
                let prev = ledger.entry(current_id - 1)?;
                let same_regime = (prev_share_rate <= rate_wide && batch.share_rate <= rate_wide)
                    || (prev_share_rate > rate_wide && batch.share_rate > rate_wide);
                prev.report_timestamp == request.report_timestamp || same_regime
            }
        };
        if extend_batch {
            if let Some(last) = state.boundaries.last_mut() {
                *last = current_id;
            }
        } else {
            if state.boundaries.len() == MAX_BATCHES_LENGTH {
                break;
            }
            state.boundaries.push(current_id);
        }

        prev_share_rate = batch.share_rate;
        current_id += 1;
    }

    state.finished = current_id > last_request_id || current_id < next_call_request_id;
    Ok(state)
}
