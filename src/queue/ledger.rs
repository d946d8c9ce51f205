//! Request Ledger
//!
//! Append-only arena of withdrawal requests. Entry 0 is a zero sentinel;
//! real requests occupy indices 1..=last_request_id. Each entry stores
//! cumulative value/shares totals, so any contiguous range sums in O(1) by
//! subtraction.

use alloy_primitives::{Address, U256};

use crate::types::units::implied_rate;
use crate::types::{RequestId, SharesAmount, Timestamp, Wei, WithdrawalRequest, WithdrawalRequestStatus};

use super::QueueError;

/// Value, shares and floored implied share rate of a contiguous id range.
///
/// `share_rate` stays 256-bit wide: dust-share ranges can imply rates far
/// beyond the u128 fixed-point range, and the calculator only ever compares
/// it against a real rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchValue {
    pub share_rate: U256,
    pub value: Wei,
    pub shares: SharesAmount,
}

/// Append-only request store with prefix-sum accounting.
#[derive(Debug, Clone)]
pub struct RequestLedger {
    /// entries[0] is the sentinel; entries[id] is request `id`
    entries: Vec<WithdrawalRequest>,
    /// Highest id made claimable so far
    last_finalized: RequestId,
    /// Creation bounds in wei
    min_amount: Wei,
    max_amount: Wei,
}

impl RequestLedger {
    pub fn new(min_amount: Wei, max_amount: Wei) -> Self {
        Self {
            entries: vec![WithdrawalRequest::sentinel()],
            last_finalized: 0,
            min_amount,
            max_amount,
        }
    }

    /// Rebuild from persisted rows. `entries` must NOT include the sentinel;
    /// rows are expected in id order starting at 1.
    pub fn restore(
        entries: Vec<WithdrawalRequest>,
        last_finalized: RequestId,
        min_amount: Wei,
        max_amount: Wei,
    ) -> Self {
        let mut all = Vec::with_capacity(entries.len() + 1);
        all.push(WithdrawalRequest::sentinel());
        all.extend(entries);
        Self {
            entries: all,
            last_finalized,
            min_amount,
            max_amount,
        }
    }

    pub fn last_request_id(&self) -> RequestId {
        (self.entries.len() - 1) as RequestId
    }

    pub fn last_finalized_request_id(&self) -> RequestId {
        self.last_finalized
    }

    pub fn is_finalized(&self, id: RequestId) -> bool {
        id != 0 && id <= self.last_finalized
    }

    pub fn min_amount(&self) -> Wei {
        self.min_amount
    }

    pub fn max_amount(&self) -> Wei {
        self.max_amount
    }

    /// Requests in `(last_finalized, last_request]`
    pub fn unfinalized_request_count(&self) -> u64 {
        self.last_request_id() - self.last_finalized
    }

    pub fn unfinalized_value(&self) -> Wei {
        let tail = self.tail_totals();
        tail.0
    }

    pub fn unfinalized_shares(&self) -> SharesAmount {
        let tail = self.tail_totals();
        tail.1
    }

    fn tail_totals(&self) -> (Wei, SharesAmount) {
        let last = &self.entries[self.entries.len() - 1];
        let fin = &self.entries[self.last_finalized as usize];
        (
            last.cumulative_value - fin.cumulative_value,
            last.cumulative_shares - fin.cumulative_shares,
        )
    }

    pub(crate) fn validate_amount(&self, value: Wei) -> Result<(), QueueError> {
        if value < self.min_amount {
            return Err(QueueError::AmountTooSmall {
                min: self.min_amount,
                got: value,
            });
        }
        if value > self.max_amount {
            return Err(QueueError::AmountTooLarge {
                max: self.max_amount,
                got: value,
            });
        }
        Ok(())
    }

    /// Append a request and return its id.
    pub fn enqueue(
        &mut self,
        owner: Address,
        value: Wei,
        shares: SharesAmount,
        now: Timestamp,
        report_timestamp: Timestamp,
    ) -> Result<RequestId, QueueError> {
        self.validate_amount(value)?;

        let prev = &self.entries[self.entries.len() - 1];
        let cumulative_value = prev
            .cumulative_value
            .checked_add(value)
            .ok_or(QueueError::ValueOverflow)?;
        let cumulative_shares = prev
            .cumulative_shares
            .checked_add(shares)
            .ok_or(QueueError::ValueOverflow)?;

        self.entries.push(WithdrawalRequest {
            cumulative_value,
            cumulative_shares,
            owner,
            created_at: now,
            claimed: false,
            report_timestamp,
        });
        Ok(self.last_request_id())
    }

    /// Advance the finalized cursor. Callers validate the target.
    pub(crate) fn set_last_finalized(&mut self, id: RequestId) {
        debug_assert!(id >= self.last_finalized && id <= self.last_request_id());
        self.last_finalized = id;
    }

    pub fn entry(&self, id: RequestId) -> Result<&WithdrawalRequest, QueueError> {
        if id == 0 || id > self.last_request_id() {
            return Err(QueueError::InvalidRequestId(id));
        }
        Ok(&self.entries[id as usize])
    }

    pub(crate) fn entry_mut(&mut self, id: RequestId) -> Result<&mut WithdrawalRequest, QueueError> {
        if id == 0 || id > self.last_request_id() {
            return Err(QueueError::InvalidRequestId(id));
        }
        Ok(&mut self.entries[id as usize])
    }

    /// Per-request amounts, recovered from the cumulative totals.
    pub fn amounts_of(&self, id: RequestId) -> Result<(Wei, SharesAmount), QueueError> {
        let entry = self.entry(id)?;
        let prev = &self.entries[(id - 1) as usize];
        Ok((
            entry.cumulative_value - prev.cumulative_value,
            entry.cumulative_shares - prev.cumulative_shares,
        ))
    }

    pub fn status(&self, id: RequestId) -> Result<WithdrawalRequestStatus, QueueError> {
        let entry = self.entry(id)?;
        let (amount_of_value, amount_of_shares) = self.amounts_of(id)?;
        Ok(WithdrawalRequestStatus {
            id,
            owner: entry.owner,
            amount_of_value,
            amount_of_shares,
            created_at: entry.created_at,
            is_finalized: self.is_finalized(id),
            is_claimed: entry.claimed,
        })
    }

    /// O(1) sum of value/shares over `[from, to]`.
    pub fn range_sum(&self, from: RequestId, to: RequestId) -> Result<(Wei, SharesAmount), QueueError> {
        if from == 0 || from > to || to > self.last_request_id() {
            return Err(QueueError::InvalidRequestIdRange { start: from, end: to });
        }
        let lo = &self.entries[(from - 1) as usize];
        let hi = &self.entries[to as usize];
        Ok((
            hi.cumulative_value - lo.cumulative_value,
            hi.cumulative_shares - lo.cumulative_shares,
        ))
    }

    /// Value/shares/implied-rate of `(pre_start, end]`, the calculator's and
    /// resolver's shared primitive. `pre_start` is the id just before the
    /// range (0 anchors at the sentinel). Bounds are the caller's contract.
    pub(crate) fn batch_value(&self, pre_start: RequestId, end: RequestId) -> BatchValue {
        debug_assert!(pre_start < end && end <= self.last_request_id());
        let lo = &self.entries[pre_start as usize];
        let hi = &self.entries[end as usize];
        let value = hi.cumulative_value - lo.cumulative_value;
        let shares = hi.cumulative_shares - lo.cumulative_shares;
        // zero-share ranges rate as infinitely discounted
        let share_rate = if shares == 0 {
            U256::MAX
        } else {
            implied_rate(value, shares)
        };
        BatchValue {
            share_rate,
            value,
            shares,
        }
    }

    /// All stored requests in id order, sentinel excluded.
    pub fn entries(&self) -> &[WithdrawalRequest] {
        &self.entries[1..]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::units::{ether, SHARE_RATE_PRECISION};

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn ledger() -> RequestLedger {
        RequestLedger::new(100, ether(1000))
    }

    #[test]
    fn test_enqueue_assigns_sequential_ids() {
        let mut ledger = ledger();
        assert_eq!(ledger.last_request_id(), 0);

        let id1 = ledger.enqueue(addr(1), ether(1), ether(1), 10, 0).unwrap();
        let id2 = ledger.enqueue(addr(2), ether(2), ether(2), 11, 0).unwrap();
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
        assert_eq!(ledger.last_request_id(), 2);
        assert_eq!(ledger.unfinalized_request_count(), 2);
    }

    #[test]
    fn test_cumulative_deltas_match_amounts() {
        let mut ledger = ledger();
        let amounts = [ether(1), 100, ether(3) / 2, ether(1000)];
        for (i, &value) in amounts.iter().enumerate() {
            ledger.enqueue(addr(1), value, value / 2, i as u64, 0).unwrap();
        }
        for (i, &value) in amounts.iter().enumerate() {
            let id = (i + 1) as RequestId;
            let (got_value, got_shares) = ledger.amounts_of(id).unwrap();
            assert_eq!(got_value, value);
            assert_eq!(got_shares, value / 2);
        }
    }

    #[test]
    fn test_amount_bounds() {
        let mut ledger = ledger();
        assert!(matches!(
            ledger.enqueue(addr(1), 99, 99, 0, 0),
            Err(QueueError::AmountTooSmall { min: 100, got: 99 })
        ));
        assert!(matches!(
            ledger.enqueue(addr(1), ether(1000) + 1, 1, 0, 0),
            Err(QueueError::AmountTooLarge { .. })
        ));
        // bounds are inclusive
        ledger.enqueue(addr(1), 100, 100, 0, 0).unwrap();
        ledger.enqueue(addr(1), ether(1000), ether(1000), 0, 0).unwrap();
    }

    #[test]
    fn test_status_flags() {
        let mut ledger = ledger();
        ledger.enqueue(addr(1), ether(1), ether(1), 42, 7).unwrap();
        ledger.enqueue(addr(2), ether(2), ether(2), 43, 7).unwrap();

        let status = ledger.status(1).unwrap();
        assert_eq!(status.owner, addr(1));
        assert_eq!(status.amount_of_value, ether(1));
        assert_eq!(status.created_at, 42);
        assert!(!status.is_finalized);
        assert!(!status.is_claimed);

        ledger.set_last_finalized(1);
        assert!(ledger.status(1).unwrap().is_finalized);
        assert!(!ledger.status(2).unwrap().is_finalized);
        assert_eq!(ledger.unfinalized_request_count(), 1);
        assert_eq!(ledger.unfinalized_value(), ether(2));
    }

    #[test]
    fn test_status_invalid_ids() {
        let mut ledger = ledger();
        ledger.enqueue(addr(1), ether(1), ether(1), 0, 0).unwrap();

        assert!(matches!(ledger.status(0), Err(QueueError::InvalidRequestId(0))));
        assert!(matches!(ledger.status(2), Err(QueueError::InvalidRequestId(2))));
    }

    #[test]
    fn test_range_sum() {
        let mut ledger = ledger();
        for i in 1..=5u128 {
            ledger.enqueue(addr(1), i * ether(1), i * ether(1) / 2, 0, 0).unwrap();
        }
        // 2 + 3 + 4 ether
        assert_eq!(ledger.range_sum(2, 4).unwrap(), (ether(9), ether(9) / 2));
        assert_eq!(ledger.range_sum(1, 5).unwrap(), (ether(15), ether(15) / 2));
        assert_eq!(ledger.range_sum(3, 3).unwrap(), (ether(3), ether(3) / 2));

        assert!(matches!(
            ledger.range_sum(0, 3),
            Err(QueueError::InvalidRequestIdRange { .. })
        ));
        assert!(matches!(
            ledger.range_sum(4, 2),
            Err(QueueError::InvalidRequestIdRange { .. })
        ));
        assert!(matches!(
            ledger.range_sum(1, 6),
            Err(QueueError::InvalidRequestIdRange { .. })
        ));
    }

    #[test]
    fn test_batch_value_rates() {
        let mut ledger = ledger();
        // 1 ETH at rate 1.0, then 1 ETH at rate 2.0 (half the shares)
        ledger.enqueue(addr(1), ether(1), ether(1), 0, 0).unwrap();
        ledger.enqueue(addr(1), ether(1), ether(1) / 2, 0, 0).unwrap();

        let first = ledger.batch_value(0, 1);
        assert_eq!(first.share_rate, U256::from(SHARE_RATE_PRECISION));
        assert_eq!(first.value, ether(1));

        let second = ledger.batch_value(1, 2);
        assert_eq!(second.share_rate, U256::from(2 * SHARE_RATE_PRECISION));

        // combined range rate lands between the two
        let both = ledger.batch_value(0, 2);
        assert_eq!(both.value, ether(2));
        assert_eq!(both.shares, ether(3) / 2);
        assert!(both.share_rate > first.share_rate && both.share_rate < second.share_rate);
    }

    #[test]
    fn test_restore_round_trip() {
        let mut ledger = ledger();
        ledger.enqueue(addr(1), ether(1), ether(1), 1, 0).unwrap();
        ledger.enqueue(addr(2), ether(2), ether(2), 2, 0).unwrap();
        ledger.set_last_finalized(1);

        let rebuilt = RequestLedger::restore(ledger.entries().to_vec(), 1, 100, ether(1000));
        assert_eq!(rebuilt.last_request_id(), 2);
        assert_eq!(rebuilt.last_finalized_request_id(), 1);
        assert_eq!(rebuilt.status(2).unwrap(), ledger.status(2).unwrap());
    }
}
