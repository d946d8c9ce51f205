//! Withdrawal Queue Facade
//!
//! Composes the request ledger, batch calculator, checkpoint index,
//! ownership registry and lifecycle controller into the single state machine
//! the service exposes. Every mutating call validates first and mutates last,
//! so a failed precondition leaves the queue untouched; the claim payout goes
//! through the vault sink before any state change for the same reason.

use alloy_primitives::{Address, U256};
use tracing::{debug, info};

use crate::types::units::share_value;
use crate::types::{
    Checkpoint, CheckpointIndex, ClaimReceipt, FinalizeSummary, PrefinalizeResult, QueueInfo,
    RequestId, ShareRate, SharesAmount, Timestamp, Wei, WithdrawalRequest, WithdrawalRequestStatus,
};
use crate::vault::{SendValueError, ValueSink};

use super::batching::{calculate_finalization_batches, BatchAccumulator};
use super::checkpoints::CheckpointHistory;
use super::ledger::RequestLedger;
use super::ownership::OwnershipRegistry;
use super::pausable::{BunkerStatus, BunkerTransition, PauseGate, BUNKER_MODE_DISABLED_TIMESTAMP};
use super::QueueError;

/// Smallest accepted withdrawal, in wei.
pub const MIN_WITHDRAWAL_AMOUNT: Wei = 100;

/// Largest accepted withdrawal, in wei (1000 ether).
pub const MAX_WITHDRAWAL_AMOUNT: Wei = 1000 * crate::types::units::WEI_PER_ETH;

/// Per-request creation bounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueLimits {
    pub min_amount: Wei,
    pub max_amount: Wei,
}

impl Default for QueueLimits {
    fn default() -> Self {
        Self {
            min_amount: MIN_WITHDRAWAL_AMOUNT,
            max_amount: MAX_WITHDRAWAL_AMOUNT,
        }
    }
}

/// Persisted scalar state, for the storage layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueGlobals {
    pub last_finalized_request_id: RequestId,
    pub locked_value: Wei,
    pub resume_since_timestamp: Timestamp,
    pub bunker_mode_since_timestamp: Timestamp,
    pub last_report_timestamp: Timestamp,
}

impl Default for QueueGlobals {
    fn default() -> Self {
        Self {
            last_finalized_request_id: 0,
            locked_value: 0,
            resume_since_timestamp: 0,
            bunker_mode_since_timestamp: BUNKER_MODE_DISABLED_TIMESTAMP,
            last_report_timestamp: 0,
        }
    }
}

/// The withdrawal queue state machine.
pub struct WithdrawalQueue {
    ledger: RequestLedger,
    checkpoints: CheckpointHistory,
    ownership: OwnershipRegistry,
    pause: PauseGate,
    bunker: BunkerStatus,
    /// Wei reserved for finalized-but-unclaimed requests
    locked_value: Wei,
}

impl Default for WithdrawalQueue {
    fn default() -> Self {
        Self::new(QueueLimits::default())
    }
}

impl WithdrawalQueue {
    pub fn new(limits: QueueLimits) -> Self {
        Self {
            ledger: RequestLedger::new(limits.min_amount, limits.max_amount),
            checkpoints: CheckpointHistory::new(),
            ownership: OwnershipRegistry::new(),
            pause: PauseGate::new(),
            bunker: BunkerStatus::new(),
            locked_value: 0,
        }
    }

    /// Rebuild from persisted rows. The ownership index is rederived from
    /// unclaimed request entries; approvals are re-applied by the caller.
    pub fn restore(
        limits: QueueLimits,
        requests: Vec<WithdrawalRequest>,
        checkpoints: Vec<Checkpoint>,
        globals: QueueGlobals,
    ) -> Self {
        let ledger = RequestLedger::restore(
            requests,
            globals.last_finalized_request_id,
            limits.min_amount,
            limits.max_amount,
        );
        let mut ownership = OwnershipRegistry::new();
        for (i, entry) in ledger.entries().iter().enumerate() {
            if !entry.claimed {
                ownership.track(entry.owner, (i + 1) as RequestId);
            }
        }
        Self {
            ledger,
            checkpoints: CheckpointHistory::restore(checkpoints),
            ownership,
            pause: PauseGate::restore(globals.resume_since_timestamp),
            bunker: BunkerStatus::restore(
                globals.bunker_mode_since_timestamp,
                globals.last_report_timestamp,
            ),
            locked_value: globals.locked_value,
        }
    }

    // ------------------------------------------------------------------
    // Creation
    // ------------------------------------------------------------------

    /// Queue one redemption request and mint the claim to `owner` (or to
    /// `caller` when the zero address is given). Gated by pause.
    pub fn create_request(
        &mut self,
        caller: Address,
        owner: Address,
        amount_of_value: Wei,
        amount_of_shares: SharesAmount,
        now: Timestamp,
    ) -> Result<RequestId, QueueError> {
        self.pause.check_resumed(now)?;
        let owner = if owner == Address::ZERO { caller } else { owner };
        let id = self.ledger.enqueue(
            owner,
            amount_of_value,
            amount_of_shares,
            now,
            self.bunker.last_report_timestamp(),
        )?;
        self.ownership.track(owner, id);
        debug!(
            target: "exitq::queue",
            id,
            %owner,
            value = amount_of_value,
            shares = amount_of_shares,
            "withdrawal request created"
        );
        Ok(id)
    }

    /// Batch creation: all amounts are validated before any is appended, so
    /// the call either mints every request or none.
    pub fn create_batch(
        &mut self,
        caller: Address,
        owner: Address,
        amounts: &[(Wei, SharesAmount)],
        now: Timestamp,
    ) -> Result<Vec<RequestId>, QueueError> {
        self.pause.check_resumed(now)?;
        for &(value, _) in amounts {
            self.ledger.validate_amount(value)?;
        }
        let mut ids = Vec::with_capacity(amounts.len());
        for &(value, shares) in amounts {
            ids.push(self.create_request(caller, owner, value, shares, now)?);
        }
        Ok(ids)
    }

    // ------------------------------------------------------------------
    // Read views
    // ------------------------------------------------------------------

    pub fn status(&self, id: RequestId) -> Result<WithdrawalRequestStatus, QueueError> {
        self.ledger.status(id)
    }

    pub fn statuses(&self, ids: &[RequestId]) -> Result<Vec<WithdrawalRequestStatus>, QueueError> {
        ids.iter().map(|&id| self.ledger.status(id)).collect()
    }

    pub fn range_sum(&self, from: RequestId, to: RequestId) -> Result<(Wei, SharesAmount), QueueError> {
        self.ledger.range_sum(from, to)
    }

    pub fn last_request_id(&self) -> RequestId {
        self.ledger.last_request_id()
    }

    pub fn last_finalized_request_id(&self) -> RequestId {
        self.ledger.last_finalized_request_id()
    }

    pub fn last_checkpoint_index(&self) -> CheckpointIndex {
        self.checkpoints.last_checkpoint_index()
    }

    pub fn locked_value(&self) -> Wei {
        self.locked_value
    }

    pub fn unfinalized_request_count(&self) -> u64 {
        self.ledger.unfinalized_request_count()
    }

    pub fn unfinalized_value(&self) -> Wei {
        self.ledger.unfinalized_value()
    }

    pub fn unfinalized_shares(&self) -> SharesAmount {
        self.ledger.unfinalized_shares()
    }

    pub fn info(&self, now: Timestamp) -> QueueInfo {
        QueueInfo {
            last_request_id: self.last_request_id(),
            last_finalized_request_id: self.last_finalized_request_id(),
            last_checkpoint_index: self.last_checkpoint_index(),
            locked_value: self.locked_value,
            unfinalized_requests: self.unfinalized_request_count(),
            unfinalized_value: self.unfinalized_value(),
            is_paused: self.pause.is_paused(now),
            is_bunker_mode: self.bunker.is_active(),
        }
    }

    // ------------------------------------------------------------------
    // Finalization
    // ------------------------------------------------------------------

    /// Size the fundable prefix of the unfinalized tail. Pure; see
    /// [`calculate_finalization_batches`].
    pub fn calculate_finalization_batches(
        &self,
        max_share_rate: ShareRate,
        max_timestamp: Timestamp,
        max_requests_per_call: u64,
        state: BatchAccumulator,
    ) -> Result<BatchAccumulator, QueueError> {
        calculate_finalization_batches(
            &self.ledger,
            max_share_rate,
            max_timestamp,
            max_requests_per_call,
            state,
        )
    }

    /// Pure preview of what finalizing `boundaries` at `max_share_rate` would
    /// lock and burn. Idempotent given unchanged state.
    pub fn prefinalize(
        &self,
        boundaries: &[RequestId],
        max_share_rate: ShareRate,
    ) -> Result<PrefinalizeResult, QueueError> {
        if max_share_rate == 0 {
            return Err(QueueError::ZeroShareRate);
        }
        if boundaries.is_empty() {
            return Err(QueueError::EmptyBatches);
        }
        let first = boundaries[0];
        let last = boundaries[boundaries.len() - 1];
        if first <= self.ledger.last_finalized_request_id() {
            return Err(QueueError::InvalidRequestId(first));
        }
        if last > self.ledger.last_request_id() {
            return Err(QueueError::InvalidRequestId(last));
        }

        let rate_wide = U256::from(max_share_rate);
        let mut value_to_lock: Wei = 0;
        let mut shares_to_burn: SharesAmount = 0;
        let mut prev_end = self.ledger.last_finalized_request_id();
        for &end in boundaries {
            if end <= prev_end {
                return Err(QueueError::BatchesAreNotSorted);
            }
            let batch = self.ledger.batch_value(prev_end, end);
            let payout = if batch.share_rate > rate_wide {
                share_value(batch.shares, max_share_rate)
            } else {
                batch.value
            };
            value_to_lock = value_to_lock
                .checked_add(payout)
                .ok_or(QueueError::ValueOverflow)?;
            shares_to_burn = shares_to_burn
                .checked_add(batch.shares)
                .ok_or(QueueError::ValueOverflow)?;
            prev_end = end;
        }
        Ok(PrefinalizeResult {
            value_to_lock,
            shares_to_burn,
        })
    }

    /// Lock `value` for the requests up to the last boundary, appending one
    /// checkpoint per batch. `value` must equal the preview exactly. Gated by
    /// pause.
    pub fn finalize(
        &mut self,
        boundaries: &[RequestId],
        max_share_rate: ShareRate,
        value: Wei,
        now: Timestamp,
    ) -> Result<FinalizeSummary, QueueError> {
        self.pause.check_resumed(now)?;
        let preview = self.prefinalize(boundaries, max_share_rate)?;
        if value > preview.value_to_lock {
            return Err(QueueError::TooMuchEtherToFinalize {
                sent: value,
                needed: preview.value_to_lock,
            });
        }
        if value < preview.value_to_lock {
            return Err(QueueError::NotEnoughEtherToFinalize {
                sent: value,
                needed: preview.value_to_lock,
            });
        }

        let from_request_id = self.ledger.last_finalized_request_id() + 1;
        for &end in boundaries {
            let from = self.ledger.last_finalized_request_id() + 1;
            self.checkpoints.append(from, max_share_rate);
            self.ledger.set_last_finalized(end);
        }
        self.locked_value = self
            .locked_value
            .checked_add(value)
            .ok_or(QueueError::ValueOverflow)?;

        let summary = FinalizeSummary {
            from_request_id,
            to_request_id: self.ledger.last_finalized_request_id(),
            value_locked: value,
            shares_burned: preview.shares_to_burn,
            checkpoints_added: boundaries.len() as u64,
        };
        info!(
            target: "exitq::queue",
            from = summary.from_request_id,
            to = summary.to_request_id,
            value_locked = summary.value_locked,
            checkpoints = summary.checkpoints_added,
            "requests finalized"
        );
        Ok(summary)
    }

    // ------------------------------------------------------------------
    // Hints
    // ------------------------------------------------------------------

    /// Binary search for the checkpoint covering `id` within
    /// `[search_start, search_end]`. `None` means NOT_FOUND.
    pub fn find_checkpoint_hint(
        &self,
        id: RequestId,
        search_start: CheckpointIndex,
        search_end: CheckpointIndex,
    ) -> Result<Option<CheckpointIndex>, QueueError> {
        self.checkpoints.find_hint(
            id,
            search_start,
            search_end,
            self.ledger.last_finalized_request_id(),
            self.ledger.last_request_id(),
        )
    }

    /// Batch hint resolution over strictly ascending ids. Each found hint
    /// narrows the search window for the ids after it.
    pub fn find_checkpoint_hints(
        &self,
        ids: &[RequestId],
        search_start: CheckpointIndex,
        search_end: CheckpointIndex,
    ) -> Result<Vec<Option<CheckpointIndex>>, QueueError> {
        let mut hints = Vec::with_capacity(ids.len());
        let mut prev_id = 0;
        let mut start = search_start;
        for &id in ids {
            if id <= prev_id {
                return Err(QueueError::RequestIdsNotSorted);
            }
            let hint = self.checkpoints.find_hint(
                id,
                start,
                search_end,
                self.ledger.last_finalized_request_id(),
                self.ledger.last_request_id(),
            )?;
            if let Some(found) = hint {
                start = found;
            }
            hints.push(hint);
            prev_id = id;
        }
        Ok(hints)
    }

    // ------------------------------------------------------------------
    // Claims
    // ------------------------------------------------------------------

    /// Payout of `id` at its checkpoint rate, never more than requested.
    fn payout_of(&self, id: RequestId, checkpoint: &Checkpoint) -> Result<Wei, QueueError> {
        let (value, shares) = self.ledger.amounts_of(id)?;
        Ok(value.min(share_value(shares, checkpoint.max_share_rate)))
    }

    /// Validate a claim without touching state; returns (owner, payout).
    fn check_claim(
        &self,
        caller: Address,
        id: RequestId,
        hint: CheckpointIndex,
    ) -> Result<(Address, Wei), QueueError> {
        let entry = self.ledger.entry(id)?;
        if !self.ledger.is_finalized(id) {
            return Err(QueueError::RequestNotFoundOrNotFinalized(id));
        }
        if entry.claimed {
            return Err(QueueError::RequestAlreadyClaimed(id));
        }
        if !self.ownership.is_authorized(&caller, &entry.owner, id) {
            return Err(QueueError::NotOwnerOrApproved { caller, id });
        }
        let checkpoint = self.checkpoints.verify_hint(hint, id)?;
        let payout = self.payout_of(id, checkpoint)?;
        Ok((entry.owner, payout))
    }

    /// Claim a finalized request, paying the proceeds to its owner.
    pub fn claim(
        &mut self,
        caller: Address,
        id: RequestId,
        hint: CheckpointIndex,
        sink: &mut dyn ValueSink,
    ) -> Result<ClaimReceipt, QueueError> {
        let (owner, _) = self.check_claim(caller, id, hint)?;
        self.claim_to(caller, id, hint, owner, sink)
    }

    /// Claim with an explicit recipient. The payout goes through the sink
    /// before any state change; a rejected transfer aborts cleanly.
    pub fn claim_to(
        &mut self,
        caller: Address,
        id: RequestId,
        hint: CheckpointIndex,
        recipient: Address,
        sink: &mut dyn ValueSink,
    ) -> Result<ClaimReceipt, QueueError> {
        if recipient == Address::ZERO {
            return Err(QueueError::ZeroRecipient);
        }
        let (owner, payout) = self.check_claim(caller, id, hint)?;
        if payout > self.locked_value {
            return Err(QueueError::NotEnoughEther);
        }
        sink.send_value(recipient, payout).map_err(|e| match e {
            SendValueError::InsufficientBalance { .. } => QueueError::NotEnoughEther,
            SendValueError::Rejected(addr) => QueueError::CantSendValue(addr),
        })?;

        self.ledger.entry_mut(id)?.claimed = true;
        self.locked_value -= payout;
        self.ownership.untrack(owner, id);
        self.ownership.clear_approval(id);
        info!(
            target: "exitq::queue",
            id,
            %owner,
            %recipient,
            amount = payout,
            "claim paid"
        );
        Ok(ClaimReceipt {
            request_id: id,
            owner,
            recipient,
            amount: payout,
        })
    }

    /// Claim several requests in one call. Every (id, hint) pair is validated
    /// before the first payout, so queue-side failures leave nothing claimed;
    /// a sink rejection mid-sequence aborts the remainder.
    pub fn claim_batch(
        &mut self,
        caller: Address,
        ids: &[RequestId],
        hints: &[CheckpointIndex],
        sink: &mut dyn ValueSink,
    ) -> Result<Vec<ClaimReceipt>, QueueError> {
        if ids.len() != hints.len() {
            return Err(QueueError::ArraysLengthMismatch {
                expected: ids.len(),
                got: hints.len(),
            });
        }
        let mut total: Wei = 0;
        for (&id, &hint) in ids.iter().zip(hints) {
            let (_, payout) = self.check_claim(caller, id, hint)?;
            total = total.checked_add(payout).ok_or(QueueError::ValueOverflow)?;
        }
        if total > self.locked_value {
            return Err(QueueError::NotEnoughEther);
        }
        let mut receipts = Vec::with_capacity(ids.len());
        for (&id, &hint) in ids.iter().zip(hints) {
            receipts.push(self.claim(caller, id, hint, sink)?);
        }
        Ok(receipts)
    }

    /// Claimable wei per request. Input errors on bad ids; unfinalized or
    /// already-claimed requests report zero rather than an error.
    pub fn claimable_value(
        &self,
        ids: &[RequestId],
        hints: &[CheckpointIndex],
    ) -> Result<Vec<Wei>, QueueError> {
        if ids.len() != hints.len() {
            return Err(QueueError::ArraysLengthMismatch {
                expected: ids.len(),
                got: hints.len(),
            });
        }
        let mut values = Vec::with_capacity(ids.len());
        for (&id, &hint) in ids.iter().zip(hints) {
            let entry = self.ledger.entry(id)?;
            if !self.ledger.is_finalized(id) || entry.claimed {
                values.push(0);
                continue;
            }
            let checkpoint = self.checkpoints.verify_hint(hint, id)?;
            values.push(self.payout_of(id, checkpoint)?);
        }
        Ok(values)
    }

    // ------------------------------------------------------------------
    // Ownership surface
    // ------------------------------------------------------------------

    /// Owner of an unclaimed request.
    pub fn owner_of(&self, id: RequestId) -> Result<Address, QueueError> {
        let entry = self.ledger.entry(id)?;
        if entry.claimed {
            return Err(QueueError::RequestAlreadyClaimed(id));
        }
        Ok(entry.owner)
    }

    /// Transfer an unclaimed claim from `from` to `to`. Clears the per-token
    /// approval.
    pub fn transfer(
        &mut self,
        caller: Address,
        from: Address,
        to: Address,
        id: RequestId,
    ) -> Result<(), QueueError> {
        if to == Address::ZERO {
            return Err(QueueError::TransferToZeroAddress);
        }
        if to == from {
            return Err(QueueError::TransferToThemselves);
        }
        let owner = self.owner_of(id)?;
        if from != owner {
            return Err(QueueError::TransferFromIncorrectOwner { from, owner });
        }
        if !self.ownership.is_authorized(&caller, &owner, id) {
            return Err(QueueError::NotOwnerOrApproved { caller, id });
        }

        self.ownership.clear_approval(id);
        self.ledger.entry_mut(id)?.owner = to;
        self.ownership.move_between(from, to, id);
        debug!(target: "exitq::queue", id, %from, %to, "request transferred");
        Ok(())
    }

    /// Grant (or clear, via the zero address) the single per-token approval.
    pub fn approve(
        &mut self,
        caller: Address,
        to: Address,
        id: RequestId,
    ) -> Result<(), QueueError> {
        let owner = self.owner_of(id)?;
        if to == owner {
            return Err(QueueError::ApprovalToOwner);
        }
        if caller != owner && !self.ownership.is_approved_for_all(&owner, &caller) {
            return Err(QueueError::NotOwnerOrApprovedForAll(caller));
        }
        if to == Address::ZERO {
            self.ownership.clear_approval(id);
        } else {
            self.ownership.approve(id, to);
        }
        Ok(())
    }

    pub fn approved_for(&self, id: RequestId) -> Result<Option<Address>, QueueError> {
        self.owner_of(id)?;
        Ok(self.ownership.approval_of(id))
    }

    pub fn set_approval_for_all(
        &mut self,
        caller: Address,
        operator: Address,
        approved: bool,
    ) -> Result<(), QueueError> {
        if operator == caller {
            return Err(QueueError::ApproveToCaller);
        }
        self.ownership.set_operator(caller, operator, approved);
        Ok(())
    }

    pub fn is_approved_for_all(&self, owner: Address, operator: Address) -> bool {
        self.ownership.is_approved_for_all(&owner, &operator)
    }

    /// Unclaimed request ids owned by `owner`, unordered.
    pub fn requests_by_owner(&self, owner: Address) -> Vec<RequestId> {
        self.ownership.owned_by(&owner)
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    pub fn is_paused(&self, now: Timestamp) -> bool {
        self.pause.is_paused(now)
    }

    pub fn pause_for(&mut self, duration: Timestamp, now: Timestamp) -> Result<(), QueueError> {
        self.pause.pause_for(duration, now)?;
        info!(target: "exitq::queue", resume_since = self.pause.resume_since_timestamp(), "queue paused");
        Ok(())
    }

    pub fn pause_until(
        &mut self,
        pause_until_inclusive: Timestamp,
        now: Timestamp,
    ) -> Result<(), QueueError> {
        self.pause.pause_until(pause_until_inclusive, now)?;
        info!(target: "exitq::queue", resume_since = self.pause.resume_since_timestamp(), "queue paused");
        Ok(())
    }

    pub fn resume(&mut self, now: Timestamp) -> Result<(), QueueError> {
        self.pause.resume(now)?;
        info!(target: "exitq::queue", "queue resumed");
        Ok(())
    }

    pub fn is_bunker_mode_active(&self) -> bool {
        self.bunker.is_active()
    }

    pub fn bunker_mode_since_timestamp(&self) -> Timestamp {
        self.bunker.since_timestamp()
    }

    pub fn last_report_timestamp(&self) -> Timestamp {
        self.bunker.last_report_timestamp()
    }

    /// Record an oracle report (bunker status + report timestamp).
    pub fn on_oracle_report(
        &mut self,
        is_bunker_mode: bool,
        bunker_start_timestamp: Timestamp,
        current_report_timestamp: Timestamp,
        now: Timestamp,
    ) -> Result<Option<BunkerTransition>, QueueError> {
        let transition = self.bunker.on_oracle_report(
            is_bunker_mode,
            bunker_start_timestamp,
            current_report_timestamp,
            now,
        )?;
        match transition {
            Some(BunkerTransition::Enabled { since }) => {
                info!(target: "exitq::queue", since, "bunker mode enabled")
            }
            Some(BunkerTransition::Disabled) => {
                info!(target: "exitq::queue", "bunker mode disabled")
            }
            None => {}
        }
        Ok(transition)
    }

    // ------------------------------------------------------------------
    // Persistence views
    // ------------------------------------------------------------------

    pub fn request_entries(&self) -> &[WithdrawalRequest] {
        self.ledger.entries()
    }

    pub fn checkpoint_entries(&self) -> &[Checkpoint] {
        self.checkpoints.checkpoints()
    }

    pub fn globals(&self) -> QueueGlobals {
        QueueGlobals {
            last_finalized_request_id: self.ledger.last_finalized_request_id(),
            locked_value: self.locked_value,
            resume_since_timestamp: self.pause.resume_since_timestamp(),
            bunker_mode_since_timestamp: self.bunker.since_timestamp(),
            last_report_timestamp: self.bunker.last_report_timestamp(),
        }
    }

    pub fn limits(&self) -> QueueLimits {
        QueueLimits {
            min_amount: self.ledger.min_amount(),
            max_amount: self.ledger.max_amount(),
        }
    }

    /// Re-apply a persisted per-token approval after `restore`.
    pub fn restore_token_approval(&mut self, id: RequestId, to: Address) {
        self.ownership.approve(id, to);
    }

    /// Re-apply a persisted operator approval after `restore`.
    pub fn restore_operator_approval(&mut self, owner: Address, operator: Address) {
        self.ownership.set_operator(owner, operator, true);
    }

    pub fn token_approvals(&self) -> impl Iterator<Item = (RequestId, Address)> + '_ {
        self.ownership.token_approvals()
    }

    pub fn operator_approvals(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.ownership.operator_approvals()
    }
}


#[cfg(test)]
mod properties {
    use super::*;
    use crate::types::units::SHARE_RATE_PRECISION;
    use crate::vault::SimulatedVault;
    use proptest::prelude::*;

    const NOW: Timestamp = 1_700_000_000;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    prop_compose! {
        /// (value, shares, report_timestamp) triples within creation bounds
        fn arb_request()(
            value in 100u128..=1_000_000_000u128,
            shares in 1u128..=2_000_000_000u128,
            report in 0u64..4u64,
        ) -> (Wei, SharesAmount, Timestamp) {
            (value, shares, report)
        }
    }

    fn build_queue(requests: &[(Wei, SharesAmount, Timestamp)]) -> WithdrawalQueue {
        let mut queue = WithdrawalQueue::default();
        let user = addr(1);
        let mut last_report = 0;
        for &(value, shares, report) in requests {
            let report = last_report.max(report);
            if report > last_report {
                queue.on_oracle_report(false, 0, report, NOW).unwrap();
                last_report = report;
            }
            queue.create_request(user, user, value, shares, NOW).unwrap();
        }
        queue
    }

    proptest! {
        #[test]
        fn prop_cumulative_deltas_match_amounts(
            requests in prop::collection::vec(arb_request(), 1..30)
        ) {
            let queue = build_queue(&requests);
            let entries = queue.request_entries();
            let mut prev_value = 0u128;
            let mut prev_shares = 0u128;
            for (i, entry) in entries.iter().enumerate() {
                prop_assert_eq!(entry.cumulative_value - prev_value, requests[i].0);
                prop_assert_eq!(entry.cumulative_shares - prev_shares, requests[i].1);
                prev_value = entry.cumulative_value;
                prev_shares = entry.cumulative_shares;
            }
        }

        /// Within any batch the calculator emits, each consecutive request
        /// pair either shares a report timestamp or falls in the same rate
        /// regime under the finalization rate.
        #[test]
        fn prop_batches_are_regime_homogeneous(
            requests in prop::collection::vec(arb_request(), 1..30),
            rate_num in 1u128..40u128,
        ) {
            let queue = build_queue(&requests);
            let rate = rate_num * SHARE_RATE_PRECISION / 20;
            let acc = queue
                .calculate_finalization_batches(rate, u64::MAX, 1000, BatchAccumulator::new(u128::MAX / 2))
                .unwrap();

            let rate_wide = U256::from(rate);
            let discounted = |id: RequestId| {
                let status = queue.status(id).unwrap();
                let own = U256::from(status.amount_of_value) * U256::from(SHARE_RATE_PRECISION)
                    / U256::from(status.amount_of_shares);
                own > rate_wide
            };
            let report = |id: RequestId| queue.request_entries()[(id - 1) as usize].report_timestamp;

            let mut start = 1u64;
            for &end in acc.boundaries() {
                for id in (start + 1)..=end {
                    prop_assert!(
                        report(id - 1) == report(id) || discounted(id - 1) == discounted(id),
                        "ids {} and {} share a batch without sharing report or regime",
                        id - 1,
                        id
                    );
                }
                start = end + 1;
            }
        }

        /// Many small continuation steps produce the same boundaries as one
        /// unbounded call.
        #[test]
        fn prop_continuation_equivalence(
            requests in prop::collection::vec(arb_request(), 1..25),
            budget in 1_000u128..100_000_000_000u128,
        ) {
            let queue = build_queue(&requests);
            let rate = SHARE_RATE_PRECISION;

            let single = queue
                .calculate_finalization_batches(rate, u64::MAX, u64::MAX, BatchAccumulator::new(budget))
                .unwrap();

            let mut stepped = BatchAccumulator::new(budget);
            while !stepped.finished {
                stepped = queue
                    .calculate_finalization_batches(rate, u64::MAX, 1, stepped)
                    .unwrap();
            }
            prop_assert_eq!(stepped, single);
        }

        /// Value conservation: everything locked covers everything paid, and
        /// each payout respects both caps.
        #[test]
        fn prop_value_conservation(
            requests in prop::collection::vec(arb_request(), 1..20),
            rate_num in 1u128..40u128,
        ) {
            let mut queue = build_queue(&requests);
            let mut vault = SimulatedVault::new();
            let user = addr(1);
            let rate = rate_num * SHARE_RATE_PRECISION / 20;

            let acc = queue
                .calculate_finalization_batches(rate, u64::MAX, 1000, BatchAccumulator::new(u128::MAX / 2))
                .unwrap();
            if acc.boundaries().is_empty() {
                return Ok(());
            }
            let preview = queue.prefinalize(acc.boundaries(), rate).unwrap();
            vault.deposit(preview.value_to_lock);
            queue.finalize(acc.boundaries(), rate, preview.value_to_lock, NOW).unwrap();

            let last = queue.last_finalized_request_id();
            let mut total_paid = 0u128;
            for id in 1..=last {
                let status = queue.status(id).unwrap();
                let hint = queue
                    .find_checkpoint_hint(id, 1, queue.last_checkpoint_index())
                    .unwrap()
                    .unwrap();
                let receipt = queue.claim(user, id, hint, &mut vault).unwrap();
                prop_assert!(receipt.amount <= status.amount_of_value);
                prop_assert!(
                    receipt.amount
                        <= crate::types::units::share_value(status.amount_of_shares, rate)
                );
                total_paid += receipt.amount;
            }
            // never short: what was locked covers every payout
            prop_assert!(total_paid <= preview.value_to_lock);
            prop_assert_eq!(queue.locked_value(), preview.value_to_lock - total_paid);
        }
    }
}
