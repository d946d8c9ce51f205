//! Withdrawal Service
//!
//! Async wrapper around one [`WithdrawalQueue`] instance: role-gated entry
//! points, oracle snapshot intake, the finalization daemon and persistence.
//! Every operation reads and writes the queue's shared prefix-sum state, so
//! a single `RwLock` serializes the whole validate-mutate-persist sequence.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use alloy_primitives::Address;
use tokio::sync::RwLock;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::queue::{
    BatchAccumulator, QueueError, QueueLimits, WithdrawalQueue,
};
use crate::storage::{QueueStore, StorageError};
use crate::types::{
    CheckpointIndex, ClaimReceipt, QueueInfo, RequestId, ShareRate, Timestamp, Wei,
    WithdrawalRequestStatus,
};
use crate::vault::{PooledToken, SimulatedPooledToken, SimulatedVault, TokenError, ValueSink};

/// Role-gated privileged operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Finalize,
    Oracle,
    Pause,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Role::Finalize => "finalize",
            Role::Oracle => "oracle",
            Role::Pause => "pause",
        };
        f.write_str(name)
    }
}

/// Injected policy check for privileged entry points.
#[derive(Debug, Clone, Default)]
pub struct AccessPolicy {
    finalizers: HashSet<Address>,
    oracles: HashSet<Address>,
    pausers: HashSet<Address>,
}

impl AccessPolicy {
    pub fn new(
        finalizers: impl IntoIterator<Item = Address>,
        oracles: impl IntoIterator<Item = Address>,
        pausers: impl IntoIterator<Item = Address>,
    ) -> Self {
        Self {
            finalizers: finalizers.into_iter().collect(),
            oracles: oracles.into_iter().collect(),
            pausers: pausers.into_iter().collect(),
        }
    }

    /// Everyone holds every role; for tests and the demo.
    pub fn allow_all() -> Self {
        Self::default()
    }

    fn check(&self, caller: Address, role: Role) -> Result<(), ServiceError> {
        let holders = match role {
            Role::Finalize => &self.finalizers,
            Role::Oracle => &self.oracles,
            Role::Pause => &self.pausers,
        };
        // an empty holder set leaves the role open
        if holders.is_empty() || holders.contains(&caller) {
            return Ok(());
        }
        warn!(target: "exitq::service", %caller, %role, "role denied");
        Err(ServiceError::RoleDenied { caller, role })
    }
}

/// Latest oracle report, consumed by the finalization daemon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OracleSnapshot {
    /// Share rate to finalize at (E27 fixed-point)
    pub share_rate: ShareRate,
    /// Wei the protocol can spend on finalization this frame
    pub available_budget: Wei,
    pub is_bunker_mode: bool,
    pub bunker_start_timestamp: Timestamp,
    pub report_timestamp: Timestamp,
}

/// Result of one finalization tick.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TickResult {
    pub requests_finalized: u64,
    pub checkpoints_added: u64,
    pub value_locked: Wei,
}

impl TickResult {
    pub fn has_activity(&self) -> bool {
        self.requests_finalized > 0
    }
}

impl std::fmt::Display for TickResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "finalized: {}, checkpoints: {}, locked: {} wei",
            self.requests_finalized, self.checkpoints_added, self.value_locked
        )
    }
}

/// Service errors
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    Queue(#[from] QueueError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("token error: {0}")]
    Token(#[from] TokenError),

    #[error("caller {caller} lacks the {role} role")]
    RoleDenied { caller: Address, role: Role },

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("no oracle report received yet")]
    NoOracleReport,
}

impl ServiceError {
    /// Stable machine-readable code, mapped to HTTP statuses by the API.
    pub fn error_code(&self) -> &'static str {
        match self {
            ServiceError::Queue(e) => match e {
                QueueError::AmountTooSmall { .. } => "AMOUNT_TOO_SMALL",
                QueueError::AmountTooLarge { .. } => "AMOUNT_TOO_LARGE",
                QueueError::InvalidRequestId(_) => "INVALID_REQUEST_ID",
                QueueError::InvalidRequestIdRange { .. } => "INVALID_REQUEST_ID_RANGE",
                QueueError::RequestIdsNotSorted => "REQUEST_IDS_NOT_SORTED",
                QueueError::EmptyBatches => "EMPTY_BATCHES",
                QueueError::BatchesAreNotSorted => "BATCHES_NOT_SORTED",
                QueueError::ZeroShareRate => "ZERO_SHARE_RATE",
                QueueError::ZeroRecipient => "ZERO_RECIPIENT",
                QueueError::ArraysLengthMismatch { .. } => "ARRAYS_LENGTH_MISMATCH",
                QueueError::InvalidState => "INVALID_STATE",
                QueueError::RequestNotFoundOrNotFinalized(_) => "REQUEST_NOT_FINALIZED",
                QueueError::RequestAlreadyClaimed(_) => "REQUEST_ALREADY_CLAIMED",
                QueueError::InvalidHint(_) => "INVALID_HINT",
                QueueError::TooMuchEtherToFinalize { .. } => "TOO_MUCH_VALUE",
                QueueError::NotEnoughEtherToFinalize { .. } => "NOT_ENOUGH_VALUE",
                QueueError::NotOwnerOrApproved { .. } => "NOT_OWNER_OR_APPROVED",
                QueueError::NotOwnerOrApprovedForAll(_) => "NOT_OWNER_OR_APPROVED",
                QueueError::TransferFromIncorrectOwner { .. } => "INCORRECT_OWNER",
                QueueError::TransferToZeroAddress => "TRANSFER_TO_ZERO",
                QueueError::TransferToThemselves => "TRANSFER_TO_SELF",
                QueueError::ApprovalToOwner => "APPROVAL_TO_OWNER",
                QueueError::ApproveToCaller => "APPROVE_TO_CALLER",
                QueueError::NotEnoughEther => "NOT_ENOUGH_ETHER",
                QueueError::CantSendValue(_) => "CANT_SEND_VALUE",
                QueueError::InvalidReportTimestamp => "INVALID_REPORT_TIMESTAMP",
                QueueError::ValueOverflow => "VALUE_OVERFLOW",
                QueueError::Pause(_) => "PAUSED",
            },
            ServiceError::Storage(_) => "STORAGE_ERROR",
            ServiceError::Token(_) => "TOKEN_ERROR",
            ServiceError::RoleDenied { .. } => "ROLE_DENIED",
            ServiceError::InvalidAddress(_) => "INVALID_ADDRESS",
            ServiceError::NoOracleReport => "NO_ORACLE_REPORT",
        }
    }
}

struct ServiceInner {
    queue: WithdrawalQueue,
    vault: SimulatedVault,
    token: SimulatedPooledToken,
    snapshot: Option<OracleSnapshot>,
}

/// The withdrawal service: one queue, one vault, one policy.
pub struct WithdrawalService {
    inner: RwLock<ServiceInner>,
    store: Arc<dyn QueueStore>,
    policy: AccessPolicy,
    /// Seconds subtracted from `now` to form the finalization time cutoff
    safe_border_secs: u64,
    /// Calculator scan allowance per tick
    max_requests_per_tick: u64,
    finalization_interval_secs: u64,
    running: RwLock<bool>,
}

fn unix_now() -> Timestamp {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl WithdrawalService {
    /// Load persisted state from `store` and wire the service up.
    pub async fn open(
        config: &Config,
        store: Arc<dyn QueueStore>,
        policy: AccessPolicy,
    ) -> Result<Self, ServiceError> {
        let limits = QueueLimits {
            min_amount: config.min_amount,
            max_amount: config.max_amount,
        };
        let snapshot = store.load().await?;
        let mut queue =
            WithdrawalQueue::restore(limits, snapshot.requests, snapshot.checkpoints, snapshot.globals);
        for (id, to) in snapshot.token_approvals {
            queue.restore_token_approval(id, to);
        }
        for (owner, operator) in snapshot.operator_approvals {
            queue.restore_operator_approval(owner, operator);
        }
        info!(
            target: "exitq::service",
            requests = queue.last_request_id(),
            finalized = queue.last_finalized_request_id(),
            locked = queue.locked_value(),
            "queue state loaded"
        );

        let vault = SimulatedVault::with_balance(queue.locked_value());
        Ok(Self {
            inner: RwLock::new(ServiceInner {
                queue,
                vault,
                token: SimulatedPooledToken::default(),
                snapshot: None,
            }),
            store,
            policy,
            safe_border_secs: config.safe_border_secs,
            max_requests_per_tick: config.max_requests_per_tick,
            finalization_interval_secs: config.finalization_interval_secs,
            running: RwLock::new(false),
        })
    }

    // ------------------------------------------------------------------
    // User entry points
    // ------------------------------------------------------------------

    /// Queue redemption requests for `amounts` wei, debiting the pooled
    /// token from `caller` and minting the claims to `owner`.
    pub async fn submit_requests(
        &self,
        caller: Address,
        owner: Address,
        amounts: &[Wei],
    ) -> Result<Vec<RequestId>, ServiceError> {
        let now = unix_now();
        let mut inner = self.inner.write().await;
        // the caller must cover the whole batch before any request is minted
        let total = amounts
            .iter()
            .try_fold(0u128, |acc, &value| acc.checked_add(value))
            .ok_or(QueueError::ValueOverflow)?;
        if inner.token.balance_of(caller) < total {
            return Err(ServiceError::Token(TokenError::InsufficientBalance {
                holder: caller,
                requested: total,
            }));
        }
        let pairs: Vec<(Wei, u128)> = amounts
            .iter()
            .map(|&value| (value, inner.token.shares_of_value(value)))
            .collect();
        let ids = inner.queue.create_batch(caller, owner, &pairs, now)?;
        for &value in amounts {
            inner.token.debit(caller, value)?;
        }
        for &id in &ids {
            let entry = &inner.queue.request_entries()[(id - 1) as usize];
            self.store.insert_request(id, entry).await?;
        }
        self.store.save_globals(&inner.queue.globals()).await?;
        Ok(ids)
    }

    /// Claim one request. Resolves the checkpoint hint when the caller did
    /// not supply one.
    pub async fn claim(
        &self,
        caller: Address,
        id: RequestId,
        hint: Option<CheckpointIndex>,
    ) -> Result<ClaimReceipt, ServiceError> {
        let mut inner = self.inner.write().await;
        let hint = match hint {
            Some(hint) => hint,
            None => inner
                .queue
                .find_checkpoint_hint(id, 1, inner.queue.last_checkpoint_index())?
                .ok_or(QueueError::RequestNotFoundOrNotFinalized(id))?,
        };
        let ServiceInner { queue, vault, .. } = &mut *inner;
        let receipt = queue.claim(caller, id, hint, vault)?;
        self.store.mark_claimed(id).await?;
        self.store.clear_token_approval(id).await?;
        self.store.save_globals(&queue.globals()).await?;
        Ok(receipt)
    }

    /// Claim several requests; hints are resolved per id.
    pub async fn claim_batch(
        &self,
        caller: Address,
        ids: &[RequestId],
        hints: &[CheckpointIndex],
    ) -> Result<Vec<ClaimReceipt>, ServiceError> {
        let mut inner = self.inner.write().await;
        let ServiceInner { queue, vault, .. } = &mut *inner;
        let receipts = queue.claim_batch(caller, ids, hints, vault)?;
        for receipt in &receipts {
            self.store.mark_claimed(receipt.request_id).await?;
            self.store.clear_token_approval(receipt.request_id).await?;
        }
        self.store.save_globals(&queue.globals()).await?;
        Ok(receipts)
    }

    pub async fn transfer(
        &self,
        caller: Address,
        from: Address,
        to: Address,
        id: RequestId,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.write().await;
        inner.queue.transfer(caller, from, to, id)?;
        self.store.set_request_owner(id, to).await?;
        self.store.clear_token_approval(id).await?;
        Ok(())
    }

    pub async fn approve(
        &self,
        caller: Address,
        to: Address,
        id: RequestId,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.write().await;
        inner.queue.approve(caller, to, id)?;
        if to == Address::ZERO {
            self.store.clear_token_approval(id).await?;
        } else {
            self.store.set_token_approval(id, to).await?;
        }
        Ok(())
    }

    pub async fn set_approval_for_all(
        &self,
        caller: Address,
        operator: Address,
        approved: bool,
    ) -> Result<(), ServiceError> {
        let mut inner = self.inner.write().await;
        inner.queue.set_approval_for_all(caller, operator, approved)?;
        self.store
            .set_operator_approval(caller, operator, approved)
            .await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Privileged entry points
    // ------------------------------------------------------------------

    /// Record an oracle report: bunker status into the queue, rate and
    /// budget into the snapshot the finalization daemon consumes.
    pub async fn oracle_report(
        &self,
        caller: Address,
        report: OracleSnapshot,
    ) -> Result<(), ServiceError> {
        self.policy.check(caller, Role::Oracle)?;
        let now = unix_now();
        let mut inner = self.inner.write().await;
        inner.queue.on_oracle_report(
            report.is_bunker_mode,
            report.bunker_start_timestamp,
            report.report_timestamp,
            now,
        )?;
        inner.token.set_share_rate(report.share_rate);
        inner.snapshot = Some(report);
        self.store.save_globals(&inner.queue.globals()).await?;
        info!(
            target: "exitq::service",
            rate = report.share_rate,
            budget = report.available_budget,
            bunker = report.is_bunker_mode,
            "oracle report accepted"
        );
        Ok(())
    }

    /// One finalization pass: size batches under the reported budget,
    /// preview, fund the vault and finalize.
    pub async fn finalize_tick(&self, caller: Address) -> Result<TickResult, ServiceError> {
        self.policy.check(caller, Role::Finalize)?;
        let now = unix_now();
        let mut inner = self.inner.write().await;
        let snapshot = inner.snapshot.ok_or(ServiceError::NoOracleReport)?;
        if snapshot.available_budget == 0 {
            return Ok(TickResult::default());
        }

        let max_timestamp = now.saturating_sub(self.safe_border_secs);
        let mut acc = BatchAccumulator::new(snapshot.available_budget);
        while !acc.finished && acc.remaining_budget > 0 {
            acc = inner.queue.calculate_finalization_batches(
                snapshot.share_rate,
                max_timestamp,
                self.max_requests_per_tick,
                acc,
            )?;
        }
        if acc.is_empty() {
            return Ok(TickResult::default());
        }

        let preview = inner.queue.prefinalize(acc.boundaries(), snapshot.share_rate)?;
        let from = inner.queue.last_finalized_request_id() + 1;
        inner.vault.deposit(preview.value_to_lock);
        let summary = inner.queue.finalize(
            acc.boundaries(),
            snapshot.share_rate,
            preview.value_to_lock,
            now,
        )?;

        // budget spent this frame stays spent until the next report
        inner.snapshot = Some(OracleSnapshot {
            available_budget: snapshot.available_budget - preview.value_to_lock,
            ..snapshot
        });

        let checkpoint_count = inner.queue.last_checkpoint_index();
        let new_checkpoints = summary.checkpoints_added;
        for offset in 0..new_checkpoints {
            let index = checkpoint_count - new_checkpoints + offset + 1;
            let checkpoint = inner.queue.checkpoint_entries()[(index - 1) as usize];
            self.store.insert_checkpoint(index, &checkpoint).await?;
        }
        self.store.save_globals(&inner.queue.globals()).await?;

        Ok(TickResult {
            requests_finalized: summary.to_request_id - from + 1,
            checkpoints_added: summary.checkpoints_added,
            value_locked: summary.value_locked,
        })
    }

    pub async fn pause_for(&self, caller: Address, duration: u64) -> Result<(), ServiceError> {
        self.policy.check(caller, Role::Pause)?;
        let mut inner = self.inner.write().await;
        inner.queue.pause_for(duration, unix_now())?;
        self.store.save_globals(&inner.queue.globals()).await?;
        Ok(())
    }

    pub async fn resume(&self, caller: Address) -> Result<(), ServiceError> {
        self.policy.check(caller, Role::Pause)?;
        let mut inner = self.inner.write().await;
        inner.queue.resume(unix_now())?;
        self.store.save_globals(&inner.queue.globals()).await?;
        Ok(())
    }

    // ------------------------------------------------------------------
    // Read views
    // ------------------------------------------------------------------

    pub async fn withdrawal_status(
        &self,
        ids: &[RequestId],
    ) -> Result<Vec<WithdrawalRequestStatus>, ServiceError> {
        let inner = self.inner.read().await;
        Ok(inner.queue.statuses(ids)?)
    }

    pub async fn claimable_value(
        &self,
        ids: &[RequestId],
        hints: &[CheckpointIndex],
    ) -> Result<Vec<Wei>, ServiceError> {
        let inner = self.inner.read().await;
        Ok(inner.queue.claimable_value(ids, hints)?)
    }

    pub async fn requests_by_owner(&self, owner: Address) -> Vec<RequestId> {
        let inner = self.inner.read().await;
        let mut ids = inner.queue.requests_by_owner(owner);
        ids.sort_unstable();
        ids
    }

    pub async fn find_checkpoint_hints(
        &self,
        ids: &[RequestId],
        start: CheckpointIndex,
        end: CheckpointIndex,
    ) -> Result<Vec<Option<CheckpointIndex>>, ServiceError> {
        let inner = self.inner.read().await;
        Ok(inner.queue.find_checkpoint_hints(ids, start, end)?)
    }

    pub async fn last_checkpoint_index(&self) -> CheckpointIndex {
        self.inner.read().await.queue.last_checkpoint_index()
    }

    pub async fn info(&self) -> QueueInfo {
        self.inner.read().await.queue.info(unix_now())
    }

    pub async fn vault_balance(&self) -> Wei {
        self.inner.read().await.vault.balance()
    }

    // ------------------------------------------------------------------
    // Daemon loop
    // ------------------------------------------------------------------

    /// Run the finalization daemon until [`stop`](Self::stop).
    pub async fn run(&self, finalizer: Address) {
        {
            let mut running = self.running.write().await;
            *running = true;
        }
        info!(
            target: "exitq::service",
            interval = self.finalization_interval_secs,
            "finalization daemon started"
        );

        loop {
            {
                let running = self.running.read().await;
                if !*running {
                    break;
                }
            }

            match self.finalize_tick(finalizer).await {
                Ok(result) if result.has_activity() => {
                    info!(target: "exitq::service", %result, "finalization tick");
                }
                Ok(_) => {}
                Err(ServiceError::NoOracleReport) => {}
                Err(e) => {
                    error!(target: "exitq::service", error = %e, "finalization tick failed");
                }
            }

            tokio::time::sleep(tokio::time::Duration::from_secs(
                self.finalization_interval_secs,
            ))
            .await;
        }

        info!(target: "exitq::service", "finalization daemon stopped");
    }

    pub async fn stop(&self) {
        let mut running = self.running.write().await;
        *running = false;
    }

    #[cfg(test)]
    pub(crate) async fn seed_token_balance(&self, holder: Address, amount: Wei) {
        self.inner.write().await.token.seed_balance(holder, amount);
    }
}

/// Parse a 20-byte hex address, `0x`-prefixed or bare.
pub fn parse_address(s: &str) -> Result<Address, ServiceError> {
    s.trim()
        .parse()
        .map_err(|_| ServiceError::InvalidAddress(s.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryQueueStore;
    use crate::types::units::{ether, SHARE_RATE_PRECISION};

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    fn report(rate: ShareRate, budget: Wei) -> OracleSnapshot {
        OracleSnapshot {
            share_rate: rate,
            available_budget: budget,
            is_bunker_mode: false,
            bunker_start_timestamp: 0,
            report_timestamp: unix_now() - 10,
        }
    }

    async fn service() -> WithdrawalService {
        let mut config = Config::default_for_tests();
        config.safe_border_secs = 0;
        WithdrawalService::open(
            &config,
            Arc::new(MemoryQueueStore::new()),
            AccessPolicy::allow_all(),
        )
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_submit_and_status() {
        let service = service().await;
        let user = addr(1);

        let ids = service
            .submit_requests(user, user, &[ether(1), ether(2)])
            .await
            .unwrap();
        assert_eq!(ids, vec![1, 2]);

        let statuses = service.withdrawal_status(&ids).await.unwrap();
        assert_eq!(statuses[0].amount_of_value, ether(1));
        assert!(!statuses[0].is_finalized);
        assert_eq!(service.requests_by_owner(user).await, vec![1, 2]);

        let info = service.info().await;
        assert_eq!(info.last_request_id, 2);
        assert_eq!(info.unfinalized_requests, 2);
    }

    #[tokio::test]
    async fn test_submit_rejected_without_token_balance() {
        let service = service().await;
        let user = addr(1);
        service.seed_token_balance(user, ether(2)).await;

        // the whole batch is checked against the balance up front
        let err = service
            .submit_requests(user, user, &[ether(1), ether(2)])
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), "TOKEN_ERROR");
        // nothing minted, nothing debited
        assert_eq!(service.info().await.last_request_id, 0);
        assert!(service.requests_by_owner(user).await.is_empty());

        let ids = service.submit_requests(user, user, &[ether(2)]).await.unwrap();
        assert_eq!(ids, vec![1]);
    }

    #[tokio::test]
    async fn test_full_cycle_submit_finalize_claim() {
        let service = service().await;
        let user = addr(1);
        let finalizer = addr(9);

        service.submit_requests(user, user, &[ether(1)]).await.unwrap();
        service
            .oracle_report(finalizer, report(SHARE_RATE_PRECISION, ether(10)))
            .await
            .unwrap();

        let tick = service.finalize_tick(finalizer).await.unwrap();
        assert_eq!(tick.requests_finalized, 1);
        assert_eq!(tick.value_locked, ether(1));

        // claim with an auto-resolved hint
        let receipt = service.claim(user, 1, None).await.unwrap();
        assert_eq!(receipt.amount, ether(1));
        assert_eq!(service.info().await.locked_value, 0);
    }

    #[tokio::test]
    async fn test_tick_without_report_and_budget_exhaustion() {
        let service = service().await;
        let user = addr(1);
        let finalizer = addr(9);

        service.submit_requests(user, user, &[ether(1), ether(2)]).await.unwrap();
        assert!(matches!(
            service.finalize_tick(finalizer).await,
            Err(ServiceError::NoOracleReport)
        ));

        // budget only covers the first request
        service
            .oracle_report(finalizer, report(SHARE_RATE_PRECISION, ether(1)))
            .await
            .unwrap();
        let tick = service.finalize_tick(finalizer).await.unwrap();
        assert_eq!(tick.requests_finalized, 1);

        // spent budget: next tick is a no-op until a fresh report
        let tick = service.finalize_tick(finalizer).await.unwrap();
        assert!(!tick.has_activity());
    }

    #[tokio::test]
    async fn test_role_denied() {
        let policy = AccessPolicy::new([addr(9)], [addr(9)], [addr(9)]);
        let config = Config::default_for_tests();
        let service = WithdrawalService::open(
            &config,
            Arc::new(MemoryQueueStore::new()),
            policy,
        )
        .await
        .unwrap();

        let err = service
            .oracle_report(addr(1), report(SHARE_RATE_PRECISION, 0))
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::RoleDenied { role: Role::Oracle, .. }));
        assert_eq!(err.error_code(), "ROLE_DENIED");

        assert!(matches!(
            service.finalize_tick(addr(1)).await,
            Err(ServiceError::RoleDenied { role: Role::Finalize, .. })
        ));
        assert!(matches!(
            service.pause_for(addr(1), 100).await,
            Err(ServiceError::RoleDenied { role: Role::Pause, .. })
        ));

        // the configured principal passes
        service
            .oracle_report(addr(9), report(SHARE_RATE_PRECISION, 0))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_pause_blocks_submission() {
        let service = service().await;
        let user = addr(1);

        service.pause_for(user, 3600).await.unwrap();
        let err = service.submit_requests(user, user, &[ether(1)]).await.unwrap_err();
        assert_eq!(err.error_code(), "PAUSED");
        assert!(service.info().await.is_paused);

        service.resume(user).await.unwrap();
        service.submit_requests(user, user, &[ether(1)]).await.unwrap();
    }

    #[tokio::test]
    async fn test_state_survives_reopen() {
        let store = Arc::new(MemoryQueueStore::new());
        let mut config = Config::default_for_tests();
        config.safe_border_secs = 0;
        let user = addr(1);
        let finalizer = addr(9);

        {
            let service =
                WithdrawalService::open(&config, store.clone(), AccessPolicy::allow_all())
                    .await
                    .unwrap();
            service
                .submit_requests(user, user, &[ether(1), ether(2)])
                .await
                .unwrap();
            service
                .oracle_report(finalizer, report(SHARE_RATE_PRECISION, ether(1)))
                .await
                .unwrap();
            service.finalize_tick(finalizer).await.unwrap();
            service.approve(user, addr(2), 2).await.unwrap();
        }

        let reopened = WithdrawalService::open(&config, store, AccessPolicy::allow_all())
            .await
            .unwrap();
        let info = reopened.info().await;
        assert_eq!(info.last_request_id, 2);
        assert_eq!(info.last_finalized_request_id, 1);
        assert_eq!(info.locked_value, ether(1));
        assert_eq!(reopened.requests_by_owner(user).await, vec![1, 2]);

        // the finalized request claims after the restart
        let receipt = reopened.claim(user, 1, None).await.unwrap();
        assert_eq!(receipt.amount, ether(1));
    }

    #[tokio::test]
    async fn test_claim_batch() {
        let service = service().await;
        let user = addr(1);
        let finalizer = addr(9);

        service
            .submit_requests(user, user, &[ether(1), ether(2), ether(3)])
            .await
            .unwrap();
        service
            .oracle_report(finalizer, report(SHARE_RATE_PRECISION, ether(10)))
            .await
            .unwrap();
        service.finalize_tick(finalizer).await.unwrap();

        let last = service.last_checkpoint_index().await;
        let hints: Vec<_> = service
            .find_checkpoint_hints(&[1, 2, 3], 1, last)
            .await
            .unwrap()
            .into_iter()
            .map(|h| h.unwrap())
            .collect();

        let receipts = service.claim_batch(user, &[1, 2, 3], &hints).await.unwrap();
        assert_eq!(receipts.len(), 3);
        assert_eq!(receipts.iter().map(|r| r.amount).sum::<u128>(), ether(6));
        assert_eq!(service.info().await.locked_value, 0);
    }

    #[tokio::test]
    async fn test_transfer_and_claim_by_new_owner() {
        let service = service().await;
        let (alice, bob, finalizer) = (addr(1), addr(2), addr(9));

        service.submit_requests(alice, alice, &[ether(1)]).await.unwrap();
        service.transfer(alice, alice, bob, 1).await.unwrap();
        assert_eq!(service.requests_by_owner(bob).await, vec![1]);

        service
            .oracle_report(finalizer, report(SHARE_RATE_PRECISION, ether(1)))
            .await
            .unwrap();
        service.finalize_tick(finalizer).await.unwrap();

        assert!(matches!(
            service.claim(alice, 1, None).await.unwrap_err(),
            ServiceError::Queue(QueueError::NotOwnerOrApproved { .. })
        ));
        let receipt = service.claim(bob, 1, None).await.unwrap();
        assert_eq!(receipt.owner, bob);
    }

    #[test]
    fn test_parse_address() {
        assert!(parse_address("0x1111111111111111111111111111111111111111").is_ok());
        assert!(parse_address("not-an-address").is_err());
        assert!(parse_address("0x123").is_err());
    }
}
