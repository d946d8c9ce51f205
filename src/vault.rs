//! Token/Vault Boundary
//!
//! The queue's two external money edges: the pooled token debited at request
//! creation, and the native-asset sink claims are paid from. Both are traits
//! so the service can swap real integrations in; the implementations here
//! are simulated (in-memory balances, payout journal), which is all the
//! daemon and the demo need.

use std::collections::{HashMap, HashSet};

use alloy_primitives::{Address, U256};

use crate::types::units::SHARE_RATE_PRECISION;
use crate::types::{ShareRate, SharesAmount, Wei};

/// Failure modes of a native-asset payout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum SendValueError {
    #[error("vault balance too low: requested {requested} wei, available {available} wei")]
    InsufficientBalance { requested: Wei, available: Wei },

    #[error("recipient {0} rejected the payment")]
    Rejected(Address),
}

/// Failure modes of a pooled-token debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum TokenError {
    #[error("pooled balance of {holder} too low: requested {requested} wei")]
    InsufficientBalance { holder: Address, requested: Wei },
}

/// Native-asset reserve the queue pays claims from.
#[cfg_attr(test, mockall::automock)]
pub trait ValueSink: Send + Sync {
    /// Wei currently held.
    fn balance(&self) -> Wei;

    /// Pay `amount` to `recipient`. Must either fully succeed or leave the
    /// balance untouched.
    fn send_value(&mut self, recipient: Address, amount: Wei) -> Result<(), SendValueError>;
}

/// Pooled-token edge used at request creation.
pub trait PooledToken: Send + Sync {
    /// Internal shares corresponding to `value` under the current rate.
    fn shares_of_value(&self, value: Wei) -> SharesAmount;

    /// Pooled balance held by `holder`.
    fn balance_of(&self, holder: Address) -> Wei;

    /// Pull `value` of pooled tokens from `from` into protocol custody.
    fn debit(&mut self, from: Address, value: Wei) -> Result<(), TokenError>;
}

/// One executed payout, journaled by the simulated vault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payout {
    pub recipient: Address,
    pub amount: Wei,
}

/// In-memory native-asset vault.
#[derive(Debug, Default)]
pub struct SimulatedVault {
    balance: Wei,
    payouts: Vec<Payout>,
    refusing: HashSet<Address>,
}

impl SimulatedVault {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_balance(balance: Wei) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    pub fn deposit(&mut self, amount: Wei) {
        self.balance = self.balance.saturating_add(amount);
    }

    pub fn payouts(&self) -> &[Payout] {
        &self.payouts
    }

    pub fn total_paid(&self) -> Wei {
        self.payouts.iter().map(|p| p.amount).sum()
    }

    /// Make payments to `recipient` fail, simulating a receiver that
    /// rejects transfers.
    pub fn refuse_payments_to(&mut self, recipient: Address) {
        self.refusing.insert(recipient);
    }
}

impl ValueSink for SimulatedVault {
    fn balance(&self) -> Wei {
        self.balance
    }

    fn send_value(&mut self, recipient: Address, amount: Wei) -> Result<(), SendValueError> {
        if self.refusing.contains(&recipient) {
            return Err(SendValueError::Rejected(recipient));
        }
        if amount > self.balance {
            return Err(SendValueError::InsufficientBalance {
                requested: amount,
                available: self.balance,
            });
        }
        self.balance -= amount;
        self.payouts.push(Payout { recipient, amount });
        Ok(())
    }
}

/// In-memory pooled token holding a share rate and a debit journal.
/// Balances are unbounded unless seeded; seeded holders are enforced.
#[derive(Debug)]
pub struct SimulatedPooledToken {
    share_rate: ShareRate,
    balances: HashMap<Address, Wei>,
    debits: Vec<(Address, Wei)>,
}

impl SimulatedPooledToken {
    pub fn new(share_rate: ShareRate) -> Self {
        Self {
            share_rate,
            balances: HashMap::new(),
            debits: Vec::new(),
        }
    }

    /// Cap `holder`'s pooled balance; debits beyond it fail.
    pub fn seed_balance(&mut self, holder: Address, amount: Wei) {
        self.balances.insert(holder, amount);
    }

    pub fn share_rate(&self) -> ShareRate {
        self.share_rate
    }

    /// Rebase: one share is now worth `share_rate` wei.
    pub fn set_share_rate(&mut self, share_rate: ShareRate) {
        self.share_rate = share_rate;
    }

    pub fn debits(&self) -> &[(Address, Wei)] {
        &self.debits
    }
}

impl Default for SimulatedPooledToken {
    fn default() -> Self {
        Self::new(SHARE_RATE_PRECISION)
    }
}

impl PooledToken for SimulatedPooledToken {
    fn shares_of_value(&self, value: Wei) -> SharesAmount {
        if self.share_rate == 0 {
            return 0;
        }
        let wide = U256::from(value) * U256::from(SHARE_RATE_PRECISION) / U256::from(self.share_rate);
        u128::try_from(wide).unwrap_or(u128::MAX)
    }

    fn balance_of(&self, holder: Address) -> Wei {
        self.balances.get(&holder).copied().unwrap_or(Wei::MAX)
    }

    fn debit(&mut self, from: Address, value: Wei) -> Result<(), TokenError> {
        if let Some(balance) = self.balances.get_mut(&from) {
            if *balance < value {
                return Err(TokenError::InsufficientBalance {
                    holder: from,
                    requested: value,
                });
            }
            *balance -= value;
        }
        self.debits.push((from, value));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::units::ether;

    fn addr(b: u8) -> Address {
        Address::repeat_byte(b)
    }

    #[test]
    fn test_vault_pays_and_journals() {
        let mut vault = SimulatedVault::with_balance(ether(10));
        vault.send_value(addr(1), ether(3)).unwrap();
        assert_eq!(vault.balance(), ether(7));
        assert_eq!(vault.total_paid(), ether(3));
        assert_eq!(vault.payouts().len(), 1);
    }

    #[test]
    fn test_vault_insufficient_balance() {
        let mut vault = SimulatedVault::with_balance(100);
        let err = vault.send_value(addr(1), 200).unwrap_err();
        assert_eq!(
            err,
            SendValueError::InsufficientBalance {
                requested: 200,
                available: 100
            }
        );
        // balance untouched
        assert_eq!(vault.balance(), 100);
    }

    #[test]
    fn test_vault_refusal() {
        let mut vault = SimulatedVault::with_balance(ether(1));
        vault.refuse_payments_to(addr(9));
        assert_eq!(
            vault.send_value(addr(9), 100).unwrap_err(),
            SendValueError::Rejected(addr(9))
        );
        vault.send_value(addr(8), 100).unwrap();
    }

    #[test]
    fn test_token_share_conversion() {
        let mut token = SimulatedPooledToken::default();
        assert_eq!(token.shares_of_value(ether(1)), ether(1));

        // rate doubles: half the shares per wei
        token.set_share_rate(2 * SHARE_RATE_PRECISION);
        assert_eq!(token.shares_of_value(ether(1)), ether(1) / 2);

        token.set_share_rate(SHARE_RATE_PRECISION / 2);
        assert_eq!(token.shares_of_value(ether(1)), ether(2));
    }

    #[test]
    fn test_token_debit_journal() {
        let mut token = SimulatedPooledToken::default();
        token.debit(addr(1), ether(1)).unwrap();
        token.debit(addr(2), ether(2)).unwrap();
        assert_eq!(token.debits().len(), 2);
        assert_eq!(token.debits()[1], (addr(2), ether(2)));
    }

    #[test]
    fn test_token_seeded_balance_enforced() {
        let mut token = SimulatedPooledToken::default();
        assert_eq!(token.balance_of(addr(1)), Wei::MAX);

        token.seed_balance(addr(1), ether(2));
        assert_eq!(token.balance_of(addr(1)), ether(2));
        token.debit(addr(1), ether(1)).unwrap();
        assert_eq!(token.balance_of(addr(1)), ether(1));

        let err = token.debit(addr(1), ether(2)).unwrap_err();
        assert_eq!(
            err,
            TokenError::InsufficientBalance {
                holder: addr(1),
                requested: ether(2)
            }
        );
        // the failed debit is not journaled
        assert_eq!(token.debits().len(), 1);
    }
}
