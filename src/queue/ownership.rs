//! Ownership Registry
//!
//! Index structures behind the transferable-claim surface: per-owner request
//! enumeration, single-token approvals and blanket operator approvals. Pure
//! bookkeeping; the queue facade validates request state before calling in.

use std::collections::{HashMap, HashSet};

use alloy_primitives::Address;

use crate::types::RequestId;

/// Reverse indexes over request ownership.
#[derive(Debug, Clone, Default)]
pub struct OwnershipRegistry {
    /// Owner -> ids, unordered
    by_owner: HashMap<Address, Vec<RequestId>>,
    /// id -> position within its owner's vec, for swap-and-pop removal
    position: HashMap<RequestId, usize>,
    /// Single per-token approvals
    token_approvals: HashMap<RequestId, Address>,
    /// Blanket (owner, operator) approvals
    operator_approvals: HashSet<(Address, Address)>,
}

impl OwnershipRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a freshly minted request.
    pub fn track(&mut self, owner: Address, id: RequestId) {
        let ids = self.by_owner.entry(owner).or_default();
        self.position.insert(id, ids.len());
        ids.push(id);
    }

    /// Stop tracking `id` (claimed or transferred away). Swap-and-pop keeps
    /// removal O(1); enumeration order is not preserved.
    pub fn untrack(&mut self, owner: Address, id: RequestId) {
        let pos = match self.position.remove(&id) {
            Some(pos) => pos,
            None => return,
        };
        let ids = match self.by_owner.get_mut(&owner) {
            Some(ids) => ids,
            None => return,
        };
        let last = match ids.pop() {
            Some(last) => last,
            None => return,
        };
        if pos < ids.len() {
            ids[pos] = last;
            self.position.insert(last, pos);
        }
        if ids.is_empty() {
            self.by_owner.remove(&owner);
        }
    }

    /// Move `id` between owner indexes.
    pub fn move_between(&mut self, from: Address, to: Address, id: RequestId) {
        self.untrack(from, id);
        self.track(to, id);
    }

    /// Ids owned by `owner`, unordered.
    pub fn owned_by(&self, owner: &Address) -> Vec<RequestId> {
        self.by_owner.get(owner).cloned().unwrap_or_default()
    }

    pub fn approve(&mut self, id: RequestId, to: Address) {
        self.token_approvals.insert(id, to);
    }

    pub fn clear_approval(&mut self, id: RequestId) {
        self.token_approvals.remove(&id);
    }

    pub fn approval_of(&self, id: RequestId) -> Option<Address> {
        self.token_approvals.get(&id).copied()
    }

    pub fn set_operator(&mut self, owner: Address, operator: Address, approved: bool) {
        if approved {
            self.operator_approvals.insert((owner, operator));
        } else {
            self.operator_approvals.remove(&(owner, operator));
        }
    }

    pub fn is_approved_for_all(&self, owner: &Address, operator: &Address) -> bool {
        self.operator_approvals.contains(&(*owner, *operator))
    }

    /// Owner, operator, or per-token approved party.
    pub fn is_authorized(&self, caller: &Address, owner: &Address, id: RequestId) -> bool {
        caller == owner
            || self.is_approved_for_all(owner, caller)
            || self.approval_of(id) == Some(*caller)
    }

    /// Persisted approvals, for the storage layer.
    pub fn token_approvals(&self) -> impl Iterator<Item = (RequestId, Address)> + '_ {
        self.token_approvals.iter().map(|(&id, &to)| (id, to))
    }

    pub fn operator_approvals(&self) -> impl Iterator<Item = (Address, Address)> + '_ {
        self.operator_approvals.iter().copied()
    }
}
