//! Checkpoint Index
//!
//! Append-only history of finalization checkpoints. Each checkpoint binds a
//! contiguous request range `[from_request_id, ..)` to the rate it was
//! finalized at; the range runs until the next checkpoint begins. Index 0 is
//! a zero sentinel, so real indices are 1..=last and 0 doubles as NOT_FOUND
//! at the API edge.
//!
//! Hints: claims must name the checkpoint covering their request. The index
//! offers a binary search (`find_hint`) for callers to run off the hot path,
//! and an O(1) verification (`verify_hint`) the claim path relies on.

use crate::types::{Checkpoint, CheckpointIndex, RequestId, ShareRate};

use super::QueueError;

/// Append-only checkpoint arena.
#[derive(Debug, Clone, Default)]
pub struct CheckpointHistory {
    /// checkpoints[0] is the sentinel; real entries start at index 1
    checkpoints: Vec<Checkpoint>,
}

impl CheckpointHistory {
    pub fn new() -> Self {
        Self {
            checkpoints: vec![Checkpoint::sentinel()],
        }
    }

    /// Rebuild from persisted rows, sentinel excluded, in index order.
    pub fn restore(checkpoints: Vec<Checkpoint>) -> Self {
        let mut all = Vec::with_capacity(checkpoints.len() + 1);
        all.push(Checkpoint::sentinel());
        all.extend(checkpoints);
        Self { checkpoints: all }
    }

    pub fn last_checkpoint_index(&self) -> CheckpointIndex {
        (self.checkpoints.len() - 1) as CheckpointIndex
    }

    pub fn append(&mut self, from_request_id: RequestId, max_share_rate: ShareRate) -> CheckpointIndex {
        self.checkpoints.push(Checkpoint {
            from_request_id,
            max_share_rate,
        });
        self.last_checkpoint_index()
    }

    pub fn get(&self, index: CheckpointIndex) -> Option<&Checkpoint> {
        if index == 0 {
            return None;
        }
        self.checkpoints.get(index as usize)
    }

    /// Binary search for the checkpoint covering `id` within
    /// `[start, end]`. `Ok(None)` means no covering checkpoint exists in the
    /// searched range (unfinalized id, empty history, or inverted range).
    pub fn find_hint(
        &self,
        id: RequestId,
        start: CheckpointIndex,
        end: CheckpointIndex,
        last_finalized: RequestId,
        last_request_id: RequestId,
    ) -> Result<Option<CheckpointIndex>, QueueError> {
        if id == 0 || id > last_request_id {
            return Err(QueueError::InvalidRequestId(id));
        }
        let last_index = self.last_checkpoint_index();
        if start == 0 || end > last_index {
            return Err(QueueError::InvalidRequestIdRange { start, end });
        }
        if last_index == 0 || id > last_finalized || start > end {
            return Ok(None);
        }

        // right boundary: id at or past the highest searched checkpoint
        if id >= self.checkpoints[end as usize].from_request_id {
            if end == last_index {
                return Ok(Some(end));
            }
            if id < self.checkpoints[(end + 1) as usize].from_request_id {
                return Ok(Some(end));
            }
            return Ok(None);
        }
        // left boundary: id before the lowest searched checkpoint
        if id < self.checkpoints[start as usize].from_request_id {
            return Ok(None);
        }

        let mut min = start;
        let mut max = end - 1;
        while max > min {
            let mid = (max + min + 1) / 2;
            if self.checkpoints[mid as usize].from_request_id <= id {
                min = mid;
            } else {
                max = mid - 1;
            }
        }
        Ok(Some(min))
    }

    /// O(1) check that `hint` is exactly the checkpoint covering `id`.
    pub fn verify_hint(&self, hint: CheckpointIndex, id: RequestId) -> Result<&Checkpoint, QueueError> {
        let last_index = self.last_checkpoint_index();
        if hint == 0 || hint > last_index {
            return Err(QueueError::InvalidHint(hint));
        }
        let checkpoint = &self.checkpoints[hint as usize];
        if id < checkpoint.from_request_id {
            return Err(QueueError::InvalidHint(hint));
        }
        if hint < last_index && self.checkpoints[(hint + 1) as usize].from_request_id <= id {
            return Err(QueueError::InvalidHint(hint));
        }
        Ok(checkpoint)
    }

    /// All stored checkpoints in index order, sentinel excluded.
    pub fn checkpoints(&self) -> &[Checkpoint] {
        &self.checkpoints[1..]
    }
}
