//! Lifecycle Controller
//!
//! Pause gate over `create`/`finalize` and the bunker-mode status fed by the
//! oracle report. Both are timestamp-driven so callers inject `now`; nothing
//! here reads the system clock.

use crate::types::Timestamp;

use super::QueueError;

/// Passing this as a pause duration pauses indefinitely.
pub const PAUSE_INFINITELY: Timestamp = u64::MAX;

/// Stored while bunker mode is inactive.
pub const BUNKER_MODE_DISABLED_TIMESTAMP: Timestamp = u64::MAX;

/// Pause gate errors
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum PauseError {
    #[error("zero pause duration")]
    ZeroPauseDuration,

    #[error("pause timestamp must be in the future")]
    PauseUntilMustBeInFuture,

    #[error("paused state expected")]
    PausedExpected,

    #[error("resumed state expected")]
    ResumedExpected,
}

/// Time-bounded or indefinite pause over the gated operations.
///
/// The gate is paused while `now < resume_since`; a fresh gate
/// (`resume_since == 0`) is resumed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PauseGate {
    resume_since: Timestamp,
}

impl Default for PauseGate {
    fn default() -> Self {
        Self::new()
    }
}

impl PauseGate {
    pub fn new() -> Self {
        Self { resume_since: 0 }
    }

    pub fn restore(resume_since: Timestamp) -> Self {
        Self { resume_since }
    }

    pub fn is_paused(&self, now: Timestamp) -> bool {
        now < self.resume_since
    }

    /// Timestamp at which the gate resumes (`PAUSE_INFINITELY` while pause
    /// is indefinite).
    pub fn resume_since_timestamp(&self) -> Timestamp {
        self.resume_since
    }

    /// Errors with `ResumedExpected` while paused; gates create/finalize.
    pub fn check_resumed(&self, now: Timestamp) -> Result<(), PauseError> {
        if self.is_paused(now) {
            return Err(PauseError::ResumedExpected);
        }
        Ok(())
    }

    pub fn pause_for(&mut self, duration: Timestamp, now: Timestamp) -> Result<(), PauseError> {
        self.check_resumed(now)?;
        if duration == 0 {
            return Err(PauseError::ZeroPauseDuration);
        }
        self.resume_since = if duration == PAUSE_INFINITELY {
            PAUSE_INFINITELY
        } else {
            now.saturating_add(duration)
        };
        Ok(())
    }

    /// Pause through `pause_until_inclusive`.
    pub fn pause_until(
        &mut self,
        pause_until_inclusive: Timestamp,
        now: Timestamp,
    ) -> Result<(), PauseError> {
        self.check_resumed(now)?;
        if pause_until_inclusive < now {
            return Err(PauseError::PauseUntilMustBeInFuture);
        }
        self.resume_since = if pause_until_inclusive == PAUSE_INFINITELY {
            PAUSE_INFINITELY
        } else {
            pause_until_inclusive + 1
        };
        Ok(())
    }

    pub fn resume(&mut self, now: Timestamp) -> Result<(), PauseError> {
        if !self.is_paused(now) {
            return Err(PauseError::PausedExpected);
        }
        self.resume_since = now;
        Ok(())
    }
}

/// Bunker transition reported back to the caller, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BunkerTransition {
    Enabled { since: Timestamp },
    Disabled,
}

/// Bunker-mode flag plus the last oracle-report timestamp.
///
/// The queue only stores and exposes bunker state; deciding it is the
/// oracle's job. The report timestamp is stamped onto requests at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BunkerStatus {
    since: Timestamp,
    last_report_timestamp: Timestamp,
}

impl Default for BunkerStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl BunkerStatus {
    pub fn new() -> Self {
        Self {
            since: BUNKER_MODE_DISABLED_TIMESTAMP,
            last_report_timestamp: 0,
        }
    }

    pub fn restore(since: Timestamp, last_report_timestamp: Timestamp) -> Self {
        Self {
            since,
            last_report_timestamp,
        }
    }

    pub fn is_active(&self) -> bool {
        self.since != BUNKER_MODE_DISABLED_TIMESTAMP
    }

    pub fn active_since(&self) -> Option<Timestamp> {
        if self.is_active() {
            Some(self.since)
        } else {
            None
        }
    }

    /// Raw stored value, `BUNKER_MODE_DISABLED_TIMESTAMP` when inactive.
    pub fn since_timestamp(&self) -> Timestamp {
        self.since
    }

    pub fn last_report_timestamp(&self) -> Timestamp {
        self.last_report_timestamp
    }

    /// Apply an oracle report. Report timestamps must lie strictly in the
    /// past and never regress; repeated same-state reports only advance the
    /// report timestamp.
    pub fn on_oracle_report(
        &mut self,
        is_bunker_mode: bool,
        bunker_start_timestamp: Timestamp,
        current_report_timestamp: Timestamp,
        now: Timestamp,
    ) -> Result<Option<BunkerTransition>, QueueError> {
        if bunker_start_timestamp >= now || current_report_timestamp >= now {
            return Err(QueueError::InvalidReportTimestamp);
        }
        if current_report_timestamp < self.last_report_timestamp {
            return Err(QueueError::InvalidReportTimestamp);
        }
        self.last_report_timestamp = current_report_timestamp;

        let was_active = self.is_active();
        if is_bunker_mode && !was_active {
            self.since = bunker_start_timestamp;
            return Ok(Some(BunkerTransition::Enabled {
                since: bunker_start_timestamp,
            }));
        }
        if !is_bunker_mode && was_active {
            self.since = BUNKER_MODE_DISABLED_TIMESTAMP;
            return Ok(Some(BunkerTransition::Disabled));
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_gate_is_resumed() {
        let gate = PauseGate::new();
        assert!(!gate.is_paused(0));
        assert!(gate.check_resumed(1000).is_ok());
    }

    #[test]
    fn test_pause_for_and_expiry() {
        let mut gate = PauseGate::new();
        gate.pause_for(100, 1000).unwrap();
        assert!(gate.is_paused(1000));
        assert!(gate.is_paused(1099));
        assert!(!gate.is_paused(1100));
        assert_eq!(gate.resume_since_timestamp(), 1100);
        assert!(matches!(gate.check_resumed(1050), Err(PauseError::ResumedExpected)));
    }

    #[test]
    fn test_pause_for_rejects_zero_and_double_pause() {
        let mut gate = PauseGate::new();
        assert!(matches!(gate.pause_for(0, 1000), Err(PauseError::ZeroPauseDuration)));

        gate.pause_for(100, 1000).unwrap();
        assert!(matches!(gate.pause_for(100, 1010), Err(PauseError::ResumedExpected)));
    }

    #[test]
    fn test_pause_infinitely() {
        let mut gate = PauseGate::new();
        gate.pause_for(PAUSE_INFINITELY, 1000).unwrap();
        assert!(gate.is_paused(u64::MAX - 1));
        assert_eq!(gate.resume_since_timestamp(), PAUSE_INFINITELY);
    }

    #[test]
    fn test_pause_until() {
        let mut gate = PauseGate::new();
        gate.pause_until(1100, 1000).unwrap();
        assert!(gate.is_paused(1100)); // inclusive
        assert!(!gate.is_paused(1101));

        let mut gate = PauseGate::new();
        assert!(matches!(
            gate.pause_until(999, 1000),
            Err(PauseError::PauseUntilMustBeInFuture)
        ));
        // pausing until now is a one-second pause
        gate.pause_until(1000, 1000).unwrap();
        assert!(gate.is_paused(1000));
        assert!(!gate.is_paused(1001));
    }

    #[test]
    fn test_resume() {
        let mut gate = PauseGate::new();
        assert!(matches!(gate.resume(1000), Err(PauseError::PausedExpected)));

        gate.pause_for(PAUSE_INFINITELY, 1000).unwrap();
        gate.resume(1234).unwrap();
        assert!(!gate.is_paused(1234));
    }

    #[test]
    fn test_bunker_starts_disabled() {
        let bunker = BunkerStatus::new();
        assert!(!bunker.is_active());
        assert_eq!(bunker.active_since(), None);
        assert_eq!(bunker.since_timestamp(), BUNKER_MODE_DISABLED_TIMESTAMP);
    }

    #[test]
    fn test_bunker_enable_disable() {
        let mut bunker = BunkerStatus::new();
        let transition = bunker.on_oracle_report(true, 500, 900, 1000).unwrap();
        assert_eq!(transition, Some(BunkerTransition::Enabled { since: 500 }));
        assert!(bunker.is_active());
        assert_eq!(bunker.active_since(), Some(500));
        assert_eq!(bunker.last_report_timestamp(), 900);

        // same state again: no transition, timestamp advances
        let transition = bunker.on_oracle_report(true, 600, 950, 1000).unwrap();
        assert_eq!(transition, None);
        assert_eq!(bunker.active_since(), Some(500));
        assert_eq!(bunker.last_report_timestamp(), 950);

        let transition = bunker.on_oracle_report(false, 600, 980, 1000).unwrap();
        assert_eq!(transition, Some(BunkerTransition::Disabled));
        assert!(!bunker.is_active());
    }

    #[test]
    fn test_bunker_rejects_future_timestamps() {
        let mut bunker = BunkerStatus::new();
        assert!(matches!(
            bunker.on_oracle_report(true, 1000, 900, 1000),
            Err(QueueError::InvalidReportTimestamp)
        ));
        assert!(matches!(
            bunker.on_oracle_report(true, 900, 1000, 1000),
            Err(QueueError::InvalidReportTimestamp)
        ));
    }

    #[test]
    fn test_bunker_rejects_regressing_report() {
        let mut bunker = BunkerStatus::new();
        bunker.on_oracle_report(false, 0, 900, 1000).unwrap();
        assert!(matches!(
            bunker.on_oracle_report(false, 0, 899, 1000),
            Err(QueueError::InvalidReportTimestamp)
        ));
        // equal is allowed
        bunker.on_oracle_report(false, 0, 900, 1000).unwrap();
    }
}
