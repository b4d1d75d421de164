//! Deduplicated first-failure logging for a continuous RPC outage.
//!
//! Mirrors the `_daemon_error` flag the original Python dome and
//! environment loops keep (`dome_controller.py`, `environment.py`): log
//! "lost contact" once per outage and "restored contact" once on recovery,
//! not once per loop tick (spec §4.2 / §7).

use std::sync::atomic::{AtomicBool, Ordering};

/// Tracks whether a collaborator is currently in an outage, so callers can
/// log transitions instead of every failed tick.
#[derive(Debug, Default)]
pub struct OutageTracker {
    in_outage: AtomicBool,
}

/// What the caller should log, if anything, after reporting an outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutageTransition {
    /// No change worth logging.
    None,
    /// This is the first failure of a new outage.
    Started,
    /// Contact was just restored after an outage.
    Restored,
}

impl OutageTracker {
    /// Construct a tracker starting in the "contact ok" state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failed RPC attempt. Returns [`OutageTransition::Started`]
    /// only on the first failure of a new outage.
    pub fn record_failure(&self) -> OutageTransition {
        if self.in_outage.swap(true, Ordering::SeqCst) {
            OutageTransition::None
        } else {
            OutageTransition::Started
        }
    }

    /// Record a successful RPC attempt. Returns [`OutageTransition::Restored`]
    /// only when this ends a prior outage.
    pub fn record_success(&self) -> OutageTransition {
        if self.in_outage.swap(false, Ordering::SeqCst) {
            OutageTransition::Restored
        } else {
            OutageTransition::None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn logs_once_per_outage() {
        let tracker = OutageTracker::new();
        assert_eq!(tracker.record_failure(), OutageTransition::Started);
        assert_eq!(tracker.record_failure(), OutageTransition::None);
        assert_eq!(tracker.record_failure(), OutageTransition::None);
        assert_eq!(tracker.record_success(), OutageTransition::Restored);
        assert_eq!(tracker.record_success(), OutageTransition::None);
    }
}
