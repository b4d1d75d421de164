//! Enclosure Controller (spec §4.2): reconciles the physical enclosure with
//! a desired state derived from `mode`, `DomeWindow`, and the last-published
//! `SafetyVerdict`.
//!
//! Grounded on `dome_controller.py`'s `__loop`: the same desired-state
//! function, mode-transition table, and dedup'd outage logging, expressed
//! as a cooperative tokio task instead of a background thread.

use std::{sync::Arc, time::Duration as StdDuration};

use chrono::{DateTime, Utc};
use opsd_protocol::{DomeWindow, EnclosureStatus, EnclosureStatusSnapshot, OperationsMode, SubsystemStatus};
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::deps::ShutterApi;
use crate::environment::DEFAULT_STALE_LIMIT;
use crate::outage::{OutageTracker, OutageTransition};

/// Anything that can report the Environment Monitor's latest verdict. Kept
/// as a trait (rather than a direct dependency on `EnvironmentMonitor`) so
/// the controller can be driven in isolation in tests.
pub trait VerdictSource: Send + Sync {
    /// The most recently published safety verdict.
    fn current_verdict(&self) -> opsd_protocol::SafetyVerdict;
}

impl VerdictSource for crate::environment::EnvironmentMonitor {
    fn current_verdict(&self) -> opsd_protocol::SafetyVerdict {
        crate::environment::EnvironmentMonitor::current_verdict(self)
    }
}

struct State {
    mode: OperationsMode,
    mode_updated: DateTime<Utc>,
    requested_mode: OperationsMode,
    status: EnclosureStatus,
    status_updated: DateTime<Utc>,
    window: Option<DomeWindow>,
}

/// Drives the physical shutter to match `mode`/`window`/environment safety
/// (spec §4.2).
pub struct EnclosureController {
    shutter: Arc<dyn ShutterApi>,
    verdict_source: Arc<dyn VerdictSource>,
    loop_delay: StdDuration,
    stale_limit: StdDuration,
    state: RwLock<State>,
    wake: Arc<Notify>,
    outage: OutageTracker,
}

impl EnclosureController {
    /// Construct a controller, starting in `Manual` mode with the shutter
    /// assumed `Closed` (matches the Python original's boot defaults).
    pub fn new(
        shutter: Arc<dyn ShutterApi>,
        verdict_source: Arc<dyn VerdictSource>,
        loop_delay: StdDuration,
    ) -> Self {
        let now = Utc::now();
        Self {
            shutter,
            verdict_source,
            loop_delay,
            stale_limit: DEFAULT_STALE_LIMIT,
            state: RwLock::new(State {
                mode: OperationsMode::Manual,
                mode_updated: now,
                requested_mode: OperationsMode::Manual,
                status: EnclosureStatus::Closed,
                status_updated: now,
                window: None,
            }),
            wake: Arc::new(Notify::new()),
            outage: OutageTracker::new(),
        }
    }

    /// Override the staleness horizon used by the desired-state function
    /// (default 30s; spec §4.1/§4.2).
    pub fn with_stale_limit(mut self, stale_limit: StdDuration) -> Self {
        self.stale_limit = stale_limit;
        self
    }

    /// Wake handle used by the Facade and Scheduler to shortcut the loop's
    /// sleep after a mutating call.
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Current enclosure status, e.g. for the Scheduler's `dome_is_open`
    /// computation (spec §4.3).
    pub fn status(&self) -> EnclosureStatus {
        self.state.read().status
    }

    /// Current mode, e.g. for the Scheduler's "Enclosure mode is Manual"
    /// trust rule (spec §4.3).
    pub fn mode(&self) -> OperationsMode {
        self.state.read().mode
    }

    /// Status snapshot for the Supervisor Facade's `status()` RPC (spec §6).
    pub fn status_snapshot(&self) -> EnclosureStatusSnapshot {
        let s = self.state.read();
        EnclosureStatusSnapshot {
            subsystem: SubsystemStatus {
                mode: s.mode,
                requested_mode: s.requested_mode,
                mode_updated: s.mode_updated,
            },
            status: s.status,
            status_updated: s.status_updated,
            window: s.window.clone(),
        }
    }

    /// Request a mode transition, applied on the next tick (spec §6
    /// `request_dome_mode`).
    pub fn request_mode(&self, mode: OperationsMode) {
        self.state.write().requested_mode = mode;
        self.wake.notify_waiters();
    }

    /// Install a dome window. Rejected (returns `false`) unless the
    /// controller is currently `Automatic`, matching the Python original's
    /// `set_open_window` guard (spec §6 `DomeNotAutomatic`).
    pub fn install_window(&self, window: DomeWindow) -> bool {
        let mut s = self.state.write();
        if s.mode != OperationsMode::Automatic {
            return false;
        }
        info!(open_at = %window.open_at, close_at = %window.close_at, "scheduled dome window");
        s.window = Some(window);
        drop(s);
        self.wake.notify_waiters();
        true
    }

    /// Clear the window unconditionally (spec §6 `clear_dome_window`). The
    /// next reconciliation tick will close the enclosure if it is currently
    /// open inside it.
    pub fn clear_window(&self) {
        let mut s = self.state.write();
        if s.window.take().is_some() {
            info!("cleared dome window");
        }
        drop(s);
        self.wake.notify_waiters();
    }

    fn desired_open(&self, s: &State, verdict: &opsd_protocol::SafetyVerdict, now: DateTime<Utc>) -> bool {
        let Some(window) = &s.window else {
            return false;
        };
        s.mode == OperationsMode::Automatic
            && window.contains(now)
            && verdict.safe
            && verdict.age(now) < self.stale_limit
    }

    fn set_status(&self, status: EnclosureStatus) {
        let mut s = self.state.write();
        s.status = status;
        s.status_updated = Utc::now();
    }

    fn set_mode(&self, mode: OperationsMode) {
        let mut s = self.state.write();
        s.mode = mode;
        s.mode_updated = Utc::now();
    }

    /// Run the reconciliation loop until cancelled (spec §2, §5).
    pub async fn run(&self, cancel: CancelToken) {
        loop {
            self.tick().await;
            tokio::select! {
                _ = tokio::time::sleep(self.loop_delay) => {}
                _ = self.wake.notified() => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Perform one reconciliation tick. Exposed separately from [`run`] so
    /// tests can drive the controller deterministically.
    pub async fn tick(&self) {
        let (requested_mode, mode) = {
            let s = self.state.read();
            (s.requested_mode, s.mode)
        };

        let auto_failure = mode == OperationsMode::Error && requested_mode == OperationsMode::Automatic;
        if requested_mode != mode && !auto_failure {
            self.transition_mode(requested_mode).await;
        }

        if self.state.read().mode == OperationsMode::Automatic {
            self.reconcile().await;
        }

        let now = Utc::now();
        let verdict = self.verdict_source.current_verdict();
        let should_clear = self.state.read().window.as_ref().is_some_and(|w| {
            w.has_elapsed(now) || (now >= w.open_at && !verdict.safe)
        });
        if should_clear {
            self.clear_window();
        }
    }

    async fn transition_mode(&self, requested: OperationsMode) {
        info!(
            from = self.state.read().mode.label(),
            to = requested.label(),
            "changing enclosure mode"
        );
        let outcome = match requested {
            OperationsMode::Automatic => self.shutter.ping_heartbeat().await,
            _ => self.shutter.disable_heartbeat().await,
        };
        match outcome {
            Ok(()) => {
                self.set_mode(requested);
                if self.outage.record_success() == OutageTransition::Restored {
                    info!("restored contact with enclosure daemon");
                }
                info!(mode = requested.label(), "enclosure mode changed");
            }
            Err(_) => {
                if self.outage.record_failure() == OutageTransition::Started {
                    error!("lost contact with enclosure daemon");
                }
                self.set_mode(OperationsMode::Error);
            }
        }
    }

    async fn reconcile(&self) {
        let status = match self.shutter.query_status().await {
            Ok(status) => {
                if self.outage.record_success() == OutageTransition::Restored {
                    info!("restored contact with enclosure daemon");
                }
                status
            }
            Err(_) => {
                if self.outage.record_failure() == OutageTransition::Started {
                    error!("lost contact with enclosure daemon");
                }
                self.set_mode(OperationsMode::Error);
                return;
            }
        };
        self.set_status(status);

        if status == EnclosureStatus::Timeout {
            warn!("detected enclosure heartbeat timeout");
            self.set_mode(OperationsMode::Error);
            return;
        }

        let now = Utc::now();
        let verdict = self.verdict_source.current_verdict();
        let desired_open = {
            let s = self.state.read();
            self.desired_open(&s, &verdict, now)
        };

        match (desired_open, status) {
            (false, EnclosureStatus::Open) => {
                self.set_status(EnclosureStatus::Moving);
                match self.shutter.close().await {
                    Ok(()) => self.set_status(EnclosureStatus::Closed),
                    Err(_) => self.set_mode(OperationsMode::Error),
                }
            }
            (true, EnclosureStatus::Closed) => {
                self.set_status(EnclosureStatus::Moving);
                match self.shutter.open().await {
                    Ok(()) => self.set_status(EnclosureStatus::Open),
                    Err(_) => self.set_mode(OperationsMode::Error),
                }
            }
            _ if desired_open == (status == EnclosureStatus::Open)
                && verdict.age(now) < self.stale_limit =>
            {
                let _ = self.shutter.ping_heartbeat().await;
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockShutterApi;
    use opsd_protocol::SafetyVerdict;

    struct FixedVerdict(opsd_protocol::SafetyVerdict);
    impl VerdictSource for FixedVerdict {
        fn current_verdict(&self) -> opsd_protocol::SafetyVerdict {
            self.0.clone()
        }
    }

    fn safe_now() -> SafetyVerdict {
        SafetyVerdict {
            safe: true,
            unsafe_conditions: Default::default(),
            last_update: Utc::now(),
            internal_humidity: None,
            external_humidity: None,
        }
    }

    #[tokio::test]
    async fn manual_to_automatic_arms_heartbeat() {
        let shutter = Arc::new(MockShutterApi::new());
        let verdict = Arc::new(FixedVerdict(safe_now()));
        let ctl = EnclosureController::new(shutter.clone(), verdict, StdDuration::from_secs(10));
        ctl.request_mode(OperationsMode::Automatic);
        ctl.tick().await;
        assert_eq!(ctl.mode(), OperationsMode::Automatic);
        assert_eq!(shutter.heartbeat_pings(), 1);
    }

    #[tokio::test]
    async fn opens_inside_window_when_safe() {
        let shutter = Arc::new(MockShutterApi::new());
        let verdict = Arc::new(FixedVerdict(safe_now()));
        let ctl = EnclosureController::new(shutter.clone(), verdict, StdDuration::from_secs(10));
        ctl.request_mode(OperationsMode::Automatic);
        ctl.tick().await;

        let now = Utc::now();
        let window = DomeWindow::new(now - chrono::Duration::minutes(1), now + chrono::Duration::hours(1)).unwrap();
        assert!(ctl.install_window(window));
        ctl.tick().await;
        assert_eq!(ctl.status(), EnclosureStatus::Open);
    }

    #[tokio::test]
    async fn heartbeat_timeout_forces_error() {
        let shutter = Arc::new(MockShutterApi::new());
        shutter.set_status(EnclosureStatus::Timeout);
        let verdict = Arc::new(FixedVerdict(safe_now()));
        let ctl = EnclosureController::new(shutter, verdict, StdDuration::from_secs(10));
        ctl.request_mode(OperationsMode::Automatic);
        ctl.tick().await;
        ctl.tick().await;
        assert_eq!(ctl.mode(), OperationsMode::Error);
    }

    #[tokio::test]
    async fn error_to_automatic_is_rejected_silently() {
        let shutter = Arc::new(MockShutterApi::new());
        shutter.fail_heartbeat(true);
        let verdict = Arc::new(FixedVerdict(safe_now()));
        let ctl = EnclosureController::new(shutter.clone(), verdict, StdDuration::from_secs(10));
        ctl.request_mode(OperationsMode::Automatic);
        ctl.tick().await;
        assert_eq!(ctl.mode(), OperationsMode::Error);

        shutter.fail_heartbeat(false);
        ctl.request_mode(OperationsMode::Automatic);
        ctl.tick().await;
        assert_eq!(ctl.mode(), OperationsMode::Error);
    }

    #[tokio::test]
    async fn window_clears_once_elapsed() {
        let shutter = Arc::new(MockShutterApi::new());
        let verdict = Arc::new(FixedVerdict(safe_now()));
        let ctl = EnclosureController::new(shutter, verdict, StdDuration::from_secs(10));
        ctl.request_mode(OperationsMode::Automatic);
        ctl.tick().await;

        let now = Utc::now();
        let window = DomeWindow::new(now - chrono::Duration::hours(2), now - chrono::Duration::hours(1)).unwrap();
        ctl.install_window(window);
        ctl.tick().await;
        assert!(ctl.status_snapshot().window.is_none());
    }

    struct SwitchableVerdict(RwLock<SafetyVerdict>);
    impl VerdictSource for SwitchableVerdict {
        fn current_verdict(&self) -> opsd_protocol::SafetyVerdict {
            self.0.read().clone()
        }
    }

    #[tokio::test]
    async fn window_clears_on_first_unsafe_verdict_past_open() {
        let shutter = Arc::new(MockShutterApi::new());
        let verdict = Arc::new(SwitchableVerdict(RwLock::new(safe_now())));
        let ctl = EnclosureController::new(shutter, verdict.clone(), StdDuration::from_secs(10));
        ctl.request_mode(OperationsMode::Automatic);
        ctl.tick().await;

        let now = Utc::now();
        let window = DomeWindow::new(now - chrono::Duration::minutes(1), now + chrono::Duration::hours(1)).unwrap();
        ctl.install_window(window);
        ctl.tick().await;
        assert_eq!(ctl.status(), EnclosureStatus::Open);

        *verdict.0.write() = SafetyVerdict {
            safe: false,
            unsafe_conditions: Default::default(),
            last_update: Utc::now(),
            internal_humidity: None,
            external_humidity: None,
        };
        ctl.tick().await;
        assert!(ctl.status_snapshot().window.is_none());
        assert_eq!(ctl.status(), EnclosureStatus::Closed);
    }
}
