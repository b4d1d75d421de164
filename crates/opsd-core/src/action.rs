//! Action Runtime Contract (spec §4.4): the capability set and shared base
//! primitives every observing action satisfies.

use std::{
    future::Future,
    panic::AssertUnwindSafe,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU8, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use opsd_protocol::{ActionStatus, GuideProfile, HeaderCard, PipelineFrame};
use tokio::sync::Notify;
use tracing::error;

/// Default interval at which [`ActionCore::wait_until_time_or_aborted`]
/// re-checks the abort flag even without an explicit wake (spec §4.4).
pub const DEFAULT_CHECK_INTERVAL: Duration = Duration::from_secs(10);

fn status_to_u8(s: ActionStatus) -> u8 {
    match s {
        ActionStatus::Incomplete => 0,
        ActionStatus::Complete => 1,
        ActionStatus::Error => 2,
    }
}

fn u8_to_status(v: u8) -> ActionStatus {
    match v {
        1 => ActionStatus::Complete,
        2 => ActionStatus::Error,
        _ => ActionStatus::Incomplete,
    }
}

/// Shared state every [`Action`] embeds: status, abort flag, dome-open
/// flag, and the wake signal `wait_until_time_or_aborted` waits on.
///
/// This is the "mandatory primitive" base from spec §4.4, kept as a plain
/// struct (rather than a blanket trait impl) so concrete actions compose it
/// as a field, the way `hotki_engine`'s per-mode state holds a `Ticker`.
pub struct ActionCore {
    name: String,
    log_name: String,
    status: AtomicU8,
    aborted: AtomicBool,
    dome_is_open: AtomicBool,
    wake: Arc<Notify>,
}

impl ActionCore {
    /// Construct a fresh core in the initial `Incomplete` status.
    pub fn new(name: impl Into<String>, log_name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            log_name: log_name.into(),
            status: AtomicU8::new(status_to_u8(ActionStatus::Incomplete)),
            aborted: AtomicBool::new(false),
            dome_is_open: AtomicBool::new(false),
            wake: Arc::new(Notify::new()),
        }
    }

    /// The action's configured name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The action's log name, for structured logging.
    pub fn log_name(&self) -> &str {
        &self.log_name
    }

    /// Current status. Safe to call concurrently with `run` (spec §4.4).
    pub fn status(&self) -> ActionStatus {
        u8_to_status(self.status.load(Ordering::SeqCst))
    }

    /// Transition to `Complete`. No-op if already terminal (P4).
    pub fn set_complete(&self) {
        self.set_terminal(ActionStatus::Complete);
    }

    /// Transition to `Error`. No-op if already terminal (P4).
    pub fn set_error(&self) {
        self.set_terminal(ActionStatus::Error);
    }

    fn set_terminal(&self, status: ActionStatus) {
        let _ = self.status.compare_exchange(
            status_to_u8(ActionStatus::Incomplete),
            status_to_u8(status),
            Ordering::SeqCst,
            Ordering::SeqCst,
        );
    }

    /// Request cooperative termination; wakes any pending
    /// `wait_until_time_or_aborted`. Idempotent and safe from another task.
    pub fn abort(&self) {
        self.aborted.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    /// Whether `abort()` has been called.
    pub fn is_aborted(&self) -> bool {
        self.aborted.load(Ordering::SeqCst)
    }

    /// Record the enclosure's current open/closed signal.
    pub fn set_dome_is_open(&self, open: bool) {
        self.dome_is_open.store(open, Ordering::SeqCst);
    }

    /// The last-observed enclosure open/closed signal.
    pub fn dome_is_open(&self) -> bool {
        self.dome_is_open.load(Ordering::SeqCst)
    }

    /// Sleep until `target` passes or [`abort`](Self::abort) is called,
    /// re-checking at least every `check_interval` (spec §4.4). Returns
    /// `true` iff the deadline was reached, `false` if aborted.
    pub async fn wait_until_time_or_aborted(
        &self,
        target: DateTime<Utc>,
        check_interval: Duration,
    ) -> bool {
        loop {
            if self.is_aborted() {
                return false;
            }
            let now = Utc::now();
            if now >= target {
                return true;
            }
            let remaining = (target - now)
                .to_std()
                .unwrap_or(Duration::from_secs(0));
            let wait = remaining.min(check_interval);
            tokio::select! {
                _ = tokio::time::sleep(wait) => {}
                _ = self.wake.notified() => {}
            }
        }
    }
}

/// The polymorphic contract every observing action implements (spec §4.4).
///
/// Sites implement this for their own catalog actions (autofocus v-curve,
/// sky-flat brightness loop, field acquisition, guided sidereal tracking);
/// the core only ever observes `status`, `task_labels`, and the
/// notification surface, never a concrete action's internal state machine.
#[async_trait]
pub trait Action: Send + Sync {
    /// Access to the shared base state every action embeds.
    fn core(&self) -> &ActionCore;

    /// The action's configured name.
    fn name(&self) -> &str {
        self.core().name()
    }

    /// Ordered human-readable strings describing remaining work. Must be
    /// safe to call concurrently with `run`. Defaults to empty, matching
    /// the original base class (spec "SUPPLEMENTED FEATURES").
    fn task_labels(&self) -> Vec<String> {
        Vec::new()
    }

    /// The worker body. Must leave `core().status()` terminal before
    /// returning; the base wrapper in [`ActionHandle::start`] forces
    /// `Error` if this panics (spec §4.4 "Exception policy").
    async fn run(&self);

    /// Request cooperative termination (spec §4.4).
    fn abort(&self) {
        self.core().abort();
    }

    /// Current status (spec §3 `ActionStatus`).
    fn status(&self) -> ActionStatus {
        self.core().status()
    }

    /// Notification of an enclosure open/closed transition.
    fn dome_status_changed(&self, open: bool) {
        self.core().set_dome_is_open(open);
    }

    /// Notification that a pipeline frame has been processed. Returns
    /// extra header cards to stamp onto the archived image, if any.
    fn received_frame(&self, _headers: &PipelineFrame) -> Option<Vec<HeaderCard>> {
        None
    }

    /// Notification that a guide profile has been computed.
    fn received_guide_profile(&self, _profile: &GuideProfile) -> Option<Vec<HeaderCard>> {
        None
    }
}

/// Owns a single action instance plus its single-shot worker task handle
/// (spec §3 "a single-shot worker task reference"; R3 "double-start of an
/// action is refused").
pub struct ActionHandle {
    action: Arc<dyn Action>,
    started: AtomicBool,
    join: parking_lot::Mutex<Option<tokio::task::JoinHandle<()>>>,
}

impl ActionHandle {
    /// Wrap an action, not yet started.
    pub fn new(action: Arc<dyn Action>) -> Self {
        Self {
            action,
            started: AtomicBool::new(false),
            join: parking_lot::Mutex::new(None),
        }
    }

    /// The wrapped action.
    pub fn action(&self) -> &Arc<dyn Action> {
        &self.action
    }

    /// Spawn the worker task on the first call; later calls are no-ops
    /// (R3). Sets `dome_is_open` before spawning, matching the original's
    /// `start(dome_is_open)`.
    pub fn start(&self, dome_is_open: bool) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }
        self.action.core().set_dome_is_open(dome_is_open);
        let action = self.action.clone();
        let handle = tokio::spawn(run_with_exception_policy(action));
        *self.join.lock() = Some(handle);
    }

    /// Current status, safe to call at any time.
    pub fn status(&self) -> ActionStatus {
        self.action.status()
    }
}

/// Runs `action.run()`, forcing `Error` status and logging if the body
/// panics instead of completing cooperatively (spec §4.4 "Exception
/// policy": "any exception escaping `run` is caught by the base").
async fn run_with_exception_policy(action: Arc<dyn Action>) {
    let log_name = action.core().log_name().to_string();
    let name = action.name().to_string();
    let fut = AssertUnwindSafe(run_future(action.clone()));
    if fut.catch_unwind().await.is_err() {
        error!(log_name = %log_name, action = %name, "exception in action run body");
        action.core().set_error();
    }
}

fn run_future(action: Arc<dyn Action>) -> impl Future<Output = ()> {
    async move { action.run().await }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    struct ImmediateComplete {
        core: ActionCore,
    }

    #[async_trait]
    impl Action for ImmediateComplete {
        fn core(&self) -> &ActionCore {
            &self.core
        }

        async fn run(&self) {
            self.core.set_complete();
        }
    }

    struct PanicsOnRun {
        core: ActionCore,
    }

    #[async_trait]
    impl Action for PanicsOnRun {
        fn core(&self) -> &ActionCore {
            &self.core
        }

        async fn run(&self) {
            panic!("boom");
        }
    }

    #[tokio::test]
    async fn double_start_is_refused() {
        static RUNS: AtomicUsize = AtomicUsize::new(0);

        struct CountingAction {
            core: ActionCore,
        }

        #[async_trait]
        impl Action for CountingAction {
            fn core(&self) -> &ActionCore {
                &self.core
            }
            async fn run(&self) {
                RUNS.fetch_add(1, Ordering::SeqCst);
                self.core.set_complete();
            }
        }

        let action = Arc::new(CountingAction {
            core: ActionCore::new("test", "opsd.test"),
        });
        let handle = ActionHandle::new(action);
        handle.start(true);
        handle.start(true);
        handle.start(true);

        for _ in 0..50 {
            if handle.status().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(RUNS.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn terminal_status_is_irreversible() {
        let action = Arc::new(ImmediateComplete {
            core: ActionCore::new("test", "opsd.test"),
        });
        let handle = ActionHandle::new(action.clone());
        handle.start(true);
        for _ in 0..50 {
            if handle.status().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(action.status(), ActionStatus::Complete);
        action.core().set_error();
        assert_eq!(action.status(), ActionStatus::Complete);
    }

    #[tokio::test]
    async fn panic_in_run_is_caught_and_forces_error() {
        let action = Arc::new(PanicsOnRun {
            core: ActionCore::new("test", "opsd.test"),
        });
        let handle = ActionHandle::new(action.clone());
        handle.start(true);
        for _ in 0..50 {
            if handle.status().is_terminal() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(action.status(), ActionStatus::Error);
    }

    /// Demonstrates that a site action with its own `start_date`/`end_date`
    /// window (spec §1 "conformance cases for the Action Runtime Contract")
    /// can be written against the seven-operation contract with no core
    /// changes: both boundary behaviors fall out of composing
    /// `wait_until_time_or_aborted` with a plain comparison in `run`.
    struct DatedAction {
        core: ActionCore,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        ran: std::sync::atomic::AtomicBool,
    }

    #[async_trait]
    impl Action for DatedAction {
        fn core(&self) -> &ActionCore {
            &self.core
        }

        async fn run(&self) {
            if self.start > self.end {
                self.core.set_complete();
                return;
            }
            self.core
                .wait_until_time_or_aborted(self.start, Duration::from_millis(10))
                .await;
            self.ran.store(true, Ordering::SeqCst);
            self.core.set_complete();
        }
    }

    #[tokio::test]
    async fn start_date_in_the_past_begins_immediately() {
        let now = Utc::now();
        let action = Arc::new(DatedAction {
            core: ActionCore::new("dated", "opsd.test"),
            start: now - chrono::Duration::hours(1),
            end: now + chrono::Duration::hours(1),
            ran: AtomicBool::new(false),
        });
        let handle = ActionHandle::new(action.clone());
        handle.start(true);
        tokio::time::timeout(Duration::from_millis(200), async {
            while !handle.status().is_terminal() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("a past start_date must not block completion");
        assert!(action.ran.load(Ordering::SeqCst));
        assert_eq!(action.status(), ActionStatus::Complete);
    }

    #[tokio::test]
    async fn start_after_end_completes_without_running() {
        let now = Utc::now();
        let action = Arc::new(DatedAction {
            core: ActionCore::new("dated", "opsd.test"),
            start: now + chrono::Duration::hours(2),
            end: now + chrono::Duration::hours(1),
            ran: AtomicBool::new(false),
        });
        let handle = ActionHandle::new(action.clone());
        handle.start(true);
        tokio::time::timeout(Duration::from_millis(200), async {
            while !handle.status().is_terminal() {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("start_date after end_date must complete without waiting");
        assert!(!action.ran.load(Ordering::SeqCst));
        assert_eq!(action.status(), ActionStatus::Complete);
    }

    #[tokio::test]
    async fn abort_wakes_a_pending_wait_promptly() {
        let core = ActionCore::new("test", "opsd.test");
        let target = Utc::now() + chrono::Duration::seconds(3600);
        let core_ref = &core;
        let waiter = async move {
            core_ref
                .wait_until_time_or_aborted(target, Duration::from_secs(30))
                .await
        };
        tokio::pin!(waiter);

        tokio::select! {
            _ = &mut waiter => panic!("should not resolve before abort"),
            _ = tokio::time::sleep(Duration::from_millis(20)) => {}
        }

        core.abort();
        let reached_deadline = tokio::time::timeout(Duration::from_millis(200), waiter)
            .await
            .expect("abort should wake the waiter promptly");
        assert!(!reached_deadline);
    }
}
