//! Action Scheduler (spec §4.3): sequences actions through a single
//! execution slot, arbitrates manual/automatic/error mode, and routes
//! pipeline events to the active action.
//!
//! Grounded on `telescope_controller.py`'s `__run` loop: the same
//! dome-is-open computation, the same "manual mode waits for the active
//! slot to empty" rule, and the same implicit `ParkTelescope` auto-enqueue
//! when the queue drains.

use std::{
    collections::VecDeque,
    sync::Arc,
    time::Duration as StdDuration,
};

use chrono::{DateTime, Utc};
use opsd_protocol::{ActionStatus, GuideProfile, HeaderCard, OperationsMode, PipelineFrame, ScheduleEntry, SubsystemStatus};
use parking_lot::Mutex;
use tokio::sync::Notify;
use tracing::{error, info};

use crate::action::{Action, ActionHandle};
use crate::cancel::CancelToken;
use crate::enclosure::EnclosureController;

struct State {
    mode: OperationsMode,
    requested_mode: OperationsMode,
    status_updated: DateTime<Utc>,
    queue: VecDeque<Arc<dyn Action>>,
    active: Option<ActionHandle>,
    idle: bool,
    dome_was_open: bool,
}

/// Runs the queue of actions and arbitrates modes (spec §4.3).
pub struct ActionScheduler {
    enclosure: Arc<EnclosureController>,
    park_factory: Box<dyn Fn() -> Arc<dyn Action> + Send + Sync>,
    loop_delay: StdDuration,
    state: Mutex<State>,
    wake: Arc<Notify>,
}

impl ActionScheduler {
    /// Construct a scheduler. `park_factory` builds a fresh `ParkTelescope`
    /// instance each time the implicit stow action is enqueued.
    pub fn new(
        enclosure: Arc<EnclosureController>,
        park_factory: impl Fn() -> Arc<dyn Action> + Send + Sync + 'static,
        loop_delay: StdDuration,
    ) -> Self {
        Self {
            enclosure,
            park_factory: Box::new(park_factory),
            loop_delay,
            state: Mutex::new(State {
                mode: OperationsMode::Manual,
                requested_mode: OperationsMode::Manual,
                status_updated: Utc::now(),
                queue: VecDeque::new(),
                active: None,
                idle: true,
                dome_was_open: false,
            }),
            wake: Arc::new(Notify::new()),
        }
    }

    /// Wake handle used by the Facade to shortcut the loop's sleep.
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Current mode.
    pub fn mode(&self) -> OperationsMode {
        self.state.lock().mode
    }

    /// Mode-bearing status for the Supervisor Facade's `status()` RPC (spec
    /// §6). The scheduler has no hardware-reported status distinct from its
    /// mode, so `mode_updated` doubles as `status_updated`.
    pub fn subsystem_status(&self) -> SubsystemStatus {
        let s = self.state.lock();
        SubsystemStatus {
            mode: s.mode,
            requested_mode: s.requested_mode,
            mode_updated: s.status_updated,
        }
    }

    /// Request a mode transition, applied on the next tick (spec §6
    /// `request_scheduler_mode`).
    pub fn request_mode(&self, mode: OperationsMode) {
        self.state.lock().requested_mode = mode;
        self.wake.notify_waiters();
    }

    /// Append actions to the tail of the queue, preserving submission order
    /// (spec §4.3 "Queue ordering"). Rejected unless currently Automatic
    /// (spec §6 `submit_schedule` / `TelescopeNotAutomatic`).
    pub fn enqueue(&self, actions: Vec<Arc<dyn Action>>) -> bool {
        let mut s = self.state.lock();
        if s.mode != OperationsMode::Automatic {
            return false;
        }
        s.queue.extend(actions);
        drop(s);
        self.wake.notify_waiters();
        true
    }

    /// Abort the active action (if any) and clear the queue (spec §4.3,
    /// §6 `stop_telescope`). Idempotent and asynchronous.
    pub fn abort(&self) {
        let mut s = self.state.lock();
        if let Some(active) = &s.active {
            active.action().abort();
        }
        s.queue.clear();
        drop(s);
        self.wake.notify_waiters();
    }

    /// Status snapshot for the Supervisor Facade (spec §3 `ScheduleEntry`,
    /// ordered with the active action first, then the queue in submission
    /// order).
    pub fn status_snapshot(&self) -> Vec<ScheduleEntry> {
        let s = self.state.lock();
        let mut entries = Vec::new();
        if let Some(active) = &s.active {
            if active.status() == ActionStatus::Incomplete {
                entries.push(ScheduleEntry {
                    name: active.action().name().to_string(),
                    task_labels: active.action().task_labels(),
                });
            }
        }
        for action in &s.queue {
            entries.push(ScheduleEntry {
                name: action.name().to_string(),
                task_labels: action.task_labels(),
            });
        }
        entries
    }

    /// Route a processed-frame notification to the active action, if any
    /// and Incomplete (spec §4.3 "Pipeline event routing").
    pub fn notify_frame(&self, headers: &PipelineFrame) -> Option<Vec<HeaderCard>> {
        let s = self.state.lock();
        let active = s.active.as_ref()?;
        if active.status() != ActionStatus::Incomplete {
            return None;
        }
        active.action().received_frame(headers)
    }

    /// Route a guide-profile notification to the active action, if any and
    /// Incomplete.
    pub fn notify_guide_profile(&self, profile: &GuideProfile) -> Option<Vec<HeaderCard>> {
        let s = self.state.lock();
        let active = s.active.as_ref()?;
        if active.status() != ActionStatus::Incomplete {
            return None;
        }
        active.action().received_guide_profile(profile)
    }

    fn dome_is_open(&self) -> bool {
        self.enclosure.status() == opsd_protocol::EnclosureStatus::Open
            || self.enclosure.mode() == OperationsMode::Manual
    }

    /// Run the scheduling loop until cancelled (spec §2, §5).
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

    /// Perform one scheduling tick. Exposed separately from [`run`] so
    /// tests can drive the scheduler deterministically.
    pub async fn tick(&self) {
        let dome_is_open = self.dome_is_open();

        let (requested_mode, mode) = {
            let s = self.state.lock();
            (s.requested_mode, s.mode)
        };
        let auto_failure = mode == OperationsMode::Error && requested_mode == OperationsMode::Automatic;

        if requested_mode != mode && !auto_failure {
            info!(from = mode.label(), to = requested_mode.label(), "changing scheduler mode");
            match requested_mode {
                OperationsMode::Manual => {
                    let mut s = self.state.lock();
                    if !s.queue.is_empty() {
                        if let Some(active) = &s.active {
                            active.action().abort();
                        }
                        info!("aborting action queue");
                        s.queue.clear();
                    } else if s.active.is_none() {
                        s.mode = OperationsMode::Manual;
                    }
                }
                OperationsMode::Automatic => {
                    self.state.lock().mode = OperationsMode::Automatic;
                }
                OperationsMode::Error => {}
            }
            self.state.lock().status_updated = Utc::now();
        }

        if self.state.lock().mode != OperationsMode::Manual {
            self.drive_active_slot(dome_is_open).await;
        }

        self.state.lock().dome_was_open = dome_is_open;
    }

    async fn drive_active_slot(&self, dome_is_open: bool) {
        let starting = {
            let mut s = self.state.lock();
            if s.active.is_none() {
                if let Some(next) = s.queue.pop_front() {
                    s.idle = false;
                    s.active = Some(ActionHandle::new(next));
                } else if !s.idle && s.requested_mode != OperationsMode::Manual {
                    let park = (self.park_factory)();
                    s.active = Some(ActionHandle::new(park));
                }
            }
            s.active.is_some()
        };
        if starting {
            let s = self.state.lock();
            if let Some(active) = &s.active {
                active.start(dome_is_open);
            }
        }

        let status = {
            let s = self.state.lock();
            s.active.as_ref().map(|a| a.status())
        };
        let Some(status) = status else { return };

        match status {
            ActionStatus::Error => {
                let name = {
                    let s = self.state.lock();
                    s.active.as_ref().map(|a| a.action().name().to_string())
                };
                error!(action = name.as_deref().unwrap_or("?"), "action failed");
                info!("aborting action queue and parking telescope");
                let mut s = self.state.lock();
                s.queue.clear();
                s.mode = OperationsMode::Error;
                s.active = None;
            }
            ActionStatus::Incomplete => {
                let was_open = self.state.lock().dome_was_open;
                if dome_is_open != was_open {
                    let s = self.state.lock();
                    if let Some(active) = &s.active {
                        active.action().dome_status_changed(dome_is_open);
                    }
                }
            }
            ActionStatus::Complete => {
                let mut s = self.state.lock();
                if s.active.as_ref().is_some_and(|a| a.action().name() == "ParkTelescope") {
                    s.idle = true;
                }
                s.active = None;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::ActionCore;
    use crate::enclosure::VerdictSource;
    use crate::test_support::MockShutterApi;
    use async_trait::async_trait;
    use opsd_protocol::SafetyVerdict;

    struct FixedVerdict;
    impl VerdictSource for FixedVerdict {
        fn current_verdict(&self) -> SafetyVerdict {
            SafetyVerdict {
                safe: true,
                unsafe_conditions: Default::default(),
                last_update: Utc::now(),
                internal_humidity: None,
                external_humidity: None,
            }
        }
    }

    struct InstantComplete {
        core: ActionCore,
    }
    #[async_trait]
    impl Action for InstantComplete {
        fn core(&self) -> &ActionCore {
            &self.core
        }
        async fn run(&self) {
            self.core.set_complete();
        }
    }

    fn scheduler() -> ActionScheduler {
        let shutter = Arc::new(MockShutterApi::new());
        let enclosure = Arc::new(EnclosureController::new(shutter, Arc::new(FixedVerdict), StdDuration::from_secs(10)));
        ActionScheduler::new(
            enclosure,
            || {
                Arc::new(InstantComplete { core: ActionCore::new("ParkTelescope", "opsd.scheduler") })
            },
            StdDuration::from_millis(10),
        )
    }

    async fn settle(sched: &ActionScheduler) {
        for _ in 0..50 {
            sched.tick().await;
            tokio::time::sleep(StdDuration::from_millis(2)).await;
        }
    }

    #[tokio::test]
    async fn queue_runs_in_submission_order() {
        let sched = scheduler();
        sched.request_mode(OperationsMode::Automatic);
        sched.tick().await;
        let a = Arc::new(InstantComplete { core: ActionCore::new("A", "opsd.scheduler") });
        let b = Arc::new(InstantComplete { core: ActionCore::new("B", "opsd.scheduler") });
        assert!(sched.enqueue(vec![a, b]));
        let names: Vec<String> = sched.status_snapshot().into_iter().map(|e| e.name).collect();
        assert_eq!(names, vec!["A".to_string(), "B".to_string()]);
    }

    #[tokio::test]
    async fn drains_queue_then_parks() {
        let sched = scheduler();
        sched.request_mode(OperationsMode::Automatic);
        sched.tick().await;
        let a = Arc::new(InstantComplete { core: ActionCore::new("A", "opsd.scheduler") });
        sched.enqueue(vec![a]);
        settle(&sched).await;
        assert!(sched.status_snapshot().is_empty());
    }

    #[tokio::test]
    async fn manual_request_waits_for_active_slot_to_empty() {
        let sched = scheduler();
        sched.request_mode(OperationsMode::Automatic);
        sched.tick().await;
        let a = Arc::new(InstantComplete { core: ActionCore::new("A", "opsd.scheduler") });
        sched.enqueue(vec![a]);
        sched.request_mode(OperationsMode::Manual);
        sched.tick().await;
        assert_eq!(sched.mode(), OperationsMode::Automatic);
        settle(&sched).await;
        sched.tick().await;
        assert_eq!(sched.mode(), OperationsMode::Manual);
    }
}
