//! Environment Monitor (spec §4.1): reduces a device-indexed sensor
//! snapshot into a single [`SafetyVerdict`].

use std::{
    collections::BTreeMap,
    sync::Arc,
    time::Duration as StdDuration,
};

use chrono::{DateTime, Utc};
use opsd_protocol::{ConditionStatus, SafetyVerdict};
use parking_lot::RwLock;
use tokio::sync::Notify;
use tracing::{info, warn};

use crate::cancel::CancelToken;
use crate::deps::{EnvironmentApi, EnvironmentSnapshot};
use crate::outage::{OutageTracker, OutageTransition};

/// `(condition_key, device, parameter, label)`: one parameter source feeding
/// a named condition group (spec §3 "ConditionWatcher").
#[derive(Debug, Clone)]
pub struct ConditionWatcher {
    /// The condition group this watcher belongs to (e.g. `"wind"`).
    pub condition_key: String,
    /// Device name as indexed in the aggregator's snapshot.
    pub device: String,
    /// Parameter name within that device.
    pub parameter: String,
    /// Human-readable label for status displays.
    pub label: String,
}

impl ConditionWatcher {
    /// Construct a watcher.
    pub fn new(
        condition_key: impl Into<String>,
        device: impl Into<String>,
        parameter: impl Into<String>,
        label: impl Into<String>,
    ) -> Self {
        Self {
            condition_key: condition_key.into(),
            device: device.into(),
            parameter: parameter.into(),
            label: label.into(),
        }
    }

    /// Resolve this watcher's status against a snapshot.
    fn status(&self, snapshot: &EnvironmentSnapshot) -> ConditionStatus {
        match snapshot
            .get(&self.device)
            .and_then(|params| params.get(&self.parameter))
        {
            Some(reading) if reading.unsafe_ => ConditionStatus::Unsafe,
            Some(reading) if reading.current => ConditionStatus::Safe,
            Some(_) => ConditionStatus::Unknown,
            None => ConditionStatus::Unknown,
        }
    }

    /// Resolve this watcher's latest numeric reading, if current.
    fn latest(&self, snapshot: &EnvironmentSnapshot) -> Option<f64> {
        let reading = snapshot.get(&self.device)?.get(&self.parameter)?;
        reading.current.then_some(reading.latest).flatten()
    }
}

/// Default staleness horizon for a [`SafetyVerdict`] (spec §4.1, default 30s).
pub const DEFAULT_STALE_LIMIT: StdDuration = StdDuration::from_secs(30);

/// Periodically polls the environment aggregator and reduces the result to
/// a [`SafetyVerdict`] (spec §4.1).
pub struct EnvironmentMonitor {
    api: Arc<dyn EnvironmentApi>,
    watchers: Vec<ConditionWatcher>,
    poll_period: StdDuration,
    verdict: Arc<RwLock<SafetyVerdict>>,
    wake: Arc<Notify>,
    outage: OutageTracker,
}

impl EnvironmentMonitor {
    /// Construct a monitor. `watchers` is the static condition-group list
    /// from config (spec §6 "environment_conditions").
    pub fn new(
        api: Arc<dyn EnvironmentApi>,
        watchers: Vec<ConditionWatcher>,
        poll_period: StdDuration,
    ) -> Self {
        let now = Utc::now();
        let group_names = Self::group_names(&watchers);
        Self {
            api,
            watchers,
            poll_period,
            verdict: Arc::new(RwLock::new(SafetyVerdict::unreachable(group_names, now))),
            wake: Arc::new(Notify::new()),
            outage: OutageTracker::new(),
        }
    }

    fn group_names(watchers: &[ConditionWatcher]) -> Vec<String> {
        let mut names: Vec<String> = watchers
            .iter()
            .map(|w| w.condition_key.clone())
            .collect();
        names.sort();
        names.dedup();
        names
    }

    /// A cheap snapshot read of the latest published verdict, usable by
    /// other components (e.g. the Enclosure Controller) without holding any
    /// cross-component lock (spec §5).
    pub fn current_verdict(&self) -> SafetyVerdict {
        self.verdict.read().clone()
    }

    /// Handle used to wake the monitor's poll loop immediately (not
    /// currently exercised externally, but mirrors the
    /// shortcut-loop-wait pattern used by the other two permanent tasks).
    pub fn waker(&self) -> Arc<Notify> {
        self.wake.clone()
    }

    /// Run the poll loop until cancelled. Intended to be spawned as one of
    /// the three permanent cooperative tasks (spec §2, §5).
    pub async fn run(&self, cancel: CancelToken) {
        loop {
            self.poll_once().await;
            tokio::select! {
                _ = tokio::time::sleep(self.poll_period) => {}
                _ = self.wake.notified() => {}
                _ = cancel.cancelled() => return,
            }
        }
    }

    /// Perform a single poll-and-reduce cycle. Exposed separately from
    /// [`run`] so tests can drive the monitor deterministically.
    pub async fn poll_once(&self) {
        let now = Utc::now();
        let was_safe = self.verdict.read().safe;

        let new_verdict = match self.api.status().await {
            Ok(snapshot) => {
                self.outage.record_success();
                self.reduce(&snapshot, now)
            }
            Err(_) => {
                if self.outage.record_failure() == OutageTransition::Started {
                    warn!("failed to query environment aggregator");
                }
                SafetyVerdict::unreachable(Self::group_names(&self.watchers), now)
            }
        };

        if was_safe && !new_verdict.safe {
            warn!("environment unsafe");
        } else if !was_safe && new_verdict.safe {
            info!("environment safe");
        }

        *self.verdict.write() = new_verdict;
    }

    fn reduce(&self, snapshot: &EnvironmentSnapshot, now: DateTime<Utc>) -> SafetyVerdict {
        let mut by_group: BTreeMap<&str, Vec<&ConditionWatcher>> = BTreeMap::new();
        for w in &self.watchers {
            by_group.entry(w.condition_key.as_str()).or_default().push(w);
        }

        let mut safe = true;
        let mut unsafe_conditions = std::collections::BTreeSet::new();
        for (group, watchers) in &by_group {
            let statuses: Vec<ConditionStatus> =
                watchers.iter().map(|w| w.status(snapshot)).collect();
            let all_unknown = statuses.iter().all(|s| *s == ConditionStatus::Unknown);
            let any_unsafe = statuses.iter().any(|s| s.is_unsafe());
            if all_unknown || any_unsafe {
                safe = false;
                unsafe_conditions.insert((*group).to_string());
            }
        }

        let internal_humidity = by_group
            .get("internal_humidity")
            .into_iter()
            .flatten()
            .find_map(|w| w.latest(snapshot));
        let external_humidity = by_group
            .get("humidity")
            .into_iter()
            .flatten()
            .find_map(|w| w.latest(snapshot));

        SafetyVerdict {
            safe,
            unsafe_conditions,
            last_update: now,
            internal_humidity,
            external_humidity,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::MockEnvironmentApi;

    #[tokio::test]
    async fn unsafe_when_all_watchers_unknown() {
        let api = Arc::new(MockEnvironmentApi::new());
        let watchers = vec![ConditionWatcher::new("wind", "vaisala", "wind_speed", "W1m")];
        let monitor = EnvironmentMonitor::new(api, watchers, StdDuration::from_secs(10));
        monitor.poll_once().await;
        let verdict = monitor.current_verdict();
        assert!(!verdict.safe);
        assert!(verdict.unsafe_conditions.contains("wind"));
    }

    #[tokio::test]
    async fn safe_when_every_group_has_a_safe_reading() {
        let api = Arc::new(MockEnvironmentApi::new());
        api.set_safe("vaisala", "wind_speed", 3.0);
        api.set_safe("roomalert", "internal_humidity", 40.0);
        let watchers = vec![
            ConditionWatcher::new("wind", "vaisala", "wind_speed", "W1m"),
            ConditionWatcher::new("internal_humidity", "roomalert", "internal_humidity", "W1m"),
        ];
        let monitor = EnvironmentMonitor::new(api, watchers, StdDuration::from_secs(10));
        monitor.poll_once().await;
        let verdict = monitor.current_verdict();
        assert!(verdict.safe);
        assert_eq!(verdict.internal_humidity, Some(40.0));
    }

    #[tokio::test]
    async fn any_unsafe_watcher_makes_group_unsafe() {
        let api = Arc::new(MockEnvironmentApi::new());
        api.set_safe("vaisala", "wind_speed", 3.0);
        api.set_unsafe("goto_vaisala", "wind_speed", 99.0);
        let watchers = vec![
            ConditionWatcher::new("wind", "vaisala", "wind_speed", "W1m"),
            ConditionWatcher::new("wind", "goto_vaisala", "wind_speed", "GOTO"),
        ];
        let monitor = EnvironmentMonitor::new(api, watchers, StdDuration::from_secs(10));
        monitor.poll_once().await;
        assert!(!monitor.current_verdict().safe);
    }

    #[tokio::test]
    async fn aggregator_unreachable_marks_every_group_unsafe() {
        let api = Arc::new(MockEnvironmentApi::new());
        api.set_unreachable(true);
        let watchers = vec![
            ConditionWatcher::new("wind", "vaisala", "wind_speed", "W1m"),
            ConditionWatcher::new("rain", "vaisala", "accumulated_rain", "W1m"),
        ];
        let monitor = EnvironmentMonitor::new(api, watchers, StdDuration::from_secs(10));
        monitor.poll_once().await;
        let verdict = monitor.current_verdict();
        assert!(!verdict.safe);
        assert_eq!(verdict.unsafe_conditions.len(), 2);
    }
}
