//! Wire types shared between the operations supervisor and its clients.
//!
//! This crate defines the serializable data model described in spec §3
//! ("Data Model") plus the RPC surface from §6 ("External Interfaces"). It
//! carries no behavior: the supervisor core (`opsd-core`) and facade
//! (`opsd-server`) are the only crates that interpret these types.
#![warn(missing_docs)]

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod rpc;

/// One value per controlled subsystem (Enclosure, Scheduler).
///
/// Transitions: `Manual <-> Automatic` by operator request; `Automatic ->
/// Error` on unrecoverable failure; `Error -> Manual` only by explicit
/// operator reset (never automatic).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationsMode {
    /// The subsystem is driving itself from policy with no operator in the loop.
    Automatic,
    /// An operator has taken direct control; the subsystem takes no automatic action.
    Manual,
    /// An unrecoverable failure occurred; only an explicit operator reset to
    /// `Manual` can clear this.
    Error,
}

impl OperationsMode {
    /// Human-readable label, matching the original daemon's status labels.
    pub fn label(self) -> &'static str {
        match self {
            OperationsMode::Automatic => "AUTOMATIC",
            OperationsMode::Manual => "MANUAL",
            OperationsMode::Error => "ERROR",
        }
    }
}

/// Reflects hardware telemetry plus heartbeat state for the enclosure shutter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EnclosureStatus {
    /// Shutter fully closed.
    Closed,
    /// Shutter fully open.
    Open,
    /// Shutter is transitioning between open and closed.
    Moving,
    /// Hardware reported a heartbeat watchdog trip; the shutter is closing itself.
    Timeout,
}

impl EnclosureStatus {
    /// Human-readable label, matching the original daemon's status labels.
    pub fn label(self) -> &'static str {
        match self {
            EnclosureStatus::Closed => "CLOSED",
            EnclosureStatus::Open => "OPEN",
            EnclosureStatus::Moving => "MOVING",
            EnclosureStatus::Timeout => "TIMEOUT",
        }
    }
}

/// The `(open_at, close_at)` interval during which the enclosure may be open.
///
/// Invariant: `open_at < close_at`. A schedule with no dome block installs no
/// window (`None` at the call site, not a variant of this type).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DomeWindow {
    /// Absolute UTC instant at which the enclosure may start opening.
    pub open_at: DateTime<Utc>,
    /// Absolute UTC instant after which the enclosure must be closed.
    pub close_at: DateTime<Utc>,
}

impl DomeWindow {
    /// Construct a window, checking the `open_at < close_at` invariant.
    pub fn new(open_at: DateTime<Utc>, close_at: DateTime<Utc>) -> Option<Self> {
        (open_at < close_at).then_some(Self { open_at, close_at })
    }

    /// True while `now` falls inside `[open_at, close_at)`.
    pub fn contains(&self, now: DateTime<Utc>) -> bool {
        self.open_at <= now && now < self.close_at
    }

    /// True once the window has fully elapsed (`now > close_at`).
    pub fn has_elapsed(&self, now: DateTime<Utc>) -> bool {
        now > self.close_at
    }
}

/// Status of a single condition-group watcher, as reported by the
/// environment aggregator for one sensor/parameter pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConditionStatus {
    /// No current reading for this watcher (stale or absent).
    Unknown,
    /// Reading is within safe bounds.
    Safe,
    /// Reading is outside safe bounds but not yet critical.
    ///
    /// Retained for reporting (matches the original's four-state enum) but
    /// does not by itself make a condition group unsafe; see
    /// [`ConditionStatus::is_unsafe`].
    Warning,
    /// Reading is outside safe bounds and critical.
    Unsafe,
}

impl ConditionStatus {
    /// Whether this status alone makes its group unsafe.
    pub fn is_unsafe(self) -> bool {
        matches!(self, ConditionStatus::Unsafe)
    }
}

/// The Environment Monitor's aggregated safety conclusion for one polling cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SafetyVerdict {
    /// Overall safe/unsafe conclusion (logical AND across condition groups).
    pub safe: bool,
    /// Names of condition groups found unsafe this cycle.
    pub unsafe_conditions: BTreeSet<String>,
    /// When this verdict was produced.
    pub last_update: DateTime<Utc>,
    /// Latest internal (dome) humidity reading, if any watcher had a current one.
    pub internal_humidity: Option<f64>,
    /// Latest external (site) humidity reading, if any watcher had a current one.
    pub external_humidity: Option<f64>,
}

impl SafetyVerdict {
    /// A verdict produced when the aggregator could not be reached at all:
    /// unsafe, with every named group marked unsafe.
    pub fn unreachable(group_names: impl IntoIterator<Item = String>, now: DateTime<Utc>) -> Self {
        Self {
            safe: false,
            unsafe_conditions: group_names.into_iter().collect(),
            last_update: now,
            internal_humidity: None,
            external_humidity: None,
        }
    }

    /// Age of this verdict relative to `now`.
    pub fn age(&self, now: DateTime<Utc>) -> chrono::Duration {
        now - self.last_update
    }

    /// True when this verdict is both `safe` and no older than `stale_limit`.
    pub fn is_fresh_and_safe(&self, now: DateTime<Utc>, stale_limit: chrono::Duration) -> bool {
        self.safe && self.age(now) < stale_limit
    }
}

/// Initial `Incomplete`; terminal `Complete` or `Error`. Transition to a
/// terminal state is irreversible for a given action instance (P4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionStatus {
    /// Action is still running (or not yet started).
    Incomplete,
    /// Action finished successfully. Terminal.
    Complete,
    /// Action finished with an error. Terminal.
    Error,
}

impl ActionStatus {
    /// Terminal statuses are `Complete` and `Error`.
    pub fn is_terminal(self) -> bool {
        !matches!(self, ActionStatus::Incomplete)
    }
}

/// One entry in the `ScheduleStatus` snapshot's action list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleEntry {
    /// The action's configured name.
    pub name: String,
    /// Ordered human-readable strings describing remaining work.
    pub task_labels: Vec<String>,
}

/// Snapshot of one mode-bearing subsystem (Enclosure or Scheduler) for
/// external display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubsystemStatus {
    /// Current operations mode.
    pub mode: OperationsMode,
    /// Mode the operator last requested (may lag `mode`; see §4.3 rule 2).
    pub requested_mode: OperationsMode,
    /// When `mode` last changed.
    pub mode_updated: DateTime<Utc>,
}

/// Enclosure-specific status, combining [`SubsystemStatus`] with hardware telemetry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnclosureStatusSnapshot {
    /// Mode bookkeeping shared with other subsystems.
    pub subsystem: SubsystemStatus,
    /// Current hardware-reported status.
    pub status: EnclosureStatus,
    /// When `status` last changed.
    pub status_updated: DateTime<Utc>,
    /// Currently installed dome window, if any.
    pub window: Option<DomeWindow>,
}

/// Combines scheduler and enclosure status with the action queue for
/// external display (spec §3 "ScheduleStatus snapshot", generalized to also
/// surface the enclosure the way an operator console needs).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SupervisorStatus {
    /// Scheduler subsystem status.
    pub scheduler: SubsystemStatus,
    /// Enclosure subsystem status.
    pub enclosure: EnclosureStatusSnapshot,
    /// Most recent safety verdict observed by the Enclosure.
    pub verdict: Option<SafetyVerdict>,
    /// Action queue in submission order, active action first.
    pub schedule: Vec<ScheduleEntry>,
}

/// A header key/value pair as delivered by, or returned to, the external
/// reduction pipeline. The core neither parses nor persists these beyond
/// routing (spec §3 "PipelineFrame / GuideProfile").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeaderCard {
    /// FITS-style header key.
    pub key: String,
    /// Header value, serialized as JSON for transport-neutrality.
    pub value: serde_json::Value,
}

/// Opaque frame header payload delivered by the pipeline.
pub type PipelineFrame = std::collections::BTreeMap<String, serde_json::Value>;

/// Opaque guide-profile payload: a header map plus two numeric vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GuideProfile {
    /// Header key/value pairs accompanying the profile.
    pub headers: PipelineFrame,
    /// X-axis profile samples.
    pub profile_x: Vec<f64>,
    /// Y-axis profile samples.
    pub profile_y: Vec<f64>,
}

/// A structured log entry, as described in spec §6 ("Logging").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRecord {
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Logical log name (subsystem or action `log_name`).
    pub log_name: String,
    /// Log level as a lowercase string (`"info"`, `"warn"`, …).
    pub level: String,
    /// Rendered message text.
    pub message: String,
}

/// Messages fanned out from the Facade to connected clients.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FacadeEvent {
    /// A structured log entry.
    Log(LogRecord),
    /// A full status snapshot, pushed after any state change.
    StatusChanged(Box<SupervisorStatus>),
    /// Header cards a just-completed frame/guide-profile callback returned,
    /// pushed so a client observing the pipeline path can correlate them.
    ExtraHeaderCards(Vec<HeaderCard>),
    /// Liveness heartbeat; payload is a monotonic milliseconds tick.
    Heartbeat(u64),
}

/// IPC transport helpers: channel aliases and the event codec.
pub mod ipc {
    use super::FacadeEvent;

    /// Default capacity for the bounded event pipeline to one client.
    pub const DEFAULT_EVENT_CHANNEL_CAPACITY: usize = 1_000;

    /// Tokio bounded sender for facade events.
    pub type EventTx = tokio::sync::mpsc::Sender<FacadeEvent>;
    /// Tokio bounded receiver for facade events.
    pub type EventRx = tokio::sync::mpsc::Receiver<FacadeEvent>;

    /// Create the standard bounded event channel (sender, receiver).
    pub fn event_channel() -> (EventTx, EventRx) {
        tokio::sync::mpsc::channel::<FacadeEvent>(DEFAULT_EVENT_CHANNEL_CAPACITY)
    }

    /// Codec for encoding/decoding facade events over MRPC.
    pub mod codec;

    /// Heartbeat tuning shared by server and client.
    pub mod heartbeat {
        use std::time::Duration;

        /// Default server -> client heartbeat interval.
        pub const INTERVAL_MS: u64 = 1_000;
        /// Default client tolerance before declaring the server gone.
        pub const TIMEOUT_MS: u64 = 5_000;

        /// Convenience accessor for the interval as a `Duration`.
        pub fn interval() -> Duration {
            Duration::from_millis(INTERVAL_MS)
        }

        /// Convenience accessor for the timeout as a `Duration`.
        pub fn timeout() -> Duration {
            Duration::from_millis(TIMEOUT_MS)
        }
    }
}
