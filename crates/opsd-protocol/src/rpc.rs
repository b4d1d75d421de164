//! RPC method names, notifications, and stable error codes for the
//! Supervisor Facade (spec §6 "External Interfaces").

use serde::{Deserialize, Serialize};

/// Methods the Facade exposes over its Unix-domain-socket RPC service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacadeMethod {
    /// Submit a schedule descriptor for tonight (replaces any queued-but-not-started entries).
    SubmitSchedule,
    /// Request a mode change for the Enclosure subsystem.
    RequestEnclosureMode,
    /// Request a mode change for the Scheduler subsystem.
    RequestSchedulerMode,
    /// Force-clear the installed dome window (used to end observing early).
    ClearDomeWindow,
    /// Abort the currently running action, if any, and stop consuming the queue.
    StopSchedule,
    /// Fetch a full status snapshot.
    Status,
    /// Deliver a pipeline frame header to the active action.
    NotifyFrame,
    /// Deliver a guide profile to the active action.
    NotifyGuideProfile,
    /// Cleanly stop the daemon.
    Shutdown,
}

impl FacadeMethod {
    /// The wire string for this method, used as the MRPC method name.
    pub fn as_str(self) -> &'static str {
        match self {
            FacadeMethod::SubmitSchedule => "submit_schedule",
            FacadeMethod::RequestEnclosureMode => "request_enclosure_mode",
            FacadeMethod::RequestSchedulerMode => "request_scheduler_mode",
            FacadeMethod::ClearDomeWindow => "clear_dome_window",
            FacadeMethod::StopSchedule => "stop_schedule",
            FacadeMethod::Status => "status",
            FacadeMethod::NotifyFrame => "notify_frame",
            FacadeMethod::NotifyGuideProfile => "notify_guide_profile",
            FacadeMethod::Shutdown => "shutdown",
        }
    }

    /// Parse a wire method name back into a [`FacadeMethod`].
    pub fn try_from_str(s: &str) -> Option<Self> {
        Some(match s {
            "submit_schedule" => FacadeMethod::SubmitSchedule,
            "request_enclosure_mode" => FacadeMethod::RequestEnclosureMode,
            "request_scheduler_mode" => FacadeMethod::RequestSchedulerMode,
            "clear_dome_window" => FacadeMethod::ClearDomeWindow,
            "stop_schedule" => FacadeMethod::StopSchedule,
            "status" => FacadeMethod::Status,
            "notify_frame" => FacadeMethod::NotifyFrame,
            "notify_guide_profile" => FacadeMethod::NotifyGuideProfile,
            "shutdown" => FacadeMethod::Shutdown,
            _ => return None,
        })
    }
}

/// Server-to-client notification names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FacadeNotification {
    /// A [`crate::FacadeEvent`] is attached as the notification's single parameter.
    Event,
}

impl FacadeNotification {
    /// The wire string for this notification.
    pub fn as_str(self) -> &'static str {
        match self {
            FacadeNotification::Event => "event",
        }
    }
}

/// Stable, string-keyed error codes surfaced as `mrpc::ServiceError.name`.
///
/// These map 1:1 to the distinct small integers a CLI exits with (spec §6
/// "exit codes"); see [`RpcErrorCode::exit_code`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum RpcErrorCode {
    /// The submitted schedule descriptor failed validation.
    #[error("invalid_schedule")]
    InvalidSchedule,
    /// A mode-change or clear-window request was rejected because the
    /// Enclosure is not in `Automatic`.
    #[error("dome_not_automatic")]
    DomeNotAutomatic,
    /// A schedule-affecting request was rejected because the Scheduler is
    /// not in `Automatic`.
    #[error("scheduler_not_automatic")]
    SchedulerNotAutomatic,
    /// The request originated from a host not in the configured control list.
    #[error("invalid_control_ip")]
    InvalidControlIp,
    /// The subsystem the request targets is latched in `Error`.
    #[error("in_error_state")]
    InErrorState,
    /// Unknown RPC method name.
    #[error("method_not_found")]
    MethodNotFound,
    /// A parameter had the wrong shape/type.
    #[error("invalid_type")]
    InvalidType,
    /// A required parameter was missing.
    #[error("missing_params")]
    MissingParams,
    /// The request is well-formed but cannot be satisfied right now (e.g.
    /// queue already draining a stop request).
    #[error("blocked")]
    Blocked,
}

impl RpcErrorCode {
    /// The CLI exit code this error maps to (spec §6 "exit codes"; codes 0-3
    /// and 10 are named directly, the rest are this crate's own stable
    /// small-integer assignment for the remaining named errors).
    pub fn exit_code(self) -> i32 {
        match self {
            RpcErrorCode::InvalidSchedule => 21,
            RpcErrorCode::DomeNotAutomatic => 22,
            RpcErrorCode::SchedulerNotAutomatic => 24,
            RpcErrorCode::InvalidControlIp => 10,
            RpcErrorCode::InErrorState => 3,
            RpcErrorCode::MethodNotFound => 1,
            RpcErrorCode::InvalidType => 1,
            RpcErrorCode::MissingParams => 1,
            RpcErrorCode::Blocked => 2,
        }
    }

    /// The stable wire name, identical to the `Display`/`Error` string.
    pub fn name(self) -> String {
        self.to_string()
    }

    /// Parse a [`ServiceError`](mrpc::ServiceError)'s `name` back into a
    /// code, for a CLI client mapping the Facade's response to an exit code.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "invalid_schedule" => RpcErrorCode::InvalidSchedule,
            "dome_not_automatic" => RpcErrorCode::DomeNotAutomatic,
            "scheduler_not_automatic" => RpcErrorCode::SchedulerNotAutomatic,
            "invalid_control_ip" => RpcErrorCode::InvalidControlIp,
            "in_error_state" => RpcErrorCode::InErrorState,
            "method_not_found" => RpcErrorCode::MethodNotFound,
            "invalid_type" => RpcErrorCode::InvalidType,
            "missing_params" => RpcErrorCode::MissingParams,
            "blocked" => RpcErrorCode::Blocked,
            _ => return None,
        })
    }
}

/// The raw JSON shape of a nightly schedule descriptor, as accepted by
/// `submit_schedule` (spec §6 "Schedule descriptor"). `opsd-config` is
/// responsible for validating and resolving this into the core's internal
/// representation; this type only describes the wire shape.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScheduleDescriptor {
    /// The night this schedule covers, `YYYY-MM-DD`.
    pub night: String,
    /// Dome window for the night, or `None` to leave the enclosure untouched.
    pub dome: Option<DomeWindowDescriptor>,
    /// Ordered list of actions to run.
    pub actions: Vec<ActionDescriptor>,
}

/// Raw dome window shape: either `"auto"` (sunset/sunrise) or explicit
/// ISO-8601 timestamps.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DomeWindowDescriptor {
    /// `"auto"` or an explicit ISO-8601 UTC timestamp.
    pub open: String,
    /// `"auto"` or an explicit ISO-8601 UTC timestamp.
    pub close: String,
}

/// Raw action shape: a type tag plus free-form per-type parameters,
/// validated against the action catalog by `opsd-config`.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ActionDescriptor {
    /// Action type name, looked up in the action catalog.
    #[serde(rename = "type")]
    pub action_type: String,
    /// Remaining fields, passed through verbatim to the action's
    /// `validate_config`/constructor.
    #[serde(flatten)]
    pub params: serde_json::Value,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_roundtrips() {
        for m in [
            FacadeMethod::SubmitSchedule,
            FacadeMethod::RequestEnclosureMode,
            FacadeMethod::RequestSchedulerMode,
            FacadeMethod::ClearDomeWindow,
            FacadeMethod::StopSchedule,
            FacadeMethod::Status,
            FacadeMethod::NotifyFrame,
            FacadeMethod::NotifyGuideProfile,
            FacadeMethod::Shutdown,
        ] {
            assert_eq!(FacadeMethod::try_from_str(m.as_str()), Some(m));
        }
        assert_eq!(FacadeMethod::try_from_str("bogus"), None);
    }

    #[test]
    fn error_code_names_are_stable_strings() {
        assert_eq!(RpcErrorCode::InvalidSchedule.name(), "invalid_schedule");
        assert_eq!(RpcErrorCode::DomeNotAutomatic.name(), "dome_not_automatic");
    }

    #[test]
    fn exit_codes_match_named_constants() {
        assert_eq!(RpcErrorCode::InvalidControlIp.exit_code(), 10);
        assert_eq!(RpcErrorCode::InErrorState.exit_code(), 3);
        assert_eq!(RpcErrorCode::Blocked.exit_code(), 2);
    }

    #[test]
    fn from_name_roundtrips_every_code() {
        for code in [
            RpcErrorCode::InvalidSchedule,
            RpcErrorCode::DomeNotAutomatic,
            RpcErrorCode::SchedulerNotAutomatic,
            RpcErrorCode::InvalidControlIp,
            RpcErrorCode::InErrorState,
            RpcErrorCode::MethodNotFound,
            RpcErrorCode::InvalidType,
            RpcErrorCode::MissingParams,
            RpcErrorCode::Blocked,
        ] {
            assert_eq!(RpcErrorCode::from_name(&code.name()), Some(code));
        }
        assert_eq!(RpcErrorCode::from_name("bogus"), None);
    }

    #[test]
    fn schedule_descriptor_parses_flattened_action_params() {
        let raw = serde_json::json!({
            "night": "2026-07-28",
            "dome": {"open": "auto", "close": "auto"},
            "actions": [
                {"type": "ParkTelescope"},
                {"type": "AcquireField", "ra": 10.5, "dec": -5.0}
            ]
        });
        let descriptor: ScheduleDescriptor = serde_json::from_value(raw).unwrap();
        assert_eq!(descriptor.night, "2026-07-28");
        assert_eq!(descriptor.actions.len(), 2);
        assert_eq!(descriptor.actions[1].action_type, "AcquireField");
        assert_eq!(descriptor.actions[1].params["ra"], 10.5);
    }
}
