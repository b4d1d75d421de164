//! Wires the three permanent state machines together behind the
//! access-controlled operations the Facade's RPC service dispatches to
//! (spec §6 "Supervisor Facade").
//!
//! Grounded on `hotki-server`'s `HotkeyService`/`Engine` split: the engine
//! owns domain state and exposes plain async methods, the IPC layer only
//! translates wire calls into them. Here the "engine" role is split further,
//! across the three core components it already has, with this struct as the
//! thin composition root that adds access control and schedule ingest.

use std::net::IpAddr;

use chrono::Utc;
use opsd_config::DaemonConfig;
use opsd_core::catalog::ActionCatalog;
use opsd_core::enclosure::EnclosureController;
use opsd_core::environment::EnvironmentMonitor;
use opsd_core::scheduler::ActionScheduler;
use opsd_protocol::rpc::{RpcErrorCode, ScheduleDescriptor};
use opsd_protocol::{GuideProfile, HeaderCard, OperationsMode, PipelineFrame, SupervisorStatus};
use std::sync::Arc;

/// The set of violation strings attached to an [`RpcErrorCode::InvalidSchedule`].
pub type Violations = Vec<String>;

/// Composition root: the three permanent tasks, the action catalog, and the
/// access-control lists the daemon config names (spec §6 "Access control").
pub struct Supervisor {
    environment: Arc<EnvironmentMonitor>,
    enclosure: Arc<EnclosureController>,
    scheduler: Arc<ActionScheduler>,
    catalog: ActionCatalog,
    control_machines: Vec<IpAddr>,
    pipeline_machines: Vec<IpAddr>,
    log_name: String,
}

impl Supervisor {
    /// Assemble a supervisor from already-constructed components and the
    /// daemon configuration's access-control lists.
    pub fn new(
        environment: Arc<EnvironmentMonitor>,
        enclosure: Arc<EnclosureController>,
        scheduler: Arc<ActionScheduler>,
        catalog: ActionCatalog,
        config: &DaemonConfig,
    ) -> Self {
        Self {
            environment,
            enclosure,
            scheduler,
            catalog,
            control_machines: config.control_machines.clone(),
            pipeline_machines: config.pipeline_machines.clone(),
            log_name: config.log_name.clone(),
        }
    }

    /// The Environment Monitor, for the daemon's permanent-task spawn site.
    pub fn environment(&self) -> &Arc<EnvironmentMonitor> {
        &self.environment
    }

    /// The Enclosure Controller, for the daemon's permanent-task spawn site.
    pub fn enclosure(&self) -> &Arc<EnclosureController> {
        &self.enclosure
    }

    /// The Action Scheduler, for the daemon's permanent-task spawn site.
    pub fn scheduler(&self) -> &Arc<ActionScheduler> {
        &self.scheduler
    }

    /// Reject a mutating request whose origin is not in the control allow-list.
    pub fn authorize_control(&self, origin: IpAddr) -> Result<(), RpcErrorCode> {
        if self.control_machines.contains(&origin) {
            Ok(())
        } else {
            Err(RpcErrorCode::InvalidControlIp)
        }
    }

    /// Reject a pipeline notification whose origin is not in the
    /// pipeline allow-list.
    pub fn authorize_pipeline(&self, origin: IpAddr) -> Result<(), RpcErrorCode> {
        if self.pipeline_machines.contains(&origin) {
            Ok(())
        } else {
            Err(RpcErrorCode::InvalidControlIp)
        }
    }

    /// Full status snapshot (spec §6 `status`).
    pub fn status(&self) -> SupervisorStatus {
        SupervisorStatus {
            scheduler: self.scheduler.subsystem_status(),
            enclosure: self.enclosure.status_snapshot(),
            verdict: Some(self.environment.current_verdict()),
            schedule: self.scheduler.status_snapshot(),
        }
    }

    /// Validate, resolve, and enqueue a submitted schedule (spec §6
    /// `submit_schedule`). Returns non-fatal warnings on success.
    pub fn submit_schedule(
        &self,
        descriptor: &ScheduleDescriptor,
    ) -> Result<Violations, (RpcErrorCode, Violations)> {
        match self.scheduler.mode() {
            OperationsMode::Automatic => {}
            OperationsMode::Error => return Err((RpcErrorCode::InErrorState, Vec::new())),
            OperationsMode::Manual => return Err((RpcErrorCode::SchedulerNotAutomatic, Vec::new())),
        }

        let resolved = opsd_config::schedule::ingest_schedule(
            descriptor,
            &self.catalog,
            true,
            &self.log_name,
            Utc::now(),
        )
        .map_err(|e| (RpcErrorCode::InvalidSchedule, violation_messages(e)))?;

        if let Some(window) = resolved.dome_window {
            if !self.enclosure.install_window(window) {
                return Err((RpcErrorCode::DomeNotAutomatic, Vec::new()));
            }
        }
        if !self.scheduler.enqueue(resolved.actions) {
            return Err((RpcErrorCode::SchedulerNotAutomatic, Vec::new()));
        }
        Ok(resolved.warnings)
    }

    /// Request an Enclosure mode transition (spec §6 `request_enclosure_mode`).
    /// Rejected with `InErrorState` when the Enclosure is latched in `Error`
    /// and the request is `Automatic` (spec §6/§7, S4: "Error → Automatic is
    /// rejected silently" at the component level, surfaced to the caller
    /// here as a stable RPC error).
    pub fn request_enclosure_mode(&self, mode: OperationsMode) -> Result<(), RpcErrorCode> {
        if self.enclosure.mode() == OperationsMode::Error && mode == OperationsMode::Automatic {
            return Err(RpcErrorCode::InErrorState);
        }
        self.enclosure.request_mode(mode);
        Ok(())
    }

    /// Request a Scheduler mode transition (spec §6 `request_scheduler_mode`).
    /// Same `InErrorState` rejection as [`Self::request_enclosure_mode`].
    pub fn request_scheduler_mode(&self, mode: OperationsMode) -> Result<(), RpcErrorCode> {
        if self.scheduler.mode() == OperationsMode::Error && mode == OperationsMode::Automatic {
            return Err(RpcErrorCode::InErrorState);
        }
        self.scheduler.request_mode(mode);
        Ok(())
    }

    /// Force-clear the installed dome window (spec §6 `clear_dome_window`).
    pub fn clear_dome_window(&self) {
        self.enclosure.clear_window();
    }

    /// Abort the active action and clear the queue (spec §6 `stop_schedule`).
    pub fn stop_schedule(&self) {
        self.scheduler.abort();
    }

    /// Route a pipeline frame header to the active action (spec §6 `notify_frame`).
    pub fn notify_frame(&self, frame: &PipelineFrame) -> Option<Vec<HeaderCard>> {
        self.scheduler.notify_frame(frame)
    }

    /// Route a guide profile to the active action (spec §6 `notify_guide_profile`).
    pub fn notify_guide_profile(&self, profile: &GuideProfile) -> Option<Vec<HeaderCard>> {
        self.scheduler.notify_guide_profile(profile)
    }
}

fn violation_messages(err: opsd_config::Error) -> Violations {
    match err {
        opsd_config::Error::Validation { violations } => violations,
        other => vec![other.to_string()],
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsd_core::action::ActionCore;
    use opsd_core::catalog::SiteLocation;
    use opsd_core::enclosure::VerdictSource;
    use opsd_core::test_support::{MockEnvironmentApi, MockShutterApi};
    use opsd_protocol::rpc::ActionDescriptor;
    use opsd_protocol::SafetyVerdict;
    use std::{net::Ipv4Addr, time::Duration as StdDuration};

    fn site() -> SiteLocation {
        SiteLocation { latitude_deg: 28.76, longitude_deg: -17.88, elevation_m: 2326.0 }
    }

    fn config(control_ip: IpAddr) -> DaemonConfig {
        let json = serde_json::json!({
            "socket_path": "/run/opsd.sock",
            "log_name": "opsd.test",
            "control_machines": [control_ip.to_string()],
            "pipeline_machines": [control_ip.to_string()],
            "loop_delay": 10.0,
            "site_latitude_deg": 28.76,
            "site_longitude_deg": -17.88,
            "site_elevation_m": 2326.0,
            "dome": {"socket_path": "/run/dome.sock"},
            "environment_daemon": {"socket_path": "/run/environment.sock"},
            "environment_conditions": []
        });
        DaemonConfig::load_from_str(&json.to_string(), None).unwrap()
    }

    fn supervisor(control_ip: IpAddr) -> Supervisor {
        supervisor_with_shutter(control_ip).0
    }

    fn supervisor_with_shutter(control_ip: IpAddr) -> (Supervisor, Arc<MockShutterApi>) {
        let shutter = Arc::new(MockShutterApi::new());
        let env_api = Arc::new(MockEnvironmentApi::new());
        let environment = Arc::new(EnvironmentMonitor::new(env_api, Vec::new(), StdDuration::from_secs(10)));
        struct FromEnv(Arc<EnvironmentMonitor>);
        impl VerdictSource for FromEnv {
            fn current_verdict(&self) -> SafetyVerdict {
                self.0.current_verdict()
            }
        }
        let enclosure = Arc::new(EnclosureController::new(
            shutter.clone(),
            Arc::new(FromEnv(environment.clone())),
            StdDuration::from_secs(10),
        ));
        let scheduler = Arc::new(ActionScheduler::new(
            enclosure.clone(),
            || Arc::new({
                struct Instant(ActionCore);
                #[async_trait::async_trait]
                impl opsd_core::action::Action for Instant {
                    fn core(&self) -> &ActionCore { &self.0 }
                    async fn run(&self) { self.0.set_complete(); }
                }
                Instant(ActionCore::new("ParkTelescope", "opsd.scheduler"))
            }),
            StdDuration::from_millis(10),
        ));
        let catalog = ActionCatalog::new(site());
        (Supervisor::new(environment, enclosure, scheduler, catalog, &config(control_ip)), shutter)
    }

    #[test]
    fn rejects_control_calls_from_unlisted_origin() {
        let sup = supervisor(IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1)));
        let other = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 9));
        assert!(matches!(sup.authorize_control(other), Err(RpcErrorCode::InvalidControlIp)));
    }

    #[test]
    fn allows_control_calls_from_listed_origin() {
        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let sup = supervisor(ip);
        assert!(sup.authorize_control(ip).is_ok());
    }

    #[test]
    fn submit_schedule_rejected_when_scheduler_not_automatic() {
        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let sup = supervisor(ip);
        let descriptor = ScheduleDescriptor {
            night: "2026-07-28".to_string(),
            dome: None,
            actions: vec![ActionDescriptor { action_type: "ParkTelescope".to_string(), params: serde_json::json!({}) }],
        };
        let err = sup.submit_schedule(&descriptor).unwrap_err();
        assert_eq!(err.0, RpcErrorCode::SchedulerNotAutomatic);
    }

    #[tokio::test]
    async fn submit_schedule_enqueues_once_scheduler_is_automatic() {
        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let sup = supervisor(ip);
        sup.request_scheduler_mode(OperationsMode::Automatic).unwrap();
        sup.scheduler.tick().await;

        let descriptor = ScheduleDescriptor {
            night: "2026-07-28".to_string(),
            dome: None,
            actions: vec![ActionDescriptor { action_type: "ParkTelescope".to_string(), params: serde_json::json!({}) }],
        };
        let warnings = sup.submit_schedule(&descriptor).unwrap();
        assert!(warnings.is_empty());
    }

    #[tokio::test]
    async fn submit_schedule_reports_violations_for_unknown_action_type() {
        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let sup = supervisor(ip);
        sup.request_scheduler_mode(OperationsMode::Automatic).unwrap();
        sup.scheduler.tick().await;

        let descriptor = ScheduleDescriptor {
            night: "2026-07-28".to_string(),
            dome: None,
            actions: vec![ActionDescriptor { action_type: "NotReal".to_string(), params: serde_json::json!({}) }],
        };
        let (code, violations) = sup.submit_schedule(&descriptor).unwrap_err();
        assert_eq!(code, RpcErrorCode::InvalidSchedule);
        assert!(!violations.is_empty());
    }

    #[tokio::test]
    async fn request_enclosure_mode_automatic_rejected_while_latched_in_error() {
        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let (sup, shutter) = supervisor_with_shutter(ip);
        shutter.fail_heartbeat(true);
        sup.request_enclosure_mode(OperationsMode::Automatic).unwrap();
        sup.enclosure.tick().await;
        assert_eq!(sup.enclosure.mode(), OperationsMode::Error);

        let err = sup.request_enclosure_mode(OperationsMode::Automatic).unwrap_err();
        assert_eq!(err, RpcErrorCode::InErrorState);

        assert!(sup.request_enclosure_mode(OperationsMode::Manual).is_ok());
    }

    #[tokio::test]
    async fn request_scheduler_mode_automatic_rejected_while_latched_in_error() {
        struct Failing(ActionCore);
        #[async_trait::async_trait]
        impl opsd_core::action::Action for Failing {
            fn core(&self) -> &ActionCore {
                &self.0
            }
            async fn run(&self) {
                self.0.set_error();
            }
        }

        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let sup = supervisor(ip);
        sup.request_scheduler_mode(OperationsMode::Automatic).unwrap();
        sup.scheduler.tick().await;
        sup.scheduler.enqueue(vec![Arc::new(Failing(ActionCore::new("Failing", "opsd.scheduler")))]);
        for _ in 0..20 {
            sup.scheduler.tick().await;
            if sup.scheduler.mode() == OperationsMode::Error {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        assert_eq!(sup.scheduler.mode(), OperationsMode::Error);

        let err = sup.request_scheduler_mode(OperationsMode::Automatic).unwrap_err();
        assert_eq!(err, RpcErrorCode::InErrorState);

        assert!(sup.request_scheduler_mode(OperationsMode::Manual).is_ok());
    }

    #[tokio::test]
    async fn submit_schedule_rejected_with_in_error_state_when_scheduler_latched_in_error() {
        struct Failing(ActionCore);
        #[async_trait::async_trait]
        impl opsd_core::action::Action for Failing {
            fn core(&self) -> &ActionCore {
                &self.0
            }
            async fn run(&self) {
                self.0.set_error();
            }
        }

        let ip = IpAddr::V4(Ipv4Addr::new(127, 0, 0, 1));
        let sup = supervisor(ip);
        sup.request_scheduler_mode(OperationsMode::Automatic).unwrap();
        sup.scheduler.tick().await;
        sup.scheduler.enqueue(vec![Arc::new(Failing(ActionCore::new("Failing", "opsd.scheduler")))]);
        for _ in 0..20 {
            sup.scheduler.tick().await;
            if sup.scheduler.mode() == OperationsMode::Error {
                break;
            }
            tokio::time::sleep(StdDuration::from_millis(5)).await;
        }
        assert_eq!(sup.scheduler.mode(), OperationsMode::Error);

        let descriptor = ScheduleDescriptor {
            night: "2026-07-28".to_string(),
            dome: None,
            actions: vec![ActionDescriptor { action_type: "ParkTelescope".to_string(), params: serde_json::json!({}) }],
        };
        let (code, _) = sup.submit_schedule(&descriptor).unwrap_err();
        assert_eq!(code, RpcErrorCode::InErrorState);
    }
}
