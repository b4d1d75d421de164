//! Terminal stow action the Scheduler enqueues whenever it drains its queue
//! (spec §4.3). Grounded on the Python original's dummy `run_thread`
//! ("succeeds immediately") since the concrete mount RPC is out of scope
//! (spec §1 "no direct hardware I/O").

use std::{sync::Arc, time::Duration as StdDuration};

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use tracing::info;

use crate::action::{Action, ActionCore};
use crate::catalog::ActionParams;
use crate::Result;

/// Default time the action spends "parking" before declaring complete.
const PARK_DURATION: StdDuration = StdDuration::from_secs(2);

/// Stows the mount. Auto-enqueued whenever the scheduler's queue empties
/// and the supervisor was not already idle (spec §4.3).
pub struct ParkTelescope {
    core: ActionCore,
}

impl ParkTelescope {
    /// No configuration keys are recognised; any JSON value validates.
    pub fn validate_config(_config: &JsonValue) -> Vec<String> {
        Vec::new()
    }

    /// Build a `ParkTelescope` instance. Infallible.
    pub fn build(params: ActionParams) -> Result<Arc<dyn Action>> {
        Ok(Arc::new(Self {
            core: ActionCore::new(params.name, params.log_name),
        }))
    }
}

#[async_trait]
impl Action for ParkTelescope {
    fn core(&self) -> &ActionCore {
        &self.core
    }

    fn task_labels(&self) -> Vec<String> {
        if self.core.status().is_terminal() {
            Vec::new()
        } else {
            vec!["Parking telescope".to_string()]
        }
    }

    async fn run(&self) {
        info!(log_name = %self.core.log_name(), "parking telescope");
        let target = chrono::Utc::now() + chrono::Duration::from_std(PARK_DURATION).unwrap();
        self.core
            .wait_until_time_or_aborted(target, StdDuration::from_secs(10))
            .await;
        self.core.set_complete();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::SiteLocation;
    use opsd_protocol::ActionStatus;

    fn params() -> ActionParams {
        ActionParams {
            name: "ParkTelescope".into(),
            log_name: "opsd.scheduler".into(),
            site_location: SiteLocation { latitude_deg: 0.0, longitude_deg: 0.0, elevation_m: 0.0 },
            config: JsonValue::Null,
            scheduled_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn completes_after_parking() {
        let action = ParkTelescope::build(params()).unwrap();
        assert_eq!(action.task_labels(), vec!["Parking telescope".to_string()]);
        action.run().await;
        assert_eq!(action.status(), ActionStatus::Complete);
        assert!(action.task_labels().is_empty());
    }

    #[tokio::test]
    async fn abort_short_circuits_the_park_wait() {
        let action = ParkTelescope::build(params()).unwrap();
        let handle = action.clone();
        let run_fut = tokio::spawn(async move { handle.run().await });
        tokio::time::sleep(StdDuration::from_millis(5)).await;
        action.abort();
        tokio::time::timeout(StdDuration::from_millis(200), run_fut)
            .await
            .expect("run should finish promptly after abort")
            .unwrap();
        assert_eq!(action.status(), ActionStatus::Complete);
    }
}
