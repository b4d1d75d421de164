#![warn(missing_docs)]
//! Binary entry point for the robotic-observatory operations supervisor
//! daemon (spec §1, §2): loads the daemon configuration, connects to the
//! external shutter and environment-aggregator daemons, wires the three
//! permanent supervisory tasks, and serves the Supervisor Facade.

use std::{
    path::PathBuf,
    process,
    sync::{Arc, atomic::AtomicBool},
};

use clap::Parser;
use opsd_config::DaemonConfig;
use opsd_core::{
    cancel::CancelToken,
    catalog::ActionCatalog,
    enclosure::{EnclosureController, VerdictSource},
    environment::EnvironmentMonitor,
    scheduler::ActionScheduler,
};
use opsd_protocol::{FacadeEvent, SafetyVerdict};
use opsd_server::{Supervisor, collaborators, ipc::IPCServer};
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, registry};

/// Command-line interface for the `opsd-daemon` binary.
#[derive(Parser, Debug)]
#[command(
    name = "opsd-daemon",
    about = "Robotic-observatory operations supervisor daemon",
    version
)]
struct Cli {
    /// Path to the daemon's JSON configuration file (spec §6 "Configuration file").
    #[arg(long, value_name = "PATH")]
    config: PathBuf,

    /// Logging controls shared across this workspace's binaries.
    #[command(flatten)]
    log: opsd_logging::LogArgs,
}

/// Relays the Environment Monitor's published verdict to the Enclosure
/// Controller without giving it a direct dependency on the monitor type.
struct EnvironmentVerdictSource(Arc<EnvironmentMonitor>);

impl VerdictSource for EnvironmentVerdictSource {
    fn current_verdict(&self) -> SafetyVerdict {
        self.0.current_verdict()
    }
}

fn main() {
    let cli = Cli::parse();

    let log_spec = opsd_logging::spec_for_args(&cli.log);
    let env_filter = opsd_logging::env_filter_from_spec(&log_spec);
    registry()
        .with(env_filter)
        .with(fmt::layer().without_time())
        .with(opsd_logging::forward::layer())
        .try_init()
        .ok();

    let config = match DaemonConfig::load_from_path(&cli.config) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("error: failed to load configuration: {e}");
            process::exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start tokio runtime: {e}");
            process::exit(1);
        }
    };

    if let Err(e) = runtime.block_on(run(config)) {
        error!("daemon exited with error: {e}");
        eprintln!("error: {e}");
        process::exit(1);
    }
}

/// Build the supervisory core, spawn its permanent tasks, and run the
/// Facade's server loop until shutdown (spec §2 "Concurrency Model", §5).
async fn run(config: DaemonConfig) -> opsd_server::Result<()> {
    info!(socket = %config.socket_path.display(), "starting opsd-daemon");

    let (shutter, environment_client) =
        collaborators::connect_collaborators(&config.dome_socket_path, &config.environment_socket_path).await?;

    let environment = Arc::new(EnvironmentMonitor::new(
        environment_client,
        config.environment_conditions.clone(),
        config.loop_delay,
    ));

    let enclosure = Arc::new(EnclosureController::new(
        shutter,
        Arc::new(EnvironmentVerdictSource(environment.clone())),
        config.loop_delay,
    ));

    let catalog = ActionCatalog::new(config.site);
    let park_catalog = ActionCatalog::new(config.site);
    let scheduler = Arc::new(ActionScheduler::new(
        enclosure.clone(),
        move || park_catalog.park_telescope("opsd.scheduler"),
        config.loop_delay,
    ));

    let supervisor = Arc::new(Supervisor::new(
        environment.clone(),
        enclosure.clone(),
        scheduler.clone(),
        catalog,
        &config,
    ));

    let shutdown = Arc::new(AtomicBool::new(false));
    let ipc_server = IPCServer::new(config.socket_path.clone(), supervisor.clone(), shutdown.clone());
    let event_tx = ipc_server.event_sender();

    let cancel = CancelToken::new();

    let environment_task = tokio::spawn({
        let environment = environment.clone();
        let cancel = cancel.clone();
        async move { environment.run(cancel).await }
    });
    let enclosure_task = tokio::spawn({
        let enclosure = enclosure.clone();
        let cancel = cancel.clone();
        async move { enclosure.run(cancel).await }
    });
    let scheduler_task = tokio::spawn({
        let scheduler = scheduler.clone();
        let cancel = cancel.clone();
        async move { scheduler.run(cancel).await }
    });

    // The core components publish their own status snapshots but never push
    // them; this loop is the one place that watches for any change and fans
    // out `FacadeEvent::StatusChanged` (spec §3 `SupervisorStatus`, "pushed
    // after any state change").
    let status_task = tokio::spawn({
        let supervisor = supervisor.clone();
        let shutdown = shutdown.clone();
        let loop_delay = config.loop_delay;
        async move {
            let mut last = None;
            loop {
                if shutdown.load(std::sync::atomic::Ordering::SeqCst) {
                    return;
                }
                let status = supervisor.status();
                if last.as_ref() != Some(&status) {
                    last = Some(status.clone());
                    if event_tx.send(FacadeEvent::StatusChanged(Box::new(status))).await.is_err() {
                        return;
                    }
                }
                tokio::time::sleep(loop_delay).await;
            }
        }
    });

    let server_result = ipc_server.run().await;

    cancel.cancel();
    environment_task.abort();
    enclosure_task.abort();
    scheduler_task.abort();
    status_task.abort();

    server_result
}
