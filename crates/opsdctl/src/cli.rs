//! Command-line interface definitions for `opsdctl`.

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

/// Thin control client for the observatory operations supervisor (spec §6
/// "Mode-change and submission API").
#[derive(Parser, Debug)]
#[command(name = "opsdctl", about = "Observatory operations supervisor control client", version)]
pub struct Cli {
    /// Path to the Facade's Unix domain socket.
    #[arg(long, value_name = "PATH", default_value = "/run/opsd.sock")]
    pub socket: PathBuf,

    /// Logging controls shared across this workspace's binaries.
    #[command(flatten)]
    pub log: opsd_logging::LogArgs,

    #[command(subcommand)]
    pub command: Commands,
}

/// Mode argument shared by the two mode-change subcommands.
#[derive(Copy, Clone, Debug, ValueEnum)]
#[value(rename_all = "lowercase")]
pub enum ModeArg {
    /// The subsystem drives itself from policy.
    Automatic,
    /// An operator has taken direct control.
    Manual,
}

impl From<ModeArg> for opsd_protocol::OperationsMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Automatic => opsd_protocol::OperationsMode::Automatic,
            ModeArg::Manual => opsd_protocol::OperationsMode::Manual,
        }
    }
}

/// The Facade operations this client can drive, one per spec §6 table row.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Fetch a full status snapshot.
    Status,

    /// Submit a nightly schedule descriptor read from a JSON file.
    SubmitSchedule {
        /// Path to the schedule descriptor JSON file (spec §6 "Schedule descriptor").
        path: PathBuf,
    },

    /// Request a mode transition for the Enclosure subsystem.
    #[command(name = "request-dome-mode")]
    RequestDomeMode {
        /// Target mode.
        mode: ModeArg,
    },

    /// Request a mode transition for the Scheduler subsystem.
    #[command(name = "request-scheduler-mode")]
    RequestSchedulerMode {
        /// Target mode.
        mode: ModeArg,
    },

    /// Force-clear the installed dome window.
    #[command(name = "clear-dome-window")]
    ClearDomeWindow,

    /// Abort the active action and clear the queue.
    #[command(name = "stop-telescope")]
    StopTelescope,

    /// Cleanly stop the daemon.
    Shutdown,
}
