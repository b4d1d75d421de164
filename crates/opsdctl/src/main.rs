#![warn(missing_docs)]
//! `opsdctl`: a thin CLI wrapping the Supervisor Facade (spec §6), used by
//! operators and by the test suite to exercise `submit_schedule`,
//! mode-change requests, and `status` from a shell.

use std::{fs, process};

use clap::Parser;
use opsd_protocol::rpc::ScheduleDescriptor;
use tracing::error;
use tracing_subscriber::{fmt, prelude::*, registry};

mod cli;
mod client;
mod error;

use cli::{Cli, Commands};
use client::Client;
use error::{Error, Result};

fn main() {
    let cli = Cli::parse();

    let log_spec = opsd_logging::spec_for_args(&cli.log);
    let env_filter = opsd_logging::env_filter_from_spec(&log_spec);
    registry().with(env_filter).with(fmt::layer().without_time()).try_init().ok();

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("error: failed to start tokio runtime: {e}");
            process::exit(1);
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => process::exit(0),
        Err(e) => {
            error!("opsdctl failed: {e}");
            eprintln!("error: {e}");
            process::exit(e.exit_code());
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut client = Client::connect(&cli.socket).await?;

    match cli.command {
        Commands::Status => {
            let status = client.status().await?;
            println!("{}", serde_json::to_string_pretty(&status).map_err(|e| Error::Serialization(e.to_string()))?);
        }
        Commands::SubmitSchedule { path } => {
            let raw = fs::read_to_string(&path)?;
            let descriptor: ScheduleDescriptor = serde_json::from_str(&raw)?;
            let warnings = client.submit_schedule(&descriptor).await?;
            for warning in &warnings {
                eprintln!("warning: {warning}");
            }
            println!("schedule submitted");
        }
        Commands::RequestDomeMode { mode } => {
            client.request_dome_mode(mode.into()).await?;
            println!("dome mode requested");
        }
        Commands::RequestSchedulerMode { mode } => {
            client.request_scheduler_mode(mode.into()).await?;
            println!("scheduler mode requested");
        }
        Commands::ClearDomeWindow => {
            client.clear_dome_window().await?;
            println!("dome window cleared");
        }
        Commands::StopTelescope => {
            client.stop_telescope().await?;
            println!("schedule stopped");
        }
        Commands::Shutdown => {
            client.shutdown().await?;
            println!("shutdown requested");
        }
    }

    Ok(())
}
