#![warn(missing_docs)]

//! Structured logging setup, CLI argument definitions, and `tracing`
//! utilities for the `opsd` workspace (SPEC_FULL "AMBIENT STACK / Logging").
//!
//! This crate consolidates:
//! - [`fmt`]: render tracing events to logfmt strings and to
//!   [`opsd_protocol::LogRecord`].
//! - [`forward`]: forward the daemon's own logs to connected Facade clients.
//! - CLI argument parsing for log level configuration, mirroring the
//!   teacher's `logging::LogArgs`.

use std::env;

use clap::Args;
use tracing_subscriber::EnvFilter;

pub mod fmt;
pub mod forward;

/// Crate targets included in default logging directives, scoped to this
/// workspace's own crates the way the teacher's `logging::OUR_CRATES` scopes
/// to `hotki`'s.
const OUR_CRATES: &[&str] = &[
    "opsd_core",
    "opsd_protocol",
    "opsd_config",
    "opsd_server",
    "opsd_logging",
    "opsd_daemon",
    "opsdctl",
];

/// Logging controls for CLI apps (mirrors `logging::LogArgs`).
#[derive(Debug, Clone, Args)]
pub struct LogArgs {
    /// Set global log level to trace (our crates only).
    #[arg(long, conflicts_with_all = ["debug", "log_level", "log_filter"])]
    pub trace: bool,

    /// Set global log level to debug (our crates only).
    #[arg(long, conflicts_with_all = ["trace", "log_level", "log_filter"])]
    pub debug: bool,

    /// Set a single global log level for our crates (error|warn|info|debug|trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Set an explicit tracing filter directive, overriding the other flags.
    /// e.g. `"opsd_core=trace,opsd_server=debug"`.
    #[arg(long)]
    pub log_filter: Option<String>,
}

/// Build crate-scoped directives for the given level.
fn crate_specs(level: &str) -> Vec<String> {
    let lvl = level.to_ascii_lowercase();
    OUR_CRATES.iter().map(|t| format!("{t}={lvl}")).collect()
}

/// Add MRPC connection-noise suppression to the provided directives.
fn join_with_mrpc(mut parts: Vec<String>) -> String {
    parts.push("mrpc::connection=off".to_string());
    parts.join(",")
}

/// Build a filter directive string that sets the same `level` for all of our crates.
pub fn level_spec_for(level: &str) -> String {
    join_with_mrpc(crate_specs(level))
}

/// Compute the final filter spec string with precedence:
/// - `log_filter`
/// - `trace`/`debug`/`log_level` (crate-scoped)
/// - `RUST_LOG` env (plus mrpc suppression if not already present)
/// - default to crate-scoped `info`
pub fn compute_spec(
    trace: bool,
    debug: bool,
    log_level: Option<&str>,
    log_filter: Option<&str>,
) -> String {
    if let Some(spec) = log_filter {
        return spec.to_string();
    }
    if trace {
        return level_spec_for("trace");
    }
    if debug {
        return level_spec_for("debug");
    }
    if let Some(lvl) = log_level {
        return level_spec_for(lvl);
    }
    if let Ok(spec) = env::var("RUST_LOG") {
        if spec.contains("mrpc::connection") {
            spec
        } else {
            join_with_mrpc(vec![spec])
        }
    } else {
        level_spec_for("info")
    }
}

/// Compute the spec string for a [`LogArgs`] value.
pub fn spec_for_args(args: &LogArgs) -> String {
    compute_spec(
        args.trace,
        args.debug,
        args.log_level.as_deref(),
        args.log_filter.as_deref(),
    )
}

/// Create an `EnvFilter` from a spec string.
pub fn env_filter_from_spec(spec: &str) -> EnvFilter {
    EnvFilter::new(spec)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trace_flag_scopes_to_our_crates() {
        let spec = compute_spec(true, false, None, None);
        assert!(spec.contains("opsd_core=trace"));
        assert!(spec.contains("mrpc::connection=off"));
    }

    #[test]
    fn explicit_filter_overrides_everything() {
        let spec = compute_spec(true, true, Some("debug"), Some("opsd_core=warn"));
        assert_eq!(spec, "opsd_core=warn");
    }

    #[test]
    fn default_is_crate_scoped_info() {
        // SAFETY: test runs single-threaded w.r.t. this env var within the process;
        // acceptable since `env::remove_var` only affects this process.
        unsafe {
            env::remove_var("RUST_LOG");
        }
        let spec = compute_spec(false, false, None, None);
        assert!(spec.contains("opsd_server=info"));
    }
}
