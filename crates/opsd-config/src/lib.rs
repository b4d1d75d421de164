//! Loads the daemon's own configuration file and validates/resolves nightly
//! schedule descriptors submitted to the Supervisor Facade.
//!
//! Mirrors the teacher's `config` crate's loader/error split, trimmed to
//! this domain's JSON shape: no Rhai DSL, no theme merging, just the two
//! JSON documents spec §6 names (the daemon config, and a submitted
//! schedule descriptor) plus the sunrise/sunset resolution a schedule's
//! `"auto"` dome window needs.

pub mod daemon;
mod error;
pub mod schedule;
mod schema;
mod solar;

pub use daemon::DaemonConfig;
pub use error::{Error, Result};
pub use schedule::{ingest_schedule, parse_actions, parse_dome_window, validate_schedule, ResolvedSchedule};
pub use solar::night_window;
