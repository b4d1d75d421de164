//! Core supervisory state machines: Environment Monitor, Enclosure
//! Controller, Action Scheduler, and the Action Runtime Contract they
//! schedule work through.
//!
//! None of these components perform their own network I/O; external
//! collaborators (shutter hardware, environment aggregator) are reached
//! through the traits in [`deps`], so the whole supervisory core can be
//! exercised in tests without a running site.

pub mod action;
pub mod actions;
pub mod cancel;
pub mod catalog;
pub mod deps;
pub mod enclosure;
pub mod environment;
mod error;
pub mod outage;
pub mod scheduler;

#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use error::{Error, Result};
