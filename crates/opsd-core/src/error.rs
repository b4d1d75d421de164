//! Crate-wide error type for `opsd-core`.

use std::result::Result as StdResult;

use thiserror::Error;

/// Convenience result alias for the core crate.
pub type Result<T> = StdResult<T, Error>;

/// Errors raised by the core supervisory state machines.
///
/// These are kinds, not a full taxonomy of hardware failures: each
/// collaborator trait (shutter daemon, environment aggregator) reports its
/// own transient/permanent split through [`Error::Rpc`], and the owning
/// component decides what that means for its mode (spec §7).
#[derive(Debug, Error)]
pub enum Error {
    /// Communication failure reaching an external collaborator daemon
    /// (shutter hardware, environment aggregator). Retried implicitly on
    /// the next loop tick by the owning component.
    #[error("rpc to {collaborator} failed: {message}")]
    Rpc {
        /// Which collaborator failed (e.g. `"shutter"`, `"environment"`).
        collaborator: &'static str,
        /// Human-readable detail.
        message: String,
    },

    /// The hardware reported a heartbeat watchdog timeout.
    #[error("heartbeat watchdog timeout")]
    WatchdogTimeout,

    /// An action's `run` body raised an exception (escaped panic-equivalent),
    /// caught by the base wrapper per spec §4.4 "Exception policy".
    #[error("action {action} failed: {message}")]
    ActionFailed {
        /// The failing action's name.
        action: String,
        /// Human-readable detail.
        message: String,
    },
}

impl Error {
    /// Construct an [`Error::Rpc`] for the named collaborator.
    pub fn rpc(collaborator: &'static str, message: impl Into<String>) -> Self {
        Error::Rpc {
            collaborator,
            message: message.into(),
        }
    }
}
