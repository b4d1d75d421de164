//! Crate-wide error type for `opsd-server` (transport and collaborator
//! wiring; core state-machine errors stay in `opsd_core::Error`).

use std::result::Result as StdResult;

use thiserror::Error;

/// Convenience result alias for this crate.
pub type Result<T> = StdResult<T, Error>;

/// Errors raised by the Facade's transport and collaborator-client layers.
#[derive(Debug, Error)]
pub enum Error {
    /// Failure binding, running, or connecting to the Facade's IPC transport.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// A msgpack encode/decode failure talking to a collaborator daemon or a client.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Failure reading or validating the daemon configuration file.
    #[error(transparent)]
    Config(#[from] opsd_config::Error),
}

impl From<rmp_serde::encode::Error> for Error {
    fn from(err: rmp_serde::encode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}

impl From<rmp_serde::decode::Error> for Error {
    fn from(err: rmp_serde::decode::Error) -> Self {
        Error::Serialization(err.to_string())
    }
}
