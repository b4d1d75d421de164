//! Error type for `opsdctl`, mapping onto the exit codes spec §6 names for
//! "any thin CLI wrapping the Facade".

use std::result::Result as StdResult;

use opsd_protocol::rpc::RpcErrorCode;
use thiserror::Error;

/// Convenience result alias for this crate.
pub type Result<T> = StdResult<T, Error>;

/// Errors `opsdctl` can report, each carrying the exit code its `main`
/// ultimately returns.
#[derive(Debug, Error)]
pub enum Error {
    /// Failed to connect to, or lost, the Facade's Unix socket.
    #[error("IPC error: {0}")]
    Ipc(String),

    /// A request/response payload did not decode as expected.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The Facade rejected the request with a known [`RpcErrorCode`].
    #[error("{code}: {violations}", code = .0.name(), violations = .1.join("; "))]
    Rpc(RpcErrorCode, Vec<String>),

    /// The Facade rejected the request with an error code this client does
    /// not recognize.
    #[error("facade error: {0}")]
    UnknownRpc(String),

    /// A local I/O failure (e.g. reading a schedule file from disk).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A schedule file was not valid JSON.
    #[error("invalid schedule JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),
}

impl Error {
    /// The process exit code this error maps to (spec §6 "Exit codes").
    pub fn exit_code(&self) -> i32 {
        match self {
            Error::Rpc(code, _) => code.exit_code(),
            Error::Ipc(_) | Error::Serialization(_) | Error::UnknownRpc(_) => 1,
            Error::Io(_) | Error::InvalidJson(_) => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rpc_error_exit_code_matches_facade_mapping() {
        let err = Error::Rpc(RpcErrorCode::InvalidControlIp, vec!["bad host".into()]);
        assert_eq!(err.exit_code(), 10);
    }

    #[test]
    fn transport_errors_exit_generic_failure() {
        assert_eq!(Error::Ipc("disconnected".into()).exit_code(), 1);
        assert_eq!(Error::UnknownRpc("weird_code".into()).exit_code(), 1);
    }
}
