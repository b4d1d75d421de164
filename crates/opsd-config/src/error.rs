//! Error type for configuration and schedule loading.

use std::path::{Path, PathBuf};

use thiserror::Error;

/// Convenience result alias for this crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while loading the daemon configuration file or validating a
/// submitted schedule descriptor.
///
/// Mirrors the teacher's `config::Error` `Read`/`Parse`/`Validation` split,
/// trimmed to this crate's JSON-only input (no RON excerpt rendering).
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// The file could not be opened or read.
    #[error("{message}")]
    Read {
        /// Path that failed to read, when known.
        path: Option<PathBuf>,
        /// Human-readable detail.
        message: String,
    },
    /// The file's contents are not valid JSON.
    #[error("{message}")]
    Parse {
        /// Path being parsed, when known.
        path: Option<PathBuf>,
        /// Human-readable detail from the JSON parser.
        message: String,
    },
    /// The parsed JSON does not satisfy the configuration/schedule schema.
    #[error("{}", .violations.join("; "))]
    Validation {
        /// One message per schema violation, in the order jsonschema reported them.
        violations: Vec<String>,
    },
}

impl Error {
    /// Access the path attached to this error, when it carries one.
    pub fn path(&self) -> Option<&Path> {
        match self {
            Error::Read { path, .. } | Error::Parse { path, .. } => path.as_deref(),
            Error::Validation { .. } => None,
        }
    }

    /// Build a [`Error::Validation`] from a list of violation messages.
    ///
    /// `violations` must be non-empty at call sites; an empty list indicates
    /// the caller should not have constructed an error at all.
    pub fn validation(violations: Vec<String>) -> Self {
        Error::Validation { violations }
    }
}
