//! Supervisor Facade: hosts the core's three permanent tasks and serves
//! the operations-supervisor RPC surface over a Unix domain socket (spec
//! §6 "External Interfaces").
//!
//! Mirrors `hotki-server`'s split: [`supervisor`] is the engine-equivalent
//! composition root, [`collaborators`] holds the outbound RPC clients to
//! the external shutter/environment daemons, and [`ipc`] is the inbound
//! transport (`ipc::server::IPCServer` + `ipc::service::FacadeService`).
#![warn(missing_docs)]

pub mod collaborators;
mod error;
pub mod ipc;
pub mod supervisor;

pub use error::{Error, Result};
pub use supervisor::Supervisor;
