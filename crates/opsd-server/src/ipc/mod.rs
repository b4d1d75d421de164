//! The Supervisor Facade's MRPC transport (spec §6 "External Interfaces").

pub mod rpc;
mod server;
mod service;

pub use server::IPCServer;
