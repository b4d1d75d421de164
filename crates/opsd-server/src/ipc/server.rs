//! Unix-domain-socket transport for the Supervisor Facade.
//!
//! Grounded on `hotki-server::ipc::server::IPCServer`: the same
//! remove-stale-socket-then-bind sequence, the same `tokio::select!` race
//! between the MRPC server future and a polled shutdown flag, and the same
//! `Drop` impl that unlinks the socket file.

use std::{
    fs,
    path::PathBuf,
    sync::{Arc, atomic::{AtomicBool, Ordering}},
    time::Duration,
};

use mrpc::Server as MrpcServer;
use opsd_protocol::ipc::EventTx;
use tokio::{select, time::sleep};
use tracing::{debug, trace};

use crate::ipc::service::FacadeService;
use crate::supervisor::Supervisor;
use crate::{Error, Result};

/// Hosts the Facade's RPC service on a Unix domain socket (spec §6
/// "External Interfaces").
pub struct IPCServer {
    socket_path: PathBuf,
    service: FacadeService,
}

impl IPCServer {
    /// Construct a server bound to `socket_path` once [`run`](Self::run) is
    /// called, dispatching RPCs against `supervisor`.
    pub fn new(socket_path: impl Into<PathBuf>, supervisor: Arc<Supervisor>, shutdown: Arc<AtomicBool>) -> Self {
        Self {
            socket_path: socket_path.into(),
            service: FacadeService::new(supervisor, shutdown),
        }
    }

    /// A sender usable by any task to publish a [`opsd_protocol::FacadeEvent`].
    pub fn event_sender(&self) -> EventTx {
        self.service.event_sender()
    }

    /// Shared shutdown flag; setting it from elsewhere stops [`run`](Self::run).
    pub fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.service.shutdown_flag()
    }

    /// Bind the socket and run until cancelled (shutdown flag set, or the
    /// transport errors out).
    pub async fn run(self) -> Result<()> {
        let socket_path = self.socket_path.to_string_lossy().to_string();
        trace!(socket = %socket_path, "starting facade mrpc server");

        let _ = fs::remove_file(&self.socket_path);

        let service = self.service.clone();
        let server = MrpcServer::from_fn(move || service.clone());
        self.service.start_event_forwarder();

        let server = server
            .unix(&socket_path)
            .await
            .map_err(|e| Error::Ipc(format!("failed to bind facade socket {socket_path}: {e}")))?;

        let shutdown = self.service.shutdown_flag();
        select! {
            res = server.run() => {
                res.map_err(|e| Error::Ipc(format!("facade server error: {e}")))?;
            }
            _ = async {
                while !shutdown.load(Ordering::SeqCst) {
                    sleep(Duration::from_millis(50)).await;
                }
            } => {
                debug!("shutdown flag set; stopping facade mrpc server");
            }
        }

        Ok(())
    }
}

impl Drop for IPCServer {
    fn drop(&mut self) {
        let _ = fs::remove_file(&self.socket_path);
    }
}
