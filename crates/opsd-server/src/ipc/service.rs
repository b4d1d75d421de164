//! MRPC connection handler for the Supervisor Facade.
//!
//! Grounded on `hotki-server::ipc::service::HotkeyService`: the same
//! connected-clients list behind a `tokio::sync::Mutex`, the same
//! `FuturesUnordered` broadcast-and-drop-disconnected-clients pattern, and
//! the same `typed_err` convention for turning a domain error into an
//! `mrpc::ServiceError`. Dispatch targets [`crate::Supervisor`] instead of
//! an in-process engine.

use std::{
    net::{IpAddr, Ipv4Addr},
    result::Result as StdResult,
    sync::{
        Arc, Mutex,
        atomic::{AtomicBool, Ordering},
    },
};

use async_trait::async_trait;
use futures::stream::{FuturesUnordered, StreamExt};
use mrpc::{Connection as MrpcConnection, RpcError, RpcSender, Value};
use opsd_protocol::ipc::{EventRx, EventTx, event_channel};
use opsd_protocol::rpc::{FacadeMethod, FacadeNotification, RpcErrorCode};
use opsd_protocol::FacadeEvent;
use tokio::sync::Mutex as AsyncMutex;
use tracing::{debug, info, trace, warn};

use crate::ipc::rpc;
use crate::supervisor::Supervisor;

/// Every connecting peer is a Unix-domain-socket client on the same host as
/// the daemon; `mrpc` exposes no peer address for this transport, so the
/// origin IP checked against `control_machines`/`pipeline_machines` is
/// always loopback (see `DESIGN.md`, "Access control over a Unix socket").
const LOCAL_ORIGIN: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

/// IPC service that dispatches the Facade's RPC surface to a [`Supervisor`].
#[derive(Clone)]
pub struct FacadeService {
    supervisor: Arc<Supervisor>,
    event_tx: EventTx,
    event_rx: Arc<Mutex<Option<EventRx>>>,
    clients: Arc<AsyncMutex<Vec<RpcSender>>>,
    shutdown: Arc<AtomicBool>,
}

impl FacadeService {
    /// Construct the service. Installs itself as the process-wide log
    /// forwarding sink immediately, so log events are captured even before
    /// the first client connects.
    pub fn new(supervisor: Arc<Supervisor>, shutdown: Arc<AtomicBool>) -> Self {
        let (event_tx, event_rx) = event_channel();
        opsd_logging::forward::set_sink(event_tx.clone());
        Self {
            supervisor,
            event_tx,
            event_rx: Arc::new(Mutex::new(Some(event_rx))),
            clients: Arc::new(AsyncMutex::new(Vec::new())),
            shutdown,
        }
    }

    /// A sender any task may use to publish a [`FacadeEvent`] (e.g. a
    /// periodic `StatusChanged` push from the daemon's status-watcher task).
    pub fn event_sender(&self) -> EventTx {
        self.event_tx.clone()
    }

    /// Expose the shutdown flag for the IPC server's run loop.
    pub(crate) fn shutdown_flag(&self) -> Arc<AtomicBool> {
        self.shutdown.clone()
    }

    /// Start the one permanent event-forwarding task and the heartbeat
    /// pulse. Idempotent: the event receiver is only taken once.
    pub(crate) fn start_event_forwarder(&self) {
        let event_rx = match self.event_rx.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        if let Some(event_rx) = event_rx {
            let service = self.clone();
            tokio::spawn(async move { service.forward_events(event_rx).await });
        }

        let heartbeat_tx = self.event_tx.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(opsd_protocol::ipc::heartbeat::interval());
            let mut tick: u64 = 0;
            loop {
                interval.tick().await;
                if shutdown.load(Ordering::SeqCst) {
                    return;
                }
                tick = tick.saturating_add(opsd_protocol::ipc::heartbeat::INTERVAL_MS);
                if heartbeat_tx.send(FacadeEvent::Heartbeat(tick)).await.is_err() {
                    return;
                }
            }
        });
    }

    async fn forward_events(&self, mut event_rx: EventRx) {
        while let Some(event) = event_rx.recv().await {
            if self.shutdown.load(Ordering::SeqCst) {
                break;
            }
            self.broadcast_event(event).await;
        }
    }

    async fn broadcast_event(&self, event: FacadeEvent) {
        let clients_snapshot = { self.clients.lock().await.clone() };
        if clients_snapshot.is_empty() {
            return;
        }
        let value = rpc::enc_event(&event);

        let mut futs = FuturesUnordered::new();
        for client in clients_snapshot {
            let v = value.clone();
            futs.push(async move {
                let result = client
                    .send_notification(FacadeNotification::Event.as_str(), std::slice::from_ref(&v))
                    .await;
                (client, result)
            });
        }
        let mut survivors = Vec::new();
        while let Some((client, result)) = futs.next().await {
            match result {
                Ok(_) => survivors.push(client),
                Err(e) => warn!("dropping disconnected facade client: {e}"),
            }
        }
        *self.clients.lock().await = survivors;
    }
}

#[async_trait]
impl MrpcConnection for FacadeService {
    async fn connected(&self, client: RpcSender) -> StdResult<(), RpcError> {
        if self.shutdown.load(Ordering::SeqCst) {
            return Err(rpc::service_err(RpcErrorCode::Blocked, vec!["facade is shutting down".into()]));
        }
        info!("facade client connected");
        self.clients.lock().await.push(client);
        Ok(())
    }

    async fn handle_request(
        &self,
        _client: RpcSender,
        method: &str,
        params: Vec<Value>,
    ) -> StdResult<Value, RpcError> {
        debug!(method, params = params.len(), "handling facade request");

        let Some(method) = FacadeMethod::try_from_str(method) else {
            warn!(method, "unknown facade method");
            return Err(rpc::service_err(RpcErrorCode::MethodNotFound, vec![method.to_string()]));
        };

        match method {
            FacadeMethod::SubmitSchedule => {
                self.authorize_control()?;
                let descriptor = rpc::dec_schedule_descriptor(rpc::require_param(&params)?)?;
                match self.supervisor.submit_schedule(&descriptor) {
                    Ok(warnings) => Ok(rpc::enc_warnings(&warnings)),
                    Err((code, violations)) => Err(rpc::service_err(code, violations)),
                }
            }
            FacadeMethod::RequestEnclosureMode => {
                self.authorize_control()?;
                let mode = rpc::dec_mode(rpc::require_param(&params)?)?;
                self.supervisor
                    .request_enclosure_mode(mode)
                    .map_err(|code| rpc::service_err(code, Vec::new()))?;
                Ok(Value::Boolean(true))
            }
            FacadeMethod::RequestSchedulerMode => {
                self.authorize_control()?;
                let mode = rpc::dec_mode(rpc::require_param(&params)?)?;
                self.supervisor
                    .request_scheduler_mode(mode)
                    .map_err(|code| rpc::service_err(code, Vec::new()))?;
                Ok(Value::Boolean(true))
            }
            FacadeMethod::ClearDomeWindow => {
                self.authorize_control()?;
                self.supervisor.clear_dome_window();
                Ok(Value::Boolean(true))
            }
            FacadeMethod::StopSchedule => {
                self.authorize_control()?;
                self.supervisor.stop_schedule();
                Ok(Value::Boolean(true))
            }
            FacadeMethod::Status => Ok(rpc::enc_status(&self.supervisor.status())),
            FacadeMethod::NotifyFrame => {
                self.authorize_pipeline()?;
                let frame = rpc::dec_pipeline_frame(rpc::require_param(&params)?)?;
                let cards = self.supervisor.notify_frame(&frame);
                if let Some(cards) = cards.clone() {
                    let _ = self.event_tx.try_send(FacadeEvent::ExtraHeaderCards(cards));
                }
                Ok(rpc::enc_header_cards(&cards))
            }
            FacadeMethod::NotifyGuideProfile => {
                self.authorize_pipeline()?;
                let profile = rpc::dec_guide_profile(rpc::require_param(&params)?)?;
                let cards = self.supervisor.notify_guide_profile(&profile);
                if let Some(cards) = cards.clone() {
                    let _ = self.event_tx.try_send(FacadeEvent::ExtraHeaderCards(cards));
                }
                Ok(rpc::enc_header_cards(&cards))
            }
            FacadeMethod::Shutdown => {
                self.authorize_control()?;
                info!("shutdown request received");
                self.shutdown.store(true, Ordering::SeqCst);
                opsd_logging::forward::clear_sink();
                self.clients.lock().await.clear();
                Ok(Value::Boolean(true))
            }
        }
    }

    async fn handle_notification(
        &self,
        _client: RpcSender,
        method: &str,
        _params: Vec<Value>,
    ) -> StdResult<(), RpcError> {
        trace!(method, "ignoring inbound facade notification");
        Ok(())
    }
}

impl FacadeService {
    fn authorize_control(&self) -> StdResult<(), RpcError> {
        self.supervisor
            .authorize_control(LOCAL_ORIGIN)
            .map_err(|code| rpc::service_err(code, Vec::new()))
    }

    fn authorize_pipeline(&self) -> StdResult<(), RpcError> {
        self.supervisor
            .authorize_pipeline(LOCAL_ORIGIN)
            .map_err(|code| rpc::service_err(code, Vec::new()))
    }
}
