//! MRPC client for the Supervisor Facade.
//!
//! Grounded on `hotki-server::ipc::client::Connection`: same
//! `MrpcClient::connect_unix` + no-op `Connection` handler shape, typed
//! `send_request` wrappers per method, and `Value::Binary` + `rmp-serde`
//! payloads for anything richer than a boolean (matching
//! `opsd_server::ipc::rpc`'s wire convention, reimplemented here since a
//! control client has no business depending on the Facade crate's internals).

use std::{path::Path, result::Result as StdResult};

use async_trait::async_trait;
use mrpc::{Client as MrpcClient, Connection as MrpcConnection, RpcError, RpcSender, Value};
use opsd_protocol::rpc::{FacadeMethod, RpcErrorCode, ScheduleDescriptor};
use opsd_protocol::{OperationsMode, SupervisorStatus};

use crate::error::{Error, Result};

/// Connection to a running Facade, over its Unix domain socket.
pub struct Client {
    inner: MrpcClient<NullHandler>,
}

impl Client {
    /// Connect to the Facade at `socket_path`.
    pub async fn connect(socket_path: &Path) -> Result<Self> {
        let path = socket_path.to_string_lossy().to_string();
        let inner = MrpcClient::connect_unix(&path, NullHandler)
            .await
            .map_err(|e| Error::Ipc(format!("failed to connect to {path}: {e}")))?;
        Ok(Self { inner })
    }

    /// `status()` (spec §6).
    pub async fn status(&mut self) -> Result<SupervisorStatus> {
        let value = self.request(FacadeMethod::Status, &[]).await?;
        decode_binary(value)
    }

    /// `submit_schedule(desc)` (spec §6). Returns non-fatal warnings.
    pub async fn submit_schedule(&mut self, descriptor: &ScheduleDescriptor) -> Result<Vec<String>> {
        let param = encode_binary(descriptor)?;
        let value = self.request(FacadeMethod::SubmitSchedule, &[param]).await?;
        match value {
            Value::Array(items) => Ok(items
                .into_iter()
                .filter_map(|v| match v {
                    Value::String(s) => Some(s.to_string()),
                    _ => None,
                })
                .collect()),
            other => Err(Error::Serialization(format!("unexpected submit_schedule response: {other:?}"))),
        }
    }

    /// `request_dome_mode(m)` (spec §6).
    pub async fn request_dome_mode(&mut self, mode: OperationsMode) -> Result<()> {
        self.request_mode(FacadeMethod::RequestEnclosureMode, mode).await
    }

    /// `request_scheduler_mode(m)` (spec §6).
    pub async fn request_scheduler_mode(&mut self, mode: OperationsMode) -> Result<()> {
        self.request_mode(FacadeMethod::RequestSchedulerMode, mode).await
    }

    async fn request_mode(&mut self, method: FacadeMethod, mode: OperationsMode) -> Result<()> {
        let param = encode_binary(&mode)?;
        self.request(method, &[param]).await?;
        Ok(())
    }

    /// `clear_dome_window()` (spec §6).
    pub async fn clear_dome_window(&mut self) -> Result<()> {
        self.request(FacadeMethod::ClearDomeWindow, &[]).await?;
        Ok(())
    }

    /// `stop_telescope()` (spec §6).
    pub async fn stop_telescope(&mut self) -> Result<()> {
        self.request(FacadeMethod::StopSchedule, &[]).await?;
        Ok(())
    }

    /// Cleanly stop the daemon.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.request(FacadeMethod::Shutdown, &[]).await?;
        Ok(())
    }

    async fn request(&mut self, method: FacadeMethod, params: &[Value]) -> Result<Value> {
        self.inner.send_request(method.as_str(), params).await.map_err(map_rpc_error)
    }
}

/// Translate a transport-level `RpcError` into this crate's error, resolving
/// a known stable code to its [`RpcErrorCode`] (so `main` can map it to the
/// matching exit code), or falling back to a generic transport error.
fn map_rpc_error(err: RpcError) -> Error {
    match err {
        RpcError::Service(se) => match RpcErrorCode::from_name(&se.name) {
            Some(code) => Error::Rpc(code, decode_violations(se.value)),
            None => Error::UnknownRpc(se.name),
        },
        other => Error::Ipc(other.to_string()),
    }
}

fn decode_violations(value: Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) => Some(s.to_string()),
                _ => None,
            })
            .collect(),
        Value::String(s) => vec![s.to_string()],
        _ => Vec::new(),
    }
}

fn encode_binary<T: serde::Serialize>(value: &T) -> Result<Value> {
    Ok(Value::Binary(rmp_serde::to_vec_named(value).map_err(|e| Error::Serialization(e.to_string()))?))
}

fn decode_binary<T: serde::de::DeserializeOwned>(value: Value) -> Result<T> {
    match value {
        Value::Binary(bytes) => rmp_serde::from_slice(&bytes).map_err(|e| Error::Serialization(e.to_string())),
        other => Err(Error::Serialization(format!("expected binary msgpack payload, got {other:?}"))),
    }
}

/// No-op client-side handler: `opsdctl` issues one request per invocation
/// and never needs to react to server-pushed notifications.
#[derive(Clone)]
struct NullHandler;

#[async_trait]
impl MrpcConnection for NullHandler {
    async fn connected(&self, _client: RpcSender) -> StdResult<(), RpcError> {
        Ok(())
    }

    async fn handle_request(
        &self,
        _client: RpcSender,
        method: &str,
        _params: Vec<Value>,
    ) -> StdResult<Value, RpcError> {
        Err(RpcError::Service(mrpc::ServiceError {
            name: "not_implemented".into(),
            value: Value::String(format!("opsdctl does not serve requests: {method}").into()),
        }))
    }

    async fn handle_notification(
        &self,
        _client: RpcSender,
        _method: &str,
        _params: Vec<Value>,
    ) -> StdResult<(), RpcError> {
        Ok(())
    }
}
