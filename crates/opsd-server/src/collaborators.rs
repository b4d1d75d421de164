//! Thin MRPC clients implementing the core's collaborator traits
//! ([`opsd_core::deps::ShutterApi`], [`opsd_core::deps::EnvironmentApi`])
//! against the external shutter-hardware and environment-aggregator
//! daemons named in the daemon config (spec §1: both are out of scope as
//! implementations, "concrete shutter-hardware drivers" / "specific
//! weather-sensor drivers"; only their RPC interface matters here).
//!
//! Grounded on `hotki-server`'s own client role (`ipc::client::Connection`
//! wraps an `mrpc::Client` to talk to a peer daemon); these collaborator
//! clients are the same shape, simplified to a handler that never expects
//! inbound requests or notifications from the collaborator.

use std::{collections::BTreeMap, path::Path, result::Result as StdResult, sync::Arc};

use async_trait::async_trait;
use mrpc::{Client as MrpcClient, Connection as MrpcConnection, RpcError, RpcSender, Value};
use opsd_core::deps::{EnvironmentApi, EnvironmentSnapshot, SensorReading, ShutterApi};
use opsd_protocol::EnclosureStatus;
use serde::Deserialize;
use tokio::sync::Mutex as AsyncMutex;

use crate::error::Error;

/// Connection handler for outbound-only collaborator clients: these
/// daemons never issue requests or notifications back to us.
#[derive(Clone, Default)]
struct SilentHandler;

#[async_trait]
impl MrpcConnection for SilentHandler {
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
            name: "method_not_found".into(),
            value: Value::String(method.into()),
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

/// Shutter-hardware RPC client (spec §4.2, §6 "dome backend descriptor").
pub struct ShutterClient {
    client: AsyncMutex<MrpcClient<SilentHandler>>,
}

impl ShutterClient {
    /// Connect to the dome daemon's Unix socket.
    pub async fn connect(socket_path: &Path) -> Result<Self, Error> {
        let client = MrpcClient::connect_unix(&socket_path.to_string_lossy(), SilentHandler)
            .await
            .map_err(|e| Error::Ipc(format!("failed to connect to dome daemon: {e}")))?;
        Ok(Self {
            client: AsyncMutex::new(client),
        })
    }

    async fn call_bool(&self, method: &str) -> opsd_core::Result<()> {
        let mut client = self.client.lock().await;
        match client.send_request(method, &[]).await {
            Ok(Value::Boolean(true)) => Ok(()),
            Ok(other) => Err(opsd_core::Error::rpc("shutter", format!("unexpected {method} response: {other:?}"))),
            Err(e) => Err(opsd_core::Error::rpc("shutter", e.to_string())),
        }
    }
}

#[async_trait]
impl ShutterApi for ShutterClient {
    async fn query_status(&self) -> opsd_core::Result<EnclosureStatus> {
        let mut client = self.client.lock().await;
        let response = client
            .send_request("status", &[])
            .await
            .map_err(|e| opsd_core::Error::rpc("shutter", e.to_string()))?;
        match response {
            Value::Binary(bytes) => rmp_serde::from_slice::<EnclosureStatus>(&bytes)
                .map_err(|e| opsd_core::Error::rpc("shutter", format!("malformed status: {e}"))),
            other => Err(opsd_core::Error::rpc("shutter", format!("unexpected status response: {other:?}"))),
        }
    }

    async fn open(&self) -> opsd_core::Result<()> {
        self.call_bool("open").await
    }

    async fn close(&self) -> opsd_core::Result<()> {
        self.call_bool("close").await
    }

    async fn ping_heartbeat(&self) -> opsd_core::Result<()> {
        self.call_bool("ping_heartbeat").await
    }

    async fn disable_heartbeat(&self) -> opsd_core::Result<()> {
        self.call_bool("disable_heartbeat").await
    }
}

/// Wire shape for one sensor reading, matching [`SensorReading`] field-for-field.
#[derive(Debug, Deserialize)]
struct SensorReadingWire {
    #[serde(rename = "unsafe")]
    unsafe_: bool,
    current: bool,
    latest: Option<f64>,
}

impl From<SensorReadingWire> for SensorReading {
    fn from(wire: SensorReadingWire) -> Self {
        SensorReading {
            unsafe_: wire.unsafe_,
            current: wire.current,
            latest: wire.latest,
        }
    }
}

/// Environment-aggregator RPC client (spec §4.1, §6 "environment source daemon").
pub struct EnvironmentClient {
    client: AsyncMutex<MrpcClient<SilentHandler>>,
}

impl EnvironmentClient {
    /// Connect to the environment aggregator's Unix socket.
    pub async fn connect(socket_path: &Path) -> Result<Self, Error> {
        let client = MrpcClient::connect_unix(&socket_path.to_string_lossy(), SilentHandler)
            .await
            .map_err(|e| Error::Ipc(format!("failed to connect to environment daemon: {e}")))?;
        Ok(Self {
            client: AsyncMutex::new(client),
        })
    }
}

#[async_trait]
impl EnvironmentApi for EnvironmentClient {
    async fn status(&self) -> opsd_core::Result<EnvironmentSnapshot> {
        let mut client = self.client.lock().await;
        let response = client
            .send_request("status", &[])
            .await
            .map_err(|e| opsd_core::Error::rpc("environment", e.to_string()))?;
        match response {
            Value::Binary(bytes) => {
                let wire: BTreeMap<String, BTreeMap<String, SensorReadingWire>> =
                    rmp_serde::from_slice(&bytes)
                        .map_err(|e| opsd_core::Error::rpc("environment", format!("malformed snapshot: {e}")))?;
                Ok(wire
                    .into_iter()
                    .map(|(device, params)| {
                        (device, params.into_iter().map(|(p, r)| (p, r.into())).collect())
                    })
                    .collect())
            }
            other => Err(opsd_core::Error::rpc("environment", format!("unexpected status response: {other:?}"))),
        }
    }
}

/// Convenience constructor bundling both collaborator clients, used by
/// `opsd-daemon`'s startup sequence.
pub async fn connect_collaborators(
    dome_socket_path: &Path,
    environment_socket_path: &Path,
) -> Result<(Arc<ShutterClient>, Arc<EnvironmentClient>), Error> {
    let shutter = Arc::new(ShutterClient::connect(dome_socket_path).await?);
    let environment = Arc::new(EnvironmentClient::connect(environment_socket_path).await?);
    Ok((shutter, environment))
}
