//! Trait abstractions for the external collaborators the core talks to.
//!
//! The shutter-hardware driver and the environment-sensor aggregator are
//! both out of scope per spec §1 ("concrete shutter-hardware drivers" /
//! "specific weather-sensor drivers"); the core only depends on these
//! traits, mirroring `hotki_engine::deps::HotkeyApi`'s split between a real
//! implementation and a test mock.

use std::collections::BTreeMap;

use async_trait::async_trait;
use opsd_protocol::EnclosureStatus;

use crate::Result;

/// RPC surface the Enclosure Controller needs from the shutter daemon.
///
/// A real implementation lives outside this crate (spec §1); `opsd-core`
/// only depends on this trait so the controller can be driven in tests
/// without real hardware.
#[async_trait]
pub trait ShutterApi: Send + Sync {
    /// Query the hardware's current reported status.
    async fn query_status(&self) -> Result<EnclosureStatus>;
    /// Command the shutter to open. Resolves once the hardware accepts the
    /// command; the controller polls `query_status` for completion.
    async fn open(&self) -> Result<()>;
    /// Command the shutter to close.
    async fn close(&self) -> Result<()>;
    /// Arm the heartbeat watchdog (committing to automatic operation).
    async fn ping_heartbeat(&self) -> Result<()>;
    /// Disarm the heartbeat watchdog (returning control to the operator).
    async fn disable_heartbeat(&self) -> Result<()>;
}

/// One sensor/parameter reading as reported by the environment aggregator.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SensorReading {
    /// Whether this parameter is outside safe bounds.
    pub unsafe_: bool,
    /// Whether this parameter has a current (non-stale) reading.
    pub current: bool,
    /// The latest numeric value, when current.
    pub latest: Option<f64>,
}

/// A device-indexed snapshot from the environment aggregator:
/// `device -> parameter -> reading`.
pub type EnvironmentSnapshot = BTreeMap<String, BTreeMap<String, SensorReading>>;

/// RPC surface the Environment Monitor needs from the sensor aggregator.
#[async_trait]
pub trait EnvironmentApi: Send + Sync {
    /// Fetch the latest device-indexed snapshot.
    async fn status(&self) -> Result<EnvironmentSnapshot>;
}

/// Test/mock collaborators live in [`crate::test_support`].
