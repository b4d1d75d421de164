//! Mock collaborators for unit tests, mirroring `hotki_engine::test_support`.

use std::{
    collections::BTreeMap,
    sync::atomic::{AtomicBool, AtomicU32, Ordering},
};

use async_trait::async_trait;
use opsd_protocol::EnclosureStatus;
use parking_lot::Mutex;

use crate::deps::{EnvironmentApi, EnvironmentSnapshot, SensorReading, ShutterApi};
use crate::{Error, Result};

/// An [`EnvironmentApi`] mock whose sensor readings are set directly by
/// tests, with no network or hardware involved.
#[derive(Default)]
pub struct MockEnvironmentApi {
    snapshot: Mutex<EnvironmentSnapshot>,
    unreachable: AtomicBool,
}

impl MockEnvironmentApi {
    /// Construct a mock with an empty snapshot (every watcher resolves Unknown).
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a current, in-bounds reading for `device`/`parameter`.
    pub fn set_safe(&self, device: &str, parameter: &str, value: f64) {
        self.set(device, parameter, SensorReading { unsafe_: false, current: true, latest: Some(value) });
    }

    /// Record a current, out-of-bounds reading for `device`/`parameter`.
    pub fn set_unsafe(&self, device: &str, parameter: &str, value: f64) {
        self.set(device, parameter, SensorReading { unsafe_: true, current: true, latest: Some(value) });
    }

    /// Record a stale (not current) reading for `device`/`parameter`.
    pub fn set_stale(&self, device: &str, parameter: &str) {
        self.set(device, parameter, SensorReading { unsafe_: false, current: false, latest: None });
    }

    fn set(&self, device: &str, parameter: &str, reading: SensorReading) {
        self.snapshot
            .lock()
            .entry(device.to_string())
            .or_default()
            .insert(parameter.to_string(), reading);
    }

    /// Make `status()` fail, simulating a lost aggregator connection.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }
}

#[async_trait]
impl EnvironmentApi for MockEnvironmentApi {
    async fn status(&self) -> Result<EnvironmentSnapshot> {
        if self.unreachable.load(Ordering::SeqCst) {
            return Err(Error::rpc("environment", "mock unreachable"));
        }
        Ok(self.snapshot.lock().clone())
    }
}

/// A [`ShutterApi`] mock that tracks command counts and can be made to
/// fail or report arbitrary status.
pub struct MockShutterApi {
    status: Mutex<EnclosureStatus>,
    heartbeat_pings: AtomicU32,
    fail_heartbeat: AtomicBool,
    fail_open: AtomicBool,
    fail_close: AtomicBool,
    unreachable: AtomicBool,
}

impl Default for MockShutterApi {
    fn default() -> Self {
        Self {
            status: Mutex::new(EnclosureStatus::Closed),
            heartbeat_pings: AtomicU32::new(0),
            fail_heartbeat: AtomicBool::new(false),
            fail_open: AtomicBool::new(false),
            fail_close: AtomicBool::new(false),
            unreachable: AtomicBool::new(false),
        }
    }
}

impl MockShutterApi {
    /// Construct a mock reporting `Closed` with no failures armed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Force the next and subsequent `query_status` calls to return `status`.
    pub fn set_status(&self, status: EnclosureStatus) {
        *self.status.lock() = status;
    }

    /// How many times `ping_heartbeat` has been called.
    pub fn heartbeat_pings(&self) -> u32 {
        self.heartbeat_pings.load(Ordering::SeqCst)
    }

    /// Make heartbeat arm/disarm calls fail.
    pub fn fail_heartbeat(&self, fail: bool) {
        self.fail_heartbeat.store(fail, Ordering::SeqCst);
    }

    /// Make `open()` fail.
    pub fn fail_open(&self, fail: bool) {
        self.fail_open.store(fail, Ordering::SeqCst);
    }

    /// Make `close()` fail.
    pub fn fail_close(&self, fail: bool) {
        self.fail_close.store(fail, Ordering::SeqCst);
    }

    /// Make every call fail with an RPC error, simulating a lost daemon.
    pub fn set_unreachable(&self, unreachable: bool) {
        self.unreachable.store(unreachable, Ordering::SeqCst);
    }

    fn check_unreachable(&self) -> Result<()> {
        if self.unreachable.load(Ordering::SeqCst) {
            Err(Error::rpc("shutter", "mock unreachable"))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ShutterApi for MockShutterApi {
    async fn query_status(&self) -> Result<EnclosureStatus> {
        self.check_unreachable()?;
        Ok(*self.status.lock())
    }

    async fn open(&self) -> Result<()> {
        self.check_unreachable()?;
        if self.fail_open.load(Ordering::SeqCst) {
            return Err(Error::rpc("shutter", "mock open failure"));
        }
        *self.status.lock() = EnclosureStatus::Open;
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        self.check_unreachable()?;
        if self.fail_close.load(Ordering::SeqCst) {
            return Err(Error::rpc("shutter", "mock close failure"));
        }
        *self.status.lock() = EnclosureStatus::Closed;
        Ok(())
    }

    async fn ping_heartbeat(&self) -> Result<()> {
        self.check_unreachable()?;
        if self.fail_heartbeat.load(Ordering::SeqCst) {
            return Err(Error::rpc("shutter", "mock heartbeat failure"));
        }
        self.heartbeat_pings.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn disable_heartbeat(&self) -> Result<()> {
        self.check_unreachable()?;
        if self.fail_heartbeat.load(Ordering::SeqCst) {
            return Err(Error::rpc("shutter", "mock heartbeat failure"));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn mock_environment_reports_set_readings() {
        let api = MockEnvironmentApi::new();
        api.set_safe("vaisala", "wind_speed", 4.0);
        let snapshot = api.status().await.unwrap();
        assert_eq!(snapshot["vaisala"]["wind_speed"].latest, Some(4.0));
    }

    #[tokio::test]
    async fn mock_shutter_tracks_heartbeat_pings() {
        let api = MockShutterApi::new();
        api.ping_heartbeat().await.unwrap();
        api.ping_heartbeat().await.unwrap();
        assert_eq!(api.heartbeat_pings(), 2);
    }
}
