//! The daemon's own configuration file (spec §6 "Configuration file").
//!
//! Grounded on the Python original's `Config` class
//! (`rockit/operations/config.py`): same required-key set, minus the two
//! keys that named dynamically-imported Python modules
//! (`actions_module`, `dome.module`). Per the spec's REDESIGN FLAGS the
//! action catalog is a closed, statically-registered map
//! ([`opsd_core::catalog::ActionCatalog`]) rather than an importable module,
//! and the concrete dome/environment backends are reached over a Unix
//! socket rather than loaded in-process, so this config only needs to name
//! where those sockets live.

use std::{
    fs,
    net::IpAddr,
    path::{Path, PathBuf},
    time::Duration as StdDuration,
};

use opsd_core::{catalog::SiteLocation, environment::ConditionWatcher};
use serde::Deserialize;
use serde_json::Value as JsonValue;

use crate::error::{Error, Result};
use crate::schema::validate_against;

#[derive(Debug, Deserialize)]
struct RawSensorSpec {
    label: String,
    sensor: String,
    parameter: String,
}

#[derive(Debug, Deserialize)]
struct RawConditionGroup {
    label: String,
    sensors: Vec<RawSensorSpec>,
}

#[derive(Debug, Deserialize)]
struct RawBackend {
    socket_path: String,
}

#[derive(Debug, Deserialize)]
struct RawDaemonConfig {
    socket_path: String,
    log_name: String,
    control_machines: Vec<String>,
    pipeline_machines: Vec<String>,
    loop_delay: f64,
    site_latitude_deg: f64,
    site_longitude_deg: f64,
    site_elevation_m: f64,
    dome: RawBackend,
    environment_daemon: RawBackend,
    environment_conditions: Vec<RawConditionGroup>,
}

/// Fully parsed and validated daemon configuration.
#[derive(Debug, Clone)]
pub struct DaemonConfig {
    /// Unix socket the Supervisor Facade listens on.
    pub socket_path: PathBuf,
    /// Structured-logging tag for this daemon instance.
    pub log_name: String,
    /// Hosts allowed to invoke mutating Facade operations (spec §6 "Access control").
    pub control_machines: Vec<IpAddr>,
    /// Hosts allowed to invoke `notify_frame`/`notify_guide_profile`.
    pub pipeline_machines: Vec<IpAddr>,
    /// Period between Enclosure/Scheduler/Environment ticks.
    pub loop_delay: StdDuration,
    /// Observatory location, shared by the Enclosure (sunrise/sunset
    /// resolution) and the action catalog.
    pub site: SiteLocation,
    /// Unix socket of the external shutter-hardware daemon (out of scope to implement, spec §1).
    pub dome_socket_path: PathBuf,
    /// Unix socket of the external environment-sensor aggregator (out of scope to implement, spec §1).
    pub environment_socket_path: PathBuf,
    /// Static condition-group watcher list for the Environment Monitor (spec §6 "environment_conditions").
    pub environment_conditions: Vec<ConditionWatcher>,
}

impl DaemonConfig {
    /// Load and validate a configuration file from disk.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| Error::Read {
            path: Some(path.to_path_buf()),
            message: e.to_string(),
        })?;
        Self::load_from_str(&text, Some(path))
    }

    /// Parse and validate a configuration document, enriching errors with `path` when given.
    pub fn load_from_str(text: &str, path: Option<&Path>) -> Result<Self> {
        let json: JsonValue = serde_json::from_str(text).map_err(|e| Error::Parse {
            path: path.map(Path::to_path_buf),
            message: e.to_string(),
        })?;

        validate_against(schema(), &json)?;

        let raw: RawDaemonConfig = serde_json::from_value(json).map_err(|e| Error::Parse {
            path: path.map(Path::to_path_buf),
            message: e.to_string(),
        })?;

        Self::from_raw(raw)
    }

    fn from_raw(raw: RawDaemonConfig) -> Result<Self> {
        let control_machines = parse_ips("control_machines", &raw.control_machines)?;
        let pipeline_machines = parse_ips("pipeline_machines", &raw.pipeline_machines)?;

        if raw.loop_delay < 0.0 {
            return Err(Error::validation(vec!["loop_delay: must not be negative".to_string()]));
        }

        let environment_conditions = raw
            .environment_conditions
            .into_iter()
            .flat_map(|group| {
                group.sensors.into_iter().map(move |sensor| {
                    ConditionWatcher::new(group.label.clone(), sensor.sensor, sensor.parameter, sensor.label)
                })
            })
            .collect();

        Ok(Self {
            socket_path: PathBuf::from(raw.socket_path),
            log_name: raw.log_name,
            control_machines,
            pipeline_machines,
            loop_delay: StdDuration::from_secs_f64(raw.loop_delay),
            site: SiteLocation {
                latitude_deg: raw.site_latitude_deg,
                longitude_deg: raw.site_longitude_deg,
                elevation_m: raw.site_elevation_m,
            },
            dome_socket_path: PathBuf::from(raw.dome.socket_path),
            environment_socket_path: PathBuf::from(raw.environment_daemon.socket_path),
            environment_conditions,
        })
    }

    /// Whether `ip` is in the control allow-list (spec §6 "Access control").
    pub fn is_control_machine(&self, ip: IpAddr) -> bool {
        self.control_machines.contains(&ip)
    }

    /// Whether `ip` is in the pipeline-notifier allow-list.
    pub fn is_pipeline_machine(&self, ip: IpAddr) -> bool {
        self.pipeline_machines.contains(&ip)
    }
}

fn parse_ips(field: &str, raw: &[String]) -> Result<Vec<IpAddr>> {
    raw.iter()
        .map(|s| {
            s.parse::<IpAddr>()
                .map_err(|_| Error::validation(vec![format!("{field}: '{s}' is not a valid IP address")]))
        })
        .collect()
}

fn schema() -> JsonValue {
    serde_json::json!({
        "type": "object",
        "additionalProperties": false,
        "required": [
            "socket_path", "log_name", "control_machines", "pipeline_machines", "loop_delay",
            "site_latitude_deg", "site_longitude_deg", "site_elevation_m", "dome",
            "environment_daemon", "environment_conditions"
        ],
        "properties": {
            "socket_path": {"type": "string"},
            "log_name": {"type": "string"},
            "control_machines": {"type": "array", "items": {"type": "string"}},
            "pipeline_machines": {"type": "array", "items": {"type": "string"}},
            "loop_delay": {"type": "number", "minimum": 0},
            "site_latitude_deg": {"type": "number", "minimum": -90, "maximum": 90},
            "site_longitude_deg": {"type": "number", "minimum": -180, "maximum": 180},
            "site_elevation_m": {"type": "number"},
            "dome": {
                "type": "object",
                "required": ["socket_path"],
                "properties": {"socket_path": {"type": "string"}}
            },
            "environment_daemon": {
                "type": "object",
                "required": ["socket_path"],
                "properties": {"socket_path": {"type": "string"}}
            },
            "environment_conditions": {
                "type": "array",
                "items": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["label", "sensors"],
                    "properties": {
                        "label": {"type": "string"},
                        "sensors": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "required": ["label", "sensor", "parameter"],
                                "properties": {
                                    "label": {"type": "string"},
                                    "sensor": {"type": "string"},
                                    "parameter": {"type": "string"}
                                }
                            }
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> JsonValue {
        serde_json::json!({
            "socket_path": "/run/opsd.sock",
            "log_name": "opsd",
            "control_machines": ["127.0.0.1"],
            "pipeline_machines": ["127.0.0.1"],
            "loop_delay": 10.0,
            "site_latitude_deg": 28.76,
            "site_longitude_deg": -17.88,
            "site_elevation_m": 2326.0,
            "dome": {"socket_path": "/run/dome.sock"},
            "environment_daemon": {"socket_path": "/run/environment.sock"},
            "environment_conditions": [
                {"label": "wind", "sensors": [{"label": "W1m", "sensor": "vaisala", "parameter": "wind_speed"}]}
            ]
        })
    }

    #[test]
    fn loads_a_well_formed_document() {
        let config = DaemonConfig::load_from_str(&sample().to_string(), None).unwrap();
        assert_eq!(config.log_name, "opsd");
        assert_eq!(config.control_machines, vec!["127.0.0.1".parse::<IpAddr>().unwrap()]);
        assert_eq!(config.environment_conditions.len(), 1);
        assert_eq!(config.environment_conditions[0].condition_key, "wind");
    }

    #[test]
    fn rejects_missing_required_key() {
        let mut doc = sample();
        doc.as_object_mut().unwrap().remove("loop_delay");
        let err = DaemonConfig::load_from_str(&doc.to_string(), None).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn rejects_unparseable_ip() {
        let mut doc = sample();
        doc["control_machines"] = serde_json::json!(["not-an-ip"]);
        let err = DaemonConfig::load_from_str(&doc.to_string(), None).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn rejects_invalid_json() {
        let err = DaemonConfig::load_from_str("{not json", None).unwrap_err();
        assert!(matches!(err, Error::Parse { .. }));
    }
}
