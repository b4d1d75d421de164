//! Action catalog: a closed enumeration of buildable action types.
//!
//! The Python original dispatches on `config.actions[type_name]`, a
//! dictionary of live classes populated by introspecting whichever modules
//! the site config imports (`telescope_controller.py`'s
//! `self._park_action = config.actions['ParkTelescope']`). Per the spec's
//! REDESIGN FLAGS this becomes a closed, statically-registered map: no
//! runtime class discovery, no importing arbitrary site modules.

use std::{collections::BTreeMap, sync::Arc};

use chrono::{DateTime, Utc};
use serde_json::Value as JsonValue;

use crate::action::Action;
use crate::actions::park_telescope::ParkTelescope;
use crate::{Error, Result};

/// Observatory location, used by actions that need to compute local solar
/// geometry (e.g. parking orientation, future sunrise-aware actions).
#[derive(Debug, Clone, Copy)]
pub struct SiteLocation {
    /// Latitude in degrees, positive north.
    pub latitude_deg: f64,
    /// Longitude in degrees, positive east.
    pub longitude_deg: f64,
    /// Elevation above sea level, in metres.
    pub elevation_m: f64,
}

/// Inputs common to every action built from a schedule descriptor.
pub struct ActionParams {
    /// The action's name, as it will appear in status and logs.
    pub name: String,
    /// Structured-logging log name.
    pub log_name: String,
    /// Observatory location.
    pub site_location: SiteLocation,
    /// The action-specific JSON configuration (schedule descriptor minus `type`).
    pub config: JsonValue,
    /// Scheduling timestamp, passed through so time-based actions (e.g. a
    /// future sunrise-aware action) can compute deadlines relative to
    /// ingest time rather than re-reading the clock.
    pub scheduled_at: DateTime<Utc>,
}

type ValidateFn = fn(&JsonValue) -> Vec<String>;
type BuildFn = fn(ActionParams) -> Result<Arc<dyn Action>>;

struct Entry {
    validate: ValidateFn,
    build: BuildFn,
}

/// Maps a schedule descriptor's `type` key to a validator and a factory
/// (spec §4.4 `validate_config`, §6 "Each action item's `type` must match a
/// catalog entry").
pub struct ActionCatalog {
    entries: BTreeMap<&'static str, Entry>,
    site_location: SiteLocation,
}

impl ActionCatalog {
    /// Build a catalog pre-populated with the built-in action types.
    pub fn new(site_location: SiteLocation) -> Self {
        let mut catalog = Self {
            entries: BTreeMap::new(),
            site_location,
        };
        catalog.register("ParkTelescope", ParkTelescope::validate_config, ParkTelescope::build);
        catalog
    }

    /// Register (or overwrite) a catalog entry.
    pub fn register(&mut self, type_name: &'static str, validate: ValidateFn, build: BuildFn) {
        self.entries.insert(type_name, Entry { validate, build });
    }

    /// The observatory location this catalog's actions were built with.
    pub fn site_location(&self) -> SiteLocation {
        self.site_location
    }

    /// Schema violations for `config` under the named type, or a single
    /// violation naming the type as unknown.
    pub fn validate(&self, type_name: &str, config: &JsonValue) -> Vec<String> {
        match self.entries.get(type_name) {
            Some(entry) => (entry.validate)(config),
            None => vec![format!("unknown action type '{type_name}'")],
        }
    }

    /// Build an instance of the named action type.
    pub fn build(
        &self,
        type_name: &str,
        name: String,
        log_name: String,
        config: JsonValue,
        scheduled_at: DateTime<Utc>,
    ) -> Result<Arc<dyn Action>> {
        let entry = self
            .entries
            .get(type_name)
            .ok_or_else(|| Error::ActionFailed { action: name.clone(), message: format!("unknown action type '{type_name}'") })?;
        (entry.build)(ActionParams {
            name,
            log_name,
            site_location: self.site_location,
            config,
            scheduled_at,
        })
    }

    /// Build the implicit terminal `ParkTelescope` action the Scheduler
    /// enqueues when the queue drains (spec §4.3).
    pub fn park_telescope(&self, log_name: impl Into<String>) -> Arc<dyn Action> {
        ParkTelescope::build(ActionParams {
            name: "ParkTelescope".to_string(),
            log_name: log_name.into(),
            site_location: self.site_location,
            config: JsonValue::Null,
            scheduled_at: Utc::now(),
        })
        .expect("ParkTelescope::build never fails")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> SiteLocation {
        SiteLocation { latitude_deg: 28.76, longitude_deg: -17.88, elevation_m: 2326.0 }
    }

    #[test]
    fn unknown_type_is_a_single_violation() {
        let catalog = ActionCatalog::new(site());
        let violations = catalog.validate("NotARealAction", &JsonValue::Null);
        assert_eq!(violations.len(), 1);
    }

    #[test]
    fn park_telescope_validates_any_config() {
        let catalog = ActionCatalog::new(site());
        assert!(catalog.validate("ParkTelescope", &JsonValue::Null).is_empty());
    }

    #[test]
    fn builds_registered_type() {
        let catalog = ActionCatalog::new(site());
        let action = catalog
            .build("ParkTelescope", "ParkTelescope".into(), "opsd.scheduler".into(), JsonValue::Null, Utc::now())
            .unwrap();
        assert_eq!(action.name(), "ParkTelescope");
    }
}
