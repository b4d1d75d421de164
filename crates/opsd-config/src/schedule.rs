//! Validates and parses a submitted schedule descriptor (spec §6 "Schedule
//! descriptor", §6 "Validation rules").
//!
//! Grounded on `rockit/operations/schedule.py`: `validate_schedule` (the
//! night-must-parse / night-must-match-tonight / dome-window-bounds /
//! per-action-type rules, including the "wrong night" distinction between a
//! fatal error and a non-fatal `info:` note), `parse_dome_window` (`"auto"`
//! resolution via sunset/sunrise) and `parse_schedule_actions` (building the
//! ordered action list). The per-type schema check delegates to
//! [`opsd_core::catalog::ActionCatalog`] rather than maintaining a second
//! catalog here.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, TimeZone, Timelike, Utc};
use opsd_core::action::Action;
use opsd_core::catalog::{ActionCatalog, SiteLocation};
use opsd_protocol::rpc::{DomeWindowDescriptor, ScheduleDescriptor};
use opsd_protocol::DomeWindow;

use crate::error::{Error, Result};
use crate::solar;

const NIGHT_FORMAT: &str = "%Y-%m-%d";
const INSTANT_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// A schedule descriptor resolved into the shapes the supervisor core
/// consumes directly.
pub struct ResolvedSchedule {
    /// `None` when the descriptor carried no `dome` block.
    pub dome_window: Option<DomeWindow>,
    /// Actions in submission order, ready to hand to
    /// [`opsd_core::scheduler::ActionScheduler::enqueue`].
    pub actions: Vec<Arc<dyn Action>>,
    /// Non-fatal notes (currently only the "night is not tonight" info
    /// message when `require_tonight` is false).
    pub warnings: Vec<String>,
}

/// The observing night `now` belongs to: the calendar date on which local
/// noon (UTC, since this supervisor has no per-site timezone of its own)
/// most recently passed.
fn current_observing_night(now: DateTime<Utc>) -> NaiveDate {
    if now.hour() < 12 {
        (now.date_naive()) - chrono::Duration::days(1)
    } else {
        now.date_naive()
    }
}

fn parse_night(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, NIGHT_FORMAT)
        .map_err(|_| Error::validation(vec![format!("night: {raw} is not a valid date")]))
}

/// Parse a `%Y-%m-%dT%H:%M:%SZ` instant, treating the trailing `Z` as UTC
/// (these are always UTC in this wire format; there is no offset to recover).
fn parse_instant(raw: &str) -> std::result::Result<DateTime<Utc>, ()> {
    NaiveDateTime::parse_from_str(raw, INSTANT_FORMAT)
        .map(|naive| Utc.from_utc_datetime(&naive))
        .map_err(|_| ())
}

fn validate_dome_window(
    dome: &DomeWindowDescriptor,
    night: NaiveDate,
    site: SiteLocation,
) -> Vec<String> {
    let Some((night_start, night_end)) = solar::night_window(night, site) else {
        return vec!["dome: could not resolve sunset/sunrise for this site and night".to_string()];
    };

    let mut errors = Vec::new();
    for (field, value) in [("open", &dome.open), ("close", &dome.close)] {
        if value == "auto" {
            continue;
        }
        match parse_instant(value) {
            Ok(parsed) => {
                if parsed < night_start || parsed > night_end {
                    errors.push(format!(
                        "dome: {value} is not auto or between {} and {}",
                        night_start.format(INSTANT_FORMAT),
                        night_end.format(INSTANT_FORMAT)
                    ));
                }
            }
            Err(_) => errors.push(format!("dome: {field}: {value} is not a valid datetime")),
        }
    }
    errors
}

/// Validate a descriptor. On success, returns non-fatal warning messages
/// (possibly empty); on failure, an [`Error::Validation`] carrying every
/// violation found (not just the first).
pub fn validate_schedule(
    descriptor: &ScheduleDescriptor,
    catalog: &ActionCatalog,
    require_tonight: bool,
    now: DateTime<Utc>,
) -> Result<Vec<String>> {
    let night = match parse_night(&descriptor.night) {
        Ok(night) => night,
        // A malformed `night` is fatal on its own (mirrors the original:
        // "Errors with 'night' are fatal").
        Err(err) => return Err(err),
    };

    let mut errors = Vec::new();
    if let Some(dome) = &descriptor.dome {
        errors.extend(validate_dome_window(dome, night, catalog.site_location()));
    }
    for (index, action) in descriptor.actions.iter().enumerate() {
        for violation in catalog.validate(&action.action_type, &action.params) {
            errors.push(format!("action {index} ({}): {violation}", action.action_type));
        }
    }

    if !errors.is_empty() {
        return Err(Error::validation(errors));
    }

    let current_night = current_observing_night(now);
    let mut warnings = Vec::new();
    if current_night != night {
        let message = format!("night {night} is not tonight ({current_night})");
        if require_tonight {
            return Err(Error::validation(vec![format!("night: {message}")]));
        }
        warnings.push(format!("info: {message}"));
    }

    Ok(warnings)
}

/// Resolve the `(open_at, close_at)` dome window from a descriptor, if any.
/// Assumes `descriptor` has already passed [`validate_schedule`].
pub fn parse_dome_window(descriptor: &ScheduleDescriptor, site: SiteLocation) -> Result<Option<DomeWindow>> {
    let Some(dome) = &descriptor.dome else { return Ok(None) };
    let night = parse_night(&descriptor.night)?;

    let needs_auto = dome.open == "auto" || dome.close == "auto";
    let (auto_open, auto_close) = if needs_auto {
        match solar::night_window(night, site) {
            Some(window) => (Some(window.0), Some(window.1)),
            None => {
                return Err(Error::validation(vec![
                    "dome: could not resolve sunset/sunrise for this site and night".to_string(),
                ]));
            }
        }
    } else {
        (None, None)
    };

    let open_at = if dome.open == "auto" {
        auto_open.expect("auto_open computed above when dome.open == \"auto\"")
    } else {
        parse_instant(&dome.open)
            .map_err(|_| Error::validation(vec![format!("dome: open: {} is not a valid datetime", dome.open)]))?
    };
    let close_at = if dome.close == "auto" {
        auto_close.expect("auto_close computed above when dome.close == \"auto\"")
    } else {
        parse_instant(&dome.close)
            .map_err(|_| Error::validation(vec![format!("dome: close: {} is not a valid datetime", dome.close)]))?
    };

    Ok(Some(DomeWindow::new(open_at, close_at).ok_or_else(|| {
        Error::validation(vec!["dome: open must precede close".to_string()])
    })?))
}

/// Build the ordered action list from a descriptor. Assumes `descriptor` has
/// already passed [`validate_schedule`]; a catalog lookup failure here would
/// indicate the two calls were made against different catalogs.
pub fn parse_actions(
    descriptor: &ScheduleDescriptor,
    catalog: &ActionCatalog,
    log_name: &str,
    scheduled_at: DateTime<Utc>,
) -> Result<Vec<Arc<dyn Action>>> {
    descriptor
        .actions
        .iter()
        .map(|action| {
            catalog
                .build(
                    &action.action_type,
                    action.action_type.clone(),
                    log_name.to_string(),
                    action.params.clone(),
                    scheduled_at,
                )
                .map_err(|e| Error::validation(vec![e.to_string()]))
        })
        .collect()
}

/// Validate and fully resolve a descriptor in one call (the composition
/// `opsd-server`'s `submit_schedule` handler drives).
pub fn ingest_schedule(
    descriptor: &ScheduleDescriptor,
    catalog: &ActionCatalog,
    require_tonight: bool,
    log_name: &str,
    now: DateTime<Utc>,
) -> Result<ResolvedSchedule> {
    let warnings = validate_schedule(descriptor, catalog, require_tonight, now)?;
    let dome_window = parse_dome_window(descriptor, catalog.site_location())?;
    let actions = parse_actions(descriptor, catalog, log_name, now)?;
    Ok(ResolvedSchedule { dome_window, actions, warnings })
}

#[cfg(test)]
mod tests {
    use super::*;
    use opsd_protocol::rpc::ActionDescriptor;

    fn site() -> SiteLocation {
        SiteLocation { latitude_deg: 28.76, longitude_deg: -17.88, elevation_m: 2326.0 }
    }

    fn catalog() -> ActionCatalog {
        ActionCatalog::new(site())
    }

    fn descriptor(night: &str, dome: Option<DomeWindowDescriptor>) -> ScheduleDescriptor {
        ScheduleDescriptor {
            night: night.to_string(),
            dome,
            actions: vec![ActionDescriptor { action_type: "ParkTelescope".to_string(), params: serde_json::json!({}) }],
        }
    }

    fn noon_on(night: &str) -> DateTime<Utc> {
        DateTime::parse_from_rfc3339(&format!("{night}T12:00:00Z")).unwrap().with_timezone(&Utc)
    }

    #[test]
    fn malformed_night_is_fatal() {
        let d = descriptor("not-a-date", None);
        let err = validate_schedule(&d, &catalog(), true, noon_on("2026-07-28")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn unknown_action_type_is_fatal() {
        let mut d = descriptor("2026-07-28", None);
        d.actions.push(ActionDescriptor { action_type: "NotReal".to_string(), params: serde_json::json!({}) });
        let err = validate_schedule(&d, &catalog(), false, noon_on("2026-07-28")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn wrong_night_is_fatal_when_require_tonight() {
        let d = descriptor("2026-07-29", None);
        let err = validate_schedule(&d, &catalog(), true, noon_on("2026-07-28")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }

    #[test]
    fn wrong_night_is_a_warning_when_not_require_tonight() {
        let d = descriptor("2026-07-29", None);
        let warnings = validate_schedule(&d, &catalog(), false, noon_on("2026-07-28")).unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].starts_with("info:"));
    }

    #[test]
    fn auto_dome_window_resolves_to_sunset_sunrise() {
        let d = descriptor(
            "2026-07-28",
            Some(DomeWindowDescriptor { open: "auto".to_string(), close: "auto".to_string() }),
        );
        let resolved = ingest_schedule(&d, &catalog(), true, "opsd.scheduler", noon_on("2026-07-28")).unwrap();
        let window = resolved.dome_window.unwrap();
        assert!(window.open_at < window.close_at);
        assert_eq!(resolved.actions.len(), 1);
    }

    #[test]
    fn explicit_dome_window_outside_night_bounds_is_rejected() {
        let d = descriptor(
            "2026-07-28",
            Some(DomeWindowDescriptor {
                open: "2026-07-28T08:00:00Z".to_string(),
                close: "auto".to_string(),
            }),
        );
        let err = validate_schedule(&d, &catalog(), true, noon_on("2026-07-28")).unwrap_err();
        assert!(matches!(err, Error::Validation { .. }));
    }
}
