//! Sunset/sunrise resolution for a schedule's `"auto"` dome window (spec §6
//! "Schedule descriptor", §8 B1).
//!
//! The Python original resolves this with `skyfield` ephemeris lookups
//! (`rockit/operations/schedule.py::night_start_end`); no example repo in
//! this workspace's retrieval pack depends on an astronomy crate, so this is
//! a hand-written low-precision solar-position calculation (the public-domain
//! NOAA algorithm, accurate to roughly a minute) rather than a fabricated
//! dependency. `night_window` below is the closed-form equivalent of
//! `night_start_end`: the sunset that starts the observing night beginning
//! at local noon on `night`, and the sunrise that ends it the following
//! morning.

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, TimeZone, Utc};
use opsd_core::catalog::SiteLocation;

const DEGREES_PER_RADIAN: f64 = 180.0 / std::f64::consts::PI;
const RADIANS_PER_DEGREE: f64 = std::f64::consts::PI / 180.0;
/// Standard solar elevation (degrees) used for sunrise/sunset, accounting for
/// atmospheric refraction and the sun's apparent radius.
const SUNRISE_ELEVATION_DEG: f64 = -0.833;

fn julian_day(date: NaiveDate) -> f64 {
    date.and_time(NaiveTime::from_hms_opt(12, 0, 0).unwrap())
        .and_utc()
        .timestamp() as f64
        / 86_400.0
        + 2_440_587.5
}

/// Minutes after UTC midnight that the sun crosses `SUNRISE_ELEVATION_DEG`,
/// for the sunrise (`is_sunrise = true`) or sunset event on the UTC calendar
/// day containing Julian day `jd`'s noon.
fn event_minutes_utc(jd: f64, latitude_deg: f64, longitude_deg: f64, is_sunrise: bool) -> Option<f64> {
    let t = (jd - 2_451_545.0) / 36_525.0;

    let geom_mean_long_sun = (280.46646 + t * (36_000.76983 + t * 0.0003032)).rem_euclid(360.0);
    let geom_mean_anom_sun = 357.52911 + t * (35_999.05029 - 0.0001537 * t);
    let eccent_earth_orbit = 0.016_708_634 - t * (0.000_042_037 + 0.000_000_126_7 * t);

    let m_rad = geom_mean_anom_sun * RADIANS_PER_DEGREE;
    let sun_eq_of_ctr = m_rad.sin() * (1.914602 - t * (0.004817 + 0.000014 * t))
        + (2.0 * m_rad).sin() * (0.019993 - 0.000101 * t)
        + (3.0 * m_rad).sin() * 0.000289;

    let sun_true_long = geom_mean_long_sun + sun_eq_of_ctr;
    let sun_app_long = sun_true_long - 0.00569 - 0.00478 * ((125.04 - 1_934.136 * t) * RADIANS_PER_DEGREE).sin();

    let mean_obliq_ecliptic = 23.0
        + (26.0 + (21.448 - t * (46.815 + t * (0.00059 - t * 0.001813))) / 60.0) / 60.0;
    let obliq_corr = mean_obliq_ecliptic + 0.00256 * ((125.04 - 1_934.136 * t) * RADIANS_PER_DEGREE).cos();

    let sun_declin_sin = (obliq_corr * RADIANS_PER_DEGREE).sin() * (sun_app_long * RADIANS_PER_DEGREE).sin();
    let sun_declin_rad = sun_declin_sin.asin();

    let y = (obliq_corr / 2.0 * RADIANS_PER_DEGREE).tan().powi(2);
    let eq_of_time = DEGREES_PER_RADIAN
        * 4.0
        * (y * (2.0 * geom_mean_long_sun * RADIANS_PER_DEGREE).sin()
            - 2.0 * eccent_earth_orbit * m_rad.sin()
            + 4.0 * eccent_earth_orbit * y * m_rad.sin() * (2.0 * geom_mean_long_sun * RADIANS_PER_DEGREE).cos()
            - 0.5 * y * y * (4.0 * geom_mean_long_sun * RADIANS_PER_DEGREE).sin()
            - 1.25 * eccent_earth_orbit * eccent_earth_orbit * (2.0 * m_rad).sin());

    let lat_rad = latitude_deg * RADIANS_PER_DEGREE;
    let cos_hour_angle = (SUNRISE_ELEVATION_DEG * RADIANS_PER_DEGREE).cos() / (lat_rad.cos() * sun_declin_rad.cos())
        - lat_rad.tan() * sun_declin_rad.tan();
    if !(-1.0..=1.0).contains(&cos_hour_angle) {
        // Polar day/night: the sun never crosses the horizon on this date.
        return None;
    }
    let hour_angle_deg = cos_hour_angle.acos() * DEGREES_PER_RADIAN;

    let solar_noon_minutes = 720.0 - 4.0 * longitude_deg - eq_of_time;
    let offset = 4.0 * hour_angle_deg;
    Some(if is_sunrise {
        solar_noon_minutes - offset
    } else {
        solar_noon_minutes + offset
    })
}

fn minutes_to_instant(date: NaiveDate, minutes_utc: f64) -> DateTime<Utc> {
    let base = Utc.from_utc_datetime(&date.and_time(NaiveTime::MIDNIGHT));
    base + Duration::milliseconds((minutes_utc * 60_000.0).round() as i64)
}

/// Resolve `(sunset, sunrise)` for the observing night beginning at local
/// noon on `night` and ending at local noon the following day, mirroring
/// `night_start_end`'s search window.
///
/// Returns `None` at latitudes where the sun does not cross the horizon on
/// either boundary date (polar day/night); callers should treat that the
/// same way a schedule-validation failure is treated (spec §6 "Validation
/// rules").
pub fn night_window(night: NaiveDate, site: SiteLocation) -> Option<(DateTime<Utc>, DateTime<Utc>)> {
    let sunset_day = night;
    let sunrise_day = night.succ_opt()?;

    let sunset_minutes = event_minutes_utc(julian_day(sunset_day), site.latitude_deg, site.longitude_deg, false)?;
    let sunrise_minutes = event_minutes_utc(julian_day(sunrise_day), site.latitude_deg, site.longitude_deg, true)?;

    Some((
        minutes_to_instant(sunset_day, sunset_minutes),
        minutes_to_instant(sunrise_day, sunrise_minutes),
    ))
}
