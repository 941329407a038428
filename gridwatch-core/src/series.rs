//! Turning raw provider series into a chartable [`IntensitySeries`].

use std::collections::HashMap;

use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use tracing::{debug, warn};

use crate::{
    error::{DashboardError, DashboardResult},
    model::{IntensitySample, IntensitySeries, RawPoint},
};

/// Formats accepted besides RFC 3339. Carbon Intensity omits seconds (`2024-03-10T12:30Z`).
const NAIVE_UTC_FORMATS: &[&str] = &["%Y-%m-%dT%H:%MZ", "%Y-%m-%dT%H:%M:%S%.fZ", "%Y-%m-%dT%H:%M"];

/// Parse an upstream timestamp as a UTC instant.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_UTC_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
        .map(|naive| naive.and_utc())
}

/// Label like `10 Mar, 14:30`, rendered in `tz`.
pub fn display_label<Tz>(instant: DateTime<Utc>, tz: &Tz) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    instant.with_timezone(tz).format("%-d %b, %H:%M").to_string()
}

/// Pair `primary` with `secondary` by timestamp key and sort chronologically.
///
/// A pair is dropped when the primary value is missing, or when a secondary
/// series exists but has no value for that timestamp. With no secondary series
/// every sample keeps `national_intensity = None`.
pub fn merge_series<Tz>(
    primary: &[RawPoint],
    secondary: Option<&[RawPoint]>,
    tz: &Tz,
) -> IntensitySeries
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    let lookup: Option<HashMap<&str, Option<f64>>> = secondary.map(|points| {
        points
            .iter()
            .map(|p| (p.timestamp.as_str(), p.intensity))
            .collect()
    });

    let mut samples: Vec<IntensitySample> = primary
        .iter()
        .filter_map(|point| {
            let local = point.intensity?;

            let national = match &lookup {
                Some(map) => Some((*map.get(point.timestamp.as_str())?)?),
                None => None,
            };

            let Some(instant) = parse_timestamp(&point.timestamp) else {
                warn!("Skipping sample with unparseable timestamp '{}'", point.timestamp);
                return None;
            };

            Some(IntensitySample {
                timestamp_iso: point.timestamp.clone(),
                instant,
                local_intensity: local,
                national_intensity: national,
                display_label: display_label(instant, tz),
            })
        })
        .collect();

    samples.sort_by_key(|s| s.instant);
    samples.dedup_by_key(|s| s.instant);

    debug!(
        "Merged {} primary points into {} samples",
        primary.len(),
        samples.len()
    );

    IntensitySeries::from_sorted(samples)
}

/// The sample closest to `now`; the earliest one wins a tie.
pub fn nearest_sample(
    series: &IntensitySeries,
    now: DateTime<Utc>,
) -> DashboardResult<&IntensitySample> {
    let mut iter = series.iter();
    let mut best = iter.next().ok_or(DashboardError::EmptySeries)?;
    let mut best_diff = (best.instant - now).abs();

    for sample in iter {
        let diff = (sample.instant - now).abs();
        if diff < best_diff {
            best = sample;
            best_diff = diff;
        }
    }

    Ok(best)
}
