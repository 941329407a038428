//! National Grid ESO Carbon Intensity API (region-forecast variant).
//!
//! Region lookup is by postcode; intensity comes as a regional and a national
//! forecast over the same window, fetched in parallel.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::{DashboardError, DashboardResult},
    model::{Location, RawIntensity, RawPoint, TimeWindow},
    provider::{CarbonSourceId, ServiceId, parse_json, send},
};

use super::CarbonIntensitySource;

const SERVICE: ServiceId = ServiceId::CarbonIntensity;

#[derive(Debug, Clone)]
pub struct CarbonIntensityProvider {
    base_url: String,
    http: Client,
}

/// Instant in the minute-precision form the API expects in paths.
pub fn format_instant(instant: DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%MZ").to_string()
}

/// Region ids arrive as numbers, but accept strings too.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum RegionId {
    Number(u64),
    Text(String),
}

impl RegionId {
    fn into_string(self) -> String {
        match self {
            RegionId::Number(n) => n.to_string(),
            RegionId::Text(s) => s,
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegionLookupResponse {
    #[serde(default)]
    data: Vec<RegionLookupEntry>,
}

#[derive(Debug, Deserialize)]
struct RegionLookupEntry {
    regionid: Option<RegionId>,
    shortname: Option<String>,
    #[serde(default)]
    data: Vec<RegionLookupInner>,
}

#[derive(Debug, Deserialize)]
struct RegionLookupInner {
    regionid: Option<RegionId>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: Option<ApiErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct IntensityEntry {
    from: String,
    intensity: IntensityValue,
}

#[derive(Debug, Deserialize)]
struct IntensityValue {
    forecast: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct RegionalWindowResponse {
    data: RegionalWindowData,
}

#[derive(Debug, Deserialize)]
struct RegionalWindowData {
    shortname: Option<String>,
    data: Vec<IntensityEntry>,
}

#[derive(Debug, Deserialize)]
struct NationalWindowResponse {
    data: Vec<IntensityEntry>,
}

impl CarbonIntensityProvider {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    async fn fetch_regional(
        &self,
        region_id: &str,
        from: &str,
        to: &str,
    ) -> DashboardResult<(Option<String>, Vec<RawPoint>)> {
        let url = format!("{}/regional/intensity/{from}/{to}/regionid/{region_id}", self.base_url);
        debug!("Fetching regional intensity: {url}");

        let (status, body) = send(SERVICE, self.http.get(&url)).await?;
        if !status.is_success() {
            return Err(DashboardError::upstream(
                SERVICE.display_name(),
                format!("Failed to fetch regional carbon data (status {status})."),
            ));
        }

        let parsed: RegionalWindowResponse = parse_json(SERVICE, &body)?;
        Ok((parsed.data.shortname, to_points(parsed.data.data)))
    }

    async fn fetch_national(&self, from: &str, to: &str) -> DashboardResult<Vec<RawPoint>> {
        let url = format!("{}/intensity/{from}/{to}", self.base_url);
        debug!("Fetching national intensity: {url}");

        let (status, body) = send(SERVICE, self.http.get(&url)).await?;
        if !status.is_success() {
            return Err(DashboardError::upstream(
                SERVICE.display_name(),
                format!("Failed to fetch national carbon data (status {status})."),
            ));
        }

        let parsed: NationalWindowResponse = parse_json(SERVICE, &body)?;
        Ok(to_points(parsed.data))
    }
}

fn to_points(entries: Vec<IntensityEntry>) -> Vec<RawPoint> {
    entries
        .into_iter()
        .map(|e| RawPoint::new(e.from, e.intensity.forecast))
        .collect()
}

fn region_not_found() -> DashboardError {
    DashboardError::RegionNotFound(
        "Could not determine carbon intensity region for this postcode. \
         Please ensure it is a valid mainland UK postcode."
            .into(),
    )
}

#[async_trait]
impl CarbonIntensitySource for CarbonIntensityProvider {
    fn id(&self) -> CarbonSourceId {
        CarbonSourceId::RegionForecast
    }

    async fn resolve_region(&self, mut location: Location) -> DashboardResult<Location> {
        let url = format!("{}/regional/postcode/{}", self.base_url, location.postcode);
        debug!("Looking up carbon intensity region for {}", location.postcode);

        let (status, body) = send(SERVICE, self.http.get(&url)).await?;

        if status.is_server_error() {
            return Err(DashboardError::upstream(
                SERVICE.display_name(),
                format!("region lookup failed with status {status}"),
            ));
        }
        if !status.is_success() {
            let detail = serde_json::from_str::<ApiErrorBody>(&body)
                .ok()
                .and_then(|b| b.error)
                .and_then(|e| e.message);

            return Err(match detail {
                Some(message) => DashboardError::RegionNotFound(format!(
                    "Carbon Intensity API Error: {message}. This may not be a mainland UK postcode."
                )),
                None => DashboardError::RegionNotFound(
                    "Could not determine carbon intensity region for this postcode.".into(),
                ),
            });
        }

        let parsed: RegionLookupResponse = parse_json(SERVICE, &body)?;
        let entry = parsed.data.into_iter().next().ok_or_else(region_not_found)?;

        let region_id = entry
            .regionid
            .or_else(|| entry.data.into_iter().next().and_then(|inner| inner.regionid))
            .map(RegionId::into_string)
            .ok_or_else(region_not_found)?;

        info!(
            "Postcode {} is in carbon region {} ({})",
            location.postcode,
            region_id,
            entry.shortname.as_deref().unwrap_or("unnamed")
        );

        location.region_id = Some(region_id);
        location.region_name = entry.shortname;
        Ok(location)
    }

    async fn fetch_intensity(
        &self,
        location: &Location,
        window: TimeWindow,
    ) -> DashboardResult<RawIntensity> {
        let region_id = location.region_id.as_deref().ok_or_else(region_not_found)?;
        let from = format_instant(window.from);
        let to = format_instant(window.to);

        let ((shortname, regional), national) = tokio::try_join!(
            self.fetch_regional(region_id, &from, &to),
            self.fetch_national(&from, &to),
        )?;

        debug!(
            "Received {} regional and {} national points",
            regional.len(),
            national.len()
        );

        Ok(RawIntensity {
            primary: regional,
            secondary: Some(national),
            region_label: location.region_name.clone().or(shortname),
        })
    }
}
