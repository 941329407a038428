//! Electricity Maps (coordinate-history variant).
//!
//! One request returns the provider's own recent history for the zone covering
//! a coordinate. There is no national series.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    Config,
    error::{DashboardError, DashboardResult},
    model::{Location, RawIntensity, RawPoint, TimeWindow},
    provider::{CarbonSourceId, ServiceId, parse_json, require_key, send, truncate_body},
};

use super::CarbonIntensitySource;

const SERVICE: ServiceId = ServiceId::ElectricityMaps;

#[derive(Debug, Clone)]
pub struct ElectricityMapsProvider {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

#[derive(Debug, Deserialize)]
struct EmHistoryResponse {
    zone: Option<String>,
    history: Option<Vec<EmHistoryPoint>>,
}

#[derive(Debug, Deserialize)]
struct EmHistoryPoint {
    datetime: String,
    #[serde(rename = "carbonIntensity")]
    carbon_intensity: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EmError {
    error: Option<String>,
    message: Option<String>,
}

impl ElectricityMapsProvider {
    pub fn new(api_key: Option<String>, base_url: impl Into<String>, http: Client) -> Self {
        Self {
            api_key,
            base_url: base_url.into(),
            http,
        }
    }

    pub fn from_config(config: &Config, http: Client) -> Self {
        Self::new(
            config.api_key(SERVICE).map(str::to_owned),
            config.base_url(SERVICE),
            http,
        )
    }
}

#[async_trait]
impl CarbonIntensitySource for ElectricityMapsProvider {
    fn id(&self) -> CarbonSourceId {
        CarbonSourceId::CoordinateHistory
    }

    /// The window is ignored; the provider decides how much history to return.
    async fn fetch_intensity(
        &self,
        location: &Location,
        _window: TimeWindow,
    ) -> DashboardResult<RawIntensity> {
        let api_key = require_key(SERVICE, self.api_key.as_deref())?;
        let url = format!("{}/v3/carbon-intensity/history", self.base_url);

        debug!(
            "Fetching intensity history for ({}, {})",
            location.latitude, location.longitude
        );

        let request = self
            .http
            .get(&url)
            .header("auth-token", api_key)
            .query(&[
                ("lat", location.latitude.to_string()),
                ("lon", location.longitude.to_string()),
            ]);
        let (status, body) = send(SERVICE, request).await?;

        if !status.is_success() {
            let message = serde_json::from_str::<EmError>(&body)
                .ok()
                .and_then(|e| e.message.or(e.error))
                .unwrap_or_else(|| truncate_body(&body));
            return Err(DashboardError::upstream(
                SERVICE.display_name(),
                format!("status {status}: {message}"),
            ));
        }

        let parsed: EmHistoryResponse = parse_json(SERVICE, &body)?;
        let history = parsed.history.ok_or_else(|| {
            DashboardError::upstream(
                SERVICE.display_name(),
                "response did not contain carbon intensity history",
            )
        })?;

        debug!("Received {} history points for zone {:?}", history.len(), parsed.zone);

        Ok(RawIntensity {
            primary: history
                .into_iter()
                .map(|p| RawPoint::new(p.datetime, p.carbon_intensity))
                .collect(),
            secondary: None,
            region_label: parsed.zone,
        })
    }
}
