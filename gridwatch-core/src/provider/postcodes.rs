use reqwest::Client;
use serde::Deserialize;
use tracing::{debug, info};

use crate::{
    error::{DashboardError, DashboardResult},
    model::Location,
    provider::{ServiceId, parse_json, send},
};

const SERVICE: ServiceId = ServiceId::Postcodes;

/// Resolves UK postcodes through postcodes.io.
#[derive(Debug, Clone)]
pub struct PostcodeResolver {
    base_url: String,
    http: Client,
}

/// Strip all whitespace and upper-case.
pub fn normalize_postcode(raw: &str) -> String {
    raw.chars()
        .filter(|c| !c.is_whitespace())
        .flat_map(char::to_uppercase)
        .collect()
}

#[derive(Debug, Deserialize)]
struct PcResponse {
    result: PcResult,
}

#[derive(Debug, Deserialize)]
struct PcResult {
    latitude: Option<f64>,
    longitude: Option<f64>,
}

impl PostcodeResolver {
    pub fn new(base_url: impl Into<String>, http: Client) -> Self {
        Self {
            base_url: base_url.into(),
            http,
        }
    }

    pub async fn resolve(&self, raw: &str) -> DashboardResult<Location> {
        let postcode = normalize_postcode(raw);

        if postcode.is_empty() {
            return Err(DashboardError::InvalidLocation("Please enter a postcode.".into()));
        }
        if !postcode.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(invalid_postcode());
        }

        let url = format!("{}/postcodes/{}", self.base_url, postcode);
        debug!("Looking up postcode {postcode}");

        let (status, body) = send(SERVICE, self.http.get(&url)).await?;

        if !status.is_success() {
            debug!("Postcode lookup for {postcode} returned {status}");
            return Err(invalid_postcode());
        }

        let parsed: PcResponse = parse_json(SERVICE, &body)?;

        let (Some(latitude), Some(longitude)) = (parsed.result.latitude, parsed.result.longitude)
        else {
            return Err(DashboardError::InvalidLocation(format!(
                "Postcode {postcode} has no known coordinates."
            )));
        };

        info!("Resolved {postcode} to ({latitude}, {longitude})");

        Ok(Location {
            postcode,
            latitude,
            longitude,
            region_id: None,
            region_name: None,
        })
    }
}

fn invalid_postcode() -> DashboardError {
    DashboardError::InvalidLocation(
        "Invalid UK Postcode. Please check the postcode entered.".into(),
    )
}
