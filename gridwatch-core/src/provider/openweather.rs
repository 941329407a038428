use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use tracing::debug;

use crate::{
    Config,
    error::{DashboardError, DashboardResult},
    model::{Location, WeatherSnapshot},
    provider::{ServiceId, parse_json, require_key, send, truncate_body},
};

use super::WeatherProvider;

const SERVICE: ServiceId = ServiceId::OpenWeather;

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: Option<String>,
    base_url: String,
    http: Client,
}

impl OpenWeatherProvider {
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

#[derive(Debug, Deserialize)]
struct OwMain {
    temp: f64,
    feels_like: f64,
    humidity: u8,
}

#[derive(Debug, Deserialize)]
struct OwWeather {
    description: String,
    icon: String,
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: String,
    main: OwMain,
    #[serde(default)]
    weather: Vec<OwWeather>,
}

#[derive(Debug, Deserialize)]
struct OwError {
    message: Option<String>,
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn current_weather(&self, location: &Location) -> DashboardResult<WeatherSnapshot> {
        let api_key = require_key(SERVICE, self.api_key.as_deref())?;
        let url = format!("{}/data/2.5/weather", self.base_url);

        debug!("Fetching weather for ({}, {})", location.latitude, location.longitude);

        let request = self.http.get(&url).query(&[
            ("lat", location.latitude.to_string()),
            ("lon", location.longitude.to_string()),
            ("appid", api_key.to_string()),
            ("units", "metric".to_string()),
        ]);
        let (status, body) = send(SERVICE, request).await?;

        if !status.is_success() {
            let message = serde_json::from_str::<OwError>(&body)
                .ok()
                .and_then(|e| e.message)
                .unwrap_or_else(|| format!("status {status}: {}", truncate_body(&body)));
            return Err(DashboardError::upstream("Weather API", message));
        }

        let parsed: OwCurrentResponse = parse_json(SERVICE, &body)?;

        let (description, icon_id) = parsed
            .weather
            .into_iter()
            .next()
            .map(|w| (w.description, w.icon))
            .unwrap_or_else(|| ("Unknown".to_string(), String::new()));

        Ok(WeatherSnapshot {
            place: parsed.name,
            description,
            icon_id,
            temperature_c: parsed.main.temp,
            feels_like_c: parsed.main.feels_like,
            humidity_pct: parsed.main.humidity,
        })
    }
}
