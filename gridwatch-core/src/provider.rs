use crate::{
    Config,
    error::{DashboardError, DashboardResult},
    model::{Location, RawIntensity, TimeWindow, TipRequest, WeatherSnapshot},
    provider::{
        carbon_intensity::CarbonIntensityProvider, electricity_maps::ElectricityMapsProvider,
        gemini::GeminiTipGenerator, openweather::OpenWeatherProvider, postcodes::PostcodeResolver,
    },
};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use std::fmt::Debug;

pub mod carbon_intensity;
pub mod electricity_maps;
pub mod gemini;
pub mod openweather;
pub mod postcodes;

/// Every upstream service the dashboard talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ServiceId {
    Postcodes,
    OpenWeather,
    CarbonIntensity,
    ElectricityMaps,
    Gemini,
}

impl ServiceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            ServiceId::Postcodes => "postcodes",
            ServiceId::OpenWeather => "openweather",
            ServiceId::CarbonIntensity => "carbonintensity",
            ServiceId::ElectricityMaps => "electricitymaps",
            ServiceId::Gemini => "gemini",
        }
    }

    /// Name used in user-facing error messages.
    pub fn display_name(&self) -> &'static str {
        match self {
            ServiceId::Postcodes => "Postcode lookup",
            ServiceId::OpenWeather => "OpenWeather",
            ServiceId::CarbonIntensity => "Carbon Intensity API",
            ServiceId::ElectricityMaps => "Electricity Maps",
            ServiceId::Gemini => "Gemini API",
        }
    }

    pub const fn all() -> &'static [ServiceId] {
        &[
            ServiceId::Postcodes,
            ServiceId::OpenWeather,
            ServiceId::CarbonIntensity,
            ServiceId::ElectricityMaps,
            ServiceId::Gemini,
        ]
    }

    pub fn requires_api_key(&self) -> bool {
        self.env_var().is_some()
    }

    pub fn env_var(&self) -> Option<&'static str> {
        match self {
            ServiceId::OpenWeather => Some("OPENWEATHER_API_KEY"),
            ServiceId::ElectricityMaps => Some("ELECTRICITYMAPS_API_KEY"),
            ServiceId::Gemini => Some("GEMINI_API_KEY"),
            ServiceId::Postcodes | ServiceId::CarbonIntensity => None,
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            ServiceId::Postcodes => "https://api.postcodes.io",
            ServiceId::OpenWeather => "https://api.openweathermap.org",
            ServiceId::CarbonIntensity => "https://api.carbonintensity.org.uk",
            ServiceId::ElectricityMaps => "https://api.electricitymap.org",
            ServiceId::Gemini => "https://generativelanguage.googleapis.com",
        }
    }
}

impl std::fmt::Display for ServiceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for ServiceId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.to_lowercase();

        ServiceId::all()
            .iter()
            .copied()
            .find(|id| id.as_str() == lower)
            .ok_or_else(|| {
                anyhow::anyhow!(
                    "Unknown service '{value}'. Supported services: postcodes, openweather, \
                     carbonintensity, electricitymaps, gemini."
                )
            })
    }
}

/// Which upstream shape supplies carbon intensity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CarbonSourceId {
    /// Regional + national forecast window, keyed by region id.
    #[default]
    RegionForecast,
    /// Recent history at a coordinate, no national series.
    CoordinateHistory,
}

impl CarbonSourceId {
    pub fn as_str(&self) -> &'static str {
        match self {
            CarbonSourceId::RegionForecast => "region-forecast",
            CarbonSourceId::CoordinateHistory => "coordinate-history",
        }
    }

    pub const fn all() -> &'static [CarbonSourceId] {
        &[CarbonSourceId::RegionForecast, CarbonSourceId::CoordinateHistory]
    }
}

impl std::fmt::Display for CarbonSourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for CarbonSourceId {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        let lower = value.trim().to_lowercase();

        match lower.as_str() {
            "region-forecast" => Ok(CarbonSourceId::RegionForecast),
            "coordinate-history" => Ok(CarbonSourceId::CoordinateHistory),
            _ => Err(anyhow::anyhow!(
                "Unknown carbon source '{value}'. Supported sources: region-forecast, coordinate-history."
            )),
        }
    }
}

#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    async fn current_weather(&self, location: &Location) -> DashboardResult<WeatherSnapshot>;
}

#[async_trait]
pub trait CarbonIntensitySource: Send + Sync + Debug {
    fn id(&self) -> CarbonSourceId;

    /// Attach region details to a freshly resolved location.
    ///
    /// Runs before the weather and intensity requests are issued.
    async fn resolve_region(&self, location: Location) -> DashboardResult<Location> {
        Ok(location)
    }

    async fn fetch_intensity(
        &self,
        location: &Location,
        window: TimeWindow,
    ) -> DashboardResult<RawIntensity>;
}

#[async_trait]
pub trait TipGenerator: Send + Sync + Debug {
    async fn generate_tips(&self, request: &TipRequest) -> DashboardResult<String>;
}

/// All collaborators needed by one dashboard.
#[derive(Debug)]
pub struct Services {
    pub locations: PostcodeResolver,
    pub weather: Box<dyn WeatherProvider>,
    pub carbon: Box<dyn CarbonIntensitySource>,
    pub tips: Box<dyn TipGenerator>,
}

impl Services {
    /// Build every client from config. Missing credentials are reported when a
    /// service is first used, not here.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let http = http_client(config)?;
        let carbon = carbon_source_from_config(config.carbon_source_id()?, config, http.clone());

        Ok(Self {
            locations: PostcodeResolver::new(config.base_url(ServiceId::Postcodes), http.clone()),
            weather: Box::new(OpenWeatherProvider::from_config(config, http.clone())),
            carbon,
            tips: Box::new(GeminiTipGenerator::from_config(config, http)),
        })
    }
}

/// Construct a carbon source from config and explicit id.
pub fn carbon_source_from_config(
    id: CarbonSourceId,
    config: &Config,
    http: Client,
) -> Box<dyn CarbonIntensitySource> {
    match id {
        CarbonSourceId::RegionForecast => Box::new(CarbonIntensityProvider::new(
            config.base_url(ServiceId::CarbonIntensity),
            http,
        )),
        CarbonSourceId::CoordinateHistory => {
            Box::new(ElectricityMapsProvider::from_config(config, http))
        }
    }
}

pub fn http_client(config: &Config) -> anyhow::Result<Client> {
    Client::builder()
        .timeout(config.request_timeout())
        .user_agent(concat!("gridwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))
}

/// Fail with a configuration error unless `key` holds a credential.
pub(crate) fn require_key(id: ServiceId, key: Option<&str>) -> DashboardResult<&str> {
    key.ok_or_else(|| {
        let env = id.env_var().unwrap_or("the matching environment variable");
        DashboardError::Configuration(format!(
            "{} API key is missing. Hint: set {env} or run `gridwatch configure {id}`.",
            id.display_name()
        ))
    })
}

/// Send a request and read the whole body. Transport failures are upstream errors.
pub(crate) async fn send(id: ServiceId, request: RequestBuilder) -> DashboardResult<(StatusCode, String)> {
    let res = request.send().await.map_err(|e| {
        DashboardError::upstream(id.display_name(), format!("request failed: {}", e.without_url()))
    })?;

    let status = res.status();
    let body = res.text().await.map_err(|e| {
        DashboardError::upstream(
            id.display_name(),
            format!("failed to read response body: {}", e.without_url()),
        )
    })?;

    Ok((status, body))
}

pub(crate) fn parse_json<T: DeserializeOwned>(id: ServiceId, body: &str) -> DashboardResult<T> {
    serde_json::from_str(body).map_err(|e| DashboardError::malformed(id.display_name(), e.to_string()))
}

pub(crate) fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    if body.chars().count() > MAX {
        format!("{}...", body.chars().take(MAX).collect::<String>())
    } else {
        body.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn service_id_as_str_roundtrip() {
        for id in ServiceId::all() {
            let parsed = ServiceId::try_from(id.as_str()).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn carbon_source_id_roundtrip() {
        for id in CarbonSourceId::all() {
            let parsed = CarbonSourceId::try_from(id.as_str()).expect("roundtrip should succeed");
            assert_eq!(*id, parsed);
        }
    }

    #[test]
    fn unknown_service_error() {
        let err = ServiceId::try_from("doesnotexist").unwrap_err();
        assert!(err.to_string().contains("Unknown service"));
    }

    #[test]
    fn only_credentialed_services_need_keys() {
        assert!(ServiceId::OpenWeather.requires_api_key());
        assert!(ServiceId::ElectricityMaps.requires_api_key());
        assert!(ServiceId::Gemini.requires_api_key());
        assert!(!ServiceId::Postcodes.requires_api_key());
        assert!(!ServiceId::CarbonIntensity.requires_api_key());
    }

    #[test]
    fn require_key_reports_configuration_error() {
        let err = require_key(ServiceId::OpenWeather, None).unwrap_err();

        assert!(matches!(err, DashboardError::Configuration(_)));
        let msg = err.to_string();
        assert!(msg.contains("OpenWeather API key is missing"));
        assert!(msg.contains("OPENWEATHER_API_KEY"));
        assert!(msg.contains("gridwatch configure openweather"));
    }

    #[test]
    fn services_follow_configured_carbon_source() {
        let mut cfg = Config::default();
        let services = Services::from_config(&cfg).unwrap();
        assert_eq!(services.carbon.id(), CarbonSourceId::RegionForecast);

        cfg.set_carbon_source(CarbonSourceId::CoordinateHistory);
        let services = Services::from_config(&cfg).unwrap();
        assert_eq!(services.carbon.id(), CarbonSourceId::CoordinateHistory);
    }

    #[test]
    fn truncate_body_respects_char_boundaries() {
        let long = "é".repeat(300);
        let truncated = truncate_body(&long);

        assert!(truncated.ends_with("..."));
        assert_eq!(truncated.chars().count(), 203);
        assert_eq!(truncate_body("short"), "short");
    }
}
