use anyhow::{Context, Result, anyhow};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{collections::HashMap, fs, path::PathBuf, time::Duration};

use crate::provider::{CarbonSourceId, ServiceId};

/// Environment variable selecting the carbon source.
pub const CARBON_SOURCE_ENV: &str = "GRIDWATCH_CARBON_SOURCE";

const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Per-service settings. Every field is optional.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct ServiceConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Overrides the service's public endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,

    /// Generation model, only read for `gemini`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

/// Top-level configuration stored on disk.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// "region-forecast" (default) or "coordinate-history".
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub carbon_source: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    /// Example TOML:
    /// [services.openweather]
    /// api_key = "..."
    #[serde(default)]
    pub services: HashMap<String, ServiceConfig>,
}

impl Config {
    /// Selected carbon source, defaulting to region-forecast.
    pub fn carbon_source_id(&self) -> Result<CarbonSourceId> {
        match self.carbon_source.as_deref() {
            None => Ok(CarbonSourceId::default()),
            Some(s) => CarbonSourceId::try_from(s),
        }
    }

    pub fn set_carbon_source(&mut self, id: CarbonSourceId) {
        self.carbon_source = Some(id.as_str().to_string());
    }

    pub fn service_config(&self, id: ServiceId) -> Option<&ServiceConfig> {
        self.services.get(id.as_str())
    }

    fn service_config_mut(&mut self, id: ServiceId) -> &mut ServiceConfig {
        self.services.entry(id.as_str().to_string()).or_default()
    }

    /// Set or replace the API key for a service.
    pub fn upsert_api_key(&mut self, id: ServiceId, api_key: String) {
        self.service_config_mut(id).api_key = Some(api_key);
    }

    pub fn set_base_url(&mut self, id: ServiceId, base_url: impl Into<String>) {
        self.service_config_mut(id).base_url = Some(base_url.into());
    }

    /// API key for a service, ignoring blank values and `YOUR_..._API_KEY` placeholders.
    pub fn api_key(&self, id: ServiceId) -> Option<&str> {
        self.service_config(id)
            .and_then(|cfg| cfg.api_key.as_deref())
            .map(str::trim)
            .filter(|key| !is_placeholder(key))
    }

    pub fn is_service_configured(&self, id: ServiceId) -> bool {
        !id.requires_api_key() || self.api_key(id).is_some()
    }

    /// Configured base URL without a trailing slash, or the public default.
    pub fn base_url(&self, id: ServiceId) -> String {
        self.service_config(id)
            .and_then(|cfg| cfg.base_url.as_deref())
            .unwrap_or(id.default_base_url())
            .trim_end_matches('/')
            .to_string()
    }

    pub fn model(&self, id: ServiceId) -> Option<&str> {
        self.service_config(id).and_then(|cfg| cfg.model.as_deref())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS))
    }

    /// Apply environment overrides from `lookup` (normally `std::env::var`).
    ///
    /// Values present in the environment replace file values.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        for id in ServiceId::all() {
            if let Some(key) = id.env_var().and_then(&lookup) {
                self.upsert_api_key(*id, key);
            }
        }

        if let Some(source) = lookup(CARBON_SOURCE_ENV) {
            self.carbon_source = Some(source);
        }
    }

    /// Load config from disk, or return an empty default if it doesn't exist yet.
    pub fn load() -> Result<Self> {
        let path = Self::config_file_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let cfg: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(cfg)
    }

    /// Save config to disk, creating parent directories as needed.
    pub fn save(&self) -> Result<()> {
        let path = Self::config_file_path()?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let toml =
            toml::to_string_pretty(self).context("Failed to serialize configuration to TOML")?;

        fs::write(&path, toml)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;

        Ok(())
    }

    /// Path to the config file.
    pub fn config_file_path() -> Result<PathBuf> {
        let dirs = ProjectDirs::from("dev", "gridwatch", "gridwatch")
            .ok_or_else(|| anyhow!("Could not determine platform config directory"))?;

        Ok(dirs.config_dir().join("config.toml"))
    }
}

fn is_placeholder(key: &str) -> bool {
    key.is_empty() || (key.starts_with("YOUR_") && key.ends_with("_API_KEY"))
}
