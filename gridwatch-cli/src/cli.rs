use anyhow::{Context, anyhow, bail};
use chrono::Utc;
use clap::{Parser, Subcommand};
use gridwatch_core::{CarbonSourceId, Config, Dashboard, FetchPhase, ServiceId, Services};
use inquire::{Password, PasswordDisplayMode, Select};
use tracing::debug;

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(
    name = "gridwatch",
    version,
    about = "Weather and grid carbon intensity for a UK postcode"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Store an API key for a service.
    Configure {
        /// Service short name: "openweather", "electricitymaps" or "gemini".
        service: String,
    },

    /// Choose where carbon intensity data comes from.
    Source {
        /// "region-forecast" or "coordinate-history"; prompts if absent.
        source: Option<String>,
    },

    /// Show weather and carbon intensity for a postcode.
    Show {
        /// UK postcode, e.g. "SW1A 0AA".
        postcode: String,

        /// Also ask for carbon saving tips based on the current intensity.
        #[arg(long)]
        tips: bool,

        /// Override the configured carbon source for this run.
        #[arg(long)]
        source: Option<String>,
    },
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        match self.command {
            Command::Configure { service } => configure(&service),
            Command::Source { source } => select_source(source.as_deref()),
            Command::Show {
                postcode,
                tips,
                source,
            } => show(&postcode, tips, source.as_deref()).await,
        }
    }
}

fn configure(service: &str) -> anyhow::Result<()> {
    let id = ServiceId::try_from(service)?;
    if !id.requires_api_key() {
        bail!("Service '{id}' does not need an API key.");
    }

    let api_key = Password::new(&format!("API key for {}:", id.display_name()))
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let mut cfg = Config::load()?;
    cfg.upsert_api_key(id, api_key);
    cfg.save()?;

    println!(
        "Saved API key for {id} to {}",
        Config::config_file_path()?.display()
    );
    Ok(())
}

fn select_source(source: Option<&str>) -> anyhow::Result<()> {
    let id = match source {
        Some(name) => CarbonSourceId::try_from(name)?,
        None => Select::new("Carbon intensity source:", CarbonSourceId::all().to_vec())
            .prompt()
            .context("Failed to read carbon source")?,
    };

    let mut cfg = Config::load()?;
    cfg.set_carbon_source(id);
    cfg.save()?;

    println!("Carbon intensity source set to {id}");
    Ok(())
}

async fn show(postcode: &str, with_tips: bool, source: Option<&str>) -> anyhow::Result<()> {
    let mut cfg = Config::load()?;
    cfg.apply_env(|name| std::env::var(name).ok());
    if let Some(name) = source {
        cfg.set_carbon_source(CarbonSourceId::try_from(name)?);
    }
    debug!("Using carbon source {}", cfg.carbon_source_id()?);

    let mut dashboard = Dashboard::new(Services::from_config(&cfg)?);
    let now = Utc::now();

    // The error is already recorded in the fetch state.
    let _ = dashboard.submit_postcode(postcode, now).await;

    let snapshot = dashboard.snapshot();
    if snapshot.fetch_state.phase == FetchPhase::Failed {
        let message = snapshot.fetch_state.error.unwrap_or_default();
        return Err(anyhow!(message));
    }

    if let Some(weather) = &snapshot.weather {
        println!("{}", render::weather(weather));
    }
    if let Some(series) = &snapshot.series {
        println!("{}", render::series(series, &snapshot.region_label, now));
    }

    if with_tips {
        match dashboard.request_tips(now).await {
            Ok(text) => println!("{}", render::tips(&text)),
            Err(err) => {
                let message = dashboard
                    .fetch_state()
                    .error
                    .clone()
                    .unwrap_or_else(|| err.to_string());
                return Err(anyhow!(message));
            }
        }
    }

    Ok(())
}
