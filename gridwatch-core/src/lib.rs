//! Core library for the `gridwatch` dashboard.
//!
//! This crate defines:
//! - Configuration & credentials handling
//! - Clients for the postcode, weather, carbon intensity and tip services
//! - Merging raw intensity series into a chartable, time-ordered series
//! - The [`Dashboard`] orchestrator that runs fetch cycles and tip requests
//!
//! It is used by `gridwatch-cli`, but can also back other front ends.

pub mod config;
pub mod dashboard;
pub mod error;
pub mod model;
pub mod provider;
pub mod series;

pub use config::{Config, ServiceConfig};
pub use dashboard::{CycleData, CycleToken, Dashboard, DashboardSnapshot, TipTicket, run_cycle};
pub use error::{DashboardError, DashboardResult};
pub use model::{
    FetchPhase, FetchState, IntensitySample, IntensitySeries, Location, TipRequest,
    WeatherSnapshot,
};
pub use provider::{CarbonSourceId, ServiceId, Services};
pub use series::{merge_series, nearest_sample};
