//! The orchestrator: one fetch cycle at a time, plus on-demand tips.
//!
//! State only changes through [`Dashboard`] methods. Long-running work is split
//! into `begin_*` / async work / `commit_*`/`finish_*` so a caller that runs the
//! work elsewhere still gets stale results discarded by token.

use std::sync::Arc;

use chrono::{DateTime, Local, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    error::{DashboardError, DashboardResult},
    model::{
        FetchPhase, FetchState, GENERIC_GRID_LABEL, IntensitySeries, TimeWindow, TipRequest,
        WeatherSnapshot,
    },
    provider::Services,
    series::{merge_series, nearest_sample},
};

/// Identifies one fetch cycle. Only the latest token may commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CycleToken(u64);

/// A tip request bound to the cycle whose data it was built from.
#[derive(Debug, Clone, PartialEq)]
pub struct TipTicket {
    cycle: CycleToken,
    pub request: TipRequest,
}

/// Everything a successful cycle produces.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleData {
    pub weather: WeatherSnapshot,
    pub series: IntensitySeries,
    pub region_label: String,
}

/// Read-only view for the presentation layer.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardSnapshot {
    pub fetch_state: FetchState,
    pub weather: Option<WeatherSnapshot>,
    pub series: Option<IntensitySeries>,
    pub region_label: String,
    pub tips: Option<String>,
    pub tips_loading: bool,
}

/// Resolve, then fetch weather and intensity concurrently, then merge.
///
/// Fails as soon as any step fails.
pub async fn run_cycle(
    services: &Services,
    postcode: &str,
    now: DateTime<Utc>,
) -> DashboardResult<CycleData> {
    let location = services.locations.resolve(postcode).await?;
    let location = services.carbon.resolve_region(location).await?;
    let window = TimeWindow::around(now);

    let (weather, raw) = tokio::try_join!(
        services.weather.current_weather(&location),
        services.carbon.fetch_intensity(&location, window),
    )?;

    let series = merge_series(&raw.primary, raw.secondary.as_deref(), &Local);
    let region_label = raw
        .region_label
        .or(location.region_name)
        .unwrap_or_else(|| GENERIC_GRID_LABEL.to_string());

    Ok(CycleData {
        weather,
        series,
        region_label,
    })
}

#[derive(Debug)]
pub struct Dashboard {
    services: Arc<Services>,
    state: FetchState,
    weather: Option<WeatherSnapshot>,
    series: Option<IntensitySeries>,
    region_label: String,
    tips: Option<String>,
    tips_loading: bool,
    cycle: CycleToken,
}

impl Dashboard {
    pub fn new(services: Services) -> Self {
        Self {
            services: Arc::new(services),
            state: FetchState::default(),
            weather: None,
            series: None,
            region_label: String::new(),
            tips: None,
            tips_loading: false,
            cycle: CycleToken(0),
        }
    }

    pub fn services(&self) -> Arc<Services> {
        Arc::clone(&self.services)
    }

    pub fn fetch_state(&self) -> &FetchState {
        &self.state
    }

    pub fn series(&self) -> Option<&IntensitySeries> {
        self.series.as_ref()
    }

    pub fn snapshot(&self) -> DashboardSnapshot {
        DashboardSnapshot {
            fetch_state: self.state.clone(),
            weather: self.weather.clone(),
            series: self.series.clone(),
            region_label: self.region_label.clone(),
            tips: self.tips.clone(),
            tips_loading: self.tips_loading,
        }
    }

    /// Run a complete fetch cycle for `postcode`.
    ///
    /// The error is returned and also recorded in the fetch state.
    pub async fn submit_postcode(&mut self, postcode: &str, now: DateTime<Utc>) -> DashboardResult<()> {
        let token = self.begin_cycle();
        let services = self.services();
        let outcome = run_cycle(&services, postcode, now).await;
        let result = outcome.as_ref().map(|_| ()).map_err(|e| e.clone());
        self.commit_cycle(token, outcome);
        result
    }

    /// Drop all data from the previous cycle and enter `Loading`.
    pub fn begin_cycle(&mut self) -> CycleToken {
        self.cycle = CycleToken(self.cycle.0 + 1);
        self.state = FetchState {
            phase: FetchPhase::Loading,
            error: None,
        };
        self.weather = None;
        self.series = None;
        self.region_label.clear();
        self.tips = None;
        self.tips_loading = false;

        info!("Starting fetch cycle {}", self.cycle.0);
        self.cycle
    }

    /// Apply a cycle's outcome. Returns `false` if a later cycle has started.
    pub fn commit_cycle(&mut self, token: CycleToken, outcome: DashboardResult<CycleData>) -> bool {
        if token != self.cycle {
            debug!("Discarding result of superseded cycle {}", token.0);
            return false;
        }

        match outcome {
            Ok(data) => {
                info!(
                    "Cycle {} ready: {} samples for {}",
                    token.0,
                    data.series.len(),
                    data.region_label
                );
                self.weather = Some(data.weather);
                self.series = Some(data.series);
                self.region_label = data.region_label;
                self.state = FetchState {
                    phase: FetchPhase::Ready,
                    error: None,
                };
            }
            Err(err) => {
                warn!("Cycle {} failed: {err}", token.0);
                self.weather = None;
                self.series = None;
                self.region_label.clear();
                self.state = FetchState {
                    phase: FetchPhase::Failed,
                    error: Some(err.to_string()),
                };
            }
        }

        true
    }

    /// Generate tips for the sample nearest to `now`.
    ///
    /// The error is returned and also recorded in the fetch state.
    pub async fn request_tips(&mut self, now: DateTime<Utc>) -> DashboardResult<String> {
        let ticket = match self.begin_tips(now) {
            Ok(ticket) => ticket,
            Err(DashboardError::TipsInFlight) => return Err(DashboardError::TipsInFlight),
            Err(err) => {
                self.surface_tip_error(&err);
                return Err(err);
            }
        };

        let services = self.services();
        let outcome = services.tips.generate_tips(&ticket.request).await;
        let result = outcome.clone();
        self.finish_tips(ticket, outcome);
        result
    }

    /// Check preconditions and mark tips as loading.
    pub fn begin_tips(&mut self, now: DateTime<Utc>) -> DashboardResult<TipTicket> {
        if self.tips_loading {
            return Err(DashboardError::TipsInFlight);
        }

        let series = self.series.as_ref().ok_or(DashboardError::EmptySeries)?;
        let sample = nearest_sample(series, now)?;
        let request = TipRequest::from_sample(self.region_label.clone(), sample);

        debug!("Requesting tips for sample at {}", sample.timestamp_iso);
        self.tips = None;
        self.tips_loading = true;

        Ok(TipTicket {
            cycle: self.cycle,
            request,
        })
    }

    /// Store generated tips unless the data they were built from has been replaced.
    pub fn finish_tips(&mut self, ticket: TipTicket, outcome: DashboardResult<String>) -> bool {
        if ticket.cycle != self.cycle {
            debug!("Discarding tips for superseded cycle {}", ticket.cycle.0);
            return false;
        }

        self.tips_loading = false;
        match outcome {
            Ok(text) => self.tips = Some(text),
            Err(err) => self.surface_tip_error(&err),
        }

        true
    }

    /// Clear the displayed error. A failed cycle returns to `Idle`.
    pub fn dismiss_error(&mut self) {
        self.state.error = None;
        if self.state.phase == FetchPhase::Failed {
            self.state.phase = FetchPhase::Idle;
        }
    }

    fn surface_tip_error(&mut self, err: &DashboardError) {
        warn!("Tip generation failed: {err}");
        self.state.error = Some(format!("Failed to generate tips: {err}"));
    }
}
