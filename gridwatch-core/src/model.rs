use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

/// Half-width of the carbon intensity window around "now".
pub const WINDOW_HALF_WIDTH_HOURS: i64 = 24;

/// Region label used when the carbon source has no region concept.
pub const GENERIC_GRID_LABEL: &str = "your local grid";

/// A resolved postcode.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Location {
    /// Normalized postcode (upper case, no whitespace).
    pub postcode: String,
    pub latitude: f64,
    pub longitude: f64,
    pub region_id: Option<String>,
    pub region_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherSnapshot {
    pub place: String,
    pub description: String,
    pub icon_id: String,
    pub temperature_c: f64,
    pub feels_like_c: f64,
    pub humidity_pct: u8,
}

impl WeatherSnapshot {
    pub fn icon_url(&self) -> String {
        format!("https://openweathermap.org/img/wn/{}@2x.png", self.icon_id)
    }
}

/// One upstream data point, exactly as the provider reported it.
#[derive(Debug, Clone, PartialEq)]
pub struct RawPoint {
    pub timestamp: String,
    pub intensity: Option<f64>,
}

impl RawPoint {
    pub fn new(timestamp: impl Into<String>, intensity: Option<f64>) -> Self {
        Self {
            timestamp: timestamp.into(),
            intensity,
        }
    }
}

/// What a carbon source hands to the merger.
///
/// `secondary` is `None` when the source has no national series at all.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawIntensity {
    pub primary: Vec<RawPoint>,
    pub secondary: Option<Vec<RawPoint>>,
    pub region_label: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub from: DateTime<Utc>,
    pub to: DateTime<Utc>,
}

impl TimeWindow {
    /// `now - 24h .. now + 24h`.
    pub fn around(now: DateTime<Utc>) -> Self {
        let half = Duration::hours(WINDOW_HALF_WIDTH_HOURS);
        Self {
            from: now - half,
            to: now + half,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntensitySample {
    /// Timestamp string exactly as received from upstream.
    pub timestamp_iso: String,
    #[serde(skip)]
    pub instant: DateTime<Utc>,
    pub local_intensity: f64,
    /// Always `Some` unless the carbon source has no national series.
    pub national_intensity: Option<f64>,
    pub display_label: String,
}

/// Samples ordered by instant, one per timestamp.
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
#[serde(transparent)]
pub struct IntensitySeries {
    samples: Vec<IntensitySample>,
}

impl IntensitySeries {
    /// Callers must pass samples already sorted and deduplicated.
    pub(crate) fn from_sorted(samples: Vec<IntensitySample>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[IntensitySample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, IntensitySample> {
        self.samples.iter()
    }
}

impl<'a> IntoIterator for &'a IntensitySeries {
    type Item = &'a IntensitySample;
    type IntoIter = std::slice::Iter<'a, IntensitySample>;

    fn into_iter(self) -> Self::IntoIter {
        self.samples.iter()
    }
}

/// Input for the tip generator, built from the sample nearest to now.
#[derive(Debug, Clone, PartialEq)]
pub struct TipRequest {
    pub region_label: String,
    pub current_intensity: f64,
    pub reference_intensity: Option<f64>,
}

impl TipRequest {
    pub fn from_sample(region_label: impl Into<String>, sample: &IntensitySample) -> Self {
        Self {
            region_label: region_label.into(),
            current_intensity: sample.local_intensity,
            reference_intensity: sample.national_intensity,
        }
    }

    pub fn prompt(&self) -> String {
        let comparison = match self.reference_intensity {
            Some(national) => {
                format!(" (compared to a national average of {national} gCO2/kWh)")
            }
            None => String::new(),
        };

        format!(
            "Given that the current carbon intensity in {} is {} gCO2/kWh{}, \
             provide 3 concise and actionable tips for a UK household to reduce their \
             electricity carbon footprint. Format the response as a simple list.",
            self.region_label, self.current_intensity, comparison
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum FetchPhase {
    #[default]
    Idle,
    Loading,
    Ready,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct FetchState {
    pub phase: FetchPhase,
    pub error: Option<String>,
}
