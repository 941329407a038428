use thiserror::Error;

/// Everything that can go wrong during a fetch cycle or a tip request.
///
/// The `Display` output is the message shown to the user.
#[derive(Debug, Clone, Error)]
pub enum DashboardError {
    /// A required credential is missing or still set to its placeholder.
    #[error("{0}")]
    Configuration(String),

    /// The postcode was empty or rejected by the lookup service.
    #[error("{0}")]
    InvalidLocation(String),

    /// The postcode is valid but has no carbon-intensity region (e.g. outside mainland GB).
    #[error("{0}")]
    RegionNotFound(String),

    /// A dependency answered with a non-success status or could not be reached.
    #[error("{service} error: {message}")]
    Upstream {
        service: &'static str,
        message: String,
    },

    /// A dependency answered 2xx but the payload did not have the expected shape.
    #[error("{service} returned an unexpected response: {detail}")]
    MalformedResponse {
        service: &'static str,
        detail: String,
    },

    #[error("No carbon intensity data available to generate tips. Please fetch data first.")]
    EmptySeries,

    #[error("Carbon saving tips are already being generated.")]
    TipsInFlight,
}

pub type DashboardResult<T> = Result<T, DashboardError>;

impl DashboardError {
    pub fn upstream(service: &'static str, message: impl Into<String>) -> Self {
        Self::Upstream {
            service,
            message: message.into(),
        }
    }

    pub fn malformed(service: &'static str, detail: impl Into<String>) -> Self {
        Self::MalformedResponse {
            service,
            detail: detail.into(),
        }
    }

    /// Whether the user can fix this by changing their input.
    pub fn is_user_correctable(&self) -> bool {
        matches!(self, Self::InvalidLocation(_) | Self::RegionNotFound(_))
    }
}
