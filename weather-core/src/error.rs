//! User-facing failure categories for weather lookups.

use thiserror::Error;

pub const MALFORMED_RESPONSE: &str = "Invalid response from weather service. Please try again.";
pub const MALFORMED_FORECAST: &str = "Invalid forecast data received. Please try again.";

/// Every failure that crosses the client boundary is reduced to one of these.
///
/// Display strings are stable and safe to show to end users; raw upstream
/// bodies never end up in them.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeatherError {
    /// Missing or empty required parameter. Raised before any upstream call.
    #[error("{0}")]
    InvalidInput(String),

    #[error("City not found. Please check the spelling and try again.")]
    NotFound,

    #[error("Invalid API key. Please check your OpenWeatherMap API key.")]
    Auth,

    #[error("API rate limit exceeded. Please try again later.")]
    RateLimited,

    /// Unexpected status or a body that could not be understood.
    #[error("{message}")]
    Upstream { status: Option<u16>, message: String },

    /// Transport-level failure (DNS, connect, timeout, truncated body).
    #[error("Network error. Please check your internet connection.")]
    Network,

    /// A newer search started while this one was in flight.
    #[error("Search for '{city}' was superseded by a newer search.")]
    Superseded { city: String },
}

impl WeatherError {
    pub fn invalid_input<S: Into<String>>(message: S) -> Self {
        Self::InvalidInput(message.into())
    }

    /// Generic failure for an unexpected upstream status code.
    pub fn upstream_status(status: u16) -> Self {
        Self::Upstream {
            status: Some(status),
            message: format!("Weather service error ({status}). Please try again."),
        }
    }

    /// The upstream answered 2xx but the payload was unusable.
    pub fn malformed(message: &str) -> Self {
        Self::Upstream { status: None, message: message.to_string() }
    }

    /// HTTP status used when this error is served by the API layer.
    pub fn status_code(&self) -> u16 {
        match self {
            WeatherError::InvalidInput(_) => 400,
            WeatherError::NotFound => 404,
            WeatherError::Auth => 401,
            WeatherError::RateLimited => 429,
            WeatherError::Upstream { .. } => 502,
            WeatherError::Network => 503,
            WeatherError::Superseded { .. } => 409,
        }
    }
}
