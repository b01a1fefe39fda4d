use crate::{
    Config, WeatherError,
    model::{CurrentConditions, ForecastSample},
    provider::openweather::OpenWeatherProvider,
};
use async_trait::async_trait;
use std::{fmt::Debug, sync::Arc};

pub mod openweather;

/// Upstream weather source.
///
/// Implementations return normalized data only; every upstream failure is
/// mapped to a [`WeatherError`] before it leaves the provider.
#[async_trait]
pub trait WeatherProvider: Send + Sync + Debug {
    /// Current conditions for a city name.
    async fn fetch_current(&self, city: &str) -> Result<CurrentConditions, WeatherError>;

    /// Raw 3-hour forecast samples for a coordinate, in upstream order.
    async fn fetch_forecast(&self, lat: f64, lon: f64)
    -> Result<Vec<ForecastSample>, WeatherError>;
}

/// Trimmed city name, or `InvalidInput` when nothing is left.
pub fn validate_city(city: &str) -> Result<&str, WeatherError> {
    let trimmed = city.trim();
    if trimmed.is_empty() {
        return Err(WeatherError::invalid_input("City parameter is required"));
    }
    Ok(trimmed)
}

pub fn validate_coordinates(lat: f64, lon: f64) -> Result<(f64, f64), WeatherError> {
    if !lat.is_finite() || !(-90.0..=90.0).contains(&lat) {
        return Err(WeatherError::invalid_input(format!(
            "Latitude must be a number between -90 and 90, got {lat}"
        )));
    }
    if !lon.is_finite() || !(-180.0..=180.0).contains(&lon) {
        return Err(WeatherError::invalid_input(format!(
            "Longitude must be a number between -180 and 180, got {lon}"
        )));
    }
    Ok((lat, lon))
}

/// Construct the OpenWeather provider from config.
pub fn provider_from_config(config: &Config) -> anyhow::Result<Arc<dyn WeatherProvider>> {
    let provider = OpenWeatherProvider::from_config(config)?;
    Ok(Arc::new(provider))
}
