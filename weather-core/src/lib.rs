//! Core library for the weather dashboard.
//!
//! This crate defines:
//! - Shared domain models (current conditions, forecast samples, daily summaries)
//! - The OpenWeather client and the provider abstraction over it
//! - Forecast aggregation from 3-hour samples into daily summaries
//! - A search session with last-search-wins semantics and auto-refresh
//! - Unit conversion and time formatting for display
//! - Configuration & credentials handling
//! - The HTTP read API served to the front end
//!
//! It is used by `weather-cli`, but can also be reused by other binaries or services.

pub mod api;
pub mod config;
pub mod error;
pub mod forecast;
pub mod model;
pub mod provider;
pub mod session;
pub mod units;

pub use config::Config;
pub use error::WeatherError;
pub use forecast::summarize;
pub use model::{Condition, Coordinates, CurrentConditions, DailySummary, ForecastSample};
pub use provider::{WeatherProvider, openweather::OpenWeatherProvider, provider_from_config};
pub use session::{SearchResult, SearchSession, SessionSnapshot, WeatherTheme};
pub use units::{Preferences, TemperatureUnit, TimeFormat};
