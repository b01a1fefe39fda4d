use async_trait::async_trait;
use reqwest::{
    Client, StatusCode,
    header::{ACCEPT, USER_AGENT},
};
use serde::{Deserialize, de::DeserializeOwned};
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::{
    Config, WeatherError,
    error::{MALFORMED_FORECAST, MALFORMED_RESPONSE},
    model::{
        Condition, Coordinates, CurrentConditions, DEFAULT_ICON, DEFAULT_VISIBILITY_M,
        ForecastSample, UNKNOWN,
    },
    provider::{validate_city, validate_coordinates},
};

use super::WeatherProvider;

pub const DEFAULT_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";
pub const DEFAULT_UV_TIMEOUT: Duration = Duration::from_millis(1500);

const CLIENT_USER_AGENT: &str = concat!("weather-dashboard/", env!("CARGO_PKG_VERSION"));

#[derive(Debug, Clone)]
pub struct OpenWeatherProvider {
    api_key: String,
    base_url: String,
    uv_timeout: Duration,
    http: Client,
}

impl OpenWeatherProvider {
    pub fn new(api_key: String) -> Self {
        Self::with_base_url(api_key, DEFAULT_BASE_URL)
    }

    /// Point the provider at another host, e.g. a local mock server.
    pub fn with_base_url(api_key: String, base_url: impl Into<String>) -> Self {
        Self {
            api_key,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            uv_timeout: DEFAULT_UV_TIMEOUT,
            http: Client::new(),
        }
    }

    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let api_key = config.api_key()?.to_owned();

        let http = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {e}"))?;

        Ok(Self {
            http,
            uv_timeout: Duration::from_millis(config.uv_timeout_ms),
            ..Self::with_base_url(api_key, config.base_url.as_str())
        })
    }

    /// Grace period for the best-effort UV index lookup.
    pub fn with_uv_timeout(mut self, timeout: Duration) -> Self {
        self.uv_timeout = timeout;
        self
    }

    async fn get(
        &self,
        endpoint: &str,
        query: &[(&str, String)],
    ) -> Result<(StatusCode, String), WeatherError> {
        let url = format!("{}/{endpoint}", self.base_url);

        let res = self
            .http
            .get(&url)
            .query(query)
            .query(&[("appid", self.api_key.as_str())])
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, CLIENT_USER_AGENT)
            .send()
            .await
            .map_err(|e| {
                // The URL carries the API key.
                let e = e.without_url();
                warn!(endpoint, error = %e, "OpenWeather request failed");
                WeatherError::Network
            })?;

        let status = res.status();
        let body = res.text().await.map_err(|e| {
            let e = e.without_url();
            warn!(endpoint, error = %e, "Failed to read OpenWeather response body");
            WeatherError::Network
        })?;

        debug!(endpoint, %status, body = %truncate_body(&body), "OpenWeather responded");

        Ok((status, body))
    }

    async fn fetch_uv_index(&self, coord: Coordinates) -> Option<f64> {
        match tokio::time::timeout(self.uv_timeout, self.request_uv_index(coord)).await {
            Ok(Ok(value)) => value,
            Ok(Err(e)) => {
                warn!(error = %e, "UV index lookup failed");
                None
            }
            Err(_) => {
                warn!(timeout_ms = self.uv_timeout.as_millis() as u64, "UV index lookup timed out");
                None
            }
        }
    }

    async fn request_uv_index(&self, coord: Coordinates) -> Result<Option<f64>, WeatherError> {
        let (status, body) = self
            .get("uvi", &[("lat", coord.lat.to_string()), ("lon", coord.lon.to_string())])
            .await?;

        if !status.is_success() {
            return Err(WeatherError::upstream_status(status.as_u16()));
        }

        let parsed: OwUvResponse = parse_body(&body, MALFORMED_RESPONSE)?;
        Ok(parsed.value)
    }
}

#[async_trait]
impl WeatherProvider for OpenWeatherProvider {
    async fn fetch_current(&self, city: &str) -> Result<CurrentConditions, WeatherError> {
        let city = validate_city(city)?;
        info!(city, "Fetching current conditions");

        let (status, body) = self
            .get("weather", &[("q", city.to_string()), ("units", "metric".to_string())])
            .await?;

        if !status.is_success() {
            let err = classify_failure(status, &body);
            warn!(city, %status, error = %err, "Current conditions request rejected");
            return Err(err);
        }

        let parsed: OwCurrentResponse = parse_body(&body, MALFORMED_RESPONSE)?;
        let resolved = parsed.coord.as_ref().and_then(OwCoord::resolved);
        let mut current = parsed.normalize();

        if let Some(coord) = resolved {
            current.uv_index = self.fetch_uv_index(coord).await;
        }

        info!(
            location = %current.location_name,
            lat = current.coordinates.lat,
            lon = current.coordinates.lon,
            "Current conditions received"
        );
        Ok(current)
    }

    async fn fetch_forecast(
        &self,
        lat: f64,
        lon: f64,
    ) -> Result<Vec<ForecastSample>, WeatherError> {
        let (lat, lon) = validate_coordinates(lat, lon)?;
        info!(lat, lon, "Fetching forecast");

        let (status, body) = self
            .get(
                "forecast",
                &[
                    ("lat", lat.to_string()),
                    ("lon", lon.to_string()),
                    ("units", "metric".to_string()),
                ],
            )
            .await?;

        if !status.is_success() {
            let err = classify_failure(status, &body);
            warn!(lat, lon, %status, error = %err, "Forecast request rejected");
            return Err(err);
        }

        let parsed: OwForecastResponse = parse_body(&body, MALFORMED_RESPONSE)?;
        let list = parsed.list.ok_or_else(|| {
            warn!("Forecast payload has no sample list");
            WeatherError::malformed(MALFORMED_FORECAST)
        })?;

        let samples: Vec<ForecastSample> =
            list.into_iter().flatten().map(OwForecastEntry::normalize).collect();

        debug!(count = samples.len(), "Forecast samples received");
        Ok(samples)
    }
}

/// Map a non-2xx upstream answer to an error category.
///
/// A JSON error object is classified by status alone. Other bodies (HTML
/// error pages, plain text from proxies) are first searched for known
/// phrases, then classified by status.
pub fn classify_failure(status: StatusCode, body: &str) -> WeatherError {
    let structured = serde_json::from_str::<serde_json::Map<String, serde_json::Value>>(body).is_ok();

    if !structured {
        if body.contains("Invalid API key") {
            return WeatherError::Auth;
        }
        if body.to_lowercase().contains("city not found") {
            return WeatherError::NotFound;
        }
    }

    match status {
        StatusCode::NOT_FOUND => WeatherError::NotFound,
        StatusCode::UNAUTHORIZED => WeatherError::Auth,
        StatusCode::TOO_MANY_REQUESTS => WeatherError::RateLimited,
        other => WeatherError::upstream_status(other.as_u16()),
    }
}

fn parse_body<T: DeserializeOwned>(body: &str, message: &str) -> Result<T, WeatherError> {
    serde_json::from_str(body).map_err(|e| {
        warn!(error = %e, body = %truncate_body(body), "Unparseable OpenWeather payload");
        WeatherError::malformed(message)
    })
}

fn non_empty(value: Option<String>, fallback: &str) -> String {
    value
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| fallback.to_string())
}

fn condition(weather: Option<Vec<OwWeather>>) -> Condition {
    let first = weather.and_then(|w| w.into_iter().next()).unwrap_or_default();

    Condition {
        main: non_empty(first.main, UNKNOWN),
        description: non_empty(first.description, UNKNOWN),
        icon: non_empty(first.icon, DEFAULT_ICON),
    }
}

#[derive(Debug, Default, Deserialize)]
struct OwMain {
    temp: Option<f64>,
    feels_like: Option<f64>,
    humidity: Option<u8>,
    pressure: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwWeather {
    main: Option<String>,
    description: Option<String>,
    icon: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct OwWind {
    speed: Option<f64>,
    deg: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
struct OwSys {
    country: Option<String>,
    sunrise: Option<i64>,
    sunset: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct OwCoord {
    lat: Option<f64>,
    lon: Option<f64>,
}

impl OwCoord {
    fn resolved(&self) -> Option<Coordinates> {
        Some(Coordinates { lat: self.lat?, lon: self.lon? })
    }
}

#[derive(Debug, Deserialize)]
struct OwCurrentResponse {
    name: Option<String>,
    coord: Option<OwCoord>,
    main: Option<OwMain>,
    weather: Option<Vec<OwWeather>>,
    wind: Option<OwWind>,
    sys: Option<OwSys>,
    visibility: Option<u32>,
    timezone: Option<i32>,
}

impl OwCurrentResponse {
    fn normalize(self) -> CurrentConditions {
        let main = self.main.unwrap_or_default();
        let wind = self.wind.unwrap_or_default();
        let sys = self.sys.unwrap_or_default();

        CurrentConditions {
            location_name: non_empty(self.name, UNKNOWN),
            country_code: non_empty(sys.country, UNKNOWN),
            temperature_c: main.temp.unwrap_or(0.0),
            feels_like_c: main.feels_like.unwrap_or(0.0),
            humidity_pct: main.humidity.unwrap_or(0),
            pressure_hpa: main.pressure.unwrap_or(0.0),
            visibility_m: self.visibility.unwrap_or(DEFAULT_VISIBILITY_M),
            wind_speed_mps: wind.speed.unwrap_or(0.0),
            wind_deg: wind.deg.unwrap_or(0.0),
            uv_index: None,
            condition: condition(self.weather),
            sunrise: sys.sunrise.unwrap_or(0),
            sunset: sys.sunset.unwrap_or(0),
            utc_offset_secs: self.timezone.unwrap_or(0),
            coordinates: self
                .coord
                .as_ref()
                .and_then(OwCoord::resolved)
                .unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwForecastEntry {
    dt: Option<i64>,
    main: Option<OwMain>,
    weather: Option<Vec<OwWeather>>,
    wind: Option<OwWind>,
    pop: Option<f64>,
}

impl OwForecastEntry {
    fn normalize(self) -> ForecastSample {
        let main = self.main.unwrap_or_default();
        let wind = self.wind.unwrap_or_default();

        ForecastSample {
            timestamp: self.dt,
            temperature_c: main.temp.unwrap_or(0.0),
            humidity_pct: main.humidity.unwrap_or(0),
            wind_speed_mps: wind.speed.unwrap_or(0.0),
            wind_deg: wind.deg.unwrap_or(0.0),
            pop: self.pop.unwrap_or(0.0).clamp(0.0, 1.0),
            condition: condition(self.weather),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OwForecastResponse {
    list: Option<Vec<Option<OwForecastEntry>>>,
}

#[derive(Debug, Deserialize)]
struct OwUvResponse {
    value: Option<f64>,
}

fn truncate_body(body: &str) -> String {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((idx, _)) => format!("{}...", &body[..idx]),
        None => body.to_string(),
    }
}
