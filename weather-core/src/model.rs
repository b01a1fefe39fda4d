use serde::{Deserialize, Serialize};

pub const UNKNOWN: &str = "Unknown";
pub const DEFAULT_ICON: &str = "01d";
pub const DEFAULT_VISIBILITY_M: u32 = 10_000;

/// Condition summary as reported by the provider (e.g. "Rain", "light rain", "10d").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    pub main: String,
    pub description: String,
    pub icon: String,
}

impl Default for Condition {
    fn default() -> Self {
        Self {
            main: UNKNOWN.to_string(),
            description: UNKNOWN.to_string(),
            icon: DEFAULT_ICON.to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Coordinates {
    pub lat: f64,
    pub lon: f64,
}

/// Normalized current conditions for a city.
///
/// Serialized field names follow the JSON shape served by the HTTP API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CurrentConditions {
    #[serde(rename = "name")]
    pub location_name: String,
    #[serde(rename = "country")]
    pub country_code: String,
    #[serde(rename = "temp")]
    pub temperature_c: f64,
    #[serde(rename = "feels_like")]
    pub feels_like_c: f64,
    #[serde(rename = "humidity")]
    pub humidity_pct: u8,
    #[serde(rename = "pressure")]
    pub pressure_hpa: f64,
    #[serde(rename = "visibility")]
    pub visibility_m: u32,
    #[serde(rename = "wind_speed")]
    pub wind_speed_mps: f64,
    #[serde(rename = "wind_deg")]
    pub wind_deg: f64,
    pub uv_index: Option<f64>,
    #[serde(rename = "weather")]
    pub condition: Condition,
    pub sunrise: i64,
    pub sunset: i64,
    /// Shift from UTC in seconds.
    #[serde(rename = "timezone")]
    pub utc_offset_secs: i32,
    #[serde(rename = "coord")]
    pub coordinates: Coordinates,
}

/// One 3-hour tick of the upstream forecast feed.
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastSample {
    /// Epoch seconds. `None` when upstream omitted it; such samples are dropped
    /// by the aggregator.
    pub timestamp: Option<i64>,
    pub temperature_c: f64,
    pub humidity_pct: u8,
    pub wind_speed_mps: f64,
    pub wind_deg: f64,
    /// Probability of precipitation in [0, 1].
    pub pop: f64,
    pub condition: Condition,
}

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct DailyTemperatures {
    pub min: f64,
    pub max: f64,
    pub day: f64,
    pub night: f64,
}

/// Aggregated forecast for one calendar date.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    /// Timestamp of the first sample seen for this date.
    #[serde(rename = "dt")]
    pub timestamp: i64,
    pub temp: DailyTemperatures,
    #[serde(rename = "weather")]
    pub condition: Condition,
    #[serde(rename = "humidity")]
    pub humidity_pct: u8,
    #[serde(rename = "wind_speed")]
    pub wind_speed_mps: f64,
    pub wind_deg: f64,
    pub pop: f64,
    /// The 3-hour feed carries no UV data.
    #[serde(rename = "uvi")]
    pub uv_index: f64,
}
