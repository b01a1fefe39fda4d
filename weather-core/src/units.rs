//! Temperature and clock formatting applied at render time.

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use std::{convert::TryFrom, fmt};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TemperatureUnit {
    #[default]
    Celsius,
    Fahrenheit,
}

impl TemperatureUnit {
    /// Convert a Celsius reading into this unit.
    pub fn convert(self, celsius: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => celsius,
            TemperatureUnit::Fahrenheit => celsius * 9.0 / 5.0 + 32.0,
        }
    }

    /// Inverse of [`TemperatureUnit::convert`].
    pub fn to_celsius(self, value: f64) -> f64 {
        match self {
            TemperatureUnit::Celsius => value,
            TemperatureUnit::Fahrenheit => (value - 32.0) * 5.0 / 9.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "°C",
            TemperatureUnit::Fahrenheit => "°F",
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TemperatureUnit::Celsius => "celsius",
            TemperatureUnit::Fahrenheit => "fahrenheit",
        }
    }
}

impl fmt::Display for TemperatureUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TemperatureUnit {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "c" | "celsius" | "metric" => Ok(TemperatureUnit::Celsius),
            "f" | "fahrenheit" | "imperial" => Ok(TemperatureUnit::Fahrenheit),
            _ => Err(anyhow::anyhow!(
                "Unknown temperature unit '{value}'. Supported units: celsius, fahrenheit."
            )),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum TimeFormat {
    #[default]
    #[serde(rename = "12h")]
    TwelveHour,
    #[serde(rename = "24h")]
    TwentyFourHour,
}

impl TimeFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TimeFormat::TwelveHour => "12h",
            TimeFormat::TwentyFourHour => "24h",
        }
    }

    /// Render a UTC epoch timestamp as wall-clock time at `utc_offset_secs`.
    pub fn format_time(self, timestamp: i64, utc_offset_secs: i32) -> String {
        let Some(local) = timestamp
            .checked_add(i64::from(utc_offset_secs))
            .and_then(|ts| DateTime::from_timestamp(ts, 0))
        else {
            return "--:--".to_string();
        };

        match self {
            TimeFormat::TwelveHour => local.format("%I:%M %p").to_string(),
            TimeFormat::TwentyFourHour => local.format("%H:%M").to_string(),
        }
    }
}

impl fmt::Display for TimeFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl TryFrom<&str> for TimeFormat {
    type Error = anyhow::Error;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        match value.trim().to_lowercase().as_str() {
            "12h" | "12" => Ok(TimeFormat::TwelveHour),
            "24h" | "24" => Ok(TimeFormat::TwentyFourHour),
            _ => Err(anyhow::anyhow!("Unknown time format '{value}'. Supported formats: 12h, 24h.")),
        }
    }
}

/// Display preferences.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Preferences {
    #[serde(default)]
    pub temperature_unit: TemperatureUnit,
    #[serde(default)]
    pub time_format: TimeFormat,
}

impl Preferences {
    pub fn format_temperature(&self, celsius: f64) -> String {
        format_temperature(celsius, self.temperature_unit)
    }

    pub fn format_time(&self, timestamp: i64, utc_offset_secs: i32) -> String {
        self.time_format.format_time(timestamp, utc_offset_secs)
    }
}

pub fn format_temperature(celsius: f64, unit: TemperatureUnit) -> String {
    let rounded = unit.convert(celsius).round();
    // -0.4 rounds to -0.0, which would print as "-0".
    let rounded = if rounded == 0.0 { 0.0 } else { rounded };
    format!("{rounded:.0}{}", unit.symbol())
}

/// 16-point compass label for a bearing in degrees.
pub fn compass_direction(deg: f64) -> &'static str {
    const POINTS: [&str; 16] = [
        "N", "NNE", "NE", "ENE", "E", "ESE", "SE", "SSE", "S", "SSW", "SW", "WSW", "W", "WNW",
        "NW", "NNW",
    ];
    let normalized = deg.rem_euclid(360.0);
    let idx = ((normalized / 22.5).round() as usize) % POINTS.len();
    POINTS[idx]
}
