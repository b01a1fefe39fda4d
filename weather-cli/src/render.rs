use chrono::DateTime;
use weather_core::{
    CurrentConditions, DailySummary, Preferences, SearchResult, units::compass_direction,
};

pub fn search_result(result: &SearchResult, prefs: &Preferences) -> String {
    let mut out = current(&result.current, prefs);
    out.push('\n');

    if result.forecast.is_empty() {
        out.push_str("Forecast unavailable.\n");
    } else {
        out.push_str(&forecast(&result.forecast, prefs));
    }
    out
}

pub fn current(c: &CurrentConditions, prefs: &Preferences) -> String {
    let offset = c.utc_offset_secs;

    let mut out = format!("{}, {}\n", c.location_name, c.country_code);
    out.push_str(&format!(
        "  {} ({}), feels like {}\n",
        prefs.format_temperature(c.temperature_c),
        c.condition.description,
        prefs.format_temperature(c.feels_like_c),
    ));
    out.push_str(&format!(
        "  Humidity {}%  Pressure {:.0} hPa  Visibility {:.1} km\n",
        c.humidity_pct,
        c.pressure_hpa,
        f64::from(c.visibility_m) / 1000.0,
    ));
    out.push_str(&format!(
        "  Wind {:.1} m/s {}\n",
        c.wind_speed_mps,
        compass_direction(c.wind_deg)
    ));
    if let Some(uv) = c.uv_index {
        out.push_str(&format!("  UV index {uv:.1}\n"));
    }
    out.push_str(&format!(
        "  Sunrise {}  Sunset {}\n",
        prefs.format_time(c.sunrise, offset),
        prefs.format_time(c.sunset, offset),
    ));
    out
}

pub fn forecast(days: &[DailySummary], prefs: &Preferences) -> String {
    let lines = days.iter().map(|day| {
        let label = DateTime::from_timestamp(day.timestamp, 0)
            .map(|dt| dt.format("%a %d %b").to_string())
            .unwrap_or_else(|| "?".to_string());

        format!(
            "  {label}  {:>5} / {:<5}  day {:>5}  night {:>5}  {:>3.0}% rain  {}\n",
            prefs.format_temperature(day.temp.max),
            prefs.format_temperature(day.temp.min),
            prefs.format_temperature(day.temp.day),
            prefs.format_temperature(day.temp.night),
            day.pop * 100.0,
            day.condition.description,
        )
    });

    std::iter::once("Forecast:\n".to_string()).chain(lines).collect()
}
