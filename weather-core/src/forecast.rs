//! Collapses the provider's 3-hour forecast feed into per-day summaries.

use chrono::{DateTime, NaiveDate};

use crate::model::{DailySummary, DailyTemperatures, ForecastSample};

/// Upper bound on the number of summaries produced.
pub const MAX_FORECAST_DAYS: usize = 7;

/// Group `samples` by UTC calendar date and summarize each date.
///
/// Dates keep the order in which they are first seen. Samples without a
/// timestamp are dropped, and so is every sample whose date would be the
/// eighth (or later) distinct date. The input order matters: it decides both
/// the date order and the tie-breaks when two samples are equally close to
/// noon or midnight.
pub fn summarize(samples: &[ForecastSample]) -> Vec<DailySummary> {
    let mut days: Vec<(NaiveDate, Vec<(i64, &ForecastSample)>)> = Vec::new();

    for sample in samples {
        let Some(ts) = sample.timestamp else {
            continue;
        };
        let Some(date) = calendar_date(ts) else {
            continue;
        };

        match days.iter().position(|(d, _)| *d == date) {
            Some(i) => days[i].1.push((ts, sample)),
            None if days.len() < MAX_FORECAST_DAYS => days.push((date, vec![(ts, sample)])),
            None => {}
        }
    }

    days.iter()
        .filter_map(|(date, group)| summarize_day(*date, group))
        .collect()
}

fn calendar_date(ts: i64) -> Option<NaiveDate> {
    DateTime::from_timestamp(ts, 0).map(|dt| dt.date_naive())
}

fn summarize_day(date: NaiveDate, group: &[(i64, &ForecastSample)]) -> Option<DailySummary> {
    let &(first_ts, _) = group.first()?;

    let noon = date.and_hms_opt(12, 0, 0)?.and_utc().timestamp();
    let next_midnight = date.succ_opt()?.and_hms_opt(0, 0, 0)?.and_utc().timestamp();

    let day = nearest(group, noon)?;
    let night = nearest(group, next_midnight)?;
    let (min, max) = temperature_range(group.iter().map(|(_, s)| s.temperature_c));

    Some(DailySummary {
        timestamp: first_ts,
        temp: DailyTemperatures {
            min,
            max,
            day: day.temperature_c,
            night: night.temperature_c,
        },
        condition: day.condition.clone(),
        humidity_pct: day.humidity_pct,
        wind_speed_mps: day.wind_speed_mps,
        wind_deg: day.wind_deg,
        pop: day.pop,
        uv_index: 0.0,
    })
}

/// Sample closest to `target`; on a tie the earlier-seen sample wins.
fn nearest<'a>(group: &[(i64, &'a ForecastSample)], target: i64) -> Option<&'a ForecastSample> {
    group
        .iter()
        .min_by_key(|(ts, _)| ts.abs_diff(target))
        .map(|&(_, sample)| sample)
}

/// Min/max over readings, skipping exact zeros (upstream reports a missing
/// temperature as 0). All-zero input yields `(0.0, 0.0)`.
fn temperature_range(temps: impl Iterator<Item = f64>) -> (f64, f64) {
    temps
        .filter(|t| *t != 0.0)
        .fold(None, |acc: Option<(f64, f64)>, t| match acc {
            Some((min, max)) => Some((min.min(t), max.max(t))),
            None => Some((t, t)),
        })
        .unwrap_or((0.0, 0.0))
}
