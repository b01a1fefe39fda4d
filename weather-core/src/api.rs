//! HTTP read endpoints consumed by the dashboard front end.
//!
//! - `GET /weather/current?city=<name>` → current conditions
//! - `GET /weather/forecast?lat=<f64>&lon=<f64>` → up to 7 daily summaries
//!
//! Failures are returned as `{"error": "<message>"}` with a status derived
//! from the [`WeatherError`] category.

use std::{future::Future, net::SocketAddr, sync::Arc};

use anyhow::Context;
use axum::{
    Json, Router,
    extract::{Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use serde::{Deserialize, Serialize};
use tower_http::{
    cors::{Any, CorsLayer},
    trace::TraceLayer,
};
use tracing::info;

use crate::{
    WeatherError, forecast,
    model::{CurrentConditions, DailySummary},
    provider::{WeatherProvider, validate_city, validate_coordinates},
};

#[derive(Clone)]
struct ApiState {
    provider: Arc<dyn WeatherProvider>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}

struct ApiError(WeatherError);

impl From<WeatherError> for ApiError {
    fn from(err: WeatherError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.0.status_code())
            .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        (status, Json(ErrorBody { error: self.0.to_string() })).into_response()
    }
}

#[derive(Debug, Deserialize)]
struct CurrentQuery {
    city: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ForecastQuery {
    lat: Option<String>,
    lon: Option<String>,
}

pub fn router(provider: Arc<dyn WeatherProvider>) -> Router {
    Router::new()
        .route("/weather/current", get(get_current))
        .route("/weather/forecast", get(get_forecast))
        .with_state(ApiState { provider })
}

/// Bind `addr` and serve the API until `shutdown` resolves.
pub async fn serve<F>(
    addr: SocketAddr,
    provider: Arc<dyn WeatherProvider>,
    shutdown: F,
) -> anyhow::Result<()>
where
    F: Future<Output = ()> + Send + 'static,
{
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = router(provider)
        .layer(TraceLayer::new_for_http())
        .layer(cors);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!("Weather API running at http://{}", listener.local_addr()?);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await
        .context("Weather API server failed")?;

    info!("Weather API stopped");
    Ok(())
}

async fn get_current(
    State(state): State<ApiState>,
    Query(query): Query<CurrentQuery>,
) -> Result<Json<CurrentConditions>, ApiError> {
    let city = validate_city(query.city.as_deref().unwrap_or_default())?;
    let current = state.provider.fetch_current(city).await?;
    Ok(Json(current))
}

async fn get_forecast(
    State(state): State<ApiState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Json<Vec<DailySummary>>, ApiError> {
    let present = |v: Option<String>| v.filter(|s| !s.trim().is_empty());
    let (Some(lat), Some(lon)) = (present(query.lat), present(query.lon)) else {
        return Err(WeatherError::invalid_input(
            "Latitude and longitude parameters are required",
        )
        .into());
    };

    let (lat, lon) = validate_coordinates(
        parse_coordinate("latitude", &lat)?,
        parse_coordinate("longitude", &lon)?,
    )?;
    let samples = state.provider.fetch_forecast(lat, lon).await?;
    let days = forecast::summarize(&samples);

    info!(lat, lon, samples = samples.len(), days = days.len(), "Forecast summarized");
    Ok(Json(days))
}

fn parse_coordinate(name: &str, raw: &str) -> Result<f64, WeatherError> {
    raw.trim().parse::<f64>().map_err(|_| {
        WeatherError::invalid_input(format!("Invalid {name} '{raw}': expected a number"))
    })
}
