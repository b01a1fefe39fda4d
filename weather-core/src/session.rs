//! Client-facing search orchestration.
//!
//! A [`SearchSession`] owns the one result set being displayed. Every update
//! replaces the whole [`SessionSnapshot`], so readers never observe a mix of
//! old and new data. A search that finishes after a newer one started is
//! discarded.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{
    fmt,
    sync::{Arc, Weak},
    time::Duration,
};
use tokio::{
    sync::watch,
    task::JoinHandle,
    time::{Instant, MissedTickBehavior},
};
use tracing::{debug, info, warn};

use crate::{
    WeatherError, forecast,
    model::{CurrentConditions, DailySummary},
    provider::{WeatherProvider, validate_city},
};

pub const DEFAULT_REFRESH_INTERVAL: Duration = Duration::from_secs(10 * 60);

/// Who started a search. Only user-initiated commits restart the refresh
/// schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Trigger {
    User,
    Timer,
}

/// Presentation tag derived from the current condition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WeatherTheme {
    Sunny,
    Cloudy,
    Rainy,
    Stormy,
    Snowy,
    Misty,
    #[default]
    Default,
}

impl WeatherTheme {
    /// Case-insensitive mapping from the provider's `main` condition.
    pub fn from_condition(main: &str) -> Self {
        match main.trim().to_lowercase().as_str() {
            "clear" => WeatherTheme::Sunny,
            "clouds" => WeatherTheme::Cloudy,
            "rain" | "drizzle" => WeatherTheme::Rainy,
            "thunderstorm" => WeatherTheme::Stormy,
            "snow" => WeatherTheme::Snowy,
            "mist" | "fog" | "haze" | "smoke" | "dust" | "sand" => WeatherTheme::Misty,
            _ => WeatherTheme::Default,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WeatherTheme::Sunny => "sunny",
            WeatherTheme::Cloudy => "cloudy",
            WeatherTheme::Rainy => "rainy",
            WeatherTheme::Stormy => "stormy",
            WeatherTheme::Snowy => "snowy",
            WeatherTheme::Misty => "misty",
            WeatherTheme::Default => "default",
        }
    }
}

impl fmt::Display for WeatherTheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one successful search.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResult {
    pub current: CurrentConditions,
    /// Empty when the forecast could not be fetched.
    pub forecast: Vec<DailySummary>,
    pub theme: WeatherTheme,
    /// Set when current conditions succeeded but the forecast did not.
    pub forecast_degraded: bool,
}

/// What the session is displaying right now.
#[derive(Debug, Clone, Default)]
pub struct SessionSnapshot {
    /// Last city a search was attempted for.
    pub city: Option<String>,
    pub result: Option<Arc<SearchResult>>,
    /// User-facing message of the last failed search.
    pub error: Option<String>,
    pub loading: bool,
    generation: u64,
}

impl SessionSnapshot {
    pub fn current(&self) -> Option<&CurrentConditions> {
        self.result.as_ref().map(|r| &r.current)
    }

    pub fn forecast(&self) -> &[DailySummary] {
        self.result.as_ref().map(|r| r.forecast.as_slice()).unwrap_or_default()
    }

    pub fn theme(&self) -> WeatherTheme {
        self.result.as_ref().map(|r| r.theme).unwrap_or_default()
    }
}

struct Inner {
    provider: Arc<dyn WeatherProvider>,
    refresh_interval: Duration,
    state: watch::Sender<SessionSnapshot>,
    refresher: Mutex<Option<JoinHandle<()>>>,
}

pub struct SearchSession {
    inner: Arc<Inner>,
}

impl fmt::Debug for SearchSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SearchSession")
            .field("provider", &self.inner.provider)
            .field("refresh_interval", &self.inner.refresh_interval)
            .field("snapshot", &*self.inner.state.borrow())
            .finish()
    }
}

impl SearchSession {
    pub fn new(provider: Arc<dyn WeatherProvider>) -> Self {
        Self::with_refresh_interval(provider, DEFAULT_REFRESH_INTERVAL)
    }

    pub fn with_refresh_interval(provider: Arc<dyn WeatherProvider>, interval: Duration) -> Self {
        let (state, _) = watch::channel(SessionSnapshot::default());

        Self {
            inner: Arc::new(Inner {
                provider,
                refresh_interval: interval,
                state,
                refresher: Mutex::new(None),
            }),
        }
    }

    /// Look up current conditions for `city`, then the forecast at the
    /// resolved coordinates.
    ///
    /// A blank city is rejected without touching the session. A failed lookup
    /// clears the displayed result. A forecast failure only empties the
    /// forecast.
    pub async fn search(&self, city: &str) -> Result<Arc<SearchResult>, WeatherError> {
        let city = validate_city(city)?.to_string();
        self.inner.run_search(city, Trigger::User).await
    }

    /// Repeat the last attempted search. `Ok(None)` if nothing was searched yet.
    pub async fn refresh(&self) -> Result<Option<Arc<SearchResult>>, WeatherError> {
        self.inner.refresh(Trigger::User).await
    }

    /// Drop the displayed result and stop auto-refresh. In-flight searches
    /// will be discarded when they finish.
    pub fn clear(&self) {
        self.inner.stop_refresher();
        self.inner.state.send_modify(|s| {
            *s = SessionSnapshot { generation: s.generation + 1, ..SessionSnapshot::default() };
        });
    }

    pub fn snapshot(&self) -> SessionSnapshot {
        self.inner.state.borrow().clone()
    }

    /// Receiver notified on every snapshot replacement.
    pub fn subscribe(&self) -> watch::Receiver<SessionSnapshot> {
        self.inner.state.subscribe()
    }

    pub fn current(&self) -> Option<CurrentConditions> {
        self.inner.state.borrow().current().cloned()
    }

    pub fn forecast(&self) -> Vec<DailySummary> {
        self.inner.state.borrow().forecast().to_vec()
    }

    pub fn theme(&self) -> WeatherTheme {
        self.inner.state.borrow().theme()
    }

    pub fn error(&self) -> Option<String> {
        self.inner.state.borrow().error.clone()
    }

    pub fn last_city(&self) -> Option<String> {
        self.inner.state.borrow().city.clone()
    }

    pub fn is_auto_refreshing(&self) -> bool {
        self.inner
            .refresher
            .lock()
            .as_ref()
            .is_some_and(|h| !h.is_finished())
    }

    pub fn stop_auto_refresh(&self) {
        self.inner.stop_refresher();
    }
}

impl Drop for SearchSession {
    fn drop(&mut self) {
        self.inner.stop_refresher();
    }
}

impl Inner {
    async fn refresh(
        self: &Arc<Self>,
        trigger: Trigger,
    ) -> Result<Option<Arc<SearchResult>>, WeatherError> {
        let city = self.state.borrow().city.clone();

        match city {
            Some(city) => {
                info!(city, "Refreshing weather");
                self.run_search(city, trigger).await.map(Some)
            }
            None => Ok(None),
        }
    }

    async fn run_search(
        self: &Arc<Self>,
        city: String,
        trigger: Trigger,
    ) -> Result<Arc<SearchResult>, WeatherError> {
        let mut ticket = 0;
        self.state.send_modify(|s| {
            s.generation += 1;
            ticket = s.generation;
            s.city = Some(city.clone());
            s.loading = true;
        });

        info!(city, "Searching weather");
        let outcome = self.fetch(&city).await.map(Arc::new);

        let committed = self.state.send_if_modified(|s| {
            if s.generation != ticket {
                return false;
            }
            *s = SessionSnapshot {
                city: Some(city.clone()),
                result: outcome.as_ref().ok().cloned(),
                error: outcome.as_ref().err().map(ToString::to_string),
                loading: false,
                generation: ticket,
            };
            true
        });

        if !committed {
            debug!(city, "Discarding superseded search result");
            return Err(WeatherError::Superseded { city });
        }

        match outcome {
            Ok(result) => {
                // The timer keeps its own schedule; a new result shown by the
                // user starts a full interval.
                if trigger == Trigger::User {
                    self.restart_refresher();
                }
                Ok(result)
            }
            Err(err) => {
                warn!(city, error = %err, "Weather search failed");
                self.stop_refresher();
                Err(err)
            }
        }
    }

    async fn fetch(&self, city: &str) -> Result<SearchResult, WeatherError> {
        let current = self.provider.fetch_current(city).await?;
        let coord = current.coordinates;

        let (forecast, forecast_degraded) =
            match self.provider.fetch_forecast(coord.lat, coord.lon).await {
                Ok(samples) => (forecast::summarize(&samples), false),
                Err(err) => {
                    warn!(city, error = %err, "Forecast unavailable, showing current conditions only");
                    (Vec::new(), true)
                }
            };

        let theme = WeatherTheme::from_condition(&current.condition.main);
        debug!(city, days = forecast.len(), %theme, "Search completed");

        Ok(SearchResult { current, forecast, theme, forecast_degraded })
    }

    fn restart_refresher(self: &Arc<Self>) {
        let period = self.refresh_interval;
        let next = tokio::spawn(auto_refresh(Arc::downgrade(self), period));

        if let Some(previous) = self.refresher.lock().replace(next) {
            previous.abort();
        }
        debug!(interval_secs = period.as_secs(), "Auto-refresh scheduled");
    }

    fn stop_refresher(&self) {
        if let Some(handle) = self.refresher.lock().take() {
            debug!("Stopping auto-refresh");
            handle.abort();
        }
    }
}

async fn auto_refresh(session: Weak<Inner>, period: Duration) {
    let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;

        let Some(inner) = session.upgrade() else {
            break;
        };
        if inner.state.borrow().result.is_none() {
            break;
        }

        debug!("Auto-refreshing weather");
        if let Err(err) = inner.refresh(Trigger::Timer).await {
            debug!(error = %err, "Auto-refresh did not produce a result");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Condition, Coordinates, ForecastSample};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Debug, Default)]
    struct ScriptedProvider {
        current: Mutex<HashMap<String, Result<CurrentConditions, WeatherError>>>,
        forecast: Mutex<Option<Result<Vec<ForecastSample>, WeatherError>>>,
        delays: Mutex<HashMap<String, Duration>>,
        current_calls: AtomicUsize,
        forecast_calls: Mutex<Vec<(f64, f64)>>,
    }

    impl ScriptedProvider {
        fn set_current(&self, city: &str, result: Result<CurrentConditions, WeatherError>) {
            self.current.lock().insert(city.to_string(), result);
        }

        fn set_forecast(&self, result: Result<Vec<ForecastSample>, WeatherError>) {
            *self.forecast.lock() = Some(result);
        }

        fn delay(&self, city: &str, by: Duration) {
            self.delays.lock().insert(city.to_string(), by);
        }

        fn current_calls(&self) -> usize {
            self.current_calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl WeatherProvider for ScriptedProvider {
        async fn fetch_current(&self, city: &str) -> Result<CurrentConditions, WeatherError> {
            self.current_calls.fetch_add(1, Ordering::SeqCst);
            let delay = self.delays.lock().get(city).copied();
            if let Some(delay) = delay {
                tokio::time::sleep(delay).await;
            }
            self.current
                .lock()
                .get(city)
                .cloned()
                .unwrap_or(Err(WeatherError::NotFound))
        }

        async fn fetch_forecast(
            &self,
            lat: f64,
            lon: f64,
        ) -> Result<Vec<ForecastSample>, WeatherError> {
            self.forecast_calls.lock().push((lat, lon));
            self.forecast.lock().clone().unwrap_or(Ok(Vec::new()))
        }
    }

    fn conditions(name: &str, main: &str, lat: f64, lon: f64) -> CurrentConditions {
        CurrentConditions {
            location_name: name.to_string(),
            country_code: "GB".to_string(),
            temperature_c: 12.0,
            feels_like_c: 11.0,
            humidity_pct: 80,
            pressure_hpa: 1010.0,
            visibility_m: 10_000,
            wind_speed_mps: 4.0,
            wind_deg: 220.0,
            uv_index: None,
            condition: Condition { main: main.to_string(), ..Condition::default() },
            sunrise: 0,
            sunset: 0,
            utc_offset_secs: 0,
            coordinates: Coordinates { lat, lon },
        }
    }

    fn sample_at(day: u32, hour: u32, temp: f64) -> ForecastSample {
        let ts = NaiveDate::from_ymd_opt(2024, 4, day)
            .and_then(|d| d.and_hms_opt(hour, 0, 0))
            .map(|dt| dt.and_utc().timestamp());
        ForecastSample {
            timestamp: ts,
            temperature_c: temp,
            humidity_pct: 60,
            wind_speed_mps: 3.0,
            wind_deg: 180.0,
            pop: 0.1,
            condition: Condition::default(),
        }
    }

    fn setup() -> (Arc<ScriptedProvider>, SearchSession) {
        let provider = Arc::new(ScriptedProvider::default());
        provider.set_current("London", Ok(conditions("London", "Rain", 51.51, -0.13)));
        let session = SearchSession::new(provider.clone());
        (provider, session)
    }

    #[test]
    fn theme_mapping_is_case_insensitive() {
        let cases = [
            ("Clear", WeatherTheme::Sunny),
            ("CLOUDS", WeatherTheme::Cloudy),
            ("rain", WeatherTheme::Rainy),
            ("Drizzle", WeatherTheme::Rainy),
            ("Thunderstorm", WeatherTheme::Stormy),
            ("Snow", WeatherTheme::Snowy),
            ("Mist", WeatherTheme::Misty),
            ("fog", WeatherTheme::Misty),
            ("Haze", WeatherTheme::Misty),
            ("Smoke", WeatherTheme::Misty),
            ("Dust", WeatherTheme::Misty),
            ("Sand", WeatherTheme::Misty),
            ("Tornado", WeatherTheme::Default),
            ("", WeatherTheme::Default),
        ];
        for (main, expected) in cases {
            assert_eq!(WeatherTheme::from_condition(main), expected, "{main}");
        }
        assert_eq!(WeatherTheme::Misty.to_string(), "misty");
    }

    #[tokio::test]
    async fn search_uses_resolved_coordinates_for_forecast() {
        let (provider, session) = setup();
        provider.set_forecast(Ok(vec![
            sample_at(1, 12, 14.0),
            sample_at(1, 15, 15.0),
            sample_at(1, 21, 10.0),
            sample_at(2, 0, 8.0),
            sample_at(2, 3, 7.0),
        ]));

        let result = session.search("London").await.unwrap();

        assert_eq!(result.current.location_name, "London");
        assert_eq!(*provider.forecast_calls.lock(), vec![(51.51, -0.13)]);
        assert_eq!(result.forecast.len(), 2);
        assert!(result.forecast[0].timestamp < result.forecast[1].timestamp);
        assert_eq!(result.theme, WeatherTheme::Rainy);
        assert!(!result.forecast_degraded);

        let snap = session.snapshot();
        assert_eq!(snap.current().map(|c| c.location_name.as_str()), Some("London"));
        assert_eq!(snap.forecast().len(), 2);
        assert_eq!(snap.theme(), WeatherTheme::Rainy);
        assert!(snap.error.is_none());
        assert!(!snap.loading);
        assert!(session.is_auto_refreshing());
    }

    #[tokio::test]
    async fn forecast_failure_degrades_to_empty_forecast() {
        let (provider, session) = setup();
        provider.set_forecast(Err(WeatherError::upstream_status(500)));

        let result = session.search("London").await.unwrap();

        assert!(result.forecast.is_empty());
        assert!(result.forecast_degraded);
        assert_eq!(session.current().unwrap().location_name, "London");
        assert!(session.error().is_none());
    }

    #[tokio::test]
    async fn failed_search_clears_previous_result() {
        let (_provider, session) = setup();
        session.search("London").await.unwrap();
        assert!(session.is_auto_refreshing());

        let err = session.search("Nowherelandia").await.unwrap_err();

        assert_eq!(err, WeatherError::NotFound);
        assert!(session.current().is_none());
        assert!(session.forecast().is_empty());
        assert_eq!(session.theme(), WeatherTheme::Default);
        assert_eq!(
            session.error().as_deref(),
            Some("City not found. Please check the spelling and try again.")
        );
        assert_eq!(session.last_city().as_deref(), Some("Nowherelandia"));
        assert!(!session.is_auto_refreshing());
    }

    #[tokio::test]
    async fn blank_city_is_rejected_without_side_effects() {
        let (provider, session) = setup();
        session.search("London").await.unwrap();

        let err = session.search("   ").await.unwrap_err();

        assert!(matches!(err, WeatherError::InvalidInput(_)));
        assert_eq!(provider.current_calls(), 1);
        assert_eq!(session.last_city().as_deref(), Some("London"));
        assert!(session.current().is_some());
    }

    #[tokio::test]
    async fn refresh_without_prior_search_is_a_noop() {
        let (provider, session) = setup();

        assert_eq!(session.refresh().await.unwrap(), None);
        assert_eq!(provider.current_calls(), 0);
    }

    #[tokio::test]
    async fn refresh_repeats_last_attempted_city() {
        let (provider, session) = setup();
        session.search("Nowherelandia").await.unwrap_err();

        provider.set_current("Nowherelandia", Ok(conditions("Nowherelandia", "Snow", 1.0, 2.0)));
        let refreshed = session.refresh().await.unwrap().unwrap();

        assert_eq!(refreshed.current.location_name, "Nowherelandia");
        assert_eq!(refreshed.theme, WeatherTheme::Snowy);
        assert_eq!(provider.current_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn newer_search_supersedes_slower_one() {
        let (provider, session) = setup();
        provider.set_current("Slowtown", Ok(conditions("Slowtown", "Clear", 3.0, 4.0)));
        provider.delay("Slowtown", Duration::from_secs(5));

        let (slow, fast) = tokio::join!(session.search("Slowtown"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            session.search("London").await
        });

        assert_eq!(fast.unwrap().current.location_name, "London");
        assert_eq!(slow.unwrap_err(), WeatherError::Superseded { city: "Slowtown".into() });
        assert_eq!(session.current().unwrap().location_name, "London");
        assert_eq!(session.last_city().as_deref(), Some("London"));
    }

    #[tokio::test(start_paused = true)]
    async fn superseded_failure_does_not_clear_newer_result() {
        let (provider, session) = setup();
        provider.delay("Nowherelandia", Duration::from_secs(5));

        let (slow, fast) = tokio::join!(session.search("Nowherelandia"), async {
            tokio::time::sleep(Duration::from_secs(1)).await;
            session.search("London").await
        });

        assert!(fast.is_ok());
        assert!(matches!(slow, Err(WeatherError::Superseded { .. })));
        assert!(session.current().is_some());
        assert!(session.error().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn auto_refresh_repeats_search_on_interval() {
        let (provider, session) = setup();
        session.search("London").await.unwrap();
        assert_eq!(provider.current_calls(), 1);

        tokio::time::sleep(DEFAULT_REFRESH_INTERVAL + Duration::from_secs(1)).await;
        assert_eq!(provider.current_calls(), 2);

        tokio::time::sleep(DEFAULT_REFRESH_INTERVAL).await;
        assert_eq!(provider.current_calls(), 3);
        assert!(session.is_auto_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn new_search_restarts_refresh_interval() {
        let (provider, session) = setup();
        provider.set_current("Paris", Ok(conditions("Paris", "Clear", 48.85, 2.35)));

        session.search("London").await.unwrap();
        tokio::time::sleep(Duration::from_secs(540)).await;
        session.search("Paris").await.unwrap();
        assert_eq!(provider.current_calls(), 2);

        // London's schedule would have fired at +600s.
        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(provider.current_calls(), 2);

        // Paris gets a full interval after it was displayed.
        tokio::time::sleep(Duration::from_secs(481)).await;
        assert_eq!(provider.current_calls(), 3);
        assert_eq!(session.last_city().as_deref(), Some("Paris"));
        assert!(session.is_auto_refreshing());
    }

    #[tokio::test(start_paused = true)]
    async fn manual_refresh_restarts_refresh_interval() {
        let (provider, session) = setup();
        session.search("London").await.unwrap();

        tokio::time::sleep(Duration::from_secs(300)).await;
        session.refresh().await.unwrap();
        assert_eq!(provider.current_calls(), 2);

        tokio::time::sleep(Duration::from_secs(301)).await;
        assert_eq!(provider.current_calls(), 2);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(provider.current_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn auto_refresh_stops_once_nothing_is_displayed() {
        let (provider, session) = setup();
        session.search("London").await.unwrap();

        provider.set_current("London", Err(WeatherError::Network));
        tokio::time::sleep(DEFAULT_REFRESH_INTERVAL + Duration::from_secs(1)).await;

        assert_eq!(provider.current_calls(), 2);
        assert!(session.current().is_none());
        assert!(!session.is_auto_refreshing());

        tokio::time::sleep(DEFAULT_REFRESH_INTERVAL * 3).await;
        assert_eq!(provider.current_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn clear_cancels_auto_refresh() {
        let (provider, session) = setup();
        session.search("London").await.unwrap();

        session.clear();

        assert!(!session.is_auto_refreshing());
        assert!(session.snapshot().result.is_none());
        tokio::time::sleep(DEFAULT_REFRESH_INTERVAL * 2).await;
        assert_eq!(provider.current_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn dropping_session_cancels_auto_refresh() {
        let (provider, session) = setup();
        session.search("London").await.unwrap();

        drop(session);

        tokio::time::sleep(DEFAULT_REFRESH_INTERVAL * 2).await;
        assert_eq!(provider.current_calls(), 1);
    }

    #[tokio::test]
    async fn subscribers_see_whole_snapshots() {
        let (_provider, session) = setup();
        let mut rx = session.subscribe();

        session.search("London").await.unwrap();

        assert!(rx.has_changed().unwrap());
        let snap = rx.borrow_and_update().clone();
        assert_eq!(snap.city.as_deref(), Some("London"));
        assert!(snap.result.is_some());
        assert!(!snap.loading);
    }
}
