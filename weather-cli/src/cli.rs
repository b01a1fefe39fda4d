use std::{future::Future, net::SocketAddr, sync::Arc, time::Duration};

use anyhow::{Context, anyhow};
use clap::{Args, Parser, Subcommand};
use inquire::{Password, PasswordDisplayMode, Select};
use tokio::sync::watch;
use weather_core::{
    Config, Preferences, SearchSession, SessionSnapshot, TemperatureUnit, TimeFormat,
    WeatherProvider, api, provider_from_config,
};

use crate::render;

/// Top-level CLI struct.
#[derive(Debug, Parser)]
#[command(name = "weather", version, about = "Weather dashboard: current conditions and daily forecast")]
pub struct Cli {
    /// Log at debug level (overridden by RUST_LOG).
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Configure the OpenWeatherMap API key and display preferences.
    Configure,

    /// Show current conditions and the daily forecast for a city.
    Show {
        /// City name, e.g. "London" or "Paris,FR".
        city: String,

        #[command(flatten)]
        display: DisplayArgs,
    },

    /// Like `show`, then re-print on every auto-refresh until Ctrl-C.
    Watch {
        city: String,

        #[command(flatten)]
        display: DisplayArgs,
    },

    /// Serve the HTTP API (`/weather/current`, `/weather/forecast`).
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        #[arg(short, long, default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Debug, Args)]
pub struct DisplayArgs {
    /// Temperature unit: celsius or fahrenheit. Defaults to the configured one.
    #[arg(long)]
    units: Option<String>,

    /// Clock style: 12h or 24h. Defaults to the configured one.
    #[arg(long)]
    time_format: Option<String>,
}

impl DisplayArgs {
    fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(units) = &self.units {
            config.preferences.temperature_unit = TemperatureUnit::try_from(units.as_str())?;
        }
        if let Some(fmt) = &self.time_format {
            config.preferences.time_format = TimeFormat::try_from(fmt.as_str())?;
        }
        Ok(())
    }
}

impl Cli {
    pub async fn run(self) -> anyhow::Result<()> {
        let mut config = Config::load()?;

        match self.command {
            Command::Configure => configure(config),
            Command::Show { city, display } => {
                display.apply(&mut config)?;
                show(&config, &city).await
            }
            Command::Watch { city, display } => {
                display.apply(&mut config)?;
                watch(&config, &city).await
            }
            Command::Serve { host, port } => {
                let addr: SocketAddr = format!("{host}:{port}")
                    .parse()
                    .with_context(|| format!("Invalid listen address {host}:{port}"))?;
                let provider = provider_from_config(&config)?;
                api::serve(addr, provider, shutdown_signal()).await
            }
        }
    }
}

fn configure(mut config: Config) -> anyhow::Result<()> {
    let api_key = Password::new("OpenWeatherMap API key:")
        .with_display_mode(PasswordDisplayMode::Masked)
        .without_confirmation()
        .prompt()
        .context("Failed to read API key")?;

    let api_key = api_key.trim().to_string();
    if api_key.is_empty() {
        return Err(anyhow!("API key must not be empty"));
    }
    config.set_api_key(api_key);

    let units = vec![TemperatureUnit::Celsius, TemperatureUnit::Fahrenheit];
    let start = units
        .iter()
        .position(|u| *u == config.preferences.temperature_unit)
        .unwrap_or(0);
    config.preferences.temperature_unit = Select::new("Temperature unit:", units)
        .with_starting_cursor(start)
        .prompt()
        .context("Failed to read temperature unit")?;

    let formats = vec![TimeFormat::TwelveHour, TimeFormat::TwentyFourHour];
    let start = formats
        .iter()
        .position(|f| *f == config.preferences.time_format)
        .unwrap_or(0);
    config.preferences.time_format = Select::new("Time format:", formats)
        .with_starting_cursor(start)
        .prompt()
        .context("Failed to read time format")?;

    let path = config.save()?;
    println!("Configuration saved to {}", path.display());
    Ok(())
}

fn session_for(config: &Config) -> anyhow::Result<SearchSession> {
    let provider: Arc<dyn WeatherProvider> = provider_from_config(config)?;
    let interval = Duration::from_secs(config.refresh_interval_secs.max(1));
    Ok(SearchSession::with_refresh_interval(provider, interval))
}

async fn show(config: &Config, city: &str) -> anyhow::Result<()> {
    let session = session_for(config)?;
    let result = session.search(city).await?;

    print!("{}", render::search_result(&result, &config.preferences));
    Ok(())
}

async fn watch(config: &Config, city: &str) -> anyhow::Result<()> {
    let session = session_for(config)?;
    let mut updates = session.subscribe();

    let result = session.search(city).await?;
    updates.borrow_and_update();
    print!("{}", render::search_result(&result, &config.preferences));
    println!(
        "\nRefreshing every {}s. Press Ctrl-C to stop.",
        config.refresh_interval_secs.max(1)
    );

    let outcome = follow(&mut updates, &config.preferences, shutdown_signal(), |text| {
        println!();
        print!("{text}");
    })
    .await;

    session.stop_auto_refresh();
    outcome
}

/// Hand each refreshed result to `emit` until `shutdown` resolves, the
/// session is cleared, or a refresh fails.
async fn follow<F>(
    updates: &mut watch::Receiver<SessionSnapshot>,
    prefs: &Preferences,
    shutdown: F,
    mut emit: impl FnMut(String),
) -> anyhow::Result<()>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            changed = updates.changed() => {
                if changed.is_err() {
                    return Ok(());
                }
                let snapshot = updates.borrow_and_update().clone();
                if snapshot.loading {
                    continue;
                }
                match (&snapshot.result, &snapshot.error) {
                    (Some(result), _) => emit(render::search_result(result, prefs)),
                    (None, Some(error)) => return Err(anyhow!("{error}")),
                    (None, None) => return Ok(()),
                }
            }
            _ = &mut shutdown => return Ok(()),
        }
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "Failed to listen for Ctrl-C");
        std::future::pending::<()>().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::oneshot;

    #[tokio::test]
    async fn follow_stops_on_shutdown_while_updates_keep_arriving() {
        let (tx, mut rx) = watch::channel(SessionSnapshot::default());
        let (stop_tx, stop_rx) = oneshot::channel::<()>();
        let mut emitted = Vec::new();

        let driver = async {
            for _ in 0..3 {
                tx.send_modify(|s| s.loading = true);
                tokio::task::yield_now().await;
            }
            let _ = stop_tx.send(());
            tx.send_modify(|s| s.loading = true);
        };
        let shutdown = async {
            let _ = stop_rx.await;
        };

        let prefs = Preferences::default();
        let (outcome, ()) = tokio::join!(
            follow(&mut rx, &prefs, shutdown, |text| emitted.push(text)),
            driver
        );

        assert!(outcome.is_ok());
        assert!(emitted.is_empty());
        // Sender still alive: the loop ended because of the shutdown future.
        assert!(!tx.is_closed());
    }

    #[tokio::test]
    async fn follow_reports_failed_refresh() {
        let (tx, mut rx) = watch::channel(SessionSnapshot::default());

        tx.send_modify(|s| {
            s.loading = false;
            s.error = Some("City not found. Please check the spelling and try again.".into());
        });

        let never = std::future::pending::<()>();
        let err = follow(&mut rx, &Preferences::default(), never, |_| {}).await.unwrap_err();

        assert!(err.to_string().starts_with("City not found"));
    }
}
