//! CLI entry point for the Sunshine weather data layer.
//!
//! # Responsibility
//! - Wire one store, one remote source and one repository at startup.
//! - Sync once from a JSON forecast file and print the current forecasts.

use argh::FromArgs;
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;
use sunshine_core::{
    core_version, default_log_level, init_logging, JsonFileFetcher, ScheduledWeatherSource,
    SourceSettings, SqliteWeatherStore, SunshineConfig, SunshineRepository,
};

#[derive(FromArgs)]
/// Sync the local forecast cache from a JSON file and print it.
struct Args {
    /// JSON array of weather entries served as the remote forecast
    #[argh(option)]
    forecast: PathBuf,

    /// optional JSON config file
    #[argh(option)]
    config: Option<PathBuf>,

    /// seconds to wait for the cache to cover the forecast window
    #[argh(option, default = "10")]
    wait_secs: u64,
}

fn main() -> ExitCode {
    let args: Args = argh::from_env();
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("sunshine: {err}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<(), Box<dyn Error>> {
    let config = match &args.config {
        Some(path) => SunshineConfig::load(path)?,
        None => SunshineConfig::default(),
    };
    if let Some(log_dir) = &config.log_dir {
        let level = config.log_level.as_deref().unwrap_or(default_log_level());
        init_logging(level, log_dir)?;
    }

    log::info!(
        "event=cli_start module=cli status=ok version={}",
        core_version()
    );

    let runtime = tokio::runtime::Runtime::new()?;
    let store = Arc::new(match &config.db_path {
        Some(path) => SqliteWeatherStore::open(path)?,
        None => SqliteWeatherStore::open_in_memory()?,
    });
    let network = Arc::new(ScheduledWeatherSource::new(
        JsonFileFetcher::new(args.forecast),
        runtime.handle().clone(),
        SourceSettings::from(&config),
    ));
    let repo = SunshineRepository::with_system_clock(store, network, runtime.handle().clone());

    let mut forecasts = repo.current_weather_forecasts();
    let wanted = config.forecast_days as usize;
    let wait = Duration::from_secs(args.wait_secs);
    let synced = runtime.block_on(async {
        tokio::time::timeout(wait, forecasts.wait_for(|items| items.len() >= wanted))
            .await
            .ok()
            .flatten()
    });
    let items = synced.unwrap_or_else(|| forecasts.get());

    if items.len() < wanted {
        log::warn!(
            "event=cli_sync module=cli status=partial cached_days={} wanted_days={}",
            items.len(),
            wanted
        );
    }
    for item in &items {
        println!(
            "{}  icon={:<4} min={:>6.1} max={:>6.1}",
            item.date, item.weather_icon_id, item.min, item.max
        );
    }
    println!(
        "sunshine_core={} cached_days={} wanted_days={}",
        core_version(),
        items.len(),
        wanted
    );
    Ok(())
}
