use chrono::{NaiveDate, Utc};
use clap::Parser;
use daytimeline::application::day_loader::{DayLoader, PlacedEvent};
use daytimeline::application::event_source::EventSourceAdapter;
use daytimeline::infrastructure::config::{ensure_default_config, load_config};
use daytimeline::infrastructure::error::InfraError;
use daytimeline::infrastructure::event_mapper::EventNormalizer;
use daytimeline::infrastructure::logging::init_logging;
use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

#[derive(Parser)]
#[command(name = "daytimeline")]
#[command(about = "Print one day of the calendar timeline with its overlap layout")]
struct Cli {
    /// Directory holding timeline.json (created with defaults when missing)
    #[arg(long, default_value = "config")]
    config_dir: PathBuf,

    /// Day to load (YYYY-MM-DD); defaults to today in the configured timezone
    #[arg(long)]
    date: Option<NaiveDate>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DayReport {
    date: NaiveDate,
    timezone: String,
    source: &'static str,
    error: Option<String>,
    events: Vec<PlacedEvent>,
}

#[tokio::main]
async fn main() -> Result<(), InfraError> {
    let cli = Cli::parse();
    init_logging("info")?;

    ensure_default_config(&cli.config_dir)?;
    let config = load_config(&cli.config_dir)?;
    let timezone = config.timezone()?;
    let date = cli
        .date
        .unwrap_or_else(|| Utc::now().with_timezone(&timezone).date_naive());

    let adapter = EventSourceAdapter::from_config(&config, |key| std::env::var(key).ok())?;
    let source = adapter.kind();
    info!(%date, source, config_dir = %cli.config_dir.display(), "loading day");

    let loader = DayLoader::new(Arc::new(adapter), EventNormalizer::new(timezone));
    let day = loader.load_day(date).await;

    let report = DayReport {
        date,
        timezone: config.timezone.clone(),
        source,
        error: day.error.clone(),
        events: day.placements(),
    };
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
