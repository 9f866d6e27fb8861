use std::str::FromStr;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};

use filing_feed::{FileFeed, FinnhubFeed, StaticReferenceSource};
use run_coordinator::{LogSink, RunCoordinator};
use signal_core::{EngineConfig, FilingFeed};

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    tracing::info!("Starting insider signal runner");

    // 2. Load and validate configuration
    let config = EngineConfig::from_env()?;
    tracing::info!("Configuration loaded and validated");
    tracing::info!("  Watch universe: {}", config.watch_universe.join(", "));
    tracing::info!("  Alert threshold: {} events", config.alert_threshold);
    tracing::info!("  Alert window: {} days", config.alert_window_days);

    // 3. Open the database
    let options = SqliteConnectOptions::from_str(&config.database_url)
        .context("Invalid DATABASE_URL")?
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(5)
        .connect_with(options)
        .await
        .context("Failed to open database")?;

    // 4. Wire collaborators: file feed wins when configured, otherwise Finnhub
    let feed: Arc<dyn FilingFeed> = if let Some(path) = &config.feed_file {
        tracing::info!("Using file feed: {path}");
        Arc::new(FileFeed::new(path.clone()))
    } else if let Some(key) = &config.finnhub_api_key {
        tracing::info!("Using Finnhub feed");
        Arc::new(FinnhubFeed::new(key.clone()))
    } else {
        bail!("No feed configured: set FEED_FILE or FINNHUB_API_KEY");
    };

    let Some(reference_file) = &config.reference_file else {
        bail!("REFERENCE_FILE is required");
    };
    let references = Arc::new(StaticReferenceSource::from_file(reference_file).await?);

    let coordinator = RunCoordinator::new(pool, config, feed, references, Arc::new(LogSink))?;
    coordinator.init_tables().await?;

    // 5. One synchronous run; scheduling is the caller's concern
    let summary = coordinator.run(Utc::now()).await?;

    tracing::info!(
        "Run complete: {} ingested, {} duplicates, {} rejected, {} alerts raised, {} cleared",
        summary.ingested,
        summary.duplicates,
        summary.rejected,
        summary.alerts_raised.len(),
        summary.alerts_cleared.len(),
    );
    for (rank, result) in summary.top_ranked.iter().enumerate() {
        tracing::info!("  #{} {} score {:.1}", rank + 1, result.ticker, result.score);
    }

    Ok(())
}
