//! `driver-correlate`: resolve driver names on unresolved telemetry records.

use chrono::{DateTime, NaiveDate, Utc};
use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use fleet_driver_correlation::config::Config;
use fleet_driver_correlation::correlation::CorrelationRunner;
use fleet_driver_correlation::db::Database;
use fleet_driver_correlation::db_storage::PgFleetStore;
use fleet_driver_correlation::models::TelemetrySource;
use fleet_driver_correlation::obs::init_tracing;
use fleet_driver_correlation::repository::DateWindow;

#[derive(Debug, Parser)]
#[command(name = "driver-correlate", about = "Link telemetry records to roster drivers")]
struct Args {
    /// Compute matches and report them without writing
    #[arg(long, env = "CORRELATION_DRY_RUN")]
    dry_run: bool,

    /// Records fetched per page (overrides CORRELATION_BATCH_SIZE)
    #[arg(long)]
    batch_size: Option<usize>,

    /// Minimum confidence for a match to be persisted (overrides CORRELATION_MIN_CONFIDENCE)
    #[arg(long)]
    min_confidence: Option<f64>,

    /// Only persist matches that resolve to this roster driver
    #[arg(long = "driver")]
    driver_id: Option<Uuid>,

    /// Only process one feed: video_safety, guardian or gps_trip
    #[arg(long, env = "CORRELATION_SOURCE")]
    source: Option<TelemetrySource>,

    /// Only records at or after this time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_bound)]
    since: Option<DateTime<Utc>>,

    /// Only records before this time (RFC 3339 or YYYY-MM-DD)
    #[arg(long, value_parser = parse_bound)]
    until: Option<DateTime<Utc>>,
}

fn parse_bound(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .ok()
        .and_then(|date| date.and_hms_opt(0, 0, 0))
        .map(|at| at.and_utc())
        .ok_or_else(|| format!("'{}' is neither RFC 3339 nor YYYY-MM-DD", raw))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();
    let args = Args::parse();

    let config = Config::from_env()?;

    let mut run = config.run_config();
    run.dry_run = args.dry_run;
    run.driver_id = args.driver_id;
    run.source = args.source;
    if let Some(batch_size) = args.batch_size {
        run.batch_size = batch_size;
    }
    if let Some(min_confidence) = args.min_confidence {
        run.min_confidence = min_confidence;
    }
    if args.since.is_some() || args.until.is_some() {
        run.window = Some(DateWindow {
            from: args.since,
            until: args.until,
        });
    }
    run.validate()?;

    let db = Database::new(&config.database_url).await?;
    tracing::info!("Database connection pool established");
    let store = Arc::new(PgFleetStore::new(db.pool.clone()));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current record");
            on_signal.cancel();
        }
    });

    let runner = CorrelationRunner::new(store.clone(), store, config.matcher_config())
        .with_cancellation(cancel);
    let report = runner.run(&run).await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}
