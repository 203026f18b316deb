//! Script to merge duplicate drivers on the roster.

use clap::Parser;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use fleet_driver_correlation::config::Config;
use fleet_driver_correlation::consolidation::Consolidator;
use fleet_driver_correlation::db::Database;
use fleet_driver_correlation::db_storage::PgFleetStore;
use fleet_driver_correlation::obs::init_tracing;

#[derive(Debug, Parser)]
#[command(name = "consolidate-drivers", about = "Merge duplicate roster drivers")]
struct Args {
    /// Report the planned merges without changing anything
    #[arg(long)]
    dry_run: bool,
}

/// Main entry point for the consolidation script.
///
/// Groups drivers by normalized full name within a fleet, repoints the external
/// records of every duplicate to the group's survivor and deletes the duplicate.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let args = Args::parse();

    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    tracing::info!(
        "Connected to database. Starting driver consolidation (dry run: {})...",
        args.dry_run
    );
    let store = Arc::new(PgFleetStore::new(db.pool.clone()));

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!("Interrupt received, stopping after the current group");
            on_signal.cancel();
        }
    });

    let report = Consolidator::new(store.clone(), store)
        .with_cancellation(cancel)
        .consolidate(args.dry_run)
        .await?;

    println!("{}", serde_json::to_string_pretty(&report)?);
    if report.failures > 0 {
        anyhow::bail!("{} consolidation steps failed", report.failures);
    }
    Ok(())
}
