//! Utility to print how many telemetry records still lack a driver.

use fleet_driver_correlation::config::Config;
use fleet_driver_correlation::db::Database;
use fleet_driver_correlation::db_storage::PgFleetStore;
use fleet_driver_correlation::models::TelemetrySource;
use fleet_driver_correlation::repository::{RecordStore, RosterFilter, RosterStore};

/// Main entry point for the inspection utility.
///
/// Prints the roster size and the unresolved record count of every feed.
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    fleet_driver_correlation::obs::init_tracing();
    let config = Config::from_env()?;
    let db = Database::new(&config.database_url).await?;
    let store = PgFleetStore::new(db.pool.clone());

    let drivers = store.list_drivers(&RosterFilter::default()).await?;
    println!("Roster: {} drivers", drivers.len());

    println!("Unresolved records:");
    let mut total = 0;
    for source in TelemetrySource::ALL {
        let count = store.count_unresolved(source, None).await?;
        total += count;
        println!("- {}: {}", source, count);
    }
    println!("- total: {}", total);

    Ok(())
}
