use crate::errors::{ResultExt, StoreError};
use crate::models::{
    Association, Driver, DriverRow, ExternalRecord, GpsTripRow, GuardianEventRow, TelemetrySource,
    VideoSafetyEventRow,
};
use crate::repository::{DateWindow, PageRequest, RecordStore, RosterFilter, RosterStore, WriteOutcome};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

/// Association columns shared by every telemetry table.
const ASSOCIATION_COLUMNS: &str = "driver_id, \
     driver_association_confidence::float8 AS driver_association_confidence, \
     driver_association_method, \
     driver_association_updated_at";

/// Where a telemetry source lives and which of its columns the engine reads.
struct SourceTable {
    table: &'static str,
    /// Source-specific columns, selected before the association columns.
    columns: &'static str,
    /// Column holding the event/trip time, used for date windows.
    time_column: &'static str,
}

fn source_table(source: TelemetrySource) -> SourceTable {
    match source {
        TelemetrySource::VideoSafety => SourceTable {
            table: "video_safety_events",
            columns: "id::int8 AS id, driver_name, employee_id, carrier, event_datetime",
            time_column: "event_datetime",
        },
        TelemetrySource::Guardian => SourceTable {
            table: "guardian_events",
            columns: "id::int8 AS id, driver_name, fleet, detection_time",
            time_column: "detection_time",
        },
        TelemetrySource::GpsTrip => SourceTable {
            table: "gps_trip_history",
            columns: "id::int8 AS id, driver_name, driver_employee_id, group_name, start_time",
            time_column: "start_time",
        },
    }
}

/// Predicate selecting unresolved records with a usable name inside the
/// window bound to `$from`/`$until`.
fn unresolved_predicate(time_column: &str, from: usize, until: usize) -> String {
    format!(
        "driver_id IS NULL \
         AND driver_name IS NOT NULL AND btrim(driver_name) <> '' \
         AND (${from}::timestamptz IS NULL OR {time_column} >= ${from}) \
         AND (${until}::timestamptz IS NULL OR {time_column} < ${until})"
    )
}

fn window_bounds(window: Option<&DateWindow>) -> (Option<DateTime<Utc>>, Option<DateTime<Utc>>) {
    window.map_or((None, None), |w| (w.from, w.until))
}

/// Postgres-backed roster and telemetry record store.
#[derive(Clone)]
pub struct PgFleetStore {
    pool: PgPool,
}

impl PgFleetStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn fetch_page<T>(
        &self,
        source: TelemetrySource,
        page: &PageRequest,
    ) -> Result<Vec<ExternalRecord>, StoreError>
    where
        T: for<'r> FromRow<'r, PgRow> + Send + Unpin + Into<ExternalRecord>,
    {
        let target = source_table(source);
        let sql = format!(
            "SELECT {columns}, {association} FROM {table} \
             WHERE {predicate} AND id > $1 \
             ORDER BY id \
             LIMIT $4",
            columns = target.columns,
            association = ASSOCIATION_COLUMNS,
            table = target.table,
            predicate = unresolved_predicate(target.time_column, 2, 3),
        );
        let (from, until) = window_bounds(page.window.as_ref());
        let limit = i64::try_from(page.limit).unwrap_or(i64::MAX);

        let rows: Vec<T> = sqlx::query_as::<_, T>(&sql)
            .bind(page.after.unwrap_or(i64::MIN))
            .bind(from)
            .bind(until)
            .bind(limit)
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("listing unresolved {} records", source))?;

        Ok(rows.into_iter().map(Into::into).collect())
    }
}

#[async_trait]
impl RosterStore for PgFleetStore {
    async fn list_drivers(&self, filter: &RosterFilter) -> Result<Vec<Driver>, StoreError> {
        let rows: Vec<DriverRow> = sqlx::query_as(
            r#"
            SELECT id, first_name, last_name, employee_id, fleet, depot, status, created_at
            FROM drivers
            WHERE ($1::uuid IS NULL OR id = $1)
            ORDER BY created_at, id
            "#,
        )
        .bind(filter.driver_id)
        .fetch_all(&self.pool)
        .await
        .context("loading driver roster")?;

        Ok(rows.into_iter().map(Driver::from).collect())
    }

    async fn delete_driver(&self, id: Uuid) -> Result<(), StoreError> {
        let guards: Vec<String> = TelemetrySource::ALL
            .iter()
            .map(|s| {
                format!(
                    "NOT EXISTS (SELECT 1 FROM {} WHERE driver_id = $1)",
                    source_table(*s).table
                )
            })
            .collect();
        let sql = format!(
            "DELETE FROM drivers WHERE id = $1 AND {}",
            guards.join(" AND ")
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("deleting driver {}", id))?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict(format!(
                "driver {} was not deleted: missing or still referenced",
                id
            )));
        }
        tracing::debug!("Deleted driver {}", id);
        Ok(())
    }
}

#[async_trait]
impl RecordStore for PgFleetStore {
    async fn list_unresolved(
        &self,
        source: TelemetrySource,
        page: &PageRequest,
    ) -> Result<Vec<ExternalRecord>, StoreError> {
        match source {
            TelemetrySource::VideoSafety => self.fetch_page::<VideoSafetyEventRow>(source, page).await,
            TelemetrySource::Guardian => self.fetch_page::<GuardianEventRow>(source, page).await,
            TelemetrySource::GpsTrip => self.fetch_page::<GpsTripRow>(source, page).await,
        }
    }

    async fn count_unresolved(
        &self,
        source: TelemetrySource,
        window: Option<&DateWindow>,
    ) -> Result<u64, StoreError> {
        let target = source_table(source);
        let sql = format!(
            "SELECT count(*) FROM {} WHERE {}",
            target.table,
            unresolved_predicate(target.time_column, 1, 2)
        );
        let (from, until) = window_bounds(window);

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(from)
            .bind(until)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("counting unresolved {} records", source))?;

        Ok(count.max(0) as u64)
    }

    async fn update_association(
        &self,
        source: TelemetrySource,
        id: i64,
        association: &Association,
    ) -> Result<WriteOutcome, StoreError> {
        let sql = format!(
            r#"
            UPDATE {}
            SET driver_id = $2,
                driver_association_confidence = $3,
                driver_association_method = $4,
                driver_association_updated_at = $5
            WHERE id = $1 AND driver_id IS NULL
            "#,
            source_table(source).table
        );

        let result = sqlx::query(&sql)
            .bind(id)
            .bind(association.driver_id)
            .bind(association.confidence)
            .bind(association.method.as_str())
            .bind(association.updated_at)
            .execute(&self.pool)
            .await
            .with_context(|| format!("writing association for {} record {}", source, id))?;

        if result.rows_affected() == 0 {
            return Ok(WriteOutcome::AlreadyResolved);
        }
        Ok(WriteOutcome::Applied)
    }

    async fn repoint_associations(
        &self,
        old_driver_id: Uuid,
        new_driver_id: Uuid,
    ) -> Result<u64, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .context("starting repoint transaction")?;

        let mut changed = 0;
        for source in TelemetrySource::ALL {
            let sql = format!(
                "UPDATE {} SET driver_id = $2, driver_association_updated_at = now() WHERE driver_id = $1",
                source_table(source).table
            );
            let result = sqlx::query(&sql)
                .bind(old_driver_id)
                .bind(new_driver_id)
                .execute(&mut *tx)
                .await
                .with_context(|| {
                    format!(
                        "repointing {} associations from {} to {}",
                        source, old_driver_id, new_driver_id
                    )
                })?;
            changed += result.rows_affected();
        }

        tx.commit().await.context("committing repoint transaction")?;
        Ok(changed)
    }

    async fn count_associations(&self, driver_id: Uuid) -> Result<u64, StoreError> {
        let parts: Vec<String> = TelemetrySource::ALL
            .iter()
            .map(|s| {
                format!(
                    "(SELECT count(*) FROM {} WHERE driver_id = $1)",
                    source_table(*s).table
                )
            })
            .collect();
        let sql = format!("SELECT {}", parts.join(" + "));

        let count: i64 = sqlx::query_scalar(&sql)
            .bind(driver_id)
            .fetch_one(&self.pool)
            .await
            .with_context(|| format!("counting associations of driver {}", driver_id))?;

        Ok(count.max(0) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_predicate_uses_requested_placeholders() {
        let predicate = unresolved_predicate("start_time", 2, 3);
        assert!(predicate.contains("$2::timestamptz IS NULL OR start_time >= $2"));
        assert!(predicate.contains("$3::timestamptz IS NULL OR start_time < $3"));
        assert!(predicate.starts_with("driver_id IS NULL"));
    }

    #[test]
    fn test_every_source_has_a_distinct_table() {
        let mut tables: Vec<&str> = TelemetrySource::ALL
            .iter()
            .map(|s| source_table(*s).table)
            .collect();
        tables.sort();
        tables.dedup();
        assert_eq!(tables.len(), TelemetrySource::ALL.len());
    }
}
