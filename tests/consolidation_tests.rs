/// Duplicate consolidation tests against the in-memory store
use chrono::{TimeZone, Utc};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use fleet_driver_correlation::consolidation::Consolidator;
use fleet_driver_correlation::errors::CorrelationError;
use fleet_driver_correlation::memory_store::InMemoryStore;
use fleet_driver_correlation::models::{
    Association, Driver, DriverStatus, ExternalRecord, MatchMethod, TelemetrySource,
};

fn driver(first: &str, last: &str, fleet: &str, status: DriverStatus, year: i32) -> Driver {
    Driver {
        id: Uuid::new_v4(),
        first_name: first.to_string(),
        last_name: last.to_string(),
        employee_id: None,
        fleet: fleet.to_string(),
        depot: None,
        status,
        created_at: Utc.with_ymd_and_hms(year, 1, 1, 0, 0, 0).unwrap(),
    }
}

fn linked(source: TelemetrySource, id: i64, driver_id: Uuid) -> ExternalRecord {
    ExternalRecord {
        id,
        source,
        raw_driver_name: Some("Jane Doe".to_string()),
        employee_id: None,
        fleet_hint: None,
        occurred_at: None,
        association: Some(Association {
            driver_id,
            confidence: 0.95,
            method: MatchMethod::ExactMatch,
            updated_at: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
        }),
    }
}

fn consolidator(store: &Arc<InMemoryStore>) -> Consolidator {
    Consolidator::new(store.clone(), store.clone())
}

fn no_dangling_references(store: &InMemoryStore) -> bool {
    store
        .records()
        .iter()
        .filter_map(|r| r.association)
        .all(|a| store.driver_exists(a.driver_id))
}

#[tokio::test]
async fn test_active_survivor_absorbs_inactive_duplicate() {
    let active = driver("Jane", "Doe", "A", DriverStatus::Active, 2023);
    let inactive = driver("Jane", "Doe", "A", DriverStatus::Inactive, 2022);
    let store = Arc::new(InMemoryStore::with_data(
        vec![inactive.clone(), active.clone()],
        vec![
            linked(TelemetrySource::Guardian, 1, inactive.id),
            linked(TelemetrySource::GpsTrip, 2, inactive.id),
            linked(TelemetrySource::GpsTrip, 3, active.id),
        ],
    ));

    let report = consolidator(&store).consolidate(false).await.unwrap();

    assert_eq!(report.duplicate_groups, 1);
    assert_eq!(report.drivers_removed, 1);
    assert_eq!(report.records_repointed, 2);
    assert_eq!(report.failures, 0);
    assert_eq!(report.groups[0].survivor, active.id);
    assert!(report.groups[0].applied);

    assert!(store.driver_exists(active.id));
    assert!(!store.driver_exists(inactive.id));
    for (source, id) in [(TelemetrySource::Guardian, 1), (TelemetrySource::GpsTrip, 2)] {
        let association = store.record(source, id).unwrap().association.unwrap();
        assert_eq!(association.driver_id, active.id);
        // Method and confidence are kept; only the target moves
        assert_eq!(association.method, MatchMethod::ExactMatch);
    }
    assert!(no_dangling_references(&store));
}

#[tokio::test]
async fn test_dry_run_reports_plan_without_mutation() {
    let keep = driver("Jane", "Doe", "A", DriverStatus::Active, 2020);
    let extra = driver("JANE", "doe", "a", DriverStatus::Active, 2021);
    let store = Arc::new(InMemoryStore::with_data(
        vec![keep.clone(), extra.clone()],
        vec![linked(TelemetrySource::VideoSafety, 1, extra.id)],
    ));

    let report = consolidator(&store).consolidate(true).await.unwrap();

    assert!(report.dry_run);
    assert_eq!(report.drivers_removed, 1);
    assert_eq!(report.records_repointed, 1);
    assert_eq!(report.groups[0].survivor, keep.id);
    assert_eq!(report.groups[0].losers[0].driver_id, extra.id);
    assert_eq!(report.groups[0].losers[0].repointed, 1);
    assert!(!report.groups[0].losers[0].deleted);
    assert!(!report.groups[0].applied);

    assert_eq!(store.drivers().len(), 2);
    assert_eq!(
        store
            .record(TelemetrySource::VideoSafety, 1)
            .unwrap()
            .association
            .unwrap()
            .driver_id,
        extra.id
    );
}

#[tokio::test]
async fn test_dry_run_does_not_plan_removal_when_count_fails() {
    let keep = driver("Jane", "Doe", "A", DriverStatus::Active, 2020);
    let counted = driver("Jane", "Doe", "A", DriverStatus::Active, 2021);
    let unreadable = driver("Jane", "Doe", "A", DriverStatus::Active, 2022);
    let store = Arc::new(InMemoryStore::with_data(
        vec![keep, counted.clone(), unreadable.clone()],
        vec![linked(TelemetrySource::Guardian, 1, counted.id)],
    ));
    store.fail_count_for(unreadable.id);

    let report = consolidator(&store).consolidate(true).await.unwrap();

    assert_eq!(report.failures, 1);
    assert_eq!(report.drivers_removed, 1);
    assert_eq!(report.records_repointed, 1);
    assert_eq!(report.groups[0].losers.len(), 2);
    assert_eq!(report.groups[0].losers[1].driver_id, unreadable.id);
    assert_eq!(store.drivers().len(), 3);
}

#[tokio::test]
async fn test_repoint_failure_keeps_every_duplicate_of_the_group() {
    let keep = driver("Jane", "Doe", "A", DriverStatus::Active, 2020);
    let second = driver("Jane", "Doe", "A", DriverStatus::Active, 2021);
    let third = driver("Jane", "Doe", "A", DriverStatus::Active, 2022);
    let store = Arc::new(InMemoryStore::with_data(
        vec![keep.clone(), second.clone(), third.clone()],
        vec![
            linked(TelemetrySource::Guardian, 1, second.id),
            linked(TelemetrySource::Guardian, 2, third.id),
        ],
    ));
    store.fail_repoint_for(third.id);

    let report = consolidator(&store).consolidate(false).await.unwrap();

    assert_eq!(report.failures, 1);
    assert_eq!(report.drivers_removed, 0);
    assert!(!report.groups[0].applied);
    assert_eq!(report.groups[0].losers.len(), 2);
    assert!(store.driver_exists(second.id));
    assert!(store.driver_exists(third.id));
    assert!(no_dangling_references(&store));
}

#[tokio::test]
async fn test_delete_failure_is_counted_and_other_groups_proceed() {
    let jane = driver("Jane", "Doe", "A", DriverStatus::Active, 2020);
    let jane_dup = driver("Jane", "Doe", "A", DriverStatus::Active, 2021);
    let sam = driver("Sam", "Lee", "B", DriverStatus::Active, 2020);
    let sam_dup = driver("Sam", "Lee", "B", DriverStatus::Inactive, 2019);
    let store = Arc::new(InMemoryStore::with_data(
        vec![jane, jane_dup.clone(), sam.clone(), sam_dup.clone()],
        vec![],
    ));
    store.fail_delete_for(jane_dup.id);

    let report = consolidator(&store).consolidate(false).await.unwrap();

    assert_eq!(report.duplicate_groups, 2);
    assert_eq!(report.failures, 1);
    assert_eq!(report.drivers_removed, 1);
    assert!(store.driver_exists(jane_dup.id));
    assert!(!store.driver_exists(sam_dup.id));
    assert!(store.driver_exists(sam.id));
}

#[tokio::test]
async fn test_no_duplicates_is_a_no_op() {
    let store = Arc::new(InMemoryStore::with_data(
        vec![
            driver("Jane", "Doe", "A", DriverStatus::Active, 2020),
            driver("Jane", "Doe", "B", DriverStatus::Active, 2020),
        ],
        vec![],
    ));

    let report = consolidator(&store).consolidate(false).await.unwrap();

    assert_eq!(report.drivers_examined, 2);
    assert_eq!(report.duplicate_groups, 0);
    assert!(report.groups.is_empty());
    assert_eq!(store.drivers().len(), 2);
}

#[tokio::test]
async fn test_roster_failure_aborts() {
    let store = Arc::new(InMemoryStore::new());
    store.fail_roster_load();

    assert!(matches!(
        consolidator(&store).consolidate(false).await,
        Err(CorrelationError::RosterLoad(_))
    ));
}

#[tokio::test]
async fn test_cancelled_before_first_group() {
    let a = driver("Jane", "Doe", "A", DriverStatus::Active, 2020);
    let b = driver("Jane", "Doe", "A", DriverStatus::Active, 2021);
    let store = Arc::new(InMemoryStore::with_data(vec![a, b], vec![]));
    let token = CancellationToken::new();
    token.cancel();

    let report = consolidator(&store)
        .with_cancellation(token)
        .consolidate(false)
        .await
        .unwrap();

    assert!(report.cancelled);
    assert!(report.groups.is_empty());
    assert_eq!(store.drivers().len(), 2);
}
