//! In-memory implementation of the store traits.
//!
//! Used by the test suites and for local dry runs against fixture data.
//! Supports failure injection for every operation the engine performs.

use crate::errors::StoreError;
use crate::models::{Association, Driver, ExternalRecord, TelemetrySource};
use crate::repository::{DateWindow, PageRequest, RecordStore, RosterFilter, RosterStore, WriteOutcome};
use async_trait::async_trait;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

#[derive(Debug, Default)]
struct State {
    drivers: Vec<Driver>,
    records: BTreeMap<(TelemetrySource, i64), ExternalRecord>,
    fail_roster: bool,
    fail_fetch: HashSet<TelemetrySource>,
    fail_writes: HashSet<(TelemetrySource, i64)>,
    resolve_before_write: HashSet<(TelemetrySource, i64)>,
    fail_repoints: HashSet<Uuid>,
    fail_deletes: HashSet<Uuid>,
    fail_counts: HashSet<Uuid>,
    cancel_after: Option<(usize, CancellationToken)>,
    writes: usize,
}

/// Thread-safe in-memory roster and record store.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    state: Mutex<State>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_data(drivers: Vec<Driver>, records: Vec<ExternalRecord>) -> Self {
        let store = Self::new();
        for driver in drivers {
            store.add_driver(driver);
        }
        for record in records {
            store.add_record(record);
        }
        store
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        // A panicking test thread must not hide the data from the others
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn add_driver(&self, driver: Driver) {
        self.lock().drivers.push(driver);
    }

    pub fn add_record(&self, record: ExternalRecord) {
        self.lock().records.insert((record.source, record.id), record);
    }

    pub fn drivers(&self) -> Vec<Driver> {
        self.lock().drivers.clone()
    }

    pub fn driver_exists(&self, id: Uuid) -> bool {
        self.lock().drivers.iter().any(|d| d.id == id)
    }

    pub fn record(&self, source: TelemetrySource, id: i64) -> Option<ExternalRecord> {
        self.lock().records.get(&(source, id)).cloned()
    }

    pub fn records(&self) -> Vec<ExternalRecord> {
        self.lock().records.values().cloned().collect()
    }

    /// Number of association writes that were applied.
    pub fn applied_writes(&self) -> usize {
        self.lock().writes
    }

    pub fn fail_roster_load(&self) {
        self.lock().fail_roster = true;
    }

    pub fn fail_fetch_for(&self, source: TelemetrySource) {
        self.lock().fail_fetch.insert(source);
    }

    pub fn fail_write_for(&self, source: TelemetrySource, id: i64) {
        self.lock().fail_writes.insert((source, id));
    }

    /// Simulate a concurrent runner resolving the record right before our write.
    pub fn resolve_concurrently(&self, source: TelemetrySource, id: i64) {
        self.lock().resolve_before_write.insert((source, id));
    }

    pub fn fail_repoint_for(&self, driver_id: Uuid) {
        self.lock().fail_repoints.insert(driver_id);
    }

    pub fn fail_delete_for(&self, driver_id: Uuid) {
        self.lock().fail_deletes.insert(driver_id);
    }

    pub fn fail_count_for(&self, driver_id: Uuid) {
        self.lock().fail_counts.insert(driver_id);
    }

    /// Cancel `token` once `writes` association writes have been applied,
    /// simulating an operator interrupt in the middle of a run.
    pub fn cancel_after_writes(&self, writes: usize, token: CancellationToken) {
        self.lock().cancel_after = Some((writes, token));
    }
}

fn qualifies(record: &ExternalRecord, window: Option<&DateWindow>) -> bool {
    !record.is_resolved()
        && record.has_driver_name()
        && window.map_or(true, |w| w.contains(record.occurred_at))
}

#[async_trait]
impl RosterStore for InMemoryStore {
    async fn list_drivers(&self, filter: &RosterFilter) -> Result<Vec<Driver>, StoreError> {
        let state = self.lock();
        if state.fail_roster {
            return Err(StoreError::Unavailable("roster unavailable".to_string()));
        }
        Ok(state
            .drivers
            .iter()
            .filter(|d| filter.driver_id.map_or(true, |id| d.id == id))
            .cloned()
            .collect())
    }

    async fn delete_driver(&self, id: Uuid) -> Result<(), StoreError> {
        let mut state = self.lock();
        if state.fail_deletes.contains(&id) {
            return Err(StoreError::Unavailable(format!("delete of driver {} failed", id)));
        }
        let referenced = state
            .records
            .values()
            .any(|r| r.association.is_some_and(|a| a.driver_id == id));
        if referenced {
            return Err(StoreError::Conflict(format!(
                "driver {} is still referenced by external records",
                id
            )));
        }
        let before = state.drivers.len();
        state.drivers.retain(|d| d.id != id);
        if state.drivers.len() == before {
            return Err(StoreError::Conflict(format!("driver {} does not exist", id)));
        }
        Ok(())
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn list_unresolved(
        &self,
        source: TelemetrySource,
        page: &PageRequest,
    ) -> Result<Vec<ExternalRecord>, StoreError> {
        let state = self.lock();
        if state.fail_fetch.contains(&source) {
            return Err(StoreError::Unavailable(format!("{} feed unavailable", source)));
        }
        let after = page.after.unwrap_or(i64::MIN);
        Ok(state
            .records
            .range((source, after)..=(source, i64::MAX))
            .map(|(_, r)| r)
            .filter(|r| r.id > after && qualifies(r, page.window.as_ref()))
            .take(page.limit)
            .cloned()
            .collect())
    }

    async fn count_unresolved(
        &self,
        source: TelemetrySource,
        window: Option<&DateWindow>,
    ) -> Result<u64, StoreError> {
        let state = self.lock();
        Ok(state
            .records
            .values()
            .filter(|r| r.source == source && qualifies(r, window))
            .count() as u64)
    }

    async fn update_association(
        &self,
        source: TelemetrySource,
        id: i64,
        association: &Association,
    ) -> Result<WriteOutcome, StoreError> {
        let mut state = self.lock();
        if state.fail_writes.contains(&(source, id)) {
            return Err(StoreError::Unavailable(format!(
                "write to {} record {} failed",
                source, id
            )));
        }
        let concurrent = state.resolve_before_write.remove(&(source, id));
        let record = state
            .records
            .get_mut(&(source, id))
            .ok_or_else(|| StoreError::Conflict(format!("{} record {} does not exist", source, id)))?;
        if concurrent && record.association.is_none() {
            record.association = Some(Association {
                method: crate::models::MatchMethod::ManualAssignment,
                confidence: 1.0,
                ..*association
            });
        }
        if record.association.is_some() {
            return Ok(WriteOutcome::AlreadyResolved);
        }
        record.association = Some(*association);
        state.writes += 1;
        if let Some((after, token)) = &state.cancel_after {
            if state.writes >= *after {
                token.cancel();
            }
        }
        Ok(WriteOutcome::Applied)
    }

    async fn repoint_associations(
        &self,
        old_driver_id: Uuid,
        new_driver_id: Uuid,
    ) -> Result<u64, StoreError> {
        let mut state = self.lock();
        if state.fail_repoints.contains(&old_driver_id) {
            return Err(StoreError::Unavailable(format!(
                "repoint of driver {} failed",
                old_driver_id
            )));
        }
        let now = chrono::Utc::now();
        let mut changed = 0;
        for record in state.records.values_mut() {
            if let Some(association) = record.association.as_mut() {
                if association.driver_id == old_driver_id {
                    association.driver_id = new_driver_id;
                    association.updated_at = now;
                    changed += 1;
                }
            }
        }
        Ok(changed)
    }

    async fn count_associations(&self, driver_id: Uuid) -> Result<u64, StoreError> {
        let state = self.lock();
        if state.fail_counts.contains(&driver_id) {
            return Err(StoreError::Unavailable(format!(
                "counting associations of driver {} failed",
                driver_id
            )));
        }
        Ok(state
            .records
            .values()
            .filter(|r| r.association.is_some_and(|a| a.driver_id == driver_id))
            .count() as u64)
    }
}
