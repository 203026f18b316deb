//! Store interfaces injected into the correlation runner and consolidator.

use crate::errors::StoreError;
use crate::models::{Association, Driver, ExternalRecord, TelemetrySource};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Half-open time window `[from, until)`; either bound may be open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub from: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
}

impl DateWindow {
    pub fn contains(&self, at: Option<DateTime<Utc>>) -> bool {
        if self.from.is_none() && self.until.is_none() {
            return true;
        }
        let Some(at) = at else {
            return false;
        };
        self.from.map_or(true, |from| at >= from) && self.until.map_or(true, |until| at < until)
    }

    pub fn is_valid(&self) -> bool {
        match (self.from, self.until) {
            (Some(from), Some(until)) => from < until,
            _ => true,
        }
    }
}

/// Roster query options.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RosterFilter {
    /// Restrict the roster to a single driver.
    pub driver_id: Option<Uuid>,
}

/// Keyset page request over unresolved records of one source.
///
/// Records qualify when they have no association and a non-blank driver
/// name. Pages are ordered by id and start strictly after `after`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub after: Option<i64>,
    pub limit: usize,
    pub window: Option<DateWindow>,
}

/// Result of a conditional association write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Applied,
    /// Another writer resolved the record first; nothing was changed.
    AlreadyResolved,
}

/// Read/delete access to the canonical driver roster.
#[async_trait]
pub trait RosterStore: Send + Sync {
    async fn list_drivers(&self, filter: &RosterFilter) -> Result<Vec<Driver>, StoreError>;

    /// Delete a driver. Fails with [`StoreError::Conflict`] while any external
    /// record still references it.
    async fn delete_driver(&self, id: Uuid) -> Result<(), StoreError>;
}

/// Read/write access to the external telemetry records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn list_unresolved(
        &self,
        source: TelemetrySource,
        page: &PageRequest,
    ) -> Result<Vec<ExternalRecord>, StoreError>;

    async fn count_unresolved(
        &self,
        source: TelemetrySource,
        window: Option<&DateWindow>,
    ) -> Result<u64, StoreError>;

    /// Write an association only if the record is still unresolved.
    async fn update_association(
        &self,
        source: TelemetrySource,
        id: i64,
        association: &Association,
    ) -> Result<WriteOutcome, StoreError>;

    /// Point every association referencing `old_driver_id` at
    /// `new_driver_id` across all sources, keeping confidence and method.
    /// Returns the number of records changed.
    async fn repoint_associations(
        &self,
        old_driver_id: Uuid,
        new_driver_id: Uuid,
    ) -> Result<u64, StoreError>;

    /// Number of records across all sources associated with a driver.
    async fn count_associations(&self, driver_id: Uuid) -> Result<u64, StoreError>;
}
