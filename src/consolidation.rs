//! Duplicate roster consolidation.
//!
//! Drivers are grouped by normalized full name within a fleet. Each group
//! keeps one survivor; every other member has its external associations
//! repointed to the survivor and is deleted only after all repoints of the
//! group succeeded.

use crate::errors::CorrelationError;
use crate::models::Driver;
use crate::normalize::normalize_str;
use crate::repository::{RecordStore, RosterFilter, RosterStore};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Grouping key: normalized full name and normalized fleet.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DuplicateKey {
    pub name: String,
    pub fleet: String,
}

impl DuplicateKey {
    pub fn of(driver: &Driver) -> Self {
        Self {
            name: normalize_str(&driver.full_name()),
            fleet: normalize_str(&driver.fleet),
        }
    }
}

/// A duplicate member slated for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoserPlan {
    pub driver_id: Uuid,
    /// External records pointing at this driver (planned in dry runs, applied otherwise).
    pub repointed: u64,
    pub deleted: bool,
}

/// Outcome for one duplicate group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GroupPlan {
    pub key: DuplicateKey,
    pub survivor: Uuid,
    pub losers: Vec<LoserPlan>,
    /// Every repoint and delete of the group went through. Always false in dry runs.
    pub applied: bool,
}

/// Aggregated counts for one consolidation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConsolidationReport {
    pub dry_run: bool,
    pub drivers_examined: usize,
    pub duplicate_groups: usize,
    /// Drivers deleted, or that would be deleted in a dry run.
    pub drivers_removed: usize,
    /// Associations repointed, or that would be repointed in a dry run.
    pub records_repointed: u64,
    /// Repoint or delete steps that failed.
    pub failures: usize,
    pub groups: Vec<GroupPlan>,
    pub cancelled: bool,
}

/// Survivor preference: active before anything else, then the oldest
/// record, then the smaller id.
fn survivor_order(a: &Driver, b: &Driver) -> Ordering {
    b.status
        .is_active()
        .cmp(&a.status.is_active())
        .then_with(|| a.created_at.cmp(&b.created_at))
        .then_with(|| a.id.cmp(&b.id))
}

/// Group the roster into duplicate sets. Each returned group has its survivor
/// first. Drivers with a blank name are never grouped.
pub fn duplicate_groups(drivers: &[Driver]) -> Vec<(DuplicateKey, Vec<Driver>)> {
    let mut by_key: BTreeMap<DuplicateKey, Vec<Driver>> = BTreeMap::new();
    for driver in drivers {
        let key = DuplicateKey::of(driver);
        if key.name.is_empty() {
            continue;
        }
        by_key.entry(key).or_default().push(driver.clone());
    }
    by_key
        .into_iter()
        .filter(|(_, members)| members.len() > 1)
        .map(|(key, mut members)| {
            members.sort_by(survivor_order);
            (key, members)
        })
        .collect()
}

/// Merges duplicate roster entries.
pub struct Consolidator {
    roster: Arc<dyn RosterStore>,
    records: Arc<dyn RecordStore>,
    cancel: CancellationToken,
}

impl Consolidator {
    pub fn new(roster: Arc<dyn RosterStore>, records: Arc<dyn RecordStore>) -> Self {
        Self {
            roster,
            records,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop between groups once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Find and merge duplicate drivers. In a dry run nothing is mutated and
    /// the report carries the planned repoint counts.
    pub async fn consolidate(&self, dry_run: bool) -> Result<ConsolidationReport, CorrelationError> {
        let drivers = self
            .roster
            .list_drivers(&RosterFilter::default())
            .await
            .map_err(CorrelationError::RosterLoad)?;

        let groups = duplicate_groups(&drivers);
        let mut report = ConsolidationReport {
            dry_run,
            drivers_examined: drivers.len(),
            duplicate_groups: groups.len(),
            ..ConsolidationReport::default()
        };
        tracing::info!(
            "Found {} duplicate groups among {} drivers (dry run: {})",
            groups.len(),
            drivers.len(),
            dry_run
        );

        for (key, members) in groups {
            if self.cancel.is_cancelled() {
                report.cancelled = true;
                tracing::warn!("Consolidation cancelled after {} groups", report.groups.len());
                break;
            }
            let plan = if dry_run {
                self.plan_group(key, &members, &mut report).await
            } else {
                self.merge_group(key, &members, &mut report).await
            };
            report.groups.push(plan);
        }

        tracing::info!(
            "Consolidation complete: {} groups, {} drivers removed, {} records repointed, {} failures",
            report.duplicate_groups,
            report.drivers_removed,
            report.records_repointed,
            report.failures
        );
        Ok(report)
    }

    async fn plan_group(
        &self,
        key: DuplicateKey,
        members: &[Driver],
        report: &mut ConsolidationReport,
    ) -> GroupPlan {
        let survivor = &members[0];
        let mut losers = Vec::with_capacity(members.len() - 1);
        for loser in &members[1..] {
            let planned = match self.records.count_associations(loser.id).await {
                Ok(count) => count,
                Err(error) => {
                    tracing::warn!(
                        "{}",
                        CorrelationError::persistence_for_driver(loser.id, error)
                    );
                    report.failures += 1;
                    losers.push(LoserPlan {
                        driver_id: loser.id,
                        repointed: 0,
                        deleted: false,
                    });
                    continue;
                }
            };
            report.records_repointed += planned;
            report.drivers_removed += 1;
            losers.push(LoserPlan {
                driver_id: loser.id,
                repointed: planned,
                deleted: false,
            });
        }
        tracing::info!(
            "[dry run] '{}' ({}): keep {}, remove {} ({} records to repoint)",
            key.name,
            key.fleet,
            survivor.id,
            losers.len(),
            losers.iter().map(|l| l.repointed).sum::<u64>()
        );
        GroupPlan {
            key,
            survivor: survivor.id,
            losers,
            applied: false,
        }
    }

    async fn merge_group(
        &self,
        key: DuplicateKey,
        members: &[Driver],
        report: &mut ConsolidationReport,
    ) -> GroupPlan {
        let survivor = &members[0];
        let mut losers: Vec<LoserPlan> = Vec::with_capacity(members.len() - 1);

        // Repoint every loser first; a single failure keeps the whole group.
        for loser in &members[1..] {
            match self.records.repoint_associations(loser.id, survivor.id).await {
                Ok(count) => {
                    report.records_repointed += count;
                    losers.push(LoserPlan {
                        driver_id: loser.id,
                        repointed: count,
                        deleted: false,
                    });
                }
                Err(error) => {
                    tracing::error!(
                        "❌ '{}' ({}): {}; no duplicates removed",
                        key.name,
                        key.fleet,
                        CorrelationError::persistence_for_driver(loser.id, error)
                    );
                    report.failures += 1;
                    for skipped in &members[1 + losers.len()..] {
                        losers.push(LoserPlan {
                            driver_id: skipped.id,
                            repointed: 0,
                            deleted: false,
                        });
                    }
                    return GroupPlan {
                        key,
                        survivor: survivor.id,
                        losers,
                        applied: false,
                    };
                }
            }
        }

        let mut applied = true;
        for loser in losers.iter_mut() {
            match self.roster.delete_driver(loser.driver_id).await {
                Ok(()) => {
                    loser.deleted = true;
                    report.drivers_removed += 1;
                }
                Err(error) => {
                    tracing::warn!(
                        "{}",
                        CorrelationError::persistence_for_driver(loser.driver_id, error)
                    );
                    report.failures += 1;
                    applied = false;
                }
            }
        }

        tracing::info!(
            "✓ '{}' ({}): kept {}, removed {}/{} ({} records repointed)",
            key.name,
            key.fleet,
            survivor.id,
            losers.iter().filter(|l| l.deleted).count(),
            losers.len(),
            losers.iter().map(|l| l.repointed).sum::<u64>()
        );
        GroupPlan {
            key,
            survivor: survivor.id,
            losers,
            applied,
        }
    }
}
