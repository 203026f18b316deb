//! Correlation runner: resolves driver names on unresolved telemetry records
//!
//! Workflow per run:
//! 1. Validate the run options
//! 2. Load the roster snapshot once
//! 3. Page through unresolved records of each selected source (keyset paging)
//! 4. Match each record and persist accepted associations with a conditional update
//! 5. Fold every per-record outcome into a `RunReport`
//!
//! Per-record write failures are counted and skipped; only configuration,
//! roster and page-fetch failures abort a run.
use crate::errors::{CorrelationError, StoreError};
use crate::matcher::{Matcher, MatcherConfig, RosterSnapshot};
use crate::models::{Association, ExternalRecord, MatchMethod, TelemetrySource};
use crate::normalize::normalize;
use crate::repository::{DateWindow, PageRequest, RecordStore, RosterFilter, RosterStore, WriteOutcome};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub const DEFAULT_BATCH_SIZE: usize = 500;
pub const MAX_BATCH_SIZE: usize = 10_000;
pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;
/// How many distinct unmatched names a report keeps.
const UNMATCHED_SAMPLE_LIMIT: usize = 25;

/// Options for one correlation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    /// Records fetched per page.
    pub batch_size: usize,
    /// Matches below this confidence are discarded, never persisted. Also
    /// lowers the matcher's fuzzy acceptance floor when set beneath it.
    pub min_confidence: f64,
    /// Compute and report matches without writing them.
    pub dry_run: bool,
    /// Only persist matches that resolve to this roster driver. Matching
    /// still sees the whole roster.
    pub driver_id: Option<Uuid>,
    /// Only process this feed.
    pub source: Option<TelemetrySource>,
    /// Only process records that occurred inside this window.
    pub window: Option<DateWindow>,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            batch_size: DEFAULT_BATCH_SIZE,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
            dry_run: false,
            driver_id: None,
            source: None,
            window: None,
        }
    }
}

impl RunConfig {
    pub fn validate(&self) -> Result<(), CorrelationError> {
        if self.batch_size == 0 || self.batch_size > MAX_BATCH_SIZE {
            return Err(CorrelationError::Configuration(format!(
                "batch size must be between 1 and {}, got {}",
                MAX_BATCH_SIZE, self.batch_size
            )));
        }
        if !(0.0..=1.0).contains(&self.min_confidence) {
            return Err(CorrelationError::Configuration(format!(
                "min confidence must be within [0, 1], got {}",
                self.min_confidence
            )));
        }
        if let Some(window) = &self.window {
            if !window.is_valid() {
                return Err(CorrelationError::Configuration(
                    "date window start must be before its end".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Sources this run walks, in a fixed order.
    pub fn sources(&self) -> Vec<TelemetrySource> {
        match self.source {
            Some(source) => vec![source],
            None => TelemetrySource::ALL.to_vec(),
        }
    }
}

/// What happened to a single record.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// Association written.
    Persisted(MatchMethod),
    /// Association computed in dry-run mode and not written.
    DryRun(MatchMethod),
    /// Another writer resolved the record between fetch and write.
    Conflict,
    /// A match was found but its confidence is under the run's floor.
    BelowThreshold,
    /// The best match is a driver outside the run's single-driver scope.
    OutOfScope,
    /// No acceptable roster candidate. Carries the normalized name.
    NoMatch(String),
    /// The write failed; the record stays unresolved for the next run.
    Failed,
}

/// A normalized external name that found no match, with how often it was seen.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnmatchedName {
    pub name: String,
    pub occurrences: u64,
}

/// Aggregated counts for one run.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunReport {
    pub dry_run: bool,
    pub roster_size: usize,
    /// Records examined.
    pub scanned: u64,
    /// Matches written to the store.
    pub persisted: u64,
    /// Matches that a non-dry run would have written.
    pub would_persist: u64,
    pub below_threshold: u64,
    pub no_match: u64,
    pub failed: u64,
    pub conflicts: u64,
    /// Matches left untouched because they resolve to another driver than the one in scope.
    pub out_of_scope: u64,
    /// Accepted matches by method.
    pub by_method: BTreeMap<MatchMethod, u64>,
    /// Records examined per source.
    pub by_source: BTreeMap<TelemetrySource, u64>,
    /// Most frequent names without a match.
    pub unmatched_names: Vec<UnmatchedName>,
    /// The run stopped early on request.
    pub cancelled: bool,
    #[serde(skip)]
    unmatched_tally: HashMap<String, u64>,
}

impl RunReport {
    pub fn new(dry_run: bool) -> Self {
        Self {
            dry_run,
            ..Self::default()
        }
    }

    /// Fold one record outcome into the report.
    pub fn record(&mut self, source: TelemetrySource, outcome: &RecordOutcome) {
        self.scanned += 1;
        *self.by_source.entry(source).or_default() += 1;
        match outcome {
            RecordOutcome::Persisted(method) => {
                self.persisted += 1;
                *self.by_method.entry(*method).or_default() += 1;
            }
            RecordOutcome::DryRun(method) => {
                self.would_persist += 1;
                *self.by_method.entry(*method).or_default() += 1;
            }
            RecordOutcome::Conflict => self.conflicts += 1,
            RecordOutcome::BelowThreshold => self.below_threshold += 1,
            RecordOutcome::OutOfScope => self.out_of_scope += 1,
            RecordOutcome::NoMatch(name) => {
                self.no_match += 1;
                if !name.is_empty() {
                    *self.unmatched_tally.entry(name.clone()).or_default() += 1;
                }
            }
            RecordOutcome::Failed => self.failed += 1,
        }
    }

    /// Accepted matches, written or not.
    pub fn matched(&self) -> u64 {
        self.persisted + self.would_persist
    }

    /// Keep only the most frequent unmatched names.
    fn finish(&mut self) {
        let mut names: Vec<UnmatchedName> = self
            .unmatched_tally
            .drain()
            .map(|(name, occurrences)| UnmatchedName { name, occurrences })
            .collect();
        names.sort_by(|a, b| b.occurrences.cmp(&a.occurrences).then_with(|| a.name.cmp(&b.name)));
        names.truncate(UNMATCHED_SAMPLE_LIMIT);
        self.unmatched_names = names;
    }
}

/// Walks the unresolved records of one source page by page.
pub struct UnresolvedPages<'a> {
    store: &'a dyn RecordStore,
    source: TelemetrySource,
    request: PageRequest,
    exhausted: bool,
}

impl<'a> UnresolvedPages<'a> {
    pub fn new(
        store: &'a dyn RecordStore,
        source: TelemetrySource,
        batch_size: usize,
        window: Option<DateWindow>,
    ) -> Self {
        Self {
            store,
            source,
            request: PageRequest {
                after: None,
                limit: batch_size,
                window,
            },
            exhausted: false,
        }
    }

    /// Next non-empty page, or `None` once the store returns nothing more.
    pub async fn next_page(&mut self) -> Result<Option<Vec<ExternalRecord>>, StoreError> {
        if self.exhausted {
            return Ok(None);
        }
        let page = self.store.list_unresolved(self.source, &self.request).await?;
        match page.last() {
            Some(last) => {
                self.request.after = Some(last.id);
                Ok(Some(page))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }
}

/// Batch job resolving free-text driver names against the roster.
pub struct CorrelationRunner {
    roster: Arc<dyn RosterStore>,
    records: Arc<dyn RecordStore>,
    matcher_config: MatcherConfig,
    cancel: CancellationToken,
}

impl CorrelationRunner {
    pub fn new(
        roster: Arc<dyn RosterStore>,
        records: Arc<dyn RecordStore>,
        matcher_config: MatcherConfig,
    ) -> Self {
        Self {
            roster,
            records,
            matcher_config,
            cancel: CancellationToken::new(),
        }
    }

    /// Stop the run between records once `token` is cancelled.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Run one correlation pass.
    ///
    /// Re-running after a partial or complete run only touches records that
    /// are still unresolved.
    pub async fn run(&self, config: &RunConfig) -> Result<RunReport, CorrelationError> {
        config.validate()?;

        let drivers = self
            .roster
            .list_drivers(&RosterFilter::default())
            .await
            .map_err(CorrelationError::RosterLoad)?;

        if let Some(driver_id) = config.driver_id {
            if !drivers.iter().any(|d| d.id == driver_id) {
                return Err(CorrelationError::Configuration(format!(
                    "driver {} is not on the roster",
                    driver_id
                )));
            }
        }
        if drivers.is_empty() {
            tracing::warn!("Roster is empty; no record can be matched");
        }

        let snapshot = Arc::new(RosterSnapshot::new(drivers));
        let matcher_config = MatcherConfig {
            fuzzy_threshold: self.matcher_config.fuzzy_threshold.min(config.min_confidence),
            ..self.matcher_config.clone()
        };
        let matcher = Matcher::new(snapshot, matcher_config);

        let mut report = RunReport::new(config.dry_run);
        report.roster_size = matcher.roster().len();
        tracing::info!(
            "Starting correlation run (roster: {} drivers, batch size: {}, min confidence: {}, dry run: {})",
            report.roster_size,
            config.batch_size,
            config.min_confidence,
            config.dry_run
        );

        'sources: for source in config.sources() {
            let total = match self
                .records
                .count_unresolved(source, config.window.as_ref())
                .await
            {
                Ok(total) => Some(total),
                Err(e) => {
                    tracing::debug!("Could not count unresolved {} records: {}", source, e);
                    None
                }
            };
            match total {
                Some(total) => tracing::info!("{}: {} unresolved records", source, total),
                None => tracing::info!("{}: processing unresolved records", source),
            }

            let mut pages =
                UnresolvedPages::new(self.records.as_ref(), source, config.batch_size, config.window);
            let mut processed: u64 = 0;

            loop {
                if self.cancel.is_cancelled() {
                    report.cancelled = true;
                    break 'sources;
                }
                let page = match pages.next_page().await {
                    Ok(Some(page)) => page,
                    Ok(None) => break,
                    Err(error) => {
                        tracing::error!(
                            "❌ Failed to fetch {} records after {} processed: {}",
                            source,
                            processed,
                            error
                        );
                        return Err(CorrelationError::Fetch { feed: source, error });
                    }
                };

                for record in &page {
                    if self.cancel.is_cancelled() {
                        report.cancelled = true;
                        break 'sources;
                    }
                    let outcome = self.process_record(&matcher, record, config).await;
                    report.record(source, &outcome);
                    processed += 1;
                }

                match total {
                    Some(total) => tracing::info!(
                        "{}: processed {}/{} (persisted: {}, no match: {}, failed: {})",
                        source,
                        processed,
                        total,
                        report.persisted,
                        report.no_match,
                        report.failed
                    ),
                    None => tracing::info!("{}: processed {}", source, processed),
                }
            }
        }

        report.finish();

        if report.cancelled {
            tracing::warn!("Correlation run cancelled after {} records", report.scanned);
        }
        tracing::info!(
            "Correlation run complete: scanned {}, persisted {}, would persist {}, below threshold {}, no match {}, out of scope {}, conflicts {}, failed {}",
            report.scanned,
            report.persisted,
            report.would_persist,
            report.below_threshold,
            report.no_match,
            report.out_of_scope,
            report.conflicts,
            report.failed
        );

        Ok(report)
    }

    async fn process_record(
        &self,
        matcher: &Matcher,
        record: &ExternalRecord,
        config: &RunConfig,
    ) -> RecordOutcome {
        let Some(found) = matcher.find_best_match(
            record.raw_driver_name.as_deref(),
            record.employee_id.as_deref(),
            record.fleet_hint.as_deref(),
        ) else {
            return RecordOutcome::NoMatch(normalize(record.raw_driver_name.as_deref()));
        };

        if config.driver_id.is_some_and(|scope| scope != found.driver_id) {
            tracing::debug!(
                "{} record {}: best match {} is outside the driver scope",
                record.source,
                record.id,
                found.driver_id
            );
            return RecordOutcome::OutOfScope;
        }

        if found.confidence < config.min_confidence {
            tracing::debug!(
                "{} record {}: best match {} at {:.2} is below {:.2}",
                record.source,
                record.id,
                found.driver_id,
                found.confidence,
                config.min_confidence
            );
            return RecordOutcome::BelowThreshold;
        }

        if config.dry_run {
            return RecordOutcome::DryRun(found.method);
        }

        let association = Association::from_match(&found, Utc::now());
        match self
            .records
            .update_association(record.source, record.id, &association)
            .await
        {
            Ok(WriteOutcome::Applied) => RecordOutcome::Persisted(found.method),
            Ok(WriteOutcome::AlreadyResolved) => {
                tracing::debug!(
                    "{} record {} was resolved by another writer",
                    record.source,
                    record.id
                );
                RecordOutcome::Conflict
            }
            Err(error) => {
                let error = CorrelationError::persistence_for_record(record.source, record.id, error);
                tracing::warn!("{}", error);
                RecordOutcome::Failed
            }
        }
    }
}
