use crate::models::TelemetrySource;
use thiserror::Error;
use uuid::Uuid;

/// Errors raised by the roster and external-record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Database-related errors.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
    /// The store refused the operation because it would break referential integrity.
    #[error("Conflict: {0}")]
    Conflict(String),
    /// The store could not be reached or rejected the call.
    #[error("Store unavailable: {0}")]
    Unavailable(String),
    /// Error with context chain for better debugging.
    #[error("{context}: {source}")]
    WithContext {
        /// The underlying source of the error.
        source: Box<StoreError>,
        /// Additional context message.
        context: String,
    },
}

/// Error taxonomy of the correlation engine.
///
/// Only the fatal categories ever leave [`crate::correlation::CorrelationRunner::run`]
/// or [`crate::consolidation::Consolidator::consolidate`]. Per-record
/// persistence failures are folded into the reports instead.
#[derive(Debug, Error)]
pub enum CorrelationError {
    /// Invalid run options or store connection settings. Raised before any work starts.
    #[error("Configuration error: {0}")]
    Configuration(String),
    /// The roster snapshot could not be loaded.
    #[error("Roster load failed: {0}")]
    RosterLoad(#[source] StoreError),
    /// A page of external records could not be fetched.
    #[error("Fetching unresolved {feed} records failed: {error}")]
    Fetch {
        feed: TelemetrySource,
        #[source]
        error: StoreError,
    },
    /// A single association write, repoint or delete failed.
    #[error("Persistence failed for {target}: {error}")]
    Persistence {
        target: String,
        #[source]
        error: StoreError,
    },
}

impl CorrelationError {
    pub fn persistence_for_record(source: TelemetrySource, id: i64, error: StoreError) -> Self {
        CorrelationError::Persistence {
            target: format!("{} record {}", source, id),
            error,
        }
    }

    pub fn persistence_for_driver(id: Uuid, error: StoreError) -> Self {
        CorrelationError::Persistence {
            target: format!("driver {}", id),
            error,
        }
    }

    /// Whether the error aborts a run.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, CorrelationError::Persistence { .. })
    }
}

/// Extension trait for adding context to errors.
/// Similar to `anyhow::Context` but for our `StoreError` type.
pub trait ResultExt<T> {
    /// Add context to an error.
    ///
    /// # Arguments
    ///
    /// * `context` - The context message to add.
    fn context(self, context: impl Into<String>) -> Result<T, StoreError>;

    /// Add context lazily (only evaluated on error).
    fn with_context<F>(self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> String;
}

impl<T> ResultExt<T> for Result<T, StoreError> {
    fn context(self, context: impl Into<String>) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::WithContext {
            source: Box::new(e),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| StoreError::WithContext {
            source: Box::new(e),
            context: f(),
        })
    }
}

/// Extension for sqlx::Error to add context
impl<T> ResultExt<T> for Result<T, sqlx::Error> {
    fn context(self, context: impl Into<String>) -> Result<T, StoreError> {
        self.map_err(|e| StoreError::WithContext {
            source: Box::new(StoreError::Database(e)),
            context: context.into(),
        })
    }

    fn with_context<F>(self, f: F) -> Result<T, StoreError>
    where
        F: FnOnce() -> String,
    {
        self.map_err(|e| StoreError::WithContext {
            source: Box::new(StoreError::Database(e)),
            context: f(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_context_wraps_message() {
        let result: Result<(), StoreError> = Err(StoreError::Unavailable("timeout".into()));
        let err = result.context("loading roster").unwrap_err();
        assert_eq!(err.to_string(), "loading roster: Store unavailable: timeout");
    }

    #[test]
    fn test_with_context_is_lazy_on_success() {
        let result: Result<u8, StoreError> = Ok(7);
        let value = result
            .with_context(|| panic!("context must not be built on success"))
            .unwrap();
        assert_eq!(value, 7);
    }

    #[test]
    fn test_only_persistence_is_recoverable() {
        let persistence = CorrelationError::persistence_for_record(
            TelemetrySource::GpsTrip,
            12,
            StoreError::Unavailable("down".into()),
        );
        assert!(!persistence.is_fatal());
        assert!(persistence.to_string().contains("gps_trip record 12"));

        assert!(CorrelationError::Configuration("bad".into()).is_fatal());
        assert!(CorrelationError::RosterLoad(StoreError::Unavailable("x".into())).is_fatal());
    }
}
