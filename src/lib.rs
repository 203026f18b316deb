//! Fleet Driver Correlation Library
//!
//! This library resolves free-text driver names found on telemetry records
//! (video safety events, guardian fatigue events, GPS trips) to drivers on the
//! fleet roster, and merges duplicate roster entries.
//!
//! # Modules
//!
//! - `core`: Matching and batch-job entry points.
//! - `data`: Data access layer.
//! - `obs`: Observability and logging.
//! - `aliases`: Nickname table.
//! - `config`: Configuration management.
//! - `consolidation`: Duplicate roster consolidation.
//! - `correlation`: Correlation runner and run report.
//! - `db`: Database connection and pool management.
//! - `db_storage`: Postgres implementation of the store traits.
//! - `errors`: Error handling types.
//! - `matcher`: Tiered name matching against a roster snapshot.
//! - `memory_store`: In-memory implementation of the store traits.
//! - `models`: Core data models.
//! - `normalize`: Name normalization.
//! - `repository`: Store traits consumed by the batch jobs.
//! - `similarity`: Edit-distance similarity.

pub mod core;
pub mod data;
pub mod obs;

// Re-export primary modules for shared use in tests and binaries
pub mod aliases;
pub mod config;
pub mod consolidation;
pub mod correlation;
pub mod db;
pub mod db_storage;
pub mod errors;
pub mod matcher;
pub mod memory_store;
pub mod models;
pub mod normalize;
pub mod repository;
pub mod similarity;
