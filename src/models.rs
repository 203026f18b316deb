use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

// ============ Roster Models ============

/// Employment status of a roster entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DriverStatus {
    Active,
    Inactive,
    /// Any other status label the roster carries (e.g. "On Leave").
    Other(String),
}

impl DriverStatus {
    pub fn is_active(&self) -> bool {
        matches!(self, DriverStatus::Active)
    }
}

impl From<&str> for DriverStatus {
    fn from(raw: &str) -> Self {
        match raw.trim().to_ascii_lowercase().as_str() {
            "active" => DriverStatus::Active,
            "inactive" => DriverStatus::Inactive,
            _ => DriverStatus::Other(raw.trim().to_string()),
        }
    }
}

impl fmt::Display for DriverStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DriverStatus::Active => f.write_str("Active"),
            DriverStatus::Inactive => f.write_str("Inactive"),
            DriverStatus::Other(label) => f.write_str(label),
        }
    }
}

/// Canonical driver identity from the internal roster.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    /// Stable identifier.
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    /// Payroll/HR employee number, when known.
    pub employee_id: Option<String>,
    /// Fleet affiliation as recorded on the roster.
    pub fleet: String,
    pub depot: Option<String>,
    pub status: DriverStatus,
    pub created_at: DateTime<Utc>,
}

impl Driver {
    /// First and last name joined by a single space, unnormalized.
    pub fn full_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

/// Raw `drivers` row as stored in Postgres.
#[derive(Debug, Clone, FromRow)]
pub struct DriverRow {
    pub id: Uuid,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub employee_id: Option<String>,
    pub fleet: Option<String>,
    pub depot: Option<String>,
    pub status: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<DriverRow> for Driver {
    fn from(row: DriverRow) -> Self {
        Driver {
            id: row.id,
            first_name: row.first_name.unwrap_or_default(),
            last_name: row.last_name.unwrap_or_default(),
            employee_id: row.employee_id.filter(|e| !e.trim().is_empty()),
            fleet: row.fleet.unwrap_or_default(),
            depot: row.depot,
            status: row
                .status
                .as_deref()
                .map(DriverStatus::from)
                .unwrap_or(DriverStatus::Other(String::new())),
            created_at: row.created_at,
        }
    }
}

// ============ Association Models ============

/// How an association between an external record and a driver was established.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchMethod {
    EmployeeIdMatch,
    ExactMatch,
    FuzzyMatch,
    /// Written by an operator outside the engine; never overwritten.
    ManualAssignment,
}

impl MatchMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchMethod::EmployeeIdMatch => "employee_id_match",
            MatchMethod::ExactMatch => "exact_match",
            MatchMethod::FuzzyMatch => "fuzzy_match",
            MatchMethod::ManualAssignment => "manual_assignment",
        }
    }
}

impl fmt::Display for MatchMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MatchMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "employee_id_match" => Ok(MatchMethod::EmployeeIdMatch),
            "exact_match" => Ok(MatchMethod::ExactMatch),
            "fuzzy_match" => Ok(MatchMethod::FuzzyMatch),
            "manual_assignment" => Ok(MatchMethod::ManualAssignment),
            other => Err(format!("unknown match method '{}'", other)),
        }
    }
}

/// Result of matching one external name against the roster.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Match {
    pub driver_id: Uuid,
    /// Confidence in `[0, 1]`.
    pub confidence: f64,
    pub method: MatchMethod,
}

/// Link from an external record to a roster driver.
///
/// Either all four parts are present or the record has no association at all.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Association {
    pub driver_id: Uuid,
    pub confidence: f64,
    pub method: MatchMethod,
    pub updated_at: DateTime<Utc>,
}

impl Association {
    pub fn from_match(m: &Match, updated_at: DateTime<Utc>) -> Self {
        Self {
            driver_id: m.driver_id,
            confidence: m.confidence,
            method: m.method,
            updated_at,
        }
    }

    /// Rebuild an association from nullable columns. A partially populated set
    /// of columns yields `None`.
    pub fn from_columns(
        driver_id: Option<Uuid>,
        confidence: Option<f64>,
        method: Option<&str>,
        updated_at: Option<DateTime<Utc>>,
    ) -> Option<Self> {
        Some(Self {
            driver_id: driver_id?,
            confidence: confidence?,
            method: method?.parse().ok()?,
            updated_at: updated_at?,
        })
    }
}

// ============ External Records ============

/// The three third-party telemetry feeds carrying free-text driver names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TelemetrySource {
    /// Video-based safety event system.
    VideoSafety,
    /// Vehicle guardian fatigue/distraction system.
    Guardian,
    /// GPS trip history.
    GpsTrip,
}

impl TelemetrySource {
    pub const ALL: [TelemetrySource; 3] = [
        TelemetrySource::VideoSafety,
        TelemetrySource::Guardian,
        TelemetrySource::GpsTrip,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TelemetrySource::VideoSafety => "video_safety",
            TelemetrySource::Guardian => "guardian",
            TelemetrySource::GpsTrip => "gps_trip",
        }
    }
}

impl fmt::Display for TelemetrySource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TelemetrySource {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "video_safety" | "video" => Ok(TelemetrySource::VideoSafety),
            "guardian" => Ok(TelemetrySource::Guardian),
            "gps_trip" | "gps" => Ok(TelemetrySource::GpsTrip),
            other => Err(format!(
                "unknown telemetry source '{}' (expected video_safety, guardian or gps_trip)",
                other
            )),
        }
    }
}

/// Canonical shape of a row from any telemetry feed, as seen by the matcher.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExternalRecord {
    pub id: i64,
    pub source: TelemetrySource,
    /// Free text; may be missing, blank or a placeholder.
    pub raw_driver_name: Option<String>,
    pub employee_id: Option<String>,
    /// Carrier/fleet tag used to narrow candidates.
    pub fleet_hint: Option<String>,
    /// When the event or trip happened.
    pub occurred_at: Option<DateTime<Utc>>,
    pub association: Option<Association>,
}

impl ExternalRecord {
    pub fn is_resolved(&self) -> bool {
        self.association.is_some()
    }

    pub fn has_driver_name(&self) -> bool {
        self.raw_driver_name
            .as_deref()
            .is_some_and(|name| !name.trim().is_empty())
    }
}

/// `video_safety_events` row.
#[derive(Debug, Clone, FromRow)]
pub struct VideoSafetyEventRow {
    pub id: i64,
    pub driver_name: Option<String>,
    pub employee_id: Option<String>,
    pub carrier: Option<String>,
    pub event_datetime: Option<DateTime<Utc>>,
    pub driver_id: Option<Uuid>,
    pub driver_association_confidence: Option<f64>,
    pub driver_association_method: Option<String>,
    pub driver_association_updated_at: Option<DateTime<Utc>>,
}

impl From<VideoSafetyEventRow> for ExternalRecord {
    fn from(row: VideoSafetyEventRow) -> Self {
        ExternalRecord {
            id: row.id,
            source: TelemetrySource::VideoSafety,
            raw_driver_name: row.driver_name,
            employee_id: row.employee_id,
            fleet_hint: row.carrier,
            occurred_at: row.event_datetime,
            association: Association::from_columns(
                row.driver_id,
                row.driver_association_confidence,
                row.driver_association_method.as_deref(),
                row.driver_association_updated_at,
            ),
        }
    }
}

/// `guardian_events` row. The guardian feed carries no employee number.
#[derive(Debug, Clone, FromRow)]
pub struct GuardianEventRow {
    pub id: i64,
    pub driver_name: Option<String>,
    pub fleet: Option<String>,
    pub detection_time: Option<DateTime<Utc>>,
    pub driver_id: Option<Uuid>,
    pub driver_association_confidence: Option<f64>,
    pub driver_association_method: Option<String>,
    pub driver_association_updated_at: Option<DateTime<Utc>>,
}

impl From<GuardianEventRow> for ExternalRecord {
    fn from(row: GuardianEventRow) -> Self {
        ExternalRecord {
            id: row.id,
            source: TelemetrySource::Guardian,
            raw_driver_name: row.driver_name,
            employee_id: None,
            fleet_hint: row.fleet,
            occurred_at: row.detection_time,
            association: Association::from_columns(
                row.driver_id,
                row.driver_association_confidence,
                row.driver_association_method.as_deref(),
                row.driver_association_updated_at,
            ),
        }
    }
}

/// `gps_trip_history` row.
#[derive(Debug, Clone, FromRow)]
pub struct GpsTripRow {
    pub id: i64,
    pub driver_name: Option<String>,
    pub driver_employee_id: Option<String>,
    pub group_name: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub driver_id: Option<Uuid>,
    pub driver_association_confidence: Option<f64>,
    pub driver_association_method: Option<String>,
    pub driver_association_updated_at: Option<DateTime<Utc>>,
}

impl From<GpsTripRow> for ExternalRecord {
    fn from(row: GpsTripRow) -> Self {
        ExternalRecord {
            id: row.id,
            source: TelemetrySource::GpsTrip,
            raw_driver_name: row.driver_name,
            employee_id: row.driver_employee_id,
            fleet_hint: row.group_name,
            occurred_at: row.start_time,
            association: Association::from_columns(
                row.driver_id,
                row.driver_association_confidence,
                row.driver_association_method.as_deref(),
                row.driver_association_updated_at,
            ),
        }
    }
}
