//! Tiered matching of one external driver name against a roster snapshot.
//!
//! Tiers, in strict priority order:
//! 1. employee number equality (confidence `1.0`)
//! 2. exact normalized full-name equality (confidence `0.95`)
//! 3. fuzzy scoring: the best of direct edit-distance similarity, reversed
//!    name order (discounted), token overlap and nickname equivalence,
//!    accepted above a threshold and capped below the exact tier.
//!
//! Candidates are narrowed by the record's fleet hint when that hint selects
//! at least one roster entry.

use crate::aliases;
use crate::models::{Driver, Match, MatchMethod};
use crate::normalize::{is_placeholder, normalize, normalize_str, tokens};
use crate::similarity::similarity_normalized;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

pub const EMPLOYEE_ID_CONFIDENCE: f64 = 1.0;
pub const EXACT_MATCH_CONFIDENCE: f64 = 0.95;
/// Ceiling applied to any fuzzy score that is returned.
pub const FUZZY_CONFIDENCE_CAP: f64 = 0.9;
/// Multiplier applied when the score came from swapping first and last tokens.
pub const REVERSED_ORDER_DISCOUNT: f64 = 0.95;
pub const TOKEN_OVERLAP_SCORE: f64 = 0.85;
pub const ALIAS_SCORE: f64 = 0.8;
pub const DEFAULT_FUZZY_THRESHOLD: f64 = 0.7;
/// Number of shared tokens needed for the token-overlap signal.
const MIN_SHARED_TOKENS: usize = 2;

/// Maps carrier/fleet tags used by the telemetry feeds onto roster fleet names.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FleetHints {
    by_hint: HashMap<String, String>,
}

impl FleetHints {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a tag. Both sides are stored normalized.
    pub fn with(mut self, hint: &str, fleet: &str) -> Self {
        self.insert(hint, fleet);
        self
    }

    pub fn insert(&mut self, hint: &str, fleet: &str) {
        self.by_hint.insert(normalize_str(hint), normalize_str(fleet));
    }

    /// Parse `hint=Fleet Name` pairs separated by commas.
    pub fn parse(raw: &str) -> Result<Self, String> {
        let mut hints = Self::new();
        for pair in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
            let (hint, fleet) = pair
                .split_once('=')
                .ok_or_else(|| format!("fleet hint '{}' must look like TAG=Fleet Name", pair))?;
            if normalize_str(hint).is_empty() || normalize_str(fleet).is_empty() {
                return Err(format!("fleet hint '{}' has an empty side", pair));
            }
            hints.insert(hint, fleet);
        }
        Ok(hints)
    }

    /// Normalized roster fleet name a hint refers to. Unknown hints resolve to themselves.
    pub fn resolve(&self, hint: &str) -> String {
        let key = normalize_str(hint);
        self.by_hint.get(&key).cloned().unwrap_or(key)
    }

    pub fn len(&self) -> usize {
        self.by_hint.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_hint.is_empty()
    }
}

/// Tunables for the matcher.
#[derive(Debug, Clone, PartialEq)]
pub struct MatcherConfig {
    /// Minimum fuzzy score accepted as a match.
    pub fuzzy_threshold: f64,
    pub fleet_hints: FleetHints,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            fuzzy_threshold: DEFAULT_FUZZY_THRESHOLD,
            fleet_hints: FleetHints::default(),
        }
    }
}

/// A roster driver with its comparison keys precomputed.
#[derive(Debug, Clone)]
pub struct RosterEntry {
    pub driver: Driver,
    full_name: String,
    tokens: Vec<String>,
    fleet: String,
    employee_id: Option<String>,
}

impl RosterEntry {
    fn new(driver: Driver) -> Self {
        let full_name = normalize_str(&driver.full_name());
        let tokens = tokens(&full_name).into_iter().map(str::to_string).collect();
        let fleet = normalize_str(&driver.fleet);
        let employee_id = driver
            .employee_id
            .as_deref()
            .map(str::trim)
            .filter(|e| !e.is_empty())
            .map(str::to_string);
        Self {
            driver,
            full_name,
            tokens,
            fleet,
            employee_id,
        }
    }

    /// Normalized `first_name last_name`.
    pub fn full_name(&self) -> &str {
        &self.full_name
    }

    pub fn tokens(&self) -> &[String] {
        &self.tokens
    }
}

/// Read-only roster loaded once per run.
#[derive(Debug, Clone, Default)]
pub struct RosterSnapshot {
    entries: Vec<RosterEntry>,
}

impl RosterSnapshot {
    pub fn new(drivers: Vec<Driver>) -> Self {
        Self {
            entries: drivers.into_iter().map(RosterEntry::new).collect(),
        }
    }

    pub fn entries(&self) -> &[RosterEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose fleet equals the hinted fleet, or the whole roster when
    /// there is no hint or the hint selects nobody.
    fn candidates<'a>(&'a self, fleet_hint: Option<&str>, hints: &FleetHints) -> Vec<&'a RosterEntry> {
        if let Some(hint) = fleet_hint.filter(|h| !h.trim().is_empty()) {
            let fleet = hints.resolve(hint);
            let narrowed: Vec<&RosterEntry> =
                self.entries.iter().filter(|e| e.fleet == fleet).collect();
            if !narrowed.is_empty() {
                return narrowed;
            }
            tracing::trace!("Fleet hint '{}' matched no drivers, using full roster", hint);
        }
        self.entries.iter().collect()
    }
}

/// Pure matcher over a shared roster snapshot. Cheap to clone and safe to
/// use from several tasks at once.
#[derive(Debug, Clone)]
pub struct Matcher {
    roster: Arc<RosterSnapshot>,
    config: MatcherConfig,
}

impl Matcher {
    pub fn new(roster: Arc<RosterSnapshot>, config: MatcherConfig) -> Self {
        Self { roster, config }
    }

    pub fn roster(&self) -> &RosterSnapshot {
        &self.roster
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    /// Best roster match for an external name, or `None`.
    ///
    /// Blank names never match. Placeholder names ("unknown", "no driver", ...)
    /// can still resolve through the employee number but never by name.
    pub fn find_best_match(
        &self,
        external_name: Option<&str>,
        employee_id: Option<&str>,
        fleet_hint: Option<&str>,
    ) -> Option<Match> {
        let name = normalize(external_name);
        if name.is_empty() {
            return None;
        }

        let candidates = self.roster.candidates(fleet_hint, &self.config.fleet_hints);

        if let Some(employee_id) = employee_id.map(str::trim).filter(|e| !e.is_empty()) {
            if let Some(entry) = candidates
                .iter()
                .find(|c| c.employee_id.as_deref() == Some(employee_id))
            {
                return Some(Match {
                    driver_id: entry.driver.id,
                    confidence: EMPLOYEE_ID_CONFIDENCE,
                    method: MatchMethod::EmployeeIdMatch,
                });
            }
        }

        if is_placeholder(&name) {
            return None;
        }

        if let Some(entry) = candidates.iter().find(|c| c.full_name == name) {
            return Some(Match {
                driver_id: entry.driver.id,
                confidence: EXACT_MATCH_CONFIDENCE,
                method: MatchMethod::ExactMatch,
            });
        }

        let external = PreparedName::new(&name);
        let mut best: Option<(&RosterEntry, f64)> = None;
        for candidate in &candidates {
            let score = fuzzy_score(&external, candidate);
            if best.map_or(true, |(_, top)| score > top) {
                best = Some((*candidate, score));
            }
        }

        let (entry, score) = best?;
        if score < self.config.fuzzy_threshold {
            return None;
        }
        Some(Match {
            driver_id: entry.driver.id,
            confidence: score.min(FUZZY_CONFIDENCE_CAP),
            method: MatchMethod::FuzzyMatch,
        })
    }
}

/// External name with its derived forms computed once per record.
struct PreparedName<'a> {
    full: &'a str,
    tokens: Vec<&'a str>,
    /// Distinct tokens, so a repeated word counts once toward overlap.
    distinct: HashSet<&'a str>,
    reversed: Option<String>,
}

impl<'a> PreparedName<'a> {
    fn new(full: &'a str) -> Self {
        let tokens = tokens(full);
        let reversed = (tokens.len() >= 2).then(|| {
            let mut swapped = tokens.clone();
            let last = swapped.len() - 1;
            swapped.swap(0, last);
            swapped.join(" ")
        });
        Self {
            full,
            distinct: tokens.iter().copied().collect(),
            tokens,
            reversed,
        }
    }
}

/// Uncapped fuzzy score: the maximum of the individual signals.
fn fuzzy_score(external: &PreparedName<'_>, candidate: &RosterEntry) -> f64 {
    let mut score = similarity_normalized(external.full, &candidate.full_name);

    if let Some(reversed) = &external.reversed {
        let reordered =
            similarity_normalized(reversed, &candidate.full_name) * REVERSED_ORDER_DISCOUNT;
        score = score.max(reordered);
    }

    let shared = external
        .distinct
        .iter()
        .filter(|t| candidate.tokens.iter().any(|c| c.as_str() == **t))
        .count();
    if shared >= MIN_SHARED_TOKENS {
        score = score.max(TOKEN_OVERLAP_SCORE);
    }

    if aliases::names_equivalent(&external.tokens, &candidate.tokens) {
        score = score.max(ALIAS_SCORE);
    }

    score
}

/// Match against a plain driver list with the default configuration.
pub fn find_best_match(
    external_name: Option<&str>,
    employee_id: Option<&str>,
    fleet_hint: Option<&str>,
    roster: &[Driver],
) -> Option<Match> {
    let snapshot = Arc::new(RosterSnapshot::new(roster.to_vec()));
    Matcher::new(snapshot, MatcherConfig::default()).find_best_match(
        external_name,
        employee_id,
        fleet_hint,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DriverStatus;
    use chrono::{TimeZone, Utc};
    use uuid::Uuid;

    fn driver(first: &str, last: &str, fleet: &str) -> Driver {
        Driver {
            id: Uuid::new_v4(),
            first_name: first.to_string(),
            last_name: last.to_string(),
            employee_id: None,
            fleet: fleet.to_string(),
            depot: None,
            status: DriverStatus::Active,
            created_at: Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_exact_match_after_normalization() {
        let john = driver("John", "Smith", "Fleet A");
        let m = find_best_match(Some("john   SMITH"), None, None, &[john.clone()]).unwrap();
        assert_eq!(m.driver_id, john.id);
        assert_eq!(m.confidence, EXACT_MATCH_CONFIDENCE);
        assert_eq!(m.method, MatchMethod::ExactMatch);
    }

    #[test]
    fn test_reversed_order_is_capped() {
        let john = driver("John", "Smith", "Fleet A");
        let m = find_best_match(Some("Smith John"), None, None, &[john.clone()]).unwrap();
        assert_eq!(m.driver_id, john.id);
        assert_eq!(m.method, MatchMethod::FuzzyMatch);
        assert_eq!(m.confidence, FUZZY_CONFIDENCE_CAP);
    }

    #[test]
    fn test_nickname_match() {
        let michael = driver("Michael", "Jones", "Fleet A");
        let m = find_best_match(Some("Mike Jones"), None, None, &[michael.clone()]).unwrap();
        assert_eq!(m.driver_id, michael.id);
        assert_eq!(m.method, MatchMethod::FuzzyMatch);
        assert!((m.confidence - ALIAS_SCORE).abs() < 1e-9, "got {}", m.confidence);
    }

    #[test]
    fn test_nickname_on_roster_side() {
        let mike = driver("Mike", "Jones", "Fleet A");
        let m = find_best_match(Some("Michael Jones"), None, None, &[mike.clone()]).unwrap();
        assert_eq!(m.driver_id, mike.id);
        assert!((m.confidence - ALIAS_SCORE).abs() < 1e-9);
    }

    #[test]
    fn test_unrelated_name_has_no_match() {
        let roster = [driver("John", "Smith", "Fleet A"), driver("Jane", "Doe", "Fleet A")];
        assert!(find_best_match(Some("Someone Unrelated"), None, None, &roster).is_none());
    }

    #[test]
    fn test_employee_id_wins_over_names() {
        let mut target = driver("Zed", "Quux", "Fleet A");
        target.employee_id = Some("E-100".to_string());
        let exact = driver("John", "Smith", "Fleet A");
        let m = find_best_match(Some("John Smith"), Some(" E-100 "), None, &[exact, target.clone()])
            .unwrap();
        assert_eq!(m.driver_id, target.id);
        assert_eq!(m.confidence, EMPLOYEE_ID_CONFIDENCE);
        assert_eq!(m.method, MatchMethod::EmployeeIdMatch);
    }

    #[test]
    fn test_unknown_employee_id_falls_through_to_names() {
        let john = driver("John", "Smith", "Fleet A");
        let m = find_best_match(Some("John Smith"), Some("E-999"), None, &[john.clone()]).unwrap();
        assert_eq!(m.method, MatchMethod::ExactMatch);
    }

    #[test]
    fn test_blank_names_never_match() {
        let mut john = driver("John", "Smith", "Fleet A");
        john.employee_id = Some("E-1".to_string());
        let roster = [john];
        assert!(find_best_match(None, Some("E-1"), None, &roster).is_none());
        assert!(find_best_match(Some("   "), Some("E-1"), None, &roster).is_none());
    }

    #[test]
    fn test_placeholder_names_resolve_only_by_employee_id() {
        let mut john = driver("John", "Smith", "Fleet A");
        john.employee_id = Some("E-1".to_string());
        let unknown = driver("Unknown", "Driver", "Fleet A");
        let roster = [john.clone(), unknown];

        let m = find_best_match(Some("Unknown"), Some("E-1"), None, &roster).unwrap();
        assert_eq!(m.driver_id, john.id);
        assert_eq!(m.method, MatchMethod::EmployeeIdMatch);
        assert_eq!(m.confidence, EMPLOYEE_ID_CONFIDENCE);

        // Even a roster row literally named like the placeholder is not a name match
        assert!(find_best_match(Some("Unknown Driver"), None, None, &roster).is_none());
        assert!(find_best_match(Some("Unknown Driver"), Some("E-404"), None, &roster).is_none());
    }

    #[test]
    fn test_repeated_token_counts_once_for_overlap() {
        let john = driver("John", "Smith", "Fleet A");
        assert!(find_best_match(Some("John John"), None, None, &[john.clone()]).is_none());
        assert!(find_best_match(Some("Smith Smith Smith"), None, None, &[john]).is_none());
    }

    #[test]
    fn test_roster_entry_precomputes_tokens() {
        let snapshot = RosterSnapshot::new(vec![driver("  Mary-Ann ", "O'Neil  Smith", "A")]);
        let entry = &snapshot.entries()[0];
        assert_eq!(entry.full_name(), "maryann oneil smith");
        assert_eq!(entry.tokens(), ["maryann", "oneil", "smith"]);
    }

    #[test]
    fn test_token_overlap_signal() {
        let jane = driver("Jane Marie", "Doe", "Fleet A");
        // "jane doe" vs "jane marie doe": both external tokens are on the roster
        let m = find_best_match(Some("Jane Doe"), None, None, &[jane.clone()]).unwrap();
        assert_eq!(m.driver_id, jane.id);
        assert!((m.confidence - TOKEN_OVERLAP_SCORE).abs() < 1e-9, "got {}", m.confidence);
    }

    #[test]
    fn test_fleet_hint_narrows_candidates() {
        let in_a = driver("Jane", "Doe", "Fleet A");
        let in_b = driver("Jane", "Doe", "Fleet B");
        let roster = vec![in_a.clone(), in_b.clone()];
        let config = MatcherConfig {
            fleet_hints: FleetHints::new().with("FB", "Fleet B"),
            ..MatcherConfig::default()
        };
        let matcher = Matcher::new(Arc::new(RosterSnapshot::new(roster)), config);

        let m = matcher.find_best_match(Some("Jane Doe"), None, Some("fb")).unwrap();
        assert_eq!(m.driver_id, in_b.id);

        // A hint naming the fleet directly works without a table entry
        let m = matcher.find_best_match(Some("Jane Doe"), None, Some("FLEET A")).unwrap();
        assert_eq!(m.driver_id, in_a.id);
    }

    #[test]
    fn test_fleet_hint_without_candidates_uses_full_roster() {
        let jane = driver("Jane", "Doe", "Fleet A");
        let m = find_best_match(Some("Jane Doe"), None, Some("Nonexistent"), &[jane.clone()]).unwrap();
        assert_eq!(m.driver_id, jane.id);
        assert_eq!(m.method, MatchMethod::ExactMatch);
    }

    #[test]
    fn test_fuzzy_picks_closest_candidate() {
        let jon = driver("Jonathon", "Smyth", "Fleet A");
        let john = driver("John", "Smith", "Fleet A");
        let m = find_best_match(Some("Jon Smith"), None, None, &[jon, john.clone()]).unwrap();
        assert_eq!(m.driver_id, john.id);
        assert_eq!(m.method, MatchMethod::FuzzyMatch);
        assert!(m.confidence < FUZZY_CONFIDENCE_CAP + f64::EPSILON);
        assert!(m.confidence >= DEFAULT_FUZZY_THRESHOLD);
    }

    #[test]
    fn test_threshold_is_configurable() {
        let john = driver("John", "Smith", "Fleet A");
        let strict = MatcherConfig {
            fuzzy_threshold: 0.95,
            ..MatcherConfig::default()
        };
        let matcher = Matcher::new(Arc::new(RosterSnapshot::new(vec![john])), strict);
        assert!(matcher.find_best_match(Some("Jon Smith"), None, None).is_none());
    }

    #[test]
    fn test_fleet_hints_parse() {
        let hints = FleetHints::parse("SMB=Stevemacs Bulk, gsf = Great Southern Fuels,").unwrap();
        assert_eq!(hints.len(), 2);
        assert_eq!(hints.resolve("smb"), "stevemacs bulk");
        assert_eq!(hints.resolve("G.S.F."), "great southern fuels");
        assert_eq!(hints.resolve("Other"), "other");
        assert!(FleetHints::parse("broken").is_err());
        assert!(FleetHints::parse("=Fleet").is_err());
        assert!(FleetHints::parse("").unwrap().is_empty());
    }
}
