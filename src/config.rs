use crate::correlation::{RunConfig, DEFAULT_BATCH_SIZE, DEFAULT_MIN_CONFIDENCE, MAX_BATCH_SIZE};
use crate::matcher::{FleetHints, MatcherConfig, DEFAULT_FUZZY_THRESHOLD};

/// Process-level settings shared by the batch binaries.
#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub batch_size: usize,
    pub min_confidence: f64,
    pub fuzzy_threshold: f64,
    pub fleet_hints: FleetHints,
}

impl Config {
    pub fn from_env() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build the configuration from an arbitrary key lookup.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let config = Self {
            database_url: lookup("DATABASE_URL")
                .or_else(|| lookup("DB_URL"))
                .ok_or_else(|| {
                    anyhow::anyhow!("DATABASE_URL or DB_URL environment variable required")
                })
                .and_then(|url| {
                    if url.trim().is_empty() {
                        anyhow::bail!("DATABASE_URL cannot be empty");
                    }
                    if !url.starts_with("postgresql://") && !url.starts_with("postgres://") {
                        anyhow::bail!("DATABASE_URL must start with postgresql:// or postgres://");
                    }
                    Ok(url)
                })?,
            batch_size: match lookup("CORRELATION_BATCH_SIZE") {
                Some(raw) => raw
                    .trim()
                    .parse::<usize>()
                    .ok()
                    .filter(|n| (1..=MAX_BATCH_SIZE).contains(n))
                    .ok_or_else(|| {
                        anyhow::anyhow!(
                            "CORRELATION_BATCH_SIZE must be a number between 1 and {}",
                            MAX_BATCH_SIZE
                        )
                    })?,
                None => DEFAULT_BATCH_SIZE,
            },
            min_confidence: parse_unit_interval(
                lookup("CORRELATION_MIN_CONFIDENCE"),
                "CORRELATION_MIN_CONFIDENCE",
                DEFAULT_MIN_CONFIDENCE,
            )?,
            fuzzy_threshold: parse_unit_interval(
                lookup("CORRELATION_FUZZY_THRESHOLD"),
                "CORRELATION_FUZZY_THRESHOLD",
                DEFAULT_FUZZY_THRESHOLD,
            )?,
            fleet_hints: match lookup("FLEET_HINTS") {
                Some(raw) => FleetHints::parse(&raw)
                    .map_err(|e| anyhow::anyhow!("FLEET_HINTS is invalid: {}", e))?,
                None => FleetHints::default(),
            },
        };

        // Log successful configuration load (without credentials)
        tracing::info!("Configuration loaded successfully");
        tracing::debug!(
            "Database URL: {}...",
            config.database_url.chars().take(20).collect::<String>()
        );
        tracing::debug!(
            "Batch size: {}, min confidence: {}, fuzzy threshold: {}, fleet hints: {}",
            config.batch_size,
            config.min_confidence,
            config.fuzzy_threshold,
            config.fleet_hints.len()
        );

        Ok(config)
    }

    pub fn matcher_config(&self) -> MatcherConfig {
        MatcherConfig {
            fuzzy_threshold: self.fuzzy_threshold,
            fleet_hints: self.fleet_hints.clone(),
        }
    }

    /// Run options seeded from the environment; callers override per run.
    pub fn run_config(&self) -> RunConfig {
        RunConfig {
            batch_size: self.batch_size,
            min_confidence: self.min_confidence,
            ..RunConfig::default()
        }
    }
}

fn parse_unit_interval(raw: Option<String>, key: &str, default: f64) -> anyhow::Result<f64> {
    let Some(raw) = raw else {
        return Ok(default);
    };
    raw.trim()
        .parse::<f64>()
        .ok()
        .filter(|v| (0.0..=1.0).contains(v))
        .ok_or_else(|| anyhow::anyhow!("{} must be a number between 0 and 1", key))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_lookup(lookup(&[("DATABASE_URL", "postgres://localhost/fleet")]))
            .unwrap();
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
        assert_eq!(config.min_confidence, DEFAULT_MIN_CONFIDENCE);
        assert_eq!(config.fuzzy_threshold, DEFAULT_FUZZY_THRESHOLD);
        assert!(config.fleet_hints.is_empty());
        assert!(config.run_config().validate().is_ok());
    }

    #[test]
    fn test_db_url_fallback_and_scheme() {
        assert!(Config::from_lookup(lookup(&[("DB_URL", "postgresql://db/x")])).is_ok());
        assert!(Config::from_lookup(lookup(&[("DATABASE_URL", "mysql://db/x")])).is_err());
        assert!(Config::from_lookup(lookup(&[])).is_err());
    }

    #[test]
    fn test_rejects_out_of_range_values() {
        let base = ("DATABASE_URL", "postgres://localhost/fleet");
        assert!(Config::from_lookup(lookup(&[base, ("CORRELATION_MIN_CONFIDENCE", "1.2")])).is_err());
        assert!(Config::from_lookup(lookup(&[base, ("CORRELATION_FUZZY_THRESHOLD", "-0.1")])).is_err());
        assert!(Config::from_lookup(lookup(&[base, ("CORRELATION_BATCH_SIZE", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[base, ("CORRELATION_BATCH_SIZE", "lots")])).is_err());
        assert!(Config::from_lookup(lookup(&[base, ("FLEET_HINTS", "nope")])).is_err());
    }

    #[test]
    fn test_overrides() {
        let config = Config::from_lookup(lookup(&[
            ("DATABASE_URL", "postgres://localhost/fleet"),
            ("CORRELATION_BATCH_SIZE", "1000"),
            ("CORRELATION_MIN_CONFIDENCE", "0.8"),
            ("FLEET_HINTS", "GSF=Great Southern Fuels"),
        ]))
        .unwrap();
        assert_eq!(config.run_config().batch_size, 1000);
        assert_eq!(config.run_config().min_confidence, 0.8);
        assert_eq!(
            config.matcher_config().fleet_hints.resolve("gsf"),
            "great southern fuels"
        );
    }
}
