/// Service configuration loader - parses floodwatch.toml
///
/// Keeps cycle timing, provider settings and the rule file location out of
/// the code so they can be tuned without recompiling the service. Secrets
/// (database URL, weather API key) come from the environment / `.env`.

use serde::Deserialize;
use std::env;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::analysis::rainfall::AggregationPolicy;
use crate::rules::{self, RuleTable};

/// Default service configuration file, relative to the working directory.
pub const DEFAULT_CONFIG_PATH: &str = "floodwatch.toml";

/// Environment variable holding the OpenWeather API key.
pub const API_KEY_VAR: &str = "OPENWEATHER_API_KEY";

/// Errors raised while loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid risk rules: {0}")]
    InvalidRules(String),
    #[error("OPENWEATHER_API_KEY is not set. Copy .env.example to .env and add your OpenWeather API key")]
    MissingApiKey,
}

/// Service settings loaded from floodwatch.toml. Every field has a default,
/// so an empty file (or no file) yields a working configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Minutes between cycle starts.
    pub poll_interval_minutes: u64,
    /// Minimum spacing between consecutive weather API calls.
    pub pacing_delay_ms: u64,
    /// Per-request timeout for the weather API.
    pub fetch_timeout_secs: u64,
    pub weather_api_url: String,
    /// Risk rule file; the built-in table is used when unset.
    pub rules_path: Option<String>,
    /// Run a risk scoring pass after each aggregation.
    pub score_after_cycle: bool,
    pub aggregation_policy: AggregationPolicy,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            poll_interval_minutes: 30,
            pacing_delay_ms: 1000,
            fetch_timeout_secs: 10,
            weather_api_url: crate::ingest::openweather::OPENWEATHER_BASE_URL.to_string(),
            rules_path: None,
            score_after_cycle: false,
            aggregation_policy: AggregationPolicy::default(),
        }
    }
}

impl ServiceConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_minutes * 60)
    }

    pub fn pacing_delay(&self) -> Duration {
        Duration::from_millis(self.pacing_delay_ms)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Loads the configured rule table, or the built-in one if no path is set.
    pub fn load_rules(&self) -> Result<RuleTable, ConfigError> {
        match &self.rules_path {
            Some(path) => rules::load_rules(path),
            None => Ok(RuleTable::default()),
        }
    }
}

/// Loads service configuration from a TOML file.
pub fn load_config(path: impl AsRef<Path>) -> Result<ServiceConfig, ConfigError> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
        path: path.display().to_string(),
        source: e,
    })?;

    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        path: path.display().to_string(),
        source: e,
    })
}

/// Loads floodwatch.toml from the working directory if present,
/// otherwise returns the defaults.
pub fn load_config_or_default() -> Result<ServiceConfig, ConfigError> {
    if Path::new(DEFAULT_CONFIG_PATH).exists() {
        load_config(DEFAULT_CONFIG_PATH)
    } else {
        log::info!("{} not found, using default settings", DEFAULT_CONFIG_PATH);
        Ok(ServiceConfig::default())
    }
}

/// Reads the weather API key from the environment (loading `.env` first).
pub fn api_key_from_env() -> Result<String, ConfigError> {
    dotenv::dotenv().ok();

    match env::var(API_KEY_VAR) {
        Ok(key) if !key.trim().is_empty() => Ok(key),
        _ => Err(ConfigError::MissingApiKey),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_match_documented_values() {
        let config = ServiceConfig::default();
        assert_eq!(config.poll_interval(), Duration::from_secs(30 * 60));
        assert_eq!(config.pacing_delay(), Duration::from_secs(1));
        assert!(!config.score_after_cycle);
        assert_eq!(config.aggregation_policy, AggregationPolicy::Abort);
    }

    #[test]
    fn test_shipped_config_loads() {
        let config = load_config(DEFAULT_CONFIG_PATH).expect("floodwatch.toml should parse");
        assert_eq!(config.poll_interval_minutes, 30);
        assert_eq!(config.rules_path.as_deref(), Some("risk_rules.toml"));
        assert!(config.load_rules().is_ok());
    }

    #[test]
    fn test_partial_file_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_minutes = 5").unwrap();
        writeln!(file, "aggregation_policy = \"continue\"").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.poll_interval_minutes, 5);
        assert_eq!(config.pacing_delay_ms, 1000);
        assert_eq!(config.aggregation_policy, AggregationPolicy::Continue);
        assert!(config.rules_path.is_none());
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let result = load_config("does/not/exist.toml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_malformed_file_is_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "poll_interval_minutes = \"soon\"").unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Parse { path, .. }) => {
                assert_eq!(path, file.path().display().to_string())
            }
            other => panic!("expected parse error, got {:?}", other),
        }
    }
}
