//! Engine configuration
//!
//! `EngineConfig` carries the tunables of an editing session: search debounce,
//! result limits and the defaults applied when data is missing. Every field is
//! `#[serde(default)]` so partial configuration files deserialize cleanly.
//!
//! Resolution order: defaults, then the JSON file (if present), then
//! environment overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

const CONFIG_FILE: &str = "config.json";

/// Upper bound for the search debounce; longer waits make the search row feel broken
const MAX_SEARCH_DEBOUNCE_MS: u64 = 10_000;

pub const ENV_SEARCH_DEBOUNCE_MS: &str = "ORCAPLAN_SEARCH_DEBOUNCE_MS";
pub const ENV_SEARCH_RESULT_LIMIT: &str = "ORCAPLAN_SEARCH_RESULT_LIMIT";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse configuration file {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_json::Error,
    },

    #[error("Invalid value for {var}: {value}")]
    InvalidEnv { var: &'static str, value: String },

    #[error("Invalid configuration: {0}")]
    Invalid(String),

    #[error("Cannot determine home directory")]
    NoHomeDirectory,
}

/// Tunables for budget editing sessions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Quiet period after the last query keystroke before the catalog is queried
    pub search_debounce_ms: u64,

    /// Maximum number of candidates requested from the catalog
    pub search_result_limit: usize,

    /// Markup used when a stored budget has no rate (no markup by default)
    pub default_bdi_rate_percent: f64,

    /// Price base assigned to compositions whose candidate names none
    pub default_source_base: String,

    /// Quantity pre-filled when a composition search starts
    pub default_quantity: f64,

    /// Description of the synthetic stage collecting orphaned items
    pub orphan_stage_description: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            search_debounce_ms: 500,
            search_result_limit: 10,
            default_bdi_rate_percent: 0.0,
            default_source_base: "SINAPI".to_string(),
            default_quantity: 1.0,
            orphan_stage_description: "Compositions without an assigned Stage".to_string(),
        }
    }
}

impl EngineConfig {
    pub fn search_debounce(&self) -> Duration {
        Duration::from_millis(self.search_debounce_ms)
    }

    /// Default configuration file location: `~/.orcaplan/config.json`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let home_dir = dirs::home_dir().ok_or(ConfigError::NoHomeDirectory)?;
        Ok(home_dir.join(".orcaplan").join(CONFIG_FILE))
    }

    /// Load configuration from a JSON file
    ///
    /// A missing file yields the defaults; a malformed or invalid one is an error.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!("No configuration at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self =
            serde_json::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Apply environment variable overrides on top of `self`
    pub fn from_env(self) -> Result<Self, ConfigError> {
        self.with_overrides(|var| std::env::var(var).ok())
    }

    fn with_overrides(
        mut self,
        lookup: impl Fn(&'static str) -> Option<String>,
    ) -> Result<Self, ConfigError> {
        if let Some(value) = lookup(ENV_SEARCH_DEBOUNCE_MS) {
            self.search_debounce_ms =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_SEARCH_DEBOUNCE_MS,
                    value: value.clone(),
                })?;
        }
        if let Some(value) = lookup(ENV_SEARCH_RESULT_LIMIT) {
            self.search_result_limit =
                value.trim().parse().map_err(|_| ConfigError::InvalidEnv {
                    var: ENV_SEARCH_RESULT_LIMIT,
                    value: value.clone(),
                })?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.search_debounce_ms > MAX_SEARCH_DEBOUNCE_MS {
            return Err(ConfigError::Invalid(format!(
                "search_debounce_ms cannot exceed {}",
                MAX_SEARCH_DEBOUNCE_MS
            )));
        }

        if self.search_result_limit == 0 {
            return Err(ConfigError::Invalid(
                "search_result_limit must be greater than 0".to_string(),
            ));
        }

        if !self.default_bdi_rate_percent.is_finite() || self.default_bdi_rate_percent < 0.0 {
            return Err(ConfigError::Invalid(
                "default_bdi_rate_percent must be a non-negative number".to_string(),
            ));
        }

        if !self.default_quantity.is_finite() || self.default_quantity <= 0.0 {
            return Err(ConfigError::Invalid(
                "default_quantity must be greater than 0".to_string(),
            ));
        }

        if self.default_source_base.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_source_base cannot be empty".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.search_debounce(), Duration::from_millis(500));
        assert_eq!(config.search_result_limit, 10);
        assert_eq!(config.default_bdi_rate_percent, 0.0);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let temp = TempDir::new().unwrap();
        let config = EngineConfig::load(temp.path().join("absent.json")).unwrap();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_partial_file_keeps_other_defaults() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        let mut file = std::fs::File::create(&path).unwrap();
        write!(file, r#"{{"search_debounce_ms": 250, "default_source_base": "SICRO"}}"#).unwrap();

        let config = EngineConfig::load(&path).unwrap();
        assert_eq!(config.search_debounce_ms, 250);
        assert_eq!(config.default_source_base, "SICRO");
        assert_eq!(config.search_result_limit, 10);
    }

    #[test]
    fn test_malformed_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join(CONFIG_FILE);
        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            EngineConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let config = EngineConfig {
            search_result_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = EngineConfig {
            default_quantity: -1.0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_env_overrides() {
        let config = EngineConfig::default()
            .with_overrides(|var| match var {
                ENV_SEARCH_DEBOUNCE_MS => Some("120".to_string()),
                ENV_SEARCH_RESULT_LIMIT => Some("25".to_string()),
                _ => None,
            })
            .unwrap();
        assert_eq!(config.search_debounce_ms, 120);
        assert_eq!(config.search_result_limit, 25);

        let err = EngineConfig::default()
            .with_overrides(|var| (var == ENV_SEARCH_DEBOUNCE_MS).then(|| "soon".to_string()))
            .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidEnv { .. }));
    }
}
