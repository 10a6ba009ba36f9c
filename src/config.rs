//! Memoization settings loaded from JSON
//!
//! The timeout is kept as a raw JSON value and validated with the same rules as the
//! positional `memoize` arguments, so `{"timeout": "1s"}` is rejected with
//! "timeout must be a number".

use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::memo::{timeout_from_value, MemoizeError};

/// Default timeout for cached results, in milliseconds
pub const DEFAULT_TIMEOUT_MS: u64 = 1000;

/// Errors that can occur when loading a config file
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file could not be read
    #[error("Failed to read config: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not valid JSON for a config
    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// A value is present but invalid
    #[error("Invalid config: {0}")]
    Invalid(#[from] MemoizeError),
}

/// Settings for a memoized wrapper
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoizeConfig {
    /// Milliseconds a cached result stays valid
    #[serde(default = "default_timeout")]
    pub timeout: Value,
}

fn default_timeout() -> Value {
    Value::from(DEFAULT_TIMEOUT_MS)
}

impl Default for MemoizeConfig {
    fn default() -> Self {
        Self {
            timeout: default_timeout(),
        }
    }
}

impl MemoizeConfig {
    /// Creates a config with the given timeout in milliseconds
    pub fn with_timeout_ms(millis: u64) -> Self {
        Self {
            timeout: Value::from(millis),
        }
    }

    /// Parses and validates a config from a JSON string
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.timeout()?;
        Ok(config)
    }

    /// Reads and validates a config file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    /// The validated timeout
    pub fn timeout(&self) -> Result<Duration, MemoizeError> {
        timeout_from_value(&self.timeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_default_config() {
        let config = MemoizeConfig::default();
        assert_eq!(config.timeout().unwrap(), Duration::from_millis(DEFAULT_TIMEOUT_MS));
    }

    #[test]
    fn test_missing_timeout_uses_default() {
        let config = MemoizeConfig::from_json("{}").unwrap();
        assert_eq!(config, MemoizeConfig::default());
    }

    #[test]
    fn test_numeric_timeout() {
        let config = MemoizeConfig::from_json(r#"{"timeout": 250}"#).unwrap();
        assert_eq!(config.timeout().unwrap(), Duration::from_millis(250));
        assert_eq!(config, MemoizeConfig::with_timeout_ms(250));
    }

    #[test]
    fn test_non_numeric_timeout_is_rejected() {
        let err = MemoizeConfig::from_json(r#"{"timeout": "1s"}"#).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(MemoizeError::InvalidTimeout)));
        assert!(err.to_string().contains("timeout must be a number"));
    }

    #[test]
    fn test_malformed_json_is_rejected() {
        let err = MemoizeConfig::from_json("{timeout").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        write!(file, r#"{{"timeout": 5000}}"#).expect("Failed to write config");

        let config = MemoizeConfig::load(file.path()).expect("Config should load");
        assert_eq!(config.timeout().unwrap(), Duration::from_secs(5));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::TempDir::new().expect("Failed to create temp directory");
        let err = MemoizeConfig::load(&dir.path().join("missing.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io(_)));
    }
}
