//! Command-line interface parsing for the ttlmemo demo
//!
//! This module handles parsing of CLI arguments using clap and merges them with an
//! optional JSON config file into a [`DemoConfig`].

use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;
use thiserror::Error;

use crate::config::{ConfigError, MemoizeConfig};
use crate::memo::MemoizeError;

/// Error types for CLI argument handling
#[derive(Debug, Error)]
pub enum CliError {
    /// The config file could not be loaded
    #[error("Failed to load config '{path}': {source}")]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    /// The resulting settings are invalid
    #[error(transparent)]
    Invalid(#[from] MemoizeError),
}

/// ttlmemo - memoize a slow computation and watch its results expire
#[derive(Parser, Debug)]
#[command(name = "ttlmemo")]
#[command(about = "Memoize a slow computation with time-limited results")]
#[command(version)]
pub struct Cli {
    /// Milliseconds a cached result stays valid (overrides the config file)
    #[arg(long, value_name = "MS")]
    pub timeout: Option<u64>,

    /// Milliseconds of simulated work per computation
    #[arg(long, value_name = "MS", default_value_t = 50)]
    pub work: u64,

    /// JSON config file, e.g. {"timeout": 1000}
    #[arg(long, value_name = "PATH")]
    pub config: Option<PathBuf>,

    /// Key results by KEY + SUFFIX instead of the serialized arguments
    #[arg(long, value_name = "SUFFIX")]
    pub resolver: Option<String>,

    /// Keys to compute; each one is requested twice
    #[arg(value_name = "KEY", required = true)]
    pub keys: Vec<String>,
}

/// Settings for one demo run
#[derive(Debug, Clone, PartialEq)]
pub struct DemoConfig {
    /// How long results stay cached
    pub timeout: Duration,
    /// Simulated work per computation
    pub work: Duration,
    /// Resolver suffix, if keys are derived by a resolver
    pub resolver_suffix: Option<String>,
    /// Keys to request
    pub keys: Vec<String>,
}

impl DemoConfig {
    /// Creates a DemoConfig from parsed CLI arguments.
    ///
    /// The timeout comes from `--timeout`, then the config file, then the default.
    pub fn from_cli(cli: &Cli) -> Result<Self, CliError> {
        let file_config = match &cli.config {
            Some(path) => MemoizeConfig::load(path).map_err(|source| CliError::Config {
                path: path.display().to_string(),
                source,
            })?,
            None => MemoizeConfig::default(),
        };

        let timeout = match cli.timeout {
            Some(millis) => Duration::from_millis(millis),
            None => file_config.timeout()?,
        };

        Ok(Self {
            timeout,
            work: Duration::from_millis(cli.work),
            resolver_suffix: cli.resolver.clone(),
            keys: cli.keys.clone(),
        })
    }
}
