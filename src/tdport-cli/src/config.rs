//! TOML configuration merged under the command line.
//!
//! ```toml
//! output_dir = "sessions"
//! source_dir_name = "tdata"
//! mode = "multi"
//! job_timeout_secs = 120
//! max_concurrency = 4
//! legacy_fallback = true
//! log_level = "info"
//!
//! [bridge]
//! command = "python3"
//! args = ["tdport_helper.py"]
//! request_timeout_secs = 60
//! cwd = "/opt/tdport"
//!
//! [bridge.env]
//! TDPORT_API_ID = "2040"
//! ```

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tdport_batch::{DEFAULT_SOURCE_DIR, DiscoveryMode, DiscoveryOptions};
use tdport_bridge::{BridgeConfig, DEFAULT_REQUEST_TIMEOUT};
use thiserror::Error;

use crate::args::{Cli, LogLevel};

/// Errors raised while loading or validating the configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{}': {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse TOML in '{}': {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid configuration value for '{key}': {message}")]
    InvalidValue { key: &'static str, message: String },
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("output")
}

fn default_source_dir_name() -> String {
    DEFAULT_SOURCE_DIR.to_string()
}

fn default_true() -> bool {
    true
}

fn default_request_timeout_secs() -> u64 {
    DEFAULT_REQUEST_TIMEOUT.as_secs()
}

/// Converter helper settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BridgeSection {
    /// Program to execute.
    #[serde(default)]
    pub command: Option<String>,

    /// Program arguments.
    #[serde(default)]
    pub args: Vec<String>,

    /// Time to wait for each helper response.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    /// Working directory of the helper.
    #[serde(default)]
    pub cwd: Option<PathBuf>,

    /// Extra environment variables for the helper.
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Default for BridgeSection {
    fn default() -> Self {
        Self {
            command: None,
            args: Vec::new(),
            request_timeout_secs: default_request_timeout_secs(),
            cwd: None,
            env: HashMap::new(),
        }
    }
}

/// Effective settings of one run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Session folder looked up in each account directory.
    #[serde(default = "default_source_dir_name")]
    pub source_dir_name: String,

    #[serde(default)]
    pub mode: DiscoveryMode,

    /// Per-account timeout, 0 disables it.
    #[serde(default)]
    pub job_timeout_secs: u64,

    /// Unbounded when absent.
    #[serde(default)]
    pub max_concurrency: Option<usize>,

    /// Retry with the legacy layout when the standard one loads nothing.
    #[serde(default = "default_true")]
    pub legacy_fallback: bool,

    #[serde(default)]
    pub log_level: Option<LogLevel>,

    #[serde(default)]
    pub bridge: BridgeSection,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            source_dir_name: default_source_dir_name(),
            mode: DiscoveryMode::default(),
            job_timeout_secs: 0,
            max_concurrency: None,
            legacy_fallback: true,
            log_level: None,
            bridge: BridgeSection::default(),
        }
    }
}

impl Config {
    /// Read `path`, or return the defaults when no file is given.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let Some(path) = path else {
            return Ok(Self::default());
        };

        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        toml::from_str(content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Load the file named on the command line and apply the flags on top.
    pub fn resolve(cli: &Cli) -> Result<Self, ConfigError> {
        let mut config = Self::load(cli.config.as_deref())?;
        config.apply_cli(cli);
        config.validate()?;
        Ok(config)
    }

    /// Override file values with the ones given on the command line.
    pub fn apply_cli(&mut self, cli: &Cli) {
        if let Some(ref output) = cli.output {
            self.output_dir = output.clone();
        }
        if let Some(mode) = cli.mode {
            self.mode = mode.into();
        }
        if let Some(timeout) = cli.timeout {
            self.job_timeout_secs = timeout;
        }
        if let Some(jobs) = cli.jobs {
            self.max_concurrency = Some(jobs);
        }
        if let Some(ref bridge) = cli.bridge {
            self.bridge.command = Some(bridge.clone());
            self.bridge.args = cli.bridge_args.clone();
        } else if !cli.bridge_args.is_empty() {
            self.bridge.args = cli.bridge_args.clone();
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.source_dir_name.trim().is_empty() {
            return Err(ConfigError::InvalidValue {
                key: "source_dir_name",
                message: "must not be empty".to_string(),
            });
        }
        if self.max_concurrency == Some(0) {
            return Err(ConfigError::InvalidValue {
                key: "max_concurrency",
                message: "must be at least 1".to_string(),
            });
        }
        if self.bridge.request_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                key: "bridge.request_timeout_secs",
                message: "must be at least 1".to_string(),
            });
        }
        match self.bridge.command.as_deref() {
            Some(command) if !command.trim().is_empty() => Ok(()),
            _ => Err(ConfigError::InvalidValue {
                key: "bridge.command",
                message: "no converter helper configured (use --bridge or TDPORT_BRIDGE)"
                    .to_string(),
            }),
        }
    }

    pub fn job_timeout(&self) -> Option<Duration> {
        (self.job_timeout_secs > 0).then(|| Duration::from_secs(self.job_timeout_secs))
    }

    pub fn discovery_options(&self) -> DiscoveryOptions {
        DiscoveryOptions::default()
            .with_mode(self.mode)
            .with_source_dir_name(self.source_dir_name.clone())
    }

    pub fn bridge_config(&self) -> Result<BridgeConfig, ConfigError> {
        let command = self
            .bridge
            .command
            .clone()
            .ok_or_else(|| ConfigError::InvalidValue {
                key: "bridge.command",
                message: "no converter helper configured".to_string(),
            })?;

        let mut bridge = BridgeConfig::new(command, self.bridge.args.clone())
            .with_request_timeout(Duration::from_secs(self.bridge.request_timeout_secs));
        if let Some(ref cwd) = self.bridge.cwd {
            bridge = bridge.with_cwd(cwd);
        }
        for (key, value) in &self.bridge.env {
            bridge = bridge.with_env(key, value);
        }
        Ok(bridge)
    }
}
