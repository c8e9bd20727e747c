//! Tracing subscriber setup.

use std::fs::OpenOptions;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use tracing::Dispatch;
use tracing::level_filters::LevelFilter;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::{EnvFilter, Layer, Registry, fmt};

use crate::args::{Cli, LogLevel};

/// Environment variable holding a fallback log level.
pub const LOG_LEVEL_ENV: &str = "TDPORT_LOG_LEVEL";

/// Logging settings resolved from the command line, environment and config.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogSettings {
    pub level: LogLevel,
    pub json: bool,
    pub file: Option<PathBuf>,
}

impl LogSettings {
    /// `-v` wins over `--log-level`, then `TDPORT_LOG_LEVEL`, then the config file.
    pub fn resolve(cli: &Cli, configured: Option<LogLevel>) -> Self {
        let env_level = std::env::var(LOG_LEVEL_ENV)
            .ok()
            .and_then(|value| value.parse().ok());
        Self::from_sources(cli, env_level, configured)
    }

    fn from_sources(cli: &Cli, env_level: Option<LogLevel>, configured: Option<LogLevel>) -> Self {
        let level = if cli.verbose {
            LogLevel::Debug
        } else {
            cli.log_level
                .or(env_level)
                .or(configured)
                .unwrap_or_default()
        };

        Self {
            level,
            json: cli.json_logs,
            file: cli.log_file.clone(),
        }
    }

    fn filter(&self) -> EnvFilter {
        if std::env::var_os(EnvFilter::DEFAULT_ENV).is_some() {
            EnvFilter::from_default_env()
        } else {
            EnvFilter::default().add_directive(LevelFilter::from(self.level).into())
        }
    }
}

/// Keeps the file writer flushing until dropped.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Build the subscriber described by `settings` without installing it.
pub fn build(settings: &LogSettings) -> Result<(Dispatch, LogGuard)> {
    let mut layers: Vec<Box<dyn Layer<Registry> + Send + Sync>> = Vec::new();

    let stderr = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .with_target(false);
    layers.push(if settings.json {
        stderr.json().boxed()
    } else {
        stderr.boxed()
    });

    let mut file_guard = None;
    if let Some(ref path) = settings.file {
        let (writer, guard) = tracing_appender::non_blocking(open_log_file(path)?);
        layers.push(
            fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true)
                .boxed(),
        );
        file_guard = Some(guard);
    }

    let subscriber = tracing_subscriber::registry()
        .with(layers)
        .with(settings.filter());

    Ok((Dispatch::new(subscriber), LogGuard { _file: file_guard }))
}

/// Build the subscriber and install it as the process-wide default.
pub fn init(settings: &LogSettings) -> Result<(Dispatch, LogGuard)> {
    let (dispatch, guard) = build(settings)?;
    tracing::dispatcher::set_global_default(dispatch.clone())
        .context("Failed to install the log subscriber")?;
    Ok((dispatch, guard))
}

fn open_log_file(path: &Path) -> Result<std::fs::File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create log directory {}", parent.display()))?;
    }

    OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("Failed to open log file {}", path.display()))
}
