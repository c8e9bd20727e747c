//! Command-line arguments.

use std::path::PathBuf;
use std::str::FromStr;

use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use tdport_batch::DiscoveryMode;
use tracing::level_filters::LevelFilter;

/// Verbosity of the log output.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, ValueEnum, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    /// Includes helper stderr and per-step progress
    Debug,
    Trace,
}

impl From<LogLevel> for LevelFilter {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Error => LevelFilter::ERROR,
            LogLevel::Warn => LevelFilter::WARN,
            LogLevel::Info => LevelFilter::INFO,
            LogLevel::Debug => LevelFilter::DEBUG,
            LogLevel::Trace => LevelFilter::TRACE,
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    /// Case-insensitive, also accepting `warning`, for values read from the environment.
    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let normalized = value.trim().to_ascii_lowercase();
        if normalized == "warning" {
            return Ok(LogLevel::Warn);
        }
        <Self as ValueEnum>::from_str(&normalized, true)
            .map_err(|_| format!("unknown log level '{}'", value.trim()))
    }
}

/// How the input directory is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// One account if the input holds a tdata folder, else a folder of accounts
    Auto,
    /// The input is one account
    Single,
    /// The input is a folder of accounts
    Multi,
}

impl From<ModeArg> for DiscoveryMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Auto => DiscoveryMode::Auto,
            ModeArg::Single => DiscoveryMode::Single,
            ModeArg::Multi => DiscoveryMode::Multi,
        }
    }
}

/// Convert desktop tdata folders into client session files.
#[derive(Debug, Parser)]
#[command(name = "tdport")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Account directory, or a directory of account directories
    #[arg(value_name = "INPUT")]
    pub input: PathBuf,

    /// Directory receiving the `<identifier>.session` files [default: output]
    #[arg(short = 'o', long = "output", env = "TDPORT_OUTPUT", value_name = "DIR")]
    pub output: Option<PathBuf>,

    /// How to interpret INPUT [default: auto]
    #[arg(long = "mode", value_enum)]
    pub mode: Option<ModeArg>,

    /// TOML configuration file
    #[arg(short = 'c', long = "config", env = "TDPORT_CONFIG", value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Per-account timeout in seconds, 0 disables it
    #[arg(long = "timeout", value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Maximum number of accounts converted at once [default: all]
    #[arg(short = 'j', long = "jobs", value_name = "N")]
    pub jobs: Option<usize>,

    /// Converter helper program
    #[arg(long = "bridge", env = "TDPORT_BRIDGE", value_name = "CMD")]
    pub bridge: Option<String>,

    /// Argument passed to the converter helper (repeatable)
    #[arg(long = "bridge-arg", value_name = "ARG", allow_hyphen_values = true)]
    pub bridge_args: Vec<String>,

    /// Log level [default: info]
    #[arg(long = "log-level", value_enum, help_heading = "Logging")]
    pub log_level: Option<LogLevel>,

    /// Enable verbose output (same as --log-level debug)
    #[arg(short = 'v', long = "verbose", help_heading = "Logging")]
    pub verbose: bool,

    /// Also write plain-text logs to this file
    #[arg(long = "log-file", value_name = "PATH", help_heading = "Logging")]
    pub log_file: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long = "json-logs", help_heading = "Logging")]
    pub json_logs: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_full_command_line() {
        let cli = Cli::try_parse_from([
            "tdport",
            "accounts",
            "-o",
            "sessions",
            "--mode",
            "multi",
            "-j",
            "4",
            "--bridge",
            "python3",
            "--bridge-arg",
            "helper.py",
            "--bridge-arg",
            "--quiet",
            "-v",
        ])
        .unwrap();

        assert_eq!(cli.input, PathBuf::from("accounts"));
        assert_eq!(cli.output, Some(PathBuf::from("sessions")));
        assert_eq!(cli.mode, Some(ModeArg::Multi));
        assert_eq!(cli.jobs, Some(4));
        assert_eq!(cli.bridge.as_deref(), Some("python3"));
        assert_eq!(cli.bridge_args, vec!["helper.py", "--quiet"]);
        assert!(cli.verbose);
    }

    #[test]
    fn test_input_is_required() {
        assert!(Cli::try_parse_from(["tdport"]).is_err());
    }

    #[test]
    fn test_log_level_from_env_value() {
        assert_eq!("WARNING".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert_eq!(" Debug ".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LevelFilter::from(LogLevel::Trace), LevelFilter::TRACE);
    }
}
