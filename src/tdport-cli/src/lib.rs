//! tdport command-line interface.
//!
//! - `args` - command-line definition
//! - `config` - TOML configuration merged under the flags
//! - `logging` - tracing subscriber setup
//! - `convert_cmd` - wires the helper bridge into the batch runner

pub mod args;
pub mod config;
pub mod convert_cmd;
pub mod logging;

pub use args::{Cli, LogLevel, ModeArg};
pub use config::{Config, ConfigError};
pub use logging::LogSettings;
