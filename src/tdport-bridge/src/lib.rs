//! Session converter backed by an external helper process.
//!
//! Each job spawns the configured helper and talks to it over stdio, one
//! JSON object per line. The helper owns both session formats and the
//! network client; this crate only forwards the calls made by
//! [`tdport_batch::Converter`].

pub mod loader;
pub mod process;
pub mod protocol;

pub use loader::{BridgeClient, BridgeDesktop, BridgeLoader};
pub use process::BridgeProcess;

use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use tdport_batch::CollaboratorError;
use thiserror::Error;

/// Default time to wait for one helper response.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// How to launch the helper.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Program to execute.
    pub command: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory.
    pub cwd: Option<PathBuf>,
    /// Extra environment variables.
    pub env: HashMap<String, String>,
    /// Time to wait for each response.
    pub request_timeout: Duration,
}

impl BridgeConfig {
    pub fn new(command: impl Into<String>, args: Vec<String>) -> Self {
        Self {
            command: command.into(),
            args,
            cwd: None,
            env: HashMap::new(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to start helper '{command}': {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid helper message: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Helper exited before answering")]
    Exited,
    #[error("Helper did not answer within {0:?}")]
    Timeout(Duration),
    #[error("Helper is no longer running")]
    Closed,
    #[error("{0}")]
    Rejected(String),
}

impl From<BridgeError> for CollaboratorError {
    fn from(err: BridgeError) -> Self {
        match err {
            BridgeError::Io(e) => CollaboratorError::Io(e),
            BridgeError::Timeout(limit) => CollaboratorError::Timeout(limit),
            BridgeError::Rejected(message) => CollaboratorError::Rejected(message),
            other => CollaboratorError::Protocol(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, BridgeError>;
