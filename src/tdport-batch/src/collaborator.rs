//! Typed boundary to the external session-format collaborator.
//!
//! The converter never touches either session encoding itself. It drives
//! three capabilities, each behind a trait so that the real bridge and test
//! doubles are interchangeable:
//! - [`SessionLoader`] reads a `tdata` directory
//! - [`DesktopSession`] exposes the loaded accounts and converts them
//! - [`TargetClient`] is the live client bound to the produced session file

use std::fmt;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

// ============================================================================
// Values exchanged with the collaborator
// ============================================================================

/// How the loader should interpret the `tdata` directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LoadMode {
    /// The current on-disk layout.
    Standard,
    /// Older desktop client layouts.
    Legacy,
}

impl fmt::Display for LoadMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Standard => f.write_str("standard"),
            Self::Legacy => f.write_str("legacy"),
        }
    }
}

/// Result of reading a `tdata` directory.
///
/// An empty or unrecognised directory is an expected condition and is
/// reported as a value, never as an error.
#[derive(Debug)]
pub enum LoadOutcome<D> {
    /// At least one account was read.
    Loaded(D),
    /// The directory was readable but held no account.
    NotLoaded,
    /// The directory could not be read in the requested mode.
    Malformed(String),
}

/// Whether conversion reuses the authenticated state or forces a new login.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionFlag {
    UseCurrentSession,
    CreateNewSession,
}

/// One account found in a `tdata` directory.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccountInfo {
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default)]
    pub label: Option<String>,
}

/// Identity of the account behind a converted session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SelfIdentity {
    pub id: i64,
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub phone: Option<String>,
}

impl SelfIdentity {
    /// Human readable name, falling back to the username and then the id.
    pub fn display_name(&self) -> String {
        let full = [self.first_name.as_deref(), self.last_name.as_deref()]
            .into_iter()
            .flatten()
            .filter(|part| !part.is_empty())
            .collect::<Vec<_>>()
            .join(" ");

        if !full.is_empty() {
            full
        } else if let Some(username) = self.username.as_deref() {
            format!("@{username}")
        } else {
            self.id.to_string()
        }
    }
}

/// Failure reported by the collaborator.
#[derive(Error, Debug)]
pub enum CollaboratorError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Protocol error: {0}")]
    Protocol(String),
    #[error("No answer within {0:?}")]
    Timeout(Duration),
    #[error("{0}")]
    Rejected(String),
}

// ============================================================================
// Capabilities
// ============================================================================

/// Reads `tdata` directories.
#[async_trait]
pub trait SessionLoader: Send + Sync {
    /// Loaded desktop session type.
    type Desktop: DesktopSession;

    /// Load the directory in the given mode.
    async fn load(&self, tdata: &Path, mode: LoadMode) -> LoadOutcome<Self::Desktop>;
}

/// A loaded desktop session.
#[async_trait]
pub trait DesktopSession: Send + Sync {
    /// Accounts read from the directory.
    fn accounts(&self) -> &[AccountInfo];

    /// True when at least one account was read.
    fn is_loaded(&self) -> bool {
        !self.accounts().is_empty()
    }

    /// Convert into a client bound to `session`, producing the file there.
    async fn to_client(
        &self,
        session: &Path,
        flag: SessionFlag,
    ) -> Result<Box<dyn TargetClient>, CollaboratorError>;
}

/// Live client for a converted session.
#[async_trait]
pub trait TargetClient: Send {
    /// Open the transport connection.
    async fn connect(&mut self) -> Result<(), CollaboratorError>;

    /// Whether the session is logged in.
    async fn is_authorized(&mut self) -> Result<bool, CollaboratorError>;

    /// Fetch the account's own identity.
    async fn get_me(&mut self) -> Result<SelfIdentity, CollaboratorError>;

    /// Close the connection and release the client.
    async fn disconnect(&mut self) -> Result<(), CollaboratorError>;
}
