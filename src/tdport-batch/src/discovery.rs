//! Discovery of account directories.
//!
//! A base path is either one account (it contains `tdata/` itself) or a
//! folder of accounts (its children contain `tdata/`). Entries without a
//! `tdata/` folder are skipped silently.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::job::SourceSession;
use crate::{BatchError, Result};

/// Name of the desktop client's session folder.
pub const DEFAULT_SOURCE_DIR: &str = "tdata";

/// Which layouts are accepted for the base path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    /// The base is one account if it holds the session folder, else a folder of accounts.
    #[default]
    Auto,
    /// The base is one account.
    Single,
    /// The base is a folder of accounts.
    Multi,
}

/// Discovery settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiscoveryOptions {
    /// Session folder looked up in each account directory.
    pub source_dir_name: String,
    pub mode: DiscoveryMode,
}

impl Default for DiscoveryOptions {
    fn default() -> Self {
        Self {
            source_dir_name: DEFAULT_SOURCE_DIR.to_string(),
            mode: DiscoveryMode::Auto,
        }
    }
}

impl DiscoveryOptions {
    pub fn with_mode(mut self, mode: DiscoveryMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn with_source_dir_name(mut self, name: impl Into<String>) -> Self {
        self.source_dir_name = name.into();
        self
    }

    fn source_dir(&self, account_dir: &Path) -> Option<PathBuf> {
        let candidate = account_dir.join(&self.source_dir_name);
        candidate.is_dir().then_some(candidate)
    }
}

/// Enumerate the source sessions under `base`, sorted by identifier.
pub fn discover(base: &Path, options: &DiscoveryOptions) -> Result<Vec<SourceSession>> {
    if !base.is_dir() {
        return Err(BatchError::NotFound(base.to_path_buf()));
    }

    let single = match options.mode {
        DiscoveryMode::Multi => None,
        DiscoveryMode::Auto | DiscoveryMode::Single => options.source_dir(base),
    };

    if let Some(tdata) = single {
        let identifier = base_identifier(base)?;
        debug!(identifier = %identifier, "Base directory is a single account");
        return Ok(vec![SourceSession::new(identifier, tdata)]);
    }

    if options.mode == DiscoveryMode::Single {
        debug!(
            "No {} folder in {}",
            options.source_dir_name,
            base.display()
        );
        return Ok(Vec::new());
    }

    let mut sessions = Vec::new();
    for entry in std::fs::read_dir(base)? {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!("Skipping unreadable entry in {}: {}", base.display(), e);
                continue;
            }
        };

        let path = entry.path();
        if !path.is_dir() {
            continue;
        }

        let Some(tdata) = options.source_dir(&path) else {
            debug!("Skipping {}: no {} folder", path.display(), options.source_dir_name);
            continue;
        };

        let identifier = entry.file_name().to_string_lossy().into_owned();
        sessions.push(SourceSession::new(identifier, tdata));
    }

    sessions.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    Ok(sessions)
}

/// Name of the base directory, resolved through `.` and trailing separators.
fn base_identifier(base: &Path) -> Result<String> {
    let resolved = base.canonicalize().unwrap_or_else(|_| base.to_path_buf());
    resolved
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .filter(|name| !name.is_empty())
        .ok_or_else(|| BatchError::NoIdentifier(base.to_path_buf()))
}
