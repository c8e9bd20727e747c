//! Work items of a batch run.

use std::path::{Path, PathBuf};

use crate::existence::session_path;

/// A `tdata` directory holding one account's authentication state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSession {
    /// Name of the account directory, used to name the output.
    pub identifier: String,
    /// The `tdata` directory itself.
    pub path: PathBuf,
}

impl SourceSession {
    pub fn new(identifier: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            identifier: identifier.into(),
            path: path.into(),
        }
    }
}

/// One source session paired with its output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversionJob {
    pub source: SourceSession,
    pub output: PathBuf,
}

impl ConversionJob {
    /// Build the job writing to `{output_dir}/{identifier}.session`.
    pub fn new(source: SourceSession, output_dir: &Path) -> Self {
        let output = session_path(output_dir, &source.identifier);
        Self { source, output }
    }

    pub fn identifier(&self) -> &str {
        &self.source.identifier
    }
}

/// Map every discovered session to its job.
pub fn plan_jobs(sessions: Vec<SourceSession>, output_dir: &Path) -> Vec<ConversionJob> {
    sessions
        .into_iter()
        .map(|source| ConversionJob::new(source, output_dir))
        .collect()
}
