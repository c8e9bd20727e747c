//! Outcome of a batch run.

use std::path::PathBuf;

use crate::converter::{Conversion, ConvertError, ConvertedSession};

/// How one job ended.
#[derive(Debug)]
pub enum JobOutcome {
    Converted(ConvertedSession),
    /// The session file already existed.
    Skipped,
    Failed(ConvertError),
}

impl From<Result<Conversion, ConvertError>> for JobOutcome {
    fn from(result: Result<Conversion, ConvertError>) -> Self {
        match result {
            Ok(Conversion::Converted(session)) => Self::Converted(session),
            Ok(Conversion::Skipped { .. }) => Self::Skipped,
            Err(e) => Self::Failed(e),
        }
    }
}

/// Result of a single job.
#[derive(Debug)]
pub struct JobReport {
    pub identifier: String,
    pub output: PathBuf,
    pub outcome: JobOutcome,
}

impl JobReport {
    pub fn error(&self) -> Option<&ConvertError> {
        match &self.outcome {
            JobOutcome::Failed(e) => Some(e),
            _ => None,
        }
    }
}

/// Result of a batch run.
#[derive(Debug, Default)]
pub struct BatchReport {
    pub total: usize,
    pub converted: usize,
    pub skipped: usize,
    pub failed: usize,
    pub jobs: Vec<JobReport>,
}

impl BatchReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, job: JobReport) {
        self.total += 1;
        match job.outcome {
            JobOutcome::Converted(_) => self.converted += 1,
            JobOutcome::Skipped => self.skipped += 1,
            JobOutcome::Failed(_) => self.failed += 1,
        }
        self.jobs.push(job);
    }

    /// True when no job was attempted at all.
    pub fn is_empty(&self) -> bool {
        self.total == 0
    }

    /// True when jobs ran and none failed.
    pub fn is_success(&self) -> bool {
        !self.is_empty() && self.failed == 0
    }

    pub fn get(&self, identifier: &str) -> Option<&JobReport> {
        self.jobs.iter().find(|job| job.identifier == identifier)
    }

    pub fn failures(&self) -> impl Iterator<Item = &JobReport> {
        self.jobs.iter().filter(|job| job.error().is_some())
    }

    pub(crate) fn sort(&mut self) {
        self.jobs.sort_by(|a, b| a.identifier.cmp(&b.identifier));
    }
}
