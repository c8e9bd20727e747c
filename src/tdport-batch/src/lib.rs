//! Batch conversion of desktop `tdata` sessions into client session files.
//!
//! Provides:
//! - Discovery of one or many account directories under a base path
//! - Duplicate detection against already produced session files
//! - A single-account converter driving an external collaborator
//! - A batch runner that converts every account concurrently and
//!   isolates per-account failures

pub mod collaborator;
pub mod converter;
pub mod discovery;
pub mod existence;
pub mod job;
pub mod report;
pub mod runner;

pub use collaborator::{
    AccountInfo, CollaboratorError, DesktopSession, LoadMode, LoadOutcome, SelfIdentity,
    SessionFlag, SessionLoader, TargetClient,
};
pub use converter::{ConvertError, Conversion, ConvertedSession, Converter};
pub use discovery::{DEFAULT_SOURCE_DIR, DiscoveryMode, DiscoveryOptions, discover};
pub use existence::{
    SESSION_EXTENSION, discard_session, ensure_output_dir, session_exists, session_path,
};
pub use job::{ConversionJob, SourceSession, plan_jobs};
pub use report::{BatchReport, JobOutcome, JobReport};
pub use runner::BatchRunner;

use std::path::PathBuf;

use thiserror::Error;

/// Errors that abort a whole run before any job starts.
#[derive(Error, Debug)]
pub enum BatchError {
    #[error("Input directory not found: {}", .0.display())]
    NotFound(PathBuf),
    #[error("Cannot derive an account identifier from {}", .0.display())]
    NoIdentifier(PathBuf),
    #[error("Duplicate identifier '{identifier}' would write {} twice", .output.display())]
    DuplicateIdentifier { identifier: String, output: PathBuf },
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, BatchError>;
