//! Single-account conversion.
//!
//! One job runs these steps in order:
//! 1. load the `tdata` directory (standard layout, then legacy)
//! 2. skip when the session file already exists
//! 3. convert through the collaborator, reusing the current session
//! 4. connect and check authorization
//! 5. fetch the account's own identity
//! 6. check that the session file was written
//!
//! Once a client exists it is always disconnected before the job returns,
//! including when a step fails or the job times out. A session file written
//! by a job that then fails is removed, so a later run retries the account.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::collaborator::{
    CollaboratorError, DesktopSession, LoadMode, LoadOutcome, SelfIdentity, SessionFlag,
    SessionLoader, TargetClient,
};
use crate::existence::{discard_session, session_exists};
use crate::job::ConversionJob;

/// Grace period for releasing a client.
const DISCONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors that end a single job.
#[derive(Error, Debug)]
pub enum ConvertError {
    #[error("Failed to load {}: {reason}", .path.display())]
    Load { path: PathBuf, reason: String },
    #[error("Conversion failed: {0}")]
    Conversion(#[source] CollaboratorError),
    #[error("Connection failed: {0}")]
    Connection(#[source] CollaboratorError),
    #[error("Session is not authorized (second factor required or session revoked)")]
    AuthenticationRequired,
    #[error("Identity check failed: {0}")]
    Verification(#[source] CollaboratorError),
    #[error("Session file was not written: {}", .path.display())]
    Persist { path: PathBuf },
    #[error("Job timed out after {0:?}")]
    Timeout(Duration),
    #[error("Job panicked: {0}")]
    Panicked(String),
}

/// A session file produced and verified by this run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConvertedSession {
    pub path: PathBuf,
    pub identity: SelfIdentity,
}

/// Successful end of a job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Conversion {
    Converted(ConvertedSession),
    /// The session file already existed and was left untouched.
    Skipped { path: PathBuf },
}

/// Converts one account at a time through a [`SessionLoader`].
pub struct Converter<L> {
    loader: L,
    job_timeout: Option<Duration>,
    legacy_fallback: bool,
    disconnect_timeout: Duration,
}

impl<L: SessionLoader> Converter<L> {
    pub fn new(loader: L) -> Self {
        Self {
            loader,
            job_timeout: None,
            legacy_fallback: true,
            disconnect_timeout: DISCONNECT_TIMEOUT,
        }
    }

    /// Bound the conversion and verification steps of each job.
    pub fn job_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.job_timeout = timeout;
        self
    }

    /// Retry loading with the legacy layout when the standard one finds nothing.
    pub fn legacy_fallback(mut self, enabled: bool) -> Self {
        self.legacy_fallback = enabled;
        self
    }

    pub fn disconnect_timeout(mut self, timeout: Duration) -> Self {
        self.disconnect_timeout = timeout;
        self
    }

    /// Run every step of `job`.
    pub async fn convert(&self, job: &ConversionJob) -> Result<Conversion, ConvertError> {
        info!(
            source = %job.source.path.display(),
            output = %job.output.display(),
            "Starting conversion"
        );

        let desktop = self.load_source(job).await?;

        if session_exists(&job.output) {
            warn!(
                "Session file already exists, skipping: {}",
                job.output.display()
            );
            return Ok(Conversion::Skipped {
                path: job.output.clone(),
            });
        }

        let mut client: Option<Box<dyn TargetClient>> = None;
        let verified = self
            .bounded(self.establish(&desktop, job, &mut client))
            .await;

        if let Some(client) = client.as_deref_mut() {
            self.release(client).await;
        }

        // The file was absent at the skip check, so whatever exists now
        // belongs to this job and must not survive an unverified run.
        if verified.is_err() {
            match discard_session(&job.output) {
                Ok(true) => warn!("Removed unverified session file: {}", job.output.display()),
                Ok(false) => {}
                Err(e) => warn!(
                    "Failed to remove unverified session file {}: {}",
                    job.output.display(),
                    e
                ),
            }
        }

        let identity = verified?;
        info!(
            user_id = identity.id,
            "Session saved for {}: {}",
            identity.display_name(),
            job.output.display()
        );

        Ok(Conversion::Converted(ConvertedSession {
            path: job.output.clone(),
            identity,
        }))
    }

    async fn load_source(&self, job: &ConversionJob) -> Result<L::Desktop, ConvertError> {
        let modes: &[LoadMode] = if self.legacy_fallback {
            &[LoadMode::Standard, LoadMode::Legacy]
        } else {
            &[LoadMode::Standard]
        };

        let mut reason = String::from("no accounts loaded");
        for &mode in modes {
            debug!(%mode, "Loading {}", job.source.path.display());
            match self.loader.load(&job.source.path, mode).await {
                LoadOutcome::Loaded(desktop) if desktop.is_loaded() => {
                    info!(
                        %mode,
                        accounts = desktop.accounts().len(),
                        "Source session loaded"
                    );
                    return Ok(desktop);
                }
                LoadOutcome::Loaded(_) | LoadOutcome::NotLoaded => {
                    warn!(%mode, "No accounts loaded from {}", job.source.path.display());
                    reason = String::from("no accounts loaded");
                }
                LoadOutcome::Malformed(why) => {
                    warn!(%mode, "Could not read {}: {}", job.source.path.display(), why);
                    reason = why;
                }
            }
        }

        Err(ConvertError::Load {
            path: job.source.path.clone(),
            reason,
        })
    }

    /// Steps 3 to 6. The client is stored in `slot` as soon as it exists so
    /// the caller can release it whatever happens next.
    async fn establish(
        &self,
        desktop: &L::Desktop,
        job: &ConversionJob,
        slot: &mut Option<Box<dyn TargetClient>>,
    ) -> Result<SelfIdentity, ConvertError> {
        let converted = desktop
            .to_client(&job.output, SessionFlag::UseCurrentSession)
            .await
            .map_err(ConvertError::Conversion)?;
        let client = slot.insert(converted);

        client.connect().await.map_err(ConvertError::Connection)?;
        debug!("Connected");

        let authorized = client
            .is_authorized()
            .await
            .map_err(ConvertError::Connection)?;
        if !authorized {
            return Err(ConvertError::AuthenticationRequired);
        }

        let identity = client.get_me().await.map_err(ConvertError::Verification)?;
        debug!(user_id = identity.id, "Identity verified");

        if !session_exists(&job.output) {
            return Err(ConvertError::Persist {
                path: job.output.clone(),
            });
        }

        Ok(identity)
    }

    async fn bounded<T>(
        &self,
        fut: impl Future<Output = Result<T, ConvertError>>,
    ) -> Result<T, ConvertError> {
        match self.job_timeout {
            Some(limit) => tokio::time::timeout(limit, fut)
                .await
                .unwrap_or(Err(ConvertError::Timeout(limit))),
            None => fut.await,
        }
    }

    async fn release(&self, client: &mut dyn TargetClient) {
        match tokio::time::timeout(self.disconnect_timeout, client.disconnect()).await {
            Ok(Ok(())) => debug!("Client disconnected"),
            Ok(Err(e)) => warn!("Failed to disconnect client: {}", e),
            Err(_) => warn!(
                "Client did not disconnect within {:?}",
                self.disconnect_timeout
            ),
        }
    }
}
