//! Concurrent execution of conversion jobs.
//!
//! Every job runs as its own task in a [`JoinSet`] and the runner waits for
//! all of them. A failing or panicking job is recorded in the report and
//! never cancels its siblings.
//!
//! Logging goes through an injected [`Dispatch`] rather than whatever
//! subscriber happens to be global, so callers (and tests) decide where the
//! output of a run ends up.

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::instrument::WithSubscriber;
use tracing::{Dispatch, Instrument, error, info, info_span, warn};

use crate::collaborator::SessionLoader;
use crate::converter::{Conversion, ConvertError, Converter};
use crate::discovery::{DiscoveryOptions, discover};
use crate::existence::ensure_output_dir;
use crate::job::{ConversionJob, plan_jobs};
use crate::report::{BatchReport, JobOutcome, JobReport};
use crate::{BatchError, Result};

/// Runs conversion jobs concurrently.
pub struct BatchRunner<L> {
    converter: Arc<Converter<L>>,
    /// Maximum jobs in flight, unbounded when `None`.
    max_concurrency: Option<usize>,
    dispatch: Dispatch,
}

impl<L: SessionLoader + 'static> BatchRunner<L> {
    /// Create a runner logging to the dispatcher current at construction.
    pub fn new(converter: Converter<L>) -> Self {
        Self {
            converter: Arc::new(converter),
            max_concurrency: None,
            dispatch: tracing::dispatcher::get_default(Dispatch::clone),
        }
    }

    pub fn max_concurrency(mut self, limit: Option<usize>) -> Self {
        self.max_concurrency = limit;
        self
    }

    /// Send every log event of the run to `dispatch`.
    pub fn with_dispatch(mut self, dispatch: Dispatch) -> Self {
        self.dispatch = dispatch;
        self
    }

    /// Discover the accounts under `base` and convert them into `output_dir`.
    pub async fn run_dir(
        &self,
        base: &Path,
        options: &DiscoveryOptions,
        output_dir: &Path,
    ) -> Result<BatchReport> {
        let sessions = self.logged(|| discover(base, options))?;
        let jobs = plan_jobs(sessions, output_dir);
        if !jobs.is_empty() {
            self.logged(|| ensure_output_dir(output_dir))?;
        }
        self.run(jobs).await
    }

    /// Convert every job and wait until all of them settled.
    pub async fn run(&self, jobs: Vec<ConversionJob>) -> Result<BatchReport> {
        if jobs.is_empty() {
            self.logged(|| warn!("No source sessions found, nothing to convert"));
            return Ok(BatchReport::new());
        }

        check_unique_outputs(&jobs)?;

        let total = jobs.len();
        self.logged(|| info!("Converting {} account(s)", total));

        let semaphore = self
            .max_concurrency
            .map(|limit| Arc::new(Semaphore::new(limit.max(1))));
        let mut tasks = JoinSet::new();
        let mut pending = HashMap::new();

        for job in jobs {
            let identifier = job.identifier().to_string();
            let output = job.output.clone();
            let span = self.logged(|| info_span!("job", identifier = %identifier));
            let converter = Arc::clone(&self.converter);
            let semaphore = semaphore.clone();

            let task = async move {
                let _permit = match semaphore {
                    Some(semaphore) => semaphore.acquire_owned().await.ok(),
                    None => None,
                };

                let result = converter.convert(&job).await;
                log_result(&result);
                JobReport {
                    identifier: job.source.identifier,
                    output: job.output,
                    outcome: result.into(),
                }
            }
            .instrument(span)
            .with_subscriber(self.dispatch.clone());

            let handle = tasks.spawn(task);
            pending.insert(handle.id(), (identifier, output));
        }

        let mut report = BatchReport::new();
        while let Some(joined) = tasks.join_next_with_id().await {
            match joined {
                Ok((id, job)) => {
                    pending.remove(&id);
                    report.push(job);
                }
                Err(e) => {
                    let Some((identifier, output)) = pending.remove(&e.id()) else {
                        continue;
                    };
                    let reason = if e.is_panic() {
                        panic_message(e.into_panic())
                    } else {
                        String::from("task cancelled")
                    };
                    self.logged(|| {
                        error!(identifier = %identifier, "Conversion task aborted: {}", reason)
                    });
                    report.push(JobReport {
                        identifier,
                        output,
                        outcome: JobOutcome::Failed(ConvertError::Panicked(reason)),
                    });
                }
            }
        }

        report.sort();
        self.logged(|| {
            info!(
                "Batch complete: {} total, {} converted, {} skipped, {} failed",
                report.total, report.converted, report.skipped, report.failed
            )
        });

        Ok(report)
    }

    fn logged<T>(&self, f: impl FnOnce() -> T) -> T {
        tracing::dispatcher::with_default(&self.dispatch, f)
    }
}

fn log_result(result: &std::result::Result<Conversion, ConvertError>) {
    match result {
        Ok(Conversion::Converted(session)) => {
            info!("Conversion succeeded: {}", session.path.display())
        }
        Ok(Conversion::Skipped { path }) => {
            info!("Conversion skipped, {} already exists", path.display())
        }
        Err(e) => error!("Conversion failed: {}", e),
    }
}

fn check_unique_outputs(jobs: &[ConversionJob]) -> Result<()> {
    let mut seen: HashSet<&PathBuf> = HashSet::with_capacity(jobs.len());
    for job in jobs {
        if !seen.insert(&job.output) {
            return Err(BatchError::DuplicateIdentifier {
                identifier: job.identifier().to_string(),
                output: job.output.clone(),
            });
        }
    }
    Ok(())
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        String::from("unknown panic")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::job::SourceSession;

    #[test]
    fn test_duplicate_outputs_rejected() {
        let out = Path::new("out");
        let jobs = vec![
            ConversionJob::new(SourceSession::new("+1555", "a/+1555/tdata"), out),
            ConversionJob::new(SourceSession::new("+1555", "b/+1555/tdata"), out),
        ];

        let err = check_unique_outputs(&jobs).unwrap_err();

        assert!(matches!(
            err,
            BatchError::DuplicateIdentifier { identifier, .. } if identifier == "+1555"
        ));
    }

    #[test]
    fn test_panic_message() {
        assert_eq!(panic_message(Box::new("boom")), "boom");
        assert_eq!(panic_message(Box::new(String::from("bang"))), "bang");
        assert_eq!(panic_message(Box::new(3_u8)), "unknown panic");
    }
}
