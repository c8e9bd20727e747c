//! The conversion command.

use anyhow::{Context, Result};
use tdport_batch::{BatchReport, BatchRunner, Converter};
use tdport_bridge::BridgeLoader;
use tracing::{Dispatch, info};

use crate::args::Cli;
use crate::config::Config;

/// Convert every account under the input directory.
///
/// Individual accounts failing does not fail the command; only problems that
/// prevent the batch from starting are returned as errors.
pub async fn run(cli: &Cli, config: &Config, dispatch: Dispatch) -> Result<BatchReport> {
    let bridge = config.bridge_config()?;
    tracing::dispatcher::with_default(&dispatch, || {
        info!(
            input = %cli.input.display(),
            output = %config.output_dir.display(),
            helper = %bridge.command,
            "Starting tdport"
        )
    });

    let converter = Converter::new(BridgeLoader::new(bridge))
        .job_timeout(config.job_timeout())
        .legacy_fallback(config.legacy_fallback);
    let runner = BatchRunner::new(converter)
        .max_concurrency(config.max_concurrency)
        .with_dispatch(dispatch);

    runner
        .run_dir(&cli.input, &config.discovery_options(), &config.output_dir)
        .await
        .with_context(|| format!("Cannot convert sessions from {}", cli.input.display()))
}
