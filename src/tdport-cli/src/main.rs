//! tdport - batch conversion of desktop tdata folders into session files.

use anyhow::Result;
use clap::Parser;

use tdport_cli::{Cli, Config, LogSettings, convert_cmd, logging};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::resolve(&cli)?;
    let (dispatch, _log_guard) = logging::init(&LogSettings::resolve(&cli, config.log_level))?;

    convert_cmd::run(&cli, &config, dispatch).await?;
    Ok(())
}
