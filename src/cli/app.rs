use anyhow::Result;
use clap::Parser;
use tracing::{debug, error};

use super::dispatch::dispatch;
use super::env::CliArgs;
use super::runtime::init_logging;

pub async fn run() -> Result<()> {
    let cli = CliArgs::parse();

    init_logging(&cli.log_level, cli.debug, cli.json_logs)?;
    debug!(version = env!("CARGO_PKG_VERSION"), "chargeguard starting");

    match dispatch(&cli).await {
        Ok(()) => {
            debug!("command completed");
            Ok(())
        }
        Err(err) => {
            error!(error = %format!("{err:#}"), "command failed");
            Err(err)
        }
    }
}
