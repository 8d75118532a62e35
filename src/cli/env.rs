use clap::Parser;
use std::path::PathBuf;

use chargeguard_core_types::PortalKind;

use super::commands::Commands;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct CliArgs {
    /// Gateway settings file (TOML or YAML). Falls back to $CHARGEGUARD_CONFIG
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Log level
    #[arg(short, long, default_value = "warn", global = true)]
    pub log_level: String,

    /// Enable debug mode
    #[arg(short, long, global = true)]
    pub debug: bool,

    /// Write logs as JSON lines
    #[arg(long, global = true)]
    pub json_logs: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// clap value parser accepting `authorize-net` as well as `authorize_net`.
pub fn parse_portal(value: &str) -> Result<PortalKind, String> {
    value.parse::<PortalKind>().map_err(|err| {
        let known: Vec<&str> = PortalKind::ALL.iter().map(|kind| kind.as_str()).collect();
        format!("{err}; expected one of {}", known.join(", "))
    })
}
