use std::path::Path;

use anyhow::{Context, Result};
use portal_adapter::GatewaySettings;
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Logs go to stderr; stdout carries command output only.
pub fn init_logging(level: &str, debug: bool, json: bool) -> Result<()> {
    let level = if debug {
        tracing::Level::DEBUG
    } else {
        level.parse().context("Invalid log level")?
    };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        registry.with(fmt::layer().with_writer(std::io::stderr)).init();
    }
    Ok(())
}

pub fn load_settings(path: Option<&Path>) -> Result<GatewaySettings> {
    let settings = GatewaySettings::load(path).context("Failed to load gateway settings")?;
    info!(portals = ?settings.configured_portals(), "gateway settings loaded");
    Ok(settings)
}
