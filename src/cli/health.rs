use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chargeguard_core_types::PortalKind;
use clap::Args;
use portal_adapter::{build_adapter, GatewaySettings};
use portal_net::{HttpTransport, ReqwestTransport};
use serde_json::{Map, Value};
use tracing::info;

use super::env::parse_portal;

#[derive(Args, Clone, Debug)]
pub struct HealthArgs {
    /// Only probe this portal
    #[arg(long, value_parser = parse_portal)]
    pub portal: Option<PortalKind>,
}

/// Prints `{ "<portal>": HealthReport, .. }`. An unhealthy portal is reported,
/// not treated as a command failure.
pub async fn cmd_health(args: HealthArgs, settings: &GatewaySettings) -> Result<()> {
    let kinds = match args.portal {
        Some(kind) => vec![kind],
        None => settings.configured_portals(),
    };
    if kinds.is_empty() {
        bail!("no portals configured; add a [portals.<name>] section to the settings file");
    }

    let transport: Arc<dyn HttpTransport> =
        Arc::new(ReqwestTransport::new().context("Failed to build HTTP transport")?);
    let mut reports = Map::new();
    for kind in kinds {
        let adapter = build_adapter(kind, settings, transport.clone())
            .with_context(|| format!("Failed to build {kind} adapter"))?;
        let report = adapter.health_check().await;
        info!(
            portal = %kind,
            healthy = report.healthy,
            latency_ms = report.latency_ms,
            "health check finished"
        );
        reports.insert(kind.as_str().to_string(), serde_json::to_value(&report)?);
    }

    println!("{}", serde_json::to_string_pretty(&Value::Object(reports))?);
    Ok(())
}
