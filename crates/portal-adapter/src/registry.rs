use std::sync::Arc;

use chargeguard_core_types::clock::system_clock;
use chargeguard_core_types::{Clock, PortalError, PortalKind, PortalResult};
use portal_net::HttpTransport;
use tracing::info;

use crate::adapter::PortalAdapter;
use crate::config::GatewaySettings;
use crate::portals::{
    AuthorizeNetAdapter, MastercomAdapter, PaypalAdapter, SquareAdapter, StripeAdapter,
    VerifiAdapter,
};
use crate::runtime::AdapterContext;

/// Builds the adapter for `kind` from its `portals.<kind>` settings block.
pub fn build_adapter(
    kind: PortalKind,
    settings: &GatewaySettings,
    transport: Arc<dyn HttpTransport>,
) -> PortalResult<Arc<dyn PortalAdapter>> {
    build_adapter_with_clock(kind, settings, transport, system_clock())
}

pub fn build_adapter_with_clock(
    kind: PortalKind,
    settings: &GatewaySettings,
    transport: Arc<dyn HttpTransport>,
    clock: Arc<dyn Clock>,
) -> PortalResult<Arc<dyn PortalAdapter>> {
    let context = AdapterContext {
        transport,
        clock,
        retry: settings.retry.to_policy(),
        timeout: settings.http.timeout(),
        receipt_ttl: settings.http.receipt_ttl(),
    };
    let portals = &settings.portals;
    let adapter: Arc<dyn PortalAdapter> = match kind {
        PortalKind::Stripe => Arc::new(StripeAdapter::new(section(kind, &portals.stripe)?, &context)?),
        PortalKind::Paypal => Arc::new(PaypalAdapter::new(section(kind, &portals.paypal)?, &context)?),
        PortalKind::Mastercom => {
            Arc::new(MastercomAdapter::new(section(kind, &portals.mastercom)?, &context)?)
        }
        PortalKind::AuthorizeNet => Arc::new(AuthorizeNetAdapter::new(
            section(kind, &portals.authorize_net)?,
            &context,
        )?),
        PortalKind::Square => Arc::new(SquareAdapter::new(section(kind, &portals.square)?, &context)?),
        PortalKind::Verifi => Arc::new(VerifiAdapter::new(section(kind, &portals.verifi)?, &context)?),
    };
    info!(portal = %kind, "portal adapter ready");
    Ok(adapter)
}

/// Adapters for every portal that has a settings block.
pub fn build_configured(
    settings: &GatewaySettings,
    transport: Arc<dyn HttpTransport>,
) -> PortalResult<Vec<Arc<dyn PortalAdapter>>> {
    settings
        .configured_portals()
        .into_iter()
        .map(|kind| build_adapter(kind, settings, transport.clone()))
        .collect()
}

fn section<T>(kind: PortalKind, block: &Option<T>) -> PortalResult<&T> {
    block.as_ref().ok_or_else(|| {
        PortalError::Configuration(format!("no settings for portal {kind} (portals.{})", kind.as_str()))
    })
}
