use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, bail, Context, Result};
use bytes::Bytes;
use chargeguard_core_types::PortalKind;
use clap::Args;
use http::{HeaderMap, HeaderName, HeaderValue};
use portal_adapter::{build_adapter, GatewaySettings, WebhookBody};
use portal_net::ReqwestTransport;
use serde_json::Value;

use super::env::parse_portal;

#[derive(Args, Clone, Debug)]
pub struct VerifyWebhookArgs {
    #[arg(long, value_parser = parse_portal)]
    pub portal: PortalKind,

    /// JSON object of the delivery's headers; values may be strings or arrays
    #[arg(long, value_name = "FILE")]
    pub headers: PathBuf,

    /// Delivered body, byte for byte
    #[arg(long, value_name = "FILE")]
    pub body: PathBuf,
}

pub async fn cmd_verify_webhook(args: VerifyWebhookArgs, settings: &GatewaySettings) -> Result<()> {
    let headers_json = fs::read_to_string(&args.headers)
        .with_context(|| format!("Failed to read {}", args.headers.display()))?;
    let headers: Value =
        serde_json::from_str(&headers_json).context("Headers file is not valid JSON")?;
    let headers = header_map(&headers)?;
    let body = fs::read(&args.body)
        .with_context(|| format!("Failed to read {}", args.body.display()))?;

    // no request leaves the process; the transport only satisfies the builder
    let adapter = build_adapter(
        args.portal,
        settings,
        Arc::new(ReqwestTransport::new().context("Failed to build HTTP transport")?),
    )
    .with_context(|| format!("Failed to build {} adapter", args.portal))?;

    let event = adapter
        .parse_webhook_payload(&headers, WebhookBody::Raw(Bytes::from(body)))
        .await
        .context("Webhook rejected")?;
    println!("{}", serde_json::to_string_pretty(&event)?);
    Ok(())
}

fn header_map(value: &Value) -> Result<HeaderMap> {
    let Some(object) = value.as_object() else {
        bail!("Headers file must contain a JSON object");
    };
    let mut headers = HeaderMap::new();
    for (name, value) in object {
        let header = HeaderName::from_bytes(name.to_ascii_lowercase().as_bytes())
            .map_err(|_| anyhow!("invalid header name {name:?}"))?;
        let values: Vec<&Value> = match value {
            Value::Array(items) => items.iter().collect(),
            other => vec![other],
        };
        for item in values {
            let text = item
                .as_str()
                .ok_or_else(|| anyhow!("header {name} must be a string or array of strings"))?;
            let value = HeaderValue::from_str(text)
                .map_err(|_| anyhow!("invalid value for header {name}"))?;
            headers.append(header.clone(), value);
        }
    }
    Ok(headers)
}
