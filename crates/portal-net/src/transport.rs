use std::time::{Duration, Instant};

use async_trait::async_trait;
use chargeguard_core_types::{PortalError, PortalResult};
use http::header::CONTENT_TYPE;
use http::HeaderValue;
use tracing::debug;

use crate::types::{NetRequest, NetResponse};

/// Seam for every outbound call a portal makes.
///
/// Implementations return `Ok` only for 2xx responses; anything else is
/// classified through [`PortalError::from_status`] so the retry policy sees a
/// status-bearing error.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn send(&self, request: NetRequest) -> PortalResult<NetResponse>;
}

#[derive(Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    pub fn new() -> PortalResult<Self> {
        let client = reqwest::Client::builder()
            .use_rustls_tls()
            .tcp_keepalive(Some(Duration::from_secs(30)))
            .connect_timeout(Duration::from_secs(10))
            .redirect(reqwest::redirect::Policy::limited(4))
            .build()
            .map_err(|err| {
                PortalError::Configuration(format!("failed to build reqwest client: {err}"))
            })?;
        Ok(Self { client })
    }

    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: NetRequest) -> PortalResult<NetResponse> {
        let body = request.body.to_bytes()?;
        let mut headers = request.headers.clone();
        if let Some(content_type) = request.body.content_type() {
            if !headers.contains_key(CONTENT_TYPE) {
                headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            }
        }

        let mut builder = self
            .client
            .request(request.method.clone(), request.url.clone())
            .headers(headers);
        if !body.is_empty() {
            builder = builder.body(body);
        }
        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        let start = Instant::now();
        let response = builder.send().await.map_err(map_send_error)?;
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = response
            .bytes()
            .await
            .map_err(|err| PortalError::transient(format!("response body error: {err}")))?;
        let elapsed = start.elapsed();

        debug!(
            method = %request.method,
            url = %request.url,
            status = status.as_u16(),
            elapsed_ms = elapsed.as_millis() as u64,
            "portal call completed"
        );

        if status.is_success() {
            Ok(NetResponse::new(status, headers, bytes, elapsed))
        } else {
            Err(PortalError::from_status(
                status.as_u16(),
                &String::from_utf8_lossy(&bytes),
            ))
        }
    }
}

fn map_send_error(err: reqwest::Error) -> PortalError {
    if err.is_timeout() {
        PortalError::transient(format!("request timed out: {err}"))
    } else if err.is_connect() {
        PortalError::transient(format!("connect error: {err}"))
    } else if let Some(status) = err.status() {
        PortalError::from_status(status.as_u16(), &err.to_string())
    } else {
        PortalError::transient(format!("request error: {err}"))
    }
}

/// Sends one attempt bounded by `timeout`, independent of the transport's own
/// deadline handling.
pub async fn send_with_timeout(
    transport: &dyn HttpTransport,
    mut request: NetRequest,
    timeout: Duration,
) -> PortalResult<NetResponse> {
    request.timeout = Some(timeout);
    match tokio::time::timeout(timeout, transport.send(request)).await {
        Ok(result) => result,
        Err(_) => Err(PortalError::transient(format!(
            "attempt exceeded {}ms",
            timeout.as_millis()
        ))),
    }
}
