use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use chargeguard_core_types::PortalError;
use http_body_util::{BodyExt, Full};
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use portal_net::{send_with_timeout, Body, HttpTransport, NetRequest, ReqwestTransport, RetryPolicy};
use tokio::net::TcpListener;
use url::Url;

type ResBody = Full<Bytes>;

async fn start_mock<F>(handler: F) -> SocketAddr
where
    F: Fn(hyper::http::request::Parts, Bytes) -> Response<ResBody> + Send + Sync + 'static,
{
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .expect("bind mock");
    let addr = listener.local_addr().expect("local addr");
    let handler = Arc::new(handler);

    tokio::spawn(async move {
        loop {
            let (stream, _) = listener.accept().await.expect("accept");
            let handler = handler.clone();
            tokio::spawn(async move {
                let io = TokioIo::new(stream);
                let service = service_fn(move |req: Request<Incoming>| {
                    let handler = handler.clone();
                    async move {
                        let (parts, body) = req.into_parts();
                        let bytes = body.collect().await?.to_bytes();
                        Ok::<_, hyper::Error>((handler)(parts, bytes))
                    }
                });
                if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                    eprintln!("mock server error: {err}");
                }
            });
        }
    });
    addr
}

fn body(content: &str) -> ResBody {
    Full::new(Bytes::from(content.as_bytes().to_vec()))
}

fn url(addr: SocketAddr, path: &str) -> Url {
    Url::parse(&format!("http://{addr}{path}")).unwrap()
}

#[tokio::test]
async fn retry_recovers_after_transient_503() {
    static HITS: AtomicUsize = AtomicUsize::new(0);
    let addr = start_mock(|_, _| {
        if HITS.fetch_add(1, Ordering::SeqCst) == 0 {
            Response::builder()
                .status(StatusCode::SERVICE_UNAVAILABLE)
                .body(body("busy"))
                .unwrap()
        } else {
            Response::builder()
                .status(StatusCode::OK)
                .body(body(r#"{"ok":true}"#))
                .unwrap()
        }
    })
    .await;

    let transport = ReqwestTransport::new().unwrap();
    let policy = RetryPolicy {
        base_delay: Duration::from_millis(10),
        max_jitter: Duration::ZERO,
        ..RetryPolicy::default()
    };
    let target = url(addr, "/v1/disputes");
    let response = policy
        .run("e2e", |_| {
            send_with_timeout(
                &transport,
                NetRequest::get(target.clone()),
                Duration::from_secs(5),
            )
        })
        .await
        .unwrap();

    assert_eq!(response.json().unwrap()["ok"], true);
    assert_eq!(HITS.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn client_error_status_is_classified() {
    let addr = start_mock(|_, _| {
        Response::builder()
            .status(StatusCode::UNPROCESSABLE_ENTITY)
            .body(body(r#"{"error":"evidence too large"}"#))
            .unwrap()
    })
    .await;

    let transport = ReqwestTransport::new().unwrap();
    let err = transport
        .send(NetRequest::post(
            url(addr, "/v1/disputes/dp_1"),
            Body::Json(serde_json::json!({ "submit": true })),
        ))
        .await
        .unwrap_err();
    match err {
        PortalError::PermanentClient { status, message } => {
            assert_eq!(status, 422);
            assert!(message.contains("evidence too large"));
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn form_body_is_sent_with_content_type() {
    let addr = start_mock(|parts, bytes| {
        let content_type = parts
            .headers
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default()
            .to_string();
        let echoed = serde_json::json!({
            "content_type": content_type,
            "body": String::from_utf8_lossy(&bytes),
        });
        Response::builder()
            .status(StatusCode::OK)
            .body(body(&echoed.to_string()))
            .unwrap()
    })
    .await;

    let transport = ReqwestTransport::new().unwrap();
    let response = transport
        .send(NetRequest::post(
            url(addr, "/v1/disputes/dp_1/close"),
            Body::Form(vec![("metadata[source]".into(), "chargeguard".into())]),
        ))
        .await
        .unwrap();
    let json = response.json().unwrap();
    assert_eq!(json["content_type"], "application/x-www-form-urlencoded");
    assert_eq!(json["body"], "metadata%5Bsource%5D=chargeguard");
}

#[tokio::test]
async fn silent_server_hits_per_attempt_timeout() {
    let listener = TcpListener::bind(SocketAddr::from(([127, 0, 0, 1], 0)))
        .await
        .unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let mut held = Vec::new();
        loop {
            let (stream, _) = listener.accept().await.expect("accept");
            held.push(stream);
        }
    });

    let transport = ReqwestTransport::new().unwrap();
    let err = send_with_timeout(
        &transport,
        NetRequest::get(url(addr, "/slow")),
        Duration::from_millis(100),
    )
    .await
    .unwrap_err();
    assert!(err.is_transport_failure());
}
