mod common;

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls::crypto::ring;
use tokio_rustls::rustls::server::{ClientHello, ResolvesServerCert};
use tokio_rustls::rustls::sign::CertifiedKey;
use tokio_rustls::rustls::ServerConfig;
use tokio_util::sync::CancellationToken;
use tsu_toolkit::{Error, Handler, IntoResponse, Request, Response, Server, Tools};

use common::{client, free_addr, never, spawn_server, wait_until_listening};

/// A handler that reports each request on `started` and answers after
/// `delay`.
fn slow(delay: Duration, started: mpsc::UnboundedSender<()>) -> impl Handler {
    move |_req: Request| {
        let started = started.clone();
        async move {
            let _ = started.send(());
            tokio::time::sleep(delay).await;
            Response::text("done")
        }
    }
}

#[tokio::test]
async fn serves_requests_until_cancelled() {
    let greet = |req: Request| async move { format!("hello from {}", req.path()) };
    let (addr, ctx, run) = spawn_server(greet, Duration::from_secs(2)).await;

    let body = client().get(format!("http://{addr}/greet")).send().await.unwrap().text().await.unwrap();
    assert_eq!(body, "hello from /greet");

    ctx.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn json_decoding_handler_is_served() {
    let tools = Tools::builder().max_json_size(32).build();
    let echo = move |mut req: Request| {
        let tools = tools.clone();
        async move {
            match tools.read_json::<serde_json::Value>(&mut req).await {
                Ok(v) => tools.write_json(http::StatusCode::OK, &v, None).into_response(),
                Err(e) => e.into_response(),
            }
        }
    };
    let (addr, ctx, run) = spawn_server(echo, Duration::from_secs(2)).await;

    let res = client().post(format!("http://{addr}/")).body(r#"{"name":"Jack"}"#).send().await.unwrap();
    assert_eq!(res.status(), http::StatusCode::OK);
    assert_eq!(res.text().await.unwrap(), r#"{"name":"Jack"}"#);

    let res = client()
        .post(format!("http://{addr}/"))
        .body(format!(r#"{{"name":"{}"}}"#, "x".repeat(64)))
        .send()
        .await
        .unwrap();
    assert_eq!(res.status(), http::StatusCode::PAYLOAD_TOO_LARGE);
    assert!(res.text().await.unwrap().contains("body must not be larger than 32 bytes"));

    ctx.cancel();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn bind_failure_is_returned_without_draining() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = taken.local_addr().unwrap().to_string();

    let started = Instant::now();
    let res = Server::bind(addr, |_req: Request| async { "unreachable" })
        .shutdown_signal(never())
        .run(CancellationToken::new(), Duration::from_secs(30), None)
        .await;

    assert!(matches!(res, Err(Error::Bind { .. })), "{res:?}");
    assert!(started.elapsed() < Duration::from_secs(5));
}

#[tokio::test]
async fn in_flight_request_completes_during_drain() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (addr, ctx, run) = spawn_server(slow(Duration::from_millis(300), tx), Duration::from_secs(5)).await;

    let pending = tokio::spawn(async move { client().get(format!("http://{addr}/")).send().await?.text().await });
    rx.recv().await.unwrap();

    ctx.cancel();

    assert_eq!(pending.await.unwrap().unwrap(), "done");
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn slow_request_hits_shutdown_timeout() {
    let (tx, mut rx) = mpsc::unbounded_channel();
    let (addr, ctx, run) = spawn_server(slow(Duration::from_secs(30), tx), Duration::from_millis(200)).await;

    let pending = tokio::spawn(async move { client().get(format!("http://{addr}/")).send().await });
    rx.recv().await.unwrap();

    let cancelled_at = Instant::now();
    ctx.cancel();

    let res = run.await.unwrap();
    assert!(matches!(res, Err(Error::ShutdownTimeout(t)) if t == Duration::from_millis(200)), "{res:?}");
    assert!(cancelled_at.elapsed() < Duration::from_secs(10));

    // The forced close drops the connection under the client.
    assert!(pending.await.unwrap().is_err());
}

#[tokio::test]
async fn custom_signal_triggers_drain() {
    let addr = free_addr();
    let (fire, fired) = tokio::sync::oneshot::channel::<()>();

    let run = tokio::spawn(
        Server::bind(addr.clone(), |_req: Request| async { "ok" })
            .shutdown_signal(async {
                let _ = fired.await;
            })
            .run(CancellationToken::new(), Duration::from_secs(2), None),
    );
    wait_until_listening(&addr).await;

    fire.send(()).unwrap();
    run.await.unwrap().unwrap();
}

#[tokio::test]
async fn missing_certificate_files_fail_start() {
    let tmp = tempfile::tempdir().unwrap();
    let res = Server::bind(free_addr(), |_req: Request| async { "ok" })
        .shutdown_signal(never())
        .run(
            CancellationToken::new(),
            Duration::from_secs(1),
            Some((tmp.path().join("cert.pem"), tmp.path().join("key.pem"))),
        )
        .await;

    assert!(matches!(res, Err(Error::Tls(_))), "{res:?}");
}

#[derive(Debug)]
struct NoCertificate;

impl ResolvesServerCert for NoCertificate {
    fn resolve(&self, _hello: ClientHello<'_>) -> Option<Arc<CertifiedKey>> {
        None
    }
}

#[tokio::test]
async fn embedded_tls_config_refuses_plaintext_and_still_drains() {
    let config = ServerConfig::builder_with_provider(Arc::new(ring::default_provider()))
        .with_safe_default_protocol_versions()
        .unwrap()
        .with_no_client_auth()
        .with_cert_resolver(Arc::new(NoCertificate));

    let addr = free_addr();
    let ctx = CancellationToken::new();
    let run = tokio::spawn(
        Server::bind(addr.clone(), |_req: Request| async { "ok" })
            .tls_config(Arc::new(config))
            .shutdown_signal(never())
            .run(ctx.clone(), Duration::from_secs(2), None),
    );
    wait_until_listening(&addr).await;

    let mut stream = TcpStream::connect(&addr).await.unwrap();
    stream.write_all(b"GET / HTTP/1.1\r\nHost: x\r\n\r\n").await.unwrap();
    let mut buf = Vec::new();
    let _ = stream.read_to_end(&mut buf).await;
    assert!(!buf.starts_with(b"HTTP/1.1"), "plaintext request was answered");

    ctx.cancel();
    run.await.unwrap().unwrap();
}
