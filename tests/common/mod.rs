//! Shared utilities for integration tests.

#![allow(dead_code)]

use std::future::Future;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tsu_toolkit::{Error, Handler, Server};

pub const BOUNDARY: &str = "integration-boundary";

/// A loopback address nobody is listening on right now.
pub fn free_addr() -> String {
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    listener.local_addr().unwrap().to_string()
}

/// Polls `addr` until it accepts connections.
pub async fn wait_until_listening(addr: &str) {
    for _ in 0..200 {
        if TcpStream::connect(addr).await.is_ok() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("server on {addr} never started listening");
}

/// Starts `handler` on a fresh loopback port, driven only by the returned
/// token. OS signals are not observed.
pub async fn spawn_server(
    handler: impl Handler,
    shutdown_timeout: Duration,
) -> (String, CancellationToken, JoinHandle<Result<(), Error>>) {
    let addr = free_addr();
    let ctx = CancellationToken::new();
    let run = tokio::spawn(
        Server::bind(addr.clone(), handler)
            .shutdown_signal(never())
            .run(ctx.clone(), shutdown_timeout, None),
    );
    wait_until_listening(&addr).await;
    (addr, ctx, run)
}

pub fn never() -> impl Future<Output = ()> + Send + 'static {
    std::future::pending()
}

/// A client that never goes through an environment proxy.
pub fn client() -> reqwest::Client {
    reqwest::Client::builder().no_proxy().build().unwrap()
}

/// A `multipart/form-data` body with one file part per `(name, bytes)`.
pub fn multipart(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut body = Vec::new();
    for (name, data) in files {
        body.extend_from_slice(
            format!(
                "--{BOUNDARY}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"{name}\"\r\n\
                 Content-Type: application/octet-stream\r\n\r\n"
            )
            .as_bytes(),
        );
        body.extend_from_slice(data);
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{BOUNDARY}--\r\n").as_bytes());
    body
}

pub fn multipart_content_type() -> String {
    format!("multipart/form-data; boundary={BOUNDARY}")
}

pub fn png(len: usize) -> Vec<u8> {
    let mut data = b"\x89PNG\r\n\x1a\n".to_vec();
    data.resize(len, 0);
    data
}
