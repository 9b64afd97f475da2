//! HTTP/HTTPS server lifecycle and graceful shutdown.
//!
//! [`Server::run`] serves on a background task and blocks the caller until
//! one of three things happens, whichever comes first:
//!
//! 1. **The server fails** (bind error, unreadable TLS material). The error is
//!    returned as is; there is nothing to drain.
//! 2. **A termination signal arrives.** By default SIGINT / Ctrl-C and, on
//!    Unix, SIGTERM. Replaceable with [`Server::shutdown_signal`].
//! 3. **The cancellation token fires.**
//!
//! Cases 2 and 3 start the same drain:
//!
//! ```text
//! stop accepting ─► ask every connection to finish ─► wait ≤ shutdown_timeout
//!                                                         │
//!                      Ok(())  ◄── all connections done ──┤
//!                                                         │ deadline hit
//!                                                         ▼
//!               abort every connection task (forced close)
//!                 ├─ close ok     ─► Err(ShutdownTimeout)
//!                 └─ close failed ─► Err(ForcedClose { shutdown, close })
//! ```

use std::convert::Infallible;
use std::future::Future;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use hyper::body::Incoming;
use hyper::service::service_fn;
use hyper_util::rt::{TokioExecutor, TokioIo};
use hyper_util::server::conn::auto::Builder as ConnBuilder;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpListener;
use tokio::task::{JoinHandle, JoinSet};
use tokio_rustls::TlsAcceptor;
use tokio_rustls::rustls::ServerConfig;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::body::Body;
use crate::error::Error;
use crate::handler::{BoxedHandler, Handler};
use crate::request::Request;
use crate::tls;

type Signal = Pin<Box<dyn Future<Output = ()> + Send + 'static>>;

/// A configured, not yet running, HTTP server.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use tokio_util::sync::CancellationToken;
/// use tsu_toolkit::{Request, Response, Server};
///
/// # async fn demo() -> Result<(), tsu_toolkit::Error> {
/// async fn hello(_req: Request) -> Response { Response::text("hello") }
///
/// Server::bind("0.0.0.0:3000", hello)
///     .run(CancellationToken::new(), Duration::from_secs(30), None)
///     .await
/// # }
/// ```
pub struct Server {
    addr: String,
    handler: BoxedHandler,
    tls: Option<Arc<ServerConfig>>,
    signal: Option<Signal>,
}

/// Where the TLS material comes from, if any.
enum Tls {
    Files(PathBuf, PathBuf),
    Config(Arc<ServerConfig>),
}

impl Server {
    /// Configures a server that will bind `addr` (any `host:port` the
    /// resolver understands) and dispatch every request to `handler`.
    pub fn bind(addr: impl Into<String>, handler: impl Handler) -> Self {
        Self {
            addr: addr.into(),
            handler: handler.into_boxed_handler(),
            tls: None,
            signal: None,
        }
    }

    /// Serves TLS with a pre-built rustls config, unless
    /// [`run`](Server::run) is given an explicit certificate/key pair.
    pub fn tls_config(mut self, config: Arc<ServerConfig>) -> Self {
        self.tls = Some(config);
        self
    }

    /// Replaces the OS termination signals with `signal`. The server starts
    /// its drain when the future resolves.
    pub fn shutdown_signal<F>(mut self, signal: F) -> Self
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.signal = Some(Box::pin(signal));
        self
    }

    /// Runs the server until it fails, a termination signal arrives, or `ctx`
    /// is cancelled. See the [module docs](self) for the shutdown sequence.
    ///
    /// TLS is chosen in this order: `cert_key` (PEM certificate chain, PEM
    /// private key), then the config set with
    /// [`tls_config`](Server::tls_config), else plain HTTP.
    pub async fn run(
        self,
        ctx: CancellationToken,
        shutdown_timeout: Duration,
        cert_key: Option<(PathBuf, PathBuf)>,
    ) -> Result<(), Error> {
        let Self { addr, handler, tls, signal } = self;
        let tls = select_tls(cert_key, tls);

        let stop = CancellationToken::new();
        let mut serving = tokio::spawn(serve(addr, handler, tls, stop.clone()));
        let signal = signal.unwrap_or_else(|| Box::pin(os_shutdown_signal()));

        tokio::select! {
            res = &mut serving => {
                return match res {
                    Ok(outcome) => outcome,
                    Err(e) => Err(Error::Task(e)),
                };
            }
            () = signal => info!("shutdown signal received"),
            () = ctx.cancelled() => info!("context canceled"),
        }

        drain(serving, stop, shutdown_timeout).await
    }
}

fn select_tls(cert_key: Option<(PathBuf, PathBuf)>, embedded: Option<Arc<ServerConfig>>) -> Option<Tls> {
    match (cert_key, embedded) {
        (Some((cert, key)), _) => Some(Tls::Files(cert, key)),
        (None, Some(config)) => Some(Tls::Config(config)),
        (None, None) => None,
    }
}

// ── Serving task ──────────────────────────────────────────────────────────────

/// Accept loop. Returns `Ok(())` only after `stop` fired and every connection
/// finished.
async fn serve(
    addr: String,
    handler: BoxedHandler,
    tls: Option<Tls>,
    stop: CancellationToken,
) -> Result<(), Error> {
    let acceptor = match tls {
        Some(Tls::Files(cert, key)) => {
            // PEM files are read with blocking I/O.
            let config = tokio::task::spawn_blocking(move || tls::load_server_config(&cert, &key)).await??;
            Some(TlsAcceptor::from(config))
        }
        Some(Tls::Config(config)) => Some(TlsAcceptor::from(config)),
        None => None,
    };

    let listener = TcpListener::bind(addr.as_str())
        .await
        .map_err(|source| Error::Bind { addr: addr.clone(), source })?;
    info!(addr = %listener.local_addr()?, tls = acceptor.is_some(), "listening");

    let mut connections = JoinSet::new();

    loop {
        tokio::select! {
            // Stop wins over a queued accept.
            biased;

            () = stop.cancelled() => {
                info!(in_flight = connections.len(), "draining connections");
                break;
            }

            res = listener.accept() => {
                let (stream, peer) = match res {
                    Ok(v) => v,
                    Err(e) => {
                        error!("accept error: {e}");
                        continue;
                    }
                };

                let handler = Arc::clone(&handler);
                let acceptor = acceptor.clone();
                let stop = stop.clone();

                connections.spawn(async move {
                    match acceptor {
                        Some(acceptor) => match acceptor.accept(stream).await {
                            Ok(stream) => serve_connection(stream, peer, handler, stop).await,
                            Err(e) => debug!(%peer, "tls handshake failed: {e}"),
                        },
                        None => serve_connection(stream, peer, handler, stop).await,
                    }
                });
            }

            // Reap finished connections so the set stays small.
            Some(_) = connections.join_next(), if !connections.is_empty() => {}
        }
    }

    drop(listener);
    while connections.join_next().await.is_some() {}

    Ok(())
}

/// Serves one connection (HTTP/1.1 or HTTP/2) until the peer is done, or
/// until `stop` fires and the in-flight requests complete.
async fn serve_connection<I>(io: I, peer: SocketAddr, handler: BoxedHandler, stop: CancellationToken)
where
    I: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let svc = service_fn(move |req: hyper::Request<Incoming>| {
        let handler = Arc::clone(&handler);
        async move { Ok::<_, Infallible>(dispatch(handler, req, peer).await) }
    });

    let builder = ConnBuilder::new(TokioExecutor::new());
    let conn = builder.serve_connection(TokioIo::new(io), svc);
    tokio::pin!(conn);

    tokio::select! {
        res = conn.as_mut() => {
            if let Err(e) = res {
                debug!(%peer, "connection error: {e}");
            }
            return;
        }
        () = stop.cancelled() => {}
    }

    conn.as_mut().graceful_shutdown();
    if let Err(e) = conn.await {
        debug!(%peer, "connection error during shutdown: {e}");
    }
}

async fn dispatch(handler: BoxedHandler, req: hyper::Request<Incoming>, peer: SocketAddr) -> http::Response<Body> {
    let method = req.method().clone();
    let path = req.uri().path().to_owned();

    let response = handler.call(Request::new(req, Some(peer))).await;

    debug!(%method, %path, status = response.status_code().as_u16(), "request served");
    response.into_inner()
}

// ── Shutdown ──────────────────────────────────────────────────────────────────

async fn drain(
    mut serving: JoinHandle<Result<(), Error>>,
    stop: CancellationToken,
    timeout: Duration,
) -> Result<(), Error> {
    stop.cancel();

    let shutdown = match tokio::time::timeout(timeout, &mut serving).await {
        Ok(Ok(Ok(()))) => {
            info!("server exited gracefully");
            return Ok(());
        }
        Ok(Ok(Err(e))) => {
            warn!(error = %e, "server failed while draining");
            return Err(e);
        }
        Ok(Err(e)) => return Err(Error::Task(e)),
        Err(_) => Error::ShutdownTimeout(timeout),
    };

    warn!(error = %shutdown, "graceful shutdown failed, forcing close");

    // Aborting the serving task drops its JoinSet, which aborts every
    // connection task with it.
    serving.abort();
    match serving.await {
        Ok(Err(close)) => Err(Error::ForcedClose { shutdown: Box::new(shutdown), close: Box::new(close) }),
        Err(e) if e.is_panic() => {
            Err(Error::ForcedClose { shutdown: Box::new(shutdown), close: Box::new(Error::Task(e)) })
        }
        _ => Err(shutdown),
    }
}

/// Resolves on SIGINT / Ctrl-C, or SIGTERM on Unix.
///
/// A signal that cannot be subscribed to is logged and never fires; the
/// cancellation token still works.
async fn os_shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to install Ctrl-C handler: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let sigterm = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("failed to install SIGTERM handler: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let sigterm = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c  => {}
        () = sigterm => {}
    }
}

#[cfg(test)]
mod tests {
    use std::time::Instant;

    use super::*;
    use crate::response::Response;

    async fn ok(_req: Request) -> Response {
        Response::text("ok")
    }

    fn never() -> impl Future<Output = ()> + Send + 'static {
        std::future::pending()
    }

    #[test]
    fn explicit_cert_pair_wins_over_embedded_config() {
        let selected = select_tls(Some(("c.pem".into(), "k.pem".into())), None);
        assert!(matches!(selected, Some(Tls::Files(ref c, ref k)) if c.ends_with("c.pem") && k.ends_with("k.pem")));
        assert!(select_tls(None, None).is_none());
    }

    #[tokio::test]
    async fn cancelled_token_drains_and_returns_ok() {
        let ctx = CancellationToken::new();
        let server = Server::bind("127.0.0.1:0", ok).shutdown_signal(never());
        let run = tokio::spawn(server.run(ctx.clone(), Duration::from_secs(2), None));

        tokio::time::sleep(Duration::from_millis(50)).await;
        let started = Instant::now();
        ctx.cancel();

        let outcome = run.await.unwrap();
        assert!(outcome.is_ok(), "{outcome:?}");
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn injected_signal_triggers_shutdown() {
        let (tx, rx) = tokio::sync::oneshot::channel::<()>();
        let server = Server::bind("127.0.0.1:0", ok).shutdown_signal(async {
            let _ = rx.await;
        });
        let run = tokio::spawn(server.run(CancellationToken::new(), Duration::from_secs(2), None));

        tokio::time::sleep(Duration::from_millis(50)).await;
        tx.send(()).unwrap();

        let outcome = tokio::time::timeout(Duration::from_secs(3), run).await.unwrap().unwrap();
        assert!(outcome.is_ok(), "{outcome:?}");
    }

    #[tokio::test]
    async fn unreadable_certificates_fail_without_draining() {
        let server = Server::bind("127.0.0.1:0", ok).shutdown_signal(never());
        let cert_key = Some(("/nonexistent/cert.pem".into(), "/nonexistent/key.pem".into()));

        let outcome = server.run(CancellationToken::new(), Duration::from_secs(1), cert_key).await;
        assert!(matches!(outcome, Err(Error::Tls(_))), "{outcome:?}");
    }

    struct PanicOnDrop;

    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            panic!("close failed");
        }
    }

    #[tokio::test]
    async fn failed_forced_close_keeps_both_causes() {
        let serving = tokio::spawn(async {
            let _guard = PanicOnDrop;
            std::future::pending::<Result<(), Error>>().await
        });

        let err = drain(serving, CancellationToken::new(), Duration::from_millis(50)).await.unwrap_err();

        let Error::ForcedClose { shutdown, close } = &err else {
            panic!("expected a forced close, got {err:?}");
        };
        assert!(matches!(**shutdown, Error::ShutdownTimeout(t) if t == Duration::from_millis(50)));
        assert!(matches!(**close, Error::Task(ref e) if e.is_panic()));

        let msg = err.to_string();
        assert!(msg.contains("graceful shutdown did not finish within 50ms"), "{msg}");
        assert!(msg.contains("close failed"), "{msg}");
    }

    #[tokio::test]
    async fn cancelled_forced_close_reports_the_timeout() {
        let serving = tokio::spawn(std::future::pending::<Result<(), Error>>());

        let err = drain(serving, CancellationToken::new(), Duration::from_millis(50)).await.unwrap_err();
        assert!(matches!(err, Error::ShutdownTimeout(_)), "{err:?}");
    }
}
