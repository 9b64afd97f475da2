//! Handler trait and type erasure.
//!
//! A [`Server`](crate::Server) holds exactly one handler, but the handler's
//! concrete type (an `async fn`, a closure capturing a `Tools`) is different
//! for every application. The server therefore stores it as a trait object:
//!
//! ```text
//! async fn app(req: Request) -> Response { … }   ← user writes this
//!        ↓ Server::bind(addr, app)
//! app.into_boxed_handler()                       ← Handler blanket impl
//!        ↓
//! Arc<FnHandler(app)>                            ← shared by every connection
//!        ↓
//! handler.call(req) per request                  ← one vtable dispatch
//! ```

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// A boxed, `Send` future resolving to a [`Response`].
pub(crate) type BoxFuture = Pin<Box<dyn Future<Output = Response> + Send + 'static>>;

#[doc(hidden)]
pub trait ErasedHandler {
    fn call(&self, req: Request) -> BoxFuture;
}

#[doc(hidden)]
pub type BoxedHandler = Arc<dyn ErasedHandler + Send + Sync + 'static>;

/// Implemented for every valid request handler.
///
/// Satisfied automatically by any `Fn(Request) -> impl Future<Output = impl IntoResponse>`
/// that is `Send + Sync + 'static`, including closures that clone shared state
/// into the returned future:
///
/// ```rust,no_run
/// use tsu_toolkit::{Request, Response, Server, Tools};
///
/// let tools = Tools::new();
/// let server = Server::bind("127.0.0.1:3000", move |mut req: Request| {
///     let tools = tools.clone();
///     async move {
///         match tools.read_json::<serde_json::Value>(&mut req).await {
///             Ok(v) => Response::json(v.to_string().into_bytes()),
///             Err(e) => tools.error_json(&e, None).unwrap_or_else(|e| Response::text(e.to_string())),
///         }
///     }
/// });
/// ```
///
/// The trait is sealed: only the blanket impl can satisfy it.
pub trait Handler: private::Sealed + Send + Sync + 'static {
    #[doc(hidden)]
    fn into_boxed_handler(self) -> BoxedHandler;
}

mod private {
    pub trait Sealed {}
}

impl<F, Fut, R> private::Sealed for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
}

impl<F, Fut, R> Handler for F
where
    F: Fn(Request) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn into_boxed_handler(self) -> BoxedHandler {
        Arc::new(FnHandler(self))
    }
}

struct FnHandler<F>(F);

impl<F, Fut, R> ErasedHandler for FnHandler<F>
where
    F: Fn(Request) -> Fut + Send + Sync,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse + Send + 'static,
{
    fn call(&self, req: Request) -> BoxFuture {
        let fut = (self.0)(req);
        Box::pin(async move { fut.await.into_response() })
    }
}
