//! Boxed HTTP body shared by requests and responses.
//!
//! Request bodies arrive as hyper's `Incoming` stream, response bodies are
//! either an in-memory buffer or a file stream. Boxing hides the difference so
//! [`Request`](crate::Request) and [`Response`](crate::Response) stay
//! non-generic.

use bytes::Bytes;
use http_body_util::{BodyExt, Empty, Full};
use hyper::body::Body as HttpBody;

/// Error type carried by [`Body`].
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// A type-erased body. `Send` but not `Sync`: it is polled by one task at a
/// time.
pub type Body = http_body_util::combinators::UnsyncBoxBody<Bytes, BoxError>;

/// Erases the concrete type of any `Bytes` body.
pub fn boxed<B>(body: B) -> Body
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    body.map_err(Into::into).boxed_unsync()
}

/// A body holding `bytes` in full.
pub fn full(bytes: impl Into<Bytes>) -> Body {
    boxed(Full::new(bytes.into()))
}

/// A body with no data.
pub fn empty() -> Body {
    boxed(Empty::<Bytes>::new())
}
