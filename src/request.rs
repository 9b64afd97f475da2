//! Incoming HTTP request type.

use std::net::SocketAddr;

use bytes::Bytes;
use http::{HeaderMap, Method, Uri};
use hyper::body::Body as HttpBody;

use crate::body::{self, Body, BoxError};

/// An incoming HTTP request: the parsed head plus a still-streaming body.
///
/// The body is read at most once. [`Tools::read_json`](crate::Tools::read_json)
/// and [`Tools::upload_files`](crate::Tools::upload_files) take it; after that
/// the request reads as empty.
pub struct Request {
    head: http::request::Parts,
    body: Body,
    remote_addr: Option<SocketAddr>,
}

impl Request {
    /// Wraps an `http::Request` with any `Bytes` body.
    pub fn new<B>(req: http::Request<B>, remote_addr: Option<SocketAddr>) -> Self
    where
        B: HttpBody<Data = Bytes> + Send + 'static,
        B::Error: Into<BoxError>,
    {
        let (head, body) = req.into_parts();
        Self { head, body: body::boxed(body), remote_addr }
    }

    pub fn method(&self) -> &Method { &self.head.method }
    pub fn uri(&self) -> &Uri { &self.head.uri }
    pub fn path(&self) -> &str { self.head.uri.path() }
    pub fn headers(&self) -> &HeaderMap { &self.head.headers }

    /// Peer address, when the request came in over a socket.
    pub fn remote_addr(&self) -> Option<SocketAddr> { self.remote_addr }

    /// Case-insensitive header lookup. Values that are not visible ASCII read
    /// as absent.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.head.headers.get(name)?.to_str().ok()
    }

    /// Takes the body out of the request, leaving an empty one behind.
    pub fn take_body(&mut self) -> Body {
        std::mem::replace(&mut self.body, body::empty())
    }

    pub fn into_body(self) -> Body { self.body }
}

impl<B> From<http::Request<B>> for Request
where
    B: HttpBody<Data = Bytes> + Send + 'static,
    B::Error: Into<BoxError>,
{
    fn from(req: http::Request<B>) -> Self {
        Self::new(req, None)
    }
}
