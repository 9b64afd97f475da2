//! Unified error type.

use std::time::Duration;

use http::StatusCode;
use thiserror::Error;

use crate::json::{JsonError, JsonResponse};
use crate::response::{IntoResponse, Response};

/// The error type returned by the toolkit's fallible operations.
///
/// Decode failures keep their own taxonomy in [`JsonError`] so a caller can
/// branch on the cause; it converts into `Error::Json` when mixed with the
/// rest.
#[derive(Debug, Error)]
pub enum Error {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("tls: {0}")]
    Tls(String),

    #[error("graceful shutdown did not finish within {0:?}")]
    ShutdownTimeout(Duration),

    /// Graceful shutdown failed and the forced close failed too.
    #[error("server forced to close: {shutdown}; {close}")]
    ForcedClose {
        shutdown: Box<Error>,
        close: Box<Error>,
    },

    #[error("server task failed: {0}")]
    Task(#[from] tokio::task::JoinError),

    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode JSON: {0}")]
    Serialize(#[source] serde_json::Error),

    #[error(transparent)]
    Json(#[from] JsonError),

    #[error("the uploaded file is too big")]
    FileTooBig,

    #[error("invalid file type")]
    InvalidFileType,

    #[error("no file found in the request")]
    NoFile,

    #[error("invalid file name {0:?}")]
    InvalidFileName(String),

    #[error("multipart: {0}")]
    Multipart(#[from] multer::Error),

    #[error("empty string not allowed")]
    EmptyString,

    #[error("empty string, after slug process")]
    EmptySlug,

    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("invalid header value: {0}")]
    InvalidHeader(#[from] http::header::InvalidHeaderValue),

    #[error("invalid configuration: {0}")]
    Config(#[from] toml::de::Error),
}

impl Error {
    /// The HTTP status a handler should answer with when it gives up on
    /// this error.
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Json(e) => e.status(),
            Self::FileTooBig => StatusCode::PAYLOAD_TOO_LARGE,
            Self::InvalidFileType => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            Self::NoFile
            | Self::InvalidFileName(_)
            | Self::Multipart(_)
            | Self::EmptyString
            | Self::EmptySlug => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        JsonResponse::failure(&self, self.status()).into_response_with(self.status())
    }
}
