//! Strict JSON request decoding and JSON response encoding.
//!
//! Decoding is strict in two ways: a body must hold exactly one JSON value,
//! and (unless [`ToolsBuilder::allow_unknown_fields`](crate::ToolsBuilder::allow_unknown_fields)
//! is set) every key in it must be known to the target type. Failures come
//! back as a [`JsonError`] whose `Display` text is safe to show to a client.

use http::{HeaderMap, StatusCode};
use bytes::{Bytes, BytesMut};
use http_body_util::BodyExt;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

use crate::body::{Body, BoxError};
use crate::config::Tools;
use crate::error::Error;
use crate::request::Request;
use crate::response::{IntoResponse, Response};

/// Why a request body could not be decoded.
#[derive(Debug, Error)]
pub enum JsonError {
    #[error("body contains badly-formed JSON (at character {offset})")]
    Syntax { offset: usize },

    /// The body ended in the middle of a value.
    #[error("body contains badly-formed JSON")]
    Truncated,

    #[error("body contains incorrect JSON type for field \"{field}\"")]
    IncorrectType { field: String },

    #[error("body must not be empty")]
    Empty,

    #[error("body contains unknown key \"{0}\"")]
    UnknownKey(String),

    #[error("body must not be larger than {limit} bytes")]
    TooLarge { limit: usize },

    #[error("body must contain only one JSON value")]
    MultipleValues,

    #[error("failed to read body: {0}")]
    Body(#[source] BoxError),

    #[error(transparent)]
    Decode(serde_json::Error),
}

impl JsonError {
    fn is_syntax(&self) -> bool {
        matches!(self, Self::Syntax { .. } | Self::Truncated)
    }

    pub fn status(&self) -> StatusCode {
        match self {
            Self::TooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Body(_) => StatusCode::INTERNAL_SERVER_ERROR,
            _ => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for JsonError {
    fn into_response(self) -> Response {
        JsonResponse::failure(&self, self.status()).into_response_with(self.status())
    }
}

// ── Envelope ─────────────────────────────────────────────────────────────────

/// The default wire envelope: `{"error":…,"message":…,"data":…}`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JsonResponse {
    pub error: bool,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonResponse {
    /// The envelope for a failed request; `data` carries the status code.
    pub fn failure(err: &dyn std::error::Error, status: StatusCode) -> Self {
        Self {
            error: true,
            message: err.to_string(),
            data: Some(Value::from(status.as_u16())),
        }
    }

    pub(crate) fn into_response_with(self, status: StatusCode) -> Response {
        match serde_json::to_vec(&self) {
            Ok(body) => Response::builder().status(status).json(body),
            Err(_) => Response::status(status),
        }
    }
}

/// Renders an error into the JSON payload sent to the client.
///
/// Set one with [`ToolsBuilder::error_template`](crate::ToolsBuilder::error_template)
/// to change the shape of every [`Tools::error_json`] response. Closures work:
///
/// ```rust
/// use http::StatusCode;
/// use serde_json::json;
/// use tsu_toolkit::Tools;
///
/// let tools = Tools::builder()
///     .error_template(|err: &dyn std::error::Error, status: StatusCode| {
///         json!({ "code": status.as_u16(), "detail": err.to_string() })
///     })
///     .build();
/// ```
pub trait ErrorTemplate: Send + Sync {
    fn prepare(&self, err: &dyn std::error::Error, status: StatusCode) -> Value;
}

impl ErrorTemplate for JsonResponse {
    fn prepare(&self, err: &dyn std::error::Error, status: StatusCode) -> Value {
        serde_json::to_value(Self::failure(err, status)).unwrap_or(Value::Null)
    }
}

impl<F> ErrorTemplate for F
where
    F: Fn(&dyn std::error::Error, StatusCode) -> Value + Send + Sync,
{
    fn prepare(&self, err: &dyn std::error::Error, status: StatusCode) -> Value {
        self(err, status)
    }
}

// ── Codec ─────────────────────────────────────────────────────────────────────

impl Tools {
    /// Reads the request body, at most `max_json_size` bytes of it, and
    /// decodes exactly one JSON value into `T`.
    ///
    /// The body is taken out of `req`; a second call sees an empty body.
    pub async fn read_json<T: DeserializeOwned>(&self, req: &mut Request) -> Result<T, JsonError> {
        let limit = self.max_json_size();
        let bytes = read_limited(req.take_body(), limit).await?;
        decode_strict(&bytes, self.allow_unknown_fields())
    }

    /// Serializes `value` into a JSON response with `status`.
    ///
    /// `headers` are merged in first; `content-type` is then set to
    /// `application/json` whatever the caller passed. A value that fails to
    /// serialize yields `Error::Serialize` and no response.
    pub fn write_json<T: Serialize + ?Sized>(
        &self,
        status: StatusCode,
        value: &T,
        headers: Option<HeaderMap>,
    ) -> Result<Response, Error> {
        let body = serde_json::to_vec(value).map_err(Error::Serialize)?;

        let mut builder = Response::builder().status(status);
        if let Some(headers) = headers {
            builder = builder.headers(headers);
        }
        Ok(builder.json(body))
    }

    /// Writes `err` as a JSON error payload. `status` defaults to
    /// `400 Bad Request`.
    pub fn error_json<E: std::error::Error>(&self, err: &E, status: Option<StatusCode>) -> Result<Response, Error> {
        let status = status.unwrap_or(StatusCode::BAD_REQUEST);

        let payload = match self.error_template() {
            Some(template) => template.prepare(err, status),
            None => serde_json::to_value(JsonResponse::failure(err, status)).map_err(Error::Serialize)?,
        };

        self.write_json(status, &payload, None)
    }
}

async fn read_limited(mut body: Body, limit: usize) -> Result<Bytes, JsonError> {
    let mut buf = BytesMut::new();

    while let Some(frame) = body.frame().await {
        let Ok(data) = frame.map_err(JsonError::Body)?.into_data() else {
            continue;
        };
        if buf.len() + data.len() > limit {
            return Err(JsonError::TooLarge { limit });
        }
        buf.extend_from_slice(&data);
    }

    Ok(buf.freeze())
}

/// Decodes exactly one JSON value from `bytes` into `T`.
///
/// Keys not known to `T` are rejected unless `allow_unknown_fields` is set.
/// Fields absent from the payload follow `T`'s serde attributes; use
/// `#[serde(default)]` to fill them with defaults.
///
/// Malformed or truncated JSON is reported before anything else. Otherwise
/// the first fault in document order wins, so an unknown key ahead of a
/// mistyped field is reported as the unknown key. Field names are serde
/// paths: `inner.age` for nested fields, `[0]` for a struct sent as an
/// array, which serde accepts positionally.
pub fn decode_strict<T: DeserializeOwned>(bytes: &[u8], allow_unknown_fields: bool) -> Result<T, JsonError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Err(JsonError::Empty);
    }

    let mut de = serde_json::Deserializer::from_slice(bytes);
    let mut unknown: Option<String> = None;

    let mut on_ignored = |path: serde_ignored::Path<'_>| {
        unknown.get_or_insert_with(|| path.to_string());
    };
    let decoded: Result<T, _> =
        serde_path_to_error::deserialize(serde_ignored::Deserializer::new(&mut de, &mut on_ignored));

    let value = match decoded {
        Ok(value) => value,
        Err(e) => {
            let err = classify(e, bytes);
            // An unknown key met before a data fault is the first fault.
            return Err(match unknown {
                Some(key) if !allow_unknown_fields && !err.is_syntax() => JsonError::UnknownKey(key),
                _ => err,
            });
        }
    };

    if let Some(key) = unknown {
        if !allow_unknown_fields {
            return Err(JsonError::UnknownKey(key));
        }
        debug!(key, "ignoring unknown JSON key");
    }

    de.end().map_err(|_| JsonError::MultipleValues)?;
    Ok(value)
}

fn classify(err: serde_path_to_error::Error<serde_json::Error>, bytes: &[u8]) -> JsonError {
    use serde_json::error::Category;

    let field = err.path().to_string();
    let err = err.into_inner();

    match err.classify() {
        Category::Syntax => JsonError::Syntax { offset: byte_offset(bytes, err.line(), err.column()) },
        Category::Eof => JsonError::Truncated,
        Category::Data => {
            let msg = err.to_string();
            if msg.starts_with("invalid type") || msg.starts_with("invalid value") || msg.starts_with("invalid length") {
                JsonError::IncorrectType { field }
            } else if let Some(key) = denied_field(&msg) {
                JsonError::UnknownKey(key.to_owned())
            } else {
                JsonError::Decode(err)
            }
        }
        Category::Io => JsonError::Decode(err),
    }
}

/// Pulls `name` out of serde's "unknown field `name`, expected …" message,
/// raised by types that carry `#[serde(deny_unknown_fields)]`.
fn denied_field(msg: &str) -> Option<&str> {
    let rest = msg.strip_prefix("unknown field `")?;
    rest.split('`').next()
}

/// Converts serde_json's 1-based line/column into a byte offset.
fn byte_offset(bytes: &[u8], line: usize, column: usize) -> usize {
    let preceding: usize = bytes
        .split(|b| *b == b'\n')
        .take(line.saturating_sub(1))
        .map(|l| l.len() + 1)
        .sum();
    preceding + column
}
