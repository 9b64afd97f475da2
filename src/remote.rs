//! Outbound JSON posting.

use http::StatusCode;
use serde::Serialize;
use tracing::debug;

use crate::error::Error;

/// POSTs `value` as JSON to `url` and hands back the response with its
/// status.
///
/// Any status counts as success; only transport failures are errors. Pass a
/// `client` to reuse its connection pool or to inject timeouts and proxies,
/// otherwise a fresh default client is built for the call.
pub async fn push_json_to_remote<T: Serialize + ?Sized>(
    url: &str,
    value: &T,
    client: Option<&reqwest::Client>,
) -> Result<(reqwest::Response, StatusCode), Error> {
    let body = serde_json::to_vec(value).map_err(Error::Serialize)?;

    let owned;
    let client = match client {
        Some(c) => c,
        None => {
            owned = reqwest::Client::new();
            &owned
        }
    };

    let res = client
        .post(url)
        .header(http::header::CONTENT_TYPE, "application/json")
        .body(body)
        .send()
        .await?;

    let status = res.status();
    debug!(url, %status, "pushed JSON to remote");
    Ok((res, status))
}
