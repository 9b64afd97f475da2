//! Directory and file-download helpers.

use std::io;
use std::path::Path;

use futures_util::TryStreamExt;
use http::header::{CONTENT_DISPOSITION, CONTENT_LENGTH, HeaderValue};
use http::StatusCode;
use hyper::body::Frame;
use http_body_util::StreamBody;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::body;
use crate::error::Error;
use crate::response::Response;
use crate::sniff;

/// Creates `path` and any missing parents. An existing directory is not an
/// error. `mode` sets the permission bits of created directories on Unix and
/// is ignored elsewhere.
pub async fn create_dir_if_not_exists(path: impl AsRef<Path>, mode: u32) -> Result<(), Error> {
    let mut builder = tokio::fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    builder.mode(mode);
    #[cfg(not(unix))]
    let _ = mode;

    builder.create(path.as_ref()).await?;
    Ok(())
}

/// Streams `dir/file` as an attachment the browser saves as `display_name`.
///
/// A missing file answers `404 Not Found`. The display name goes into the
/// `Content-Disposition` header verbatim; one that is not a valid header
/// value (control characters) is rejected.
pub async fn download_static_file(
    dir: impl AsRef<Path>,
    file: impl AsRef<Path>,
    display_name: &str,
) -> Result<Response, Error> {
    let disposition = HeaderValue::from_str(&format!("attachment; filename=\"{display_name}\""))?;
    let path = dir.as_ref().join(file);

    let file = match tokio::fs::File::open(&path).await {
        Ok(f) => f,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "download target not found");
            return Ok(Response::builder().status(StatusCode::NOT_FOUND).text("404 page not found"));
        }
        Err(e) => return Err(e.into()),
    };
    let len = file.metadata().await?.len();

    let stream = ReaderStream::new(file).map_ok(Frame::data);
    let content_type = HeaderValue::from_static(sniff::content_type_for_path(&path));

    Ok(Response::builder()
        .header(CONTENT_DISPOSITION, disposition)
        .header(CONTENT_LENGTH, HeaderValue::from(len))
        .body(content_type, body::boxed(StreamBody::new(stream))))
}
