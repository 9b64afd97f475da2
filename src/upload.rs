//! Multipart upload pipeline.
//!
//! The request body is parsed as a stream with `multer`; nothing is buffered
//! beyond the first [`SNIFF_LEN`] bytes of each part, which decide the
//! content type before any byte reaches the disk.

use std::path::Path;

use http::header::CONTENT_TYPE;
use http_body_util::BodyExt;
use multer::{Constraints, Field, Multipart, SizeLimit};
use serde::Serialize;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::config::Tools;
use crate::error::Error;
use crate::fs::create_dir_if_not_exists;
use crate::request::Request;
use crate::sniff::{self, SNIFF_LEN};
use crate::strings::random_string;

/// Room for boundaries and part headers on top of the per-file bound.
const FRAMING_ALLOWANCE: u64 = 64 * 1024;

const RENAMED_LEN: usize = 25;

/// A file stored by [`Tools::upload_files`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadedFile {
    /// The file name the client sent, unchanged.
    pub original_file_name: String,
    /// The name the file was stored under inside the target directory.
    pub new_file_name: String,
    pub file_size: u64,
}

/// An upload batch that stopped early.
///
/// Files stored before the failure stay on disk and are listed in
/// `uploaded`; cleaning them up is the caller's decision.
#[derive(Debug, Error)]
#[error("{error}")]
pub struct UploadError {
    pub uploaded: Vec<UploadedFile>,
    #[source]
    pub error: Error,
}

impl UploadError {
    pub fn into_parts(self) -> (Vec<UploadedFile>, Error) {
        (self.uploaded, self.error)
    }
}

impl From<UploadError> for Error {
    fn from(e: UploadError) -> Self {
        e.error
    }
}

impl Tools {
    /// Stores every file part of a `multipart/form-data` request in `dir`,
    /// creating the directory when missing.
    ///
    /// Each part is sniffed and checked against the allowed types, then
    /// written under a random name keeping the original extension when
    /// `rename` is set, or under its base name otherwise. The first failure
    /// ends the batch.
    pub async fn upload_files(
        &self,
        req: &mut Request,
        dir: impl AsRef<Path>,
        rename: bool,
    ) -> Result<Vec<UploadedFile>, UploadError> {
        self.upload(req, dir.as_ref(), rename, usize::MAX).await
    }

    /// Like [`upload_files`](Self::upload_files) but stores only the first
    /// file part. A request without one fails with [`Error::NoFile`].
    pub async fn upload_one_file(
        &self,
        req: &mut Request,
        dir: impl AsRef<Path>,
        rename: bool,
    ) -> Result<UploadedFile, UploadError> {
        let mut files = self.upload(req, dir.as_ref(), rename, 1).await?;
        files.pop().ok_or(UploadError { uploaded: Vec::new(), error: Error::NoFile })
    }

    async fn upload(
        &self,
        req: &mut Request,
        dir: &Path,
        rename: bool,
        max_files: usize,
    ) -> Result<Vec<UploadedFile>, UploadError> {
        let mut uploaded = Vec::new();
        match self.upload_into(&mut uploaded, req, dir, rename, max_files).await {
            Ok(()) => Ok(uploaded),
            Err(error) => {
                debug!(stored = uploaded.len(), %error, "upload stopped");
                Err(UploadError { uploaded, error })
            }
        }
    }

    async fn upload_into(
        &self,
        uploaded: &mut Vec<UploadedFile>,
        req: &mut Request,
        dir: &Path,
        rename: bool,
        max_files: usize,
    ) -> Result<(), Error> {
        create_dir_if_not_exists(dir, 0o755).await?;

        let boundary = multer::parse_boundary(req.header(CONTENT_TYPE.as_str()).unwrap_or_default())?;
        let limits = SizeLimit::new()
            .whole_stream(self.max_file_size().saturating_add(FRAMING_ALLOWANCE))
            .per_field(self.max_file_size());
        let mut multipart = Multipart::with_constraints(
            req.take_body().into_data_stream(),
            boundary,
            Constraints::new().size_limit(limits),
        );

        while uploaded.len() < max_files {
            let Some(mut field) = multipart.next_field().await.map_err(part_error)? else {
                break;
            };
            let original = match field.file_name() {
                Some(name) if !name.is_empty() => name.to_owned(),
                _ => continue,
            };
            uploaded.push(self.store(&mut field, original, dir, rename).await?);
        }

        Ok(())
    }

    async fn store(
        &self,
        field: &mut Field<'static>,
        original_file_name: String,
        dir: &Path,
        rename: bool,
    ) -> Result<UploadedFile, Error> {
        let base = base_name(&original_file_name)?;

        let mut head = Vec::with_capacity(SNIFF_LEN);
        while head.len() < SNIFF_LEN {
            match field.chunk().await.map_err(part_error)? {
                Some(chunk) => head.extend_from_slice(&chunk),
                None => break,
            }
        }

        let content_type = sniff::detect_content_type(&head);
        if !sniff::is_allowed(content_type, self.allowed_file_types()) {
            debug!(file = %original_file_name, content_type, "upload type not allowed");
            return Err(Error::InvalidFileType);
        }

        let new_file_name = if rename { renamed(base) } else { base.to_owned() };
        let path = dir.join(&new_file_name);

        match write_part(field, &head, &path).await {
            Ok(file_size) => {
                debug!(file = %original_file_name, stored = %path.display(), file_size, content_type, "upload stored");
                Ok(UploadedFile { original_file_name, new_file_name, file_size })
            }
            Err(e) => {
                if let Err(rm) = tokio::fs::remove_file(&path).await {
                    warn!(path = %path.display(), error = %rm, "could not remove partial upload");
                }
                Err(e)
            }
        }
    }
}

async fn write_part(field: &mut Field<'static>, head: &[u8], path: &Path) -> Result<u64, Error> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(head).await?;
    let mut size = head.len() as u64;

    while let Some(chunk) = field.chunk().await.map_err(part_error)? {
        file.write_all(&chunk).await?;
        size += chunk.len() as u64;
    }

    file.flush().await?;
    Ok(size)
}

/// The last path component of a client-supplied name, for either separator.
fn base_name(name: &str) -> Result<&str, Error> {
    match name.rsplit(['/', '\\']).next() {
        Some(base) if !base.is_empty() && base != "." && base != ".." => Ok(base),
        _ => Err(Error::InvalidFileName(name.to_owned())),
    }
}

fn renamed(base: &str) -> String {
    let token = random_string(RENAMED_LEN);
    match Path::new(base).extension().and_then(|e| e.to_str()) {
        Some(ext) => format!("{token}.{ext}"),
        None => token,
    }
}

fn part_error(e: multer::Error) -> Error {
    match e {
        multer::Error::FieldSizeExceeded { .. } | multer::Error::StreamSizeExceeded { .. } => Error::FileTooBig,
        e => Error::Multipart(e),
    }
}
