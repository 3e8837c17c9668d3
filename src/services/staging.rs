use crate::utils::validation::{sanitize_filename, staging_extension};
use axum::extract::multipart::MultipartError;
use axum::http::StatusCode;
use bytes::Bytes;
use futures::{Stream, StreamExt};
use std::io;
use std::path::{Path, PathBuf};
use tempfile::TempPath;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

/// Every staging file name starts with this prefix.
pub const STAGING_PREFIX: &str = "vs-";

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("uploaded file is missing or not an image")]
    NotAnImage,

    #[error("upload exceeds the {limit} byte limit")]
    TooLarge { limit: usize },

    #[error("malformed upload: {0}")]
    Malformed(String),

    #[error("staging I/O failed: {0}")]
    Io(#[from] io::Error),
}

impl UploadError {
    /// Classify a multipart read failure; `limit` is the image cap reported on 413.
    pub fn from_multipart(err: MultipartError, limit: usize) -> Self {
        if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
            UploadError::TooLarge { limit }
        } else {
            UploadError::Malformed(err.body_text())
        }
    }
}

/// An upload held on local disk for the duration of one request.
///
/// The file is removed by [`StagedFile::release`], or by the drop guard if the
/// request ends any other way.
#[derive(Debug)]
pub struct StagedFile {
    pub original_name: String,
    pub mime_type: String,
    pub size_bytes: u64,
    path: TempPath,
}

impl StagedFile {
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Delete the staged bytes. Failures are logged and swallowed.
    pub fn release(self) {
        let StagedFile {
            original_name,
            path,
            ..
        } = self;
        let location = path.to_path_buf();

        match path.close() {
            Ok(()) => debug!(
                "Staged file {} ({}) deleted",
                location.display(),
                original_name
            ),
            Err(e) => warn!(
                "Could not delete staged file {}: {}",
                location.display(),
                e
            ),
        }
    }
}

/// The directory uploads are staged in.
pub struct StagingArea {
    dir: PathBuf,
    max_file_size: usize,
}

impl StagingArea {
    pub fn new(dir: impl Into<PathBuf>, max_file_size: usize) -> Self {
        Self {
            dir: dir.into(),
            max_file_size,
        }
    }

    /// Create the directory and remove staging files left behind by an earlier process.
    pub async fn prepare(&self) -> io::Result<usize> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let mut removed = 0;
        let mut entries = tokio::fs::read_dir(&self.dir).await?;
        while let Some(entry) = entries.next_entry().await? {
            let is_staged = entry
                .file_name()
                .to_str()
                .is_some_and(|name| name.starts_with(STAGING_PREFIX));
            if !is_staged || !entry.file_type().await?.is_file() {
                continue;
            }
            match tokio::fs::remove_file(entry.path()).await {
                Ok(()) => removed += 1,
                Err(e) => warn!("Could not purge {}: {}", entry.path().display(), e),
            }
        }

        if removed > 0 {
            info!("🧹 Purged {} stale staging file(s) from {}", removed, self.dir.display());
        }
        Ok(removed)
    }

    /// Whether the staging directory exists and is writable.
    pub async fn is_ready(&self) -> bool {
        match tokio::fs::metadata(&self.dir).await {
            Ok(meta) => meta.is_dir() && !meta.permissions().readonly(),
            Err(_) => false,
        }
    }

    /// Stream an uploaded image into a fresh staging file.
    ///
    /// The declared content type must be `image/*`; nothing is written otherwise.
    pub async fn stage<S>(
        &self,
        original_name: &str,
        content_type: Option<&str>,
        body: S,
    ) -> Result<StagedFile, UploadError>
    where
        S: Stream<Item = Result<Bytes, UploadError>>,
    {
        let mime_type = content_type
            .and_then(|ct| ct.parse::<mime::Mime>().ok())
            .filter(|m| m.type_() == mime::IMAGE)
            .ok_or(UploadError::NotAnImage)?;

        let display_name = sanitize_filename(original_name);
        let suffix = staging_extension(&display_name)
            .map(|ext| format!(".{ext}"))
            .unwrap_or_default();

        let named = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .suffix(&suffix)
            .tempfile_in(&self.dir)?;
        // From here on the TempPath deletes the file on every early return
        let (file, path) = named.into_parts();
        let mut file = tokio::fs::File::from_std(file);

        let mut body = std::pin::pin!(body);
        let mut size: u64 = 0;
        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            size += chunk.len() as u64;
            if size > self.max_file_size as u64 {
                return Err(UploadError::TooLarge {
                    limit: self.max_file_size,
                });
            }
            file.write_all(&chunk).await?;
        }
        file.flush().await?;
        drop(file);

        debug!(
            "Staged {} ({}, {} bytes) at {}",
            display_name,
            mime_type,
            size,
            path.display()
        );

        Ok(StagedFile {
            original_name: display_name,
            mime_type: mime_type.essence_str().to_string(),
            size_bytes: size,
            path,
        })
    }
}
