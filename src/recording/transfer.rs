//! # File Transfer Pipeline
//!
//! Moves one recording artifact from the calling platform into blob storage:
//!
//! 1. **Download**: open a streamed download of the platform location
//! 2. **Persist**: drain the stream into a scratch file
//! 3. **Upload**: push the scratch file to the configured container
//! 4. **Cleanup**: remove the scratch file, whatever happened
//! 5. **Share**: log a read-only signed URL for the new blob
//!
//! Only a `TransferOutcome` leaves the pipeline. Failure details (including
//! request/response headers of failed HTTP calls) go to the log.

use crate::clients::{with_timeout, BlobStore, ByteStream, CallingClient, RemoteError};
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Result of moving one file.
#[derive(Debug, Clone, PartialEq)]
pub enum TransferOutcome {
    Success,
    Failure(String),
}

impl TransferOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TransferOutcome::Success)
    }
}

/// One artifact of a finished recording.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum FileKind {
    Recording,
    Metadata,
}

impl FileKind {
    pub fn format(&self) -> &'static str {
        match self {
            FileKind::Recording => "mp4",
            FileKind::Metadata => "json",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Recording => "recording",
            FileKind::Metadata => "metadata",
        }
    }
}

/// Scratch file removed when dropped.
struct ScratchFile {
    path: PathBuf,
}

impl ScratchFile {
    fn new(path: PathBuf) -> Self {
        Self { path }
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed scratch file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(path = %self.path.display(), error = %e, "Failed to remove scratch file"),
        }
    }
}

pub struct FileTransferPipeline {
    calling: Arc<dyn CallingClient>,
    storage: Arc<dyn BlobStore>,
    container: String,
    work_dir: PathBuf,
    timeout: Duration,
}

impl FileTransferPipeline {
    pub fn new(
        calling: Arc<dyn CallingClient>,
        storage: Arc<dyn BlobStore>,
        container: String,
        work_dir: PathBuf,
        timeout: Duration,
    ) -> Self {
        Self {
            calling,
            storage,
            container,
            work_dir,
            timeout,
        }
    }

    /// Move `download_location` into storage as `{document_id}.{format}`.
    pub async fn transfer(
        &self,
        document_id: &str,
        download_location: &str,
        kind: FileKind,
    ) -> TransferOutcome {
        info!(
            document_id,
            kind = kind.as_str(),
            download_location,
            "Start downloading file"
        );

        match self.run(document_id, download_location, kind).await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(document_id, kind = kind.as_str(), error = %err, "File transfer failed");
                if let Some(diagnostics) = err.diagnostics() {
                    info!(headers = ?diagnostics.request_headers, "Exception request headers");
                    info!(headers = ?diagnostics.response_headers, "Exception response headers");
                }
                TransferOutcome::Failure(err.to_string())
            }
        }
    }

    async fn run(
        &self,
        document_id: &str,
        download_location: &str,
        kind: FileKind,
    ) -> Result<TransferOutcome, RemoteError> {
        let stream = match with_timeout(self.timeout, self.calling.start_download(download_location)).await? {
            Some(stream) => stream,
            None => {
                warn!(document_id, kind = kind.as_str(), "Platform returned no content");
                return Ok(TransferOutcome::Failure(format!(
                    "no {} content at {}",
                    kind.as_str(),
                    download_location
                )));
            }
        };

        let blob_name = format!("{}.{}", document_id, kind.format());
        // Unique local name: two notifications for one document must not collide
        let scratch = ScratchFile::new(
            self.work_dir
                .join(format!("{}-{}", Uuid::new_v4(), blob_name)),
        );

        let written = with_timeout(self.timeout, persist_stream(stream, scratch.path())).await?;
        info!(document_id, kind = kind.as_str(), bytes = written, "Uploading file to blob");

        let upload = with_timeout(
            self.timeout,
            self.storage
                .upload_file(&self.container, &blob_name, scratch.path()),
        )
        .await;
        drop(scratch);
        upload?;

        info!(blob_name = %blob_name, container = %self.container, "File upload to storage successful");

        match self.storage.sas_url(&self.container, &blob_name) {
            Ok(url) => info!(blob_name = %blob_name, blob_url = %url, "Blob SAS URL issued"),
            Err(e) => warn!(blob_name = %blob_name, error = %e, "Failed to issue blob SAS URL"),
        }

        Ok(TransferOutcome::Success)
    }
}

/// Write every chunk to `path`. A read error ends the download early but the
/// bytes already received are kept; a timed-out read fails the download.
async fn persist_stream(mut stream: ByteStream, path: &Path) -> Result<u64, RemoteError> {
    let mut file = tokio::fs::File::create(path).await?;
    let mut written = 0u64;

    while let Some(chunk) = stream.next().await {
        match chunk {
            Ok(bytes) => {
                file.write_all(&bytes).await?;
                written += bytes.len() as u64;
            }
            Err(e) if e.is_timeout() => return Err(e),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Download stream ended with an error");
                break;
            }
        }
    }

    file.flush().await?;
    Ok(written)
}
