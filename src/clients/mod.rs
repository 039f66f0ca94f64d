//! # Remote Collaborators
//!
//! Clients for the two services the relay sits between:
//! - **calling**: the calling platform's server-call recording API and its
//!   recording download endpoint
//! - **storage**: blob storage uploads and signed (SAS) read URLs
//!
//! Both are exposed as traits so handlers and the transfer pipeline can be
//! exercised against in-memory fakes. The shared `RemoteError` type carries
//! enough of the failed HTTP exchange to log it for diagnostics.

pub mod auth;
pub mod calling;
pub mod storage;

pub use calling::{AcsCallingClient, ByteStream, CallingClient, ServerCall};
pub use storage::{AzureBlobStore, BlobStore};

use reqwest::header::HeaderMap;
use std::time::Duration;
use thiserror::Error;

/// Failure talking to the calling platform or to blob storage.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// The service answered with a non-success status
    #[error("{message} (status {status}, code {code})")]
    Api {
        status: u16,
        code: String,
        message: String,
        diagnostics: Option<HttpDiagnostics>,
    },

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("invalid credentials: {0}")]
    Credentials(String),

    #[error("timed out after {0:?}")]
    Timeout(Duration),

    #[error("local file error: {0}")]
    Io(#[from] std::io::Error),
}

impl RemoteError {
    /// True for our own deadline and for reqwest's client-wide timeout.
    pub fn is_timeout(&self) -> bool {
        match self {
            RemoteError::Timeout(_) => true,
            RemoteError::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Headers of the failed exchange, when the error came from an HTTP response.
    pub fn diagnostics(&self) -> Option<&HttpDiagnostics> {
        match self {
            RemoteError::Api { diagnostics, .. } => diagnostics.as_ref(),
            _ => None,
        }
    }
}

/// Request and response headers captured from a failed call.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HttpDiagnostics {
    pub request_headers: Vec<(String, String)>,
    pub response_headers: Vec<(String, String)>,
}

impl HttpDiagnostics {
    pub fn new(request: &HeaderMap, response: &HeaderMap) -> Self {
        Self {
            request_headers: snapshot_headers(request),
            response_headers: snapshot_headers(response),
        }
    }
}

/// Copy headers into owned pairs, masking credentials.
pub fn snapshot_headers(headers: &HeaderMap) -> Vec<(String, String)> {
    headers
        .iter()
        .map(|(name, value)| {
            let value = if name == reqwest::header::AUTHORIZATION {
                "<redacted>".to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name.as_str().to_string(), value)
        })
        .collect()
}

/// Run a remote call under a deadline, mapping expiry to `RemoteError::Timeout`.
pub async fn with_timeout<T, F>(limit: Duration, call: F) -> Result<T, RemoteError>
where
    F: std::future::Future<Output = Result<T, RemoteError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(limit)),
    }
}
