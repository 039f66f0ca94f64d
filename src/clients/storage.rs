//! # Object Storage Client
//!
//! Uploads local files as block blobs and issues read-only SAS URLs.
//! Uploads authenticate with a short-lived create/write SAS signed by the
//! account key, so no shared-key header canonicalization is needed.

use super::auth::{BlobSas, SAS_VERSION};
use super::{HttpDiagnostics, RemoteError};
use crate::config::StorageConfig;
use async_trait::async_trait;
use reqwest::header::CONTENT_LENGTH;
use std::path::Path;
use std::time::Duration;
use tokio_util::io::ReaderStream;
use tracing::debug;
use url::Url;

/// Operations the relay needs from blob storage.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload `path` to `container/blob_name`, replacing any existing blob.
    async fn upload_file(&self, container: &str, blob_name: &str, path: &Path)
        -> Result<(), RemoteError>;

    /// SAS query string granting read access to one blob.
    fn sas_token(&self, container: &str, blob_name: &str) -> Result<String, RemoteError>;

    /// Unsigned URL of a blob.
    fn blob_url(&self, container: &str, blob_name: &str) -> Result<Url, RemoteError>;

    /// Shareable read URL: the blob URL with its SAS token attached.
    fn sas_url(&self, container: &str, blob_name: &str) -> Result<String, RemoteError> {
        let mut url = self.blob_url(container, blob_name)?;
        url.set_query(Some(&self.sas_token(container, blob_name)?));
        Ok(url.to_string())
    }
}

/// Azure Blob Storage over REST.
pub struct AzureBlobStore {
    client: reqwest::Client,
    account_name: String,
    account_key: String,
    endpoint: Url,
    sas_expiry: chrono::Duration,
}

impl AzureBlobStore {
    pub fn new(config: &StorageConfig, timeout: Duration) -> anyhow::Result<Self> {
        if config.account_name.is_empty() || config.account_key.is_empty() {
            return Err(anyhow::anyhow!(
                "storage account name and key are required (directly or via connection string)"
            ));
        }

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            account_name: config.account_name.clone(),
            account_key: config.account_key.clone(),
            endpoint: Url::parse(&config.endpoint())?,
            sas_expiry: config.sas_expiry(),
        })
    }

    fn protocol(&self) -> &'static str {
        if self.endpoint.scheme() == "http" {
            "https,http"
        } else {
            "https"
        }
    }

    fn token(&self, container: &str, blob_name: &str, permissions: &str) -> Result<String, RemoteError> {
        BlobSas {
            account_name: &self.account_name,
            container,
            blob_name,
            permissions,
            expiry: chrono::Utc::now() + self.sas_expiry,
            protocol: self.protocol(),
        }
        .token(&self.account_key)
    }
}

#[async_trait]
impl BlobStore for AzureBlobStore {
    async fn upload_file(&self, container: &str, blob_name: &str, path: &Path)
        -> Result<(), RemoteError> {
        let file = tokio::fs::File::open(path).await?;
        let length = file.metadata().await?.len();

        let mut url = self.blob_url(container, blob_name)?;
        url.set_query(Some(&self.token(container, blob_name, "cw")?));

        debug!(container, blob_name, bytes = length, "Uploading blob");

        let request = self
            .client
            .put(url)
            .header("x-ms-blob-type", "BlockBlob")
            .header("x-ms-version", SAS_VERSION)
            .header(CONTENT_LENGTH, length)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)))
            .build()?;
        let request_headers = request.headers().clone();

        let response = self.client.execute(request).await?;
        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let diagnostics = HttpDiagnostics::new(&request_headers, response.headers());
        let text = response.text().await.unwrap_or_default();
        Err(RemoteError::Api {
            status: status.as_u16(),
            code: xml_error_code(&text).unwrap_or_else(|| status.as_u16().to_string()),
            message: format!("blob upload of {}/{} failed: {}", container, blob_name, text),
            diagnostics: Some(diagnostics),
        })
    }

    fn sas_token(&self, container: &str, blob_name: &str) -> Result<String, RemoteError> {
        self.token(container, blob_name, "r")
    }

    fn blob_url(&self, container: &str, blob_name: &str) -> Result<Url, RemoteError> {
        let mut url = self.endpoint.clone();
        url.path_segments_mut()
            .map_err(|_| {
                RemoteError::InvalidResponse(format!("blob endpoint cannot be a base: {}", self.endpoint))
            })?
            .pop_if_empty()
            .push(container)
            .push(blob_name);
        Ok(url)
    }
}

/// Pull `<Code>...</Code>` out of a storage error document.
fn xml_error_code(body: &str) -> Option<String> {
    let start = body.find("<Code>")? + "<Code>".len();
    let end = body[start..].find("</Code>")? + start;
    Some(body[start..end].to_string())
}
