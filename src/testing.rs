//! In-memory stand-ins for the calling platform and blob storage.

use crate::clients::{ByteStream, BlobStore, CallingClient, HttpDiagnostics, RemoteError};
use crate::config::AppConfig;
use crate::recording::InMemorySessionRegistry;
use crate::state::AppState;
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use url::Url;

/// How a configured download behaves.
#[derive(Clone)]
enum Download {
    Complete(Vec<u8>),
    /// Yields the bytes, then a read error
    Truncated(Vec<u8>),
    /// Yields the bytes, then a timed-out read
    TimedOut(Vec<u8>),
    /// Yields the bytes, then never finishes
    Stalled(Vec<u8>),
    Fails(String),
}

pub struct FakeCallingClient {
    recording_id: String,
    state: String,
    failure_code: Option<String>,
    delay: Option<Duration>,
    downloads: HashMap<String, Download>,
    calls: Mutex<Vec<String>>,
}

impl FakeCallingClient {
    pub fn new() -> Self {
        Self {
            recording_id: "rec1".to_string(),
            state: "active".to_string(),
            failure_code: None,
            delay: None,
            downloads: HashMap::new(),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_recording_id(mut self, recording_id: &str) -> Self {
        self.recording_id = recording_id.to_string();
        self
    }

    /// Every recording operation fails with this platform error code.
    pub fn failing_with(mut self, code: &str) -> Self {
        self.failure_code = Some(code.to_string());
        self
    }

    /// Recording operations sleep this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn with_download(mut self, location: &str, content: &[u8]) -> Self {
        self.downloads
            .insert(location.to_string(), Download::Complete(content.to_vec()));
        self
    }

    pub fn with_truncated_download(mut self, location: &str, content: &[u8]) -> Self {
        self.downloads
            .insert(location.to_string(), Download::Truncated(content.to_vec()));
        self
    }

    pub fn with_timed_out_download(mut self, location: &str, content: &[u8]) -> Self {
        self.downloads
            .insert(location.to_string(), Download::TimedOut(content.to_vec()));
        self
    }

    pub fn with_stalled_download(mut self, location: &str, content: &[u8]) -> Self {
        self.downloads
            .insert(location.to_string(), Download::Stalled(content.to_vec()));
        self
    }

    pub fn with_failing_download(mut self, location: &str, code: &str) -> Self {
        self.downloads
            .insert(location.to_string(), Download::Fails(code.to_string()));
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, call: String) -> Result<(), RemoteError> {
        self.calls.lock().unwrap().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.failure_code {
            Some(code) => Err(api_error(code)),
            None => Ok(()),
        }
    }
}

fn api_error(code: &str) -> RemoteError {
    RemoteError::Api {
        status: 400,
        code: code.to_string(),
        message: format!("platform rejected the request with {}", code),
        diagnostics: Some(HttpDiagnostics {
            request_headers: vec![("x-ms-date".to_string(), "now".to_string())],
            response_headers: vec![("x-ms-error-code".to_string(), code.to_string())],
        }),
    }
}

#[async_trait]
impl CallingClient for FakeCallingClient {
    async fn start_recording(
        &self,
        server_call_id: &str,
        callback_uri: &str,
    ) -> Result<String, RemoteError> {
        self.record(format!("start:{}:{}", server_call_id, callback_uri))
            .await?;
        Ok(self.recording_id.clone())
    }

    async fn pause_recording(&self, server_call_id: &str, recording_id: &str)
        -> Result<(), RemoteError> {
        self.record(format!("pause:{}:{}", server_call_id, recording_id))
            .await
    }

    async fn resume_recording(&self, server_call_id: &str, recording_id: &str)
        -> Result<(), RemoteError> {
        self.record(format!("resume:{}:{}", server_call_id, recording_id))
            .await
    }

    async fn stop_recording(&self, server_call_id: &str, recording_id: &str)
        -> Result<(), RemoteError> {
        self.record(format!("stop:{}:{}", server_call_id, recording_id))
            .await
    }

    async fn recording_state(&self, server_call_id: &str, recording_id: &str)
        -> Result<String, RemoteError> {
        self.record(format!("state:{}:{}", server_call_id, recording_id))
            .await?;
        Ok(self.state.clone())
    }

    async fn start_download(&self, location: &str) -> Result<Option<ByteStream>, RemoteError> {
        self.calls
            .lock()
            .unwrap()
            .push(format!("download:{}", location));

        match self.downloads.get(location).cloned() {
            None => Ok(None),
            Some(Download::Fails(code)) => Err(api_error(&code)),
            Some(Download::Complete(content)) => {
                // Two chunks, to exercise the write loop
                let mid = content.len() / 2;
                let chunks = vec![
                    Ok(Bytes::copy_from_slice(&content[..mid])),
                    Ok(Bytes::copy_from_slice(&content[mid..])),
                ];
                Ok(Some(stream::iter(chunks).boxed()))
            }
            Some(Download::Truncated(content)) => {
                let chunks = vec![
                    Ok(Bytes::from(content)),
                    Err(RemoteError::InvalidResponse("connection reset".to_string())),
                    Ok(Bytes::from_static(b"never written")),
                ];
                Ok(Some(stream::iter(chunks).boxed()))
            }
            Some(Download::TimedOut(content)) => {
                let chunks = vec![
                    Ok(Bytes::from(content)),
                    Err(RemoteError::Timeout(Duration::from_secs(1))),
                ];
                Ok(Some(stream::iter(chunks).boxed()))
            }
            Some(Download::Stalled(content)) => {
                let first = stream::iter(vec![Ok::<_, RemoteError>(Bytes::from(content))]);
                let stall = stream::once(async {
                    tokio::time::sleep(Duration::from_secs(3600)).await;
                    Ok::<_, RemoteError>(Bytes::from_static(b"never written"))
                });
                Ok(Some(first.chain(stall).boxed()))
            }
        }
    }
}

/// One completed upload as seen by the fake store.
#[derive(Debug, Clone, PartialEq)]
pub struct Upload {
    pub container: String,
    pub blob_name: String,
    pub content: Vec<u8>,
}

pub struct FakeBlobStore {
    fail_uploads: bool,
    upload_delay: Option<Duration>,
    uploads: Mutex<Vec<Upload>>,
}

impl FakeBlobStore {
    pub fn new() -> Self {
        Self {
            fail_uploads: false,
            upload_delay: None,
            uploads: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            fail_uploads: true,
            ..Self::new()
        }
    }

    /// Uploads sleep this long before completing.
    pub fn with_upload_delay(mut self, delay: Duration) -> Self {
        self.upload_delay = Some(delay);
        self
    }

    pub fn uploads(&self) -> Vec<Upload> {
        self.uploads.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlobStore for FakeBlobStore {
    async fn upload_file(&self, container: &str, blob_name: &str, path: &Path)
        -> Result<(), RemoteError> {
        let content = tokio::fs::read(path).await?;
        if let Some(delay) = self.upload_delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail_uploads {
            return Err(RemoteError::Api {
                status: 403,
                code: "AuthorizationFailure".to_string(),
                message: "upload refused".to_string(),
                diagnostics: None,
            });
        }
        self.uploads.lock().unwrap().push(Upload {
            container: container.to_string(),
            blob_name: blob_name.to_string(),
            content,
        });
        Ok(())
    }

    fn sas_token(&self, _container: &str, _blob_name: &str) -> Result<String, RemoteError> {
        Ok("sv=2019-12-12&sp=r&sig=fake".to_string())
    }

    fn blob_url(&self, container: &str, blob_name: &str) -> Result<Url, RemoteError> {
        Url::parse(&format!("https://fake.blob.core.windows.net/{}/{}", container, blob_name))
            .map_err(|e| RemoteError::InvalidResponse(e.to_string()))
    }
}

/// Relay state around the given fakes, with default configuration.
pub fn test_state(calling: Arc<dyn CallingClient>, storage: Arc<dyn BlobStore>) -> AppState {
    let mut config = AppConfig::default();
    config.calling.callback_uri = "https://relay.example/api/callback".to_string();
    AppState::new(
        config,
        calling,
        storage,
        Arc::new(InMemorySessionRegistry::new()),
    )
}
