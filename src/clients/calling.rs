//! # Calling Platform Client
//!
//! Talks to the server-call recording API of Azure Communication Services:
//!
//! - `POST   /calling/serverCalls/{id}/recordings` → `{"recordingId": ...}`
//! - `POST   /calling/serverCalls/{id}/recordings/{rid}:pause`
//! - `POST   /calling/serverCalls/{id}/recordings/{rid}:resume`
//! - `DELETE /calling/serverCalls/{id}/recordings/{rid}`
//! - `GET    /calling/serverCalls/{id}/recordings/{rid}` → `{"recordingState": ...}`
//!
//! Recording files are fetched from the `contentLocation`/`metadataLocation`
//! URLs the platform puts in its file-status notifications. Every request is
//! signed with the resource access key (see `auth::HmacHeaders`).

use super::auth::HmacHeaders;
use super::{HttpDiagnostics, RemoteError};
use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use reqwest::header::{HeaderValue, CONTENT_TYPE};
use reqwest::{Method, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Body of a recording file download, chunk by chunk.
pub type ByteStream = BoxStream<'static, Result<Bytes, RemoteError>>;

/// Operations the relay needs from the calling platform.
#[async_trait]
pub trait CallingClient: Send + Sync {
    /// Start recording a server call; returns the new recording id.
    async fn start_recording(
        &self,
        server_call_id: &str,
        callback_uri: &str,
    ) -> Result<String, RemoteError>;

    async fn pause_recording(&self, server_call_id: &str, recording_id: &str)
        -> Result<(), RemoteError>;

    async fn resume_recording(&self, server_call_id: &str, recording_id: &str)
        -> Result<(), RemoteError>;

    async fn stop_recording(&self, server_call_id: &str, recording_id: &str)
        -> Result<(), RemoteError>;

    /// Platform-reported state, e.g. `active` or `inactive`.
    async fn recording_state(&self, server_call_id: &str, recording_id: &str)
        -> Result<String, RemoteError>;

    /// Open a streamed download. `None` means the platform has nothing at `location`.
    async fn start_download(&self, location: &str) -> Result<Option<ByteStream>, RemoteError>;
}

/// Handle bound to one server call.
pub struct ServerCall<'a> {
    client: &'a dyn CallingClient,
    server_call_id: &'a str,
}

impl<'a> ServerCall<'a> {
    pub fn new(client: &'a dyn CallingClient, server_call_id: &'a str) -> Self {
        Self {
            client,
            server_call_id,
        }
    }

    pub async fn start_recording(&self, callback_uri: &str) -> Result<String, RemoteError> {
        self.client
            .start_recording(self.server_call_id, callback_uri)
            .await
    }

    pub async fn pause_recording(&self, recording_id: &str) -> Result<(), RemoteError> {
        self.client
            .pause_recording(self.server_call_id, recording_id)
            .await
    }

    pub async fn resume_recording(&self, recording_id: &str) -> Result<(), RemoteError> {
        self.client
            .resume_recording(self.server_call_id, recording_id)
            .await
    }

    pub async fn stop_recording(&self, recording_id: &str) -> Result<(), RemoteError> {
        self.client
            .stop_recording(self.server_call_id, recording_id)
            .await
    }

    pub async fn recording_state(&self, recording_id: &str) -> Result<String, RemoteError> {
        self.client
            .recording_state(self.server_call_id, recording_id)
            .await
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StartRecordingRequest<'a> {
    recording_state_callback_uri: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StartRecordingResponse {
    recording_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordingStateResponse {
    recording_state: String,
}

/// `{"error": {"code": "8553", "message": "..."}}`
#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: String,
    #[serde(default)]
    message: String,
}

/// REST client for the ACS server-call recording API.
pub struct AcsCallingClient {
    client: reqwest::Client,
    endpoint: Url,
    access_key: String,
    api_version: String,
}

impl AcsCallingClient {
    /// Build from `endpoint=https://...;accesskey=...`.
    pub fn from_connection_string(
        connection_string: &str,
        api_version: &str,
        timeout: Duration,
    ) -> anyhow::Result<Self> {
        let mut endpoint = None;
        let mut access_key = None;
        for (key, value) in crate::config::parse_connection_string(connection_string) {
            match key.as_str() {
                "endpoint" => endpoint = Some(value),
                "accesskey" => access_key = Some(value),
                _ => {}
            }
        }

        let endpoint = endpoint
            .ok_or_else(|| anyhow::anyhow!("calling connection string has no endpoint"))?;
        let access_key = access_key
            .ok_or_else(|| anyhow::anyhow!("calling connection string has no accesskey"))?;

        let client = reqwest::Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            endpoint: Url::parse(&endpoint)?,
            access_key,
            api_version: api_version.to_string(),
        })
    }

    /// `{endpoint}/calling/serverCalls/{id}/recordings[/{tail}]?api-version=...`
    fn recordings_url(&self, server_call_id: &str, tail: Option<&str>) -> Result<Url, RemoteError> {
        let mut url = self.endpoint.clone();
        {
            let mut segments = url.path_segments_mut().map_err(|_| {
                RemoteError::InvalidResponse(format!("endpoint cannot be a base: {}", self.endpoint))
            })?;
            segments
                .pop_if_empty()
                .extend(["calling", "serverCalls", server_call_id, "recordings"]);
            if let Some(tail) = tail {
                segments.push(tail);
            }
        }
        url.query_pairs_mut()
            .append_pair("api-version", &self.api_version);
        Ok(url)
    }

    /// Sign and send a request, turning non-success statuses into `RemoteError::Api`.
    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<Vec<u8>>,
    ) -> Result<reqwest::Response, RemoteError> {
        let payload = body.unwrap_or_default();
        let auth = HmacHeaders::new(
            &self.access_key,
            method.as_str(),
            &url,
            &payload,
            chrono::Utc::now(),
        )?;

        let mut builder = self
            .client
            .request(method.clone(), url.clone())
            .header("x-ms-date", &auth.date)
            .header("x-ms-content-sha256", &auth.content_hash)
            .header("Authorization", &auth.authorization);
        if !payload.is_empty() {
            builder = builder
                .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
                .body(payload);
        }

        let request = builder.build()?;
        let request_headers = request.headers().clone();

        debug!(method = %method, url = %url, "Calling platform request");
        let response = self.client.execute(request).await?;

        if response.status().is_success() {
            return Ok(response);
        }

        Err(api_error(response, &request_headers).await)
    }
}

/// Read a failed response into `RemoteError::Api`.
async fn api_error(response: reqwest::Response, request_headers: &reqwest::header::HeaderMap) -> RemoteError {
    let status = response.status();
    let diagnostics = HttpDiagnostics::new(request_headers, response.headers());
    let text = response.text().await.unwrap_or_default();

    let (code, message) = match serde_json::from_str::<ErrorEnvelope>(&text) {
        Ok(envelope) => (envelope.error.code, envelope.error.message),
        Err(_) => (status.as_u16().to_string(), text),
    };

    RemoteError::Api {
        status: status.as_u16(),
        code,
        message,
        diagnostics: Some(diagnostics),
    }
}

#[async_trait]
impl CallingClient for AcsCallingClient {
    async fn start_recording(
        &self,
        server_call_id: &str,
        callback_uri: &str,
    ) -> Result<String, RemoteError> {
        let url = self.recordings_url(server_call_id, None)?;
        let body = serde_json::to_vec(&StartRecordingRequest {
            recording_state_callback_uri: callback_uri,
        })
        .map_err(|e| RemoteError::InvalidResponse(e.to_string()))?;

        let response = self.send(Method::POST, url, Some(body)).await?;
        let parsed: StartRecordingResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("start recording: {}", e)))?;
        Ok(parsed.recording_id)
    }

    async fn pause_recording(&self, server_call_id: &str, recording_id: &str)
        -> Result<(), RemoteError> {
        let url = self.recordings_url(server_call_id, Some(&format!("{}:pause", recording_id)))?;
        self.send(Method::POST, url, None).await?;
        Ok(())
    }

    async fn resume_recording(&self, server_call_id: &str, recording_id: &str)
        -> Result<(), RemoteError> {
        let url = self.recordings_url(server_call_id, Some(&format!("{}:resume", recording_id)))?;
        self.send(Method::POST, url, None).await?;
        Ok(())
    }

    async fn stop_recording(&self, server_call_id: &str, recording_id: &str)
        -> Result<(), RemoteError> {
        let url = self.recordings_url(server_call_id, Some(recording_id))?;
        self.send(Method::DELETE, url, None).await?;
        Ok(())
    }

    async fn recording_state(&self, server_call_id: &str, recording_id: &str)
        -> Result<String, RemoteError> {
        let url = self.recordings_url(server_call_id, Some(recording_id))?;
        let response = self.send(Method::GET, url, None).await?;
        let parsed: RecordingStateResponse = response
            .json()
            .await
            .map_err(|e| RemoteError::InvalidResponse(format!("recording state: {}", e)))?;
        Ok(parsed.recording_state)
    }

    async fn start_download(&self, location: &str) -> Result<Option<ByteStream>, RemoteError> {
        let url = Url::parse(location)
            .map_err(|e| RemoteError::InvalidResponse(format!("bad download location {}: {}", location, e)))?;

        let response = match self.send(Method::GET, url, None).await {
            Ok(response) => response,
            Err(RemoteError::Api { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                return Ok(None)
            }
            Err(e) => return Err(e),
        };

        let stream = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(RemoteError::from))
            .boxed();
        Ok(Some(stream))
    }
}
