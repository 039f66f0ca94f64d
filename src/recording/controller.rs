//! # Recording Lifecycle Controller
//!
//! Validates start/pause/resume/stop/state requests and forwards them to the
//! calling platform.
//!
//! ## Error classification:
//! The platform reports failures with numeric codes. A few of them mean the
//! caller asked for something impossible and become `ClientError` (400):
//! - **8553**: a recording is already active on the call (start)
//! - **8527**: the join identity is invalid (start)
//! - **8501**: the call is not established yet (start)
//! - **8522**: the recording does not exist (pause/resume/stop/state)
//!
//! Everything else, timeouts included, is a `ServerError` (500).

use super::registry::SessionStore;
use crate::clients::{with_timeout, CallingClient, RemoteError, ServerCall};
use crate::error::{AppError, AppResult};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info};

pub const CALL_RECORDING_ACTIVE_ERROR_CODE: &str = "8553";
pub const RECORDING_NOT_FOUND_ERROR_CODE: &str = "8522";
pub const INVALID_JOIN_IDENTITY_ERROR_CODE: &str = "8527";
pub const CALL_NOT_ESTABLISHED_ERROR_CODE: &str = "8501";

const START_CLIENT_ERROR_CODES: &[&str] = &[
    CALL_RECORDING_ACTIVE_ERROR_CODE,
    INVALID_JOIN_IDENTITY_ERROR_CODE,
    CALL_NOT_ESTABLISHED_ERROR_CODE,
];

const CONTROL_CLIENT_ERROR_CODES: &[&str] = &[RECORDING_NOT_FOUND_ERROR_CODE];

/// Map a platform failure to the relay taxonomy.
pub fn classify(err: &RemoteError, client_codes: &[&str]) -> AppError {
    let text = err.to_string();
    if err.is_timeout() {
        return AppError::ServerError(text);
    }
    if client_codes.iter().any(|code| text.contains(code)) {
        AppError::ClientError(text)
    } else {
        AppError::ServerError(text)
    }
}

/// Pause, resume and stop share validation and registry resolution.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RecordingAction {
    Pause,
    Resume,
    Stop,
}

impl RecordingAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordingAction::Pause => "pause",
            RecordingAction::Resume => "resume",
            RecordingAction::Stop => "stop",
        }
    }
}

pub struct RecordingController {
    calling: Arc<dyn CallingClient>,
    sessions: Arc<dyn SessionStore>,
    callback_uri: String,
    timeout: Duration,
}

fn require(value: &str, name: &str) -> AppResult<()> {
    if value.is_empty() {
        return Err(AppError::InvalidArgument(format!("{} is invalid", name)));
    }
    Ok(())
}

impl RecordingController {
    pub fn new(
        calling: Arc<dyn CallingClient>,
        sessions: Arc<dyn SessionStore>,
        callback_uri: String,
        timeout: Duration,
    ) -> Self {
        Self {
            calling,
            sessions,
            callback_uri,
            timeout,
        }
    }

    /// Start recording `server_call_id` and remember the new recording id.
    pub async fn start_recording(&self, server_call_id: &str) -> AppResult<String> {
        info!(server_call_id, "StartRecording called");
        require(server_call_id, "serverCallId")?;

        let call = ServerCall::new(self.calling.as_ref(), server_call_id);
        let recording_id = with_timeout(self.timeout, call.start_recording(&self.callback_uri))
            .await
            .map_err(|e| {
                error!(server_call_id, error = %e, "Failed to start server recording");
                classify(&e, START_CLIENT_ERROR_CODES)
            })?;

        self.sessions.put(server_call_id, &recording_id).await;
        info!(server_call_id, recording_id = %recording_id, "Recording started");
        Ok(recording_id)
    }

    pub async fn pause_recording(&self, server_call_id: &str, recording_id: Option<&str>) -> AppResult<()> {
        self.control(RecordingAction::Pause, server_call_id, recording_id)
            .await
    }

    pub async fn resume_recording(&self, server_call_id: &str, recording_id: Option<&str>) -> AppResult<()> {
        self.control(RecordingAction::Resume, server_call_id, recording_id)
            .await
    }

    pub async fn stop_recording(&self, server_call_id: &str, recording_id: Option<&str>) -> AppResult<()> {
        self.control(RecordingAction::Stop, server_call_id, recording_id)
            .await
    }

    async fn control(
        &self,
        action: RecordingAction,
        server_call_id: &str,
        recording_id: Option<&str>,
    ) -> AppResult<()> {
        info!(
            server_call_id,
            recording_id = recording_id.unwrap_or(""),
            action = action.as_str(),
            "Recording control called"
        );
        require(server_call_id, "serverCallId")?;

        let recording_id = self
            .sessions
            .resolve_or_reject(server_call_id, recording_id.unwrap_or(""))
            .await?;

        let call = ServerCall::new(self.calling.as_ref(), server_call_id);
        let result = match action {
            RecordingAction::Pause => with_timeout(self.timeout, call.pause_recording(&recording_id)).await,
            RecordingAction::Resume => with_timeout(self.timeout, call.resume_recording(&recording_id)).await,
            RecordingAction::Stop => with_timeout(self.timeout, call.stop_recording(&recording_id)).await,
        };

        result.map_err(|e| {
            error!(
                server_call_id,
                recording_id = %recording_id,
                action = action.as_str(),
                error = %e,
                "Failed to control server recording"
            );
            classify(&e, CONTROL_CLIENT_ERROR_CODES)
        })?;

        info!(server_call_id, recording_id = %recording_id, action = action.as_str(), "Recording updated");
        Ok(())
    }

    /// Platform-reported state. Both ids are required; the registry is not consulted.
    pub async fn recording_state(&self, server_call_id: &str, recording_id: &str) -> AppResult<String> {
        info!(server_call_id, recording_id, "GetRecordingState called");
        require(server_call_id, "serverCallId")?;
        require(recording_id, "recordingId")?;

        let call = ServerCall::new(self.calling.as_ref(), server_call_id);
        let state = with_timeout(self.timeout, call.recording_state(recording_id))
            .await
            .map_err(|e| {
                error!(server_call_id, recording_id, error = %e, "Failed to get recording status");
                classify(&e, CONTROL_CLIENT_ERROR_CODES)
            })?;

        info!(server_call_id, recording_id, state = %state, "Recording state fetched");
        Ok(state)
    }
}
