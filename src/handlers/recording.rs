//! # Recording Lifecycle Handlers
//!
//! ## Available Endpoints:
//! - `GET /startRecording?serverCallId=` - start recording, body is the recording id
//! - `GET /pauseRecording?serverCallId=[&recordingId=]` - pause
//! - `GET /resumeRecording?serverCallId=[&recordingId=]` - resume
//! - `GET /stopRecording?serverCallId=[&recordingId=]` - stop
//! - `GET /getRecordingState?serverCallId=&recordingId=` - body is the state
//!
//! When `recordingId` is left out, the one tracked for the call is used.

use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;

/// Query string shared by the lifecycle endpoints.
///
/// Missing parameters deserialize as empty so the controller, not the
/// extractor, decides what is invalid.
#[derive(Debug, Deserialize)]
pub struct RecordingQuery {
    #[serde(rename = "serverCallId", default)]
    pub server_call_id: String,
    #[serde(rename = "recordingId", default)]
    pub recording_id: Option<String>,
}

pub async fn start_recording(
    state: web::Data<AppState>,
    query: web::Query<RecordingQuery>,
) -> Result<HttpResponse, AppError> {
    let recording_id = state
        .recordings
        .start_recording(&query.server_call_id)
        .await?;
    Ok(HttpResponse::Ok().body(recording_id))
}

pub async fn pause_recording(
    state: web::Data<AppState>,
    query: web::Query<RecordingQuery>,
) -> Result<HttpResponse, AppError> {
    state
        .recordings
        .pause_recording(&query.server_call_id, query.recording_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().body("OK"))
}

pub async fn resume_recording(
    state: web::Data<AppState>,
    query: web::Query<RecordingQuery>,
) -> Result<HttpResponse, AppError> {
    state
        .recordings
        .resume_recording(&query.server_call_id, query.recording_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().body("Ok"))
}

pub async fn stop_recording(
    state: web::Data<AppState>,
    query: web::Query<RecordingQuery>,
) -> Result<HttpResponse, AppError> {
    state
        .recordings
        .stop_recording(&query.server_call_id, query.recording_id.as_deref())
        .await?;
    Ok(HttpResponse::Ok().body("Ok"))
}

pub async fn get_recording_state(
    state: web::Data<AppState>,
    query: web::Query<RecordingQuery>,
) -> Result<HttpResponse, AppError> {
    let recording_state = state
        .recordings
        .recording_state(
            &query.server_call_id,
            query.recording_id.as_deref().unwrap_or(""),
        )
        .await?;
    Ok(HttpResponse::Ok().body(recording_state))
}
