//! # Webhook Handler
//!
//! `POST /getRecordingFile` receives Event Grid notifications: subscription
//! handshakes and "recording file ready" events.

use crate::recording::DispatchOutcome;
use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde_json::json;
use tracing::debug;

pub async fn get_recording_file(
    state: web::Data<AppState>,
    body: web::Bytes,
) -> Result<HttpResponse, AppError> {
    debug!(raw = %String::from_utf8_lossy(&body), "getRecordingFile called");

    match state.events.dispatch(&body).await? {
        DispatchOutcome::Handshake(code) => Ok(HttpResponse::Ok().json(json!({
            "validationResponse": code
        }))),
        DispatchOutcome::Success => {
            Ok(HttpResponse::Ok().body("Get recording file operation succeeded"))
        }
        DispatchOutcome::Failure(_) => {
            Ok(HttpResponse::InternalServerError().body("Get recording file action failed"))
        }
    }
}
