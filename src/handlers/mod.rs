pub mod events;
pub mod recording;
pub mod storage;

pub use events::*;
pub use recording::*;
pub use storage::*;

use actix_web::{web, HttpResponse};

/// Register every relay route.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/", web::get().to(index))
        .route("/startRecording", web::get().to(start_recording))
        .route("/pauseRecording", web::get().to(pause_recording))
        .route("/resumeRecording", web::get().to(resume_recording))
        .route("/stopRecording", web::get().to(stop_recording))
        .route("/getRecordingState", web::get().to(get_recording_state))
        .route("/getRecordingFile", web::post().to(get_recording_file))
        .route("/getBlobSASUri", web::get().to(get_blob_sas_uri));
}

/// `GET /` liveness text.
pub async fn index() -> HttpResponse {
    HttpResponse::Ok().body("App is running.....")
}
