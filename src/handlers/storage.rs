use crate::{error::AppError, state::AppState};
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use tracing::{error, info};

#[derive(Debug, Deserialize)]
pub struct BlobQuery {
    #[serde(default)]
    pub blob_name: String,
}

/// `GET /getBlobSASUri?blob_name=` returns a read-only signed URL for a blob
/// in the configured container.
pub async fn get_blob_sas_uri(
    state: web::Data<AppState>,
    query: web::Query<BlobQuery>,
) -> Result<HttpResponse, AppError> {
    if query.blob_name.trim().is_empty() {
        return Err(AppError::InvalidArgument("blob_name is invalid".to_string()));
    }

    let url = state
        .storage
        .sas_url(state.container_name(), &query.blob_name)
        .map_err(|e| {
            error!(blob_name = %query.blob_name, error = %e, "Failed to issue blob SAS URI");
            AppError::ServerError(format!("Error occurred in getting blob sas uri: {}", e))
        })?;

    info!(blob_name = %query.blob_name, "Blob SAS URI issued");
    Ok(HttpResponse::Ok().body(url))
}

#[cfg(test)]
mod tests {
    use crate::handlers::configure;
    use crate::testing::{test_state, FakeBlobStore, FakeCallingClient};
    use actix_web::http::StatusCode;
    use actix_web::{test, web, App};
    use std::sync::Arc;

    #[actix_web::test]
    async fn test_blob_sas_uri() {
        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_state(
                    Arc::new(FakeCallingClient::new()),
                    Arc::new(FakeBlobStore::new()),
                )))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::get()
            .uri("/getBlobSASUri?blob_name=doc1.mp4")
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert_eq!(
            test::read_body(resp).await,
            "https://fake.blob.core.windows.net/recordings/doc1.mp4?sv=2019-12-12&sp=r&sig=fake"
        );

        let req = test::TestRequest::get().uri("/getBlobSASUri").to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }
}
