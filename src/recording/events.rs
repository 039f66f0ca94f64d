//! # Event Dispatcher
//!
//! Handles the notifications Event Grid posts to `/getRecordingFile`.
//!
//! ## Handled event types:
//! - `Microsoft.EventGrid.SubscriptionValidationEvent`: answer the
//!   subscription handshake with the validation code
//! - `Microsoft.Communication.RecordingFileStatusUpdated`: copy the recording
//!   and then its metadata into blob storage
//!
//! Any other event type is acknowledged and ignored.

use super::transfer::{FileKind, FileTransferPipeline, TransferOutcome};
use crate::error::{AppError, AppResult};
use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, error, info};

pub const SUBSCRIPTION_VALIDATION_EVENT: &str = "Microsoft.EventGrid.SubscriptionValidationEvent";
pub const RECORDING_FILE_STATUS_UPDATED_EVENT: &str =
    "Microsoft.Communication.RecordingFileStatusUpdated";

/// Envelope in either the Event Grid (`eventType`) or CloudEvents (`type`) schema.
#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(default)]
    id: String,
    #[serde(rename = "eventType", alias = "type")]
    event_type: String,
    #[serde(default)]
    data: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ValidationData {
    #[serde(default)]
    validation_code: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileStatusData {
    recording_storage_info: RecordingStorageInfo,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordingStorageInfo {
    recording_chunks: Vec<RecordingChunk>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RecordingChunk {
    document_id: String,
    content_location: String,
    metadata_location: String,
    #[serde(default)]
    index: Option<u32>,
    #[serde(default)]
    end_reason: Option<String>,
}

/// A parsed notification.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordingEvent {
    SubscriptionValidation {
        validation_code: String,
    },
    FileStatusUpdated {
        document_id: String,
        content_location: String,
        metadata_location: String,
    },
    Other {
        event_type: String,
    },
}

#[derive(Debug, Error, PartialEq)]
pub enum EventParseError {
    /// The body is not a non-empty list of events
    #[error("invalid event body: {0}")]
    Body(String),

    #[error("subscription validation failed: {0}")]
    Validation(String),

    #[error("invalid recording file status: {0}")]
    FileStatus(String),
}

impl RecordingEvent {
    /// Parse the first event of a notification body.
    pub fn parse(body: &[u8]) -> Result<Self, EventParseError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(EventParseError::Body("empty body".to_string()));
        }

        // Later events in the batch are not looked at
        let mut events: Vec<Value> =
            serde_json::from_slice(body).map_err(|e| EventParseError::Body(e.to_string()))?;
        if events.is_empty() {
            return Err(EventParseError::Body("no events".to_string()));
        }
        let envelope: EventEnvelope = serde_json::from_value(events.swap_remove(0))
            .map_err(|e| EventParseError::Body(e.to_string()))?;

        info!(event_id = %envelope.id, event_type = %envelope.event_type, "Event received");
        debug!(data = %envelope.data, "Event data");

        match envelope.event_type.as_str() {
            SUBSCRIPTION_VALIDATION_EVENT => {
                let data: ValidationData = serde_json::from_value(envelope.data)
                    .map_err(|e| EventParseError::Validation(e.to_string()))?;
                match data.validation_code {
                    Some(code) if !code.is_empty() => Ok(RecordingEvent::SubscriptionValidation {
                        validation_code: code,
                    }),
                    _ => Err(EventParseError::Validation(
                        "validationCode is missing".to_string(),
                    )),
                }
            }
            RECORDING_FILE_STATUS_UPDATED_EVENT => {
                let data: FileStatusData = serde_json::from_value(envelope.data)
                    .map_err(|e| EventParseError::FileStatus(e.to_string()))?;
                let chunk = data
                    .recording_storage_info
                    .recording_chunks
                    .into_iter()
                    .next()
                    .ok_or_else(|| EventParseError::FileStatus("no recording chunks".to_string()))?;

                debug!(
                    document_id = %chunk.document_id,
                    index = ?chunk.index,
                    end_reason = ?chunk.end_reason,
                    "Recording chunk"
                );

                Ok(RecordingEvent::FileStatusUpdated {
                    document_id: chunk.document_id,
                    content_location: chunk.content_location,
                    metadata_location: chunk.metadata_location,
                })
            }
            other => Ok(RecordingEvent::Other {
                event_type: other.to_string(),
            }),
        }
    }
}

/// What the webhook handler should answer.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// Echo the code back as `{"validationResponse": code}`
    Handshake(String),
    Success,
    Failure(String),
}

pub struct EventDispatcher {
    pipeline: FileTransferPipeline,
}

impl EventDispatcher {
    pub fn new(pipeline: FileTransferPipeline) -> Self {
        Self { pipeline }
    }

    /// Handle one notification body.
    ///
    /// A broken subscription handshake is an `AppError::ServerError`; every
    /// other problem is reported as `DispatchOutcome::Failure`.
    pub async fn dispatch(&self, body: &[u8]) -> AppResult<DispatchOutcome> {
        let event = match RecordingEvent::parse(body) {
            Ok(event) => event,
            Err(EventParseError::Validation(reason)) => {
                error!(reason = %reason, "Failed to subscribe EventGrid validation event");
                return Err(AppError::ServerError(reason));
            }
            Err(e) => {
                error!(error = %e, "Failed to get recording file");
                return Ok(DispatchOutcome::Failure(e.to_string()));
            }
        };

        match event {
            RecordingEvent::SubscriptionValidation { validation_code } => {
                info!(validation_code = %validation_code, "Subscribed EventGrid validation event");
                Ok(DispatchOutcome::Handshake(validation_code))
            }
            RecordingEvent::FileStatusUpdated {
                document_id,
                content_location,
                metadata_location,
            } => Ok(self
                .copy_recording(&document_id, &content_location, &metadata_location)
                .await),
            RecordingEvent::Other { event_type } => {
                debug!(event_type = %event_type, "Ignoring event");
                Ok(DispatchOutcome::Success)
            }
        }
    }

    /// Recording first; metadata only once the recording is stored.
    async fn copy_recording(
        &self,
        document_id: &str,
        content_location: &str,
        metadata_location: &str,
    ) -> DispatchOutcome {
        if let TransferOutcome::Failure(reason) = self
            .pipeline
            .transfer(document_id, content_location, FileKind::Recording)
            .await
        {
            info!(document_id, reason = %reason, "Processing recording file failed");
            return DispatchOutcome::Failure(reason);
        }

        info!(document_id, "Start processing metadata");
        if let TransferOutcome::Failure(reason) = self
            .pipeline
            .transfer(document_id, metadata_location, FileKind::Metadata)
            .await
        {
            info!(document_id, reason = %reason, "Processing metadata file failed");
            return DispatchOutcome::Failure(reason);
        }

        info!(document_id, "Processing recording and metadata files completed successfully");
        DispatchOutcome::Success
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeBlobStore, FakeCallingClient};
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use tempfile::TempDir;

    fn file_status_body() -> Vec<u8> {
        serde_json::to_vec(&json!([{
            "id": "evt-1",
            "topic": "/subscriptions/x",
            "subject": "/recording/call/call1",
            "eventType": RECORDING_FILE_STATUS_UPDATED_EVENT,
            "data": {
                "recordingStorageInfo": {
                    "recordingChunks": [{
                        "documentId": "doc1",
                        "index": 0,
                        "endReason": "SessionEnded",
                        "contentLocation": "https://acs/doc1/content",
                        "metadataLocation": "https://acs/doc1/metadata"
                    }]
                },
                "recordingStartTime": "2024-03-05T14:07:09Z",
                "recordingDurationMs": 12000
            },
            "eventTime": "2024-03-05T14:08:00Z",
            "dataVersion": "1.0"
        }]))
        .unwrap()
    }

    fn dispatcher(calling: FakeCallingClient, storage: FakeBlobStore) -> (EventDispatcher, Arc<FakeCallingClient>, Arc<FakeBlobStore>, TempDir) {
        let work_dir = TempDir::new().unwrap();
        let calling = Arc::new(calling);
        let storage = Arc::new(storage);
        let pipeline = FileTransferPipeline::new(
            calling.clone(),
            storage.clone(),
            "recordings".to_string(),
            work_dir.path().to_path_buf(),
            Duration::from_secs(5),
        );
        (EventDispatcher::new(pipeline), calling, storage, work_dir)
    }

    #[test]
    fn test_parse_validation_event() {
        let body = br#"[{"id":"1","eventType":"Microsoft.EventGrid.SubscriptionValidationEvent","data":{"validationCode":"abc123"}}]"#;
        assert_eq!(
            RecordingEvent::parse(body).unwrap(),
            RecordingEvent::SubscriptionValidation {
                validation_code: "abc123".to_string()
            }
        );
    }

    #[test]
    fn test_parse_cloud_event_schema() {
        let body = br#"[{"id":"1","type":"Microsoft.Communication.CallEnded","data":{}}]"#;
        assert_eq!(
            RecordingEvent::parse(body).unwrap(),
            RecordingEvent::Other {
                event_type: "Microsoft.Communication.CallEnded".to_string()
            }
        );
    }

    #[test]
    fn test_parse_ignores_malformed_later_events() {
        let body = br#"[{"id":"1","eventType":"Microsoft.EventGrid.SubscriptionValidationEvent","data":{"validationCode":"abc123"}},{"id":"2","data":{}}]"#;
        assert_eq!(
            RecordingEvent::parse(body).unwrap(),
            RecordingEvent::SubscriptionValidation {
                validation_code: "abc123".to_string()
            }
        );

        let first_malformed = br#"[{"id":"1","data":{}}]"#;
        assert!(matches!(
            RecordingEvent::parse(first_malformed),
            Err(EventParseError::Body(_))
        ));
    }

    #[test]
    fn test_parse_file_status_event() {
        assert_eq!(
            RecordingEvent::parse(&file_status_body()).unwrap(),
            RecordingEvent::FileStatusUpdated {
                document_id: "doc1".to_string(),
                content_location: "https://acs/doc1/content".to_string(),
                metadata_location: "https://acs/doc1/metadata".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_rejects_bad_bodies() {
        assert!(matches!(RecordingEvent::parse(b""), Err(EventParseError::Body(_))));
        assert!(matches!(RecordingEvent::parse(b"[]"), Err(EventParseError::Body(_))));
        assert!(matches!(RecordingEvent::parse(b"{not json"), Err(EventParseError::Body(_))));

        let no_chunks = br#"[{"eventType":"Microsoft.Communication.RecordingFileStatusUpdated","data":{"recordingStorageInfo":{"recordingChunks":[]}}}]"#;
        assert!(matches!(
            RecordingEvent::parse(no_chunks),
            Err(EventParseError::FileStatus(_))
        ));

        let no_code = br#"[{"eventType":"Microsoft.EventGrid.SubscriptionValidationEvent","data":{}}]"#;
        assert!(matches!(
            RecordingEvent::parse(no_code),
            Err(EventParseError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_file_status_copies_recording_then_metadata() {
        let (dispatcher, calling, storage, _dir) = dispatcher(
            FakeCallingClient::new()
                .with_download("https://acs/doc1/content", b"mp4")
                .with_download("https://acs/doc1/metadata", b"{\"participants\":[]}"),
            FakeBlobStore::new(),
        );

        let outcome = dispatcher.dispatch(&file_status_body()).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Success);
        assert_eq!(
            calling.calls(),
            vec!["download:https://acs/doc1/content", "download:https://acs/doc1/metadata"]
        );
        let names: Vec<String> = storage.uploads().into_iter().map(|u| u.blob_name).collect();
        assert_eq!(names, vec!["doc1.mp4", "doc1.json"]);
    }

    #[tokio::test]
    async fn test_recording_failure_skips_metadata() {
        let (dispatcher, calling, storage, _dir) = dispatcher(
            FakeCallingClient::new().with_download("https://acs/doc1/metadata", b"{}"),
            FakeBlobStore::new(),
        );

        let outcome = dispatcher.dispatch(&file_status_body()).await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Failure(_)));
        assert_eq!(calling.calls(), vec!["download:https://acs/doc1/content"]);
        assert!(storage.uploads().is_empty());
    }

    #[tokio::test]
    async fn test_metadata_failure_fails_event() {
        let (dispatcher, _, storage, _dir) = dispatcher(
            FakeCallingClient::new().with_download("https://acs/doc1/content", b"mp4"),
            FakeBlobStore::new(),
        );

        let outcome = dispatcher.dispatch(&file_status_body()).await.unwrap();

        assert!(matches!(outcome, DispatchOutcome::Failure(_)));
        assert_eq!(storage.uploads().len(), 1);
    }

    #[tokio::test]
    async fn test_validation_without_code_is_server_error() {
        let (dispatcher, _, _, _dir) = dispatcher(FakeCallingClient::new(), FakeBlobStore::new());
        let body = br#"[{"eventType":"Microsoft.EventGrid.SubscriptionValidationEvent","data":{"validationCode":""}}]"#;

        assert!(matches!(
            dispatcher.dispatch(body).await,
            Err(AppError::ServerError(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_event_is_acknowledged() {
        let (dispatcher, calling, _, _dir) = dispatcher(FakeCallingClient::new(), FakeBlobStore::new());
        let body = br#"[{"eventType":"Microsoft.Communication.RecordingStateChanged","data":{"state":"active"}}]"#;

        assert_eq!(dispatcher.dispatch(body).await.unwrap(), DispatchOutcome::Success);
        assert!(calling.calls().is_empty());
    }
}
