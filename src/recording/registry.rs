//! # Session Registry
//!
//! Tracks which recording belongs to which server call so that pause,
//! resume and stop requests may omit the recording id.
//!
//! ## Lifetime:
//! Entries live for the whole process. A call keeps at most one recording id
//! and the last write wins.

use crate::error::{AppError, AppResult};
use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;

/// Key-value store from server call id to recording id.
///
/// `resolve_or_reject` must be atomic with respect to concurrent callers
/// working on the same call.
#[async_trait]
pub trait SessionStore: Send + Sync {
    async fn get(&self, server_call_id: &str) -> Option<String>;

    async fn put(&self, server_call_id: &str, recording_id: &str);

    /// Pick the recording id for a lifecycle request.
    ///
    /// A non-empty `supplied` id is returned as-is and remembered if the call
    /// is not tracked yet. An empty one falls back to the tracked id.
    async fn resolve_or_reject(&self, server_call_id: &str, supplied: &str) -> AppResult<String>;
}

/// In-process registry guarded by a single async lock.
#[derive(Debug, Default)]
pub struct InMemorySessionRegistry {
    sessions: RwLock<HashMap<String, String>>,
}

impl InMemorySessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SessionStore for InMemorySessionRegistry {
    async fn get(&self, server_call_id: &str) -> Option<String> {
        self.sessions.read().await.get(server_call_id).cloned()
    }

    async fn put(&self, server_call_id: &str, recording_id: &str) {
        let previous = self
            .sessions
            .write()
            .await
            .insert(server_call_id.to_string(), recording_id.to_string());

        debug!(
            server_call_id,
            recording_id,
            replaced = previous.is_some(),
            "Tracking recording"
        );
    }

    async fn resolve_or_reject(&self, server_call_id: &str, supplied: &str) -> AppResult<String> {
        // One write guard covers the lookup and the insert
        let mut sessions = self.sessions.write().await;

        if !supplied.is_empty() {
            sessions
                .entry(server_call_id.to_string())
                .or_insert_with(|| supplied.to_string());
            return Ok(supplied.to_string());
        }

        match sessions.get(server_call_id) {
            Some(recording_id) if !recording_id.is_empty() => Ok(recording_id.clone()),
            _ => Err(AppError::MissingRecordingIdentifier(
                "recordingId is invalid".to_string(),
            )),
        }
    }
}
