//! # Application State Management
//!
//! Everything the HTTP handlers share, built once at startup and cloned into
//! each actix worker.
//!
//! ## Thread Safety Pattern:
//! - Collaborators are `Arc<dyn Trait>`, so every worker talks to the same
//!   platform client, blob store and session registry
//! - The only mutable state is the session registry, which does its own
//!   locking
//! - Configuration is read-only after startup, so a plain `Arc` is enough
//!
//! Tests build the state from fakes with `AppState::new`; `main` uses
//! `AppState::from_config` to wire the real REST clients.

use crate::clients::{AcsCallingClient, AzureBlobStore, BlobStore, CallingClient};
use crate::config::AppConfig;
use crate::recording::{
    EventDispatcher, FileTransferPipeline, InMemorySessionRegistry, RecordingController,
    SessionStore,
};
use anyhow::{Context, Result};
use std::sync::Arc;

/// Shared state handed to every request handler.
#[derive(Clone)]
pub struct AppState {
    /// Read-only configuration
    pub config: Arc<AppConfig>,

    /// Start/pause/resume/stop/state requests
    pub recordings: Arc<RecordingController>,

    /// Event Grid notification handling
    pub events: Arc<EventDispatcher>,

    /// Blob storage, used directly for `/getBlobSASUri`
    pub storage: Arc<dyn BlobStore>,
}

impl AppState {
    /// Wire the relay around the given collaborators.
    pub fn new(
        config: AppConfig,
        calling: Arc<dyn CallingClient>,
        storage: Arc<dyn BlobStore>,
        sessions: Arc<dyn SessionStore>,
    ) -> Self {
        let timeout = config.transfer.request_timeout();

        let recordings = RecordingController::new(
            calling.clone(),
            sessions,
            config.calling.callback_uri.clone(),
            timeout,
        );

        let pipeline = FileTransferPipeline::new(
            calling,
            storage.clone(),
            config.storage.container_name.clone(),
            config.transfer.work_dir(),
            timeout,
        );

        Self {
            config: Arc::new(config),
            recordings: Arc::new(recordings),
            events: Arc::new(EventDispatcher::new(pipeline)),
            storage,
        }
    }

    /// Build the REST clients named by the configuration.
    pub fn from_config(config: AppConfig) -> Result<Self> {
        let timeout = config.transfer.request_timeout();

        let calling = AcsCallingClient::from_connection_string(
            &config.calling.connection_string,
            &config.calling.api_version,
            timeout,
        )
        .context("Failed to build calling platform client")?;

        let storage = AzureBlobStore::new(&config.storage, timeout)
            .context("Failed to build blob storage client")?;

        std::fs::create_dir_all(config.transfer.work_dir())
            .with_context(|| format!("Failed to create work dir {}", config.transfer.work_dir))?;

        Ok(Self::new(
            config,
            Arc::new(calling),
            Arc::new(storage),
            Arc::new(InMemorySessionRegistry::new()),
        ))
    }

    pub fn container_name(&self) -> &str {
        &self.config.storage.container_name
    }
}
