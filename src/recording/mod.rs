//! # Recording Module
//!
//! The relay's core: which call has which recording, what callers may do
//! with it, and how finished recordings reach blob storage.
//!
//! ## Key Components:
//! - **Session Registry**: server call id → recording id
//! - **Lifecycle Controller**: start/pause/resume/stop/state requests
//! - **Transfer Pipeline**: download → upload → cleanup for one file
//! - **Event Dispatcher**: Event Grid notifications into pipeline runs

pub mod controller;  // Recording lifecycle requests
pub mod events;      // Webhook event parsing and routing
pub mod registry;    // Call → recording tracking
pub mod transfer;    // Platform → storage file copy

pub use controller::RecordingController;
pub use events::{DispatchOutcome, EventDispatcher};
pub use registry::{InMemorySessionRegistry, SessionStore};
pub use transfer::FileTransferPipeline;
