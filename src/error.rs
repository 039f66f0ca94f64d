//! # Error Handling
//!
//! This module defines the relay's error taxonomy and how it is converted to
//! HTTP responses at the handler boundary.
//!
//! ## Error Categories:
//! - **InvalidArgument**: a required identifier is missing or empty (400)
//! - **MissingRecordingIdentifier**: no recording id supplied and none tracked for the call (400)
//! - **ClientError**: the calling platform blamed the caller with a known error code (400)
//! - **ServerError**: every other failure, including storage, network and timeouts (500)
//! - **ConfigError**: configuration problems (500)
//!
//! Response bodies are plain text carrying the error detail. Callers of this
//! relay (sample web pages and webhook senders) read the text directly.

use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use std::fmt;

/// Custom error types for the relay.
///
/// ## Usage Example:
/// ```rust
/// return Err(AppError::InvalidArgument("serverCallId is invalid".to_string()));
/// ```
#[derive(Debug, Clone, PartialEq)]
pub enum AppError {
    /// A required identifier is missing or empty
    InvalidArgument(String),

    /// No recording id was supplied and none is tracked for the call
    MissingRecordingIdentifier(String),

    /// The calling platform rejected the request for a reason the caller controls
    ClientError(String),

    /// Platform, storage or network failure on our side of the fence
    ServerError(String),

    /// Configuration file or environment variable problems
    ConfigError(String),
}

impl AppError {
    /// HTTP status the error maps to.
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::InvalidArgument(_)
            | AppError::MissingRecordingIdentifier(_)
            | AppError::ClientError(_) => StatusCode::BAD_REQUEST,
            AppError::ServerError(_) | AppError::ConfigError(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// The detail text without the category prefix.
    pub fn detail(&self) -> &str {
        match self {
            AppError::InvalidArgument(msg)
            | AppError::MissingRecordingIdentifier(msg)
            | AppError::ClientError(msg)
            | AppError::ServerError(msg)
            | AppError::ConfigError(msg) => msg,
        }
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            AppError::MissingRecordingIdentifier(msg) => {
                write!(f, "Missing recording identifier: {}", msg)
            }
            AppError::ClientError(msg) => write!(f, "Client error: {}", msg),
            AppError::ServerError(msg) => write!(f, "Server error: {}", msg),
            AppError::ConfigError(msg) => write!(f, "Configuration error: {}", msg),
        }
    }
}

/// Converts relay errors into plain-text HTTP responses.
///
/// ## HTTP Status Code Mapping:
/// - InvalidArgument/MissingRecordingIdentifier/ClientError → 400 (Bad Request)
/// - ServerError/ConfigError → 500 (Internal Server Error)
///
/// The body is the bare detail (for platform failures, the platform's own
/// error text) so the caller sees exactly what went wrong.
impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        self.status()
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status())
            .content_type("text/plain; charset=utf-8")
            .body(self.detail().to_string())
    }
}

impl std::error::Error for AppError {}

impl From<config::ConfigError> for AppError {
    fn from(err: config::ConfigError) -> Self {
        AppError::ConfigError(err.to_string())
    }
}

/// Shorthand for `Result<T, AppError>`.
pub type AppResult<T> = Result<T, AppError>;
