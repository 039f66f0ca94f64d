//! # Configuration Management
//!
//! This module handles loading and managing relay configuration from multiple sources:
//! - TOML configuration files (config.toml)
//! - Environment variables (with APP_ prefix)
//! - Default values (built into the code)
//!
//! ## Configuration Priority (highest to lowest):
//! 1. `HOST` / `PORT` environment variables (deployment platforms)
//! 2. Environment variables (APP_SERVER__PORT, APP_STORAGE__CONTAINER_NAME, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)
//!
//! ## Sections:
//! - **server**: where the HTTP listener binds
//! - **calling**: the calling platform connection and the recording state callback
//! - **storage**: blob storage account, container and SAS lifetime
//! - **transfer**: scratch directory and per-call timeout for the file pipeline

use crate::error::{AppError, AppResult};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

/// Main relay configuration that contains all settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub calling: CallingConfig,
    pub storage: StorageConfig,
    pub transfer: TransferConfig,
}

/// Server-specific configuration settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Calling platform settings.
///
/// ## Fields:
/// - `connection_string`: `endpoint=https://<resource>.communication.azure.com/;accesskey=<base64>`
/// - `callback_uri`: where the platform posts recording state changes
/// - `api_version`: REST API version sent with every server-call request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallingConfig {
    pub connection_string: String,
    pub callback_uri: String,
    pub api_version: String,
}

/// Blob storage settings.
///
/// `connection_string` is optional. When present, its `AccountName`, `AccountKey`
/// and `BlobEndpoint` fill in whichever explicit fields are left empty.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub connection_string: String,
    pub account_name: String,
    pub account_key: String,
    pub container_name: String,
    /// Empty means `https://{account_name}.blob.core.windows.net`
    pub blob_endpoint: String,
    pub sas_expiry_minutes: u64,
}

/// File transfer pipeline settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferConfig {
    /// Directory that holds downloaded files until they are uploaded
    pub work_dir: String,
    /// Upper bound for every call made to the platform or to storage
    pub request_timeout_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
            },
            calling: CallingConfig {
                connection_string: String::new(),
                callback_uri: String::new(),
                api_version: "2021-08-30-preview".to_string(),
            },
            storage: StorageConfig {
                connection_string: String::new(),
                account_name: String::new(),
                account_key: String::new(),
                container_name: "recordings".to_string(),
                blob_endpoint: String::new(),
                sas_expiry_minutes: 60,
            },
            transfer: TransferConfig {
                work_dir: env::temp_dir().to_string_lossy().into_owned(),
                request_timeout_secs: 120,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Environment Variable Examples:
    /// - `APP_CALLING__CONNECTION_STRING=endpoint=...;accesskey=...`
    /// - `APP_STORAGE__CONTAINER_NAME=call-recordings`
    /// - `APP_TRANSFER__REQUEST_TIMEOUT_SECS=30`
    /// - `PORT=8080`: special case for deployment platforms
    pub fn load() -> AppResult<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            // Field names contain underscores, so nesting uses a double underscore
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        let mut config: AppConfig = settings.build()?.try_deserialize()?;
        config.storage.apply_connection_string();
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// Credentials are checked when the clients are built.
    pub fn validate(&self) -> AppResult<()> {
        if self.server.port == 0 {
            return Err(AppError::ConfigError("Server port cannot be 0".to_string()));
        }

        if self.storage.container_name.trim().is_empty() {
            return Err(AppError::ConfigError("Storage container name cannot be empty".to_string()));
        }

        if self.storage.sas_expiry_minutes == 0 {
            return Err(AppError::ConfigError("SAS expiry must be greater than 0 minutes".to_string()));
        }

        if self.transfer.request_timeout_secs == 0 {
            return Err(AppError::ConfigError("Request timeout must be greater than 0 seconds".to_string()));
        }

        Ok(())
    }
}

impl StorageConfig {
    /// Fill empty account fields from the storage connection string.
    pub fn apply_connection_string(&mut self) {
        if self.connection_string.is_empty() {
            return;
        }

        let pairs = parse_connection_string(&self.connection_string);
        for (key, value) in pairs {
            match key.as_str() {
                "accountname" if self.account_name.is_empty() => self.account_name = value,
                "accountkey" if self.account_key.is_empty() => self.account_key = value,
                "blobendpoint" if self.blob_endpoint.is_empty() => self.blob_endpoint = value,
                _ => {}
            }
        }
    }

    /// Base URL of the blob service, without a trailing slash.
    pub fn endpoint(&self) -> String {
        if self.blob_endpoint.is_empty() {
            format!("https://{}.blob.core.windows.net", self.account_name)
        } else {
            self.blob_endpoint.trim_end_matches('/').to_string()
        }
    }

    pub fn sas_expiry(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.sas_expiry_minutes as i64)
    }
}

impl TransferConfig {
    pub fn work_dir(&self) -> PathBuf {
        PathBuf::from(&self.work_dir)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Split a `Key=Value;Key=Value` connection string.
///
/// Keys are lowercased. Only the first `=` separates key from value, because
/// base64 access keys end in `=` padding.
pub fn parse_connection_string(raw: &str) -> Vec<(String, String)> {
    raw.split(';')
        .filter_map(|part| {
            let part = part.trim();
            let (key, value) = part.split_once('=')?;
            Some((key.trim().to_ascii_lowercase(), value.trim().to_string()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.server.port, 5000);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = AppConfig::default();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.transfer.request_timeout_secs = 0;
        assert!(config.validate().is_err());

        let mut config = AppConfig::default();
        config.storage.container_name = "  ".to_string();
        assert!(matches!(config.validate(), Err(AppError::ConfigError(_))));
    }

    #[test]
    fn test_storage_connection_string_fills_missing_fields() {
        let mut storage = AppConfig::default().storage;
        storage.connection_string = "DefaultEndpointsProtocol=https;AccountName=relaystore;AccountKey=a2V5a2V5==;EndpointSuffix=core.windows.net".to_string();
        storage.apply_connection_string();

        assert_eq!(storage.account_name, "relaystore");
        // Padding survives because only the first '=' splits
        assert_eq!(storage.account_key, "a2V5a2V5==");
        assert_eq!(storage.endpoint(), "https://relaystore.blob.core.windows.net");
    }

    #[test]
    fn test_explicit_storage_fields_win() {
        let mut storage = AppConfig::default().storage;
        storage.account_name = "explicit".to_string();
        storage.blob_endpoint = "http://127.0.0.1:10000/devstoreaccount1/".to_string();
        storage.connection_string = "AccountName=fromstring;AccountKey=abc=".to_string();
        storage.apply_connection_string();

        assert_eq!(storage.account_name, "explicit");
        assert_eq!(storage.account_key, "abc=");
        assert_eq!(storage.endpoint(), "http://127.0.0.1:10000/devstoreaccount1");
    }
}
