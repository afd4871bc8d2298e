//! Error types for cloud operations.

use thiserror::Error;

/// Errors that can occur while talking to the cloud provider or writing
/// credential artifacts.
#[derive(Error, Debug)]
pub enum CloudError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// API returned an error response.
    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    /// Resource not found.
    #[error("resource not found: {0}")]
    NotFound(String),

    /// Authentication error.
    #[error("authentication error: {0}")]
    Auth(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Credential document could not be serialized.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Invalid configuration.
    #[error("invalid configuration: {0}")]
    Config(String),

    /// Credential artifact could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
