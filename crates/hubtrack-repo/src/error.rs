//! Error types for remote repository operations

use thiserror::Error;

/// Repository operation errors
#[derive(Debug, Error)]
pub enum RepoError {
    // ============ Configuration Errors ============
    #[error("Invalid repository URL: {url} - {reason}")]
    InvalidRepositoryUrl { url: String, reason: String },

    #[error("scheme not supported: {scheme}")]
    SchemeNotSupported { scheme: String },

    // ============ Network Errors ============
    #[error("unexpected status code received: {status}")]
    UnexpectedStatus { status: u16 },

    #[error("Network error: {message}")]
    NetworkError { message: String },

    #[error("Request timeout")]
    Timeout,

    // ============ Index Errors ============
    #[error("Index parse error: {message}")]
    IndexParseError { message: String },

    // ============ Chart Errors ============
    #[error("invalid provenance file")]
    InvalidProvenance,

    #[error("{0}")]
    Chart(#[from] hubtrack_core::CoreError),

    // ============ OCI Errors ============
    #[error("OCI registry error: {message}")]
    OciError { message: String },

    #[error("Invalid OCI reference: {reference}")]
    InvalidOciReference { reference: String },

    #[error("content layer not found")]
    ContentLayerNotFound,

    // ============ Image Errors ============
    #[error("empty image")]
    EmptyImage,

    // ============ IO Errors ============
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    // ============ Other ============
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for repository operations
pub type Result<T> = std::result::Result<T, RepoError>;

impl RepoError {
    /// Whether the error came from talking to a remote server
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            RepoError::UnexpectedStatus { .. }
                | RepoError::NetworkError { .. }
                | RepoError::Timeout
                | RepoError::OciError { .. }
        )
    }
}

impl From<reqwest::Error> for RepoError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            RepoError::Timeout
        } else if e.is_connect() {
            RepoError::NetworkError {
                message: format!("Connection failed: {}", e),
            }
        } else if let Some(status) = e.status() {
            RepoError::UnexpectedStatus {
                status: status.as_u16(),
            }
        } else {
            RepoError::NetworkError {
                message: e.to_string(),
            }
        }
    }
}

impl From<serde_yaml::Error> for RepoError {
    fn from(e: serde_yaml::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(e: serde_json::Error) -> Self {
        RepoError::Serialization(e.to_string())
    }
}

impl From<url::ParseError> for RepoError {
    fn from(e: url::ParseError) -> Self {
        RepoError::InvalidRepositoryUrl {
            url: String::new(),
            reason: e.to_string(),
        }
    }
}

impl From<oci_distribution::errors::OciDistributionError> for RepoError {
    fn from(e: oci_distribution::errors::OciDistributionError) -> Self {
        RepoError::OciError {
            message: e.to_string(),
        }
    }
}
