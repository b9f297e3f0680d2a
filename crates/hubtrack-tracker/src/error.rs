//! Error types for the tracker source

use hubtrack_core::CoreError;
use hubtrack_repo::RepoError;
use std::fmt;
use thiserror::Error;

/// Tracker errors
#[derive(Debug, Error)]
pub enum TrackerError {
    // ============ Package Errors ============
    #[error("invalid package version: {source}")]
    InvalidPackageVersion {
        name: String,
        version: String,
        #[source]
        source: CoreError,
    },

    #[error("chart url not provided")]
    ChartUrlNotProvided,

    #[error("invalid chart url {url}: {reason}")]
    InvalidChartUrl { url: String, reason: String },

    #[error("error loading chart ({url}): {source}")]
    LoadChart {
        url: String,
        #[source]
        source: RepoError,
    },

    #[error("error validating chart: {0}")]
    InvalidChart(#[source] CoreError),

    #[error("error enriching package from annotations: {0}")]
    Annotations(#[from] AnnotationErrors),

    #[error("error enriching package from chart: {0}")]
    Enrichment(#[from] tokio::task::JoinError),

    // ============ Repository Errors ============
    #[error(transparent)]
    Repo(RepoError),

    // ============ Configuration Errors ============
    #[error("Invalid configuration {path}: {message}")]
    InvalidConfig { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // ============ Other ============
    #[error("Operation cancelled")]
    Cancelled,
}

/// Result type for tracker operations
pub type Result<T> = std::result::Result<T, TrackerError>;

impl From<RepoError> for TrackerError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::Cancelled => TrackerError::Cancelled,
            other => TrackerError::Repo(other),
        }
    }
}

impl TrackerError {
    pub fn is_cancelled(&self) -> bool {
        matches!(
            self,
            TrackerError::Cancelled
                | TrackerError::LoadChart {
                    source: RepoError::Cancelled,
                    ..
                }
        )
    }

    /// Whether the error came from talking to a remote server
    pub fn is_network(&self) -> bool {
        match self {
            TrackerError::Repo(e) | TrackerError::LoadChart { source: e, .. } => e.is_network(),
            _ => false,
        }
    }
}

/// Problems found in the `artifacthub.io/*` annotations of a chart
///
/// Every annotation is checked and all problems are reported together.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnnotationErrors {
    errors: Vec<String>,
}

impl AnnotationErrors {
    pub fn push(&mut self, error: impl Into<String>) {
        self.errors.push(error.into());
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// `Ok` when nothing was reported
    pub fn into_result(self) -> std::result::Result<(), AnnotationErrors> {
        if self.is_empty() { Ok(()) } else { Err(self) }
    }
}

impl fmt::Display for AnnotationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid annotation: {}", self.errors.join("; "))
    }
}

impl std::error::Error for AnnotationErrors {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_preparation_messages() {
        let err = TrackerError::InvalidPackageVersion {
            name: "web".to_string(),
            version: "bad".to_string(),
            source: CoreError::InvalidVersion {
                version: "bad".to_string(),
            },
        };
        assert_eq!(
            err.to_string(),
            "invalid package version: Invalid semantic version: bad"
        );

        let mut errors = AnnotationErrors::default();
        errors.push("invalid operator value: maybe");
        let err = TrackerError::from(errors);
        assert_eq!(
            err.to_string(),
            "error enriching package from annotations: invalid annotation: invalid operator value: maybe"
        );
    }
}
