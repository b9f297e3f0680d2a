//! CLI error types with exit code handling
//!
//! This module provides a unified error type for CLI operations that
//! maps errors to appropriate exit codes.

use hubtrack_repo::RepoError;
use hubtrack_tracker::TrackerError;
use miette::Diagnostic;
use thiserror::Error;

use crate::exit_codes;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic, Clone)]
pub enum CliError {
    /// Invalid user input (url, registered file, configuration)
    #[error("Invalid input: {message}")]
    #[diagnostic(code(hubtrack::cli::input))]
    Input {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Repository or registry unreachable, or answered with an error
    #[error("Network error: {message}")]
    #[diagnostic(
        code(hubtrack::cli::network),
        help("check the repository url and credentials, then try again")
    )]
    Network { message: String },

    /// Chart could not be processed
    #[error("Chart error: {message}")]
    #[diagnostic(code(hubtrack::cli::chart))]
    Chart { message: String },

    /// IO error (file not found, permissions, etc.)
    #[error("IO error: {message}")]
    #[diagnostic(code(hubtrack::cli::io))]
    Io { message: String },

    /// Interrupted by the user
    #[error("Cancelled")]
    #[diagnostic(code(hubtrack::cli::cancelled))]
    Cancelled,

    /// Wrapped error for passthrough (stores the formatted message)
    #[error("{message}")]
    #[diagnostic(code(hubtrack::cli::error))]
    Other { message: String },
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Input { .. } => exit_codes::INPUT_ERROR,
            CliError::Network { .. } => exit_codes::NETWORK_ERROR,
            CliError::Chart { .. } => exit_codes::ERROR,
            CliError::Io { .. } => exit_codes::ERROR,
            CliError::Cancelled => exit_codes::ERROR,
            CliError::Other { .. } => exit_codes::ERROR,
        }
    }

    /// Create an input error
    pub fn input(message: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: None,
        }
    }

    /// Create an input error with help text
    pub fn input_with_help(message: impl Into<String>, help: impl Into<String>) -> Self {
        Self::Input {
            message: message.into(),
            help: Some(help.into()),
        }
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        CliError::Io {
            message: err.to_string(),
        }
    }
}

impl From<RepoError> for CliError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::Cancelled => CliError::Cancelled,
            RepoError::InvalidRepositoryUrl { .. }
            | RepoError::SchemeNotSupported { .. }
            | RepoError::InvalidOciReference { .. } => CliError::input(err.to_string()),
            e if e.is_network() => CliError::Network {
                message: e.to_string(),
            },
            e => CliError::Other {
                message: e.to_string(),
            },
        }
    }
}

impl From<TrackerError> for CliError {
    fn from(err: TrackerError) -> Self {
        if err.is_cancelled() {
            return CliError::Cancelled;
        }
        if err.is_network() {
            return CliError::Network {
                message: err.to_string(),
            };
        }
        match err {
            TrackerError::Repo(e) => e.into(),
            TrackerError::InvalidConfig { .. }
            | TrackerError::InvalidChartUrl { .. }
            | TrackerError::InvalidPackageVersion { .. }
            | TrackerError::ChartUrlNotProvided => CliError::input(err.to_string()),
            TrackerError::Io(e) => e.into(),
            e => CliError::Chart {
                message: e.to_string(),
            },
        }
    }
}

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;
