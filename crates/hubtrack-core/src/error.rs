//! Core error types

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("Chart.yaml file is missing")]
    MissingChartYaml,

    #[error("invalid chart archive: {message}")]
    Archive { message: String },

    #[error("validation: {message}")]
    Validation { message: String },

    #[error("Invalid semantic version: {version}")]
    InvalidVersion { version: String },

    #[error("invalid changes annotation: {annotation}. Please use quotes on strings")]
    InvalidChangesAnnotation { annotation: String },

    #[error("{0}")]
    InvalidChanges(String),

    #[error("Failed to parse YAML: {0}")]
    YamlParse(#[from] serde_yaml::Error),

    #[error("Failed to parse JSON: {0}")]
    JsonParse(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn archive(message: impl Into<String>) -> Self {
        CoreError::Archive {
            message: message.into(),
        }
    }

    pub(crate) fn validation(message: impl Into<String>) -> Self {
        CoreError::Validation {
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CoreError>;
