//! Render error types

use thiserror::Error;

use crate::parser::Rule;

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("parse error in {template}: {message}")]
    Parse { template: String, message: String },

    #[error("template: {template}: {message}")]
    Exec { template: String, message: String },

    #[error("error calling {function}: {message}")]
    Function { function: String, message: String },

    #[error("function {0:?} not defined")]
    UnknownFunction(String),

    #[error("no template {0:?} associated with template")]
    TemplateNotFound(String),

    #[error("exceeded max template depth")]
    RecursionLimit,

    #[error("{0}")]
    Fail(String),

    #[error("values don't meet the specifications of the schema(s) in the following chart(s):\n{0}")]
    Schema(String),

    #[error("YAML parse error on {template}: {message}")]
    Yaml { template: String, message: String },

    #[error("{0}")]
    NotInstallable(String),

    #[error(transparent)]
    Core(#[from] hubtrack_core::CoreError),
}

impl RenderError {
    pub(crate) fn function(function: &str, message: impl Into<String>) -> Self {
        RenderError::Function {
            function: function.to_string(),
            message: message.into(),
        }
    }

    pub(crate) fn parse(template: &str, err: pest::error::Error<Rule>) -> Self {
        RenderError::Parse {
            template: template.to_string(),
            message: err.to_string(),
        }
    }

    pub(crate) fn exec(template: &str, message: impl Into<String>) -> Self {
        RenderError::Exec {
            template: template.to_string(),
            message: message.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, RenderError>;
