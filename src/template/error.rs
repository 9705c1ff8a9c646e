// ABOUTME: Error types for variable resolution and template rendering
// ABOUTME: Every variant carries the service, variable or line needed to self-diagnose

use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Unknown variable '{variable}' for service '{service}'. Known variables: {known:?}")]
    UnknownVariable {
        variable: String,
        service: String,
        known: Vec<String>,
    },

    #[error("Missing required variable '{variable}' for service '{service}'")]
    MissingRequiredVariable { variable: String, service: String },

    #[error("Invalid value '{value}' for variable '{variable}' of service '{service}': expected {expected}")]
    InvalidValue {
        variable: String,
        service: String,
        value: String,
        expected: &'static str,
    },

    #[error("Template syntax error in service '{service}' at line {line}: {message}")]
    TemplateSyntax {
        service: String,
        line: usize,
        message: String,
    },

    #[error("Helper '{helper}' failed in service '{service}' at line {line}: {message}")]
    HelperEvaluation {
        service: String,
        line: usize,
        helper: String,
        message: String,
    },

    #[error("Filesystem error on {}: {source}", path.display())]
    Filesystem {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

pub type Result<T> = std::result::Result<T, TemplateError>;
