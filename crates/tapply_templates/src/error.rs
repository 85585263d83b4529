//! Error types for templates.

use std::path::PathBuf;

use tapply_core::{ApplyError, DecodeError};
use thiserror::Error;

/// Result type alias for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;

/// Errors that can occur while reading, rendering or applying templates.
#[derive(Error, Debug)]
pub enum TemplateError {
    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Path does not exist: {0}")]
    PathNotFound(PathBuf),

    #[error("Variable not provided in {template}: {variable}")]
    MissingVariable { template: String, variable: String },

    #[error("Required value missing in {template}: {message}")]
    Required { template: String, message: String },

    #[error("Invalid template {template}: {message}")]
    Syntax { template: String, message: String },

    #[error("Invalid delimiter pattern: {0}")]
    Delimiter(#[from] regex::Error),

    #[error("Asset {name} is not valid UTF-8")]
    NotUtf8 { name: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Failed to decode rendered {template}: {source}")]
    Decode {
        template: String,
        #[source]
        source: DecodeError,
    },

    #[error(transparent)]
    Apply(#[from] ApplyError),
}

impl TemplateError {
    /// True for errors raised while rendering a template, as opposed to
    /// reading assets or applying records.
    pub fn is_render_error(&self) -> bool {
        matches!(
            self,
            TemplateError::MissingVariable { .. }
                | TemplateError::Required { .. }
                | TemplateError::Syntax { .. }
                | TemplateError::Decode { .. }
        )
    }
}
