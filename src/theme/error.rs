//! Template engine error types

use thiserror::Error;

/// Template loading and rendering errors
#[derive(Debug, Error)]
pub enum ThemeError {
    /// An embedded template is not valid UTF-8
    #[error("Template is not valid UTF-8: {0}")]
    InvalidEncoding(String),

    /// Template parsing or rendering error
    #[error("Template error: {0}")]
    TemplateError(String),
}
