use thiserror::Error;

use crate::packager::PackageError;

/// Failures of the assembly pipeline
#[derive(Debug, Error)]
pub enum BootstrapError {
    /// The caller supplied incomplete or unusable parameters
    #[error("required parameters missing or invalid: {0}")]
    RequiredParameters(String),

    /// A named template is absent from the repository
    #[error("template not found: {0}")]
    TemplateNotFound(String),

    /// Operator-side static configuration is malformed
    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error(transparent)]
    Package(#[from] PackageError),
}

impl BootstrapError {
    /// Missing-parameter error naming each absent key
    pub fn missing(context: &str, names: &[String]) -> Self {
        Self::RequiredParameters(format!("{}: {}", context, names.join(", ")))
    }
}

/// The template text could not be parsed
#[derive(Debug, Error)]
#[error("template syntax error: {0}")]
pub struct TemplateSyntaxError(pub String);
