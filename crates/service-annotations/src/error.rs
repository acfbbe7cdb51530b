//! Annotation parsing errors

use thiserror::Error;

/// Errors that can occur while reading Service annotations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AnnotationError {
    /// A required annotation is absent
    #[error("annotation {0} is missing")]
    Missing(String),

    /// An annotation is present but its value cannot be used
    #[error("annotation {name} is invalid: {reason}")]
    InvalidContent { name: String, reason: String },

    /// A `use-annotation` backend names an action that was never declared
    #[error("{0}")]
    ActionNotSet(String),

    /// A declared action cannot be used on a network load balancer
    #[error("{0}")]
    UnsupportedAction(String),
}

impl AnnotationError {
    pub(crate) fn invalid(name: &str, reason: impl Into<String>) -> Self {
        Self::InvalidContent {
            name: name.to_string(),
            reason: reason.into(),
        }
    }
}
