//! AWS client errors

use thiserror::Error;

/// Errors that can occur when talking to the ELBv2 and EC2 APIs
#[derive(Debug, Error)]
pub enum AwsError {
    /// AWS API returned an error
    #[error("AWS API error: {0}")]
    Api(String),

    /// Resource not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Resource is still referenced by another resource
    #[error("Resource in use: {0}")]
    InUse(String),

    /// Invalid request (e.g., unknown enum value, missing required field)
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The call did not complete before its deadline
    #[error("Timed out calling {0}")]
    Timeout(String),
}
