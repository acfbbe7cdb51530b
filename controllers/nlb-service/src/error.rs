//! Controller-specific error types.
//!
//! This module defines error types specific to the NLB Service Controller
//! that are not covered by upstream library errors.

use aws_client::AwsError;
use kube::Error as KubeError;
use service_annotations::AnnotationError;
use thiserror::Error;

use crate::store::StoreError;

/// Errors that can occur in the NLB Service Controller.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// Kubernetes API error
    #[error("Kubernetes error: {0}")]
    Kube(#[from] KubeError),

    /// AWS API error
    #[error("AWS error: {0}")]
    Aws(#[from] AwsError),

    /// Object cache lookup failed
    #[error("{0}")]
    Store(#[from] StoreError),

    /// Service annotations could not be parsed
    #[error("{0}")]
    Annotation(#[from] AnnotationError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Internet-facing load balancer requested by a Service outside the whitelist
    #[error("service {0} is not in internetFacing whitelist")]
    SchemeNotAllowed(String),

    /// Some requested subnets could not be resolved
    #[error("not all subnets were resolvable, ({requested} != {resolved})", requested = .requested.join(","), resolved = .resolved.join(","))]
    SubnetMismatch {
        requested: Vec<String>,
        resolved: Vec<String>,
    },

    /// Auto-discovery found too few usable subnets
    #[error("retrieval of subnets failed to resolve 2 qualified subnets. Subnets must carry the kubernetes.io/cluster/{cluster} tag and the {role_tag} tag, with at least 2 unique availability zones; resolved {found:?}")]
    InsufficientSubnets {
        role_tag: String,
        cluster: String,
        found: Vec<String>,
    },

    /// Health check port names a port the Service does not declare
    #[error("failed to resolve healthcheck port `{port}` for service {service}")]
    HealthCheckPort { service: String, port: String },

    /// Instance targets need a node port that the Service port lacks
    #[error("failed to find valid NodePort for service {service} with port {port}")]
    MissingNodePort { service: String, port: String },

    /// A backend refers to an action that is not declared
    #[error("{0}")]
    UnknownAction(String),

    /// A backend refers to an action that cannot be used on a network load balancer
    #[error("{0}")]
    UnsupportedAction(String),

    /// A listener references a backend without a target group
    #[error("unable to find targetGroup for backend {0}")]
    MissingTargetGroup(String),

    /// Adding or removing the Service finalizer failed
    #[error("Finalizer error: {0}")]
    Finalizer(String),

    /// The reconcile did not finish within its deadline
    #[error("reconcile of {0} timed out")]
    Timeout(String),

    /// A stage failed; carries the stage description
    #[error("failed to {stage} due to {source}")]
    Stage {
        stage: &'static str,
        #[source]
        source: Box<ControllerError>,
    },

    /// Resource watch failed
    #[error("Resource watch failed: {0}")]
    Watch(String),

    /// Metrics registry error
    #[error("Metrics error: {0}")]
    Metrics(#[from] prometheus::Error),
}

impl ControllerError {
    /// Wrap `source` with the name of the stage that produced it.
    pub fn stage(stage: &'static str, source: impl Into<ControllerError>) -> Self {
        Self::Stage {
            stage,
            source: Box::new(source.into()),
        }
    }

    /// Map action annotation failures onto the listener error variants.
    pub fn from_action(err: AnnotationError) -> Self {
        match err {
            AnnotationError::ActionNotSet(msg) => Self::UnknownAction(msg),
            AnnotationError::UnsupportedAction(msg) => Self::UnsupportedAction(msg),
            other => Self::Annotation(other),
        }
    }
}

/// Attach a stage description to an error, `anyhow::Context` style.
pub trait StageExt<T> {
    /// Wrap the error with `stage`.
    fn stage(self, stage: &'static str) -> Result<T, ControllerError>;
}

impl<T, E: Into<ControllerError>> StageExt<T> for Result<T, E> {
    fn stage(self, stage: &'static str) -> Result<T, ControllerError> {
        self.map_err(|e| ControllerError::stage(stage, e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subnet_mismatch_reports_both_lists() {
        let err = ControllerError::SubnetMismatch {
            requested: vec!["subnet-aaa".to_string(), "prod-subnet".to_string()],
            resolved: vec!["subnet-aaa".to_string()],
        };
        assert_eq!(
            err.to_string(),
            "not all subnets were resolvable, (subnet-aaa,prod-subnet != subnet-aaa)"
        );
    }

    #[test]
    fn test_stage_context() {
        let res: Result<(), AwsError> = Err(AwsError::Api("throttled".to_string()));
        let err = res.stage("reconcile targetGroups").unwrap_err();
        assert_eq!(err.to_string(), "failed to reconcile targetGroups due to AWS error: AWS API error: throttled");
    }

    #[test]
    fn test_action_errors_are_classified() {
        let unknown = ControllerError::from_action(AnnotationError::ActionNotSet("blue".to_string()));
        assert!(matches!(unknown, ControllerError::UnknownAction(_)));

        let unsupported = ControllerError::from_action(AnnotationError::UnsupportedAction("blue".to_string()));
        assert!(matches!(unsupported, ControllerError::UnsupportedAction(_)));

        let missing = ControllerError::from_action(AnnotationError::Missing("actions.<port-name>".to_string()));
        assert!(matches!(missing, ControllerError::Annotation(_)));
    }
}
