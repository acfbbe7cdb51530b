//! NLB Service Annotations
//!
//! Typed parsing of the `<prefix>/<name>` annotations that configure a
//! network load balancer for a Kubernetes Service.
//!
//! # Example
//!
//! ```
//! use aws_client::{Protocol, Scheme, TargetType};
//! use service_annotations::{AnnotationDefaults, ServiceAnnotations, DEFAULT_ANNOTATION_PREFIX};
//! use std::collections::BTreeMap;
//!
//! let mut annotations = BTreeMap::new();
//! annotations.insert(
//!     format!("{DEFAULT_ANNOTATION_PREFIX}/scheme"),
//!     "internet-facing".to_string(),
//! );
//!
//! let defaults = AnnotationDefaults {
//!     target_type: TargetType::Ip,
//!     backend_protocol: Protocol::Tcp,
//! };
//! let parsed = ServiceAnnotations::parse(DEFAULT_ANNOTATION_PREFIX, &annotations, defaults).unwrap();
//! assert_eq!(parsed.load_balancer.scheme, Scheme::InternetFacing);
//! ```

pub mod action;
pub mod class;
pub mod error;
pub mod healthcheck;
pub mod loadbalancer;
pub mod parser;
pub mod targetgroup;

pub use action::{ActionAnnotations, USE_ANNOTATION, uses_annotation};
pub use class::{SERVICE_CLASS_ANNOTATION, is_valid_service, service_class};
pub use error::AnnotationError;
pub use healthcheck::{HealthCheckAnnotations, TRAFFIC_PORT};
pub use loadbalancer::LoadBalancerAnnotations;
pub use parser::{AnnotationParser, DEFAULT_ANNOTATION_PREFIX, parse_key_values};
pub use targetgroup::TargetGroupAnnotations;

use aws_client::{Protocol, Tags, TargetType};
use std::collections::BTreeMap;

/// Controller-wide defaults for annotations a Service may leave unset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationDefaults {
    pub target_type: TargetType,
    pub backend_protocol: Protocol,
}

/// Everything the controller reads from one Service's annotations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceAnnotations {
    pub load_balancer: LoadBalancerAnnotations,
    pub health_check: HealthCheckAnnotations,
    pub target_group: TargetGroupAnnotations,
    pub actions: ActionAnnotations,
    /// Extra tags applied to every resource created for the Service
    pub tags: Tags,
}

impl ServiceAnnotations {
    /// Parse all annotations under `prefix`. The first invalid annotation aborts parsing.
    pub fn parse(
        prefix: &str,
        annotations: &BTreeMap<String, String>,
        defaults: AnnotationDefaults,
    ) -> Result<Self, AnnotationError> {
        let parser = AnnotationParser::new(prefix, annotations);
        let parsed = Self {
            load_balancer: LoadBalancerAnnotations::parse(&parser)?,
            health_check: HealthCheckAnnotations::parse(&parser)?,
            target_group: TargetGroupAnnotations::parse(
                &parser,
                defaults.target_type,
                defaults.backend_protocol,
            )?,
            actions: ActionAnnotations::parse(&parser)?,
            tags: parser.get_key_values("tags")?,
        };
        tracing::trace!(prefix, ?parsed, "Parsed service annotations");
        Ok(parsed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aws_client::{IpAddressType, Scheme};

    const DEFAULTS: AnnotationDefaults = AnnotationDefaults {
        target_type: TargetType::Ip,
        backend_protocol: Protocol::Tcp,
    };

    fn annotations(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (format!("{DEFAULT_ANNOTATION_PREFIX}/{k}"), (*v).to_string()))
            .collect()
    }

    #[test]
    fn test_defaults_when_nothing_is_annotated() {
        let parsed = ServiceAnnotations::parse(DEFAULT_ANNOTATION_PREFIX, &BTreeMap::new(), DEFAULTS).unwrap();
        assert_eq!(parsed.load_balancer, LoadBalancerAnnotations::default());
        assert_eq!(parsed.health_check, HealthCheckAnnotations::default());
        assert_eq!(parsed.target_group.target_type, TargetType::Ip);
        assert_eq!(parsed.target_group.backend_protocol, Protocol::Tcp);
        assert_eq!(parsed.target_group.healthy_threshold_count, 3);
        assert_eq!(parsed.target_group.success_codes, "200-399");
        assert!(parsed.tags.is_empty());
    }

    #[test]
    fn test_full_annotation_set() {
        let annos = annotations(&[
            ("scheme", "internet-facing"),
            ("ip-address-type", "dualstack"),
            ("subnets", "subnet-aaa, prod-subnet"),
            ("load-balancer-attributes", "load_balancing.cross_zone.enabled=true"),
            ("target-type", "instance"),
            ("backend-protocol", "TCP_UDP"),
            ("healthcheck-port", "http"),
            ("healthcheck-protocol", "HTTP"),
            ("healthcheck-path", "/healthz"),
            ("healthcheck-interval-seconds", "30"),
            ("unhealthy-threshold-count", "2"),
            ("target-group-attributes", "deregistration_delay.timeout_seconds=30"),
            ("tags", "team=net"),
        ]);
        let parsed = ServiceAnnotations::parse(DEFAULT_ANNOTATION_PREFIX, &annos, DEFAULTS).unwrap();

        assert_eq!(parsed.load_balancer.scheme, Scheme::InternetFacing);
        assert_eq!(parsed.load_balancer.ip_address_type, IpAddressType::Dualstack);
        assert_eq!(parsed.load_balancer.subnets, vec!["subnet-aaa", "prod-subnet"]);
        assert_eq!(
            parsed.load_balancer.attributes.get("load_balancing.cross_zone.enabled").map(String::as_str),
            Some("true")
        );
        assert_eq!(parsed.target_group.target_type, TargetType::Instance);
        assert_eq!(parsed.target_group.backend_protocol, Protocol::TcpUdp);
        assert_eq!(parsed.target_group.unhealthy_threshold_count, 2);
        assert_eq!(parsed.health_check.port, "http");
        assert_eq!(parsed.health_check.protocol, Protocol::Http);
        assert_eq!(parsed.health_check.path, "/healthz");
        assert_eq!(parsed.health_check.interval_seconds, 30);
        assert_eq!(parsed.tags.get("team").map(String::as_str), Some("net"));
    }

    #[test]
    fn test_legacy_attributes_annotation() {
        let annos = annotations(&[("attributes", "deletion_protection.enabled=true")]);
        let parsed = ServiceAnnotations::parse(DEFAULT_ANNOTATION_PREFIX, &annos, DEFAULTS).unwrap();
        assert_eq!(parsed.load_balancer.attributes.len(), 1);
    }

    #[test]
    fn test_invalid_scheme() {
        let annos = annotations(&[("scheme", "public")]);
        let err = ServiceAnnotations::parse(DEFAULT_ANNOTATION_PREFIX, &annos, DEFAULTS).unwrap_err();
        assert!(err.to_string().contains("LB scheme must be either"), "{err}");
    }

    #[test]
    fn test_tls_backend_protocol_is_rejected() {
        let annos = annotations(&[("backend-protocol", "TLS")]);
        let err = ServiceAnnotations::parse(DEFAULT_ANNOTATION_PREFIX, &annos, DEFAULTS).unwrap_err();
        assert!(matches!(err, AnnotationError::InvalidContent { .. }));
    }

    #[test]
    fn test_udp_health_check_is_rejected() {
        let annos = annotations(&[("healthcheck-protocol", "UDP")]);
        assert!(ServiceAnnotations::parse(DEFAULT_ANNOTATION_PREFIX, &annos, DEFAULTS).is_err());
    }

    #[test]
    fn test_custom_prefix() {
        let mut annos = BTreeMap::new();
        annos.insert("lb.example.com/scheme".to_string(), "internet-facing".to_string());
        let parsed = ServiceAnnotations::parse("lb.example.com", &annos, DEFAULTS).unwrap();
        assert_eq!(parsed.load_balancer.scheme, Scheme::InternetFacing);

        let parsed = ServiceAnnotations::parse(DEFAULT_ANNOTATION_PREFIX, &annos, DEFAULTS).unwrap();
        assert_eq!(parsed.load_balancer.scheme, Scheme::Internal);
    }
}
