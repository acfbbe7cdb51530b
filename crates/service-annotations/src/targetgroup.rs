//! Target group annotations.

use crate::error::AnnotationError;
use crate::parser::AnnotationParser;
use aws_client::{Attributes, Protocol, TargetType};

pub const DEFAULT_HEALTHY_THRESHOLD: i32 = 3;
pub const DEFAULT_UNHEALTHY_THRESHOLD: i32 = 3;
pub const DEFAULT_SUCCESS_CODES: &str = "200-399";

/// Target group settings declared on a Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetGroupAnnotations {
    pub target_type: TargetType,
    pub backend_protocol: Protocol,
    pub healthy_threshold_count: i32,
    pub unhealthy_threshold_count: i32,
    pub success_codes: String,
    pub attributes: Attributes,
}

impl TargetGroupAnnotations {
    pub(crate) fn parse(
        parser: &AnnotationParser<'_>,
        default_target_type: TargetType,
        default_backend_protocol: Protocol,
    ) -> Result<Self, AnnotationError> {
        let backend_protocol = parser.get_parsed("backend-protocol", default_backend_protocol)?;
        if !matches!(backend_protocol, Protocol::Tcp | Protocol::Udp | Protocol::TcpUdp) {
            return Err(AnnotationError::invalid(
                &parser.key("backend-protocol"),
                format!("backend protocol must be TCP, UDP or TCP_UDP, got `{backend_protocol}`"),
            ));
        }
        Ok(Self {
            target_type: parser.get_parsed("target-type", default_target_type)?,
            backend_protocol,
            healthy_threshold_count: parser.get_int("healthy-threshold-count", DEFAULT_HEALTHY_THRESHOLD)?,
            unhealthy_threshold_count: parser.get_int("unhealthy-threshold-count", DEFAULT_UNHEALTHY_THRESHOLD)?,
            success_codes: parser
                .get_string("success-codes")
                .unwrap_or(DEFAULT_SUCCESS_CODES)
                .to_string(),
            attributes: parser.get_key_values("target-group-attributes")?,
        })
    }
}
