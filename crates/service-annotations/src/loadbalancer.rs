//! Load balancer annotations: scheme, IP address type, subnets and attributes.

use crate::error::AnnotationError;
use crate::parser::AnnotationParser;
use aws_client::{Attributes, IpAddressType, Scheme};

/// Load balancer settings declared on a Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerAnnotations {
    pub scheme: Scheme,
    pub ip_address_type: IpAddressType,
    /// Subnet IDs or `Name` tags; empty means auto-discovery
    pub subnets: Vec<String>,
    pub attributes: Attributes,
}

impl Default for LoadBalancerAnnotations {
    fn default() -> Self {
        Self {
            scheme: Scheme::Internal,
            ip_address_type: IpAddressType::Ipv4,
            subnets: Vec::new(),
            attributes: Attributes::new(),
        }
    }
}

impl LoadBalancerAnnotations {
    pub(crate) fn parse(parser: &AnnotationParser<'_>) -> Result<Self, AnnotationError> {
        let scheme = parser.get_parsed("scheme", Scheme::Internal).map_err(|_| {
            AnnotationError::invalid(
                &parser.key("scheme"),
                format!(
                    "LB scheme must be either `{}` or `{}`",
                    Scheme::Internal,
                    Scheme::InternetFacing
                ),
            )
        })?;
        let ip_address_type = parser
            .get_parsed("ip-address-type", IpAddressType::Ipv4)
            .map_err(|_| {
                AnnotationError::invalid(
                    &parser.key("ip-address-type"),
                    format!(
                        "IP address type must be either `{}` or `{}`",
                        IpAddressType::Ipv4,
                        IpAddressType::Dualstack
                    ),
                )
            })?;

        // `attributes` is the legacy spelling, only read when the new one is absent
        let mut attributes = parser.get_key_values("load-balancer-attributes")?;
        if attributes.is_empty() {
            attributes = parser.get_key_values("attributes")?;
        }

        Ok(Self {
            scheme,
            ip_address_type,
            subnets: parser.get_string_slice("subnets"),
            attributes,
        })
    }
}
