//! Health check annotations.

use crate::error::AnnotationError;
use crate::parser::AnnotationParser;
use aws_client::Protocol;

/// Health check port sentinel meaning "the port traffic is sent to".
pub const TRAFFIC_PORT: &str = "traffic-port";

pub const DEFAULT_PATH: &str = "/";
pub const DEFAULT_INTERVAL_SECONDS: i32 = 10;

/// Health check settings declared on a Service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HealthCheckAnnotations {
    /// A port number, `traffic-port`, or the name of a Service port
    pub port: String,
    pub protocol: Protocol,
    pub path: String,
    pub interval_seconds: i32,
}

impl Default for HealthCheckAnnotations {
    fn default() -> Self {
        Self {
            port: TRAFFIC_PORT.to_string(),
            protocol: Protocol::Tcp,
            path: DEFAULT_PATH.to_string(),
            interval_seconds: DEFAULT_INTERVAL_SECONDS,
        }
    }
}

impl HealthCheckAnnotations {
    pub(crate) fn parse(parser: &AnnotationParser<'_>) -> Result<Self, AnnotationError> {
        let protocol = parser.get_parsed("healthcheck-protocol", Protocol::Tcp)?;
        if !matches!(protocol, Protocol::Tcp | Protocol::Http | Protocol::Https) {
            return Err(AnnotationError::invalid(
                &parser.key("healthcheck-protocol"),
                format!("health check protocol must be TCP, HTTP or HTTPS, got `{protocol}`"),
            ));
        }
        Ok(Self {
            port: parser
                .get_string("healthcheck-port")
                .unwrap_or(TRAFFIC_PORT)
                .to_string(),
            protocol,
            path: parser
                .get_string("healthcheck-path")
                .unwrap_or(DEFAULT_PATH)
                .to_string(),
            interval_seconds: parser.get_int("healthcheck-interval-seconds", DEFAULT_INTERVAL_SECONDS)?,
        })
    }
}
