//! Convergence of the cloud resources behind one Service.
//!
//! - `lb`: the load balancer instance (create, modify in place, recreate)
//! - `subnets`: explicit and auto-discovered subnet resolution
//! - `tg_group`, `tg`, `targets`: target groups and their membership
//! - `listener`: listeners and their ordered actions
//! - `tags`, `attributes`: diff-then-mutate helpers shared by the above

pub mod attributes;
pub mod lb;
pub mod listener;
pub mod subnets;
pub mod tags;
pub mod targets;
pub mod tg;
pub mod tg_group;

use crate::store::Store;
use aws_client::{AwsClientTrait, Protocol};
use k8s_openapi::api::core::v1::{Service, ServicePort};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use service_annotations::{USE_ANNOTATION, uses_annotation};
use std::fmt;
use std::sync::Arc;

pub type SharedAws = Arc<dyn AwsClientTrait>;
pub type SharedStore = Arc<dyn Store>;

/// One backend referenced by a Service port.
///
/// Forwarding backends are `{service name, port number}`. Annotation
/// backends carry the port name in `service_name` and `use-annotation` as
/// the port.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Backend {
    pub service_name: String,
    pub service_port: String,
}

impl Backend {
    pub fn new(service_name: impl Into<String>, service_port: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            service_port: service_port.into(),
        }
    }

    /// Routed by a static `actions.<name>` annotation instead of a target group.
    #[must_use]
    pub fn uses_annotation(&self) -> bool {
        uses_annotation(&self.service_port)
    }
}

impl fmt::Display for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.service_name, self.service_port)
    }
}

/// Desired listener derived from a Service port.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceListener {
    pub port: i32,
    pub protocol: Protocol,
    pub backend: Backend,
}

/// Listeners declared by `service`, one per distinct port, sorted by port.
///
/// A TCP and a UDP Service port sharing a number collapse into one
/// `TCP_UDP` listener.
#[must_use]
pub fn service_listeners(service: &Service, backend_protocol: Protocol) -> Vec<ServiceListener> {
    let service_name = service.metadata.name.clone().unwrap_or_default();
    let mut listeners: Vec<ServiceListener> = Vec::new();

    for port in service_ports(service) {
        let protocol = if port.protocol.as_deref() == Some("UDP") {
            Protocol::Udp
        } else {
            backend_protocol
        };
        let backend = match &port.target_port {
            Some(IntOrString::String(target)) if uses_annotation(target) => {
                Backend::new(port.name.clone().unwrap_or_default(), USE_ANNOTATION)
            }
            _ => Backend::new(service_name.clone(), port.port.to_string()),
        };

        match listeners.iter_mut().find(|l| l.port == port.port) {
            Some(existing) if existing.protocol != protocol => existing.protocol = Protocol::TcpUdp,
            Some(_) => {}
            None => listeners.push(ServiceListener {
                port: port.port,
                protocol,
                backend,
            }),
        }
    }

    listeners.sort_by_key(|l| l.port);
    listeners
}

pub(crate) fn service_ports(service: &Service) -> &[ServicePort] {
    service
        .spec
        .as_ref()
        .and_then(|s| s.ports.as_deref())
        .unwrap_or_default()
}

/// Service port matching `port`, by number when numeric, otherwise by name.
#[must_use]
pub fn find_service_port<'a>(service: &'a Service, port: &str) -> Option<&'a ServicePort> {
    match port.parse::<i32>() {
        Ok(number) => service_ports(service).iter().find(|p| p.port == number),
        Err(_) => service_ports(service)
            .iter()
            .find(|p| p.name.as_deref() == Some(port)),
    }
}

/// Namespace and name of `service` as plain strings.
pub(crate) fn service_ns_name(service: &Service) -> (&str, &str) {
    (
        service.metadata.namespace.as_deref().unwrap_or_default(),
        service.metadata.name.as_deref().unwrap_or_default(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_service, service_port};

    #[test]
    fn test_listeners_from_service_ports() {
        let service = create_test_service(
            "default",
            "web",
            vec![
                service_port("https", 443, "TCP", IntOrString::Int(8443), Some(31443)),
                service_port("dns", 53, "UDP", IntOrString::Int(53), Some(31053)),
                service_port("blue", 8080, "TCP", IntOrString::String("use-annotation".to_string()), None),
            ],
        );

        let listeners = service_listeners(&service, Protocol::Tcp);
        assert_eq!(listeners.len(), 3);
        assert_eq!(listeners[0].port, 53);
        assert_eq!(listeners[0].protocol, Protocol::Udp);
        assert_eq!(listeners[0].backend, Backend::new("web", "53"));
        assert_eq!(listeners[1].backend, Backend::new("web", "443"));
        assert!(!listeners[1].backend.uses_annotation());
        assert_eq!(listeners[2].backend, Backend::new("blue", "use-annotation"));
        assert!(listeners[2].backend.uses_annotation());
    }

    #[test]
    fn test_tcp_and_udp_on_one_port_become_tcp_udp() {
        let service = create_test_service(
            "default",
            "dns",
            vec![
                service_port("dns-tcp", 53, "TCP", IntOrString::Int(53), None),
                service_port("dns-udp", 53, "UDP", IntOrString::Int(53), None),
            ],
        );

        let listeners = service_listeners(&service, Protocol::Tcp);
        assert_eq!(listeners.len(), 1);
        assert_eq!(listeners[0].protocol, Protocol::TcpUdp);
    }

    #[test]
    fn test_find_service_port_by_number_or_name() {
        let service = create_test_service(
            "default",
            "web",
            vec![service_port("http", 80, "TCP", IntOrString::Int(8080), Some(31080))],
        );
        assert_eq!(find_service_port(&service, "80").and_then(|p| p.node_port), Some(31080));
        assert_eq!(find_service_port(&service, "http").map(|p| p.port), Some(80));
        assert!(find_service_port(&service, "grpc").is_none());
    }

    #[test]
    fn test_backend_display() {
        assert_eq!(Backend::new("web", "80").to_string(), "web:80");
    }
}
