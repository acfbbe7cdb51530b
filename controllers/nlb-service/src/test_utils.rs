//! Test utilities for unit testing reconcilers
//!
//! This module provides an in-memory [`Store`], builders for the Kubernetes
//! objects the controller reads, and an [`EventPublisher`] that records
//! instead of publishing.

use crate::config::ControllerConfig;
use crate::events::EventPublisher;
use crate::store::{ServiceKey, Store, StoreError};
use async_trait::async_trait;
use k8s_openapi::api::core::v1::{
    EndpointAddress, EndpointPort, EndpointSubset, Endpoints, Node, NodeAddress, NodeCondition, NodeSpec, NodeStatus,
    Pod, PodStatus, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube_runtime::events::EventType;
use service_annotations::{DEFAULT_ANNOTATION_PREFIX, SERVICE_CLASS_ANNOTATION};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

/// In-memory [`Store`] populated by builder methods
#[derive(Default)]
pub struct MemoryStore {
    services: HashMap<ServiceKey, Arc<Service>>,
    endpoints: HashMap<ServiceKey, Arc<Endpoints>>,
    nodes: Vec<Arc<Node>>,
    pods: Vec<Arc<Pod>>,
    config: ControllerConfig,
}

impl MemoryStore {
    pub fn with_config(mut self, config: ControllerConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_service(mut self, service: Service) -> Self {
        let key = ServiceKey::from_service(&service).unwrap();
        self.services.insert(key, Arc::new(service));
        self
    }

    pub fn with_endpoints(mut self, endpoints: Endpoints) -> Self {
        let key = ServiceKey::new(
            endpoints.metadata.namespace.clone().unwrap(),
            endpoints.metadata.name.clone().unwrap(),
        );
        self.endpoints.insert(key, Arc::new(endpoints));
        self
    }

    pub fn with_node(mut self, node: Node) -> Self {
        self.nodes.push(Arc::new(node));
        self
    }

    pub fn with_pod(mut self, pod: Pod) -> Self {
        self.pods.push(Arc::new(pod));
        self
    }
}

impl Store for MemoryStore {
    fn get_service(&self, key: &ServiceKey) -> Result<Arc<Service>, StoreError> {
        self.services
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn get_service_endpoints(&self, key: &ServiceKey) -> Result<Arc<Endpoints>, StoreError> {
        self.endpoints
            .get(key)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn all_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.clone()
    }

    fn list_pods(&self) -> Vec<Arc<Pod>> {
        self.pods.clone()
    }

    fn get_config(&self) -> &ControllerConfig {
        &self.config
    }
}

/// Config with cluster `test` and otherwise default settings
pub fn test_config() -> ControllerConfig {
    ControllerConfig {
        cluster_name: "test".to_string(),
        ..ControllerConfig::default()
    }
}

/// Helper to create a Service port
pub fn service_port(name: &str, port: i32, protocol: &str, target_port: IntOrString, node_port: Option<i32>) -> ServicePort {
    ServicePort {
        name: Some(name.to_string()),
        port,
        protocol: Some(protocol.to_string()),
        target_port: Some(target_port),
        node_port,
        ..Default::default()
    }
}

/// Helper to create a LoadBalancer Service of class `nlb`
pub fn create_test_service(namespace: &str, name: &str, ports: Vec<ServicePort>) -> Service {
    let mut annotations = BTreeMap::new();
    annotations.insert(SERVICE_CLASS_ANNOTATION.to_string(), "nlb".to_string());
    Service {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            uid: Some(format!("uid-{namespace}-{name}")),
            annotations: Some(annotations),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            type_: Some("LoadBalancer".to_string()),
            ports: Some(ports),
            ..Default::default()
        }),
        status: None,
    }
}

/// Set `<default prefix>/<name>` annotations on `service`
pub fn annotate(mut service: Service, pairs: &[(&str, &str)]) -> Service {
    let annotations = service.metadata.annotations.get_or_insert_default();
    for (k, v) in pairs {
        annotations.insert(format!("{DEFAULT_ANNOTATION_PREFIX}/{k}"), (*v).to_string());
    }
    service
}

/// Helper to create Endpoints with one subset
pub fn create_test_endpoints(
    namespace: &str,
    name: &str,
    ready: &[&str],
    not_ready: &[&str],
    ports: &[(&str, i32)],
) -> Endpoints {
    let addresses = |ips: &[&str]| {
        ips.iter()
            .map(|ip| EndpointAddress {
                ip: (*ip).to_string(),
                ..Default::default()
            })
            .collect::<Vec<_>>()
    };
    Endpoints {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        subsets: Some(vec![EndpointSubset {
            addresses: Some(addresses(ready)),
            not_ready_addresses: Some(addresses(not_ready)),
            ports: Some(
                ports
                    .iter()
                    .map(|(port_name, port)| EndpointPort {
                        name: Some((*port_name).to_string()),
                        port: *port,
                        protocol: Some("TCP".to_string()),
                        ..Default::default()
                    })
                    .collect(),
            ),
        }]),
        ..Default::default()
    }
}

/// Helper to create a Node with one internal address
pub fn create_test_node(name: &str, provider_id: Option<&str>, address: &str, ready: bool) -> Node {
    Node {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            labels: Some(BTreeMap::new()),
            ..Default::default()
        },
        spec: Some(NodeSpec {
            provider_id: provider_id.map(str::to_string),
            ..Default::default()
        }),
        status: Some(NodeStatus {
            addresses: Some(vec![NodeAddress {
                address: address.to_string(),
                type_: "InternalIP".to_string(),
            }]),
            conditions: Some(vec![NodeCondition {
                type_: "Ready".to_string(),
                status: if ready { "True" } else { "False" }.to_string(),
                ..Default::default()
            }]),
            ..Default::default()
        }),
    }
}

/// Helper to create a running Pod
pub fn create_test_pod(name: &str, pod_ip: &str, host_ip: &str) -> Pod {
    Pod {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            ..Default::default()
        },
        spec: None,
        status: Some(PodStatus {
            pod_ip: Some(pod_ip.to_string()),
            host_ip: Some(host_ip.to_string()),
            ..Default::default()
        }),
    }
}

/// One published event
#[derive(Debug, Clone)]
pub struct RecordedEvent {
    pub type_: EventType,
    pub reason: String,
    pub note: String,
}

/// [`EventPublisher`] that keeps every event in memory
#[derive(Default)]
pub struct RecordingPublisher {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingPublisher {
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().unwrap().clone()
    }

    pub fn reasons(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.reason).collect()
    }
}

#[async_trait]
impl EventPublisher for RecordingPublisher {
    async fn publish(&self, _service: &Service, type_: EventType, reason: &str, note: String) {
        self.events.lock().unwrap().push(RecordedEvent {
            type_,
            reason: reason.to_string(),
            note,
        });
    }
}
