//! Read-only view of the cluster objects the reconciler needs.
//!
//! The production [`KubeStore`] reads from reflector caches fed by the
//! watcher; tests use the in-memory store from `test_utils`.

use crate::config::ControllerConfig;
use crate::error::ControllerError;
use k8s_openapi::api::core::v1::{Endpoints, Node, Pod, Service};
use kube_runtime::reflector::{ObjectRef, Store as ReflectorStore};
use service_annotations::ServiceAnnotations;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Nodes carrying one of these labels never receive load balancer traffic.
const EXCLUDE_NODE_LABELS: [&str; 3] = [
    "node-role.kubernetes.io/master",
    "node.kubernetes.io/exclude-from-external-load-balancers",
    "alpha.service-controller.kubernetes.io/exclude-balancer",
];

/// Namespace and name of a Service; the unit of reconciliation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ServiceKey {
    pub namespace: String,
    pub name: String,
}

impl ServiceKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }

    /// Key of `service`, if it has both a namespace and a name.
    #[must_use]
    pub fn from_service(service: &Service) -> Option<Self> {
        Some(Self::new(
            service.metadata.namespace.clone()?,
            service.metadata.name.clone()?,
        ))
    }
}

impl fmt::Display for ServiceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Cache lookup failures.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("no object matching key {0} in local store")]
    NotFound(String),

    #[error("no providerID found for node {0}")]
    MissingProviderId(String),

    #[error("unable to locate a host for pod ip: {0}")]
    PodHostNotFound(String),
}

/// Cluster state as seen by the reconciler.
///
/// Implementors provide the raw listings; instance resolution and annotation
/// parsing are shared default methods.
pub trait Store: Send + Sync {
    fn get_service(&self, key: &ServiceKey) -> Result<Arc<Service>, StoreError>;
    fn get_service_endpoints(&self, key: &ServiceKey) -> Result<Arc<Endpoints>, StoreError>;
    /// Every node in the cache, including ones excluded from load balancing.
    fn all_nodes(&self) -> Vec<Arc<Node>>;
    fn list_pods(&self) -> Vec<Arc<Pod>>;
    fn get_config(&self) -> &ControllerConfig;

    /// Parsed annotations of the Service at `key`.
    fn get_service_annotations(&self, key: &ServiceKey) -> Result<ServiceAnnotations, ControllerError> {
        let service = self.get_service(key)?;
        let config = self.get_config();
        let annotations = service.metadata.annotations.clone().unwrap_or_default();
        Ok(ServiceAnnotations::parse(
            &config.annotations_prefix,
            &annotations,
            config.annotation_defaults(),
        )?)
    }

    /// Nodes that may receive load balancer traffic.
    fn list_nodes(&self) -> Vec<Arc<Node>> {
        self.all_nodes().into_iter().filter(|n| is_valid_node(n)).collect()
    }

    /// EC2 instance ID of `node`, taken from the last segment of its providerID.
    fn get_node_instance_id(&self, node: &Node) -> Result<String, StoreError> {
        node_instance_id(node)
    }

    /// Instance hosting the pod with IP `ip`.
    fn get_instance_id_from_pod_ip(&self, ip: &str) -> Result<String, StoreError> {
        let host_ip = self
            .list_pods()
            .into_iter()
            .filter_map(|pod| pod.status.clone())
            .find(|status| status.pod_ip.as_deref() == Some(ip))
            .and_then(|status| status.host_ip)
            .ok_or_else(|| StoreError::PodHostNotFound(ip.to_string()))?;

        let node = self
            .all_nodes()
            .into_iter()
            .find(|node| {
                node.status
                    .as_ref()
                    .and_then(|s| s.addresses.as_ref())
                    .is_some_and(|addrs| addrs.iter().any(|a| a.address == host_ip))
            })
            .ok_or_else(|| StoreError::PodHostNotFound(ip.to_string()))?;
        self.get_node_instance_id(&node)
    }

    /// Instance IDs of every node that may receive traffic.
    fn get_cluster_instance_ids(&self) -> Result<Vec<String>, StoreError> {
        self.list_nodes()
            .iter()
            .map(|node| self.get_node_instance_id(node))
            .collect()
    }
}

/// Ready and not excluded by label.
#[must_use]
pub fn is_valid_node(node: &Node) -> bool {
    let labels = node.metadata.labels.as_ref();
    if EXCLUDE_NODE_LABELS
        .iter()
        .any(|l| labels.is_some_and(|labels| labels.contains_key(*l)))
    {
        return false;
    }
    is_node_ready(node)
}

#[must_use]
pub fn is_node_ready(node: &Node) -> bool {
    node.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conds| conds.iter().any(|c| c.type_ == "Ready" && c.status == "True"))
}

fn node_instance_id(node: &Node) -> Result<String, StoreError> {
    let name = node.metadata.name.clone().unwrap_or_default();
    let provider_id = node
        .spec
        .as_ref()
        .and_then(|s| s.provider_id.as_deref())
        .filter(|p| !p.is_empty())
        .ok_or_else(|| StoreError::MissingProviderId(name.clone()))?;
    provider_id
        .rsplit('/')
        .next()
        .filter(|id| !id.is_empty())
        .map(str::to_string)
        .ok_or(StoreError::MissingProviderId(name))
}

/// [`Store`] backed by reflector caches.
#[derive(Clone)]
pub struct KubeStore {
    services: ReflectorStore<Service>,
    endpoints: ReflectorStore<Endpoints>,
    nodes: ReflectorStore<Node>,
    pods: ReflectorStore<Pod>,
    config: Arc<ControllerConfig>,
}

impl fmt::Debug for KubeStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KubeStore")
            .field("services", &self.services.state().len())
            .field("endpoints", &self.endpoints.state().len())
            .field("nodes", &self.nodes.state().len())
            .field("pods", &self.pods.state().len())
            .finish_non_exhaustive()
    }
}

impl KubeStore {
    pub fn new(
        services: ReflectorStore<Service>,
        endpoints: ReflectorStore<Endpoints>,
        nodes: ReflectorStore<Node>,
        pods: ReflectorStore<Pod>,
        config: Arc<ControllerConfig>,
    ) -> Self {
        Self {
            services,
            endpoints,
            nodes,
            pods,
            config,
        }
    }

    /// Wait until every cache has received its initial listing.
    pub async fn wait_until_ready(&self) -> Result<(), ControllerError> {
        let wait = |name: &'static str, err| ControllerError::Watch(format!("{name} cache closed before sync: {err}"));
        self.services.wait_until_ready().await.map_err(|e| wait("service", e))?;
        self.endpoints.wait_until_ready().await.map_err(|e| wait("endpoints", e))?;
        self.nodes.wait_until_ready().await.map_err(|e| wait("node", e))?;
        self.pods.wait_until_ready().await.map_err(|e| wait("pod", e))?;
        Ok(())
    }
}

impl Store for KubeStore {
    fn get_service(&self, key: &ServiceKey) -> Result<Arc<Service>, StoreError> {
        self.services
            .get(&ObjectRef::new(&key.name).within(&key.namespace))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn get_service_endpoints(&self, key: &ServiceKey) -> Result<Arc<Endpoints>, StoreError> {
        self.endpoints
            .get(&ObjectRef::new(&key.name).within(&key.namespace))
            .ok_or_else(|| StoreError::NotFound(key.to_string()))
    }

    fn all_nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.state()
    }

    fn list_pods(&self) -> Vec<Arc<Pod>> {
        self.pods.state()
    }

    fn get_config(&self) -> &ControllerConfig {
        &self.config
    }
}
