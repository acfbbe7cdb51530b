//! Kubernetes resource watchers.
//!
//! Services drive a `kube_runtime::Controller`; Endpoints and Node changes
//! are mapped onto the Services they affect. Each watch stream also feeds a
//! reflector cache backing the [`KubeStore`]. Update events that do not change
//! anything the reconciler reads are dropped before they reach the queue.

use crate::backoff::{ExponentialBackoff, KeyedBackoff};
use crate::config::ControllerConfig;
use crate::error::ControllerError;
use crate::events::{EventPublisher, REASON_DELETE, REASON_ERROR, REASON_SYNCED};
use crate::metrics::Metrics;
use crate::reconciler::Reconciler;
use crate::store::{KubeStore, ServiceKey, is_node_ready, is_valid_node};
use futures::{Stream, StreamExt, future};
use k8s_openapi::api::core::v1::{Endpoints, Node, Pod, Service};
use kube::api::{Patch, PatchParams};
use kube::{Api, Client, Resource};
use kube_runtime::controller::{Action, Config as RuntimeConfig};
use kube_runtime::events::EventType;
use kube_runtime::finalizer::{Error as FinalizerError, Event as FinalizerEvent, finalizer};
use kube_runtime::reflector::{self, ObjectRef, Store as ReflectorStore, store::Writer};
use kube_runtime::{Controller, WatchStreamExt, watcher};
use md5::{Digest, Md5};
use serde_json::json;
use service_annotations::is_valid_service;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Finalizer guarding the cloud resources of a Service.
pub const FINALIZER: &str = "nlb.service.kubernetes.io/resources";

/// Requeue delay while the caches are still syncing.
const CACHE_SYNC_REQUEUE: Duration = Duration::from_secs(2);

/// Shared state handed to every reconcile.
pub struct Context {
    reconciler: Arc<Reconciler>,
    client: Client,
    config: Arc<ControllerConfig>,
    events: Arc<dyn EventPublisher>,
    metrics: Arc<Metrics>,
    requeue: KeyedBackoff,
    managed: Mutex<BTreeSet<ServiceKey>>,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("requeue", &self.requeue)
            .finish_non_exhaustive()
    }
}

impl Context {
    pub fn new(
        reconciler: Arc<Reconciler>,
        client: Client,
        config: Arc<ControllerConfig>,
        events: Arc<dyn EventPublisher>,
        metrics: Arc<Metrics>,
    ) -> Self {
        let requeue = KeyedBackoff::new(ExponentialBackoff::default(), config.resync_period);
        Self {
            reconciler,
            client,
            config,
            events,
            metrics,
            requeue,
            managed: Mutex::new(BTreeSet::new()),
        }
    }

    fn set_managed(&self, key: &ServiceKey, managed: bool) {
        let mut set = self.managed.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        if managed {
            set.insert(key.clone());
        } else {
            set.remove(key);
        }
        self.metrics.set_managed_services(set.len());
    }
}

/// Owns the watch streams and the caches they populate.
pub struct Watcher {
    config: Arc<ControllerConfig>,
    services: Api<Service>,
    endpoints: Api<Endpoints>,
    nodes: Api<Node>,
    pods: Api<Pod>,
    service_writer: Writer<Service>,
    endpoints_writer: Writer<Endpoints>,
    node_writer: Writer<Node>,
    pod_writer: Writer<Pod>,
    store: KubeStore,
}

impl Watcher {
    /// Creates the APIs and empty caches; nothing is watched until
    /// [`Watcher::watch_services`] runs.
    pub fn new(client: Client, config: Arc<ControllerConfig>) -> Self {
        let (services, endpoints, pods) = match config.watch_namespace.as_deref() {
            Some(ns) => (
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
                Api::namespaced(client.clone(), ns),
            ),
            None => (Api::all(client.clone()), Api::all(client.clone()), Api::all(client.clone())),
        };
        let nodes = Api::all(client);

        let (service_reader, service_writer) = reflector::store();
        let (endpoints_reader, endpoints_writer) = reflector::store();
        let (node_reader, node_writer) = reflector::store();
        let (pod_reader, pod_writer) = reflector::store();
        let store = KubeStore::new(
            service_reader,
            endpoints_reader,
            node_reader,
            pod_reader,
            config.clone(),
        );

        Self {
            config,
            services,
            endpoints,
            nodes,
            pods,
            service_writer,
            endpoints_writer,
            node_writer,
            pod_writer,
            store,
        }
    }

    /// Cache-backed store shared with the reconciler.
    pub fn store(&self) -> KubeStore {
        self.store.clone()
    }

    /// Run the Service controller until shutdown.
    pub async fn watch_services(self, ctx: Arc<Context>) -> Result<(), ControllerError> {
        info!(class = %self.config.service_class, "Starting Service watcher");

        let service_reader = self.service_writer.as_reader();
        let services = relevant_changes(
            watcher(self.services, watcher::Config::default())
                .default_backoff()
                .reflect(self.service_writer),
            service_fingerprint,
        );
        let endpoints = relevant_changes(
            watcher(self.endpoints, watcher::Config::default())
                .default_backoff()
                .reflect(self.endpoints_writer),
            endpoints_fingerprint,
        );
        let nodes = relevant_changes(
            watcher(self.nodes, watcher::Config::default())
                .default_backoff()
                .reflect(self.node_writer),
            node_fingerprint,
        );
        // pods are only read when resolving instance targets for Local traffic
        let pods = watcher(self.pods, watcher::Config::default())
            .default_backoff()
            .reflect(self.pod_writer)
            .for_each(|res| async move {
                if let Err(e) = res {
                    warn!(error = %e, "Pod watch error");
                }
            });

        let class = self.config.service_class.clone();
        let endpoint_services = service_reader.clone();
        let endpoint_class = class.clone();
        let node_services = service_reader.clone();

        let runtime_config = RuntimeConfig::default()
            .debounce(Duration::from_secs(1))
            .concurrency(self.config.max_concurrent_reconciles);

        let controller = Controller::for_stream(services, service_reader)
            .with_config(runtime_config)
            .watches_stream(endpoints, move |ep: Endpoints| {
                services_for_endpoints(&endpoint_services, &endpoint_class, &ep)
            })
            .watches_stream(nodes, move |_node: Node| services_of_class(&node_services, &class))
            .shutdown_on_signal()
            .run(reconcile, error_policy, ctx)
            .for_each(|res| async move {
                match res {
                    Ok((obj, action)) => debug!(service = %obj, ?action, "Reconciled"),
                    Err(e) => debug!(error = %e, "Controller error"),
                }
            });

        tokio::select! {
            () = controller => info!("Service controller stopped"),
            () = pods => warn!("Pod watch ended"),
        }
        Ok(())
    }
}

/// Drop applied objects whose fingerprint did not change since they were
/// last seen. Deletions always pass.
fn relevant_changes<K, S>(
    events: S,
    fingerprint: fn(&K) -> String,
) -> impl Stream<Item = Result<K, watcher::Error>> + Send + 'static
where
    K: Resource<DynamicType = ()> + Clone + Send + 'static,
    S: Stream<Item = Result<watcher::Event<K>, watcher::Error>> + Send + 'static,
{
    let mut seen: HashMap<ObjectRef<K>, String> = HashMap::new();
    events.filter_map(move |event| {
        let out = match event {
            Ok(watcher::Event::Apply(obj) | watcher::Event::InitApply(obj)) => {
                let current = fingerprint(&obj);
                let previous = seen.insert(ObjectRef::from_obj(&obj), current.clone());
                (previous.as_ref() != Some(&current)).then_some(Ok(obj))
            }
            Ok(watcher::Event::Delete(obj)) => {
                seen.remove(&ObjectRef::from_obj(&obj));
                Some(Ok(obj))
            }
            Ok(watcher::Event::Init | watcher::Event::InitDone) => None,
            Err(e) => Some(Err(e)),
        };
        future::ready(out)
    })
}

fn digest(value: &serde_json::Value) -> String {
    hex::encode(Md5::digest(value.to_string().as_bytes()))
}

/// Everything on a Service the reconciler reads; status is excluded.
fn service_fingerprint(service: &Service) -> String {
    digest(&json!({
        "annotations": service.metadata.annotations,
        "finalizers": service.metadata.finalizers,
        "deleting": service.metadata.deletion_timestamp.is_some(),
        "spec": service.spec,
    }))
}

fn endpoints_fingerprint(endpoints: &Endpoints) -> String {
    digest(&json!(endpoints.subsets))
}

/// Instance identity and eligibility of a Node.
fn node_fingerprint(node: &Node) -> String {
    let provider_id = node.spec.as_ref().and_then(|s| s.provider_id.as_deref());
    digest(&json!({
        "providerID": provider_id,
        "ready": is_node_ready(node),
        "valid": is_valid_node(node),
    }))
}

fn is_class_member(service: &Service, class: &str) -> bool {
    service
        .metadata
        .annotations
        .as_ref()
        .is_some_and(|annos| is_valid_service(annos, class))
}

fn has_finalizer(service: &Service) -> bool {
    service
        .metadata
        .finalizers
        .as_ref()
        .is_some_and(|f| f.iter().any(|f| f == FINALIZER))
}

/// The same-named Service, when it belongs to `class`.
fn services_for_endpoints(
    services: &ReflectorStore<Service>,
    class: &str,
    endpoints: &Endpoints,
) -> Option<ObjectRef<Service>> {
    let name = endpoints.metadata.name.as_deref()?;
    let namespace = endpoints.metadata.namespace.as_deref()?;
    let service_ref = ObjectRef::new(name).within(namespace);
    services
        .get(&service_ref)
        .filter(|s| is_class_member(s, class))
        .map(|_| service_ref)
}

/// Every cached Service belonging to `class`.
fn services_of_class(services: &ReflectorStore<Service>, class: &str) -> Vec<ObjectRef<Service>> {
    services
        .state()
        .iter()
        .filter(|s| is_class_member(s, class))
        .map(|s| ObjectRef::from_obj(s.as_ref()))
        .collect()
}

fn ingress_hostname(service: &Service) -> Option<&str> {
    service
        .status
        .as_ref()?
        .load_balancer
        .as_ref()?
        .ingress
        .as_ref()?
        .first()?
        .hostname
        .as_deref()
}

async fn reconcile(service: Arc<Service>, ctx: Arc<Context>) -> Result<Action, ControllerError> {
    let key = ServiceKey::from_service(&service)
        .ok_or_else(|| ControllerError::InvalidConfig("Service is missing namespace or name".to_string()))?;
    if !ctx.metrics.is_ready() {
        debug!(service = %key, "Caches not synced yet, requeueing");
        return Ok(Action::requeue(CACHE_SYNC_REQUEUE));
    }

    let api: Api<Service> = Api::namespaced(ctx.client.clone(), &key.namespace);
    if !is_class_member(&service, &ctx.config.service_class) {
        // left our class: release what we own, then let go
        if has_finalizer(&service) {
            ctx.metrics.reconcile_started();
            release(&api, &key, &service, &ctx).await?;
        }
        return Ok(Action::await_change());
    }

    ctx.metrics.reconcile_started();
    finalizer(&api, FINALIZER, service, |event| async {
        match event {
            FinalizerEvent::Apply(service) => apply(&api, &key, &service, &ctx).await,
            FinalizerEvent::Cleanup(service) => cleanup(&key, &service, &ctx).await,
        }
    })
    .await
    .map_err(|e| match e {
        FinalizerError::ApplyFailed(e) | FinalizerError::CleanupFailed(e) => e,
        other => ControllerError::Finalizer(other.to_string()),
    })
}

async fn apply(
    api: &Api<Service>,
    key: &ServiceKey,
    service: &Service,
    ctx: &Context,
) -> Result<Action, ControllerError> {
    info!(service = %key, "Reconciling Service");
    let result = tokio::time::timeout(ctx.config.reconcile_timeout, ctx.reconciler.reconcile(service))
        .await
        .unwrap_or_else(|_| Err(ControllerError::Timeout(key.to_string())));

    let info = match result {
        Ok(info) => info,
        Err(e) => {
            ctx.events
                .publish(service, EventType::Warning, REASON_ERROR, e.to_string())
                .await;
            return Err(e);
        }
    };

    if ingress_hostname(service) != Some(info.dns_name.as_str()) {
        let patch = json!({
            "status": {
                "loadBalancer": {
                    "ingress": [{ "hostname": info.dns_name }]
                }
            }
        });
        api.patch_status(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
            .await?;
        info!(service = %key, hostname = %info.dns_name, "Published load balancer hostname");
        ctx.events
            .publish(
                service,
                EventType::Normal,
                REASON_SYNCED,
                format!("LoadBalancer {} is available at {}", info.arn, info.dns_name),
            )
            .await;
    }

    ctx.set_managed(key, true);
    Ok(Action::requeue(ctx.requeue.on_success(key)))
}

async fn cleanup(key: &ServiceKey, service: &Service, ctx: &Context) -> Result<Action, ControllerError> {
    info!(service = %key, "Deleting load balancer resources");
    let result = tokio::time::timeout(ctx.config.reconcile_timeout, ctx.reconciler.delete(key))
        .await
        .unwrap_or_else(|_| Err(ControllerError::Timeout(key.to_string())));

    match result {
        Ok(()) => {
            ctx.events
                .publish(
                    service,
                    EventType::Normal,
                    REASON_DELETE,
                    "LoadBalancer resources deleted".to_string(),
                )
                .await;
            ctx.set_managed(key, false);
            ctx.requeue.forget(key);
            Ok(Action::await_change())
        }
        Err(e) => {
            ctx.events
                .publish(service, EventType::Warning, REASON_ERROR, e.to_string())
                .await;
            Err(e)
        }
    }
}

/// Delete the cloud resources of a Service that left our class and drop
/// the finalizer.
async fn release(
    api: &Api<Service>,
    key: &ServiceKey,
    service: &Service,
    ctx: &Context,
) -> Result<(), ControllerError> {
    info!(service = %key, "Service left class {}, releasing", ctx.config.service_class);
    cleanup(key, service, ctx).await?;

    let remaining: Vec<&String> = service
        .metadata
        .finalizers
        .iter()
        .flatten()
        .filter(|f| f.as_str() != FINALIZER)
        .collect();
    let patch = json!({ "metadata": { "finalizers": remaining } });
    api.patch(&key.name, &PatchParams::default(), &Patch::Merge(&patch))
        .await?;
    Ok(())
}

fn error_policy(service: Arc<Service>, err: &ControllerError, ctx: Arc<Context>) -> Action {
    let Some(key) = ServiceKey::from_service(&service) else {
        error!(error = %err, "Reconcile failed for unnamed Service");
        return Action::await_change();
    };
    ctx.metrics.reconcile_failed(&key.to_string());
    let delay = ctx.requeue.on_failure(&key);
    error!(service = %key, error = %err, retry_in = ?delay, "Reconcile failed");
    Action::requeue(delay)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::{create_test_endpoints, create_test_node, create_test_service};
    use futures::stream;
    use k8s_openapi::api::core::v1::{LoadBalancerIngress, LoadBalancerStatus, ServiceStatus};

    fn applied<K>(obj: K) -> Result<watcher::Event<K>, watcher::Error> {
        Ok(watcher::Event::Apply(obj))
    }

    async fn names<K: Resource<DynamicType = ()> + Clone + Send + 'static>(
        events: Vec<Result<watcher::Event<K>, watcher::Error>>,
        fingerprint: fn(&K) -> String,
    ) -> Vec<String> {
        relevant_changes(stream::iter(events), fingerprint)
            .map(|res| res.unwrap().meta().name.clone().unwrap_or_default())
            .collect::<Vec<_>>()
            .await
    }

    #[tokio::test]
    async fn test_unchanged_endpoints_are_dropped() {
        let ready = create_test_endpoints("default", "web", &["10.0.0.1"], &[], &[("http", 8080)]);
        let mut relabeled = ready.clone();
        relabeled
            .metadata
            .labels
            .get_or_insert_default()
            .insert("touched".to_string(), "yes".to_string());
        let scaled = create_test_endpoints("default", "web", &["10.0.0.1", "10.0.0.2"], &[], &[("http", 8080)]);

        let seen = names(
            vec![applied(ready), applied(relabeled), applied(scaled)],
            endpoints_fingerprint,
        )
        .await;
        assert_eq!(seen, vec!["web", "web"]);
    }

    #[tokio::test]
    async fn test_node_changes_filtered_to_identity_and_readiness() {
        let node = create_test_node("node-a", Some("aws:///us-east-1a/i-0a"), "10.0.0.1", true);
        let mut heartbeat = node.clone();
        heartbeat
            .metadata
            .annotations
            .get_or_insert_default()
            .insert("heartbeat".to_string(), "1".to_string());
        let not_ready = create_test_node("node-a", Some("aws:///us-east-1a/i-0a"), "10.0.0.1", false);

        let seen = names(
            vec![
                applied(node.clone()),
                applied(heartbeat),
                applied(not_ready),
                Ok(watcher::Event::Delete(node)),
            ],
            node_fingerprint,
        )
        .await;
        assert_eq!(seen, vec!["node-a", "node-a", "node-a"]);
    }

    #[tokio::test]
    async fn test_service_status_update_is_dropped() {
        let service = create_test_service("default", "web", vec![]);
        let mut with_status = service.clone();
        with_status.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    hostname: Some("nlb.example.com".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
        let mut annotated = with_status.clone();
        annotated
            .metadata
            .annotations
            .get_or_insert_default()
            .insert("nlb.service.kubernetes.io/scheme".to_string(), "internet-facing".to_string());

        let seen = names(
            vec![
                Ok(watcher::Event::Init),
                Ok(watcher::Event::InitApply(service)),
                Ok(watcher::Event::InitDone),
                applied(with_status),
                applied(annotated),
            ],
            service_fingerprint,
        )
        .await;
        assert_eq!(seen, vec!["web", "web"]);
    }

    #[test]
    fn test_class_membership_and_finalizer() {
        let mut service = create_test_service("default", "web", vec![]);
        assert!(is_class_member(&service, "nlb"));
        assert!(!is_class_member(&service, "internal"));
        assert!(!has_finalizer(&service));

        service.metadata.finalizers = Some(vec!["other".to_string(), FINALIZER.to_string()]);
        assert!(has_finalizer(&service));
    }

    #[test]
    fn test_ingress_hostname() {
        let mut service = create_test_service("default", "web", vec![]);
        assert_eq!(ingress_hostname(&service), None);

        service.status = Some(ServiceStatus {
            load_balancer: Some(LoadBalancerStatus {
                ingress: Some(vec![LoadBalancerIngress {
                    hostname: Some("nlb-x.elb.amazonaws.com".to_string()),
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        });
        assert_eq!(ingress_hostname(&service), Some("nlb-x.elb.amazonaws.com"));
    }
}
