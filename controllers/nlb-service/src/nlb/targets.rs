//! Target membership of a target group.
//!
//! Desired targets come from the object cache: ready endpoint addresses for
//! `ip` target groups, cluster instances on the node port for `instance`
//! ones. Live membership is diffed against it and only the difference is
//! registered or deregistered.

use super::{Backend, SharedAws, SharedStore, find_service_port, service_ns_name};
use crate::error::ControllerError;
use crate::store::ServiceKey;
use aws_client::{Target, TargetType};
use k8s_openapi::api::core::v1::{Endpoints, Service, ServicePort};
use std::collections::BTreeSet;
use tracing::{debug, info};

const EXTERNAL_TRAFFIC_POLICY_LOCAL: &str = "Local";

#[derive(Clone)]
pub struct TargetsController {
    aws: SharedAws,
    store: SharedStore,
}

impl TargetsController {
    pub fn new(aws: SharedAws, store: SharedStore) -> Self {
        Self { aws, store }
    }

    /// Targets `backend` should route to.
    pub fn desired_targets(
        &self,
        service: &Service,
        backend: &Backend,
        target_type: TargetType,
    ) -> Result<BTreeSet<Target>, ControllerError> {
        let (namespace, _) = service_ns_name(service);
        let port = find_service_port(service, &backend.service_port).ok_or_else(|| {
            ControllerError::InvalidConfig(format!(
                "service {namespace}/{} has no port {}",
                backend.service_name, backend.service_port
            ))
        })?;
        let key = ServiceKey::new(namespace, &backend.service_name);

        match target_type {
            TargetType::Ip => {
                let endpoints = self.store.get_service_endpoints(&key)?;
                Ok(endpoint_targets(&endpoints, port))
            }
            TargetType::Instance => self.instance_targets(service, &key, port),
        }
    }

    fn instance_targets(
        &self,
        service: &Service,
        key: &ServiceKey,
        port: &ServicePort,
    ) -> Result<BTreeSet<Target>, ControllerError> {
        let node_port = port
            .node_port
            .filter(|p| *p != 0)
            .ok_or_else(|| ControllerError::MissingNodePort {
                service: key.name.clone(),
                port: port.port.to_string(),
            })?;

        let local = service
            .spec
            .as_ref()
            .and_then(|s| s.external_traffic_policy.as_deref())
            == Some(EXTERNAL_TRAFFIC_POLICY_LOCAL);

        let instances: BTreeSet<String> = if local {
            let endpoints = self.store.get_service_endpoints(key)?;
            ready_addresses(&endpoints)
                .map(|ip| self.store.get_instance_id_from_pod_ip(ip))
                .collect::<Result<_, _>>()?
        } else {
            self.store.get_cluster_instance_ids()?.into_iter().collect()
        };

        Ok(instances
            .into_iter()
            .map(|id| Target { id, port: node_port })
            .collect())
    }

    /// Register and deregister until `target_group_arn` holds exactly `desired`.
    pub async fn reconcile(&self, target_group_arn: &str, desired: &BTreeSet<Target>) -> Result<(), ControllerError> {
        let current: BTreeSet<Target> = self
            .aws
            .describe_targets(target_group_arn)
            .await?
            .into_iter()
            .collect();

        let additions: Vec<Target> = desired.difference(&current).cloned().collect();
        let removals: Vec<Target> = current.difference(desired).cloned().collect();

        if !additions.is_empty() {
            info!(
                arn = target_group_arn,
                targets = %join_targets(&additions),
                "Adding targets"
            );
            self.aws.register_targets(target_group_arn, &additions).await?;
        }
        if !removals.is_empty() {
            info!(
                arn = target_group_arn,
                targets = %join_targets(&removals),
                "Removing targets"
            );
            self.aws.deregister_targets(target_group_arn, &removals).await?;
        }
        if additions.is_empty() && removals.is_empty() {
            debug!(arn = target_group_arn, "Targets up to date");
        }
        Ok(())
    }
}

fn ready_addresses(endpoints: &Endpoints) -> impl Iterator<Item = &str> + '_ {
    endpoints
        .subsets
        .iter()
        .flatten()
        .flat_map(|subset| subset.addresses.iter().flatten())
        .map(|address| address.ip.as_str())
}

/// Ready endpoint addresses on the endpoint port named like `port`.
fn endpoint_targets(endpoints: &Endpoints, port: &ServicePort) -> BTreeSet<Target> {
    let port_name = port.name.as_deref().unwrap_or_default();
    let mut targets = BTreeSet::new();
    for subset in endpoints.subsets.iter().flatten() {
        let Some(endpoint_port) = subset
            .ports
            .iter()
            .flatten()
            .find(|p| p.name.as_deref().unwrap_or_default() == port_name)
        else {
            continue;
        };
        for address in subset.addresses.iter().flatten() {
            targets.insert(Target {
                id: address.ip.clone(),
                port: endpoint_port.port,
            });
        }
    }
    targets
}

fn join_targets(targets: &[Target]) -> String {
    targets
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
