//! Load balancer instance lifecycle.
//!
//! The instance is found by its deterministic name on every pass:
//! absent means create, a scheme change means delete and create again, and
//! anything else is modified in place.

use super::subnets::SubnetResolver;
use super::tags::TagsController;
use super::{SharedAws, SharedStore, service_ns_name};
use crate::error::{ControllerError, StageExt};
use crate::events::{EventPublisher, REASON_CREATE, REASON_ERROR, REASON_MODIFY};
use crate::generator::{NameGenerator, NameTagGenerator, TagGenerator};
use aws_client::{Attributes, CreateLoadBalancerRequest, IpAddressType, LoadBalancer, Scheme, Tags};
use k8s_openapi::api::core::v1::Service;
use kube_runtime::events::EventType;
use service_annotations::ServiceAnnotations;
use std::sync::Arc;
use tracing::{error, info};

/// Desired state of a Service's load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerConfig {
    pub name: String,
    pub tags: Tags,
    pub scheme: Scheme,
    pub ip_address_type: IpAddressType,
    /// Sorted subnet IDs
    pub subnets: Vec<String>,
    pub attributes: Attributes,
}

pub struct LoadBalancerController {
    aws: SharedAws,
    store: SharedStore,
    generator: Arc<NameTagGenerator>,
    tags: TagsController,
    subnets: SubnetResolver,
    events: Arc<dyn EventPublisher>,
}

impl LoadBalancerController {
    pub fn new(
        aws: SharedAws,
        store: SharedStore,
        generator: Arc<NameTagGenerator>,
        events: Arc<dyn EventPublisher>,
    ) -> Self {
        let cluster_name = store.get_config().cluster_name.clone();
        Self {
            tags: TagsController::new(aws.clone()),
            subnets: SubnetResolver::new(aws.clone(), cluster_name),
            aws,
            store,
            generator,
            events,
        }
    }

    pub async fn build_config(
        &self,
        service: &Service,
        annotations: &ServiceAnnotations,
    ) -> Result<LoadBalancerConfig, ControllerError> {
        let (namespace, name) = service_ns_name(service);
        let tags = self
            .generator
            .with_defaults(self.generator.tag_lb(namespace, name), &annotations.tags);

        let lb = &annotations.load_balancer;
        let subnets = self.subnets.resolve(lb.scheme, &lb.subnets).await?;

        Ok(LoadBalancerConfig {
            name: self.generator.name_lb(namespace, name),
            tags,
            scheme: lb.scheme,
            ip_address_type: lb.ip_address_type,
            subnets,
            attributes: lb.attributes.clone(),
        })
    }

    /// Reject internet-facing load balancers for Services outside the whitelist.
    pub fn validate(&self, service: &Service, config: &LoadBalancerConfig) -> Result<(), ControllerError> {
        let settings = self.store.get_config();
        if settings.restrict_scheme && config.scheme == Scheme::InternetFacing {
            let (namespace, name) = service_ns_name(service);
            if !settings.is_internet_facing_allowed(namespace, name) {
                return Err(ControllerError::SchemeNotAllowed(format!("{namespace}/{name}")));
            }
        }
        Ok(())
    }

    /// Converge the live instance with `config` and return it.
    pub async fn ensure(&self, service: &Service, config: &LoadBalancerConfig) -> Result<LoadBalancer, ControllerError> {
        let existing = self
            .aws
            .get_load_balancer_by_name(&config.name)
            .await
            .stage("find existing LoadBalancer")?;

        match existing {
            None => self.create(service, config).await.stage("create LoadBalancer"),
            Some(instance) if instance.scheme != config.scheme => {
                info!(
                    name = %config.name,
                    from = %instance.scheme,
                    to = %config.scheme,
                    "LoadBalancer needs recreation due to scheme change"
                );
                self.recreate(service, &instance, config)
                    .await
                    .stage("recreate LoadBalancer")
            }
            Some(instance) => {
                self.modify(service, &instance, config).await?;
                Ok(instance)
            }
        }
    }

    pub async fn delete(&self, instance: &LoadBalancer) -> Result<(), ControllerError> {
        info!(arn = %instance.arn, "Deleting LoadBalancer");
        self.aws.delete_load_balancer(&instance.arn).await?;
        Ok(())
    }

    async fn create(&self, service: &Service, config: &LoadBalancerConfig) -> Result<LoadBalancer, ControllerError> {
        info!(name = %config.name, "Creating LoadBalancer");
        let request = CreateLoadBalancerRequest {
            name: config.name.clone(),
            scheme: config.scheme,
            ip_address_type: config.ip_address_type,
            subnets: config.subnets.clone(),
            tags: config.tags.clone(),
        };
        match self.aws.create_load_balancer(request).await {
            Ok(instance) => {
                info!(name = %config.name, arn = %instance.arn, "LoadBalancer created");
                self.events
                    .publish(
                        service,
                        EventType::Normal,
                        REASON_CREATE,
                        format!("LoadBalancer {} created, ARN: {}", config.name, instance.arn),
                    )
                    .await;
                Ok(instance)
            }
            Err(e) => {
                error!(name = %config.name, error = %e, "Failed to create LoadBalancer");
                self.events
                    .publish(
                        service,
                        EventType::Warning,
                        REASON_ERROR,
                        format!("failed to create LoadBalancer {} due to {e}", config.name),
                    )
                    .await;
                Err(e.into())
            }
        }
    }

    async fn recreate(
        &self,
        service: &Service,
        instance: &LoadBalancer,
        config: &LoadBalancerConfig,
    ) -> Result<LoadBalancer, ControllerError> {
        info!(arn = %instance.arn, "Deleting LoadBalancer for recreation");
        self.aws.delete_load_balancer(&instance.arn).await?;
        self.create(service, config).await
    }

    async fn modify(
        &self,
        service: &Service,
        instance: &LoadBalancer,
        config: &LoadBalancerConfig,
    ) -> Result<(), ControllerError> {
        let arn = instance.arn.as_str();

        if instance.ip_address_type != config.ip_address_type {
            info!(
                arn,
                from = %instance.ip_address_type,
                to = %config.ip_address_type,
                "Modifying LoadBalancer IpAddressType"
            );
            if let Err(e) = self.aws.set_ip_address_type(arn, config.ip_address_type).await {
                self.events
                    .publish(
                        service,
                        EventType::Warning,
                        REASON_ERROR,
                        format!("failed to modify IpAddressType of {arn} due to {e}"),
                    )
                    .await;
                return Err(ControllerError::stage("modify IpAddressType", e));
            }
            self.events
                .publish(
                    service,
                    EventType::Normal,
                    REASON_MODIFY,
                    format!("IpAddressType of {arn} modified"),
                )
                .await;
        }

        let current = instance.subnet_ids();
        if current != config.subnets {
            info!(arn, from = ?current, to = ?config.subnets, "Modifying LoadBalancer Subnets");
            if let Err(e) = self.aws.set_subnets(arn, &config.subnets).await {
                self.events
                    .publish(
                        service,
                        EventType::Warning,
                        REASON_ERROR,
                        format!("failed to modify Subnets of {arn} due to {e}"),
                    )
                    .await;
                return Err(ControllerError::stage("modify Subnets", e));
            }
        }

        self.tags
            .reconcile(arn, &config.tags)
            .await
            .stage("reconcile LoadBalancer tags")
    }
}
