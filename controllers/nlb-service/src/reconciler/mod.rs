//! Per-Service reconciliation.
//!
//! `reconcile` walks the stages in order and stops at the first failure:
//! annotations, load balancer config, whitelist, instance, attributes,
//! target groups, listeners, target group GC. Every stage is idempotent so
//! the next pass picks up where a failed one stopped.


use crate::error::{ControllerError, StageExt};
use crate::events::EventPublisher;
use crate::generator::{NameGenerator, NameTagGenerator};
use crate::nlb::attributes::AttributesController;
use crate::nlb::lb::LoadBalancerController;
use crate::nlb::listener::ListenerGroupController;
use crate::nlb::tg_group::TargetGroupGroupController;
use crate::nlb::{SharedAws, SharedStore};
use crate::store::ServiceKey;
use k8s_openapi::api::core::v1::Service;
use std::sync::Arc;
use tracing::{debug, info};

/// Address of a converged load balancer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadBalancerInfo {
    pub arn: String,
    pub dns_name: String,
}

/// Converges the cloud resources of one Service at a time.
pub struct Reconciler {
    aws: SharedAws,
    store: SharedStore,
    generator: Arc<NameTagGenerator>,
    load_balancer: LoadBalancerController,
    attributes: AttributesController,
    target_groups: TargetGroupGroupController,
    listeners: ListenerGroupController,
}

impl Reconciler {
    pub fn new(aws: SharedAws, store: SharedStore, events: Arc<dyn EventPublisher>) -> Self {
        let generator = Arc::new(NameTagGenerator::new(store.get_config()));
        Self {
            load_balancer: LoadBalancerController::new(aws.clone(), store.clone(), generator.clone(), events),
            attributes: AttributesController::new(aws.clone()),
            target_groups: TargetGroupGroupController::new(aws.clone(), store.clone(), generator.clone()),
            listeners: ListenerGroupController::new(aws.clone()),
            aws,
            store,
            generator,
        }
    }

    /// Converge the load balancer of `service` and return its address.
    pub async fn reconcile(&self, service: &Service) -> Result<LoadBalancerInfo, ControllerError> {
        let key = ServiceKey::from_service(service)
            .ok_or_else(|| ControllerError::InvalidConfig("Service is missing namespace or name".to_string()))?;
        debug!(service = %key, "Reconciling load balancer");

        let annotations = self.store.get_service_annotations(&key)?;

        let config = self
            .load_balancer
            .build_config(service, &annotations)
            .await
            .stage("build LoadBalancer configuration")?;
        self.load_balancer.validate(service, &config)?;

        let instance = self.load_balancer.ensure(service, &config).await?;
        self.attributes
            .reconcile_load_balancer(&instance.arn, &config.attributes)
            .await
            .stage("reconcile LoadBalancer attributes")?;

        let group = self
            .target_groups
            .reconcile(service, &annotations)
            .await
            .stage("reconcile targetGroups")?;
        self.listeners
            .reconcile(&instance.arn, service, &annotations, &group)
            .await
            .stage("reconcile listeners")?;
        self.target_groups
            .gc(&key, &group)
            .await
            .stage("GC targetGroups")?;

        Ok(LoadBalancerInfo {
            arn: instance.arn,
            dns_name: instance.dns_name,
        })
    }

    /// Remove every cloud resource owned by the Service at `key`.
    pub async fn delete(&self, key: &ServiceKey) -> Result<(), ControllerError> {
        let name = self.generator.name_lb(&key.namespace, &key.name);
        let instance = self
            .aws
            .get_load_balancer_by_name(&name)
            .await
            .stage("find existing LoadBalancer")?;

        if let Some(instance) = &instance {
            self.listeners
                .delete(&instance.arn)
                .await
                .stage("delete listeners")?;
        }
        // runs without a load balancer too, so a crash between the two
        // deletes cannot orphan target groups
        self.target_groups
            .delete(key)
            .await
            .stage("GC targetGroups")?;

        match instance {
            Some(instance) => self.load_balancer.delete(&instance).await,
            None => {
                info!(service = %key, lb = %name, "LoadBalancer already absent");
                Ok(())
            }
        }
    }
}
