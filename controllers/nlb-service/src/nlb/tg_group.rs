//! The full set of target groups behind one Service.
//!
//! Every forwarding backend gets a target group. Target groups tagged as
//! owned by the Service but absent from the current set are garbage
//! collected, which must only happen after listeners stopped pointing at
//! them.

use super::tg::{TargetGroupController, TargetGroupInfo};
use super::{Backend, SharedAws, SharedStore, service_listeners};
use crate::error::ControllerError;
use crate::generator::{NameTagGenerator, TagGenerator};
use crate::store::ServiceKey;
use k8s_openapi::api::core::v1::Service;
use service_annotations::ServiceAnnotations;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::info;

/// Target groups of one Service, keyed by backend.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetGroupGroup {
    pub by_backend: BTreeMap<Backend, TargetGroupInfo>,
}

impl TargetGroupGroup {
    #[must_use]
    pub fn get(&self, backend: &Backend) -> Option<&TargetGroupInfo> {
        self.by_backend.get(backend)
    }

    fn arns(&self) -> BTreeSet<&str> {
        self.by_backend.values().map(|tg| tg.arn.as_str()).collect()
    }
}

pub struct TargetGroupGroupController {
    aws: SharedAws,
    generator: Arc<NameTagGenerator>,
    tg: TargetGroupController,
}

impl TargetGroupGroupController {
    pub fn new(aws: SharedAws, store: SharedStore, generator: Arc<NameTagGenerator>) -> Self {
        Self {
            tg: TargetGroupController::new(aws.clone(), store, generator.clone()),
            aws,
            generator,
        }
    }

    /// Converge a target group for every forwarding backend of `service`.
    pub async fn reconcile(
        &self,
        service: &Service,
        annotations: &ServiceAnnotations,
    ) -> Result<TargetGroupGroup, ControllerError> {
        let mut group = TargetGroupGroup::default();
        for listener in service_listeners(service, annotations.target_group.backend_protocol) {
            if listener.backend.uses_annotation() {
                continue;
            }
            let info = self.tg.reconcile(service, annotations, &listener).await?;
            group.by_backend.insert(listener.backend, info);
        }
        Ok(group)
    }

    /// Delete target groups owned by `key` that are not part of `group`.
    pub async fn gc(&self, key: &ServiceKey, group: &TargetGroupGroup) -> Result<(), ControllerError> {
        let selector = self.generator.tag_tg_group(&key.namespace, &key.name);
        let owned = self.aws.get_target_groups_by_tags(&selector).await?;
        let keep = group.arns();

        for tg in owned.iter().filter(|tg| !keep.contains(tg.arn.as_str())) {
            info!(service = %key, name = %tg.name, arn = %tg.arn, "Deleting target group");
            self.aws.delete_target_group(&tg.arn).await?;
        }
        Ok(())
    }

    /// Delete every target group owned by `key`.
    pub async fn delete(&self, key: &ServiceKey) -> Result<(), ControllerError> {
        self.gc(key, &TargetGroupGroup::default()).await
    }
}
