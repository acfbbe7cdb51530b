//! Load balancer and target group attribute convergence.
//!
//! Only keys named in the desired map are managed; attributes the Service
//! does not mention keep whatever value AWS has.

use super::SharedAws;
use crate::error::ControllerError;
use aws_client::Attributes;
use tracing::info;

#[derive(Clone)]
pub struct AttributesController {
    aws: SharedAws,
}

impl AttributesController {
    pub fn new(aws: SharedAws) -> Self {
        Self { aws }
    }

    pub async fn reconcile_load_balancer(&self, arn: &str, desired: &Attributes) -> Result<(), ControllerError> {
        if desired.is_empty() {
            return Ok(());
        }
        let current = self.aws.get_load_balancer_attributes(arn).await?;
        let changes = changed_attributes(&current, desired);
        if !changes.is_empty() {
            info!(arn, ?changes, "Modifying load balancer attributes");
            self.aws.modify_load_balancer_attributes(arn, &changes).await?;
        }
        Ok(())
    }

    pub async fn reconcile_target_group(&self, arn: &str, desired: &Attributes) -> Result<(), ControllerError> {
        if desired.is_empty() {
            return Ok(());
        }
        let current = self.aws.get_target_group_attributes(arn).await?;
        let changes = changed_attributes(&current, desired);
        if !changes.is_empty() {
            info!(arn, ?changes, "Modifying target group attributes");
            self.aws.modify_target_group_attributes(arn, &changes).await?;
        }
        Ok(())
    }
}

fn changed_attributes(current: &Attributes, desired: &Attributes) -> Attributes {
    desired
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect()
}
