//! Tag convergence on any ELBv2 ARN.

use super::SharedAws;
use crate::error::ControllerError;
use aws_client::Tags;
use tracing::debug;

/// Keys under this prefix are managed by AWS and never removed.
const AWS_RESERVED_TAG_PREFIX: &str = "aws:";

/// Converges the tag set of a load balancer or target group.
#[derive(Clone)]
pub struct TagsController {
    aws: SharedAws,
}

impl TagsController {
    pub fn new(aws: SharedAws) -> Self {
        Self { aws }
    }

    /// Make the tags on `arn` equal `desired`, touching only keys that differ.
    pub async fn reconcile(&self, arn: &str, desired: &Tags) -> Result<(), ControllerError> {
        let current = self.aws.get_tags(arn).await?;
        let (modify, remove) = diff_tags(&current, desired);

        if !modify.is_empty() {
            debug!(arn, keys = ?modify.keys().collect::<Vec<_>>(), "Adding tags");
            self.aws.add_tags(arn, &modify).await?;
        }
        if !remove.is_empty() {
            debug!(arn, keys = ?remove, "Removing tags");
            self.aws.remove_tags(arn, &remove).await?;
        }
        Ok(())
    }
}

/// Tags to add or overwrite, and stale keys to remove.
#[must_use]
pub fn diff_tags(current: &Tags, desired: &Tags) -> (Tags, Vec<String>) {
    let modify = desired
        .iter()
        .filter(|(k, v)| current.get(*k) != Some(*v))
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    let remove = current
        .keys()
        .filter(|k| !desired.contains_key(*k) && !k.starts_with(AWS_RESERVED_TAG_PREFIX))
        .cloned()
        .collect();
    (modify, remove)
}
