//! Subnet resolution for a load balancer.

use super::SharedAws;
use crate::error::ControllerError;
use aws_client::Scheme;
use std::collections::BTreeSet;
use tracing::debug;

pub const TAG_SUBNET_INTERNAL_ELB: &str = "kubernetes.io/role/internal-elb";
pub const TAG_SUBNET_PUBLIC_ELB: &str = "kubernetes.io/role/elb";

const SUBNET_ID_PREFIX: &str = "subnet-";
const MIN_AUTO_DISCOVERED_SUBNETS: usize = 2;

/// Role tag a subnet needs to host a load balancer of `scheme`.
#[must_use]
pub fn role_tag(scheme: Scheme) -> &'static str {
    match scheme {
        Scheme::Internal => TAG_SUBNET_INTERNAL_ELB,
        Scheme::InternetFacing => TAG_SUBNET_PUBLIC_ELB,
    }
}

#[derive(Clone)]
pub struct SubnetResolver {
    aws: SharedAws,
    cluster_name: String,
}

impl SubnetResolver {
    pub fn new(aws: SharedAws, cluster_name: impl Into<String>) -> Self {
        Self {
            aws,
            cluster_name: cluster_name.into(),
        }
    }

    /// Sorted, unique subnet IDs for `requested`, or auto-discovered ones when it is empty.
    pub async fn resolve(&self, scheme: Scheme, requested: &[String]) -> Result<Vec<String>, ControllerError> {
        if requested.is_empty() {
            return self.cluster_subnets(scheme).await;
        }

        let mut seen = BTreeSet::new();
        let requested: Vec<String> = requested.iter().filter(|s| seen.insert(*s)).cloned().collect();
        let (mut subnets, names): (Vec<String>, Vec<String>) = requested
            .iter()
            .cloned()
            .partition(|s| s.starts_with(SUBNET_ID_PREFIX));

        if !names.is_empty() {
            let found = self.aws.get_subnets_by_name_or_id(&names).await?;
            subnets.extend(found.into_iter().map(|s| s.id));
        }

        subnets.sort();
        if subnets.len() != requested.len() {
            return Err(ControllerError::SubnetMismatch {
                requested,
                resolved: subnets,
            });
        }
        // a name may resolve to an ID that was also listed
        subnets.dedup();
        Ok(subnets)
    }

    /// Cluster-tagged subnets carrying the role tag for `scheme`, one per zone.
    async fn cluster_subnets(&self, scheme: Scheme) -> Result<Vec<String>, ControllerError> {
        let role = role_tag(scheme);
        let candidates: Vec<String> = self
            .aws
            .get_cluster_subnets()
            .await?
            .into_iter()
            .filter(|s| s.tags.contains_key(role))
            .map(|s| s.id)
            .collect();

        let mut out = Vec::new();
        if !candidates.is_empty() {
            let mut zones = BTreeSet::new();
            for subnet in self.aws.get_subnets_by_name_or_id(&candidates).await? {
                // first subnet seen in a zone wins
                if zones.insert(subnet.availability_zone.clone()) {
                    out.push(subnet.id);
                }
            }
        }

        if out.len() < MIN_AUTO_DISCOVERED_SUBNETS {
            return Err(ControllerError::InsufficientSubnets {
                role_tag: role.to_string(),
                cluster: self.cluster_name.clone(),
                found: out,
            });
        }

        out.sort();
        debug!(?scheme, subnets = ?out, "Discovered cluster subnets");
        Ok(out)
    }
}
