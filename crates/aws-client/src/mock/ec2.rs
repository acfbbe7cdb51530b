//! EC2 subnet operations for MockAwsClient

use super::MockAwsClient;
use crate::error::AwsError;
use crate::models::*;

pub async fn get_subnets_by_name_or_id(client: &MockAwsClient, names_or_ids: &[String]) -> Result<Vec<Subnet>, AwsError> {
    client.record("DescribeSubnets")?;
    Ok(client
        .subnets
        .lock()
        .unwrap()
        .iter()
        .filter(|s| {
            names_or_ids.contains(&s.id)
                || s.tags.get("Name").is_some_and(|name| names_or_ids.contains(name))
        })
        .cloned()
        .collect())
}

pub async fn get_cluster_subnets(client: &MockAwsClient) -> Result<Vec<Subnet>, AwsError> {
    client.record("DescribeSubnets")?;
    Ok(client
        .subnets
        .lock()
        .unwrap()
        .iter()
        .filter(|s| s.tags.keys().any(|k| k.starts_with("kubernetes.io/cluster/")))
        .cloned()
        .collect())
}
