//! AwsClient trait for mocking
//!
//! This trait abstracts the AWS client to enable mocking in unit tests.
//! The concrete AwsClient implements this trait, and tests can use mock implementations.

use crate::error::AwsError;
use crate::models::*;

/// Trait for the ELBv2 and EC2 operations the controller needs
///
/// All async methods must be `Send` to work with Tokio's work-stealing runtime.
/// Lookups by name return `Ok(None)` when the resource does not exist.
#[async_trait::async_trait]
pub trait AwsClientTrait: Send + Sync {
    // Load balancers
    async fn get_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>, AwsError>;
    async fn create_load_balancer(&self, request: CreateLoadBalancerRequest) -> Result<LoadBalancer, AwsError>;
    async fn delete_load_balancer(&self, arn: &str) -> Result<(), AwsError>;
    async fn set_ip_address_type(&self, arn: &str, ip_address_type: IpAddressType) -> Result<(), AwsError>;
    async fn set_subnets(&self, arn: &str, subnets: &[String]) -> Result<(), AwsError>;
    async fn get_load_balancer_attributes(&self, arn: &str) -> Result<Attributes, AwsError>;
    async fn modify_load_balancer_attributes(&self, arn: &str, attributes: &Attributes) -> Result<(), AwsError>;

    // Target groups
    async fn get_target_group_by_name(&self, name: &str) -> Result<Option<TargetGroup>, AwsError>;
    async fn create_target_group(&self, request: CreateTargetGroupRequest) -> Result<TargetGroup, AwsError>;
    async fn modify_target_group(&self, request: ModifyTargetGroupRequest) -> Result<TargetGroup, AwsError>;
    async fn delete_target_group(&self, arn: &str) -> Result<(), AwsError>;
    /// Every target group carrying all of `tags` (extra tags are allowed).
    async fn get_target_groups_by_tags(&self, tags: &Tags) -> Result<Vec<TargetGroup>, AwsError>;
    async fn get_target_group_attributes(&self, arn: &str) -> Result<Attributes, AwsError>;
    async fn modify_target_group_attributes(&self, arn: &str, attributes: &Attributes) -> Result<(), AwsError>;

    // Targets
    async fn describe_targets(&self, target_group_arn: &str) -> Result<Vec<Target>, AwsError>;
    async fn register_targets(&self, target_group_arn: &str, targets: &[Target]) -> Result<(), AwsError>;
    async fn deregister_targets(&self, target_group_arn: &str, targets: &[Target]) -> Result<(), AwsError>;

    // Tags (load balancers and target groups)
    async fn get_tags(&self, arn: &str) -> Result<Tags, AwsError>;
    async fn add_tags(&self, arn: &str, tags: &Tags) -> Result<(), AwsError>;
    async fn remove_tags(&self, arn: &str, keys: &[String]) -> Result<(), AwsError>;

    // Listeners
    async fn get_listeners(&self, load_balancer_arn: &str) -> Result<Vec<Listener>, AwsError>;
    async fn create_listener(&self, load_balancer_arn: &str, config: &ListenerConfig) -> Result<Listener, AwsError>;
    async fn modify_listener(&self, listener_arn: &str, config: &ListenerConfig) -> Result<Listener, AwsError>;
    async fn delete_listener(&self, listener_arn: &str) -> Result<(), AwsError>;

    // Subnets
    /// Subnets whose `Name` tag or subnet ID matches one of `names_or_ids`.
    async fn get_subnets_by_name_or_id(&self, names_or_ids: &[String]) -> Result<Vec<Subnet>, AwsError>;
    /// Subnets tagged with the cluster ownership tag, in listing order.
    async fn get_cluster_subnets(&self) -> Result<Vec<Subnet>, AwsError>;
}
