//! Mock AwsClient for unit testing
//!
//! This module provides an in-memory implementation of AwsClientTrait that can be used
//! in unit tests without talking to AWS.
//!
//! The mock is organized into domain-specific modules:
//! - `elbv2.rs` - Load balancers, target groups, targets, listeners and tags
//! - `ec2.rs` - Subnets
//! - `helpers.rs` - ARN and DNS name fabrication
//!
//! Every trait call is appended to a call log so tests can assert which
//! operations a reconcile issued (and that a converged reconcile issues no
//! mutating calls).

mod ec2;
mod elbv2;
mod helpers;

use crate::aws_trait::AwsClientTrait;
use crate::error::AwsError;
use crate::models::*;
use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, Mutex};

/// Operations that change AWS state.
pub const MUTATING_OPERATIONS: &[&str] = &[
    "CreateLoadBalancer",
    "DeleteLoadBalancer",
    "SetIpAddressType",
    "SetSubnets",
    "ModifyLoadBalancerAttributes",
    "CreateTargetGroup",
    "ModifyTargetGroup",
    "DeleteTargetGroup",
    "ModifyTargetGroupAttributes",
    "RegisterTargets",
    "DeregisterTargets",
    "AddTags",
    "RemoveTags",
    "CreateListener",
    "ModifyListener",
    "DeleteListener",
];

/// Mock AwsClient for testing
///
/// This mock stores resources in memory and can be configured to fail
/// specific operations for testing error paths.
#[derive(Clone, Default)]
pub struct MockAwsClient {
    // Keyed by name
    pub(crate) load_balancers: Arc<Mutex<HashMap<String, LoadBalancer>>>,
    // Keyed by ARN
    pub(crate) target_groups: Arc<Mutex<HashMap<String, TargetGroup>>>,
    pub(crate) listeners: Arc<Mutex<HashMap<String, Listener>>>,
    pub(crate) tags: Arc<Mutex<HashMap<String, Tags>>>,
    pub(crate) attributes: Arc<Mutex<HashMap<String, Attributes>>>,
    pub(crate) targets: Arc<Mutex<HashMap<String, BTreeSet<Target>>>>,
    pub(crate) subnets: Arc<Mutex<Vec<Subnet>>>,
    pub(crate) calls: Arc<Mutex<Vec<String>>>,
    pub(crate) failures: Arc<Mutex<HashMap<String, String>>>,
}

impl std::fmt::Debug for MockAwsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockAwsClient")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

impl MockAwsClient {
    /// Create a new, empty mock client
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a subnet to the mock store (for test setup)
    pub fn add_subnet(&self, id: &str, availability_zone: &str, tags: &[(&str, &str)]) {
        self.subnets.lock().unwrap().push(Subnet {
            id: id.to_string(),
            availability_zone: availability_zone.to_string(),
            tags: tags
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        });
    }

    /// Add an existing load balancer to the mock store (for test setup)
    pub fn add_load_balancer(&self, lb: LoadBalancer, tags: Tags) {
        self.tags.lock().unwrap().insert(lb.arn.clone(), tags);
        self.load_balancers.lock().unwrap().insert(lb.name.clone(), lb);
    }

    /// Add an existing target group to the mock store (for test setup)
    pub fn add_target_group(&self, tg: TargetGroup, tags: Tags) {
        self.tags.lock().unwrap().insert(tg.arn.clone(), tags);
        self.target_groups.lock().unwrap().insert(tg.arn.clone(), tg);
    }

    /// Make every future call of `operation` fail with an API error
    pub fn fail_on(&self, operation: &str, message: &str) {
        self.failures
            .lock()
            .unwrap()
            .insert(operation.to_string(), message.to_string());
    }

    /// Every operation called so far, in order
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Only the state-changing operations called so far, in order
    pub fn mutating_calls(&self) -> Vec<String> {
        self.calls()
            .into_iter()
            .filter(|op| MUTATING_OPERATIONS.contains(&op.as_str()))
            .collect()
    }

    /// Number of times `operation` was called
    pub fn call_count(&self, operation: &str) -> usize {
        self.calls().iter().filter(|op| *op == operation).count()
    }

    /// Forget the call log (state is kept)
    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Load balancer currently stored under `name`
    pub fn load_balancer(&self, name: &str) -> Option<LoadBalancer> {
        self.load_balancers.lock().unwrap().get(name).cloned()
    }

    /// All stored target groups
    pub fn target_group_list(&self) -> Vec<TargetGroup> {
        let mut tgs: Vec<TargetGroup> = self.target_groups.lock().unwrap().values().cloned().collect();
        tgs.sort_by(|a, b| a.name.cmp(&b.name));
        tgs
    }

    /// All listeners attached to `load_balancer_arn`, sorted by port
    pub fn listener_list(&self, load_balancer_arn: &str) -> Vec<Listener> {
        let mut listeners: Vec<Listener> = self
            .listeners
            .lock()
            .unwrap()
            .values()
            .filter(|l| l.load_balancer_arn == load_balancer_arn)
            .cloned()
            .collect();
        listeners.sort_by_key(|l| l.port);
        listeners
    }

    /// Registered targets of a target group, sorted
    pub fn target_list(&self, target_group_arn: &str) -> Vec<Target> {
        self.targets
            .lock()
            .unwrap()
            .get(target_group_arn)
            .map(|set| set.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Record a call and return the injected failure for it, if any
    pub(crate) fn record(&self, operation: &str) -> Result<(), AwsError> {
        self.calls.lock().unwrap().push(operation.to_string());
        match self.failures.lock().unwrap().get(operation) {
            Some(message) => Err(AwsError::Api(format!("{operation}: {message}"))),
            None => Ok(()),
        }
    }
}

#[async_trait::async_trait]
impl AwsClientTrait for MockAwsClient {
    // Load balancers - delegated to elbv2 module
    async fn get_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>, AwsError> {
        elbv2::get_load_balancer_by_name(self, name).await
    }

    async fn create_load_balancer(&self, request: CreateLoadBalancerRequest) -> Result<LoadBalancer, AwsError> {
        elbv2::create_load_balancer(self, request).await
    }

    async fn delete_load_balancer(&self, arn: &str) -> Result<(), AwsError> {
        elbv2::delete_load_balancer(self, arn).await
    }

    async fn set_ip_address_type(&self, arn: &str, ip_address_type: IpAddressType) -> Result<(), AwsError> {
        elbv2::set_ip_address_type(self, arn, ip_address_type).await
    }

    async fn set_subnets(&self, arn: &str, subnets: &[String]) -> Result<(), AwsError> {
        elbv2::set_subnets(self, arn, subnets).await
    }

    async fn get_load_balancer_attributes(&self, arn: &str) -> Result<Attributes, AwsError> {
        elbv2::get_attributes(self, "DescribeLoadBalancerAttributes", arn).await
    }

    async fn modify_load_balancer_attributes(&self, arn: &str, attributes: &Attributes) -> Result<(), AwsError> {
        elbv2::modify_attributes(self, "ModifyLoadBalancerAttributes", arn, attributes).await
    }

    // Target groups - delegated to elbv2 module
    async fn get_target_group_by_name(&self, name: &str) -> Result<Option<TargetGroup>, AwsError> {
        elbv2::get_target_group_by_name(self, name).await
    }

    async fn create_target_group(&self, request: CreateTargetGroupRequest) -> Result<TargetGroup, AwsError> {
        elbv2::create_target_group(self, request).await
    }

    async fn modify_target_group(&self, request: ModifyTargetGroupRequest) -> Result<TargetGroup, AwsError> {
        elbv2::modify_target_group(self, request).await
    }

    async fn delete_target_group(&self, arn: &str) -> Result<(), AwsError> {
        elbv2::delete_target_group(self, arn).await
    }

    async fn get_target_groups_by_tags(&self, tags: &Tags) -> Result<Vec<TargetGroup>, AwsError> {
        elbv2::get_target_groups_by_tags(self, tags).await
    }

    async fn get_target_group_attributes(&self, arn: &str) -> Result<Attributes, AwsError> {
        elbv2::get_attributes(self, "DescribeTargetGroupAttributes", arn).await
    }

    async fn modify_target_group_attributes(&self, arn: &str, attributes: &Attributes) -> Result<(), AwsError> {
        elbv2::modify_attributes(self, "ModifyTargetGroupAttributes", arn, attributes).await
    }

    // Targets - delegated to elbv2 module
    async fn describe_targets(&self, target_group_arn: &str) -> Result<Vec<Target>, AwsError> {
        elbv2::describe_targets(self, target_group_arn).await
    }

    async fn register_targets(&self, target_group_arn: &str, targets: &[Target]) -> Result<(), AwsError> {
        elbv2::register_targets(self, target_group_arn, targets).await
    }

    async fn deregister_targets(&self, target_group_arn: &str, targets: &[Target]) -> Result<(), AwsError> {
        elbv2::deregister_targets(self, target_group_arn, targets).await
    }

    // Tags - delegated to elbv2 module
    async fn get_tags(&self, arn: &str) -> Result<Tags, AwsError> {
        elbv2::get_tags(self, arn).await
    }

    async fn add_tags(&self, arn: &str, tags: &Tags) -> Result<(), AwsError> {
        elbv2::add_tags(self, arn, tags).await
    }

    async fn remove_tags(&self, arn: &str, keys: &[String]) -> Result<(), AwsError> {
        elbv2::remove_tags(self, arn, keys).await
    }

    // Listeners - delegated to elbv2 module
    async fn get_listeners(&self, load_balancer_arn: &str) -> Result<Vec<Listener>, AwsError> {
        elbv2::get_listeners(self, load_balancer_arn).await
    }

    async fn create_listener(&self, load_balancer_arn: &str, config: &ListenerConfig) -> Result<Listener, AwsError> {
        elbv2::create_listener(self, load_balancer_arn, config).await
    }

    async fn modify_listener(&self, listener_arn: &str, config: &ListenerConfig) -> Result<Listener, AwsError> {
        elbv2::modify_listener(self, listener_arn, config).await
    }

    async fn delete_listener(&self, listener_arn: &str) -> Result<(), AwsError> {
        elbv2::delete_listener(self, listener_arn).await
    }

    // Subnets - delegated to ec2 module
    async fn get_subnets_by_name_or_id(&self, names_or_ids: &[String]) -> Result<Vec<Subnet>, AwsError> {
        ec2::get_subnets_by_name_or_id(self, names_or_ids).await
    }

    async fn get_cluster_subnets(&self) -> Result<Vec<Subnet>, AwsError> {
        ec2::get_cluster_subnets(self).await
    }
}
