//! AWS API client
//!
//! Implements [`AwsClientTrait`] on top of the ELBv2 and EC2 SDK clients.
//! Every call runs under the client's [`CallPolicy`] deadline.

use crate::common::{ApiObserver, CallPolicy, DESCRIBE_TAGS_BATCH};
use crate::error::AwsError;
use crate::models::*;
use crate::aws_trait::AwsClientTrait;
use aws_sdk_ec2 as ec2;
use aws_sdk_elasticloadbalancingv2 as elbv2;
use chrono::DateTime;
use elbv2::error::{DisplayErrorContext, SdkError};
use elbv2::types as elb;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

/// AWS client for ELBv2 and EC2
pub struct AwsClient {
    elbv2: elbv2::Client,
    ec2: ec2::Client,
    cluster_name: String,
    vpc_id: String,
    policy: CallPolicy,
}

impl std::fmt::Debug for AwsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsClient")
            .field("cluster_name", &self.cluster_name)
            .field("vpc_id", &self.vpc_id)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}

impl AwsClient {
    /// Create a new AWS client from the default credential and region chain
    ///
    /// # Arguments
    /// * `cluster_name` - Cluster name used for the subnet ownership tag
    /// * `vpc_id` - VPC target groups are created in
    /// * `timeout` - Deadline applied to every API call
    pub async fn new(cluster_name: String, vpc_id: String, timeout: Duration) -> Self {
        let sdk_config = aws_config::load_from_env().await;
        info!(
            region = ?sdk_config.region(),
            "Loaded AWS configuration"
        );
        Self {
            elbv2: elbv2::Client::new(&sdk_config),
            ec2: ec2::Client::new(&sdk_config),
            cluster_name,
            vpc_id,
            policy: CallPolicy {
                timeout,
                observer: None,
            },
        }
    }

    /// Report every API call to `observer`.
    #[must_use]
    pub fn with_observer(mut self, observer: Arc<dyn ApiObserver>) -> Self {
        self.policy.observer = Some(observer);
        self
    }

    async fn describe_target_groups_all(&self) -> Result<Vec<elb::TargetGroup>, AwsError> {
        self.policy
            .call("DescribeTargetGroups", async {
                let mut marker: Option<String> = None;
                let mut all = Vec::new();
                loop {
                    let output = self
                        .elbv2
                        .describe_target_groups()
                        .set_marker(marker.clone())
                        .send()
                        .await
                        .map_err(|e| sdk_error("DescribeTargetGroups", e))?;
                    all.extend(output.target_groups().iter().cloned());
                    match output.next_marker() {
                        Some(next) if !next.is_empty() => marker = Some(next.to_string()),
                        _ => break,
                    }
                }
                Ok(all)
            })
            .await
    }

    async fn describe_tags_batch(&self, arns: &[String]) -> Result<Vec<(String, Tags)>, AwsError> {
        self.policy
            .call("DescribeTags", async {
                let output = self
                    .elbv2
                    .describe_tags()
                    .set_resource_arns(Some(arns.to_vec()))
                    .send()
                    .await
                    .map_err(|e| sdk_error("DescribeTags", e))?;
                Ok(output
                    .tag_descriptions()
                    .iter()
                    .map(|desc| {
                        (
                            desc.resource_arn().unwrap_or_default().to_string(),
                            elb_tags(desc.tags()),
                        )
                    })
                    .collect())
            })
            .await
    }

    async fn describe_subnets(&self, filters: Vec<ec2::types::Filter>) -> Result<Vec<Subnet>, AwsError> {
        self.policy
            .call("DescribeSubnets", async {
                let mut next_token: Option<String> = None;
                let mut subnets = Vec::new();
                loop {
                    let output = self
                        .ec2
                        .describe_subnets()
                        .set_filters(Some(filters.clone()))
                        .set_next_token(next_token.clone())
                        .send()
                        .await
                        .map_err(|e| sdk_error("DescribeSubnets", e))?;
                    for subnet in output.subnets() {
                        let Some(id) = subnet.subnet_id() else {
                            continue;
                        };
                        subnets.push(Subnet {
                            id: id.to_string(),
                            availability_zone: subnet.availability_zone().unwrap_or_default().to_string(),
                            tags: subnet
                                .tags()
                                .iter()
                                .filter_map(|t| Some((t.key()?.to_string(), t.value().unwrap_or_default().to_string())))
                                .collect(),
                        });
                    }
                    match output.next_token() {
                        Some(next) if !next.is_empty() => next_token = Some(next.to_string()),
                        _ => break,
                    }
                }
                Ok(subnets)
            })
            .await
    }
}

#[async_trait::async_trait]
impl AwsClientTrait for AwsClient {
    async fn get_load_balancer_by_name(&self, name: &str) -> Result<Option<LoadBalancer>, AwsError> {
        self.policy
            .call("DescribeLoadBalancers", async {
                match self.elbv2.describe_load_balancers().names(name).send().await {
                    Ok(output) => output
                        .load_balancers()
                        .first()
                        .map(load_balancer_from_sdk)
                        .transpose(),
                    Err(e)
                        if e.as_service_error()
                            .is_some_and(|se| se.is_load_balancer_not_found_exception()) =>
                    {
                        Ok(None)
                    }
                    Err(e) => Err(sdk_error("DescribeLoadBalancers", e)),
                }
            })
            .await
    }

    async fn create_load_balancer(&self, request: CreateLoadBalancerRequest) -> Result<LoadBalancer, AwsError> {
        let tags = elb_tag_list(&request.tags)?;
        self.policy
            .call("CreateLoadBalancer", async {
                let output = self
                    .elbv2
                    .create_load_balancer()
                    .name(&request.name)
                    .r#type(elb::LoadBalancerTypeEnum::Network)
                    .scheme(elb::LoadBalancerSchemeEnum::from(request.scheme.as_str()))
                    .ip_address_type(elb::IpAddressType::from(request.ip_address_type.as_str()))
                    .set_subnets(Some(request.subnets.clone()))
                    .set_tags(Some(tags))
                    .send()
                    .await
                    .map_err(|e| sdk_error("CreateLoadBalancer", e))?;
                let lb = output
                    .load_balancers()
                    .first()
                    .ok_or_else(|| AwsError::Api(format!("CreateLoadBalancer returned no load balancer for {}", request.name)))?;
                load_balancer_from_sdk(lb)
            })
            .await
    }

    async fn delete_load_balancer(&self, arn: &str) -> Result<(), AwsError> {
        self.policy
            .call("DeleteLoadBalancer", async {
                self.elbv2
                    .delete_load_balancer()
                    .load_balancer_arn(arn)
                    .send()
                    .await
                    .map_err(|e| sdk_error("DeleteLoadBalancer", e))?;
                Ok(())
            })
            .await
    }

    async fn set_ip_address_type(&self, arn: &str, ip_address_type: IpAddressType) -> Result<(), AwsError> {
        self.policy
            .call("SetIpAddressType", async {
                self.elbv2
                    .set_ip_address_type()
                    .load_balancer_arn(arn)
                    .ip_address_type(elb::IpAddressType::from(ip_address_type.as_str()))
                    .send()
                    .await
                    .map_err(|e| sdk_error("SetIpAddressType", e))?;
                Ok(())
            })
            .await
    }

    async fn set_subnets(&self, arn: &str, subnets: &[String]) -> Result<(), AwsError> {
        self.policy
            .call("SetSubnets", async {
                self.elbv2
                    .set_subnets()
                    .load_balancer_arn(arn)
                    .set_subnets(Some(subnets.to_vec()))
                    .send()
                    .await
                    .map_err(|e| sdk_error("SetSubnets", e))?;
                Ok(())
            })
            .await
    }

    async fn get_load_balancer_attributes(&self, arn: &str) -> Result<Attributes, AwsError> {
        self.policy
            .call("DescribeLoadBalancerAttributes", async {
                let output = self
                    .elbv2
                    .describe_load_balancer_attributes()
                    .load_balancer_arn(arn)
                    .send()
                    .await
                    .map_err(|e| sdk_error("DescribeLoadBalancerAttributes", e))?;
                Ok(output
                    .attributes()
                    .iter()
                    .filter_map(|a| Some((a.key()?.to_string(), a.value().unwrap_or_default().to_string())))
                    .collect())
            })
            .await
    }

    async fn modify_load_balancer_attributes(&self, arn: &str, attributes: &Attributes) -> Result<(), AwsError> {
        let attributes: Vec<elb::LoadBalancerAttribute> = attributes
            .iter()
            .map(|(k, v)| elb::LoadBalancerAttribute::builder().key(k).value(v).build())
            .collect();
        self.policy
            .call("ModifyLoadBalancerAttributes", async {
                self.elbv2
                    .modify_load_balancer_attributes()
                    .load_balancer_arn(arn)
                    .set_attributes(Some(attributes))
                    .send()
                    .await
                    .map_err(|e| sdk_error("ModifyLoadBalancerAttributes", e))?;
                Ok(())
            })
            .await
    }

    async fn get_target_group_by_name(&self, name: &str) -> Result<Option<TargetGroup>, AwsError> {
        self.policy
            .call("DescribeTargetGroups", async {
                match self.elbv2.describe_target_groups().names(name).send().await {
                    Ok(output) => output
                        .target_groups()
                        .first()
                        .map(target_group_from_sdk)
                        .transpose(),
                    Err(e)
                        if e.as_service_error()
                            .is_some_and(|se| se.is_target_group_not_found_exception()) =>
                    {
                        Ok(None)
                    }
                    Err(e) => Err(sdk_error("DescribeTargetGroups", e)),
                }
            })
            .await
    }

    async fn create_target_group(&self, request: CreateTargetGroupRequest) -> Result<TargetGroup, AwsError> {
        let tags = elb_tag_list(&request.tags)?;
        let hc = &request.health_check;
        self.policy
            .call("CreateTargetGroup", async {
                let output = self
                    .elbv2
                    .create_target_group()
                    .name(&request.name)
                    .vpc_id(&self.vpc_id)
                    .protocol(elb::ProtocolEnum::from(request.protocol.as_str()))
                    .port(request.port)
                    .target_type(elb::TargetTypeEnum::from(request.target_type.as_str()))
                    .health_check_protocol(elb::ProtocolEnum::from(hc.protocol.as_str()))
                    .health_check_port(&hc.port)
                    .health_check_interval_seconds(hc.interval_seconds)
                    .healthy_threshold_count(hc.healthy_threshold_count)
                    .unhealthy_threshold_count(hc.unhealthy_threshold_count)
                    .set_health_check_path(hc.path.clone())
                    .set_matcher(hc.matcher.as_ref().map(|code| elb::Matcher::builder().http_code(code).build()))
                    .set_tags(Some(tags))
                    .send()
                    .await
                    .map_err(|e| sdk_error("CreateTargetGroup", e))?;
                let tg = output
                    .target_groups()
                    .first()
                    .ok_or_else(|| AwsError::Api(format!("CreateTargetGroup returned no target group for {}", request.name)))?;
                target_group_from_sdk(tg)
            })
            .await
    }

    async fn modify_target_group(&self, request: ModifyTargetGroupRequest) -> Result<TargetGroup, AwsError> {
        let hc = &request.health_check;
        self.policy
            .call("ModifyTargetGroup", async {
                let output = self
                    .elbv2
                    .modify_target_group()
                    .target_group_arn(&request.arn)
                    .health_check_protocol(elb::ProtocolEnum::from(hc.protocol.as_str()))
                    .health_check_port(&hc.port)
                    .health_check_interval_seconds(hc.interval_seconds)
                    .healthy_threshold_count(hc.healthy_threshold_count)
                    .unhealthy_threshold_count(hc.unhealthy_threshold_count)
                    .set_health_check_path(hc.path.clone())
                    .set_matcher(hc.matcher.as_ref().map(|code| elb::Matcher::builder().http_code(code).build()))
                    .send()
                    .await
                    .map_err(|e| sdk_error("ModifyTargetGroup", e))?;
                let tg = output
                    .target_groups()
                    .first()
                    .ok_or_else(|| AwsError::Api(format!("ModifyTargetGroup returned no target group for {}", request.arn)))?;
                target_group_from_sdk(tg)
            })
            .await
    }

    async fn delete_target_group(&self, arn: &str) -> Result<(), AwsError> {
        self.policy
            .call("DeleteTargetGroup", async {
                match self.elbv2.delete_target_group().target_group_arn(arn).send().await {
                    Ok(_) => Ok(()),
                    Err(e)
                        if e.as_service_error()
                            .is_some_and(|se| se.is_resource_in_use_exception()) =>
                    {
                        Err(AwsError::InUse(arn.to_string()))
                    }
                    Err(e) => Err(sdk_error("DeleteTargetGroup", e)),
                }
            })
            .await
    }

    async fn get_target_groups_by_tags(&self, tags: &Tags) -> Result<Vec<TargetGroup>, AwsError> {
        let all = self.describe_target_groups_all().await?;
        let in_vpc: Vec<&elb::TargetGroup> = all
            .iter()
            .filter(|tg| self.vpc_id.is_empty() || tg.vpc_id() == Some(self.vpc_id.as_str()))
            .collect();
        let arns: Vec<String> = in_vpc
            .iter()
            .filter_map(|tg| tg.target_group_arn().map(str::to_string))
            .collect();

        let mut matching = BTreeSet::new();
        for chunk in arns.chunks(DESCRIBE_TAGS_BATCH) {
            for (arn, live) in self.describe_tags_batch(chunk).await? {
                if tags.iter().all(|(k, v)| live.get(k) == Some(v)) {
                    matching.insert(arn);
                }
            }
        }
        debug!(count = matching.len(), "Target groups matched by tags");

        in_vpc
            .into_iter()
            .filter(|tg| tg.target_group_arn().is_some_and(|arn| matching.contains(arn)))
            .map(target_group_from_sdk)
            .collect()
    }

    async fn get_target_group_attributes(&self, arn: &str) -> Result<Attributes, AwsError> {
        self.policy
            .call("DescribeTargetGroupAttributes", async {
                let output = self
                    .elbv2
                    .describe_target_group_attributes()
                    .target_group_arn(arn)
                    .send()
                    .await
                    .map_err(|e| sdk_error("DescribeTargetGroupAttributes", e))?;
                Ok(output
                    .attributes()
                    .iter()
                    .filter_map(|a| Some((a.key()?.to_string(), a.value().unwrap_or_default().to_string())))
                    .collect())
            })
            .await
    }

    async fn modify_target_group_attributes(&self, arn: &str, attributes: &Attributes) -> Result<(), AwsError> {
        let attributes: Vec<elb::TargetGroupAttribute> = attributes
            .iter()
            .map(|(k, v)| elb::TargetGroupAttribute::builder().key(k).value(v).build())
            .collect();
        self.policy
            .call("ModifyTargetGroupAttributes", async {
                self.elbv2
                    .modify_target_group_attributes()
                    .target_group_arn(arn)
                    .set_attributes(Some(attributes))
                    .send()
                    .await
                    .map_err(|e| sdk_error("ModifyTargetGroupAttributes", e))?;
                Ok(())
            })
            .await
    }

    async fn describe_targets(&self, target_group_arn: &str) -> Result<Vec<Target>, AwsError> {
        self.policy
            .call("DescribeTargetHealth", async {
                let output = self
                    .elbv2
                    .describe_target_health()
                    .target_group_arn(target_group_arn)
                    .send()
                    .await
                    .map_err(|e| sdk_error("DescribeTargetHealth", e))?;
                Ok(output
                    .target_health_descriptions()
                    .iter()
                    .filter_map(|desc| desc.target())
                    .map(|t| Target {
                        id: t.id().to_string(),
                        port: t.port().unwrap_or_default(),
                    })
                    .collect())
            })
            .await
    }

    async fn register_targets(&self, target_group_arn: &str, targets: &[Target]) -> Result<(), AwsError> {
        let descriptions = target_descriptions(targets)?;
        self.policy
            .call("RegisterTargets", async {
                self.elbv2
                    .register_targets()
                    .target_group_arn(target_group_arn)
                    .set_targets(Some(descriptions))
                    .send()
                    .await
                    .map_err(|e| sdk_error("RegisterTargets", e))?;
                Ok(())
            })
            .await
    }

    async fn deregister_targets(&self, target_group_arn: &str, targets: &[Target]) -> Result<(), AwsError> {
        let descriptions = target_descriptions(targets)?;
        self.policy
            .call("DeregisterTargets", async {
                self.elbv2
                    .deregister_targets()
                    .target_group_arn(target_group_arn)
                    .set_targets(Some(descriptions))
                    .send()
                    .await
                    .map_err(|e| sdk_error("DeregisterTargets", e))?;
                Ok(())
            })
            .await
    }

    async fn get_tags(&self, arn: &str) -> Result<Tags, AwsError> {
        let described = self.describe_tags_batch(&[arn.to_string()]).await?;
        Ok(described
            .into_iter()
            .find(|(described_arn, _)| described_arn == arn)
            .map(|(_, tags)| tags)
            .unwrap_or_default())
    }

    async fn add_tags(&self, arn: &str, tags: &Tags) -> Result<(), AwsError> {
        let tags = elb_tag_list(tags)?;
        self.policy
            .call("AddTags", async {
                self.elbv2
                    .add_tags()
                    .resource_arns(arn)
                    .set_tags(Some(tags))
                    .send()
                    .await
                    .map_err(|e| sdk_error("AddTags", e))?;
                Ok(())
            })
            .await
    }

    async fn remove_tags(&self, arn: &str, keys: &[String]) -> Result<(), AwsError> {
        self.policy
            .call("RemoveTags", async {
                self.elbv2
                    .remove_tags()
                    .resource_arns(arn)
                    .set_tag_keys(Some(keys.to_vec()))
                    .send()
                    .await
                    .map_err(|e| sdk_error("RemoveTags", e))?;
                Ok(())
            })
            .await
    }

    async fn get_listeners(&self, load_balancer_arn: &str) -> Result<Vec<Listener>, AwsError> {
        self.policy
            .call("DescribeListeners", async {
                let output = self
                    .elbv2
                    .describe_listeners()
                    .load_balancer_arn(load_balancer_arn)
                    .send()
                    .await
                    .map_err(|e| sdk_error("DescribeListeners", e))?;
                output.listeners().iter().map(listener_from_sdk).collect()
            })
            .await
    }

    async fn create_listener(&self, load_balancer_arn: &str, config: &ListenerConfig) -> Result<Listener, AwsError> {
        let actions = elb_actions(&config.default_actions)?;
        self.policy
            .call("CreateListener", async {
                let output = self
                    .elbv2
                    .create_listener()
                    .load_balancer_arn(load_balancer_arn)
                    .port(config.port)
                    .protocol(elb::ProtocolEnum::from(config.protocol.as_str()))
                    .set_default_actions(Some(actions))
                    .send()
                    .await
                    .map_err(|e| sdk_error("CreateListener", e))?;
                let listener = output
                    .listeners()
                    .first()
                    .ok_or_else(|| AwsError::Api(format!("CreateListener returned no listener for port {}", config.port)))?;
                listener_from_sdk(listener)
            })
            .await
    }

    async fn modify_listener(&self, listener_arn: &str, config: &ListenerConfig) -> Result<Listener, AwsError> {
        let actions = elb_actions(&config.default_actions)?;
        self.policy
            .call("ModifyListener", async {
                let output = self
                    .elbv2
                    .modify_listener()
                    .listener_arn(listener_arn)
                    .port(config.port)
                    .protocol(elb::ProtocolEnum::from(config.protocol.as_str()))
                    .set_default_actions(Some(actions))
                    .send()
                    .await
                    .map_err(|e| sdk_error("ModifyListener", e))?;
                let listener = output
                    .listeners()
                    .first()
                    .ok_or_else(|| AwsError::Api(format!("ModifyListener returned no listener for {listener_arn}")))?;
                listener_from_sdk(listener)
            })
            .await
    }

    async fn delete_listener(&self, listener_arn: &str) -> Result<(), AwsError> {
        self.policy
            .call("DeleteListener", async {
                self.elbv2
                    .delete_listener()
                    .listener_arn(listener_arn)
                    .send()
                    .await
                    .map_err(|e| sdk_error("DeleteListener", e))?;
                Ok(())
            })
            .await
    }

    async fn get_subnets_by_name_or_id(&self, names_or_ids: &[String]) -> Result<Vec<Subnet>, AwsError> {
        if names_or_ids.is_empty() {
            return Ok(Vec::new());
        }
        let by_name = self
            .describe_subnets(vec![
                ec2::types::Filter::builder()
                    .name("tag:Name")
                    .set_values(Some(names_or_ids.to_vec()))
                    .build(),
            ])
            .await?;
        let by_id = self
            .describe_subnets(vec![
                ec2::types::Filter::builder()
                    .name("subnet-id")
                    .set_values(Some(names_or_ids.to_vec()))
                    .build(),
            ])
            .await?;

        let mut seen = BTreeSet::new();
        Ok(by_name
            .into_iter()
            .chain(by_id)
            .filter(|subnet| seen.insert(subnet.id.clone()))
            .collect())
    }

    async fn get_cluster_subnets(&self) -> Result<Vec<Subnet>, AwsError> {
        let mut filters = vec![
            ec2::types::Filter::builder()
                .name("tag-key")
                .values(format!("kubernetes.io/cluster/{}", self.cluster_name))
                .build(),
        ];
        if !self.vpc_id.is_empty() {
            filters.push(
                ec2::types::Filter::builder()
                    .name("vpc-id")
                    .values(&self.vpc_id)
                    .build(),
            );
        }
        self.describe_subnets(filters).await
    }
}

fn sdk_error<E, R>(operation: &str, err: SdkError<E, R>) -> AwsError
where
    E: std::error::Error + 'static,
    R: std::fmt::Debug,
{
    AwsError::Api(format!("{operation}: {}", DisplayErrorContext(&err)))
}

fn build_error(err: impl std::fmt::Display) -> AwsError {
    AwsError::InvalidRequest(err.to_string())
}

fn elb_tags(tags: &[elb::Tag]) -> Tags {
    tags.iter()
        .map(|t| (t.key().to_string(), t.value().unwrap_or_default().to_string()))
        .collect()
}

fn elb_tag_list(tags: &Tags) -> Result<Vec<elb::Tag>, AwsError> {
    tags.iter()
        .map(|(k, v)| elb::Tag::builder().key(k).value(v).build().map_err(build_error))
        .collect()
}

fn target_descriptions(targets: &[Target]) -> Result<Vec<elb::TargetDescription>, AwsError> {
    targets
        .iter()
        .map(|t| {
            elb::TargetDescription::builder()
                .id(&t.id)
                .port(t.port)
                .build()
                .map_err(build_error)
        })
        .collect()
}

fn elb_actions(actions: &[Action]) -> Result<Vec<elb::Action>, AwsError> {
    actions
        .iter()
        .map(|a| {
            elb::Action::builder()
                .r#type(elb::ActionTypeEnum::from(a.action_type.as_str()))
                .set_target_group_arn(a.target_group_arn.clone())
                .set_order(a.order)
                .build()
                .map_err(build_error)
        })
        .collect()
}

fn load_balancer_from_sdk(lb: &elb::LoadBalancer) -> Result<LoadBalancer, AwsError> {
    let arn = lb
        .load_balancer_arn()
        .ok_or_else(|| AwsError::Api("load balancer without ARN".to_string()))?;
    Ok(LoadBalancer {
        arn: arn.to_string(),
        name: lb.load_balancer_name().unwrap_or_default().to_string(),
        dns_name: lb.dns_name().unwrap_or_default().to_string(),
        scheme: lb
            .scheme()
            .map_or(Scheme::Internal.as_str(), |s| s.as_str())
            .parse()?,
        ip_address_type: lb
            .ip_address_type()
            .map_or(IpAddressType::Ipv4.as_str(), |t| t.as_str())
            .parse()?,
        availability_zones: lb
            .availability_zones()
            .iter()
            .map(|az| AvailabilityZone {
                zone_name: az.zone_name().unwrap_or_default().to_string(),
                subnet_id: az.subnet_id().unwrap_or_default().to_string(),
            })
            .collect(),
        created_time: lb
            .created_time()
            .and_then(|t| DateTime::from_timestamp(t.secs(), t.subsec_nanos())),
    })
}

fn target_group_from_sdk(tg: &elb::TargetGroup) -> Result<TargetGroup, AwsError> {
    let arn = tg
        .target_group_arn()
        .ok_or_else(|| AwsError::Api("target group without ARN".to_string()))?;
    let hc_protocol: Protocol = tg
        .health_check_protocol()
        .map_or(Protocol::Tcp.as_str(), |p| p.as_str())
        .parse()?;
    let http = hc_protocol.is_http();
    Ok(TargetGroup {
        arn: arn.to_string(),
        name: tg.target_group_name().unwrap_or_default().to_string(),
        protocol: tg
            .protocol()
            .map_or(Protocol::Tcp.as_str(), |p| p.as_str())
            .parse()?,
        port: tg.port().unwrap_or_default(),
        target_type: tg
            .target_type()
            .map_or(TargetType::Instance.as_str(), |t| t.as_str())
            .parse()?,
        health_check: HealthCheck {
            protocol: hc_protocol,
            port: tg.health_check_port().unwrap_or("traffic-port").to_string(),
            path: tg
                .health_check_path()
                .filter(|_| http)
                .map(str::to_string),
            interval_seconds: tg.health_check_interval_seconds().unwrap_or_default(),
            healthy_threshold_count: tg.healthy_threshold_count().unwrap_or_default(),
            unhealthy_threshold_count: tg.unhealthy_threshold_count().unwrap_or_default(),
            matcher: tg
                .matcher()
                .and_then(|m| m.http_code())
                .filter(|_| http)
                .map(str::to_string),
        },
        load_balancer_arns: tg.load_balancer_arns().to_vec(),
    })
}

fn listener_from_sdk(listener: &elb::Listener) -> Result<Listener, AwsError> {
    let arn = listener
        .listener_arn()
        .ok_or_else(|| AwsError::Api("listener without ARN".to_string()))?;
    Ok(Listener {
        arn: arn.to_string(),
        load_balancer_arn: listener.load_balancer_arn().unwrap_or_default().to_string(),
        port: listener.port().unwrap_or_default(),
        protocol: listener
            .protocol()
            .map_or(Protocol::Tcp.as_str(), |p| p.as_str())
            .parse()?,
        default_actions: listener
            .default_actions()
            .iter()
            .map(|a| Action {
                action_type: a.r#type().as_str().to_string(),
                target_group_arn: a.target_group_arn().map(str::to_string),
                order: a.order(),
            })
            .collect(),
    })
}
