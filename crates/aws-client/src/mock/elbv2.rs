//! ELBv2 operations for MockAwsClient
//!
//! Handles load balancers, target groups, targets, listeners, tags and attributes.
//! Mirrors the AWS behaviours the controller depends on: deleting a load balancer
//! deletes its listeners, and a target group referenced by a listener cannot be deleted.

use super::{MockAwsClient, helpers};
use crate::error::AwsError;
use crate::models::*;
use chrono::Utc;

fn subnet_zone(client: &MockAwsClient, subnet_id: &str) -> String {
    client
        .subnets
        .lock()
        .unwrap()
        .iter()
        .find(|s| s.id == subnet_id)
        .map_or_else(|| "unknown".to_string(), |s| s.availability_zone.clone())
}

fn placements(client: &MockAwsClient, subnets: &[String]) -> Vec<AvailabilityZone> {
    subnets
        .iter()
        .map(|id| AvailabilityZone {
            zone_name: subnet_zone(client, id),
            subnet_id: id.clone(),
        })
        .collect()
}

fn with_load_balancer<T>(
    client: &MockAwsClient,
    arn: &str,
    f: impl FnOnce(&mut LoadBalancer) -> T,
) -> Result<T, AwsError> {
    let mut lbs = client.load_balancers.lock().unwrap();
    lbs.values_mut()
        .find(|lb| lb.arn == arn)
        .map(f)
        .ok_or_else(|| AwsError::NotFound(format!("load balancer {arn}")))
}

pub async fn get_load_balancer_by_name(client: &MockAwsClient, name: &str) -> Result<Option<LoadBalancer>, AwsError> {
    client.record("DescribeLoadBalancers")?;
    Ok(client.load_balancers.lock().unwrap().get(name).cloned())
}

pub async fn create_load_balancer(client: &MockAwsClient, request: CreateLoadBalancerRequest) -> Result<LoadBalancer, AwsError> {
    client.record("CreateLoadBalancer")?;
    if client.load_balancers.lock().unwrap().contains_key(&request.name) {
        return Err(AwsError::Api(format!("DuplicateLoadBalancerName: {}", request.name)));
    }
    let lb = LoadBalancer {
        arn: helpers::load_balancer_arn(&request.name),
        name: request.name.clone(),
        dns_name: helpers::load_balancer_dns_name(&request.name),
        scheme: request.scheme,
        ip_address_type: request.ip_address_type,
        availability_zones: placements(client, &request.subnets),
        created_time: Some(Utc::now()),
    };
    client.tags.lock().unwrap().insert(lb.arn.clone(), request.tags);
    client
        .load_balancers
        .lock()
        .unwrap()
        .insert(lb.name.clone(), lb.clone());
    Ok(lb)
}

pub async fn delete_load_balancer(client: &MockAwsClient, arn: &str) -> Result<(), AwsError> {
    client.record("DeleteLoadBalancer")?;
    client.load_balancers.lock().unwrap().retain(|_, lb| lb.arn != arn);
    client
        .listeners
        .lock()
        .unwrap()
        .retain(|_, l| l.load_balancer_arn != arn);
    client.tags.lock().unwrap().remove(arn);
    client.attributes.lock().unwrap().remove(arn);
    Ok(())
}

pub async fn set_ip_address_type(client: &MockAwsClient, arn: &str, ip_address_type: IpAddressType) -> Result<(), AwsError> {
    client.record("SetIpAddressType")?;
    with_load_balancer(client, arn, |lb| lb.ip_address_type = ip_address_type)
}

pub async fn set_subnets(client: &MockAwsClient, arn: &str, subnets: &[String]) -> Result<(), AwsError> {
    client.record("SetSubnets")?;
    let zones = placements(client, subnets);
    with_load_balancer(client, arn, |lb| lb.availability_zones = zones)
}

pub async fn get_attributes(client: &MockAwsClient, operation: &str, arn: &str) -> Result<Attributes, AwsError> {
    client.record(operation)?;
    Ok(client
        .attributes
        .lock()
        .unwrap()
        .get(arn)
        .cloned()
        .unwrap_or_default())
}

pub async fn modify_attributes(client: &MockAwsClient, operation: &str, arn: &str, attributes: &Attributes) -> Result<(), AwsError> {
    client.record(operation)?;
    client
        .attributes
        .lock()
        .unwrap()
        .entry(arn.to_string())
        .or_default()
        .extend(attributes.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(())
}

pub async fn get_target_group_by_name(client: &MockAwsClient, name: &str) -> Result<Option<TargetGroup>, AwsError> {
    client.record("DescribeTargetGroups")?;
    Ok(client
        .target_groups
        .lock()
        .unwrap()
        .values()
        .find(|tg| tg.name == name)
        .cloned())
}

pub async fn create_target_group(client: &MockAwsClient, request: CreateTargetGroupRequest) -> Result<TargetGroup, AwsError> {
    client.record("CreateTargetGroup")?;
    if client
        .target_groups
        .lock()
        .unwrap()
        .values()
        .any(|tg| tg.name == request.name)
    {
        return Err(AwsError::Api(format!("DuplicateTargetGroupName: {}", request.name)));
    }
    let tg = TargetGroup {
        arn: helpers::target_group_arn(&request.name),
        name: request.name,
        protocol: request.protocol,
        port: request.port,
        target_type: request.target_type,
        health_check: request.health_check,
        load_balancer_arns: Vec::new(),
    };
    client.tags.lock().unwrap().insert(tg.arn.clone(), request.tags);
    client
        .target_groups
        .lock()
        .unwrap()
        .insert(tg.arn.clone(), tg.clone());
    Ok(tg)
}

pub async fn modify_target_group(client: &MockAwsClient, request: ModifyTargetGroupRequest) -> Result<TargetGroup, AwsError> {
    client.record("ModifyTargetGroup")?;
    let mut tgs = client.target_groups.lock().unwrap();
    let tg = tgs
        .get_mut(&request.arn)
        .ok_or_else(|| AwsError::NotFound(format!("target group {}", request.arn)))?;
    tg.health_check = request.health_check;
    Ok(tg.clone())
}

pub async fn delete_target_group(client: &MockAwsClient, arn: &str) -> Result<(), AwsError> {
    client.record("DeleteTargetGroup")?;
    let referenced = client.listeners.lock().unwrap().values().any(|l| {
        l.default_actions
            .iter()
            .any(|a| a.target_group_arn.as_deref() == Some(arn))
    });
    if referenced {
        return Err(AwsError::InUse(arn.to_string()));
    }
    client.target_groups.lock().unwrap().remove(arn);
    client.targets.lock().unwrap().remove(arn);
    client.tags.lock().unwrap().remove(arn);
    client.attributes.lock().unwrap().remove(arn);
    Ok(())
}

pub async fn get_target_groups_by_tags(client: &MockAwsClient, tags: &Tags) -> Result<Vec<TargetGroup>, AwsError> {
    client.record("DescribeTargetGroups")?;
    let all_tags = client.tags.lock().unwrap();
    let mut matching: Vec<TargetGroup> = client
        .target_groups
        .lock()
        .unwrap()
        .values()
        .filter(|tg| {
            all_tags
                .get(&tg.arn)
                .is_some_and(|live| tags.iter().all(|(k, v)| live.get(k) == Some(v)))
        })
        .cloned()
        .collect();
    matching.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(matching)
}

pub async fn describe_targets(client: &MockAwsClient, target_group_arn: &str) -> Result<Vec<Target>, AwsError> {
    client.record("DescribeTargetHealth")?;
    Ok(client.target_list(target_group_arn))
}

pub async fn register_targets(client: &MockAwsClient, target_group_arn: &str, targets: &[Target]) -> Result<(), AwsError> {
    client.record("RegisterTargets")?;
    client
        .targets
        .lock()
        .unwrap()
        .entry(target_group_arn.to_string())
        .or_default()
        .extend(targets.iter().cloned());
    Ok(())
}

pub async fn deregister_targets(client: &MockAwsClient, target_group_arn: &str, targets: &[Target]) -> Result<(), AwsError> {
    client.record("DeregisterTargets")?;
    if let Some(registered) = client.targets.lock().unwrap().get_mut(target_group_arn) {
        for target in targets {
            registered.remove(target);
        }
    }
    Ok(())
}

pub async fn get_tags(client: &MockAwsClient, arn: &str) -> Result<Tags, AwsError> {
    client.record("DescribeTags")?;
    Ok(client.tags.lock().unwrap().get(arn).cloned().unwrap_or_default())
}

pub async fn add_tags(client: &MockAwsClient, arn: &str, tags: &Tags) -> Result<(), AwsError> {
    client.record("AddTags")?;
    client
        .tags
        .lock()
        .unwrap()
        .entry(arn.to_string())
        .or_default()
        .extend(tags.iter().map(|(k, v)| (k.clone(), v.clone())));
    Ok(())
}

pub async fn remove_tags(client: &MockAwsClient, arn: &str, keys: &[String]) -> Result<(), AwsError> {
    client.record("RemoveTags")?;
    if let Some(live) = client.tags.lock().unwrap().get_mut(arn) {
        for key in keys {
            live.remove(key);
        }
    }
    Ok(())
}

pub async fn get_listeners(client: &MockAwsClient, load_balancer_arn: &str) -> Result<Vec<Listener>, AwsError> {
    client.record("DescribeListeners")?;
    Ok(client.listener_list(load_balancer_arn))
}

pub async fn create_listener(client: &MockAwsClient, load_balancer_arn: &str, config: &ListenerConfig) -> Result<Listener, AwsError> {
    client.record("CreateListener")?;
    if !client
        .load_balancers
        .lock()
        .unwrap()
        .values()
        .any(|lb| lb.arn == load_balancer_arn)
    {
        return Err(AwsError::NotFound(format!("load balancer {load_balancer_arn}")));
    }
    if client.listener_list(load_balancer_arn).iter().any(|l| l.port == config.port) {
        return Err(AwsError::Api(format!("DuplicateListener: port {}", config.port)));
    }
    let listener = Listener {
        arn: helpers::listener_arn(load_balancer_arn),
        load_balancer_arn: load_balancer_arn.to_string(),
        port: config.port,
        protocol: config.protocol,
        default_actions: config.default_actions.clone(),
    };
    client
        .listeners
        .lock()
        .unwrap()
        .insert(listener.arn.clone(), listener.clone());
    Ok(listener)
}

pub async fn modify_listener(client: &MockAwsClient, listener_arn: &str, config: &ListenerConfig) -> Result<Listener, AwsError> {
    client.record("ModifyListener")?;
    let mut listeners = client.listeners.lock().unwrap();
    let listener = listeners
        .get_mut(listener_arn)
        .ok_or_else(|| AwsError::NotFound(format!("listener {listener_arn}")))?;
    listener.port = config.port;
    listener.protocol = config.protocol;
    listener.default_actions = config.default_actions.clone();
    Ok(listener.clone())
}

pub async fn delete_listener(client: &MockAwsClient, listener_arn: &str) -> Result<(), AwsError> {
    client.record("DeleteListener")?;
    client.listeners.lock().unwrap().remove(listener_arn);
    Ok(())
}
