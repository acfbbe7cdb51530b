//! Behavioural tests for MockAwsClient
//!
//! The controller's tests lean on these behaviours, so they are pinned here.
//! Run with `--features test-util`.

use aws_client::{
    Action, AwsClientTrait, AwsError, CreateLoadBalancerRequest, CreateTargetGroupRequest, HealthCheck,
    IpAddressType, ListenerConfig, MockAwsClient, Protocol, Scheme, TargetType, Tags,
};

fn health_check() -> HealthCheck {
    HealthCheck {
        protocol: Protocol::Tcp,
        port: "traffic-port".to_string(),
        path: None,
        interval_seconds: 10,
        healthy_threshold_count: 3,
        unhealthy_threshold_count: 3,
        matcher: None,
    }
}

async fn create_lb(client: &MockAwsClient) -> aws_client::LoadBalancer {
    client
        .create_load_balancer(CreateLoadBalancerRequest {
            name: "nlb-defaultfoo-3d0b".to_string(),
            scheme: Scheme::Internal,
            ip_address_type: IpAddressType::Ipv4,
            subnets: vec!["subnet-a".to_string(), "subnet-b".to_string()],
            tags: Tags::new(),
        })
        .await
        .unwrap()
}

async fn create_tg(client: &MockAwsClient, name: &str, tags: Tags) -> aws_client::TargetGroup {
    client
        .create_target_group(CreateTargetGroupRequest {
            name: name.to_string(),
            protocol: Protocol::Tcp,
            port: 1,
            target_type: TargetType::Ip,
            health_check: health_check(),
            tags,
        })
        .await
        .unwrap()
}

#[tokio::test]
async fn test_target_group_in_use_cannot_be_deleted() {
    let client = MockAwsClient::new();
    let lb = create_lb(&client).await;
    let tg = create_tg(&client, "nlb-tg", Tags::new()).await;
    let listener = client
        .create_listener(
            &lb.arn,
            &ListenerConfig {
                port: 80,
                protocol: Protocol::Tcp,
                default_actions: vec![Action::forward(&tg.arn)],
            },
        )
        .await
        .unwrap();

    let err = client.delete_target_group(&tg.arn).await.unwrap_err();
    assert!(matches!(err, AwsError::InUse(_)));

    client.delete_listener(&listener.arn).await.unwrap();
    client.delete_target_group(&tg.arn).await.unwrap();
    assert!(client.target_group_list().is_empty());
}

#[tokio::test]
async fn test_deleting_load_balancer_drops_its_listeners() {
    let client = MockAwsClient::new();
    let lb = create_lb(&client).await;
    let tg = create_tg(&client, "nlb-tg", Tags::new()).await;
    client
        .create_listener(
            &lb.arn,
            &ListenerConfig {
                port: 80,
                protocol: Protocol::Tcp,
                default_actions: vec![Action::forward(&tg.arn)],
            },
        )
        .await
        .unwrap();

    client.delete_load_balancer(&lb.arn).await.unwrap();
    assert!(client.listener_list(&lb.arn).is_empty());
    client.delete_target_group(&tg.arn).await.unwrap();
}

#[tokio::test]
async fn test_target_groups_by_tags_requires_every_tag() {
    let client = MockAwsClient::new();
    let owned: Tags = [("owner", "svc-a"), ("cluster", "c1")]
        .into_iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    create_tg(&client, "tg-a", owned.clone()).await;
    create_tg(&client, "tg-b", [("owner".to_string(), "svc-b".to_string())].into()).await;

    let found = client.get_target_groups_by_tags(&owned).await.unwrap();
    assert_eq!(found.len(), 1);
    assert_eq!(found[0].name, "tg-a");
}

#[tokio::test]
async fn test_call_log_and_failure_injection() {
    let client = MockAwsClient::new();
    client.fail_on("CreateLoadBalancer", "throttled");

    assert!(client.get_load_balancer_by_name("missing").await.unwrap().is_none());
    let err = client
        .create_load_balancer(CreateLoadBalancerRequest {
            name: "lb".to_string(),
            scheme: Scheme::Internal,
            ip_address_type: IpAddressType::Ipv4,
            subnets: vec![],
            tags: Tags::new(),
        })
        .await
        .unwrap_err();

    assert!(err.to_string().contains("throttled"));
    assert_eq!(client.calls(), vec!["DescribeLoadBalancers", "CreateLoadBalancer"]);
    assert_eq!(client.mutating_calls(), vec!["CreateLoadBalancer"]);
}

#[tokio::test]
async fn test_subnet_lookup_by_name_or_id() {
    let client = MockAwsClient::new();
    client.add_subnet("subnet-aaa", "us-west-2a", &[("Name", "prod-a")]);
    client.add_subnet("subnet-bbb", "us-west-2b", &[]);

    let found = client
        .get_subnets_by_name_or_id(&["prod-a".to_string(), "subnet-bbb".to_string()])
        .await
        .unwrap();
    let ids: Vec<&str> = found.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["subnet-aaa", "subnet-bbb"]);
}
