//! Helper functions for fabricating ARNs and DNS names in the mock

use uuid::Uuid;

const ACCOUNT: &str = "123456789012";
const REGION: &str = "us-west-2";

fn short_id() -> String {
    Uuid::new_v4().simple().to_string()[..16].to_string()
}

pub fn load_balancer_arn(name: &str) -> String {
    format!(
        "arn:aws:elasticloadbalancing:{REGION}:{ACCOUNT}:loadbalancer/net/{name}/{}",
        short_id()
    )
}

pub fn load_balancer_dns_name(name: &str) -> String {
    format!("{name}-{}.elb.{REGION}.amazonaws.com", &short_id()[..10])
}

pub fn target_group_arn(name: &str) -> String {
    format!(
        "arn:aws:elasticloadbalancing:{REGION}:{ACCOUNT}:targetgroup/{name}/{}",
        short_id()
    )
}

pub fn listener_arn(load_balancer_arn: &str) -> String {
    let suffix = load_balancer_arn
        .split_once(":loadbalancer/")
        .map_or(load_balancer_arn, |(_, rest)| rest);
    format!(
        "arn:aws:elasticloadbalancing:{REGION}:{ACCOUNT}:listener/{suffix}/{}",
        short_id()
    )
}
